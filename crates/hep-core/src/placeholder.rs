// Hep Placeholder Resolver
// Substitutes {{ ... }} tokens in command templates with live device/event values

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use strum_macros::EnumString;

use crate::input::{DeviceIdentity, DeviceInfo, RawEvent};
use crate::registry::DeviceLookup;

/// Reasons a placeholder token stays unresolved
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaceholderError {
    #[error("unknown placeholder '{0}'")]
    UnknownPlaceholder(String),

    #[error("malformed device selector '{0}'")]
    MalformedSelector(String),

    #[error("no device matches selector '{0}'")]
    NoMatchingDevice(String),

    #[error("{object} has no attribute {attribute}")]
    UnknownAttribute { object: String, attribute: String },
}

/// Attributes reachable from a device's root identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
enum DeviceAttribute {
    Path,
    Name,
    Phys,
    Uniq,
    Info,
}

/// Attributes of a device's id block (`device.info.*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
enum InfoAttribute {
    Bustype,
    Vendor,
    Product,
    Version,
}

/// Attributes of the triggering event (`event.*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
enum EventAttribute {
    Type,
    Code,
    Value,
}

/// A position reached while walking a dotted attribute path.
enum Node<'a> {
    Device(&'a DeviceIdentity),
    Info(&'a DeviceInfo),
    Value(String),
}

impl Node<'_> {
    fn step(self, segment: &str) -> Result<Self, PlaceholderError> {
        let unknown = |object: String| PlaceholderError::UnknownAttribute {
            object,
            attribute: segment.to_string(),
        };

        match self {
            Node::Device(device) => {
                let attribute = DeviceAttribute::from_str(segment)
                    .map_err(|_| unknown(device.to_string()))?;
                Ok(match attribute {
                    DeviceAttribute::Path => Node::Value(device.path_str()),
                    DeviceAttribute::Name => Node::Value(device.name.clone()),
                    DeviceAttribute::Phys => Node::Value(device.phys.clone().unwrap_or_default()),
                    DeviceAttribute::Uniq => Node::Value(device.uniq.clone().unwrap_or_default()),
                    DeviceAttribute::Info => Node::Info(&device.info),
                })
            }
            Node::Info(info) => {
                let attribute =
                    InfoAttribute::from_str(segment).map_err(|_| unknown(info.to_string()))?;
                Ok(Node::Value(
                    match attribute {
                        InfoAttribute::Bustype => info.bustype,
                        InfoAttribute::Vendor => info.vendor,
                        InfoAttribute::Product => info.product,
                        InfoAttribute::Version => info.version,
                    }
                    .to_string(),
                ))
            }
            Node::Value(value) => Err(unknown(format!("'{}'", value))),
        }
    }

    fn into_string(self) -> String {
        match self {
            Node::Device(device) => device.to_string(),
            Node::Info(info) => info.to_string(),
            Node::Value(value) => value,
        }
    }
}

fn walk(device: &DeviceIdentity, path: &str) -> Result<String, PlaceholderError> {
    path.split('.')
        .try_fold(Node::Device(device), |node, segment| node.step(segment))
        .map(Node::into_string)
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"^\{\{\s*([^}\s]+)\s*\}\}$").expect("valid token regex"))
}

fn selector_regex() -> &'static Regex {
    static SELECTOR: OnceLock<Regex> = OnceLock::new();
    SELECTOR
        .get_or_init(|| Regex::new(r"^device\[([^\]]+)\]\.(.+)$").expect("valid selector regex"))
}

/// Capability predicate parsed from `device[cap=..,subcap=..]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selector {
    pub cap: u16,
    pub subcap: Option<u16>,
}

impl FromStr for Selector {
    type Err = PlaceholderError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let malformed = || PlaceholderError::MalformedSelector(text.to_string());
        let mut cap = None;
        let mut subcap = None;

        for pair in text.split(',') {
            let (key, value) = pair.split_once('=').ok_or_else(malformed)?;
            let value: u16 = value.trim().parse().map_err(|_| malformed())?;
            match key.trim() {
                "cap" => cap = Some(value),
                "subcap" => subcap = Some(value),
                _ => return Err(malformed()),
            }
        }

        Ok(Self {
            cap: cap.ok_or_else(malformed)?,
            subcap,
        })
    }
}

/// Body of a `{{ ... }}` token, if `token` is one.
pub fn placeholder_body(token: &str) -> Option<&str> {
    token_regex()
        .captures(token)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str())
}

/// Resolve one placeholder body against live state.
pub fn resolve_body(
    body: &str,
    device: &DeviceIdentity,
    event: &RawEvent,
    lookup: &dyn DeviceLookup,
) -> Result<String, PlaceholderError> {
    if let Some(captures) = selector_regex().captures(body) {
        let selector_text = &captures[1];
        let selector: Selector = selector_text.parse()?;
        let selected = lookup
            .find_by_capability(selector.cap, selector.subcap)
            .ok_or_else(|| PlaceholderError::NoMatchingDevice(selector_text.to_string()))?;
        return walk(selected, &captures[2]);
    }

    if let Some(path) = body.strip_prefix("device.") {
        return walk(device, path);
    }

    if let Some(name) = body.strip_prefix("event.") {
        let attribute = EventAttribute::from_str(name)
            .map_err(|_| PlaceholderError::UnknownPlaceholder(body.to_string()))?;
        return Ok(match attribute {
            EventAttribute::Type => event.event_type.to_string(),
            EventAttribute::Code => event.code.to_string(),
            EventAttribute::Value => event.value.to_string(),
        });
    }

    Err(PlaceholderError::UnknownPlaceholder(body.to_string()))
}

/// Rewrite every placeholder token of `template` into a literal argument.
///
/// Tokens that are not placeholders pass through unchanged; placeholders that
/// cannot be resolved are logged and left as their literal template text.
pub fn resolve_command(
    template: &[String],
    device: &DeviceIdentity,
    event: &RawEvent,
    lookup: &dyn DeviceLookup,
) -> Vec<String> {
    template
        .iter()
        .map(|token| {
            let Some(body) = placeholder_body(token) else {
                return token.clone();
            };
            match resolve_body(body, device, event, lookup) {
                Ok(value) => value,
                Err(e @ PlaceholderError::UnknownAttribute { .. }) => {
                    log::error!("{}", e);
                    token.clone()
                }
                Err(e @ PlaceholderError::NoMatchingDevice(_)) => {
                    log::debug!("Leaving {} unresolved: {}", token, e);
                    token.clone()
                }
                Err(e) => {
                    log::warn!("Leaving {} unresolved: {}", token, e);
                    token.clone()
                }
            }
        })
        .collect()
}
