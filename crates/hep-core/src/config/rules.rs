// Hep Config - Rule Set
// Loads and validates the YAML list of rule blocks

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

use super::pattern::{de_text, de_u16, de_value, Pattern};
use crate::input::{DeviceIdentity, RawEvent};

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("there is no configuration in the config file")]
    InvalidRoot,

    #[error("configuration #{block} has no valid device block defined")]
    InvalidDevice { block: usize },

    #[error("configuration #{block} has no valid keys block defined")]
    InvalidKeys { block: usize },

    #[error("key #{key} in configuration #{block} has no valid block defined")]
    InvalidKey { block: usize, key: usize },

    #[error("key #{key} in configuration #{block} has no valid command defined")]
    InvalidCommand { block: usize, key: usize },

    #[error("configuration #{block}: {source}")]
    Block {
        block: usize,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Which devices a rule block applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceFilter {
    #[serde(default, deserialize_with = "de_u16")]
    pub vendor: Pattern<u16>,
    #[serde(default, deserialize_with = "de_u16")]
    pub product: Pattern<u16>,
    #[serde(default, deserialize_with = "de_u16")]
    pub version: Pattern<u16>,
    /// Exact device name
    #[serde(default, deserialize_with = "de_text")]
    pub name: Pattern<String>,
    /// Open matching devices for exclusive access
    #[serde(default)]
    pub grab: bool,
}

impl DeviceFilter {
    pub fn matches(&self, device: &DeviceIdentity) -> bool {
        self.vendor.matches(&device.info.vendor)
            && self.product.matches(&device.info.product)
            && self.version.matches(&device.info.version)
            && self.name.matches(&device.name)
    }
}

/// One event-matching clause with its command template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyRule {
    #[serde(rename = "type", default, deserialize_with = "de_u16")]
    pub event_type: Pattern<u16>,
    #[serde(default, deserialize_with = "de_u16")]
    pub code: Pattern<u16>,
    /// Compared against the event value's unsigned 32-bit form
    #[serde(default, deserialize_with = "de_value")]
    pub value: Pattern<u32>,
    #[serde(deserialize_with = "de_command")]
    pub command: Vec<String>,
    #[serde(default)]
    pub background: bool,
}

impl KeyRule {
    pub fn matches(&self, event: &RawEvent) -> bool {
        self.event_type.matches(&event.event_type)
            && self.code.matches(&event.code)
            && self.value.matches(&event.normalized_value())
    }
}

/// A device filter paired with its ordered key rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleBlock {
    pub device: DeviceFilter,
    pub keys: Vec<KeyRule>,
}

impl RuleBlock {
    /// First key rule, in declared order, that accepts `event`.
    pub fn first_match(&self, event: &RawEvent) -> Option<&KeyRule> {
        self.keys.iter().find(|rule| rule.matches(event))
    }
}

/// Validated, immutable collection of rule blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    blocks: Vec<RuleBlock>,
}

impl RuleSet {
    /// Load rules from a YAML file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Getting config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load rules from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let root: Value = serde_yaml::from_str(content)?;
        Self::from_value(root)
    }

    /// Validate the document shape, then build typed blocks.
    pub fn from_value(root: Value) -> Result<Self, ConfigError> {
        validate_structure(&root)?;

        let Value::Sequence(entries) = root else {
            return Err(ConfigError::InvalidRoot);
        };

        let blocks = entries
            .into_iter()
            .enumerate()
            .map(|(block, entry)| {
                serde_yaml::from_value::<RuleBlock>(entry)
                    .map_err(|source| ConfigError::Block { block, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if blocks.is_empty() {
            log::warn!("Config contains no rule blocks; nothing will be watched");
        }

        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[RuleBlock] {
        &self.blocks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RuleBlock> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether any block's device filter accepts `device`.
    pub fn matches_device(&self, device: &DeviceIdentity) -> bool {
        self.blocks.iter().any(|block| block.device.matches(device))
    }

    /// Whether any block matching `device` asks for exclusive access.
    pub fn wants_grab(&self, device: &DeviceIdentity) -> bool {
        self.blocks
            .iter()
            .any(|block| block.device.grab && block.device.matches(device))
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a RuleBlock;
    type IntoIter = std::slice::Iter<'a, RuleBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

fn field<'a>(mapping: &'a serde_yaml::Mapping, name: &str) -> Option<&'a Value> {
    mapping.get(name)
}

/// Shape checks that report block/key positions before serde sees the data.
fn validate_structure(root: &Value) -> Result<(), ConfigError> {
    let entries = root.as_sequence().ok_or(ConfigError::InvalidRoot)?;

    for (block, entry) in entries.iter().enumerate() {
        let mapping = entry
            .as_mapping()
            .ok_or(ConfigError::InvalidDevice { block })?;

        if !field(mapping, "device").is_some_and(Value::is_mapping) {
            return Err(ConfigError::InvalidDevice { block });
        }

        let keys = field(mapping, "keys")
            .and_then(Value::as_sequence)
            .ok_or(ConfigError::InvalidKeys { block })?;

        for (key, entry) in keys.iter().enumerate() {
            let key_mapping = entry
                .as_mapping()
                .ok_or(ConfigError::InvalidKey { block, key })?;

            let valid_command = match field(key_mapping, "command") {
                Some(Value::String(command)) => !command.is_empty(),
                Some(Value::Sequence(tokens)) => {
                    !tokens.is_empty() && tokens.iter().all(Value::is_string)
                }
                _ => false,
            };
            if !valid_command {
                return Err(ConfigError::InvalidCommand { block, key });
            }
        }
    }

    Ok(())
}

/// Raw YAML shape of a command
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandRepr {
    Single(String),
    Tokens(Vec<String>),
}

/// A single string becomes a one-element token list.
fn de_command<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match CommandRepr::deserialize(deserializer)? {
        CommandRepr::Single(command) => vec![command],
        CommandRepr::Tokens(tokens) => tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::DeviceInfo;

    const EXAMPLE: &str = r#"
- device: {vendor: any}
  keys:
    - type: 1
      code: 30
      value: 1
      command: "echo hit"
- device: {vendor: 0x046d, product: "0xc52b", version: any, grab: true}
  keys:
    - type: 1
      code: 115
      command: [amixer, set, Master, 5%+]
      background: true
    - code: any
      command: ["notify-send", "{{ event.code }}"]
"#;

    fn identity(vendor: u16, product: u16) -> DeviceIdentity {
        DeviceIdentity::new(
            "/dev/input/event7",
            "Test Keyboard",
            DeviceInfo {
                bustype: 3,
                vendor,
                product,
                version: 0x111,
            },
        )
    }

    #[test]
    fn test_parse_example_config() {
        let rules = RuleSet::from_yaml_str(EXAMPLE).unwrap();
        assert_eq!(rules.len(), 2);

        let first = &rules.blocks()[0];
        assert_eq!(first.device, DeviceFilter::default());
        assert_eq!(first.keys[0].command, vec!["echo hit".to_string()]);
        assert!(!first.keys[0].background);
        assert_eq!(first.keys[0].value, Pattern::Exact(1));

        let second = &rules.blocks()[1];
        assert_eq!(second.device.vendor, Pattern::Exact(0x046d));
        assert_eq!(second.device.product, Pattern::Exact(0xc52b));
        assert!(second.device.version.is_any());
        assert!(second.device.grab);
        assert!(second.keys[0].background);
        assert_eq!(second.keys[0].command.len(), 4);
        assert!(second.keys[1].event_type.is_any());
    }

    #[test]
    fn test_device_filter_matching() {
        let rules = RuleSet::from_yaml_str(EXAMPLE).unwrap();
        let logitech = identity(0x046d, 0xc52b);
        let other = identity(0x1234, 0xc52b);

        assert!(rules.blocks()[0].device.matches(&logitech));
        assert!(rules.blocks()[0].device.matches(&other));
        assert!(rules.blocks()[1].device.matches(&logitech));
        assert!(!rules.blocks()[1].device.matches(&other));

        assert!(rules.wants_grab(&logitech));
        assert!(!rules.wants_grab(&other));
    }

    #[test]
    fn test_device_name_filter() {
        let rules = RuleSet::from_yaml_str(
            "- device: {name: Test Keyboard}\n  keys: [{command: x}]\n",
        )
        .unwrap();
        assert!(rules.matches_device(&identity(1, 2)));

        let mut renamed = identity(1, 2);
        renamed.name = "Other".to_string();
        assert!(!rules.matches_device(&renamed));
    }

    #[test]
    fn test_first_match_in_declared_order() {
        let rules = RuleSet::from_yaml_str(
            r#"
- device: {}
  keys:
    - {type: 1, command: first}
    - {type: 1, code: 30, command: second}
"#,
        )
        .unwrap();
        let block = &rules.blocks()[0];
        let hit = block.first_match(&RawEvent::new(1, 30, 1)).unwrap();
        assert_eq!(hit.command, vec!["first".to_string()]);
        assert!(block.first_match(&RawEvent::new(2, 30, 1)).is_none());
    }

    #[test]
    fn test_negative_value_matches_wire_value() {
        let rules = RuleSet::from_yaml_str(
            "- device: {}\n  keys: [{type: 2, code: 8, value: -1, command: down}]\n",
        )
        .unwrap();
        let block = &rules.blocks()[0];
        assert!(block.first_match(&RawEvent::new(2, 8, -1)).is_some());
        assert!(block.first_match(&RawEvent::new(2, 8, 1)).is_none());
    }

    #[test]
    fn test_root_must_be_sequence() {
        assert!(matches!(
            RuleSet::from_yaml_str("device: {}\n"),
            Err(ConfigError::InvalidRoot)
        ));
        assert!(matches!(
            RuleSet::from_yaml_str("~\n"),
            Err(ConfigError::InvalidRoot)
        ));
    }

    #[test]
    fn test_empty_sequence_is_allowed() {
        let rules = RuleSet::from_yaml_str("[]").unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_missing_device_block() {
        let err = RuleSet::from_yaml_str("- keys: [{command: x}]\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDevice { block: 0 }));
        assert_eq!(
            err.to_string(),
            "configuration #0 has no valid device block defined"
        );

        let err = RuleSet::from_yaml_str("- device: any\n  keys: []\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDevice { block: 0 }));
    }

    #[test]
    fn test_missing_keys_block() {
        let yaml = "- device: {}\n  keys: [{command: x}]\n- device: {}\n";
        let err = RuleSet::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKeys { block: 1 }));
    }

    #[test]
    fn test_key_level_fields_are_validated() {
        let err = RuleSet::from_yaml_str("- device: {}\n  keys: [{type: 1}]\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCommand { block: 0, key: 0 }));

        let err = RuleSet::from_yaml_str("- device: {}\n  keys: [{command: [a, 1]}]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCommand { block: 0, key: 0 }));

        let err = RuleSet::from_yaml_str("- device: {}\n  keys: [{command: x}, 5]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey { block: 0, key: 1 }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = RuleSet::from_yaml_str("- device: {}\n  keys: [{command: x, backgroud: true}]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Block { block: 0, .. }));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, EXAMPLE).unwrap();
        assert_eq!(RuleSet::from_path(&path).unwrap().len(), 2);

        let missing = RuleSet::from_path(dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
