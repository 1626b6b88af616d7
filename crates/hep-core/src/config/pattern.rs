// Hep Config - Field Patterns
// Wildcard-or-exact matchers for device and key fields

use serde::{Deserialize, Deserializer};

use crate::input::normalize_configured;

/// A configured field: either the `"any"` wildcard or one exact value.
///
/// An omitted field deserializes to [`Pattern::Any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pattern<T> {
    #[default]
    Any,
    Exact(T),
}

impl<T: PartialEq> Pattern<T> {
    pub fn matches(&self, observed: &T) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(expected) => expected == observed,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Pattern::Any)
    }
}

/// Raw YAML shape of a pattern field
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PatternRepr {
    Int(i64),
    Text(String),
}

/// Parse a numeric string: `0x` prefix for hex, decimal otherwise.
fn parse_number(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_pattern<E: serde::de::Error>(repr: PatternRepr) -> Result<Pattern<i64>, E> {
    match repr {
        PatternRepr::Int(n) => Ok(Pattern::Exact(n)),
        PatternRepr::Text(s) if s.trim().eq_ignore_ascii_case("any") => Ok(Pattern::Any),
        PatternRepr::Text(s) => parse_number(&s)
            .map(Pattern::Exact)
            .ok_or_else(|| E::custom(format!("expected an integer or \"any\", got \"{}\"", s))),
    }
}

/// Deserialize a `u16` field (ids, event type, event code).
pub(crate) fn de_u16<'de, D>(deserializer: D) -> Result<Pattern<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match parse_pattern::<D::Error>(PatternRepr::deserialize(deserializer)?)? {
        Pattern::Any => Ok(Pattern::Any),
        Pattern::Exact(n) => u16::try_from(n)
            .map(Pattern::Exact)
            .map_err(|_| D::Error::custom(format!("{} does not fit in 16 bits", n))),
    }
}

/// Deserialize an event value, normalized to its unsigned 32-bit form.
pub(crate) fn de_value<'de, D>(deserializer: D) -> Result<Pattern<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match parse_pattern::<D::Error>(PatternRepr::deserialize(deserializer)?)? {
        Pattern::Any => Ok(Pattern::Any),
        Pattern::Exact(n) => normalize_configured(n)
            .map(Pattern::Exact)
            .ok_or_else(|| D::Error::custom(format!("{} is not a 32-bit event value", n))),
    }
}

/// Deserialize an exact-or-any string field (device name).
pub(crate) fn de_text<'de, D>(deserializer: D) -> Result<Pattern<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    if text.eq_ignore_ascii_case("any") {
        Ok(Pattern::Any)
    } else {
        Ok(Pattern::Exact(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "de_u16")]
        id: Pattern<u16>,
        #[serde(default, deserialize_with = "de_value")]
        value: Pattern<u32>,
    }

    fn probe(yaml: &str) -> Result<Probe, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn test_any_and_missing_are_wildcards() {
        let p = probe("id: any").unwrap();
        assert!(p.id.is_any());
        assert!(p.value.is_any());
        assert!(p.id.matches(&0));
        assert!(p.id.matches(&u16::MAX));
    }

    #[test]
    fn test_hex_and_decimal_agree() {
        assert_eq!(probe("id: \"0x046d\"").unwrap().id, Pattern::Exact(0x046d));
        assert_eq!(probe("id: 1133").unwrap().id, Pattern::Exact(0x046d));
        assert_eq!(probe("id: \"1133\"").unwrap().id, Pattern::Exact(0x046d));
    }

    #[test]
    fn test_negative_value_normalized() {
        let expected = Pattern::Exact(0xffff_ffffu32);
        assert_eq!(probe("value: -1").unwrap().value, expected);
        assert_eq!(probe("value: 4294967295").unwrap().value, expected);
        assert_eq!(probe("value: \"0xffffffff\"").unwrap().value, expected);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(probe("id: 65536").is_err());
        assert!(probe("id: -1").is_err());
        assert!(probe("value: 4294967296").is_err());
        assert!(probe("id: keyboard").is_err());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0X1F"), Some(31));
        assert_eq!(parse_number("-0x10"), Some(-16));
        assert_eq!(parse_number(" 42 "), Some(42));
        assert_eq!(parse_number("0xzz"), None);
    }
}
