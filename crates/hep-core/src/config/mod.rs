// Hep Config
// YAML rule blocks: device filters and key rules

mod pattern;
pub mod rules;

pub use pattern::Pattern;
pub use rules::{ConfigError, DeviceFilter, KeyRule, RuleBlock, RuleSet};
