// Hep Match Engine
// Classifies (device, event) pairs against the rule set

use std::sync::Arc;

use crate::config::{RuleBlock, RuleSet};
use crate::input::{DeviceIdentity, RawEvent};

/// One rule block firing for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firing {
    /// Index of the block in the rule set
    pub block: usize,
    /// Fresh copy of the matched command template
    pub command: Vec<String>,
    pub background: bool,
}

/// Evaluates every rule block independently against an event.
#[derive(Debug, Clone)]
pub struct MatchEngine {
    rules: Arc<RuleSet>,
}

impl MatchEngine {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    /// Every block that fires for `event` on `device`, in configuration order.
    ///
    /// A block fires at most once (its first matching key rule), but any
    /// number of blocks may fire for the same event.
    pub fn classify(&self, device: &DeviceIdentity, event: &RawEvent) -> Vec<Firing> {
        let firings: Vec<Firing> = self
            .rules
            .iter()
            .enumerate()
            .filter_map(|(index, block)| fire(index, block, device, event))
            .collect();

        if firings.is_empty() {
            if event.is_sync() {
                log::trace!("Non-matching event {}: {}", device.path.display(), event);
            } else {
                log::debug!("Non-matching event {}: {}", device.path.display(), event);
            }
        }

        firings
    }
}

fn fire(index: usize, block: &RuleBlock, device: &DeviceIdentity, event: &RawEvent) -> Option<Firing> {
    // Device filter first; it is the cheap reject
    if !block.device.matches(device) {
        return None;
    }

    block.first_match(event).map(|rule| Firing {
        block: index,
        command: rule.command.clone(),
        background: rule.background,
    })
}
