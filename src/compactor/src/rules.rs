//! Validated retention rule set.

use common::config::{CompactionConfig, RetentionRule};
use thiserror::Error;

/// Ordered collection of retention rules, validated at construction.
///
/// Rules are applied in the supplied order, youngest age band first. The
/// ordering itself is trusted as configured; each band is validated
/// individually. A validation failure is fatal for the whole invocation:
/// no deletion happens under a malformed rule table.
#[derive(Clone, Debug)]
pub struct RetentionRuleSet {
    rules: Vec<RetentionRule>,
}

impl RetentionRuleSet {
    /// Build a rule set from configuration, rejecting malformed rules.
    pub fn from_config(config: &CompactionConfig) -> Result<Self, RuleSetError> {
        Self::new(config.rules.clone())
    }

    pub fn new(rules: Vec<RetentionRule>) -> Result<Self, RuleSetError> {
        for (index, rule) in rules.iter().enumerate() {
            if rule.window_size_minutes == 0 {
                return Err(RuleSetError::EmptyWindow { index });
            }
            if let Some(end) = rule.end_offset_minutes
                && end <= rule.start_offset_minutes
            {
                return Err(RuleSetError::InvertedBand {
                    index,
                    start_offset_minutes: rule.start_offset_minutes,
                    end_offset_minutes: end,
                });
            }
        }

        Ok(Self { rules })
    }

    /// Rules in their defined order.
    pub fn rules(&self) -> &[RetentionRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

/// Errors raised by retention rule validation.
#[derive(Error, Debug)]
pub enum RuleSetError {
    /// Window size must be positive.
    #[error("retention rule #{index}: window size must be positive")]
    EmptyWindow { index: usize },

    /// A bounded band must end strictly after it starts.
    #[error(
        "retention rule #{index}: band [{start_offset_minutes}m, {end_offset_minutes}m) is empty or inverted"
    )]
    InvertedBand {
        index: usize,
        start_offset_minutes: u32,
        end_offset_minutes: u32,
    },
}
