//! Engine configuration module.
//!
//! `EngineConfig` collects the tunables shared by drafts, the compiler and
//! the runtime bus. Every field has a default, so a partial JSON document
//! only needs to name what it overrides.

use crate::error::RulesError;
use serde::{Deserialize, Serialize};

/// Tunables for character creation and the runtime lifecycle.
///
/// # Examples
///
/// ```rust
/// use charsmith::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "starting_level": 3 }"#).unwrap();
/// assert_eq!(config.starting_level, 3);
/// assert_eq!(config.trade_language, "common");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Level a freshly compiled character starts at.
    pub starting_level: u8,
    /// Language every character speaks regardless of race or background.
    pub trade_language: String,
    pub min_ability_score: u8,
    /// Creation ceiling; racial increases past it are capped.
    pub max_ability_score: u8,
    pub point_buy_budget: u32,
    /// Maximum nested publish depth before the bus refuses to dispatch.
    pub max_event_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_level: 1,
            trade_language: String::from("common"),
            min_ability_score: 3,
            max_ability_score: 20,
            point_buy_budget: 27,
            max_event_depth: 10,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON, filling omitted fields with defaults.
    ///
    /// Fails if the document is malformed or the values are inconsistent.
    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configured values are usable.
    pub fn validate(&self) -> Result<(), RulesError> {
        if !(1..=20).contains(&self.starting_level) {
            return Err(RulesError::invalid(
                "starting_level",
                "must be between 1 and 20",
            ));
        }
        if self.trade_language.trim().is_empty() {
            return Err(RulesError::invalid("trade_language", "must not be empty"));
        }
        if self.min_ability_score > self.max_ability_score {
            return Err(RulesError::invalid(
                "min_ability_score",
                "must not exceed max_ability_score",
            ));
        }
        if self.max_event_depth == 0 {
            return Err(RulesError::invalid("max_event_depth", "must be positive"));
        }
        Ok(())
    }
}
