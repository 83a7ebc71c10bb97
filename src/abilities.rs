//! Ability scores module.
//!
//! The six abilities, their scores and modifiers, and the generation
//! methods a draft accepts for base scores.

use crate::config::EngineConfig;
use crate::error::RulesError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

/// One of the six abilities.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    /// The three-letter short form (`str`, `dex`, ...).
    pub fn short(self) -> &'static str {
        match self {
            Ability::Strength => "str",
            Ability::Dexterity => "dex",
            Ability::Constitution => "con",
            Ability::Intelligence => "int",
            Ability::Wisdom => "wis",
            Ability::Charisma => "cha",
        }
    }
}

/// Modifier for a raw score: `floor((score - 10) / 2)`.
///
/// # Examples
///
/// ```rust
/// use charsmith::abilities::modifier;
///
/// assert_eq!(modifier(16), 3);
/// assert_eq!(modifier(10), 0);
/// assert_eq!(modifier(9), -1);
/// assert_eq!(modifier(1), -5);
/// ```
pub fn modifier(score: u8) -> i32 {
    (i32::from(score) - 10).div_euclid(2)
}

/// A full set of six ability scores.
///
/// # Examples
///
/// ```rust
/// use charsmith::{Ability, AbilityScores};
///
/// let scores = AbilityScores::new(16, 14, 14, 8, 12, 10);
/// assert_eq!(scores.get(Ability::Strength), 16);
/// assert_eq!(scores.modifier(Ability::Strength), 3);
/// assert_eq!(scores.modifier(Ability::Intelligence), -1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

impl AbilityScores {
    /// Create scores in the canonical STR, DEX, CON, INT, WIS, CHA order.
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    /// Build from a per-ability map. Every ability must be present.
    pub fn from_map(map: &BTreeMap<Ability, u8>) -> Result<Self, RulesError> {
        let mut scores = Self::default();
        for ability in Ability::iter() {
            let value = map.get(&ability).copied().ok_or_else(|| {
                RulesError::invalid("ability_scores", format!("missing {}", ability))
            })?;
            scores.set(ability, value);
        }
        Ok(scores)
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: u8) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        modifier(self.get(ability))
    }

    /// Apply an increase, capping the result at `ceiling`.
    ///
    /// Returns `true` when the cap was hit.
    pub fn increase_capped(&mut self, ability: Ability, amount: i8, ceiling: u8) -> bool {
        let raw = i32::from(self.get(ability)) + i32::from(amount);
        let capped = raw.clamp(1, i32::from(ceiling));
        // clamp keeps the value inside u8 range
        self.set(ability, capped as u8);
        raw > i32::from(ceiling)
    }

    /// Iterate `(ability, score)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Ability, u8)> + '_ {
        Ability::iter().map(move |a| (a, self.get(a)))
    }
}

/// How base scores were generated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoreMethod {
    /// A permutation of 15, 14, 13, 12, 10, 8.
    StandardArray,
    /// Scores 8 to 15 bought from a fixed budget.
    PointBuy,
    /// Rolled or otherwise entered by hand; only range checked.
    Manual,
}

pub const STANDARD_ARRAY: [u8; 6] = [15, 14, 13, 12, 10, 8];

/// Point-buy cost of a single score, or `None` outside 8..=15.
pub fn point_buy_cost(score: u8) -> Option<u32> {
    match score {
        8 => Some(0),
        9 => Some(1),
        10 => Some(2),
        11 => Some(3),
        12 => Some(4),
        13 => Some(5),
        14 => Some(7),
        15 => Some(9),
        _ => None,
    }
}

impl ScoreMethod {
    /// Check base scores against this method's rules.
    pub fn validate(self, scores: &AbilityScores, config: &EngineConfig) -> Result<(), RulesError> {
        match self {
            ScoreMethod::StandardArray => {
                let mut given: Vec<u8> = scores.iter().map(|(_, v)| v).collect();
                given.sort_unstable_by(|a, b| b.cmp(a));
                if given != STANDARD_ARRAY {
                    return Err(RulesError::invalid(
                        "ability_scores",
                        "standard array must use 15, 14, 13, 12, 10, 8 exactly once",
                    ));
                }
            }
            ScoreMethod::PointBuy => {
                let mut spent = 0;
                for (ability, value) in scores.iter() {
                    let cost = point_buy_cost(value).ok_or_else(|| {
                        RulesError::invalid(
                            "ability_scores",
                            format!("point buy {} must be between 8 and 15, got {}", ability, value),
                        )
                    })?;
                    spent += cost;
                }
                if spent > config.point_buy_budget {
                    return Err(RulesError::invalid(
                        "ability_scores",
                        format!(
                            "point buy spends {} of {} points",
                            spent, config.point_buy_budget
                        ),
                    ));
                }
            }
            ScoreMethod::Manual => {
                for (ability, value) in scores.iter() {
                    if value < config.min_ability_score || value > config.max_ability_score {
                        return Err(RulesError::invalid(
                            "ability_scores",
                            format!(
                                "{} must be between {} and {}, got {}",
                                ability, config.min_ability_score, config.max_ability_score, value
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_rounds_down() {
        assert_eq!(modifier(8), -1);
        assert_eq!(modifier(17), 3);
        assert_eq!(modifier(20), 5);
        assert_eq!(modifier(3), -4);
    }

    #[test]
    fn test_ability_parse_is_case_insensitive() {
        assert_eq!("Strength".parse::<Ability>().unwrap(), Ability::Strength);
        assert_eq!(Ability::Wisdom.to_string(), "wisdom");
        assert_eq!(Ability::Charisma.short(), "cha");
    }

    #[test]
    fn test_increase_capped() {
        let mut scores = AbilityScores::new(19, 10, 10, 10, 10, 10);
        assert!(scores.increase_capped(Ability::Strength, 2, 20));
        assert_eq!(scores.strength, 20);
        assert!(!scores.increase_capped(Ability::Dexterity, 1, 20));
        assert_eq!(scores.dexterity, 11);
    }

    #[test]
    fn test_standard_array() {
        let config = EngineConfig::default();
        let ok = AbilityScores::new(8, 15, 13, 14, 10, 12);
        assert!(ScoreMethod::StandardArray.validate(&ok, &config).is_ok());
        let bad = AbilityScores::new(15, 15, 13, 12, 10, 8);
        assert!(ScoreMethod::StandardArray.validate(&bad, &config).is_err());
    }

    #[test]
    fn test_point_buy_budget() {
        let config = EngineConfig::default();
        // 9 + 7 + 7 + 0 + 2 + 2 = 27
        let ok = AbilityScores::new(15, 14, 14, 8, 10, 10);
        assert!(ScoreMethod::PointBuy.validate(&ok, &config).is_ok());
        let over = AbilityScores::new(15, 15, 15, 8, 10, 10);
        assert!(ScoreMethod::PointBuy.validate(&over, &config).is_err());
        let out_of_range = AbilityScores::new(16, 8, 8, 8, 8, 8);
        assert!(ScoreMethod::PointBuy.validate(&out_of_range, &config).is_err());
    }

    #[test]
    fn test_manual_range() {
        let config = EngineConfig::default();
        assert!(ScoreMethod::Manual
            .validate(&AbilityScores::new(18, 3, 10, 10, 10, 10), &config)
            .is_ok());
        assert!(ScoreMethod::Manual
            .validate(&AbilityScores::new(2, 10, 10, 10, 10, 10), &config)
            .is_err());
    }

    #[test]
    fn test_from_map_requires_all() {
        let mut map = BTreeMap::new();
        map.insert(Ability::Strength, 12);
        assert!(AbilityScores::from_map(&map).is_err());
        for a in Ability::iter() {
            map.insert(a, 11);
        }
        assert_eq!(AbilityScores::from_map(&map).unwrap().wisdom, 11);
    }
}
