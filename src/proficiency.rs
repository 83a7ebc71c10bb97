//! Proficiency module.
//!
//! Skills, proficiency levels and the rule for combining grants from
//! several sources. Grants of the same skill never add up: the strongest
//! level wins.

use crate::abilities::Ability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The eighteen skills, each keyed to an ability.
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
pub enum Skill {
    Acrobatics,
    AnimalHandling,
    Arcana,
    Athletics,
    Deception,
    History,
    Insight,
    Intimidation,
    Investigation,
    Medicine,
    Nature,
    Perception,
    Performance,
    Persuasion,
    Religion,
    SleightOfHand,
    Stealth,
    Survival,
}

impl Skill {
    /// The ability this skill is rolled with.
    pub fn ability(self) -> Ability {
        match self {
            Skill::Athletics => Ability::Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Ability::Dexterity,
            Skill::Arcana
            | Skill::History
            | Skill::Investigation
            | Skill::Nature
            | Skill::Religion => Ability::Intelligence,
            Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Ability::Wisdom,
            Skill::Deception | Skill::Intimidation | Skill::Performance | Skill::Persuasion => {
                Ability::Charisma
            }
        }
    }
}

/// How well a character knows a skill or save.
///
/// Ordered so that `max` picks the strongest grant.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyLevel {
    #[default]
    None,
    Proficient,
    Expertise,
}

impl ProficiencyLevel {
    /// Multiplier applied to the proficiency bonus.
    pub fn multiplier(self) -> i32 {
        match self {
            ProficiencyLevel::None => 0,
            ProficiencyLevel::Proficient => 1,
            ProficiencyLevel::Expertise => 2,
        }
    }

    /// Combine two grants for the same skill.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use charsmith::ProficiencyLevel;
    ///
    /// let merged = ProficiencyLevel::Proficient.stack(ProficiencyLevel::Proficient);
    /// assert_eq!(merged, ProficiencyLevel::Proficient);
    /// assert_eq!(
    ///     ProficiencyLevel::Expertise.stack(ProficiencyLevel::Proficient),
    ///     ProficiencyLevel::Expertise
    /// );
    /// ```
    pub fn stack(self, other: ProficiencyLevel) -> ProficiencyLevel {
        self.max(other)
    }
}

/// Record a grant, keeping the strongest level already present.
pub fn grant<K: Ord>(map: &mut BTreeMap<K, ProficiencyLevel>, key: K, level: ProficiencyLevel) {
    let entry = map.entry(key).or_default();
    *entry = entry.stack(level);
}

/// Proficiency bonus for a level: `2 + (level - 1) / 4`.
pub fn proficiency_bonus(level: u8) -> i32 {
    2 + (i32::from(level.max(1)) - 1) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_parse_snake_case() {
        assert_eq!("sleight_of_hand".parse::<Skill>().unwrap(), Skill::SleightOfHand);
        assert_eq!("Athletics".parse::<Skill>().unwrap(), Skill::Athletics);
        assert_eq!(Skill::AnimalHandling.to_string(), "animal_handling");
        assert!("juggling".parse::<Skill>().is_err());
    }

    #[test]
    fn test_skill_abilities() {
        assert_eq!(Skill::Athletics.ability(), Ability::Strength);
        assert_eq!(Skill::Stealth.ability(), Ability::Dexterity);
        assert_eq!(Skill::Perception.ability(), Ability::Wisdom);
    }

    #[test]
    fn test_grant_never_double_stacks() {
        let mut map = BTreeMap::new();
        grant(&mut map, Skill::Athletics, ProficiencyLevel::Proficient);
        grant(&mut map, Skill::Athletics, ProficiencyLevel::Proficient);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&Skill::Athletics], ProficiencyLevel::Proficient);

        grant(&mut map, Skill::Athletics, ProficiencyLevel::Expertise);
        grant(&mut map, Skill::Athletics, ProficiencyLevel::Proficient);
        assert_eq!(map[&Skill::Athletics], ProficiencyLevel::Expertise);
    }

    #[test]
    fn test_proficiency_bonus_by_level() {
        assert_eq!(proficiency_bonus(1), 2);
        assert_eq!(proficiency_bonus(4), 2);
        assert_eq!(proficiency_bonus(5), 3);
        assert_eq!(proficiency_bonus(9), 4);
        assert_eq!(proficiency_bonus(17), 6);
    }
}
