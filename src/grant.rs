//! Grant sources module.
//!
//! A grant source is any rules component that hands out traits without a
//! player decision: races, subraces, classes, subclasses and backgrounds.
//! Grants from several sources are unioned by the compiler, never summed.

use crate::abilities::Ability;
use crate::choices::{Requirement, Source, SourcedRequirement};
use crate::proficiency::Skill;
use crate::rules::{BackgroundData, ClassData, FeatureGrant, RaceData, SubclassData, SubraceData};
use std::collections::BTreeMap;

/// A rules component that grants traits and declares choice slots.
///
/// Every method has an empty default so a component only overrides what
/// it actually provides.
///
/// # Examples
///
/// ```rust
/// use charsmith::grant::GrantSource;
/// use charsmith::rules::BackgroundData;
/// use charsmith::{Skill, Source};
///
/// let mut soldier = BackgroundData::new("soldier", "Soldier");
/// soldier.skills = vec![Skill::Athletics, Skill::Intimidation];
///
/// assert_eq!(soldier.source(), Source::Background);
/// assert_eq!(soldier.label(), "background:soldier");
/// assert_eq!(soldier.skills().len(), 2);
/// assert!(soldier.saving_throws().is_empty());
/// ```
pub trait GrantSource {
    /// Which kind of component this is.
    fn source(&self) -> Source;

    /// Component id, used in provenance labels.
    fn id(&self) -> &str;

    /// `source:id`, e.g. `race:half_orc`.
    fn label(&self) -> String {
        format!("{}:{}", self.source(), self.id())
    }

    fn ability_increases(&self) -> Option<&BTreeMap<Ability, i8>> {
        None
    }

    fn skills(&self) -> &[Skill] {
        &[]
    }

    fn languages(&self) -> &[String] {
        &[]
    }

    fn saving_throws(&self) -> &[Ability] {
        &[]
    }

    fn armor_proficiencies(&self) -> &[String] {
        &[]
    }

    fn weapon_proficiencies(&self) -> &[String] {
        &[]
    }

    fn tool_proficiencies(&self) -> &[String] {
        &[]
    }

    fn requirements(&self) -> &[Requirement] {
        &[]
    }

    fn features(&self) -> &[FeatureGrant] {
        &[]
    }

    /// Requirements tagged with this component's source.
    fn sourced_requirements(&self) -> Vec<SourcedRequirement> {
        self.requirements()
            .iter()
            .map(|r| SourcedRequirement::new(self.source(), r.clone()))
            .collect()
    }
}

impl GrantSource for RaceData {
    fn source(&self) -> Source {
        Source::Race
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn ability_increases(&self) -> Option<&BTreeMap<Ability, i8>> {
        Some(&self.ability_increases)
    }

    fn skills(&self) -> &[Skill] {
        &self.skills
    }

    fn languages(&self) -> &[String] {
        &self.languages
    }

    fn weapon_proficiencies(&self) -> &[String] {
        &self.weapon_proficiencies
    }

    fn tool_proficiencies(&self) -> &[String] {
        &self.tool_proficiencies
    }

    fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

impl GrantSource for SubraceData {
    fn source(&self) -> Source {
        Source::Race
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn ability_increases(&self) -> Option<&BTreeMap<Ability, i8>> {
        Some(&self.ability_increases)
    }

    fn skills(&self) -> &[Skill] {
        &self.skills
    }

    fn languages(&self) -> &[String] {
        &self.languages
    }

    fn weapon_proficiencies(&self) -> &[String] {
        &self.weapon_proficiencies
    }

    fn tool_proficiencies(&self) -> &[String] {
        &self.tool_proficiencies
    }

    fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

impl GrantSource for ClassData {
    fn source(&self) -> Source {
        Source::Class
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn skills(&self) -> &[Skill] {
        &self.skills
    }

    fn saving_throws(&self) -> &[Ability] {
        &self.saving_throws
    }

    fn armor_proficiencies(&self) -> &[String] {
        &self.armor_proficiencies
    }

    fn weapon_proficiencies(&self) -> &[String] {
        &self.weapon_proficiencies
    }

    fn tool_proficiencies(&self) -> &[String] {
        &self.tool_proficiencies
    }

    fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    fn features(&self) -> &[FeatureGrant] {
        &self.features
    }
}

impl GrantSource for SubclassData {
    fn source(&self) -> Source {
        Source::Class
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn skills(&self) -> &[Skill] {
        &self.skills
    }

    fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    fn features(&self) -> &[FeatureGrant] {
        &self.features
    }
}

impl GrantSource for BackgroundData {
    fn source(&self) -> Source {
        Source::Background
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn skills(&self) -> &[Skill] {
        &self.skills
    }

    fn languages(&self) -> &[String] {
        &self.languages
    }

    fn tool_proficiencies(&self) -> &[String] {
        &self.tool_proficiencies
    }

    fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choices::Category;

    #[test]
    fn test_race_grants() {
        let mut orc = RaceData::new("half_orc", "Half-Orc");
        orc.skills = vec![Skill::Intimidation];
        orc.ability_increases.insert(Ability::Strength, 2);
        assert_eq!(orc.label(), "race:half_orc");
        assert_eq!(orc.skills(), &[Skill::Intimidation]);
        assert_eq!(orc.ability_increases().unwrap()[&Ability::Strength], 2);
    }

    #[test]
    fn test_class_defaults_and_requirements() {
        let mut barbarian = ClassData::new("barbarian", "Barbarian", 12);
        barbarian.requirements.push(Requirement::new(
            "barbarian_skills",
            "Skills",
            Category::Skills,
            2,
        ));
        assert!(barbarian.ability_increases().is_none());
        assert!(barbarian.languages().is_empty());
        let sourced = barbarian.sourced_requirements();
        assert_eq!(sourced.len(), 1);
        assert_eq!(sourced[0].source, Source::Class);
    }
}
