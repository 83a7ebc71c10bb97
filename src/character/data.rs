//! Persisted character shape and the small value types it is built from.

use crate::abilities::{Ability, AbilityScores};
use crate::choices::ChoiceData;
use crate::entity::EntityRecord;
use crate::ids::EntityId;
use crate::proficiency::{ProficiencyLevel, Skill};
use crate::provenance::Provenance;
use crate::resource::RecoverableResource;
use crate::rules::{ItemData, ItemKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Where an item can be worn or wielded.
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
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EquipmentSlot {
    MainHand,
    OffHand,
    Armor,
}

impl EquipmentSlot {
    /// Whether `item` fits this slot at all.
    pub fn accepts(self, item: &ItemData) -> bool {
        match (self, &item.kind) {
            (EquipmentSlot::MainHand, ItemKind::Weapon { .. }) => true,
            (EquipmentSlot::OffHand, ItemKind::Weapon { two_handed, .. }) => !two_handed,
            (EquipmentSlot::OffHand, ItemKind::Shield { .. }) => true,
            (EquipmentSlot::Armor, ItemKind::Armor { .. }) => true,
            _ => false,
        }
    }
}

/// An inventory entry. Item data is carried along so a loaded character
/// needs no catalog to fight or compute armor class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item: ItemData,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellSlots {
    pub maximum: u32,
    pub used: u32,
}

impl SpellSlots {
    pub fn remaining(&self) -> u32 {
        self.maximum.saturating_sub(self.used)
    }
}

/// Death saving throws made while at 0 hit points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSaves {
    pub successes: u8,
    pub failures: u8,
}

/// Where a dying character stands after a death save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeathSaveStatus {
    Dying,
    Stable,
    Dead,
}

impl DeathSaves {
    pub const LIMIT: u8 = 3;

    pub fn status(&self) -> DeathSaveStatus {
        if self.failures >= Self::LIMIT {
            DeathSaveStatus::Dead
        } else if self.successes >= Self::LIMIT {
            DeathSaveStatus::Stable
        } else {
            DeathSaveStatus::Dying
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Outcome of [`Character::attack`](super::Character::attack).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackResult {
    pub weapon_id: String,
    pub ability: Ability,
    pub proficient: bool,
    pub attack_bonus: i32,
    pub damage_bonus: i32,
}

/// Everything about a character except its live entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub id: EntityId,
    pub player_id: String,
    pub name: String,
    pub level: u8,
    pub proficiency_bonus: i32,
    pub race_id: String,
    pub subrace_id: Option<String>,
    pub class_id: String,
    pub subclass_id: Option<String>,
    pub background_id: String,
    pub speed: u32,
    pub ability_scores: AbilityScores,
    pub hit_points: u32,
    pub max_hit_points: u32,
    /// Armor class as of the last snapshot. Live values come from
    /// `Character::armor_class`.
    pub armor_class: i32,
    pub hit_die: u8,
    pub skills: BTreeMap<Skill, ProficiencyLevel>,
    pub saving_throws: BTreeMap<Ability, ProficiencyLevel>,
    pub languages: BTreeSet<String>,
    pub armor_proficiencies: BTreeSet<String>,
    pub weapon_proficiencies: BTreeSet<String>,
    pub tool_proficiencies: BTreeSet<String>,
    pub inventory: BTreeMap<String, InventoryItem>,
    pub equipped: BTreeMap<EquipmentSlot, String>,
    pub spell_slots: BTreeMap<u8, SpellSlots>,
    pub spells: BTreeSet<String>,
    pub cantrips: BTreeSet<String>,
    pub resources: BTreeMap<String, RecoverableResource>,
    pub death_saves: DeathSaves,
    pub choices: Vec<ChoiceData>,
    pub provenance: Provenance,
}

impl CharacterSheet {
    pub fn skill_level(&self, skill: Skill) -> ProficiencyLevel {
        self.skills.get(&skill).copied().unwrap_or_default()
    }

    /// Ability modifier plus proficiency scaled by level of training.
    pub fn skill_modifier(&self, skill: Skill) -> i32 {
        self.ability_scores.modifier(skill.ability())
            + self.skill_level(skill).multiplier() * self.proficiency_bonus
    }

    pub fn saving_throw_modifier(&self, ability: Ability) -> i32 {
        let level = self.saving_throws.get(&ability).copied().unwrap_or_default();
        self.ability_scores.modifier(ability) + level.multiplier() * self.proficiency_bonus
    }

    pub fn equipped_item(&self, slot: EquipmentSlot) -> Option<&ItemData> {
        self.equipped
            .get(&slot)
            .and_then(|id| self.inventory.get(id))
            .map(|entry| &entry.item)
    }

    /// A weapon is proficient when its id or its category is listed.
    pub fn is_proficient_with(&self, item: &ItemData) -> bool {
        match &item.kind {
            ItemKind::Weapon { category, .. } => {
                self.weapon_proficiencies.contains(category)
                    || self.weapon_proficiencies.contains(&item.id)
            }
            ItemKind::Armor { category, .. } => {
                self.armor_proficiencies.contains(category)
                    || self.armor_proficiencies.contains(&item.id)
            }
            ItemKind::Shield { .. } => self.armor_proficiencies.contains("shield"),
            ItemKind::Gear => true,
        }
    }

    /// Armor class from equipment alone, before conditions.
    pub fn base_armor_class(&self) -> i32 {
        let dex = self.ability_scores.modifier(Ability::Dexterity);
        let body = match self.equipped_item(EquipmentSlot::Armor).map(|i| &i.kind) {
            Some(ItemKind::Armor {
                base_ac,
                max_dex_bonus,
                ..
            }) => base_ac + max_dex_bonus.map_or(dex, |cap| dex.min(cap)),
            _ => 10 + dex,
        };
        body + self.shield_bonus()
    }

    pub fn shield_bonus(&self) -> i32 {
        match self.equipped_item(EquipmentSlot::OffHand).map(|i| &i.kind) {
            Some(ItemKind::Shield { bonus }) => *bonus,
            _ => 0,
        }
    }

    pub fn wearing_armor(&self) -> bool {
        self.equipped_item(EquipmentSlot::Armor).is_some()
    }

    /// Pull every bounded counter back within its limit.
    ///
    /// Returns `true` if anything had to change.
    pub fn clamp_counters(&mut self) -> bool {
        let mut clamped = false;
        if self.hit_points > self.max_hit_points {
            self.hit_points = self.max_hit_points;
            clamped = true;
        }
        for slots in self.spell_slots.values_mut() {
            if slots.used > slots.maximum {
                slots.used = slots.maximum;
                clamped = true;
            }
        }
        let saves = &mut self.death_saves;
        if saves.successes > DeathSaves::LIMIT || saves.failures > DeathSaves::LIMIT {
            saves.successes = saves.successes.min(DeathSaves::LIMIT);
            saves.failures = saves.failures.min(DeathSaves::LIMIT);
            clamped = true;
        }
        clamped
    }
}

/// Persisted form of a character.
///
/// Conditions, features and actions are stored as `{ref, payload}` records
/// and rebuilt through a [`Registry`](crate::entity::Registry) on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterData {
    pub sheet: CharacterSheet,
    #[serde(default)]
    pub conditions: Vec<EntityRecord>,
    #[serde(default)]
    pub features: Vec<EntityRecord>,
    #[serde(default)]
    pub actions: Vec<EntityRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_compatibility() {
        let axe = ItemData::weapon("greataxe", "Greataxe", "martial", true)
            .with_weapon_properties(false, true);
        let dagger = ItemData::weapon("dagger", "Dagger", "simple", true);
        let shield = ItemData::shield("shield", "Shield", 2);
        let hide = ItemData::armor("hide", "Hide", "medium", 12, Some(2));

        assert!(EquipmentSlot::MainHand.accepts(&axe));
        assert!(!EquipmentSlot::OffHand.accepts(&axe));
        assert!(EquipmentSlot::OffHand.accepts(&dagger));
        assert!(EquipmentSlot::OffHand.accepts(&shield));
        assert!(!EquipmentSlot::MainHand.accepts(&shield));
        assert!(EquipmentSlot::Armor.accepts(&hide));
        assert!(!EquipmentSlot::Armor.accepts(&dagger));
    }

    #[test]
    fn test_death_save_status() {
        let mut saves = DeathSaves::default();
        assert_eq!(saves.status(), DeathSaveStatus::Dying);
        saves.successes = 3;
        assert_eq!(saves.status(), DeathSaveStatus::Stable);
        saves.failures = 3;
        assert_eq!(saves.status(), DeathSaveStatus::Dead);
        saves.clear();
        assert_eq!(saves, DeathSaves::default());
    }

    #[test]
    fn test_spell_slots_remaining() {
        let slots = SpellSlots {
            maximum: 2,
            used: 3,
        };
        assert_eq!(slots.remaining(), 0);
    }
}
