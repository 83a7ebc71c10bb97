//! Character runtime.
//!
//! A [`Character`] is the finalized aggregate: the compiled sheet plus the
//! live conditions, features and actions attached to it. Play operations
//! (attacks, damage, rests, feature activation) mutate it directly and
//! announce themselves on the event bus; reactions to events published by
//! others are handled by the lifecycle in [`lifecycle`].
//!
//! The character never holds its own lock while publishing, so handlers
//! triggered by its events can safely call back into it.

pub mod data;
mod lifecycle;

pub use data::{
    AttackResult, CharacterData, CharacterSheet, DeathSaveStatus, DeathSaves, EquipmentSlot,
    InventoryItem, SpellSlots,
};

use crate::abilities::{Ability, AbilityScores};
use crate::bus::{EventBus, GameEvent, SubscriptionId};
use crate::conditions::Unconscious;
use crate::entity::{
    refs, Action, Activation, ArmorContext, AttackContext, Condition, EntityContext, Feature,
    Lifecycle, Registry,
};
use crate::error::RulesError;
use crate::ids::{EntityId, Ref};
use crate::proficiency::{ProficiencyLevel, Skill};
use crate::resource::{RecoverableResource, RestType};
use crate::rules::ItemKind;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock(state: &Mutex<CharacterState>) -> MutexGuard<'_, CharacterState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct CharacterState {
    sheet: CharacterSheet,
    conditions: Vec<Box<dyn Condition>>,
    features: Vec<Box<dyn Feature>>,
    actions: Vec<Box<dyn Action>>,
    registry: Arc<Registry>,
    bus: Option<Arc<dyn EventBus>>,
    subscriptions: Vec<SubscriptionId>,
}

impl CharacterState {
    fn has_condition(&self, entity_ref: &Ref) -> bool {
        self.conditions.iter().any(|c| c.entity_ref() == entity_ref)
    }

    fn take_condition(&mut self, entity_ref: &Ref) -> Option<Box<dyn Condition>> {
        let index = self
            .conditions
            .iter()
            .position(|c| c.entity_ref() == entity_ref)?;
        Some(self.conditions.remove(index))
    }

    fn take_action(&mut self, entity_ref: &Ref) -> Option<Box<dyn Action>> {
        let index = self.actions.iter().position(|a| a.entity_ref() == entity_ref)?;
        Some(self.actions.remove(index))
    }

    fn take_temporary_actions(&mut self) -> Vec<Box<dyn Action>> {
        let (temporary, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.actions)
            .into_iter()
            .partition(|a| a.is_temporary());
        self.actions = kept;
        temporary
    }

    fn armor_class(&self) -> i32 {
        let armor = ArmorContext {
            scores: self.sheet.ability_scores,
            wearing_armor: self.sheet.wearing_armor(),
            shield_bonus: self.sheet.shield_bonus(),
        };
        self.conditions
            .iter()
            .fold(self.sheet.base_armor_class(), |ac, c| c.modify_armor_class(&armor, ac))
    }

    /// Heal, clamped to maximum. Returns the unconscious condition if the
    /// character came back from 0 hit points.
    fn apply_healing(&mut self, amount: u32) -> Option<Box<dyn Condition>> {
        let was_down = self.sheet.hit_points == 0;
        self.sheet.hit_points = self
            .sheet
            .hit_points
            .saturating_add(amount)
            .min(self.sheet.max_hit_points);
        tracing::debug!(
            character_id = %self.sheet.id,
            amount,
            hit_points = self.sheet.hit_points,
            "healed"
        );
        if self.sheet.hit_points == 0 {
            return None;
        }
        self.sheet.death_saves.clear();
        if was_down {
            self.take_condition(&refs::unconscious())
        } else {
            None
        }
    }

    /// Recover resources for `rest`. A long rest also restores hit points,
    /// clears death saves and resets spell slots.
    fn apply_rest(&mut self, rest: RestType) -> Option<Box<dyn Condition>> {
        let mut recovered = 0;
        for resource in self.sheet.resources.values_mut() {
            if resource.on_rest(rest) {
                recovered += 1;
            }
        }
        tracing::debug!(character_id = %self.sheet.id, %rest, recovered, "rest");
        if rest != RestType::LongRest {
            return None;
        }
        for slots in self.sheet.spell_slots.values_mut() {
            slots.used = 0;
        }
        let missing = self.sheet.max_hit_points.saturating_sub(self.sheet.hit_points);
        let lifted = self.apply_healing(missing);
        self.sheet.death_saves.clear();
        lifted
    }
}

/// A compiled character with its runtime state.
///
/// Build one with [`Draft::to_character`](crate::draft::Draft::to_character)
/// or [`Character::load`]. Call [`Character::cleanup`] when the play
/// session ends; dropping an active character leaves its subscriptions on
/// the bus as inert no-ops.
pub struct Character {
    id: EntityId,
    state: Arc<Mutex<CharacterState>>,
}

impl fmt::Debug for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Character")
            .field("id", &self.id)
            .field("level", &state.sheet.level)
            .field("hit_points", &state.sheet.hit_points)
            .field("active", &state.bus.is_some())
            .finish_non_exhaustive()
    }
}

impl Character {
    /// Rebuild a character from persisted data without activating it.
    pub fn from_data(data: CharacterData, registry: Arc<Registry>) -> Result<Self, RulesError> {
        let CharacterData {
            mut sheet,
            conditions,
            features,
            actions,
        } = data;
        if sheet.id.is_empty() {
            return Err(RulesError::invalid("id", "must not be empty"));
        }
        if sheet.clamp_counters() {
            tracing::warn!(character_id = %sheet.id, "persisted counters out of range, clamped");
        }
        let ctx = EntityContext {
            owner: sheet.id.clone(),
            level: sheet.level,
        };
        let conditions = conditions
            .iter()
            .map(|r| registry.build_condition(r, &ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let features = features
            .iter()
            .map(|r| registry.build_feature(r, &ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let actions = actions
            .iter()
            .map(|r| registry.build_action(r, &ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: sheet.id.clone(),
            state: Arc::new(Mutex::new(CharacterState {
                sheet,
                conditions,
                features,
                actions,
                registry,
                bus: None,
                subscriptions: Vec::new(),
            })),
        })
    }

    /// Rebuild a character and activate it on `bus`.
    ///
    /// Fails without leaving anything registered if any entity cannot be
    /// rebuilt or applied.
    pub fn load(
        data: CharacterData,
        registry: Arc<Registry>,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self, RulesError> {
        let character = Self::from_data(data, registry)?;
        character.activate(bus)?;
        Ok(character)
    }

    /// Snapshot the character into its persisted form.
    pub fn to_data(&self) -> Result<CharacterData, RulesError> {
        let state = self.lock();
        let mut sheet = state.sheet.clone();
        sheet.armor_class = state.armor_class();
        Ok(CharacterData {
            sheet,
            conditions: state
                .conditions
                .iter()
                .map(|c| c.to_record())
                .collect::<Result<_, _>>()?,
            features: state
                .features
                .iter()
                .map(|f| f.to_record())
                .collect::<Result<_, _>>()?,
            actions: state
                .actions
                .iter()
                .map(|a| a.to_record())
                .collect::<Result<_, _>>()?,
        })
    }

    fn lock(&self) -> MutexGuard<'_, CharacterState> {
        lock(&self.state)
    }

    fn bus(&self) -> Option<Arc<dyn EventBus>> {
        self.lock().bus.clone()
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.lock().bus.is_some()
    }

    /// A copy of the current sheet.
    pub fn sheet(&self) -> CharacterSheet {
        self.lock().sheet.clone()
    }

    pub fn name(&self) -> String {
        self.lock().sheet.name.clone()
    }

    pub fn level(&self) -> u8 {
        self.lock().sheet.level
    }

    pub fn proficiency_bonus(&self) -> i32 {
        self.lock().sheet.proficiency_bonus
    }

    pub fn ability_scores(&self) -> AbilityScores {
        self.lock().sheet.ability_scores
    }

    pub fn hit_points(&self) -> u32 {
        self.lock().sheet.hit_points
    }

    pub fn max_hit_points(&self) -> u32 {
        self.lock().sheet.max_hit_points
    }

    pub fn skill(&self, skill: Skill) -> ProficiencyLevel {
        self.lock().sheet.skill_level(skill)
    }

    /// Check modifier for `skill`, including proficiency or expertise.
    pub fn skill_modifier(&self, skill: Skill) -> i32 {
        self.lock().sheet.skill_modifier(skill)
    }

    pub fn saving_throw_modifier(&self, ability: Ability) -> i32 {
        self.lock().sheet.saving_throw_modifier(ability)
    }

    pub fn languages(&self) -> BTreeSet<String> {
        self.lock().sheet.languages.clone()
    }

    pub fn resource(&self, id: &str) -> Option<RecoverableResource> {
        self.lock().sheet.resources.get(id).cloned()
    }

    pub fn spell_slots(&self) -> BTreeMap<u8, SpellSlots> {
        self.lock().sheet.spell_slots.clone()
    }

    pub fn death_saves(&self) -> DeathSaves {
        self.lock().sheet.death_saves
    }

    pub fn equipped(&self, slot: EquipmentSlot) -> Option<String> {
        self.lock().sheet.equipped.get(&slot).cloned()
    }

    /// Refs of active conditions, in the order they were applied.
    pub fn condition_refs(&self) -> Vec<Ref> {
        self.lock()
            .conditions
            .iter()
            .map(|c| c.entity_ref().clone())
            .collect()
    }

    pub fn has_condition(&self, entity_ref: &Ref) -> bool {
        self.lock().has_condition(entity_ref)
    }

    pub fn feature_refs(&self) -> Vec<Ref> {
        self.lock()
            .features
            .iter()
            .map(|f| f.entity_ref().clone())
            .collect()
    }

    pub fn action_refs(&self) -> Vec<Ref> {
        self.lock()
            .actions
            .iter()
            .map(|a| a.entity_ref().clone())
            .collect()
    }

    /// Armor class from equipment, adjusted by active conditions.
    pub fn armor_class(&self) -> i32 {
        self.lock().armor_class()
    }

    /// Equip an inventory item.
    ///
    /// The item must fit the slot, and each copy can only be in one slot.
    /// A two-handed weapon needs the off hand free.
    pub fn equip(&self, slot: EquipmentSlot, item_id: &str) -> Result<(), RulesError> {
        let mut state = self.lock();
        let sheet = &mut state.sheet;
        let not_equippable = || RulesError::NotEquippable {
            item: item_id.to_string(),
            slot: slot.to_string(),
        };
        let entry = sheet
            .inventory
            .get(item_id)
            .ok_or_else(|| RulesError::ItemNotInInventory(item_id.to_string()))?;
        if !slot.accepts(&entry.item) {
            return Err(not_equippable());
        }
        let in_other_slots = sheet
            .equipped
            .iter()
            .filter(|(s, id)| **s != slot && id.as_str() == item_id)
            .count();
        if in_other_slots as u32 >= entry.quantity {
            return Err(not_equippable());
        }
        let two_handed = |kind: &ItemKind| matches!(kind, ItemKind::Weapon { two_handed: true, .. });
        let blocked = match slot {
            EquipmentSlot::MainHand => {
                two_handed(&entry.item.kind) && sheet.equipped.contains_key(&EquipmentSlot::OffHand)
            }
            EquipmentSlot::OffHand => sheet
                .equipped_item(EquipmentSlot::MainHand)
                .is_some_and(|main| two_handed(&main.kind)),
            EquipmentSlot::Armor => false,
        };
        if blocked {
            return Err(not_equippable());
        }
        sheet.equipped.insert(slot, item_id.to_string());
        tracing::debug!(character_id = %self.id, %slot, item_id, "equipped");
        Ok(())
    }

    /// Empty a slot, returning what was in it.
    pub fn unequip(&self, slot: EquipmentSlot) -> Option<String> {
        let removed = self.lock().sheet.equipped.remove(&slot);
        if let Some(item_id) = &removed {
            tracing::debug!(character_id = %self.id, %slot, %item_id, "unequipped");
        }
        removed
    }

    /// Compute attack and damage bonuses for a weapon in the inventory and
    /// announce the attack.
    ///
    /// Finesse weapons use the better of Strength and Dexterity, other
    /// ranged weapons use Dexterity.
    pub fn attack(&self, weapon_id: &str, target: Option<EntityId>) -> Result<AttackResult, RulesError> {
        let (result, melee, bus) = {
            let state = self.lock();
            let sheet = &state.sheet;
            let item = &sheet
                .inventory
                .get(weapon_id)
                .ok_or_else(|| RulesError::ItemNotInInventory(weapon_id.to_string()))?
                .item;
            let ItemKind::Weapon {
                melee,
                finesse,
                two_handed,
                ..
            } = item.kind
            else {
                return Err(RulesError::invalid(
                    "weapon_id",
                    format!("{} is not a weapon", weapon_id),
                ));
            };

            let scores = &sheet.ability_scores;
            let ability = if finesse {
                if scores.modifier(Ability::Dexterity) > scores.modifier(Ability::Strength) {
                    Ability::Dexterity
                } else {
                    Ability::Strength
                }
            } else if melee {
                Ability::Strength
            } else {
                Ability::Dexterity
            };
            let proficient = sheet.is_proficient_with(item);
            let context = AttackContext {
                weapon_id: weapon_id.to_string(),
                ability,
                melee,
                two_handed,
                off_hand_weapon: sheet
                    .equipped_item(EquipmentSlot::OffHand)
                    .is_some_and(|i| i.is_weapon()),
            };
            let modifier = scores.modifier(ability);
            let proficiency = if proficient { sheet.proficiency_bonus } else { 0 };
            let attack_bonus = modifier
                + proficiency
                + state
                    .conditions
                    .iter()
                    .map(|c| c.attack_bonus(&context))
                    .sum::<i32>();
            let damage_bonus = modifier
                + state
                    .conditions
                    .iter()
                    .map(|c| c.damage_bonus(&context))
                    .sum::<i32>();
            let result = AttackResult {
                weapon_id: weapon_id.to_string(),
                ability,
                proficient,
                attack_bonus,
                damage_bonus,
            };
            (result, melee, state.bus.clone())
        };

        tracing::debug!(
            character_id = %self.id,
            weapon_id,
            attack_bonus = result.attack_bonus,
            damage_bonus = result.damage_bonus,
            "attack"
        );
        if let Some(bus) = bus {
            bus.publish(&GameEvent::AttackPerformed {
                attacker_id: self.id.clone(),
                target_id: target,
                weapon_id: weapon_id.to_string(),
                melee,
            })?;
        }
        Ok(result)
    }

    /// Lose hit points, never below 0, and announce the damage. Dropping to
    /// 0 applies the unconscious condition.
    pub fn take_damage(&self, amount: u32) -> Result<(), RulesError> {
        let (bus, dropped) = {
            let mut state = self.lock();
            let before = state.sheet.hit_points;
            state.sheet.hit_points = before.saturating_sub(amount);
            let dropped = before > 0 && state.sheet.hit_points == 0;
            if dropped && state.bus.is_none() && !state.has_condition(&refs::unconscious()) {
                state.conditions.push(Box::new(Unconscious::new()));
            }
            (state.bus.clone(), dropped)
        };
        tracing::debug!(character_id = %self.id, amount, dropped, "damage taken");

        let Some(bus) = bus else {
            return Ok(());
        };
        bus.publish(&GameEvent::DamageReceived {
            target_id: self.id.clone(),
            amount,
        })?;
        if dropped {
            bus.publish(&GameEvent::ConditionApplied {
                character_id: self.id.clone(),
                condition: Unconscious::record(),
                source: String::from("damage"),
            })?;
        }
        Ok(())
    }

    /// Regain hit points, clamped to maximum.
    pub fn heal(&self, amount: u32, source: &str) -> Result<(), RulesError> {
        match self.bus() {
            Some(bus) => Ok(bus.publish(&GameEvent::HealingReceived {
                target_id: self.id.clone(),
                amount,
                source: source.to_string(),
            })?),
            None => {
                self.lock().apply_healing(amount);
                Ok(())
            }
        }
    }

    /// Record a death saving throw. Only valid at 0 hit points.
    pub fn record_death_save(&self, success: bool) -> Result<DeathSaveStatus, RulesError> {
        let mut state = self.lock();
        if state.sheet.hit_points > 0 {
            return Err(RulesError::invalid(
                "death_save",
                "character is not at 0 hit points",
            ));
        }
        let saves = &mut state.sheet.death_saves;
        if saves.status() == DeathSaveStatus::Dying {
            let counter = if success {
                &mut saves.successes
            } else {
                &mut saves.failures
            };
            *counter = (*counter + 1).min(DeathSaves::LIMIT);
        }
        let status = saves.status();
        tracing::debug!(character_id = %self.id, success, %status, "death save");
        Ok(status)
    }

    pub fn short_rest(&self) -> Result<(), RulesError> {
        self.rest(RestType::ShortRest)
    }

    pub fn long_rest(&self) -> Result<(), RulesError> {
        self.rest(RestType::LongRest)
    }

    /// Take a rest. An active character announces it and recovers through
    /// its own rest handler.
    pub fn rest(&self, rest_type: RestType) -> Result<(), RulesError> {
        match self.bus() {
            Some(bus) => Ok(bus.publish(&GameEvent::Rest {
                character_id: self.id.clone(),
                rest_type,
            })?),
            None => {
                self.lock().apply_rest(rest_type);
                Ok(())
            }
        }
    }

    pub fn use_resource(&self, id: &str, amount: u32) -> Result<(), RulesError> {
        let mut state = self.lock();
        let resource = state
            .sheet
            .resources
            .get_mut(id)
            .ok_or_else(|| RulesError::UnknownResource(id.to_string()))?;
        resource.use_resource(amount)?;
        tracing::debug!(character_id = %self.id, resource = id, amount, remaining = resource.current(), "resource used");
        Ok(())
    }

    /// Spend one spell slot of `level`.
    pub fn use_spell_slot(&self, level: u8) -> Result<(), RulesError> {
        let mut state = self.lock();
        let slots = state
            .sheet
            .spell_slots
            .get_mut(&level)
            .ok_or_else(|| RulesError::UnknownResource(format!("spell_slot_{}", level)))?;
        if slots.remaining() == 0 {
            return Err(RulesError::ResourceExhausted {
                resource: format!("spell_slot_{}", level),
                requested: 1,
                available: 0,
            });
        }
        slots.used += 1;
        Ok(())
    }

    /// Activate a feature the character has.
    ///
    /// Spends one use of the feature's resource, if it has one, then
    /// publishes the events the feature produces. The use is refunded if
    /// activation or publishing fails.
    pub fn activate_feature(&self, feature_ref: &Ref) -> Result<(), RulesError> {
        let (bus, events, spent) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let bus = state
                .bus
                .clone()
                .ok_or_else(|| RulesError::NotActive(self.id.to_string()))?;
            let activation = Activation {
                owner: self.id.clone(),
                level: state.sheet.level,
                active_conditions: state
                    .conditions
                    .iter()
                    .map(|c| c.entity_ref().clone())
                    .collect(),
            };
            let feature = state
                .features
                .iter_mut()
                .find(|f| f.entity_ref() == feature_ref)
                .ok_or_else(|| RulesError::UnknownRef(feature_ref.clone()))?;

            let spent = feature.resource().map(str::to_string);
            if let Some(id) = &spent {
                state
                    .sheet
                    .resources
                    .get_mut(id)
                    .ok_or_else(|| RulesError::UnknownResource(id.clone()))?
                    .use_resource(1)?;
            }
            match feature.activate(&activation) {
                Ok(events) => (bus, events, spent),
                Err(err) => {
                    if let Some(id) = &spent {
                        if let Some(resource) = state.sheet.resources.get_mut(id) {
                            resource.restore(1);
                        }
                    }
                    return Err(err);
                }
            }
        };

        for event in &events {
            if let Err(err) = bus.publish(event) {
                tracing::warn!(
                    character_id = %self.id,
                    feature = %feature_ref,
                    error = %err,
                    "feature activation failed, refunding"
                );
                if let Some(id) = &spent {
                    if let Some(resource) = self.lock().sheet.resources.get_mut(id) {
                        resource.restore(1);
                    }
                }
                return Err(err.into());
            }
        }
        tracing::info!(character_id = %self.id, feature = %feature_ref, "feature activated");
        Ok(())
    }
}
