//! Bundled conditions.
//!
//! - [`RagingCondition`]: rage damage bonus that ends itself when its owner
//!   stops fighting, after ten turns, or on falling unconscious
//! - [`UnarmoredDefense`]: armor class from Dexterity plus Constitution
//!   (barbarian) or Wisdom (monk) while no armor is worn
//! - [`FightingStyleCondition`]: the fighter's chosen style
//! - [`Unconscious`]: applied at 0 hit points, lifted by healing

use crate::abilities::Ability;
use crate::bus::{BusError, EventBus, GameEvent, SubscriptionId, Topic};
use crate::entity::{
    refs, ArmorContext, AttackContext, Condition, EntityContext, EntityRecord, Lifecycle, Registry,
};
use crate::error::RulesError;
use crate::ids::{EntityId, Ref};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Rage lasts at most this many of the owner's turns.
pub const RAGE_MAX_TURNS: u32 = 10;

pub(crate) fn register(registry: &mut Registry) {
    registry.register_condition(refs::raging(), RagingCondition::from_record);
    registry.register_condition(refs::unarmored_defense(), UnarmoredDefense::from_record);
    registry.register_condition(refs::fighting_style(), FightingStyleCondition::from_record);
    registry.register_condition(refs::unconscious(), Unconscious::from_record);
}

/// Release every handle, keeping the first failure.
fn release(bus: &dyn EventBus, subscriptions: &mut Vec<SubscriptionId>) -> Result<(), RulesError> {
    let mut first = None;
    for id in subscriptions.drain(..) {
        if let Err(err) = bus.unsubscribe(id) {
            first.get_or_insert(err);
        }
    }
    match first {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct RagingProgress {
    turns_active: u32,
    attacked_this_turn: bool,
    hit_this_turn: bool,
    ended: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RagingPayload {
    damage_bonus: i32,
    source: String,
    #[serde(flatten)]
    progress: RagingProgress,
}

/// The barbarian's rage.
///
/// Adds its damage bonus to melee Strength attacks. At the end of each of
/// the owner's turns, rage ends if the owner neither attacked nor took
/// damage that turn, or once it has lasted [`RAGE_MAX_TURNS`] turns.
/// Ending publishes `ConditionRemoved` for the owner.
pub struct RagingCondition {
    entity_ref: Ref,
    owner: EntityId,
    damage_bonus: i32,
    source: String,
    progress: Arc<Mutex<RagingProgress>>,
    subscriptions: Vec<SubscriptionId>,
    applied: bool,
}

impl RagingCondition {
    pub fn new(owner: EntityId, damage_bonus: i32, source: &str) -> Self {
        Self {
            entity_ref: refs::raging(),
            owner,
            damage_bonus,
            source: source.to_string(),
            progress: Arc::new(Mutex::new(RagingProgress::default())),
            subscriptions: Vec::new(),
            applied: false,
        }
    }

    fn from_record(
        record: &EntityRecord,
        ctx: &EntityContext,
    ) -> Result<Box<dyn Condition>, RulesError> {
        let payload: RagingPayload = record.decode()?;
        let mut raging = Self::new(ctx.owner.clone(), payload.damage_bonus, &payload.source);
        raging.progress = Arc::new(Mutex::new(payload.progress));
        Ok(Box::new(raging))
    }

    /// Record for a fresh rage, as published by the Rage feature.
    pub fn record(damage_bonus: i32, source: &str) -> Result<EntityRecord, RulesError> {
        EntityRecord::from_payload(
            refs::raging(),
            &RagingPayload {
                damage_bonus,
                source: source.to_string(),
                progress: RagingProgress::default(),
            },
        )
    }

    pub fn turns_active(&self) -> u32 {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .turns_active
    }

    fn end_rage(owner: &EntityId, bus: &dyn EventBus, reason: &str) -> Result<(), BusError> {
        tracing::debug!(character_id = %owner, reason, "rage ends");
        bus.publish(&GameEvent::ConditionRemoved {
            character_id: owner.clone(),
            condition_ref: refs::raging(),
            reason: reason.to_string(),
        })
    }

    fn subscribe_all(&mut self, bus: &dyn EventBus) -> Result<(), BusError> {
        let owner = self.owner.clone();
        let progress = Arc::clone(&self.progress);
        self.subscriptions.push(bus.subscribe(
            Topic::TurnEnd,
            Arc::new(move |event, bus| {
                if !event.is_for(&owner) {
                    return Ok(());
                }
                let reason = {
                    let mut p = progress.lock().unwrap_or_else(PoisonError::into_inner);
                    if p.ended {
                        return Ok(());
                    }
                    p.turns_active += 1;
                    let reason = if !p.attacked_this_turn && !p.hit_this_turn {
                        Some("no_combat_activity")
                    } else if p.turns_active >= RAGE_MAX_TURNS {
                        Some("duration_expired")
                    } else {
                        None
                    };
                    p.attacked_this_turn = false;
                    p.hit_this_turn = false;
                    p.ended = reason.is_some();
                    reason
                };
                match reason {
                    Some(reason) => Self::end_rage(&owner, bus, reason),
                    None => Ok(()),
                }
            }),
        )?);

        let owner = self.owner.clone();
        let progress = Arc::clone(&self.progress);
        self.subscriptions.push(bus.subscribe(
            Topic::AttackPerformed,
            Arc::new(move |event, _| {
                if event.is_for(&owner) {
                    progress
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .attacked_this_turn = true;
                }
                Ok(())
            }),
        )?);

        let owner = self.owner.clone();
        let progress = Arc::clone(&self.progress);
        self.subscriptions.push(bus.subscribe(
            Topic::DamageReceived,
            Arc::new(move |event, _| {
                if event.is_for(&owner) {
                    progress
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .hit_this_turn = true;
                }
                Ok(())
            }),
        )?);

        let owner = self.owner.clone();
        let progress = Arc::clone(&self.progress);
        self.subscriptions.push(bus.subscribe(
            Topic::ConditionApplied,
            Arc::new(move |event, bus| match event {
                GameEvent::ConditionApplied {
                    character_id,
                    condition,
                    ..
                } if character_id == &owner && condition.entity_ref == refs::unconscious() => {
                    {
                        let mut p = progress.lock().unwrap_or_else(PoisonError::into_inner);
                        if p.ended {
                            return Ok(());
                        }
                        p.ended = true;
                    }
                    Self::end_rage(&owner, bus, "unconscious")
                }
                _ => Ok(()),
            }),
        )?);
        Ok(())
    }
}

impl Lifecycle for RagingCondition {
    fn entity_ref(&self) -> &Ref {
        &self.entity_ref
    }

    fn apply(&mut self, bus: &dyn EventBus) -> Result<(), RulesError> {
        if self.applied {
            return Err(RulesError::AlreadyApplied(self.entity_ref.clone()));
        }
        if let Err(err) = self.subscribe_all(bus) {
            // Roll back whatever subscribed before the failure.
            release(bus, &mut self.subscriptions)?;
            return Err(err.into());
        }
        self.applied = true;
        Ok(())
    }

    fn remove(&mut self, bus: &dyn EventBus) -> Result<(), RulesError> {
        self.applied = false;
        release(bus, &mut self.subscriptions)
    }

    fn is_applied(&self) -> bool {
        self.applied
    }

    fn to_record(&self) -> Result<EntityRecord, RulesError> {
        let progress = self
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        EntityRecord::from_payload(
            self.entity_ref.clone(),
            &RagingPayload {
                damage_bonus: self.damage_bonus,
                source: self.source.clone(),
                progress,
            },
        )
    }
}

impl Condition for RagingCondition {
    fn damage_bonus(&self, attack: &AttackContext) -> i32 {
        if attack.melee && attack.ability == Ability::Strength {
            self.damage_bonus
        } else {
            0
        }
    }
}

/// Which class's Unarmored Defense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnarmoredVariant {
    /// Adds Constitution.
    Barbarian,
    /// Adds Wisdom.
    Monk,
}

impl UnarmoredVariant {
    pub fn ability(self) -> Ability {
        match self {
            UnarmoredVariant::Barbarian => Ability::Constitution,
            UnarmoredVariant::Monk => Ability::Wisdom,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UnarmoredPayload {
    variant: UnarmoredVariant,
}

/// AC = 10 + DEX + CON (barbarian) or WIS (monk) when no armor is worn.
///
/// A barbarian may still carry a shield; a monk gets nothing while using one.
#[derive(Debug)]
pub struct UnarmoredDefense {
    entity_ref: Ref,
    variant: UnarmoredVariant,
    applied: bool,
}

impl UnarmoredDefense {
    pub fn new(variant: UnarmoredVariant) -> Self {
        Self {
            entity_ref: refs::unarmored_defense(),
            variant,
            applied: false,
        }
    }

    pub fn variant(&self) -> UnarmoredVariant {
        self.variant
    }

    pub fn record(variant: UnarmoredVariant) -> Result<EntityRecord, RulesError> {
        EntityRecord::from_payload(refs::unarmored_defense(), &UnarmoredPayload { variant })
    }

    fn from_record(
        record: &EntityRecord,
        _ctx: &EntityContext,
    ) -> Result<Box<dyn Condition>, RulesError> {
        let payload: UnarmoredPayload = record.decode()?;
        Ok(Box::new(Self::new(payload.variant)))
    }
}

impl Lifecycle for UnarmoredDefense {
    fn entity_ref(&self) -> &Ref {
        &self.entity_ref
    }

    fn apply(&mut self, _bus: &dyn EventBus) -> Result<(), RulesError> {
        if self.applied {
            return Err(RulesError::AlreadyApplied(self.entity_ref.clone()));
        }
        self.applied = true;
        Ok(())
    }

    fn remove(&mut self, _bus: &dyn EventBus) -> Result<(), RulesError> {
        self.applied = false;
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.applied
    }

    fn to_record(&self) -> Result<EntityRecord, RulesError> {
        Self::record(self.variant)
    }
}

impl Condition for UnarmoredDefense {
    fn modify_armor_class(&self, armor: &ArmorContext, ac: i32) -> i32 {
        if armor.wearing_armor {
            return ac;
        }
        if self.variant == UnarmoredVariant::Monk && armor.shield_bonus > 0 {
            return ac;
        }
        let unarmored = 10
            + armor.scores.modifier(Ability::Dexterity)
            + armor.scores.modifier(self.variant.ability())
            + armor.shield_bonus;
        ac.max(unarmored)
    }
}

/// Fighting styles with an implementation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FightingStyle {
    /// +2 to ranged attack rolls.
    Archery,
    /// +1 AC while wearing armor.
    Defense,
    /// +2 damage with a one-handed melee weapon and nothing in the off hand.
    Dueling,
    /// Damage die rerolls; recorded only, there is no dice model to hook.
    GreatWeaponFighting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FightingStylePayload {
    style: FightingStyle,
}

#[derive(Debug)]
pub struct FightingStyleCondition {
    entity_ref: Ref,
    style: FightingStyle,
    applied: bool,
}

impl FightingStyleCondition {
    pub fn new(style: FightingStyle) -> Self {
        Self {
            entity_ref: refs::fighting_style(),
            style,
            applied: false,
        }
    }

    pub fn style(&self) -> FightingStyle {
        self.style
    }

    pub fn record(style: FightingStyle) -> Result<EntityRecord, RulesError> {
        EntityRecord::from_payload(refs::fighting_style(), &FightingStylePayload { style })
    }

    fn from_record(
        record: &EntityRecord,
        _ctx: &EntityContext,
    ) -> Result<Box<dyn Condition>, RulesError> {
        let payload: FightingStylePayload = record.decode()?;
        Ok(Box::new(Self::new(payload.style)))
    }
}

impl Lifecycle for FightingStyleCondition {
    fn entity_ref(&self) -> &Ref {
        &self.entity_ref
    }

    fn apply(&mut self, _bus: &dyn EventBus) -> Result<(), RulesError> {
        if self.applied {
            return Err(RulesError::AlreadyApplied(self.entity_ref.clone()));
        }
        self.applied = true;
        Ok(())
    }

    fn remove(&mut self, _bus: &dyn EventBus) -> Result<(), RulesError> {
        self.applied = false;
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.applied
    }

    fn to_record(&self) -> Result<EntityRecord, RulesError> {
        Self::record(self.style)
    }
}

impl Condition for FightingStyleCondition {
    fn attack_bonus(&self, attack: &AttackContext) -> i32 {
        match self.style {
            FightingStyle::Archery if !attack.melee => 2,
            _ => 0,
        }
    }

    fn damage_bonus(&self, attack: &AttackContext) -> i32 {
        match self.style {
            FightingStyle::Dueling
                if attack.melee && !attack.two_handed && !attack.off_hand_weapon =>
            {
                2
            }
            _ => 0,
        }
    }

    fn modify_armor_class(&self, armor: &ArmorContext, ac: i32) -> i32 {
        match self.style {
            FightingStyle::Defense if armor.wearing_armor => ac + 1,
            _ => ac,
        }
    }
}

/// Marker for a character at 0 hit points.
#[derive(Debug)]
pub struct Unconscious {
    entity_ref: Ref,
    applied: bool,
}

impl Unconscious {
    pub fn new() -> Self {
        Self {
            entity_ref: refs::unconscious(),
            applied: false,
        }
    }

    pub fn record() -> EntityRecord {
        EntityRecord::bare(refs::unconscious())
    }

    fn from_record(
        _record: &EntityRecord,
        _ctx: &EntityContext,
    ) -> Result<Box<dyn Condition>, RulesError> {
        Ok(Box::new(Self::new()))
    }
}

impl Default for Unconscious {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for Unconscious {
    fn entity_ref(&self) -> &Ref {
        &self.entity_ref
    }

    fn apply(&mut self, _bus: &dyn EventBus) -> Result<(), RulesError> {
        if self.applied {
            return Err(RulesError::AlreadyApplied(self.entity_ref.clone()));
        }
        self.applied = true;
        Ok(())
    }

    fn remove(&mut self, _bus: &dyn EventBus) -> Result<(), RulesError> {
        self.applied = false;
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.applied
    }

    fn to_record(&self) -> Result<EntityRecord, RulesError> {
        Ok(Self::record())
    }
}

impl Condition for Unconscious {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::AbilityScores;
    use crate::bus::Bus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn melee_str() -> AttackContext {
        AttackContext {
            weapon_id: "greataxe".into(),
            ability: Ability::Strength,
            melee: true,
            two_handed: true,
            off_hand_weapon: false,
        }
    }

    fn removal_counter(bus: &Bus) -> Arc<AtomicUsize> {
        let removed = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&removed);
        bus.subscribe(
            Topic::ConditionRemoved,
            Arc::new(move |_, _| {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();
        removed
    }

    fn turn_end(id: &str) -> GameEvent {
        GameEvent::TurnEnd {
            character_id: EntityId::new(id),
            round: 1,
        }
    }

    #[test]
    fn test_raging_applies_once() {
        let bus = Bus::new();
        let mut rage = RagingCondition::new(EntityId::new("grog"), 2, "dnd5e:features:rage");
        rage.apply(&bus).unwrap();
        assert_eq!(bus.subscription_count(), 4);
        assert!(matches!(
            rage.apply(&bus),
            Err(RulesError::AlreadyApplied(_))
        ));
        rage.remove(&bus).unwrap();
        assert_eq!(bus.subscription_count(), 0);
        rage.remove(&bus).unwrap();
    }

    #[test]
    fn test_raging_damage_bonus_melee_strength_only() {
        let rage = RagingCondition::new(EntityId::new("grog"), 2, "test");
        assert_eq!(rage.damage_bonus(&melee_str()), 2);
        let ranged = AttackContext {
            melee: false,
            ability: Ability::Dexterity,
            ..melee_str()
        };
        assert_eq!(rage.damage_bonus(&ranged), 0);
        assert_eq!(rage.attack_bonus(&melee_str()), 0);
    }

    #[test]
    fn test_raging_ends_without_combat_activity() {
        let bus = Bus::new();
        let removed = removal_counter(&bus);
        let mut rage = RagingCondition::new(EntityId::new("grog"), 2, "test");
        rage.apply(&bus).unwrap();

        // Another character's turn end is ignored.
        bus.publish(&turn_end("someone-else")).unwrap();
        assert_eq!(removed.load(Ordering::SeqCst), 0);

        bus.publish(&turn_end("grog")).unwrap();
        assert_eq!(removed.load(Ordering::SeqCst), 1);
        assert_eq!(rage.turns_active(), 1);
    }

    #[test]
    fn test_raging_continues_while_fighting() {
        let bus = Bus::new();
        let removed = removal_counter(&bus);
        let mut rage = RagingCondition::new(EntityId::new("grog"), 2, "test");
        rage.apply(&bus).unwrap();

        for turn in 1..RAGE_MAX_TURNS {
            bus.publish(&GameEvent::DamageReceived {
                target_id: EntityId::new("grog"),
                amount: 3,
            })
            .unwrap();
            bus.publish(&turn_end("grog")).unwrap();
            assert_eq!(removed.load(Ordering::SeqCst), 0, "turn {}", turn);
        }

        bus.publish(&GameEvent::AttackPerformed {
            attacker_id: EntityId::new("grog"),
            target_id: None,
            weapon_id: "greataxe".into(),
            melee: true,
        })
        .unwrap();
        bus.publish(&turn_end("grog")).unwrap();
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_raging_record_keeps_progress() {
        let bus = Bus::new();
        let mut rage = RagingCondition::new(EntityId::new("grog"), 3, "test");
        rage.apply(&bus).unwrap();
        bus.publish(&GameEvent::DamageReceived {
            target_id: EntityId::new("grog"),
            amount: 1,
        })
        .unwrap();
        bus.publish(&turn_end("grog")).unwrap();

        let record = rage.to_record().unwrap();
        assert_eq!(record.payload["damage_bonus"], 3);
        assert_eq!(record.payload["turns_active"], 1);

        let ctx = EntityContext {
            owner: EntityId::new("grog"),
            level: 9,
        };
        let rebuilt = RagingCondition::from_record(&record, &ctx).unwrap();
        assert_eq!(rebuilt.to_record().unwrap(), record);
    }

    #[test]
    fn test_unarmored_defense_barbarian() {
        let ud = UnarmoredDefense::new(UnarmoredVariant::Barbarian);
        let armor = ArmorContext {
            scores: AbilityScores::new(16, 14, 16, 8, 10, 10),
            wearing_armor: false,
            shield_bonus: 0,
        };
        // 10 + 2 + 3
        assert_eq!(ud.modify_armor_class(&armor, 12), 15);
        let shielded = ArmorContext {
            shield_bonus: 2,
            ..armor.clone()
        };
        assert_eq!(ud.modify_armor_class(&shielded, 14), 17);
        let armored = ArmorContext {
            wearing_armor: true,
            ..armor
        };
        assert_eq!(ud.modify_armor_class(&armored, 16), 16);
    }

    #[test]
    fn test_unarmored_defense_monk_uses_wisdom_and_no_shield() {
        let ud = UnarmoredDefense::new(UnarmoredVariant::Monk);
        let armor = ArmorContext {
            scores: AbilityScores::new(10, 16, 10, 10, 16, 10),
            wearing_armor: false,
            shield_bonus: 0,
        };
        assert_eq!(ud.modify_armor_class(&armor, 13), 16);
        let shielded = ArmorContext {
            shield_bonus: 2,
            ..armor
        };
        assert_eq!(ud.modify_armor_class(&shielded, 15), 15);
    }

    #[test]
    fn test_fighting_styles() {
        let archery = FightingStyleCondition::new(FightingStyle::Archery);
        let ranged = AttackContext {
            melee: false,
            ability: Ability::Dexterity,
            two_handed: false,
            ..melee_str()
        };
        assert_eq!(archery.attack_bonus(&ranged), 2);
        assert_eq!(archery.attack_bonus(&melee_str()), 0);

        let dueling = FightingStyleCondition::new(FightingStyle::Dueling);
        let one_handed = AttackContext {
            two_handed: false,
            ..melee_str()
        };
        assert_eq!(dueling.damage_bonus(&one_handed), 2);
        assert_eq!(dueling.damage_bonus(&melee_str()), 0);

        let defense = FightingStyleCondition::new(FightingStyle::Defense);
        let armor = ArmorContext {
            scores: AbilityScores::default(),
            wearing_armor: true,
            shield_bonus: 0,
        };
        assert_eq!(defense.modify_armor_class(&armor, 16), 17);
    }

    #[test]
    fn test_fighting_style_parse() {
        assert_eq!(
            "great_weapon_fighting".parse::<FightingStyle>().unwrap(),
            FightingStyle::GreatWeaponFighting
        );
        assert!("protection".parse::<FightingStyle>().is_err());
    }
}
