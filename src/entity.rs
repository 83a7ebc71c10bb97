//! Runtime entity module.
//!
//! Conditions, features and actions are polymorphic runtime entities. Each
//! one is identified by a stable [`Ref`], persists as an [`EntityRecord`]
//! (`{ref, payload}`), and shares the [`Lifecycle`] contract: `apply`
//! registers whatever bus subscriptions it needs, `remove` releases exactly
//! those.
//!
//! A [`Registry`] maps refs to constructors so persisted records can be
//! turned back into live entities.

use crate::abilities::{Ability, AbilityScores};
use crate::bus::{EventBus, GameEvent};
use crate::error::RulesError;
use crate::ids::{EntityId, Ref};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Well-known refs for the bundled entities.
pub mod refs {
    use crate::ids::Ref;

    pub const MODULE: &str = "dnd5e";

    pub fn condition(value: &str) -> Ref {
        Ref::new(MODULE, "conditions", value)
    }

    pub fn feature(value: &str) -> Ref {
        Ref::new(MODULE, "features", value)
    }

    pub fn action(value: &str) -> Ref {
        Ref::new(MODULE, "actions", value)
    }

    pub fn raging() -> Ref {
        condition("raging")
    }

    pub fn unarmored_defense() -> Ref {
        condition("unarmored_defense")
    }

    pub fn fighting_style() -> Ref {
        condition("fighting_style")
    }

    pub fn unconscious() -> Ref {
        condition("unconscious")
    }

    pub fn rage() -> Ref {
        feature("rage")
    }
}

/// Persisted form of a condition, feature or action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(rename = "ref")]
    pub entity_ref: Ref,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EntityRecord {
    pub fn new(entity_ref: Ref, payload: serde_json::Value) -> Self {
        Self {
            entity_ref,
            payload,
        }
    }

    /// A record with no payload.
    pub fn bare(entity_ref: Ref) -> Self {
        Self::new(entity_ref, serde_json::Value::Null)
    }

    /// Encode a typed payload.
    pub fn from_payload<T: Serialize>(entity_ref: Ref, payload: &T) -> Result<Self, RulesError> {
        Ok(Self::new(entity_ref, serde_json::to_value(payload)?))
    }

    /// Decode the payload, treating a null payload as an empty object.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, RulesError> {
        let value = match &self.payload {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|e| {
            RulesError::Serialization(format!("{}: {}", self.entity_ref, e))
        })
    }
}

/// Who owns an entity being constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityContext {
    pub owner: EntityId,
    pub level: u8,
}

/// Shared contract of conditions, features and actions.
pub trait Lifecycle: Send {
    fn entity_ref(&self) -> &Ref;

    /// Register with the bus. Applying twice fails with `AlreadyApplied`.
    fn apply(&mut self, bus: &dyn EventBus) -> Result<(), RulesError>;

    /// Release everything `apply` registered. Removing an entity that is
    /// not applied is a no-op.
    fn remove(&mut self, bus: &dyn EventBus) -> Result<(), RulesError>;

    fn is_applied(&self) -> bool;

    fn to_record(&self) -> Result<EntityRecord, RulesError>;
}

/// What a condition can see of an attack being made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackContext {
    pub weapon_id: String,
    pub ability: Ability,
    pub melee: bool,
    pub two_handed: bool,
    /// Whether a weapon is held in the off hand.
    pub off_hand_weapon: bool,
}

/// What a condition can see when armor class is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmorContext {
    pub scores: AbilityScores,
    pub wearing_armor: bool,
    pub shield_bonus: i32,
}

/// A reactive modifier on a character.
pub trait Condition: Lifecycle {
    fn attack_bonus(&self, _attack: &AttackContext) -> i32 {
        0
    }

    fn damage_bonus(&self, _attack: &AttackContext) -> i32 {
        0
    }

    /// Adjust a computed armor class.
    fn modify_armor_class(&self, _armor: &ArmorContext, ac: i32) -> i32 {
        ac
    }
}

/// Inputs for activating a feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub owner: EntityId,
    pub level: u8,
    /// Refs of the owner's currently active conditions.
    pub active_conditions: BTreeSet<Ref>,
}

/// A class or racial feature.
pub trait Feature: Lifecycle {
    /// Resource spent per activation, if any.
    fn resource(&self) -> Option<&str> {
        None
    }

    /// Activate the feature. Returns the events the owner must publish.
    fn activate(&mut self, _activation: &Activation) -> Result<Vec<GameEvent>, RulesError> {
        Err(RulesError::NotActivatable(self.entity_ref().clone()))
    }
}

/// An action made available to a character.
pub trait Action: Lifecycle {
    /// Temporary actions disappear at the owner's turn end and on cleanup.
    fn is_temporary(&self) -> bool;
}

pub type ConditionCtor = fn(&EntityRecord, &EntityContext) -> Result<Box<dyn Condition>, RulesError>;
pub type FeatureCtor = fn(&EntityRecord, &EntityContext) -> Result<Box<dyn Feature>, RulesError>;
pub type ActionCtor = fn(&EntityRecord, &EntityContext) -> Result<Box<dyn Action>, RulesError>;

/// Ref to constructor table for rebuilding entities from records.
///
/// # Examples
///
/// ```rust
/// use charsmith::entity::{refs, EntityContext, EntityRecord, Registry};
/// use charsmith::EntityId;
///
/// let registry = Registry::standard();
/// let ctx = EntityContext { owner: EntityId::new("grog"), level: 1 };
/// let record = EntityRecord::new(
///     refs::unarmored_defense(),
///     serde_json::json!({ "variant": "barbarian" }),
/// );
/// let condition = registry.build_condition(&record, &ctx).unwrap();
/// assert_eq!(condition.entity_ref(), &refs::unarmored_defense());
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    conditions: BTreeMap<Ref, ConditionCtor>,
    features: BTreeMap<Ref, FeatureCtor>,
    actions: BTreeMap<Ref, ActionCtor>,
    /// Feature constructor used for refs with no dedicated entry.
    passive_feature: Option<FeatureCtor>,
    /// Action constructor used for refs with no dedicated entry.
    generic_action: Option<ActionCtor>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("conditions", &self.conditions.keys().collect::<Vec<_>>())
            .field("features", &self.features.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every bundled condition, feature and action.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        crate::conditions::register(&mut registry);
        crate::features::register(&mut registry);
        crate::actions::register(&mut registry);
        registry
    }

    pub fn register_condition(&mut self, entity_ref: Ref, ctor: ConditionCtor) {
        self.conditions.insert(entity_ref, ctor);
    }

    pub fn register_feature(&mut self, entity_ref: Ref, ctor: FeatureCtor) {
        self.features.insert(entity_ref, ctor);
    }

    pub fn register_action(&mut self, entity_ref: Ref, ctor: ActionCtor) {
        self.actions.insert(entity_ref, ctor);
    }

    /// Fallback for features with no behaviour of their own.
    pub fn set_passive_feature(&mut self, ctor: FeatureCtor) {
        self.passive_feature = Some(ctor);
    }

    pub fn set_generic_action(&mut self, ctor: ActionCtor) {
        self.generic_action = Some(ctor);
    }

    pub fn has_condition(&self, entity_ref: &Ref) -> bool {
        self.conditions.contains_key(entity_ref)
    }

    pub fn build_condition(
        &self,
        record: &EntityRecord,
        ctx: &EntityContext,
    ) -> Result<Box<dyn Condition>, RulesError> {
        let ctor = self
            .conditions
            .get(&record.entity_ref)
            .ok_or_else(|| RulesError::UnknownRef(record.entity_ref.clone()))?;
        ctor(record, ctx)
    }

    pub fn build_feature(
        &self,
        record: &EntityRecord,
        ctx: &EntityContext,
    ) -> Result<Box<dyn Feature>, RulesError> {
        let ctor = self
            .features
            .get(&record.entity_ref)
            .or(self.passive_feature.as_ref())
            .ok_or_else(|| RulesError::UnknownRef(record.entity_ref.clone()))?;
        ctor(record, ctx)
    }

    pub fn build_action(
        &self,
        record: &EntityRecord,
        ctx: &EntityContext,
    ) -> Result<Box<dyn Action>, RulesError> {
        let ctor = self
            .actions
            .get(&record.entity_ref)
            .or(self.generic_action.as_ref())
            .ok_or_else(|| RulesError::UnknownRef(record.entity_ref.clone()))?;
        ctor(record, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EntityContext {
        EntityContext {
            owner: EntityId::new("grog"),
            level: 1,
        }
    }

    #[test]
    fn test_record_serializes_with_ref_key() {
        let record = EntityRecord::new(refs::raging(), json!({ "damage_bonus": 2 }));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["ref"], "dnd5e:conditions:raging");
        assert_eq!(value["payload"]["damage_bonus"], 2);
        let back: EntityRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_decode_null_payload_as_empty_object() {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Empty {
            count: u32,
        }
        let record = EntityRecord::bare(refs::rage());
        let decoded: Empty = record.decode().unwrap();
        assert_eq!(decoded.count, 0);
    }

    #[test]
    fn test_empty_registry_rejects_unknown_refs() {
        let registry = Registry::new();
        let record = EntityRecord::bare(refs::condition("blessed"));
        assert!(matches!(
            registry.build_condition(&record, &ctx()),
            Err(RulesError::UnknownRef(_))
        ));
        assert!(registry.build_feature(&record, &ctx()).is_err());
    }

    #[test]
    fn test_standard_registry_knows_bundled_entities() {
        let registry = Registry::standard();
        assert!(registry.has_condition(&refs::raging()));
        assert!(registry.has_condition(&refs::unarmored_defense()));
        assert!(registry.has_condition(&refs::fighting_style()));
        // Unregistered feature refs fall back to passive features.
        let record = EntityRecord::bare(refs::feature("danger_sense"));
        let feature = registry.build_feature(&record, &ctx()).unwrap();
        assert_eq!(feature.entity_ref(), &refs::feature("danger_sense"));
    }

    #[test]
    fn test_dedicated_action_ctor_wins_over_fallback() {
        use crate::actions::{ActionDuration, GrantedAction};

        fn bonus_action(
            record: &EntityRecord,
            _ctx: &EntityContext,
        ) -> Result<Box<dyn Action>, RulesError> {
            Ok(Box::new(GrantedAction::new(
                record.entity_ref.clone(),
                ActionDuration::UntilTurnEnd,
            )))
        }

        let mut registry = Registry::standard();
        let dash = EntityRecord::bare(refs::action("dash"));
        assert!(!registry.build_action(&dash, &ctx()).unwrap().is_temporary());

        registry.register_action(refs::action("dash"), bonus_action);
        assert!(registry.build_action(&dash, &ctx()).unwrap().is_temporary());
        let other = EntityRecord::bare(refs::action("dodge"));
        assert!(!registry.build_action(&other, &ctx()).unwrap().is_temporary());
    }
}
