//! Bundled features.
//!
//! `Rage` is the one activatable feature shipped with the crate. Every
//! other feature ref is loaded as a [`PassiveFeature`], a record the
//! character carries without behaviour of its own.

use crate::bus::{EventBus, GameEvent};
use crate::conditions::RagingCondition;
use crate::entity::{refs, Activation, EntityContext, EntityRecord, Feature, Lifecycle, Registry};
use crate::error::RulesError;
use crate::ids::Ref;

pub(crate) fn register(registry: &mut Registry) {
    registry.register_feature(refs::rage(), Rage::from_record);
    registry.set_passive_feature(PassiveFeature::from_record);
}

/// Rage damage bonus by barbarian level.
///
/// # Examples
///
/// ```rust
/// use charsmith::features::rage_damage_bonus;
///
/// assert_eq!(rage_damage_bonus(1), 2);
/// assert_eq!(rage_damage_bonus(9), 3);
/// assert_eq!(rage_damage_bonus(16), 4);
/// ```
pub fn rage_damage_bonus(level: u8) -> i32 {
    match level {
        0..=8 => 2,
        9..=15 => 3,
        _ => 4,
    }
}

/// The barbarian's Rage.
///
/// Spends one `rage` use and asks the owner to publish a
/// `ConditionApplied` carrying a fresh raging condition.
#[derive(Debug)]
pub struct Rage {
    entity_ref: Ref,
    payload: serde_json::Value,
    applied: bool,
}

impl Rage {
    pub const RESOURCE: &'static str = "rage";

    pub fn new() -> Self {
        Self {
            entity_ref: refs::rage(),
            payload: serde_json::Value::Null,
            applied: false,
        }
    }

    fn from_record(record: &EntityRecord, _ctx: &EntityContext) -> Result<Box<dyn Feature>, RulesError> {
        Ok(Box::new(Self {
            entity_ref: record.entity_ref.clone(),
            payload: record.payload.clone(),
            applied: false,
        }))
    }
}

impl Default for Rage {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for Rage {
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
        Ok(EntityRecord::new(self.entity_ref.clone(), self.payload.clone()))
    }
}

impl Feature for Rage {
    fn resource(&self) -> Option<&str> {
        Some(Self::RESOURCE)
    }

    fn activate(&mut self, activation: &Activation) -> Result<Vec<GameEvent>, RulesError> {
        if activation.active_conditions.contains(&refs::raging()) {
            return Err(RulesError::AlreadyApplied(refs::raging()));
        }
        let bonus = rage_damage_bonus(activation.level);
        tracing::debug!(character_id = %activation.owner, bonus, "rage activated");
        Ok(vec![GameEvent::ConditionApplied {
            character_id: activation.owner.clone(),
            condition: RagingCondition::record(bonus, &self.entity_ref.to_string())?,
            source: self.entity_ref.to_string(),
        }])
    }
}

/// A feature with no runtime behaviour.
#[derive(Debug)]
pub struct PassiveFeature {
    record: EntityRecord,
    applied: bool,
}

impl PassiveFeature {
    pub fn new(record: EntityRecord) -> Self {
        Self {
            record,
            applied: false,
        }
    }

    fn from_record(record: &EntityRecord, _ctx: &EntityContext) -> Result<Box<dyn Feature>, RulesError> {
        Ok(Box::new(Self::new(record.clone())))
    }
}

impl Lifecycle for PassiveFeature {
    fn entity_ref(&self) -> &Ref {
        &self.record.entity_ref
    }

    fn apply(&mut self, _bus: &dyn EventBus) -> Result<(), RulesError> {
        if self.applied {
            return Err(RulesError::AlreadyApplied(self.record.entity_ref.clone()));
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
        Ok(self.record.clone())
    }
}

impl Feature for PassiveFeature {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EntityId;
    use std::collections::BTreeSet;

    fn activation(level: u8) -> Activation {
        Activation {
            owner: EntityId::new("grog"),
            level,
            active_conditions: BTreeSet::new(),
        }
    }

    #[test]
    fn test_rage_emits_raging_condition() {
        let mut rage = Rage::new();
        assert_eq!(rage.resource(), Some("rage"));
        let events = rage.activate(&activation(1)).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            GameEvent::ConditionApplied {
                character_id,
                condition,
                ..
            } => {
                assert_eq!(character_id.as_str(), "grog");
                assert_eq!(condition.entity_ref, refs::raging());
                assert_eq!(condition.payload["damage_bonus"], 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_rage_bonus_scales() {
        let mut rage = Rage::new();
        let events = rage.activate(&activation(12)).unwrap();
        let GameEvent::ConditionApplied { condition, .. } = &events[0] else {
            panic!("expected condition applied");
        };
        assert_eq!(condition.payload["damage_bonus"], 3);
    }

    #[test]
    fn test_rage_refuses_while_raging() {
        let mut rage = Rage::new();
        let mut a = activation(1);
        a.active_conditions.insert(refs::raging());
        assert!(matches!(
            rage.activate(&a),
            Err(RulesError::AlreadyApplied(_))
        ));
    }

    #[test]
    fn test_passive_feature_cannot_activate() {
        let mut passive = PassiveFeature::new(EntityRecord::bare(refs::feature("danger_sense")));
        assert!(passive.resource().is_none());
        assert!(matches!(
            passive.activate(&activation(2)),
            Err(RulesError::NotActivatable(_))
        ));
        assert_eq!(
            passive.to_record().unwrap().entity_ref,
            refs::feature("danger_sense")
        );
    }
}
