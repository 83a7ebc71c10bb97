//! Bus registration and teardown for a character.
//!
//! An active character owns one subscription per topic it reacts to. Each
//! handler holds a weak reference to the character state and ignores events
//! about other characters.

use super::{lock, Character, CharacterState};
use crate::bus::{BusError, EventBus, GameEvent, Handler, Topic};
use crate::entity::{EntityContext, EntityRecord, Lifecycle};
use crate::error::RulesError;
use crate::ids::{EntityId, Ref};
use std::sync::{Arc, Mutex, Weak};

const TOPICS: [Topic; 7] = [
    Topic::ConditionApplied,
    Topic::ConditionRemoved,
    Topic::ActionGranted,
    Topic::ActionRemoved,
    Topic::HealingReceived,
    Topic::Rest,
    Topic::TurnEnd,
];

/// Apply every entity that is not applied yet.
fn apply_all<T: Lifecycle + ?Sized>(entities: &mut [Box<T>], bus: &dyn EventBus) -> Result<(), RulesError> {
    for entity in entities.iter_mut().filter(|e| !e.is_applied()) {
        entity.apply(bus)?;
    }
    Ok(())
}

/// Remove every entity, collecting failures instead of stopping.
fn remove_all<T: Lifecycle + ?Sized>(
    entities: &mut [Box<T>],
    bus: &dyn EventBus,
    owner: &EntityId,
    failures: &mut Vec<RulesError>,
) {
    for entity in entities.iter_mut() {
        if let Err(err) = entity.remove(bus) {
            tracing::warn!(
                character_id = %owner,
                entity = %entity.entity_ref(),
                error = %err,
                "remove failed during cleanup"
            );
            failures.push(err);
        }
    }
}

impl Character {
    /// Subscribe to the bus and apply every condition, feature and action.
    ///
    /// If anything fails, whatever was registered is torn down again and
    /// the first error is returned.
    pub fn activate(&self, bus: Arc<dyn EventBus>) -> Result<(), RulesError> {
        {
            let mut state = self.lock();
            if state.bus.is_some() {
                return Err(RulesError::invalid(
                    "bus",
                    format!("character {} is already active", self.id),
                ));
            }
            state.bus = Some(Arc::clone(&bus));
        }

        if let Err(err) = self.register(bus.as_ref()) {
            tracing::warn!(character_id = %self.id, error = %err, "activation failed, rolling back");
            if let Err(cleanup_err) = self.cleanup() {
                tracing::warn!(character_id = %self.id, error = %cleanup_err, "rollback incomplete");
            }
            return Err(err);
        }
        tracing::info!(character_id = %self.id, "character activated");
        Ok(())
    }

    fn register(&self, bus: &dyn EventBus) -> Result<(), RulesError> {
        for topic in TOPICS {
            let id = bus.subscribe(topic, self.handler())?;
            self.lock().subscriptions.push(id);
        }

        let (mut conditions, mut features, mut actions) = {
            let mut state = self.lock();
            (
                std::mem::take(&mut state.conditions),
                std::mem::take(&mut state.features),
                std::mem::take(&mut state.actions),
            )
        };
        let result = apply_all(&mut conditions, bus)
            .and_then(|()| apply_all(&mut features, bus))
            .and_then(|()| apply_all(&mut actions, bus));

        let mut state = self.lock();
        conditions.append(&mut state.conditions);
        features.append(&mut state.features);
        actions.append(&mut state.actions);
        state.conditions = conditions;
        state.features = features;
        state.actions = actions;
        result
    }

    fn handler(&self) -> Handler {
        let state = Arc::downgrade(&self.state);
        let owner = self.id.clone();
        Arc::new(move |event: &GameEvent, bus: &dyn EventBus| {
            if !event.is_for(&owner) {
                return Ok(());
            }
            let Some(state) = Weak::upgrade(&state) else {
                return Ok(());
            };
            handle(&state, &owner, event, bus).map_err(|err| match err {
                RulesError::Bus(err) => err,
                other => BusError::handler(event.topic(), other),
            })
        })
    }

    /// Remove every entity and release every subscription.
    ///
    /// Every step is attempted even when an earlier one fails. Temporary
    /// actions are dropped. The character keeps its sheet and its remaining
    /// entities and can be activated again.
    pub fn cleanup(&self) -> Result<(), RulesError> {
        let (bus, subscriptions, mut conditions, mut features, mut actions) = {
            let mut state = self.lock();
            let Some(bus) = state.bus.take() else {
                return Ok(());
            };
            (
                bus,
                std::mem::take(&mut state.subscriptions),
                std::mem::take(&mut state.conditions),
                std::mem::take(&mut state.features),
                std::mem::take(&mut state.actions),
            )
        };

        let mut failures = Vec::new();
        remove_all(&mut conditions, bus.as_ref(), &self.id, &mut failures);
        remove_all(&mut features, bus.as_ref(), &self.id, &mut failures);
        remove_all(&mut actions, bus.as_ref(), &self.id, &mut failures);
        actions.retain(|a| !a.is_temporary());
        for id in subscriptions {
            if let Err(err) = bus.unsubscribe(id) {
                tracing::warn!(character_id = %self.id, subscription = %id, error = %err, "unsubscribe failed");
                failures.push(err.into());
            }
        }

        {
            let mut state = self.lock();
            state.conditions = conditions;
            state.features = features;
            state.actions = actions;
        }

        let count = failures.len();
        match failures.into_iter().next() {
            None => {
                tracing::info!(character_id = %self.id, "character cleaned up");
                Ok(())
            }
            Some(first) => Err(RulesError::Cleanup {
                failures: count,
                first: Box::new(first),
            }),
        }
    }
}

fn handle(
    state: &Mutex<CharacterState>,
    owner: &EntityId,
    event: &GameEvent,
    bus: &dyn EventBus,
) -> Result<(), RulesError> {
    match event {
        GameEvent::ConditionApplied {
            condition, source, ..
        } => apply_condition(state, owner, condition, source, bus),
        GameEvent::ConditionRemoved {
            condition_ref,
            reason,
            ..
        } => {
            let Some(mut condition) = lock(state).take_condition(condition_ref) else {
                tracing::debug!(character_id = %owner, condition = %condition_ref, "condition not active");
                return Ok(());
            };
            tracing::debug!(character_id = %owner, condition = %condition_ref, %reason, "condition removed");
            condition.remove(bus)
        }
        GameEvent::ActionGranted { action, source, .. } => grant_action(state, owner, action, source, bus),
        GameEvent::ActionRemoved { action_ref, .. } => remove_action(state, owner, action_ref, bus),
        GameEvent::HealingReceived { amount, .. } => {
            let lifted = lock(state).apply_healing(*amount);
            match lifted {
                Some(mut unconscious) => unconscious.remove(bus),
                None => Ok(()),
            }
        }
        GameEvent::Rest { rest_type, .. } => {
            let lifted = lock(state).apply_rest(*rest_type);
            match lifted {
                Some(mut unconscious) => unconscious.remove(bus),
                None => Ok(()),
            }
        }
        GameEvent::TurnEnd { round, .. } => {
            let expired = lock(state).take_temporary_actions();
            if !expired.is_empty() {
                tracing::debug!(character_id = %owner, round, count = expired.len(), "temporary actions expired");
            }
            let mut first = None;
            for mut action in expired {
                if let Err(err) = action.remove(bus) {
                    first.get_or_insert(err);
                }
            }
            first.map_or(Ok(()), Err)
        }
        GameEvent::DamageReceived { .. } | GameEvent::AttackPerformed { .. } => Ok(()),
    }
}

fn apply_condition(
    state: &Mutex<CharacterState>,
    owner: &EntityId,
    record: &EntityRecord,
    source: &str,
    bus: &dyn EventBus,
) -> Result<(), RulesError> {
    let (registry, ctx) = {
        let state = lock(state);
        if state.has_condition(&record.entity_ref) {
            tracing::warn!(character_id = %owner, condition = %record.entity_ref, "condition already active");
            return Ok(());
        }
        let ctx = EntityContext {
            owner: owner.clone(),
            level: state.sheet.level,
        };
        (Arc::clone(&state.registry), ctx)
    };

    let mut condition = registry.build_condition(record, &ctx)?;
    match condition.apply(bus) {
        Ok(()) => {}
        Err(err) if err.is_already_applied() => {
            tracing::warn!(character_id = %owner, condition = %record.entity_ref, "condition applied twice");
        }
        Err(err) => {
            if let Err(remove_err) = condition.remove(bus) {
                tracing::warn!(character_id = %owner, error = %remove_err, "compensating remove failed");
            }
            return Err(err);
        }
    }
    lock(state).conditions.push(condition);
    tracing::debug!(character_id = %owner, condition = %record.entity_ref, source, "condition applied");
    Ok(())
}

fn grant_action(
    state: &Mutex<CharacterState>,
    owner: &EntityId,
    record: &EntityRecord,
    source: &str,
    bus: &dyn EventBus,
) -> Result<(), RulesError> {
    let (registry, ctx) = {
        let state = lock(state);
        if state.actions.iter().any(|a| a.entity_ref() == &record.entity_ref) {
            tracing::warn!(character_id = %owner, action = %record.entity_ref, "action already granted");
            return Ok(());
        }
        let ctx = EntityContext {
            owner: owner.clone(),
            level: state.sheet.level,
        };
        (Arc::clone(&state.registry), ctx)
    };

    let mut action = registry.build_action(record, &ctx)?;
    action.apply(bus)?;
    lock(state).actions.push(action);
    tracing::debug!(character_id = %owner, action = %record.entity_ref, source, "action granted");
    Ok(())
}

fn remove_action(
    state: &Mutex<CharacterState>,
    owner: &EntityId,
    action_ref: &Ref,
    bus: &dyn EventBus,
) -> Result<(), RulesError> {
    match lock(state).take_action(action_ref) {
        Some(mut action) => {
            tracing::debug!(character_id = %owner, action = %action_ref, "action removed");
            action.remove(bus)
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionDuration, GrantedAction};
    use crate::bus::Bus;
    use crate::character::data::{CharacterData, CharacterSheet, DeathSaves};
    use crate::conditions::{RagingCondition, UnarmoredDefense, UnarmoredVariant};
    use crate::entity::{refs, Registry};
    use crate::features::Rage;
    use crate::resource::{RecoverableResource, RestType};
    use std::collections::{BTreeMap, BTreeSet};

    fn data(id: &str) -> CharacterData {
        let sheet = CharacterSheet {
            id: EntityId::new(id),
            player_id: "p".into(),
            name: id.into(),
            level: 1,
            proficiency_bonus: 2,
            race_id: "human".into(),
            subrace_id: None,
            class_id: "barbarian".into(),
            subclass_id: None,
            background_id: "soldier".into(),
            speed: 30,
            ability_scores: crate::abilities::AbilityScores::new(17, 14, 16, 8, 10, 12),
            hit_points: 15,
            max_hit_points: 15,
            armor_class: 15,
            hit_die: 12,
            skills: BTreeMap::new(),
            saving_throws: BTreeMap::new(),
            languages: BTreeSet::new(),
            armor_proficiencies: BTreeSet::new(),
            weapon_proficiencies: BTreeSet::new(),
            tool_proficiencies: BTreeSet::new(),
            inventory: BTreeMap::new(),
            equipped: BTreeMap::new(),
            spell_slots: BTreeMap::new(),
            spells: BTreeSet::new(),
            cantrips: BTreeSet::new(),
            resources: BTreeMap::from([(
                Rage::RESOURCE.to_string(),
                RecoverableResource::new(Rage::RESOURCE, "Rage", 2, RestType::LongRest),
            )]),
            death_saves: DeathSaves::default(),
            choices: Vec::new(),
            provenance: Default::default(),
        };
        CharacterData {
            sheet,
            conditions: vec![UnarmoredDefense::record(UnarmoredVariant::Barbarian).unwrap()],
            features: vec![EntityRecord::bare(refs::rage())],
            actions: Vec::new(),
        }
    }

    fn load(id: &str, bus: &Arc<Bus>) -> Character {
        let bus: Arc<dyn EventBus> = bus.clone();
        Character::load(data(id), Arc::new(Registry::standard()), bus).unwrap()
    }

    #[test]
    fn test_activate_subscribes_once() {
        let bus = Arc::new(Bus::new());
        let grog = load("grog", &bus);
        assert!(grog.is_active());
        assert_eq!(bus.subscription_count(), TOPICS.len());
        assert!(grog.activate(bus.clone()).is_err());
        assert_eq!(bus.subscription_count(), TOPICS.len());
    }

    #[test]
    fn test_events_for_other_characters_are_ignored() {
        let bus = Arc::new(Bus::new());
        let grog = load("grog", &bus);
        let _pike = load("pike", &bus);
        bus.publish(&GameEvent::ConditionApplied {
            character_id: EntityId::new("pike"),
            condition: RagingCondition::record(2, "test").unwrap(),
            source: "test".into(),
        })
        .unwrap();
        assert!(!grog.has_condition(&refs::raging()));
    }

    #[test]
    fn test_duplicate_condition_is_tolerated() {
        let bus = Arc::new(Bus::new());
        let grog = load("grog", &bus);
        let event = GameEvent::ConditionApplied {
            character_id: EntityId::new("grog"),
            condition: RagingCondition::record(2, "test").unwrap(),
            source: "test".into(),
        };
        bus.publish(&event).unwrap();
        bus.publish(&event).unwrap();
        assert_eq!(grog.condition_refs(), vec![refs::unarmored_defense(), refs::raging()]);
    }

    #[test]
    fn test_unknown_condition_fails_the_publish() {
        let bus = Arc::new(Bus::new());
        let grog = load("grog", &bus);
        let err = bus
            .publish(&GameEvent::ConditionApplied {
                character_id: EntityId::new("grog"),
                condition: EntityRecord::bare(refs::condition("petrified")),
                source: "medusa".into(),
            })
            .unwrap_err();
        assert!(matches!(err, BusError::Handler { topic: Topic::ConditionApplied, .. }));
        assert_eq!(grog.condition_refs().len(), 1);
    }

    #[test]
    fn test_temporary_actions_expire_at_turn_end() {
        let bus = Arc::new(Bus::new());
        let grog = load("grog", &bus);
        for (name, duration) in [("shove", ActionDuration::Permanent), ("strike", ActionDuration::UntilTurnEnd)] {
            bus.publish(&GameEvent::ActionGranted {
                character_id: EntityId::new("grog"),
                action: GrantedAction::record(refs::action(name), duration).unwrap(),
                source: "test".into(),
            })
            .unwrap();
        }
        assert_eq!(grog.action_refs().len(), 2);
        bus.publish(&GameEvent::TurnEnd {
            character_id: EntityId::new("grog"),
            round: 1,
        })
        .unwrap();
        assert_eq!(grog.action_refs(), vec![refs::action("shove")]);

        bus.publish(&GameEvent::ActionRemoved {
            character_id: EntityId::new("grog"),
            action_ref: refs::action("shove"),
        })
        .unwrap();
        assert!(grog.action_refs().is_empty());
    }

    #[test]
    fn test_cleanup_releases_everything() {
        let bus = Arc::new(Bus::new());
        let grog = load("grog", &bus);
        grog.activate_feature(&refs::rage()).unwrap();
        assert!(bus.subscription_count() > TOPICS.len());

        grog.cleanup().unwrap();
        assert_eq!(bus.subscription_count(), 0);
        assert!(!grog.is_active());
        // Cleaning up twice is harmless.
        grog.cleanup().unwrap();
        // Conditions survive teardown and can be reactivated.
        assert_eq!(grog.condition_refs().len(), 2);
        grog.activate(bus.clone()).unwrap();
        assert!(grog.has_condition(&refs::raging()));
    }

    #[test]
    fn test_dropped_character_handlers_are_inert() {
        let bus = Arc::new(Bus::new());
        drop(load("grog", &bus));
        bus.publish(&GameEvent::Rest {
            character_id: EntityId::new("grog"),
            rest_type: RestType::LongRest,
        })
        .unwrap();
    }
}
