//! Granted actions.
//!
//! Every action ref loads as a [`GrantedAction`]. Its payload carries a
//! [`ActionDuration`]; temporary actions are dropped by their owner at turn
//! end and during cleanup.

use crate::bus::EventBus;
use crate::entity::{Action, EntityContext, EntityRecord, Lifecycle, Registry};
use crate::error::RulesError;
use crate::ids::Ref;
use serde::{Deserialize, Serialize};

pub(crate) fn register(registry: &mut Registry) {
    registry.set_generic_action(GrantedAction::from_record);
}

/// How long a granted action stays available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionDuration {
    #[default]
    Permanent,
    UntilTurnEnd,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ActionPayload {
    duration: ActionDuration,
}

/// An action made available to a character, e.g. an off-hand strike
/// granted for the rest of the turn.
///
/// # Examples
///
/// ```rust
/// use charsmith::actions::{ActionDuration, GrantedAction};
/// use charsmith::entity::{refs, Action};
///
/// let strike = GrantedAction::new(refs::action("off_hand_strike"), ActionDuration::UntilTurnEnd);
/// assert!(strike.is_temporary());
/// ```
#[derive(Debug, Clone)]
pub struct GrantedAction {
    entity_ref: Ref,
    duration: ActionDuration,
    applied: bool,
}

impl GrantedAction {
    pub fn new(entity_ref: Ref, duration: ActionDuration) -> Self {
        Self {
            entity_ref,
            duration,
            applied: false,
        }
    }

    pub fn duration(&self) -> ActionDuration {
        self.duration
    }

    /// Record suitable for an `ActionGranted` event.
    pub fn record(entity_ref: Ref, duration: ActionDuration) -> Result<EntityRecord, RulesError> {
        EntityRecord::from_payload(entity_ref, &ActionPayload { duration })
    }

    fn from_record(record: &EntityRecord, _ctx: &EntityContext) -> Result<Box<dyn Action>, RulesError> {
        let payload: ActionPayload = record.decode()?;
        Ok(Box::new(Self::new(record.entity_ref.clone(), payload.duration)))
    }
}

impl Lifecycle for GrantedAction {
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
        Self::record(self.entity_ref.clone(), self.duration)
    }
}

impl Action for GrantedAction {
    fn is_temporary(&self) -> bool {
        self.duration == ActionDuration::UntilTurnEnd
    }
}
