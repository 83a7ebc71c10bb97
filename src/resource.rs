//! Recoverable resources module.
//!
//! Bounded counters (rage uses, ki points, hit dice) that deplete on use
//! and recover when a rest of the matching type occurs.

use crate::error::RulesError;
use serde::{Deserialize, Serialize};

/// The two kinds of rest.
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RestType {
    ShortRest,
    LongRest,
}

impl RestType {
    /// Whether a resource that resets on `reset` recovers during this rest.
    ///
    /// A long rest also covers everything a short rest restores.
    pub fn restores(self, reset: RestType) -> bool {
        match self {
            RestType::LongRest => true,
            RestType::ShortRest => reset == RestType::ShortRest,
        }
    }
}

/// How much a resource gets back when it recovers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// Back to maximum.
    #[default]
    Full,
    /// Half the maximum, rounded down, at least 1.
    Half,
    /// A fixed number of uses.
    Amount(u32),
}

impl Recovery {
    fn amount(self, maximum: u32) -> u32 {
        match self {
            Recovery::Full => maximum,
            Recovery::Half => (maximum / 2).max(1),
            Recovery::Amount(n) => n,
        }
    }
}

/// A depletable counter restored by rests.
///
/// # Examples
///
/// ```rust
/// use charsmith::resource::{RecoverableResource, Recovery, RestType};
///
/// let mut rage = RecoverableResource::new("rage", "Rage", 2, RestType::LongRest);
/// rage.use_resource(1).unwrap();
/// assert_eq!(rage.current(), 1);
///
/// assert!(!rage.on_rest(RestType::ShortRest));
/// assert!(rage.on_rest(RestType::LongRest));
/// assert_eq!(rage.current(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ResourceRecord")]
pub struct RecoverableResource {
    pub id: String,
    pub name: String,
    maximum: u32,
    current: u32,
    pub reset: RestType,
    #[serde(default)]
    pub recovery: Recovery,
}

/// Persisted shape of a resource. Loading goes through
/// [`RecoverableResource::restore_state`] so `current` never exceeds
/// `maximum`.
#[derive(Deserialize)]
struct ResourceRecord {
    id: String,
    name: String,
    maximum: u32,
    current: u32,
    reset: RestType,
    #[serde(default)]
    recovery: Recovery,
}

impl From<ResourceRecord> for RecoverableResource {
    fn from(record: ResourceRecord) -> Self {
        if record.current > record.maximum {
            tracing::warn!(
                resource = %record.id,
                current = record.current,
                maximum = record.maximum,
                "persisted resource above maximum, clamping"
            );
        }
        Self::restore_state(
            &record.id,
            &record.name,
            record.maximum,
            record.current,
            record.reset,
            record.recovery,
        )
    }
}

impl RecoverableResource {
    /// Create a full resource with [`Recovery::Full`].
    pub fn new(id: &str, name: &str, maximum: u32, reset: RestType) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            maximum,
            current: maximum,
            reset,
            recovery: Recovery::Full,
        }
    }

    pub fn with_recovery(mut self, recovery: Recovery) -> Self {
        self.recovery = recovery;
        self
    }

    /// Rebuild from persisted values, clamping `current` to `maximum`.
    pub fn restore_state(
        id: &str,
        name: &str,
        maximum: u32,
        current: u32,
        reset: RestType,
        recovery: Recovery,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            maximum,
            current: current.min(maximum),
            reset,
            recovery,
        }
    }

    pub fn maximum(&self) -> u32 {
        self.maximum
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    /// Spend `amount` uses. Fails without change if not enough remain.
    pub fn use_resource(&mut self, amount: u32) -> Result<(), RulesError> {
        if amount > self.current {
            return Err(RulesError::ResourceExhausted {
                resource: self.id.clone(),
                requested: amount,
                available: self.current,
            });
        }
        self.current -= amount;
        Ok(())
    }

    /// Give back up to `amount` uses, never past the maximum.
    pub fn restore(&mut self, amount: u32) {
        self.current = self.current.saturating_add(amount).min(self.maximum);
    }

    /// Recover if `rest` covers this resource's reset type.
    ///
    /// Returns `true` when recovery ran.
    pub fn on_rest(&mut self, rest: RestType) -> bool {
        if !rest.restores(self.reset) {
            return false;
        }
        self.restore(self.recovery.amount(self.maximum));
        true
    }
}
