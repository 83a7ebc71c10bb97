//! Provenance module.
//!
//! Records where every compiled trait came from, so a finished character
//! can explain itself: which sources granted a skill, and how each ability
//! score was built up.

use crate::abilities::Ability;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Origin breakdown for a compiled character.
///
/// # Examples
///
/// ```rust
/// use charsmith::Provenance;
///
/// let mut p = Provenance::new();
/// p.record("skill", "athletics", "background:soldier");
/// p.record("skill", "athletics", "choice:barbarian_skills");
/// p.record("skill", "athletics", "background:soldier");
///
/// let origins = p.origins("skill", "athletics");
/// assert_eq!(origins.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// `kind:value` -> labels of every source that produced it.
    pub traits: BTreeMap<String, BTreeSet<String>>,
    /// Per-ability list of `(label, contribution)` steps.
    pub abilities: BTreeMap<Ability, Vec<(String, i32)>>,
}

impl Provenance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: &str, value: &str, origin: impl Into<String>) {
        self.traits
            .entry(format!("{}:{}", kind, value))
            .or_default()
            .insert(origin.into());
    }

    /// Every source label recorded for a trait, sorted.
    pub fn origins(&self, kind: &str, value: &str) -> Vec<&str> {
        self.traits
            .get(&format!("{}:{}", kind, value))
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn record_ability(&mut self, ability: Ability, origin: impl Into<String>, amount: i32) {
        self.abilities
            .entry(ability)
            .or_default()
            .push((origin.into(), amount));
    }
}
