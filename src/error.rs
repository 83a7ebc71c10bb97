//! Error types for draft construction, compilation and the runtime lifecycle.
//!
//! Validation mismatches are not errors: they are reported through
//! [`ValidationResult`](crate::choices::ValidationResult). `RulesError` covers
//! rejected input, unfinalizable drafts, unsupported rule content and
//! lifecycle failures.

use crate::bus::BusError;
use crate::draft::Step;
use crate::formula::FormulaError;
use crate::ids::Ref;
use thiserror::Error;

/// Join a list of messages into a single readable string.
fn format_issues(issues: &[String]) -> String {
    if issues.is_empty() {
        return String::from("(no details)");
    }
    issues.join("; ")
}

fn format_steps(steps: &[Step]) -> String {
    steps
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by drafts, the compiler and characters.
///
/// # Examples
///
/// ```rust
/// use charsmith::RulesError;
///
/// let err = RulesError::not_found("class", "artificer");
/// assert_eq!(err.to_string(), "Unknown class: artificer");
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RulesError {
    /// Required input was missing or malformed. Nothing was changed.
    #[error("Invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// A race, class, background, subrace, subclass or item id was not in the catalog.
    #[error("Unknown {kind}: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A selection referenced a choice slot no selected component declares.
    #[error("No requirement declares choice '{0}'")]
    UnknownChoice(String),

    /// A setter's submission failed validation; the draft is unchanged.
    #[error("Selection for '{choice_id}' rejected: {}", format_issues(.issues))]
    Rejected {
        choice_id: String,
        issues: Vec<String>,
    },

    /// `to_character` was called before every base step was completed.
    #[error("Draft is missing required steps: {}", format_steps(.missing))]
    DraftIncomplete { missing: Vec<Step> },

    /// `to_character` was called while required choices are outstanding.
    #[error("Draft cannot be finalized: {}", format_issues(.issues))]
    NotFinalizable { issues: Vec<String> },

    /// A resource maximum formula failed to evaluate.
    #[error("Formula for resource '{resource}' failed: {source}")]
    Formula {
        resource: String,
        #[source]
        source: FormulaError,
    },

    /// The rule content names an option that has no implementation yet.
    #[error("Unsupported {kind}: {value}")]
    Unsupported { kind: &'static str, value: String },

    /// The entity was already applied to the bus.
    #[error("Already applied: {0}")]
    AlreadyApplied(Ref),

    /// No constructor is registered for this ref.
    #[error("No constructor registered for {0}")]
    UnknownRef(Ref),

    /// The feature cannot be activated.
    #[error("Feature {0} cannot be activated")]
    NotActivatable(Ref),

    /// The character has not been activated on a bus.
    #[error("Character {0} is not active on an event bus")]
    NotActive(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Resource '{resource}' exhausted: requested {requested}, available {available}")]
    ResourceExhausted {
        resource: String,
        requested: u32,
        available: u32,
    },

    #[error("Item not in inventory: {0}")]
    ItemNotInInventory(String),

    #[error("Item '{item}' cannot be equipped in slot {slot}")]
    NotEquippable { item: String, slot: String },

    /// A persisted record could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Bus(#[from] BusError),

    /// One or more teardown steps failed. Every step was still attempted.
    #[error("Cleanup finished with {failures} failure(s); first: {first}")]
    Cleanup {
        failures: usize,
        first: Box<RulesError>,
    },
}

impl RulesError {
    /// Create a shape error for a named field.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a catalog lookup error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True when the error only signals a duplicate apply.
    pub fn is_already_applied(&self) -> bool {
        matches!(self, Self::AlreadyApplied(_))
    }
}

impl From<serde_json::Error> for RulesError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RulesError::invalid("name", "must not be empty");
        assert_eq!(err.to_string(), "Invalid name: must not be empty");
    }

    #[test]
    fn test_incomplete_display_lists_steps() {
        let err = RulesError::DraftIncomplete {
            missing: vec![Step::Name, Step::Background],
        };
        let display = err.to_string();
        assert!(display.contains("name"));
        assert!(display.contains("background"));
    }

    #[test]
    fn test_cleanup_display_references_first_failure() {
        let err = RulesError::Cleanup {
            failures: 2,
            first: Box::new(RulesError::UnknownResource("ki".into())),
        };
        let display = err.to_string();
        assert!(display.contains("2 failure"));
        assert!(display.contains("ki"));
    }

    #[test]
    fn test_already_applied_predicate() {
        let r = Ref::new("dnd5e", "conditions", "raging");
        assert!(RulesError::AlreadyApplied(r.clone()).is_already_applied());
        assert!(!RulesError::UnknownRef(r).is_already_applied());
    }
}
