//! Choice module.
//!
//! Everything about player decisions during character creation:
//!
//! - [`choice`] - recorded decisions (`ChoiceData`) and their typed payloads
//! - [`requirement`] - choice slots declared by rules content, and the
//!   candidate answers (`Submission`) checked against them
//! - [`validation`] - the `Validator` and its `ValidationResult`

pub mod choice;
pub mod requirement;
pub mod validation;

pub use choice::{Category, ChoiceData, Selection, Source};
pub use requirement::{ChoiceOption, Requirement, SelectionInput, Submission};
pub use validation::{
    Issue, IssueCode, KnownSkills, Severity, SourcedRequirement, ValidationResult, Validator,
};
