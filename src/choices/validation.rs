//! Submission validation.
//!
//! The validator compares submissions against requirements and reports
//! what is wrong without touching any state. Problems come in three
//! severities:
//!
//! - `Error`: the submission is malformed (bad option, duplicate pick,
//!   too many picks). Blocks saving.
//! - `Incomplete`: something is still owed (missing or short submission,
//!   unmet prerequisite). Blocks finalizing only.
//! - warnings: redundant or unrecognized input. Never blocks.

use super::choice::{Category, Source};
use super::requirement::{ChoiceOption, Requirement, Submission};
use crate::proficiency::Skill;
use crate::rules::RulesCatalog;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Incomplete,
    Warning,
}

/// Machine-readable reason for an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueCode {
    MissingRequired,
    TooFewChoices,
    TooManyChoices,
    InvalidOption,
    CategoryMismatch,
    DuplicateSelection,
    DuplicateChoice,
    RedundantChoice,
    PrerequisiteNotMet,
    UnknownChoice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub code: IssueCode,
    pub severity: Severity,
    pub choice_id: Option<String>,
    pub message: String,
}

/// Outcome of a validation pass.
///
/// `errors` holds both hard errors and incomplete items; `can_save` is
/// false only when a hard error is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub can_save: bool,
    pub can_finalize: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            can_save: true,
            can_finalize: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ValidationResult {
    pub fn push(&mut self, code: IssueCode, severity: Severity, choice_id: Option<&str>, message: String) {
        let issue = Issue {
            code,
            severity,
            choice_id: choice_id.map(str::to_string),
            message,
        };
        match severity {
            Severity::Warning => self.warnings.push(issue),
            Severity::Error => {
                self.can_save = false;
                self.can_finalize = false;
                self.errors.push(issue);
            }
            Severity::Incomplete => {
                self.can_finalize = false;
                self.errors.push(issue);
            }
        }
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.can_save &= other.can_save;
        self.can_finalize &= other.can_finalize;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Messages of hard errors only.
    pub fn hard_errors(&self) -> Vec<String> {
        self.errors
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.message.clone())
            .collect()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|i| i.message.clone()).collect()
    }

    pub fn has_code(&self, code: IssueCode) -> bool {
        self.errors.iter().chain(&self.warnings).any(|i| i.code == code)
    }
}

/// A requirement together with the component that declared it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedRequirement {
    pub source: Source,
    pub requirement: Requirement,
}

impl SourcedRequirement {
    pub fn new(source: Source, requirement: Requirement) -> Self {
        Self {
            source,
            requirement,
        }
    }
}

/// Skills the character already has before any submitted pick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownSkills {
    /// Fixed grants from race, class or background.
    pub granted: BTreeMap<Skill, Source>,
    /// Skills chosen in earlier, already recorded selections.
    pub chosen: BTreeSet<Skill>,
}

impl KnownSkills {
    fn is_proficient(&self, skill: Skill) -> bool {
        self.granted.contains_key(&skill) || self.chosen.contains(&skill)
    }
}

/// Checks submissions against requirements using catalog item data for
/// tagged options.
pub struct Validator<'a> {
    catalog: &'a dyn RulesCatalog,
}

impl<'a> Validator<'a> {
    pub fn new(catalog: &'a dyn RulesCatalog) -> Self {
        Self { catalog }
    }

    /// Validate `submissions` against `requirements`.
    ///
    /// Requirements without a submission are reported as incomplete.
    /// Submissions for an undeclared choice id are reported as warnings.
    pub fn validate(
        &self,
        requirements: &[SourcedRequirement],
        submissions: &[Submission],
        known: &KnownSkills,
    ) -> ValidationResult {
        let mut result = ValidationResult::default();

        let mut by_id: BTreeMap<&str, &Submission> = BTreeMap::new();
        for submission in submissions {
            let id = submission.choice_id.as_str();
            if by_id.insert(id, submission).is_some() {
                result.push(
                    IssueCode::DuplicateChoice,
                    Severity::Error,
                    Some(id),
                    format!("choice '{}' submitted more than once", id),
                );
            }
            if !requirements.iter().any(|r| r.requirement.choice_id == id) {
                result.push(
                    IssueCode::UnknownChoice,
                    Severity::Warning,
                    Some(id),
                    format!("no requirement declares choice '{}'", id),
                );
            }
        }

        // Skills picked anywhere in this batch count toward expertise.
        let mut proficient = known.clone();
        for submission in submissions.iter().filter(|s| s.category == Category::Skills) {
            if let Ok(values) = submission.values() {
                proficient
                    .chosen
                    .extend(values.iter().filter_map(|v| v.parse::<Skill>().ok()));
            }
        }

        let mut picked_skills: BTreeMap<Skill, String> = BTreeMap::new();
        for sourced in requirements {
            let req = &sourced.requirement;
            match by_id.get(req.choice_id.as_str()) {
                None => result.push(
                    IssueCode::MissingRequired,
                    Severity::Incomplete,
                    Some(&req.choice_id),
                    format!("{}: choose {}", req.label, req.count),
                ),
                Some(submission) => self.check(
                    req,
                    submission,
                    known,
                    &proficient,
                    &mut picked_skills,
                    &mut result,
                ),
            }
        }

        tracing::debug!(
            requirements = requirements.len(),
            submissions = submissions.len(),
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "validated submissions"
        );
        result
    }

    fn check(
        &self,
        req: &Requirement,
        submission: &Submission,
        known: &KnownSkills,
        proficient: &KnownSkills,
        picked_skills: &mut BTreeMap<Skill, String>,
        result: &mut ValidationResult,
    ) {
        let id = Some(req.choice_id.as_str());

        if submission.category != req.category {
            result.push(
                IssueCode::CategoryMismatch,
                Severity::Error,
                id,
                format!(
                    "{}: expected {} but got {}",
                    req.label, req.category, submission.category
                ),
            );
            return;
        }

        let values = match submission.values() {
            Ok(values) => values,
            Err(reason) => {
                result.push(IssueCode::InvalidOption, Severity::Error, id, reason);
                return;
            }
        };

        let mut seen = BTreeSet::new();
        for value in &values {
            if !seen.insert(value.as_str()) {
                result.push(
                    IssueCode::DuplicateSelection,
                    Severity::Error,
                    id,
                    format!("duplicate selection: {}", value),
                );
            }
        }

        if values.len() < req.count {
            result.push(
                IssueCode::TooFewChoices,
                Severity::Incomplete,
                id,
                format!(
                    "{}: choose {} more",
                    req.label,
                    req.count - values.len()
                ),
            );
        } else if values.len() > req.count {
            result.push(
                IssueCode::TooManyChoices,
                Severity::Error,
                id,
                format!(
                    "{}: expected {} selections, got {}",
                    req.label,
                    req.count,
                    values.len()
                ),
            );
        }

        for value in seen {
            if !self.well_formed(req.category, value) {
                result.push(
                    IssueCode::InvalidOption,
                    Severity::Error,
                    id,
                    format!("unknown {} '{}'", req.category, value),
                );
                continue;
            }
            if !self.allowed(req, value) {
                result.push(
                    IssueCode::InvalidOption,
                    Severity::Error,
                    id,
                    format!("'{}' is not an option for {}", value, req.label),
                );
                continue;
            }

            let skill = value.parse::<Skill>().ok();
            match (req.category, skill) {
                (Category::Skills, Some(skill)) => {
                    if let Some(source) = known.granted.get(&skill) {
                        result.push(
                            IssueCode::RedundantChoice,
                            Severity::Warning,
                            id,
                            format!("{} already granted by {}", skill, source),
                        );
                    } else if let Some(other) = picked_skills.get(&skill) {
                        result.push(
                            IssueCode::RedundantChoice,
                            Severity::Warning,
                            id,
                            format!("{} already chosen for {}", skill, other),
                        );
                    }
                    picked_skills
                        .entry(skill)
                        .or_insert_with(|| req.choice_id.clone());
                }
                (Category::Expertise, Some(skill)) if !proficient.is_proficient(skill) => {
                    result.push(
                        IssueCode::PrerequisiteNotMet,
                        Severity::Incomplete,
                        id,
                        format!("expertise in {} requires proficiency", skill),
                    );
                }
                _ => {}
            }
        }
    }

    fn well_formed(&self, category: Category, value: &str) -> bool {
        match category {
            Category::Skills | Category::Expertise => value.parse::<Skill>().is_ok(),
            Category::Equipment => self.catalog.item(value).is_some(),
            _ => !value.is_empty(),
        }
    }

    fn allowed(&self, req: &Requirement, value: &str) -> bool {
        req.accepts_any()
            || req.options.iter().any(|option| match option {
                ChoiceOption::Exact(exact) => exact == value,
                ChoiceOption::Tagged(tag) => self
                    .catalog
                    .item(value)
                    .is_some_and(|item| item.has_tag(tag)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ItemData, Rulebook};

    fn catalog() -> Rulebook {
        let mut book = Rulebook::new();
        book.add_item(ItemData::weapon("greataxe", "Greataxe", "martial", true).with_tags(&["martial", "martial_melee"]));
        book.add_item(ItemData::weapon("handaxe", "Handaxe", "simple", true).with_tags(&["simple", "simple_melee"]));
        book
    }

    fn skills_req() -> Vec<SourcedRequirement> {
        vec![SourcedRequirement::new(
            Source::Class,
            Requirement::new("barbarian_skills", "Barbarian skills", Category::Skills, 2)
                .with_exact(&["animal_handling", "athletics", "intimidation", "nature", "perception", "survival"]),
        )]
    }

    #[test]
    fn test_duplicate_selection_blocks_save() {
        let book = catalog();
        let validator = Validator::new(&book);
        let subs = [Submission::new(Category::Skills, "barbarian_skills", ["athletics", "athletics"])];
        let result = validator.validate(&skills_req(), &subs, &KnownSkills::default());
        assert!(!result.can_save);
        assert!(result
            .error_messages()
            .iter()
            .any(|m| m.contains("duplicate selection")));

        let fixed = [Submission::new(Category::Skills, "barbarian_skills", ["athletics", "survival"])];
        let result = validator.validate(&skills_req(), &fixed, &KnownSkills::default());
        assert!(result.can_save);
        assert!(result.can_finalize);
    }

    #[test]
    fn test_missing_and_short_are_incomplete() {
        let book = catalog();
        let validator = Validator::new(&book);
        let result = validator.validate(&skills_req(), &[], &KnownSkills::default());
        assert!(result.can_save);
        assert!(!result.can_finalize);
        assert!(result.has_code(IssueCode::MissingRequired));

        let subs = [Submission::new(Category::Skills, "barbarian_skills", "athletics")];
        let result = validator.validate(&skills_req(), &subs, &KnownSkills::default());
        assert!(result.can_save);
        assert!(result.has_code(IssueCode::TooFewChoices));
    }

    #[test]
    fn test_too_many_is_error() {
        let book = catalog();
        let validator = Validator::new(&book);
        let subs = [Submission::new(
            Category::Skills,
            "barbarian_skills",
            ["athletics", "survival", "nature"],
        )];
        let result = validator.validate(&skills_req(), &subs, &KnownSkills::default());
        assert!(!result.can_save);
        assert!(result.has_code(IssueCode::TooManyChoices));
    }

    #[test]
    fn test_option_outside_list_rejected() {
        let book = catalog();
        let validator = Validator::new(&book);
        let subs = [Submission::new(Category::Skills, "barbarian_skills", ["athletics", "stealth"])];
        let result = validator.validate(&skills_req(), &subs, &KnownSkills::default());
        assert!(!result.can_save);
        assert!(result.has_code(IssueCode::InvalidOption));
    }

    #[test]
    fn test_granted_skill_is_warning() {
        let book = catalog();
        let validator = Validator::new(&book);
        let mut known = KnownSkills::default();
        known.granted.insert(Skill::Athletics, Source::Background);
        let subs = [Submission::new(Category::Skills, "barbarian_skills", ["athletics", "survival"])];
        let result = validator.validate(&skills_req(), &subs, &known);
        assert!(result.can_save);
        assert!(result.can_finalize);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].message.contains("already granted"));
    }

    #[test]
    fn test_tagged_option_checks_item_tags() {
        let book = catalog();
        let validator = Validator::new(&book);
        let reqs = vec![SourcedRequirement::new(
            Source::Class,
            Requirement::new("weapon", "A martial weapon", Category::Equipment, 1).with_tag("martial"),
        )];
        let ok = [Submission::new(Category::Equipment, "weapon", "greataxe")];
        assert!(validator.validate(&reqs, &ok, &KnownSkills::default()).can_finalize);

        let wrong_tag = [Submission::new(Category::Equipment, "weapon", "handaxe")];
        assert!(!validator.validate(&reqs, &wrong_tag, &KnownSkills::default()).can_save);

        let unknown = [Submission::new(Category::Equipment, "weapon", "lightsaber")];
        assert!(!validator.validate(&reqs, &unknown, &KnownSkills::default()).can_save);
    }

    #[test]
    fn test_expertise_requires_proficiency() {
        let book = catalog();
        let validator = Validator::new(&book);
        let reqs = vec![
            SourcedRequirement::new(
                Source::Class,
                Requirement::new("rogue_skills", "Rogue skills", Category::Skills, 1),
            ),
            SourcedRequirement::new(
                Source::Class,
                Requirement::new("rogue_expertise", "Expertise", Category::Expertise, 2),
            ),
        ];
        let subs = [
            Submission::new(Category::Skills, "rogue_skills", "stealth"),
            Submission::new(Category::Expertise, "rogue_expertise", ["stealth", "arcana"]),
        ];
        let result = validator.validate(&reqs, &subs, &KnownSkills::default());
        assert!(result.can_save);
        assert!(!result.can_finalize);
        assert!(result.has_code(IssueCode::PrerequisiteNotMet));

        let mut known = KnownSkills::default();
        known.granted.insert(Skill::Arcana, Source::Background);
        let result = validator.validate(&reqs, &subs, &known);
        assert!(result.can_finalize);
    }

    #[test]
    fn test_unknown_choice_is_warning() {
        let book = catalog();
        let validator = Validator::new(&book);
        let subs = [
            Submission::new(Category::Skills, "barbarian_skills", ["athletics", "survival"]),
            Submission::new(Category::Languages, "bonus_language", "elvish"),
        ];
        let result = validator.validate(&skills_req(), &subs, &KnownSkills::default());
        assert!(result.can_finalize);
        assert!(result.has_code(IssueCode::UnknownChoice));
    }

    #[test]
    fn test_category_mismatch() {
        let book = catalog();
        let validator = Validator::new(&book);
        let subs = [Submission::new(Category::Languages, "barbarian_skills", ["athletics", "survival"])];
        let result = validator.validate(&skills_req(), &subs, &KnownSkills::default());
        assert!(result.has_code(IssueCode::CategoryMismatch));
        assert!(!result.can_save);
    }
}
