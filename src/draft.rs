//! Draft module.
//!
//! A [`Draft`] is a resumable, serializable character under construction.
//! It is only mutated through its setters. Each setter checks its input,
//! validates any submissions against the requirements of the component it
//! touches, and either commits the whole change or leaves the draft as it
//! was.
//!
//! Progress is a set of completed [`Step`]s. The five base steps (name,
//! race, class, background, ability scores) are required before
//! [`Draft::to_character`] will compile; the category steps (skills,
//! languages, equipment, spells) are informational.

use crate::abilities::{AbilityScores, ScoreMethod};
use crate::bus::EventBus;
use crate::character::{Character, CharacterData};
use crate::choices::{
    Category, ChoiceData, IssueCode, KnownSkills, Selection, Severity, Source, SourcedRequirement,
    Submission, ValidationResult, Validator,
};
use crate::compiler;
use crate::config::EngineConfig;
use crate::entity::Registry;
use crate::error::RulesError;
use crate::grant::GrantSource;
use crate::proficiency::Skill;
use crate::rules::{require_background, require_class, require_race, RulesCatalog};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strum::IntoEnumIterator;

/// A creation step tracked in a draft's progress.
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
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Step {
    Name,
    Race,
    Class,
    Background,
    AbilityScores,
    Skills,
    Languages,
    Equipment,
    Spells,
}

impl Step {
    /// Steps that must be complete before a draft can be compiled.
    pub const BASE: [Step; 5] = [
        Step::Name,
        Step::Race,
        Step::Class,
        Step::Background,
        Step::AbilityScores,
    ];

    /// The category step a recorded choice completes, if any.
    pub fn for_category(category: Category) -> Option<Step> {
        match category {
            Category::Skills | Category::Expertise => Some(Step::Skills),
            Category::Languages => Some(Step::Languages),
            Category::Equipment => Some(Step::Equipment),
            Category::Spells | Category::Cantrips => Some(Step::Spells),
            _ => None,
        }
    }
}

fn required(field: &str, value: &str) -> Result<String, RulesError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RulesError::invalid(field, "must not be empty"));
    }
    Ok(value.to_string())
}

/// A character under construction.
///
/// # Examples
///
/// ```rust
/// use charsmith::draft::{Draft, Step};
///
/// let mut draft = Draft::new("draft-1", "player-1");
/// draft.set_name("Grog").unwrap();
/// assert!(draft.is_complete(Step::Name));
/// assert!(draft.set_name("  ").is_err());
/// assert_eq!(draft.name(), Some("Grog"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub player_id: String,
    name: Option<String>,
    race_id: Option<String>,
    subrace_id: Option<String>,
    class_id: Option<String>,
    subclass_id: Option<String>,
    background_id: Option<String>,
    ability_scores: Option<AbilityScores>,
    score_method: Option<ScoreMethod>,
    choices: Vec<ChoiceData>,
    progress: BTreeSet<Step>,
    /// Result of the last `validate_choices` call.
    #[serde(skip)]
    last_validation: Option<ValidationResult>,
}

impl Draft {
    pub fn new(id: &str, player_id: &str) -> Self {
        Self {
            id: id.to_string(),
            player_id: player_id.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn race_id(&self) -> Option<&str> {
        self.race_id.as_deref()
    }

    pub fn subrace_id(&self) -> Option<&str> {
        self.subrace_id.as_deref()
    }

    pub fn class_id(&self) -> Option<&str> {
        self.class_id.as_deref()
    }

    pub fn subclass_id(&self) -> Option<&str> {
        self.subclass_id.as_deref()
    }

    pub fn background_id(&self) -> Option<&str> {
        self.background_id.as_deref()
    }

    pub fn ability_scores(&self) -> Option<&AbilityScores> {
        self.ability_scores.as_ref()
    }

    pub fn score_method(&self) -> Option<ScoreMethod> {
        self.score_method
    }

    /// Recorded choices in the order they were first made.
    pub fn choices(&self) -> &[ChoiceData] {
        &self.choices
    }

    pub fn choice(&self, category: Category, choice_id: &str) -> Option<&ChoiceData> {
        self.choices.iter().find(|c| c.same_slot(category, choice_id))
    }

    pub fn progress(&self) -> &BTreeSet<Step> {
        &self.progress
    }

    pub fn is_complete(&self, step: Step) -> bool {
        self.progress.contains(&step)
    }

    /// Base steps not completed yet, in canonical order.
    pub fn missing_steps(&self) -> Vec<Step> {
        Step::BASE
            .into_iter()
            .filter(|s| !self.progress.contains(s))
            .collect()
    }

    pub fn last_validation(&self) -> Option<&ValidationResult> {
        self.last_validation.as_ref()
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), RulesError> {
        let name = required("name", name)?;
        self.upsert(ChoiceData::new(
            Source::Player,
            "name",
            Selection::Name(name.clone()),
        ));
        self.name = Some(name);
        self.refresh_progress();
        tracing::debug!(draft_id = %self.id, "name set");
        Ok(())
    }

    /// Set the race and, optionally, its subrace.
    ///
    /// Choosing a different race or subrace discards every choice the
    /// previous race asked for. `choices` answer the new race's
    /// requirements; any left unanswered stay outstanding.
    pub fn set_race(
        &mut self,
        catalog: &dyn RulesCatalog,
        race_id: &str,
        subrace_id: Option<&str>,
        choices: &[Submission],
    ) -> Result<ValidationResult, RulesError> {
        let race_id = required("race_id", race_id)?;
        let race = require_race(catalog, &race_id)?;
        let subrace_id = subrace_id.map(|s| required("subrace_id", s)).transpose()?;
        if let Some(sub) = &subrace_id {
            if race.subrace(sub).is_none() {
                return Err(RulesError::not_found("subrace", sub.clone()));
            }
        }

        let mut next = self.clone();
        if next.race_id.as_deref() != Some(race_id.as_str()) || next.subrace_id != subrace_id {
            next.drop_source(Source::Race);
        }
        next.upsert(ChoiceData::new(
            Source::Player,
            "race",
            Selection::Race {
                race_id: race_id.clone(),
                subrace_id: subrace_id.clone(),
            },
        ));
        next.race_id = Some(race_id);
        next.subrace_id = subrace_id;
        let result = next.apply_component(catalog, Source::Race, choices)?;
        *self = next;
        tracing::debug!(draft_id = %self.id, race = ?self.race_id, subrace = ?self.subrace_id, "race set");
        Ok(result)
    }

    /// Set the class and, optionally, its subclass.
    pub fn set_class(
        &mut self,
        catalog: &dyn RulesCatalog,
        class_id: &str,
        subclass_id: Option<&str>,
        choices: &[Submission],
    ) -> Result<ValidationResult, RulesError> {
        let class_id = required("class_id", class_id)?;
        let class = require_class(catalog, &class_id)?;
        let subclass_id = subclass_id.map(|s| required("subclass_id", s)).transpose()?;
        if let Some(sub) = &subclass_id {
            if class.subclass(sub).is_none() {
                return Err(RulesError::not_found("subclass", sub.clone()));
            }
        }

        let mut next = self.clone();
        if next.class_id.as_deref() != Some(class_id.as_str()) || next.subclass_id != subclass_id {
            next.drop_source(Source::Class);
        }
        next.upsert(ChoiceData::new(
            Source::Player,
            "class",
            Selection::Class {
                class_id: class_id.clone(),
                subclass_id: subclass_id.clone(),
            },
        ));
        next.class_id = Some(class_id);
        next.subclass_id = subclass_id;
        let result = next.apply_component(catalog, Source::Class, choices)?;
        *self = next;
        tracing::debug!(draft_id = %self.id, class = ?self.class_id, subclass = ?self.subclass_id, "class set");
        Ok(result)
    }

    pub fn set_background(
        &mut self,
        catalog: &dyn RulesCatalog,
        background_id: &str,
        choices: &[Submission],
    ) -> Result<ValidationResult, RulesError> {
        let background_id = required("background_id", background_id)?;
        require_background(catalog, &background_id)?;

        let mut next = self.clone();
        if next.background_id.as_deref() != Some(background_id.as_str()) {
            next.drop_source(Source::Background);
        }
        next.upsert(ChoiceData::new(
            Source::Player,
            "background",
            Selection::Background(background_id.clone()),
        ));
        next.background_id = Some(background_id);
        let result = next.apply_component(catalog, Source::Background, choices)?;
        *self = next;
        tracing::debug!(draft_id = %self.id, background = ?self.background_id, "background set");
        Ok(result)
    }

    /// Set base ability scores, checked against the generation method.
    pub fn set_ability_scores(
        &mut self,
        scores: AbilityScores,
        method: ScoreMethod,
        config: &EngineConfig,
    ) -> Result<(), RulesError> {
        method.validate(&scores, config)?;
        self.upsert(ChoiceData::new(
            Source::Player,
            "ability_scores",
            Selection::AbilityScores { scores, method },
        ));
        self.ability_scores = Some(scores);
        self.score_method = Some(method);
        self.refresh_progress();
        tracing::debug!(draft_id = %self.id, %method, "ability scores set");
        Ok(())
    }

    /// Answer one requirement of the currently selected race, class or
    /// background.
    ///
    /// The submission is validated against that requirement alone. Hard
    /// errors reject it; a short selection is stored and reported as
    /// outstanding. An entry already recorded for the same slot is
    /// replaced.
    pub fn select(
        &mut self,
        catalog: &dyn RulesCatalog,
        submission: Submission,
    ) -> Result<ValidationResult, RulesError> {
        if !submission.category.is_selectable() {
            return Err(RulesError::invalid(
                "category",
                format!("{} has its own setter", submission.category),
            ));
        }
        let sources = self.grant_sources(catalog)?;
        let requirement = sources
            .iter()
            .flat_map(|s| s.sourced_requirements())
            .find(|r| r.requirement.choice_id == submission.choice_id)
            .ok_or_else(|| RulesError::UnknownChoice(submission.choice_id.clone()))?;

        let excluding = BTreeSet::from([submission.choice_id.as_str()]);
        let known = self.known_skills(&sources, &excluding);
        let result = Validator::new(catalog).validate(
            std::slice::from_ref(&requirement),
            std::slice::from_ref(&submission),
            &known,
        );
        if !result.can_save {
            return Err(RulesError::Rejected {
                choice_id: submission.choice_id,
                issues: result.hard_errors(),
            });
        }

        let choice = Self::to_choice(requirement.source, &submission)?;
        self.upsert(choice);
        self.refresh_progress();
        tracing::debug!(
            draft_id = %self.id,
            choice_id = %submission.choice_id,
            category = %submission.category,
            "selection recorded"
        );
        Ok(result)
    }

    pub fn select_skills(
        &mut self,
        catalog: &dyn RulesCatalog,
        choice_id: &str,
        skills: &[Skill],
    ) -> Result<ValidationResult, RulesError> {
        let values: Vec<String> = skills.iter().map(|s| s.to_string()).collect();
        self.select(catalog, Submission::new(Category::Skills, choice_id, values))
    }

    pub fn select_expertise(
        &mut self,
        catalog: &dyn RulesCatalog,
        choice_id: &str,
        skills: &[Skill],
    ) -> Result<ValidationResult, RulesError> {
        let values: Vec<String> = skills.iter().map(|s| s.to_string()).collect();
        self.select(catalog, Submission::new(Category::Expertise, choice_id, values))
    }

    pub fn select_languages(
        &mut self,
        catalog: &dyn RulesCatalog,
        choice_id: &str,
        languages: &[&str],
    ) -> Result<ValidationResult, RulesError> {
        self.select(catalog, Submission::new(Category::Languages, choice_id, languages))
    }

    pub fn select_equipment(
        &mut self,
        catalog: &dyn RulesCatalog,
        choice_id: &str,
        items: &[&str],
    ) -> Result<ValidationResult, RulesError> {
        self.select(catalog, Submission::new(Category::Equipment, choice_id, items))
    }

    pub fn select_fighting_style(
        &mut self,
        catalog: &dyn RulesCatalog,
        choice_id: &str,
        style: &str,
    ) -> Result<ValidationResult, RulesError> {
        self.select(catalog, Submission::new(Category::FightingStyle, choice_id, style))
    }

    pub fn select_spells(
        &mut self,
        catalog: &dyn RulesCatalog,
        choice_id: &str,
        spells: &[&str],
    ) -> Result<ValidationResult, RulesError> {
        self.select(catalog, Submission::new(Category::Spells, choice_id, spells))
    }

    pub fn select_cantrips(
        &mut self,
        catalog: &dyn RulesCatalog,
        choice_id: &str,
        cantrips: &[&str],
    ) -> Result<ValidationResult, RulesError> {
        self.select(catalog, Submission::new(Category::Cantrips, choice_id, cantrips))
    }

    pub fn select_tools(
        &mut self,
        catalog: &dyn RulesCatalog,
        choice_id: &str,
        tools: &[&str],
    ) -> Result<ValidationResult, RulesError> {
        self.select(catalog, Submission::new(Category::Tools, choice_id, tools))
    }

    /// Validate the whole draft and cache the result.
    ///
    /// Checks the base steps, subrace and subclass completeness, and every
    /// requirement of the selected components against the recorded
    /// choices. Calling it twice without changes yields the same result.
    pub fn validate_choices(
        &mut self,
        catalog: &dyn RulesCatalog,
        config: &EngineConfig,
    ) -> ValidationResult {
        let mut result = ValidationResult::default();
        for step in self.missing_steps() {
            result.push(
                IssueCode::MissingRequired,
                Severity::Incomplete,
                Some(step.as_ref()),
                format!("{} not set", step),
            );
        }

        match self.grant_sources(catalog) {
            Ok(sources) => {
                self.check_subtypes(catalog, config, &mut result);
                let requirements: Vec<SourcedRequirement> =
                    sources.iter().flat_map(|s| s.sourced_requirements()).collect();
                let known = self.known_skills(&sources, &self.choice_ids());
                result.merge(Validator::new(catalog).validate(
                    &requirements,
                    &self.submissions(),
                    &known,
                ));
            }
            Err(err) => result.push(
                IssueCode::InvalidOption,
                Severity::Error,
                None,
                err.to_string(),
            ),
        }

        tracing::debug!(
            draft_id = %self.id,
            can_save = result.can_save,
            can_finalize = result.can_finalize,
            "draft validated"
        );
        self.last_validation = Some(result.clone());
        result
    }

    /// Compile the draft into persisted character data without activating
    /// it.
    pub fn compile(
        &mut self,
        catalog: &dyn RulesCatalog,
        config: &EngineConfig,
        character_id: &str,
    ) -> Result<CharacterData, RulesError> {
        let character_id = required("character_id", character_id)?;
        let missing = self.missing_steps();
        if !missing.is_empty() {
            return Err(RulesError::DraftIncomplete { missing });
        }
        let result = self.validate_choices(catalog, config);
        if !result.can_finalize {
            return Err(RulesError::NotFinalizable {
                issues: result.error_messages(),
            });
        }
        compiler::compile(self, catalog, config, &character_id)
    }

    /// Compile the draft and activate the resulting character on `bus`.
    ///
    /// The draft is left intact whatever the outcome, so a failed call can
    /// be fixed and retried.
    pub fn to_character(
        &mut self,
        catalog: &dyn RulesCatalog,
        config: &EngineConfig,
        character_id: &str,
        registry: Arc<Registry>,
        bus: Arc<dyn EventBus>,
    ) -> Result<Character, RulesError> {
        let data = self.compile(catalog, config, character_id)?;
        let character = Character::load(data, registry, bus)?;
        tracing::info!(draft_id = %self.id, character_id = %character.id(), "draft finalized");
        Ok(character)
    }

    fn apply_component(
        &mut self,
        catalog: &dyn RulesCatalog,
        source: Source,
        submissions: &[Submission],
    ) -> Result<ValidationResult, RulesError> {
        let sources = self.grant_sources(catalog)?;
        let requirements: Vec<SourcedRequirement> = sources
            .iter()
            .filter(|s| s.source() == source)
            .flat_map(|s| s.sourced_requirements())
            .collect();
        let excluding: BTreeSet<&str> = submissions.iter().map(|s| s.choice_id.as_str()).collect();
        let known = self.known_skills(&sources, &excluding);

        let result = Validator::new(catalog).validate(&requirements, submissions, &known);
        if !result.can_save {
            return Err(RulesError::Rejected {
                choice_id: source.to_string(),
                issues: result.hard_errors(),
            });
        }

        let mut recorded = Vec::new();
        for submission in submissions {
            // Undeclared ids were reported as warnings; there is nothing to record them against.
            if let Some(req) = requirements
                .iter()
                .find(|r| r.requirement.choice_id == submission.choice_id)
            {
                recorded.push(Self::to_choice(req.source, submission)?);
            }
        }
        for choice in recorded {
            self.upsert(choice);
        }
        self.refresh_progress();
        Ok(result)
    }

    fn to_choice(source: Source, submission: &Submission) -> Result<ChoiceData, RulesError> {
        let values = submission
            .values()
            .map_err(|reason| RulesError::invalid(submission.choice_id.clone(), reason))?;
        let selection = Selection::from_values(submission.category, values)?;
        Ok(ChoiceData::new(source, submission.choice_id.clone(), selection))
    }

    /// The selected race, subrace, class, subclass and background.
    fn grant_sources<'a>(
        &self,
        catalog: &'a dyn RulesCatalog,
    ) -> Result<Vec<&'a dyn GrantSource>, RulesError> {
        let mut sources: Vec<&'a dyn GrantSource> = Vec::new();
        if let Some(id) = &self.race_id {
            let race = require_race(catalog, id)?;
            sources.push(race);
            if let Some(sub) = &self.subrace_id {
                let subrace = race
                    .subrace(sub)
                    .ok_or_else(|| RulesError::not_found("subrace", sub.clone()))?;
                sources.push(subrace);
            }
        }
        if let Some(id) = &self.class_id {
            let class = require_class(catalog, id)?;
            sources.push(class);
            if let Some(sub) = &self.subclass_id {
                let subclass = class
                    .subclass(sub)
                    .ok_or_else(|| RulesError::not_found("subclass", sub.clone()))?;
                sources.push(subclass);
            }
        }
        if let Some(id) = &self.background_id {
            sources.push(require_background(catalog, id)?);
        }
        Ok(sources)
    }

    fn check_subtypes(
        &self,
        catalog: &dyn RulesCatalog,
        config: &EngineConfig,
        result: &mut ValidationResult,
    ) {
        if let Some(race) = self.race_id.as_deref().and_then(|id| catalog.race(id)) {
            if !race.subraces.is_empty() && self.subrace_id.is_none() {
                result.push(
                    IssueCode::MissingRequired,
                    Severity::Incomplete,
                    Some("subrace"),
                    format!("{} requires a subrace", race.name),
                );
            }
        }
        if let Some(class) = self.class_id.as_deref().and_then(|id| catalog.class(id)) {
            if class.requires_subclass(config.starting_level) && self.subclass_id.is_none() {
                result.push(
                    IssueCode::MissingRequired,
                    Severity::Incomplete,
                    Some("subclass"),
                    format!(
                        "{} requires a subclass at level {}",
                        class.name, config.starting_level
                    ),
                );
            }
        }
    }

    /// Skills granted by the selected components plus those chosen in
    /// recorded slots other than `excluding`.
    fn known_skills(&self, sources: &[&dyn GrantSource], excluding: &BTreeSet<&str>) -> KnownSkills {
        let mut granted = BTreeMap::new();
        for source in sources {
            for skill in source.skills() {
                granted.entry(*skill).or_insert(source.source());
            }
        }
        let chosen = self
            .choices
            .iter()
            .filter(|c| !excluding.contains(c.choice_id.as_str()))
            .filter_map(|c| match &c.selection {
                Selection::Skills(skills) => Some(skills.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect();
        KnownSkills { granted, chosen }
    }

    fn choice_ids(&self) -> BTreeSet<&str> {
        self.choices.iter().map(|c| c.choice_id.as_str()).collect()
    }

    /// Recorded selectable choices rendered back into submissions.
    fn submissions(&self) -> Vec<Submission> {
        self.choices
            .iter()
            .filter(|c| c.category.is_selectable())
            .map(|c| Submission::new(c.category, &c.choice_id, c.selection.values()).with_source(c.source))
            .collect()
    }

    fn upsert(&mut self, choice: ChoiceData) {
        match self
            .choices
            .iter_mut()
            .find(|c| c.same_slot(choice.category, &choice.choice_id))
        {
            Some(existing) => *existing = choice,
            None => self.choices.push(choice),
        }
    }

    fn drop_source(&mut self, source: Source) {
        let before = self.choices.len();
        self.choices.retain(|c| c.source != source);
        let dropped = before - self.choices.len();
        if dropped > 0 {
            tracing::debug!(draft_id = %self.id, %source, dropped, "discarded choices");
        }
    }

    fn refresh_progress(&mut self) {
        let mut progress = BTreeSet::new();
        for step in Step::iter() {
            let done = match step {
                Step::Name => self.name.is_some(),
                Step::Race => self.race_id.is_some(),
                Step::Class => self.class_id.is_some(),
                Step::Background => self.background_id.is_some(),
                Step::AbilityScores => self.ability_scores.is_some(),
                category_step => self
                    .choices
                    .iter()
                    .any(|c| Step::for_category(c.category) == Some(category_step)),
            };
            if done {
                progress.insert(step);
            }
        }
        self.progress = progress;
    }
}
