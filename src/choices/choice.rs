//! Recorded choices.
//!
//! A `ChoiceData` is one decision stored on a draft (and later copied onto
//! the compiled character) together with where it came from.

use crate::abilities::{AbilityScores, ScoreMethod};
use crate::error::RulesError;
use crate::proficiency::Skill;
use serde::{Deserialize, Serialize};

/// The kind of decision a choice records.
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
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Name,
    Race,
    Class,
    Background,
    AbilityScores,
    Skills,
    Languages,
    Equipment,
    FightingStyle,
    Spells,
    Cantrips,
    Expertise,
    Tools,
}

impl Category {
    /// Categories a `Submission` may carry. The rest are set through
    /// dedicated draft setters.
    pub fn is_selectable(self) -> bool {
        !matches!(
            self,
            Category::Name
                | Category::Race
                | Category::Class
                | Category::Background
                | Category::AbilityScores
        )
    }
}

/// Which rules component produced a choice.
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Source {
    Player,
    Race,
    Class,
    Background,
}

/// Typed payload of a choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selection {
    Name(String),
    Race {
        race_id: String,
        subrace_id: Option<String>,
    },
    Class {
        class_id: String,
        subclass_id: Option<String>,
    },
    Background(String),
    AbilityScores {
        scores: AbilityScores,
        method: ScoreMethod,
    },
    Skills(Vec<Skill>),
    Languages(Vec<String>),
    Equipment(Vec<String>),
    FightingStyle(String),
    Spells(Vec<String>),
    Cantrips(Vec<String>),
    Expertise(Vec<Skill>),
    Tools(Vec<String>),
}

impl Selection {
    pub fn category(&self) -> Category {
        match self {
            Selection::Name(_) => Category::Name,
            Selection::Race { .. } => Category::Race,
            Selection::Class { .. } => Category::Class,
            Selection::Background(_) => Category::Background,
            Selection::AbilityScores { .. } => Category::AbilityScores,
            Selection::Skills(_) => Category::Skills,
            Selection::Languages(_) => Category::Languages,
            Selection::Equipment(_) => Category::Equipment,
            Selection::FightingStyle(_) => Category::FightingStyle,
            Selection::Spells(_) => Category::Spells,
            Selection::Cantrips(_) => Category::Cantrips,
            Selection::Expertise(_) => Category::Expertise,
            Selection::Tools(_) => Category::Tools,
        }
    }

    /// Build a typed selection from normalized submission values.
    pub fn from_values(category: Category, values: Vec<String>) -> Result<Self, RulesError> {
        let parse_skills = |values: Vec<String>| -> Result<Vec<Skill>, RulesError> {
            values
                .iter()
                .map(|v| {
                    v.parse::<Skill>()
                        .map_err(|_| RulesError::invalid("skill", format!("unknown skill '{}'", v)))
                })
                .collect()
        };

        Ok(match category {
            Category::Skills => Selection::Skills(parse_skills(values)?),
            Category::Expertise => Selection::Expertise(parse_skills(values)?),
            Category::Languages => Selection::Languages(values),
            Category::Equipment => Selection::Equipment(values),
            Category::Spells => Selection::Spells(values),
            Category::Cantrips => Selection::Cantrips(values),
            Category::Tools => Selection::Tools(values),
            Category::FightingStyle => {
                let mut values = values.into_iter();
                match (values.next(), values.next()) {
                    (Some(style), None) => Selection::FightingStyle(style),
                    _ => {
                        return Err(RulesError::invalid(
                            "fighting_style",
                            "exactly one style must be chosen",
                        ))
                    }
                }
            }
            other => {
                return Err(RulesError::invalid(
                    "category",
                    format!("{} is not chosen through a submission", other),
                ))
            }
        })
    }

    /// The selection rendered as plain strings, in stored order.
    pub fn values(&self) -> Vec<String> {
        match self {
            Selection::Name(v) | Selection::Background(v) | Selection::FightingStyle(v) => {
                vec![v.clone()]
            }
            Selection::Race { race_id, subrace_id } => {
                std::iter::once(race_id.clone()).chain(subrace_id.clone()).collect()
            }
            Selection::Class {
                class_id,
                subclass_id,
            } => std::iter::once(class_id.clone())
                .chain(subclass_id.clone())
                .collect(),
            Selection::AbilityScores { scores, .. } => {
                scores.iter().map(|(_, v)| v.to_string()).collect()
            }
            Selection::Skills(s) | Selection::Expertise(s) => {
                s.iter().map(|k| k.to_string()).collect()
            }
            Selection::Languages(v)
            | Selection::Equipment(v)
            | Selection::Spells(v)
            | Selection::Cantrips(v)
            | Selection::Tools(v) => v.clone(),
        }
    }
}

/// One recorded decision with its provenance.
///
/// Within a draft at most one entry exists per `(category, choice_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceData {
    pub category: Category,
    pub source: Source,
    pub choice_id: String,
    pub selection: Selection,
}

impl ChoiceData {
    /// Create a choice; the category is taken from the selection.
    pub fn new(source: Source, choice_id: impl Into<String>, selection: Selection) -> Self {
        Self {
            category: selection.category(),
            source,
            choice_id: choice_id.into(),
            selection,
        }
    }

    /// Whether this entry occupies the same slot as `other`.
    pub fn same_slot(&self, category: Category, choice_id: &str) -> bool {
        self.category == category && self.choice_id == choice_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_category() {
        let s = Selection::Skills(vec![Skill::Athletics]);
        assert_eq!(s.category(), Category::Skills);
        let c = ChoiceData::new(Source::Class, "barbarian_skills", s);
        assert_eq!(c.category, Category::Skills);
        assert!(c.same_slot(Category::Skills, "barbarian_skills"));
        assert!(!c.same_slot(Category::Languages, "barbarian_skills"));
    }

    #[test]
    fn test_from_values_parses_skills() {
        let s = Selection::from_values(
            Category::Skills,
            vec!["athletics".into(), "animal_handling".into()],
        )
        .unwrap();
        assert_eq!(
            s,
            Selection::Skills(vec![Skill::Athletics, Skill::AnimalHandling])
        );
        assert!(Selection::from_values(Category::Skills, vec!["juggling".into()]).is_err());
    }

    #[test]
    fn test_fighting_style_requires_one() {
        assert!(Selection::from_values(Category::FightingStyle, vec![]).is_err());
        assert_eq!(
            Selection::from_values(Category::FightingStyle, vec!["defense".into()]).unwrap(),
            Selection::FightingStyle("defense".into())
        );
    }

    #[test]
    fn test_identity_categories_not_selectable() {
        assert!(!Category::Race.is_selectable());
        assert!(Category::Equipment.is_selectable());
        assert!(Selection::from_values(Category::Name, vec!["Grog".into()]).is_err());
    }

    #[test]
    fn test_choice_serializes_tagged() {
        let c = ChoiceData::new(
            Source::Background,
            "soldier_languages",
            Selection::Languages(vec!["dwarvish".into()]),
        );
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["category"], "languages");
        assert_eq!(json["selection"]["kind"], "languages");
        assert_eq!(json["selection"]["value"][0], "dwarvish");
        let back: ChoiceData = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }
}
