//! Requirements and submissions.
//!
//! Rules content declares `Requirement`s: named slots that must be filled
//! with an exact number of picks. A caller answers a slot with a
//! `Submission`.

use super::choice::{Category, Source};
use serde::{Deserialize, Serialize};

/// One allowed answer for a requirement.
///
/// Values are stored normalized the same way submissions are, whether
/// built in code or decoded from rules content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "RawChoiceOption")]
pub enum ChoiceOption {
    /// A specific value such as `"athletics"` or `"greataxe"`.
    Exact(String),
    /// Any catalog item carrying this tag, e.g. `"martial_melee"`.
    Tagged(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawChoiceOption {
    Exact(String),
    Tagged(String),
}

impl From<RawChoiceOption> for ChoiceOption {
    fn from(raw: RawChoiceOption) -> Self {
        match raw {
            RawChoiceOption::Exact(value) => ChoiceOption::exact(&value),
            RawChoiceOption::Tagged(tag) => ChoiceOption::tagged(&tag),
        }
    }
}

impl ChoiceOption {
    pub fn exact(value: &str) -> Self {
        ChoiceOption::Exact(normalize(value))
    }

    pub fn tagged(tag: &str) -> Self {
        ChoiceOption::Tagged(normalize(tag))
    }
}

/// A declared choice slot.
///
/// An empty `options` list accepts any well-formed value of the category.
///
/// # Examples
///
/// ```rust
/// use charsmith::choices::{Category, Requirement};
///
/// let req = Requirement::new("barbarian_skills", "Choose two skills", Category::Skills, 2)
///     .with_exact(&["animal_handling", "athletics", "intimidation"]);
/// assert_eq!(req.count, 2);
/// assert_eq!(req.options.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub choice_id: String,
    pub label: String,
    pub category: Category,
    pub count: usize,
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
}

impl Requirement {
    pub fn new(choice_id: &str, label: &str, category: Category, count: usize) -> Self {
        Self {
            choice_id: choice_id.to_string(),
            label: label.to_string(),
            category,
            count,
            options: Vec::new(),
        }
    }

    pub fn with_exact(mut self, values: &[&str]) -> Self {
        self.options.extend(values.iter().map(|v| ChoiceOption::exact(v)));
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.options.push(ChoiceOption::tagged(tag));
        self
    }

    pub fn accepts_any(&self) -> bool {
        self.options.is_empty()
    }
}

/// Raw selection values as they arrive from a caller or a decoded payload.
///
/// Accepts a single value, a list of strings, or a loosely typed JSON list.
/// [`Submission::values`] normalizes all three into one ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectionInput {
    One(String),
    Many(Vec<String>),
    Loose(Vec<serde_json::Value>),
}

impl From<&str> for SelectionInput {
    fn from(value: &str) -> Self {
        SelectionInput::One(value.to_string())
    }
}

impl From<String> for SelectionInput {
    fn from(value: String) -> Self {
        SelectionInput::One(value)
    }
}

impl From<Vec<String>> for SelectionInput {
    fn from(values: Vec<String>) -> Self {
        SelectionInput::Many(values)
    }
}

impl From<&[&str]> for SelectionInput {
    fn from(values: &[&str]) -> Self {
        SelectionInput::Many(values.iter().map(|v| v.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for SelectionInput {
    fn from(values: [&str; N]) -> Self {
        SelectionInput::Many(values.iter().map(|v| v.to_string()).collect())
    }
}

impl From<Vec<serde_json::Value>> for SelectionInput {
    fn from(values: Vec<serde_json::Value>) -> Self {
        SelectionInput::Loose(values)
    }
}

pub(crate) fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

/// A candidate answer for one requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub category: Category,
    pub source: Source,
    pub choice_id: String,
    pub values: SelectionInput,
}

impl Submission {
    /// Create a submission. The source is filled in from the matching
    /// requirement when the draft records it.
    pub fn new(category: Category, choice_id: &str, values: impl Into<SelectionInput>) -> Self {
        Self {
            category,
            source: Source::Player,
            choice_id: choice_id.to_string(),
            values: values.into(),
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// Normalize to trimmed lowercase strings in submitted order.
    ///
    /// Loose lists may only contain strings; anything else is rejected with
    /// a description of the offending element.
    pub fn values(&self) -> Result<Vec<String>, String> {
        match &self.values {
            SelectionInput::One(v) => Ok(vec![normalize(v)]),
            SelectionInput::Many(vs) => Ok(vs.iter().map(|v| normalize(v)).collect()),
            SelectionInput::Loose(vs) => vs
                .iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => Ok(normalize(s)),
                    other => Err(format!("unsupported selection value {}", other)),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_value_normalizes() {
        let s = Submission::new(Category::FightingStyle, "fighter_style", " Defense ");
        assert_eq!(s.values().unwrap(), vec!["defense"]);
    }

    #[test]
    fn test_loose_list_normalizes() {
        let s = Submission::new(
            Category::Skills,
            "rogue_skills",
            vec![json!("Stealth"), json!("acrobatics")],
        );
        assert_eq!(s.values().unwrap(), vec!["stealth", "acrobatics"]);

        let bad = Submission::new(Category::Skills, "rogue_skills", vec![json!("stealth"), json!(3)]);
        assert!(bad.values().is_err());
    }

    #[test]
    fn test_untagged_deserialization() {
        let one: SelectionInput = serde_json::from_value(json!("athletics")).unwrap();
        assert_eq!(one, SelectionInput::One("athletics".into()));
        let many: SelectionInput = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(many, SelectionInput::Many(vec!["a".into(), "b".into()]));
        let loose: SelectionInput = serde_json::from_value(json!(["a", 1])).unwrap();
        assert!(matches!(loose, SelectionInput::Loose(_)));
    }

    #[test]
    fn test_requirement_builder() {
        let req = Requirement::new("fighter_weapon", "Martial weapon", Category::Equipment, 1)
            .with_tag("Martial");
        assert_eq!(req.options, vec![ChoiceOption::Tagged("martial".into())]);
        assert!(!req.accepts_any());
    }

    #[test]
    fn test_decoded_options_are_normalized() {
        let req: Requirement = serde_json::from_value(json!({
            "choice_id": "rogue_skills",
            "label": "Rogue skills",
            "category": "skills",
            "count": 1,
            "options": [{ "exact": " Athletics" }, { "tagged": "Martial_Melee" }]
        }))
        .unwrap();
        assert_eq!(
            req.options,
            vec![ChoiceOption::exact("athletics"), ChoiceOption::tagged("martial_melee")]
        );
        let encoded = serde_json::to_value(&req.options[0]).unwrap();
        assert_eq!(encoded, json!({ "exact": "athletics" }));
    }
}
