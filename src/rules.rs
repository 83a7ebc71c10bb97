//! Rules content module.
//!
//! Static data for races, classes, backgrounds and items, and the
//! `RulesCatalog` lookup trait the draft and compiler read it through.
//! The crate ships no rules content of its own; `Rulebook` is an
//! in-memory catalog filled by the caller or loaded from JSON.

use crate::abilities::Ability;
use crate::choices::requirement::normalize;
use crate::choices::Requirement;
use crate::entity::EntityRecord;
use crate::error::RulesError;
use crate::ids::Ref;
use crate::proficiency::Skill;
use crate::resource::{Recovery, RestType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An item and a count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: String,
    pub quantity: u32,
}

impl ItemStack {
    pub fn new(item_id: &str, quantity: u32) -> Self {
        Self {
            item_id: item_id.to_string(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    Weapon {
        /// Proficiency group such as `simple` or `martial`.
        category: String,
        melee: bool,
        #[serde(default)]
        finesse: bool,
        #[serde(default)]
        two_handed: bool,
    },
    Armor {
        base_ac: i32,
        /// Cap on the Dexterity bonus; `None` means uncapped.
        max_dex_bonus: Option<i32>,
        /// Proficiency group such as `light`, `medium` or `heavy`.
        category: String,
    },
    Shield {
        bonus: i32,
    },
    Gear,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemData {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl ItemData {
    pub fn weapon(id: &str, name: &str, category: &str, melee: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: ItemKind::Weapon {
                category: category.to_string(),
                melee,
                finesse: false,
                two_handed: false,
            },
            tags: BTreeSet::new(),
        }
    }

    pub fn armor(id: &str, name: &str, category: &str, base_ac: i32, max_dex_bonus: Option<i32>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: ItemKind::Armor {
                base_ac,
                max_dex_bonus,
                category: category.to_string(),
            },
            tags: BTreeSet::new(),
        }
    }

    pub fn shield(id: &str, name: &str, bonus: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: ItemKind::Shield { bonus },
            tags: BTreeSet::new(),
        }
    }

    pub fn gear(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: ItemKind::Gear,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| t.to_ascii_lowercase()));
        self
    }

    /// Mark a weapon as finesse and/or two-handed. No effect on other kinds.
    pub fn with_weapon_properties(mut self, finesse_prop: bool, two_handed_prop: bool) -> Self {
        if let ItemKind::Weapon {
            finesse,
            two_handed,
            ..
        } = &mut self.kind
        {
            *finesse = finesse_prop;
            *two_handed = two_handed_prop;
        }
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_weapon(&self) -> bool {
        matches!(self.kind, ItemKind::Weapon { .. })
    }
}

/// Definition of a class resource such as rage or ki.
///
/// The maximum comes from `uses_per_level` when the table has an entry for
/// the character's level, otherwise from `max_formula`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub max_formula: Option<String>,
    #[serde(default)]
    pub uses_per_level: BTreeMap<u8, u32>,
    pub reset: RestType,
    #[serde(default)]
    pub recovery: Recovery,
}

/// A feature unlocked at a class level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureGrant {
    pub level: u8,
    #[serde(rename = "ref")]
    pub feature: Ref,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl FeatureGrant {
    pub fn new(level: u8, feature: Ref) -> Self {
        Self {
            level,
            feature,
            config: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellcastingData {
    pub ability: Ability,
    /// Slots per spell level (index 0 is 1st level), keyed by class level.
    pub slots: BTreeMap<u8, Vec<u32>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubraceData {
    pub id: String,
    pub name: String,
    pub ability_increases: BTreeMap<Ability, i8>,
    pub skills: Vec<Skill>,
    pub languages: Vec<String>,
    pub weapon_proficiencies: Vec<String>,
    pub tool_proficiencies: Vec<String>,
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceData {
    pub id: String,
    pub name: String,
    pub speed: u32,
    pub ability_increases: BTreeMap<Ability, i8>,
    pub skills: Vec<Skill>,
    pub languages: Vec<String>,
    pub weapon_proficiencies: Vec<String>,
    pub tool_proficiencies: Vec<String>,
    pub requirements: Vec<Requirement>,
    pub subraces: Vec<SubraceData>,
}

impl RaceData {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            speed: 30,
            ..Self::default()
        }
    }

    pub fn subrace(&self, id: &str) -> Option<&SubraceData> {
        self.subraces.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubclassData {
    pub id: String,
    pub name: String,
    pub skills: Vec<Skill>,
    pub requirements: Vec<Requirement>,
    pub features: Vec<FeatureGrant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassData {
    pub id: String,
    pub name: String,
    pub hit_die: u8,
    /// Average hit points gained per level after the first.
    pub hit_points_per_level: u8,
    #[serde(default)]
    pub saving_throws: Vec<Ability>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub armor_proficiencies: Vec<String>,
    #[serde(default)]
    pub weapon_proficiencies: Vec<String>,
    #[serde(default)]
    pub tool_proficiencies: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub starting_equipment: Vec<ItemStack>,
    #[serde(default)]
    pub features: Vec<FeatureGrant>,
    #[serde(default)]
    pub starting_conditions: Vec<EntityRecord>,
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
    #[serde(default)]
    pub spellcasting: Option<SpellcastingData>,
    /// Level at which a subclass must be chosen.
    #[serde(default)]
    pub subclass_level: Option<u8>,
    #[serde(default)]
    pub subclasses: Vec<SubclassData>,
}

impl ClassData {
    pub fn new(id: &str, name: &str, hit_die: u8) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            hit_die,
            hit_points_per_level: hit_die / 2 + 1,
            saving_throws: Vec::new(),
            skills: Vec::new(),
            armor_proficiencies: Vec::new(),
            weapon_proficiencies: Vec::new(),
            tool_proficiencies: Vec::new(),
            requirements: Vec::new(),
            starting_equipment: Vec::new(),
            features: Vec::new(),
            starting_conditions: Vec::new(),
            resources: Vec::new(),
            spellcasting: None,
            subclass_level: None,
            subclasses: Vec::new(),
        }
    }

    pub fn subclass(&self, id: &str) -> Option<&SubclassData> {
        self.subclasses.iter().find(|s| s.id == id)
    }

    /// Whether a character of `level` must have picked a subclass.
    pub fn requires_subclass(&self, level: u8) -> bool {
        self.subclass_level.is_some_and(|at| at <= level) && !self.subclasses.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundData {
    pub id: String,
    pub name: String,
    pub skills: Vec<Skill>,
    pub languages: Vec<String>,
    pub tool_proficiencies: Vec<String>,
    pub equipment: Vec<ItemStack>,
    pub requirements: Vec<Requirement>,
}

impl BackgroundData {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Read access to rules content.
///
/// Implement this over whatever store holds the rules tables; the crate
/// only ever looks entries up by id.
pub trait RulesCatalog {
    fn race(&self, id: &str) -> Option<&RaceData>;
    fn class(&self, id: &str) -> Option<&ClassData>;
    fn background(&self, id: &str) -> Option<&BackgroundData>;
    fn item(&self, id: &str) -> Option<&ItemData>;
}

/// Look up a race or fail with `NotFound`.
pub fn require_race<'a>(catalog: &'a dyn RulesCatalog, id: &str) -> Result<&'a RaceData, RulesError> {
    catalog.race(id).ok_or_else(|| RulesError::not_found("race", id))
}

pub fn require_class<'a>(catalog: &'a dyn RulesCatalog, id: &str) -> Result<&'a ClassData, RulesError> {
    catalog.class(id).ok_or_else(|| RulesError::not_found("class", id))
}

pub fn require_background<'a>(
    catalog: &'a dyn RulesCatalog,
    id: &str,
) -> Result<&'a BackgroundData, RulesError> {
    catalog
        .background(id)
        .ok_or_else(|| RulesError::not_found("background", id))
}

/// In-memory `RulesCatalog`.
///
/// # Examples
///
/// ```rust
/// use charsmith::rules::{ClassData, Rulebook, RulesCatalog};
///
/// let mut book = Rulebook::new();
/// book.add_class(ClassData::new("barbarian", "Barbarian", 12));
/// assert_eq!(book.class("barbarian").map(|c| c.hit_die), Some(12));
/// assert!(book.class("bard").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rulebook {
    races: BTreeMap<String, RaceData>,
    classes: BTreeMap<String, ClassData>,
    backgrounds: BTreeMap<String, BackgroundData>,
    items: BTreeMap<String, ItemData>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RulebookDocument {
    races: Vec<RaceData>,
    classes: Vec<ClassData>,
    backgrounds: Vec<BackgroundData>,
    items: Vec<ItemData>,
}

impl Rulebook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load content from a JSON document of the shape
    /// `{ "races": [...], "classes": [...], "backgrounds": [...], "items": [...] }`.
    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        let doc: RulebookDocument = serde_json::from_str(json)?;
        let mut book = Self::new();
        doc.races.into_iter().for_each(|r| book.add_race(r));
        doc.classes.into_iter().for_each(|c| book.add_class(c));
        doc.backgrounds.into_iter().for_each(|b| book.add_background(b));
        doc.items.into_iter().for_each(|i| book.add_item(i));
        Ok(book)
    }

    pub fn add_race(&mut self, race: RaceData) {
        self.races.insert(race.id.clone(), race);
    }

    pub fn add_class(&mut self, class: ClassData) {
        self.classes.insert(class.id.clone(), class);
    }

    pub fn add_background(&mut self, background: BackgroundData) {
        self.backgrounds.insert(background.id.clone(), background);
    }

    /// Add an item. Its id and tags are normalized so player selections
    /// match them regardless of case.
    pub fn add_item(&mut self, mut item: ItemData) {
        item.id = normalize(&item.id);
        item.tags = item.tags.iter().map(|t| normalize(t)).collect();
        self.items.insert(item.id.clone(), item);
    }
}

impl RulesCatalog for Rulebook {
    fn race(&self, id: &str) -> Option<&RaceData> {
        self.races.get(id)
    }

    fn class(&self, id: &str) -> Option<&ClassData> {
        self.classes.get(id)
    }

    fn background(&self, id: &str) -> Option<&BackgroundData> {
        self.backgrounds.get(id)
    }

    fn item(&self, id: &str) -> Option<&ItemData> {
        self.items.get(id).or_else(|| self.items.get(&normalize(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_subclass() {
        let mut cleric = ClassData::new("cleric", "Cleric", 8);
        cleric.subclass_level = Some(1);
        assert!(!cleric.requires_subclass(1), "no subclasses declared");
        cleric.subclasses.push(SubclassData {
            id: "life".into(),
            name: "Life Domain".into(),
            ..SubclassData::default()
        });
        assert!(cleric.requires_subclass(1));

        let mut fighter = ClassData::new("fighter", "Fighter", 10);
        fighter.subclass_level = Some(3);
        fighter.subclasses = cleric.subclasses.clone();
        assert!(!fighter.requires_subclass(1));
        assert!(fighter.requires_subclass(3));
    }

    #[test]
    fn test_average_hit_points() {
        assert_eq!(ClassData::new("barbarian", "Barbarian", 12).hit_points_per_level, 7);
        assert_eq!(ClassData::new("wizard", "Wizard", 6).hit_points_per_level, 4);
    }

    #[test]
    fn test_item_tags() {
        let axe = ItemData::weapon("greataxe", "Greataxe", "martial", true)
            .with_tags(&["Martial", "heavy"])
            .with_weapon_properties(false, true);
        assert!(axe.has_tag("martial"));
        assert!(!axe.has_tag("simple"));
        assert!(matches!(axe.kind, ItemKind::Weapon { two_handed: true, .. }));
    }

    #[test]
    fn test_rulebook_from_json() {
        let json = r#"{
            "races": [{ "id": "human", "name": "Human", "speed": 30,
                        "ability_increases": { "strength": 1, "dexterity": 1 },
                        "languages": ["common"] }],
            "classes": [{ "id": "barbarian", "name": "Barbarian", "hit_die": 12,
                          "hit_points_per_level": 7,
                          "saving_throws": ["strength", "constitution"],
                          "resources": [{ "id": "rage", "name": "Rage",
                                          "uses_per_level": { "1": 2, "3": 3 },
                                          "reset": "long_rest" }] }],
            "items": [{ "id": "greataxe", "name": "Greataxe",
                        "kind": { "type": "weapon", "category": "martial", "melee": true,
                                  "two_handed": true } }]
        }"#;
        let book = Rulebook::from_json(json).unwrap();
        let human = book.race("human").unwrap();
        assert_eq!(human.ability_increases[&Ability::Strength], 1);
        let barbarian = book.class("barbarian").unwrap();
        assert_eq!(barbarian.resources[0].uses_per_level[&3], 3);
        assert!(book.item("greataxe").unwrap().is_weapon());
        assert!(book.background("acolyte").is_none());
    }

    #[test]
    fn test_item_ids_and_tags_are_normalized() {
        let json = r#"{
            "items": [{ "id": "GreatAxe", "name": "Greataxe", "tags": ["Martial_Melee"],
                        "kind": { "type": "weapon", "category": "martial", "melee": true } }]
        }"#;
        let book = Rulebook::from_json(json).unwrap();
        let axe = book.item("greataxe").unwrap();
        assert_eq!(axe.id, "greataxe");
        assert!(axe.has_tag("martial_melee"));
        assert!(book.item("GreatAxe").is_some());
    }

    #[test]
    fn test_require_helpers() {
        let book = Rulebook::new();
        assert_eq!(
            require_class(&book, "monk").unwrap_err(),
            RulesError::not_found("class", "monk")
        );
    }
}
