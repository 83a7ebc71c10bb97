//! # charsmith - Deterministic Character Compiler for Tabletop RPGs
//!
//! charsmith turns a player's character-creation decisions into a playable
//! character:
//! - **Drafts** record decisions step by step and can be saved at any point
//! - **Validation** checks every decision against the rules content
//! - **Compilation** is deterministic (same draft, same catalog, same output)
//! - **Runtime** characters react to gameplay events on a synchronous bus
//!
//! ## Core Concepts
//!
//! ### Pipeline
//!
//! ```text
//! [Draft] → validate → [compile] → [CharacterData] → load → [Character]
//! ```
//!
//! 1. A [`Draft`] collects name, race, class, background, ability scores and
//!    the choices each of those asks for
//! 2. The compiler unions every grant into a [`CharacterData`] snapshot,
//!    recording where each trait came from in its [`Provenance`]
//! 3. A [`Character`] rebuilds its conditions, features and actions
//!    through a [`Registry`] and subscribes to an [`EventBus`]
//!
//! Rules content (races, classes, backgrounds, items) is read through the
//! [`rules::RulesCatalog`] trait; [`rules::Rulebook`] is an in-memory
//! implementation that loads from JSON.
//!
//! ## Example
//!
//! ```rust
//! use charsmith::rules::{BackgroundData, ClassData, ItemData, ItemStack, RaceData, Rulebook};
//! use charsmith::{Ability, AbilityScores, Bus, Draft, EngineConfig, Registry, ScoreMethod};
//! use std::sync::Arc;
//!
//! let mut book = Rulebook::new();
//! let mut human = RaceData::new("human", "Human");
//! human.ability_increases.insert(Ability::Strength, 1);
//! book.add_race(human);
//! let mut barbarian = ClassData::new("barbarian", "Barbarian", 12);
//! barbarian.weapon_proficiencies = vec!["martial".into()];
//! barbarian.starting_equipment = vec![ItemStack::new("greataxe", 1)];
//! book.add_class(barbarian);
//! book.add_background(BackgroundData::new("soldier", "Soldier"));
//! book.add_item(
//!     ItemData::weapon("greataxe", "Greataxe", "martial", true).with_weapon_properties(false, true),
//! );
//!
//! let config = EngineConfig::default();
//! let mut draft = Draft::new("draft-1", "player-1");
//! draft.set_name("Grog").unwrap();
//! draft.set_race(&book, "human", None, &[]).unwrap();
//! draft.set_class(&book, "barbarian", None, &[]).unwrap();
//! draft.set_background(&book, "soldier", &[]).unwrap();
//! draft
//!     .set_ability_scores(AbilityScores::new(16, 14, 15, 8, 10, 12), ScoreMethod::Manual, &config)
//!     .unwrap();
//!
//! let bus = Arc::new(Bus::new());
//! let grog = draft
//!     .to_character(&book, &config, "grog", Arc::new(Registry::standard()), bus)
//!     .unwrap();
//! assert_eq!(grog.ability_scores().strength, 17);
//! assert_eq!(grog.attack("greataxe", None).unwrap().attack_bonus, 5);
//! ```
//!
//! ## Modules
//!
//! - [`draft`] - Draft state machine and its setters
//! - [`choices`] - Recorded choices, requirements and the validator
//! - [`compiler`] - Draft to character data
//! - [`character`] - Runtime character and its event lifecycle
//! - [`bus`] - Event bus and gameplay events
//! - [`entity`] - Condition, feature and action contracts plus the registry
//! - [`conditions`], [`features`], [`actions`] - Bundled entities
//! - [`formula`] - Resource maximum formulas
//! - [`rules`] - Rules content types and catalogs
//! - [`error`] - Error types

pub mod abilities;
pub mod actions;
pub mod bus;
pub mod character;
pub mod choices;
pub mod compiler;
pub mod conditions;
pub mod config;
pub mod draft;
pub mod entity;
pub mod error;
pub mod features;
pub mod formula;
pub mod grant;
pub mod ids;
pub mod proficiency;
pub mod provenance;
pub mod resource;
pub mod rules;

// Re-export main types for convenience
pub use abilities::{Ability, AbilityScores, ScoreMethod};
pub use bus::{Bus, EventBus, GameEvent};
pub use character::{Character, CharacterData};
pub use choices::{Category, Source};
pub use config::EngineConfig;
pub use draft::{Draft, Step};
pub use entity::Registry;
pub use error::RulesError;
pub use ids::{EntityId, Ref};
pub use proficiency::{ProficiencyLevel, Skill};
pub use provenance::Provenance;
