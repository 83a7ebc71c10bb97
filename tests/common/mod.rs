//! Shared rules content and helpers for integration tests.

#![allow(dead_code)]

use charsmith::bus::Bus;
use charsmith::choices::{Requirement, Submission};
use charsmith::conditions::{UnarmoredDefense, UnarmoredVariant};
use charsmith::entity::refs;
use charsmith::resource::RestType;
use charsmith::rules::{
    BackgroundData, ClassData, FeatureGrant, ItemData, ItemStack, RaceData, ResourceDefinition,
    Rulebook,
};
use charsmith::{
    Ability, AbilityScores, Category, Character, Draft, EngineConfig, EventBus, Registry,
    ScoreMethod, Skill,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const BARBARIAN_SKILLS: &str = "barbarian_skills";
pub const HUMAN_LANGUAGE: &str = "human_language";
pub const BARBARIAN_WEAPON: &str = "barbarian_weapon";

pub fn rulebook() -> Rulebook {
    let mut book = Rulebook::new();

    let mut human = RaceData::new("human", "Human");
    for ability in [
        Ability::Strength,
        Ability::Dexterity,
        Ability::Constitution,
        Ability::Intelligence,
        Ability::Wisdom,
        Ability::Charisma,
    ] {
        human.ability_increases.insert(ability, 1);
    }
    human.languages = vec!["common".into()];
    human
        .requirements
        .push(Requirement::new(HUMAN_LANGUAGE, "Extra language", Category::Languages, 1));
    book.add_race(human);

    let mut barbarian = ClassData::new("barbarian", "Barbarian", 12);
    barbarian.saving_throws = vec![Ability::Strength, Ability::Constitution];
    barbarian.armor_proficiencies = vec!["light".into(), "medium".into(), "shield".into()];
    barbarian.weapon_proficiencies = vec!["simple".into(), "martial".into()];
    barbarian.requirements.push(
        Requirement::new(BARBARIAN_SKILLS, "Barbarian skills", Category::Skills, 2).with_exact(&[
            "animal_handling",
            "athletics",
            "intimidation",
            "nature",
            "perception",
            "survival",
        ]),
    );
    barbarian.requirements.push(
        Requirement::new(BARBARIAN_WEAPON, "Martial melee weapon", Category::Equipment, 1)
            .with_tag("martial_melee"),
    );
    barbarian.starting_equipment = vec![ItemStack::new("handaxe", 2)];
    barbarian.features = vec![
        FeatureGrant::new(1, refs::rage()),
        FeatureGrant::new(2, refs::feature("reckless_attack")),
    ];
    barbarian.starting_conditions =
        vec![UnarmoredDefense::record(UnarmoredVariant::Barbarian).expect("record")];
    barbarian.resources.push(ResourceDefinition {
        id: "rage".into(),
        name: "Rage".into(),
        max_formula: None,
        uses_per_level: BTreeMap::from([(1, 2), (3, 3), (6, 4), (12, 5), (17, 6)]),
        reset: RestType::LongRest,
        recovery: Default::default(),
    });
    book.add_class(barbarian);

    let mut soldier = BackgroundData::new("soldier", "Soldier");
    soldier.skills = vec![Skill::Athletics, Skill::Intimidation];
    soldier.tool_proficiencies = vec!["gaming_set".into(), "land_vehicles".into()];
    book.add_background(soldier);

    book.add_item(
        ItemData::weapon("greataxe", "Greataxe", "martial", true)
            .with_weapon_properties(false, true)
            .with_tags(&["martial", "martial_melee"]),
    );
    book.add_item(
        ItemData::weapon("handaxe", "Handaxe", "simple", true).with_tags(&["simple", "simple_melee"]),
    );
    book.add_item(
        ItemData::weapon("club", "Club", "simple", true).with_tags(&["simple", "simple_melee"]),
    );
    book
}

/// A draft for a level 1 Human Barbarian with every choice made.
pub fn barbarian_draft(book: &Rulebook, config: &EngineConfig) -> Draft {
    let mut draft = Draft::new("draft-grog", "player-1");
    draft.set_name("Grog").expect("name");
    draft
        .set_race(
            book,
            "human",
            None,
            &[Submission::new(Category::Languages, HUMAN_LANGUAGE, ["giant"])],
        )
        .expect("race");
    draft
        .set_class(
            book,
            "barbarian",
            None,
            &[
                Submission::new(Category::Skills, BARBARIAN_SKILLS, ["perception", "survival"]),
                Submission::new(Category::Equipment, BARBARIAN_WEAPON, ["greataxe"]),
            ],
        )
        .expect("class");
    draft.set_background(book, "soldier", &[]).expect("background");
    draft
        .set_ability_scores(
            AbilityScores::new(16, 14, 15, 8, 10, 12),
            ScoreMethod::Manual,
            config,
        )
        .expect("scores");
    draft
}

pub fn new_bus() -> Arc<Bus> {
    Arc::new(Bus::new())
}

pub fn finalize(draft: &mut Draft, book: &Rulebook, bus: &Arc<Bus>) -> Character {
    let bus: Arc<dyn EventBus> = bus.clone();
    draft
        .to_character(
            book,
            &EngineConfig::default(),
            "grog",
            Arc::new(Registry::standard()),
            bus,
        )
        .expect("finalize")
}
