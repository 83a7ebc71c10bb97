//! Barbarian walkthrough
//!
//! This demo builds a Human Barbarian from JSON rules content and plays a
//! short fight with it:
//! - Drafting step by step, with validation feedback
//! - Compiling and activating the character on an event bus
//! - Raging, attacking, dropping to 0 hit points and recovering
//! - Saving the character to JSON and loading it back
//!
//! Run with `RUST_LOG=charsmith=debug` to watch the lifecycle events.

use charsmith::bus::Bus;
use charsmith::character::EquipmentSlot;
use charsmith::entity::refs;
use charsmith::rules::Rulebook;
use charsmith::*;
use std::sync::Arc;

const RULES: &str = r#"{
    "races": [{
        "id": "human", "name": "Human", "speed": 30,
        "ability_increases": { "strength": 1, "dexterity": 1, "constitution": 1,
                               "intelligence": 1, "wisdom": 1, "charisma": 1 },
        "languages": ["common"],
        "requirements": [{ "choice_id": "human_language", "label": "Extra language",
                           "category": "languages", "count": 1 }]
    }],
    "classes": [{
        "id": "barbarian", "name": "Barbarian", "hit_die": 12, "hit_points_per_level": 7,
        "saving_throws": ["strength", "constitution"],
        "armor_proficiencies": ["light", "medium", "shield"],
        "weapon_proficiencies": ["simple", "martial"],
        "requirements": [
            { "choice_id": "barbarian_skills", "label": "Barbarian skills", "category": "skills",
              "count": 2, "options": [{ "exact": "athletics" }, { "exact": "intimidation" },
                                      { "exact": "perception" }, { "exact": "survival" }] },
            { "choice_id": "barbarian_weapon", "label": "Martial melee weapon",
              "category": "equipment", "count": 1, "options": [{ "tagged": "martial_melee" }] }
        ],
        "starting_equipment": [{ "item_id": "handaxe", "quantity": 2 }],
        "features": [{ "level": 1, "ref": "dnd5e:features:rage" }],
        "starting_conditions": [{ "ref": "dnd5e:conditions:unarmored_defense",
                                  "payload": { "variant": "barbarian" } }],
        "resources": [{ "id": "rage", "name": "Rage", "uses_per_level": { "1": 2, "3": 3 },
                        "reset": "long_rest" }]
    }],
    "backgrounds": [{
        "id": "soldier", "name": "Soldier",
        "skills": ["athletics", "intimidation"],
        "tool_proficiencies": ["gaming_set"]
    }],
    "items": [
        { "id": "greataxe", "name": "Greataxe", "tags": ["martial", "martial_melee"],
          "kind": { "type": "weapon", "category": "martial", "melee": true, "two_handed": true } },
        { "id": "handaxe", "name": "Handaxe", "tags": ["simple", "simple_melee"],
          "kind": { "type": "weapon", "category": "simple", "melee": true } }
    ]
}"#;

fn main() -> Result<(), RulesError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    println!("=== Barbarian Walkthrough ===\n");

    let book = Rulebook::from_json(RULES)?;
    let config = EngineConfig::default();

    // ===== Drafting =====
    println!("1. Drafting\n");

    let mut draft = Draft::new("draft-1", "player-1");
    draft.set_name("Grog")?;
    let result = draft.set_race(&book, "human", None, &[])?;
    println!("  Race set, can finalize: {}", result.can_finalize);
    for issue in &result.errors {
        println!("    outstanding: {}", issue.message);
    }
    draft.select_languages(&book, "human_language", &["giant"])?;
    draft.set_class(&book, "barbarian", None, &[])?;
    draft.select_skills(&book, "barbarian_skills", &[Skill::Athletics, Skill::Survival])?;
    draft.select_equipment(&book, "barbarian_weapon", &["greataxe"])?;
    draft.set_background(&book, "soldier", &[])?;
    draft.set_ability_scores(
        AbilityScores::new(16, 14, 15, 8, 10, 12),
        ScoreMethod::Manual,
        &config,
    )?;

    let result = draft.validate_choices(&book, &config);
    println!("  Draft complete: {}", result.can_finalize);
    for warning in &result.warnings {
        println!("    warning: {}", warning.message);
    }

    // ===== Finalizing =====
    println!("\n2. Finalizing\n");

    let bus = Arc::new(Bus::with_max_depth(config.max_event_depth));
    let registry = Arc::new(Registry::standard());
    let grog = draft.to_character(&book, &config, "grog", Arc::clone(&registry), bus.clone())?;
    println!("  {} (level {})", grog.name(), grog.level());
    println!("  STR {}", grog.ability_scores().strength);
    println!("  HP {}/{}", grog.hit_points(), grog.max_hit_points());
    println!("  AC {}", grog.armor_class());
    println!("  Languages: {:?}", grog.languages());
    println!("  Subscriptions on the bus: {}", bus.subscription_count());

    // ===== Combat =====
    println!("\n3. Combat\n");

    grog.equip(EquipmentSlot::MainHand, "greataxe")?;
    let swing = grog.attack("greataxe", Some(EntityId::new("goblin")))?;
    println!(
        "  Greataxe: +{} to hit, +{} damage",
        swing.attack_bonus, swing.damage_bonus
    );

    grog.activate_feature(&refs::rage())?;
    let swing = grog.attack("greataxe", Some(EntityId::new("goblin")))?;
    println!(
        "  Raging greataxe: +{} to hit, +{} damage",
        swing.attack_bonus, swing.damage_bonus
    );
    println!(
        "  Rage uses left: {}",
        grog.resource("rage").map_or(0, |r| r.current())
    );

    grog.take_damage(30)?;
    println!(
        "  Knocked out: HP {}, conditions {:?}",
        grog.hit_points(),
        grog.condition_refs()
            .iter()
            .map(|r| r.value().to_string())
            .collect::<Vec<_>>()
    );
    grog.heal(5, "potion_of_healing")?;
    println!("  Healed to {}", grog.hit_points());

    // ===== Persistence =====
    println!("\n4. Save and Load\n");

    let json = serde_json::to_string_pretty(&grog.to_data()?)?;
    grog.cleanup()?;
    println!("  Saved {} bytes, bus now has {} subscriptions", json.len(), bus.subscription_count());

    let data: CharacterData = serde_json::from_str(&json)?;
    let restored = Character::load(data, registry, bus.clone())?;
    grog_summary(&restored);
    restored.long_rest()?;
    println!("  After a long rest:");
    grog_summary(&restored);
    restored.cleanup()?;

    Ok(())
}

fn grog_summary(character: &Character) {
    println!(
        "  {}: HP {}/{}, rage {}/{}",
        character.name(),
        character.hit_points(),
        character.max_hit_points(),
        character.resource("rage").map_or(0, |r| r.current()),
        character.resource("rage").map_or(0, |r| r.maximum()),
    );
}
