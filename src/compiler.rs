//! Compiler module.
//!
//! Turns a finished [`Draft`] into [`CharacterData`]. Compilation is a pure
//! function of the draft, the catalog and the configuration: the same
//! inputs always produce byte-identical output.
//!
//! Grants from the race, subrace, class, subclass and background are
//! unioned, never summed. Every trait is recorded in the character's
//! [`Provenance`] with the label of each source that produced it.

use crate::abilities::{Ability, AbilityScores};
use crate::character::data::{CharacterData, CharacterSheet, DeathSaves, InventoryItem, SpellSlots};
use crate::choices::{ChoiceData, Selection};
use crate::conditions::{FightingStyle, FightingStyleCondition};
use crate::config::EngineConfig;
use crate::draft::Draft;
use crate::entity::EntityRecord;
use crate::error::RulesError;
use crate::formula;
use crate::grant::GrantSource;
use crate::ids::EntityId;
use crate::proficiency::{grant, proficiency_bonus, ProficiencyLevel, Skill};
use crate::provenance::Provenance;
use crate::resource::{RecoverableResource, Recovery, RestType};
use crate::rules::{
    require_background, require_class, require_race, ClassData, ItemStack, RulesCatalog,
};
use std::collections::{BTreeMap, BTreeSet};

/// Id of the resource every character gets for spending hit dice.
pub const HIT_DICE: &str = "hit_dice";

fn choice_label(choice: &ChoiceData) -> String {
    format!("choice:{}", choice.choice_id)
}

/// Compile `draft` into character data.
///
/// Callers normally go through [`Draft::compile`], which checks the draft
/// is complete first. This function only fails on missing catalog
/// entries, a broken resource formula, or rule content with no
/// implementation.
pub fn compile(
    draft: &Draft,
    catalog: &dyn RulesCatalog,
    config: &EngineConfig,
    character_id: &str,
) -> Result<CharacterData, RulesError> {
    let missing = draft.missing_steps();
    let (Some(name), Some(race_id), Some(class_id), Some(background_id), Some(base_scores)) = (
        draft.name(),
        draft.race_id(),
        draft.class_id(),
        draft.background_id(),
        draft.ability_scores(),
    ) else {
        return Err(RulesError::DraftIncomplete { missing });
    };

    let race = require_race(catalog, race_id)?;
    let subrace = draft
        .subrace_id()
        .map(|id| race.subrace(id).ok_or_else(|| RulesError::not_found("subrace", id)))
        .transpose()?;
    let class = require_class(catalog, class_id)?;
    let subclass = draft
        .subclass_id()
        .map(|id| class.subclass(id).ok_or_else(|| RulesError::not_found("subclass", id)))
        .transpose()?;
    let background = require_background(catalog, background_id)?;

    let mut sources: Vec<&dyn GrantSource> = Vec::new();
    sources.push(race);
    if let Some(subrace) = subrace {
        sources.push(subrace);
    }
    sources.push(class);
    if let Some(subclass) = subclass {
        sources.push(subclass);
    }
    sources.push(background);

    let level = config.starting_level;
    let mut provenance = Provenance::new();

    let scores = compile_scores(*base_scores, &sources, config, &mut provenance);
    let (hit_points, hit_die) = compile_hit_points(class, level, &scores);
    let skills = compile_skills(&sources, draft.choices(), &mut provenance);
    let languages = compile_languages(&sources, draft.choices(), config, &mut provenance);

    let mut saving_throws = BTreeMap::new();
    for ability in class.saving_throws.iter().copied() {
        grant(&mut saving_throws, ability, ProficiencyLevel::Proficient);
        provenance.record("saving_throw", ability.as_ref(), class.label());
    }

    let mut armor_proficiencies = BTreeSet::new();
    let mut weapon_proficiencies = BTreeSet::new();
    let mut tool_proficiencies = BTreeSet::new();
    for source in &sources {
        union_into(&mut armor_proficiencies, source.armor_proficiencies(), "armor", &source.label(), &mut provenance);
        union_into(&mut weapon_proficiencies, source.weapon_proficiencies(), "weapon", &source.label(), &mut provenance);
        union_into(&mut tool_proficiencies, source.tool_proficiencies(), "tool", &source.label(), &mut provenance);
    }

    let mut spells = BTreeSet::new();
    let mut cantrips = BTreeSet::new();
    let mut equipment_picks = Vec::new();
    let mut conditions: Vec<EntityRecord> = class.starting_conditions.clone();
    for choice in draft.choices() {
        match &choice.selection {
            Selection::Tools(tools) => {
                union_into(&mut tool_proficiencies, tools, "tool", &choice_label(choice), &mut provenance)
            }
            Selection::Spells(list) => spells.extend(list.iter().cloned()),
            Selection::Cantrips(list) => cantrips.extend(list.iter().cloned()),
            Selection::Equipment(items) => {
                equipment_picks.extend(items.iter().map(|id| ItemStack::new(id, 1)))
            }
            Selection::FightingStyle(style) => {
                let parsed = style.parse::<FightingStyle>().map_err(|_| RulesError::Unsupported {
                    kind: "fighting_style",
                    value: style.clone(),
                })?;
                conditions.push(FightingStyleCondition::record(parsed)?);
                provenance.record("fighting_style", &parsed.to_string(), choice_label(choice));
            }
            _ => {}
        }
    }

    let resources = compile_resources(class, level, &scores)?;
    let spell_slots = compile_spell_slots(class, level);

    let features = sources
        .iter()
        .flat_map(|s| s.features())
        .filter(|g| g.level <= level)
        .map(|g| EntityRecord::new(g.feature.clone(), g.config.clone()))
        .collect::<Vec<_>>();

    let inventory = compile_inventory(
        catalog,
        class
            .starting_equipment
            .iter()
            .chain(&background.equipment)
            .chain(&equipment_picks),
    )?;

    let mut sheet = CharacterSheet {
        id: EntityId::new(character_id),
        player_id: draft.player_id.clone(),
        name: name.to_string(),
        level,
        proficiency_bonus: proficiency_bonus(level),
        race_id: race.id.clone(),
        subrace_id: subrace.map(|s| s.id.clone()),
        class_id: class.id.clone(),
        subclass_id: subclass.map(|s| s.id.clone()),
        background_id: background.id.clone(),
        speed: race.speed,
        ability_scores: scores,
        hit_points,
        max_hit_points: hit_points,
        armor_class: 0,
        hit_die,
        skills,
        saving_throws,
        languages,
        armor_proficiencies,
        weapon_proficiencies,
        tool_proficiencies,
        inventory,
        equipped: BTreeMap::new(),
        spell_slots,
        spells,
        cantrips,
        resources,
        death_saves: DeathSaves::default(),
        choices: draft.choices().to_vec(),
        provenance,
    };
    sheet.armor_class = sheet.base_armor_class();

    tracing::debug!(
        character_id,
        level,
        hit_points,
        skills = sheet.skills.len(),
        features = features.len(),
        conditions = conditions.len(),
        "character compiled"
    );
    Ok(CharacterData {
        sheet,
        conditions,
        features,
        actions: Vec::new(),
    })
}

/// Base scores plus every racial increase, capped at the creation ceiling.
fn compile_scores(
    base: AbilityScores,
    sources: &[&dyn GrantSource],
    config: &EngineConfig,
    provenance: &mut Provenance,
) -> AbilityScores {
    let mut scores = base;
    for (ability, value) in base.iter() {
        provenance.record_ability(ability, "base", i32::from(value));
    }
    for source in sources {
        let Some(increases) = source.ability_increases() else {
            continue;
        };
        for (&ability, &amount) in increases {
            let before = scores.get(ability);
            if scores.increase_capped(ability, amount, config.max_ability_score) {
                tracing::warn!(
                    %ability,
                    source = %source.label(),
                    ceiling = config.max_ability_score,
                    "ability increase capped"
                );
            }
            let applied = i32::from(scores.get(ability)) - i32::from(before);
            provenance.record_ability(ability, source.label(), applied);
        }
    }
    scores
}

/// Maximum hit points and hit die size.
///
/// First level takes the full hit die, later levels the class average;
/// each level adds the Constitution modifier and is worth at least 1.
fn compile_hit_points(class: &ClassData, level: u8, scores: &AbilityScores) -> (u32, u8) {
    let con = scores.modifier(Ability::Constitution);
    let first = (i32::from(class.hit_die) + con).max(1);
    let later = (i32::from(class.hit_points_per_level) + con).max(1) * (i32::from(level) - 1);
    ((first + later).max(1) as u32, class.hit_die)
}

fn compile_skills(
    sources: &[&dyn GrantSource],
    choices: &[ChoiceData],
    provenance: &mut Provenance,
) -> BTreeMap<Skill, ProficiencyLevel> {
    let mut skills = BTreeMap::new();
    for source in sources {
        for &skill in source.skills() {
            grant(&mut skills, skill, ProficiencyLevel::Proficient);
            provenance.record("skill", skill.as_ref(), source.label());
        }
    }
    for choice in choices {
        let (list, level) = match &choice.selection {
            Selection::Skills(list) => (list, ProficiencyLevel::Proficient),
            Selection::Expertise(list) => (list, ProficiencyLevel::Expertise),
            _ => continue,
        };
        for &skill in list {
            grant(&mut skills, skill, level);
            provenance.record("skill", skill.as_ref(), choice_label(choice));
        }
    }
    skills
}

fn compile_languages(
    sources: &[&dyn GrantSource],
    choices: &[ChoiceData],
    config: &EngineConfig,
    provenance: &mut Provenance,
) -> BTreeSet<String> {
    let mut languages = BTreeSet::new();
    languages.insert(config.trade_language.clone());
    provenance.record("language", &config.trade_language, "trade");
    for source in sources {
        union_into(&mut languages, source.languages(), "language", &source.label(), provenance);
    }
    for choice in choices {
        if let Selection::Languages(list) = &choice.selection {
            union_into(&mut languages, list, "language", &choice_label(choice), provenance);
        }
    }
    languages
}

fn union_into(
    set: &mut BTreeSet<String>,
    values: &[String],
    kind: &str,
    origin: &str,
    provenance: &mut Provenance,
) {
    for value in values {
        set.insert(value.clone());
        provenance.record(kind, value, origin);
    }
}

/// Class resources at full, plus hit dice.
///
/// A level table entry at or below the character's level wins over the
/// formula. Resources whose maximum works out to zero are left out.
fn compile_resources(
    class: &ClassData,
    level: u8,
    scores: &AbilityScores,
) -> Result<BTreeMap<String, RecoverableResource>, RulesError> {
    let mut resources = BTreeMap::new();
    for def in &class.resources {
        let maximum = match def.uses_per_level.range(..=level).next_back() {
            Some((_, &uses)) => uses,
            None => match &def.max_formula {
                Some(formula) => formula::evaluate(formula, level, scores)
                    .map_err(|source| RulesError::Formula {
                        resource: def.id.clone(),
                        source,
                    })?
                    .max(0) as u32,
                None => 0,
            },
        };
        if maximum == 0 {
            tracing::debug!(resource = %def.id, level, "resource not available at this level");
            continue;
        }
        resources.insert(
            def.id.clone(),
            RecoverableResource::new(&def.id, &def.name, maximum, def.reset).with_recovery(def.recovery),
        );
    }
    resources.insert(
        HIT_DICE.to_string(),
        RecoverableResource::new(HIT_DICE, "Hit Dice", u32::from(level), RestType::LongRest)
            .with_recovery(Recovery::Half),
    );
    Ok(resources)
}

fn compile_spell_slots(class: &ClassData, level: u8) -> BTreeMap<u8, SpellSlots> {
    let Some(casting) = &class.spellcasting else {
        return BTreeMap::new();
    };
    let Some((_, counts)) = casting.slots.range(..=level).next_back() else {
        return BTreeMap::new();
    };
    counts
        .iter()
        .enumerate()
        .filter(|(_, &n)| n > 0)
        .map(|(i, &maximum)| (i as u8 + 1, SpellSlots { maximum, used: 0 }))
        .collect()
}

fn compile_inventory<'a>(
    catalog: &dyn RulesCatalog,
    stacks: impl Iterator<Item = &'a ItemStack>,
) -> Result<BTreeMap<String, InventoryItem>, RulesError> {
    let mut inventory: BTreeMap<String, InventoryItem> = BTreeMap::new();
    for stack in stacks {
        if let Some(entry) = inventory.get_mut(&stack.item_id) {
            entry.quantity += stack.quantity;
            continue;
        }
        let item = catalog
            .item(&stack.item_id)
            .ok_or_else(|| RulesError::not_found("item", stack.item_id.clone()))?;
        inventory.insert(
            stack.item_id.clone(),
            InventoryItem {
                item: item.clone(),
                quantity: stack.quantity,
            },
        );
    }
    Ok(inventory)
}
