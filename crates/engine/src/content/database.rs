use std::collections::HashMap;

use crate::app::Vec2;

pub const ARENA_STAGE_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncounterDefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BossDefId(pub u32);

/// How a cleared encounter turns into a reward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionBehavior {
    /// An NPC walks to the player; contact issues the reward.
    SpawnNpc { npc_label: String },
    /// The player must walk up to the structure, optionally after beating
    /// a follow-up boss.
    InteractWithStructure { follow_up_boss: Option<String> },
}

#[derive(Debug, Clone)]
pub struct EncounterDef {
    pub id: EncounterDefId,
    pub def_name: String,
    pub label: String,
    pub scale: Vec2,
    pub guard_kind: String,
    pub guard_count: u32,
    pub guard_health_mult: f32,
    pub camera_zoom: f32,
    pub reward: String,
    pub reward_text: String,
    pub completion: CompletionBehavior,
    pub spawn_text: String,
    pub completion_text: String,
}

#[derive(Debug, Clone)]
pub struct BossDef {
    pub id: BossDefId,
    pub def_name: String,
    pub label: String,
    pub scale: Vec2,
    pub camera_zoom: f32,
}

#[derive(Debug, Clone)]
pub struct ArenaStageDef {
    pub stage: u8,
    pub label: String,
    pub hostile_kind: String,
    pub hostile_count: u32,
    pub reward: String,
    pub reward_text: String,
    pub intro_text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ShopDef {
    pub guard_kind: String,
    pub guard_count: u32,
    pub appear_text: Vec<String>,
    pub greeting_text: Vec<String>,
    pub farewell_text: Vec<String>,
}

impl ShopDef {
    pub fn appear_line(&self, visit: u32) -> &str {
        line_for_visit(&self.appear_text, visit)
    }

    pub fn greeting_line(&self, visit: u32) -> &str {
        line_for_visit(&self.greeting_text, visit)
    }

    pub fn farewell_line(&self, visit: u32) -> &str {
        line_for_visit(&self.farewell_text, visit)
    }
}

fn line_for_visit(lines: &[String], visit: u32) -> &str {
    let index = (visit as usize).min(lines.len().saturating_sub(1));
    lines.get(index).map(String::as_str).unwrap_or_default()
}

/// One element of the story script. Names are resolved against the
/// database at spawn time, not at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEntry {
    Encounter(String),
    Boss(String),
    Portal,
    Shop,
    StoryComplete,
}

impl ScriptEntry {
    pub fn kind_token(&self) -> &'static str {
        match self {
            Self::Encounter(_) => "encounter",
            Self::Boss(_) => "boss",
            Self::Portal => "portal",
            Self::Shop => "shop",
            Self::StoryComplete => "storyComplete",
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DefDatabase {
    encounter_defs: Vec<EncounterDef>,
    encounter_ids_by_name: HashMap<String, EncounterDefId>,
    boss_defs: Vec<BossDef>,
    boss_ids_by_name: HashMap<String, BossDefId>,
    arena_stages: Vec<ArenaStageDef>,
    shop: Option<ShopDef>,
    script: Vec<ScriptEntry>,
}

impl DefDatabase {
    pub fn new(
        mut encounter_defs: Vec<EncounterDef>,
        mut boss_defs: Vec<BossDef>,
        mut arena_stages: Vec<ArenaStageDef>,
        shop: Option<ShopDef>,
        script: Vec<ScriptEntry>,
    ) -> Self {
        let mut encounter_ids_by_name = HashMap::with_capacity(encounter_defs.len());
        for (idx, def) in encounter_defs.iter_mut().enumerate() {
            let id = EncounterDefId(idx as u32);
            def.id = id;
            encounter_ids_by_name.insert(def.def_name.clone(), id);
        }
        let mut boss_ids_by_name = HashMap::with_capacity(boss_defs.len());
        for (idx, def) in boss_defs.iter_mut().enumerate() {
            let id = BossDefId(idx as u32);
            def.id = id;
            boss_ids_by_name.insert(def.def_name.clone(), id);
        }
        arena_stages.sort_by_key(|stage| stage.stage);
        Self {
            encounter_defs,
            encounter_ids_by_name,
            boss_defs,
            boss_ids_by_name,
            arena_stages,
            shop,
            script,
        }
    }

    pub fn encounter_id_by_name(&self, name: &str) -> Option<EncounterDefId> {
        self.encounter_ids_by_name.get(name).copied()
    }

    pub fn encounter(&self, id: EncounterDefId) -> Option<&EncounterDef> {
        self.encounter_defs.get(id.0 as usize)
    }

    pub fn encounter_defs(&self) -> &[EncounterDef] {
        &self.encounter_defs
    }

    pub fn boss_by_name(&self, name: &str) -> Option<&BossDef> {
        self.boss_ids_by_name
            .get(name)
            .and_then(|id| self.boss_defs.get(id.0 as usize))
    }

    pub fn boss(&self, id: BossDefId) -> Option<&BossDef> {
        self.boss_defs.get(id.0 as usize)
    }

    pub fn arena_stage(&self, stage: u8) -> Option<&ArenaStageDef> {
        self.arena_stages.iter().find(|def| def.stage == stage)
    }

    pub fn arena_stages(&self) -> &[ArenaStageDef] {
        &self.arena_stages
    }

    pub fn shop(&self) -> Option<&ShopDef> {
        self.shop.as_ref()
    }

    pub fn script(&self) -> &[ScriptEntry] {
        &self.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boss(name: &str) -> BossDef {
        BossDef {
            id: BossDefId(0),
            def_name: name.to_string(),
            label: name.to_string(),
            scale: Vec2::new(8.0, 12.0),
            camera_zoom: 1.8,
        }
    }

    #[test]
    fn ids_follow_insertion_order() {
        let db = DefDatabase::new(
            Vec::new(),
            vec![boss("dragon"), boss("troll")],
            Vec::new(),
            None,
            Vec::new(),
        );
        assert_eq!(db.boss_by_name("troll").map(|def| def.id), Some(BossDefId(1)));
        assert!(db.boss_by_name("evilTree").is_none());
    }

    #[test]
    fn shop_lines_reuse_last_entry_for_late_visits() {
        let shop = ShopDef {
            greeting_text: vec!["first".to_string(), "second".to_string()],
            ..ShopDef::default()
        };
        assert_eq!(shop.greeting_line(0), "first");
        assert_eq!(shop.greeting_line(1), "second");
        assert_eq!(shop.greeting_line(7), "second");
        assert_eq!(shop.farewell_line(0), "");
    }
}
