use std::f32::consts::TAU;

use engine::{
    ActorKind, DefDatabase, EncounterDefId, EntityId, Scene, SceneCommand, SceneWorld,
    ScriptEntry, Vec2, CAMERA_ZOOM_DEFAULT,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::config::SessionConfig;

use super::arena::{ArenaSignal, ArenaSnapshot, ArenaState};
use super::boss::{self, ActiveBoss, BossRole};
use super::bus::{StoryEvent, StoryEventBus, StoryEventCounts};
use super::encounter::{EncounterInstance, EncounterSignal, EncounterSnapshot, RewardOutcome};
use super::gate::{EventGate, GateSnapshot, SpawnPermit};
use super::sequencer::{EventOrigin, StorySequencer};
use super::services::{Services, TickEnv};
use super::shop::{ShopSignal, ShopSnapshot, ShopVisit};

const PLAYER_LABEL: &str = "player";
const PLAYER_SCALE: Vec2 = Vec2 { x: 1.0, y: 1.0 };
const FOLLOW_UP_BOSS_OFFSET: f32 = 6.0;

macro_rules! tick_env {
    ($ctx:expr, $world:expr, $player_position:expr, $paused:expr) => {
        TickEnv {
            world: &mut *$world,
            services: &mut $ctx.services,
            config: &$ctx.config,
            bus: &mut $ctx.bus,
            player_id: $ctx.player_id,
            player_position: $player_position,
            paused: $paused,
        }
    };
}

/// All mutable state of one playthrough, owned by the director and lent to
/// each state machine for the duration of a step.
pub(crate) struct GameSessionContext {
    config: SessionConfig,
    defs: DefDatabase,
    sequencer: StorySequencer,
    encounter: Option<EncounterInstance>,
    boss: Option<ActiveBoss>,
    shop: Option<ShopVisit>,
    shop_visits: u32,
    arena: ArenaState,
    rng: StdRng,
    bus: StoryEventBus,
    services: Services,
    player_id: Option<EntityId>,
    tick: u64,
    freeplay_spawns: u32,
}

impl GameSessionContext {
    fn advance_story(&mut self, reason: &'static str) {
        let before = self.sequencer.cursor();
        let cursor = self.sequencer.advance();
        if cursor == before {
            return;
        }
        self.bus.emit(StoryEvent::ScriptAdvanced { cursor });
        info!(
            cursor,
            script_len = self.sequencer.script_len(),
            reason,
            "script_advanced"
        );
    }

    /// Skip-and-continue for entries that cannot be spawned.
    fn skip_entry(&mut self, kind: &'static str, reason: String) {
        warn!(
            cursor = self.sequencer.cursor(),
            kind,
            reason = %reason,
            "script_entry_skipped"
        );
        self.bus.emit(StoryEvent::EntrySkipped { kind, reason });
        self.advance_story("entry_skipped");
    }

    fn conclude_shop_visit(&mut self, origin: EventOrigin) {
        self.shop_visits = self.shop_visits.saturating_add(1);
        if origin == EventOrigin::Story {
            self.advance_story("shop_closed");
        }
    }

    fn spawn_position(&mut self, player_position: Vec2) -> Vec2 {
        let angle = self.rng.gen_range(0.0..TAU);
        player_position.offset(angle, self.config.spawn_distance)
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SessionSnapshot {
    pub(crate) tick: u64,
    pub(crate) cursor: usize,
    pub(crate) script_len: usize,
    pub(crate) current_entry: Option<String>,
    pub(crate) gate: GateSnapshot,
    pub(crate) gate_clear: bool,
    pub(crate) encounter: Option<EncounterSnapshot>,
    pub(crate) boss: Option<ActiveBoss>,
    pub(crate) shop: Option<ShopSnapshot>,
    pub(crate) shop_visits: u32,
    pub(crate) arena: ArenaSnapshot,
    pub(crate) freeplay_spawns: u32,
    pub(crate) lifetime_events: StoryEventCounts,
}

/// Drives the story: ticks every active state machine, runs the periodic
/// spawn check and receives notifications from the combat and shop hosts.
pub(crate) struct EventDirector {
    ctx: GameSessionContext,
}

impl EventDirector {
    pub(crate) fn new(defs: DefDatabase, config: SessionConfig, services: Services) -> Self {
        let sequencer = StorySequencer::new(defs.script().to_vec());
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            ctx: GameSessionContext {
                config,
                defs,
                sequencer,
                encounter: None,
                boss: None,
                shop: None,
                shop_visits: 0,
                arena: ArenaState::default(),
                rng,
                bus: StoryEventBus::default(),
                services,
                player_id: None,
                tick: 0,
                freeplay_spawns: 0,
            },
        }
    }

    pub(crate) fn cursor(&self) -> usize {
        self.ctx.sequencer.cursor()
    }

    pub(crate) fn current_entry(&self) -> Option<&ScriptEntry> {
        self.ctx.sequencer.current_entry()
    }

    pub(crate) fn story_complete(&self) -> bool {
        self.ctx.sequencer.is_story_complete()
    }

    pub(crate) fn encounter(&self) -> Option<&EncounterInstance> {
        self.ctx.encounter.as_ref()
    }

    pub(crate) fn boss(&self) -> Option<&ActiveBoss> {
        self.ctx.boss.as_ref()
    }

    pub(crate) fn shop(&self) -> Option<&ShopVisit> {
        self.ctx.shop.as_ref()
    }

    pub(crate) fn shop_visits(&self) -> u32 {
        self.ctx.shop_visits
    }

    pub(crate) fn arena(&self) -> &ArenaState {
        &self.ctx.arena
    }

    pub(crate) fn bus(&self) -> &StoryEventBus {
        &self.ctx.bus
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.ctx.config
    }

    pub(crate) fn player_id(&self) -> Option<EntityId> {
        self.ctx.player_id
    }

    pub(crate) fn freeplay_spawns(&self) -> u32 {
        self.ctx.freeplay_spawns
    }

    /// Every guard and arena hostile the combat host may strike.
    pub(crate) fn hostile_ids(&self) -> Vec<EntityId> {
        let mut ids = Vec::new();
        if let Some(encounter) = &self.ctx.encounter {
            ids.extend(encounter.guard_ids());
        }
        if let Some(shop) = &self.ctx.shop {
            ids.extend(shop.guard_ids());
        }
        if let Some(roster) = self.ctx.arena.roster() {
            ids.extend(roster.hostile_ids());
        }
        ids
    }

    /// Remaining health of a guard or arena hostile; `None` for ids no
    /// roster owns.
    pub(crate) fn hostile_health(&self, id: EntityId) -> Option<f32> {
        let ctx = &self.ctx;
        ctx.encounter
            .as_ref()
            .and_then(|encounter| encounter.guard_health(id))
            .or_else(|| ctx.shop.as_ref().and_then(|shop| shop.guard_health(id)))
            .or_else(|| ctx.arena.roster().and_then(|roster| roster.health_of(id)))
    }

    /// No major event holds the world, whatever the player level.
    pub(crate) fn is_idle(&self) -> bool {
        self.ctx.encounter.is_none()
            && self.ctx.boss.is_none()
            && self.ctx.shop.is_none()
            && !self.ctx.arena.is_busy()
    }

    pub(crate) fn gate_snapshot(&self) -> GateSnapshot {
        let ctx = &self.ctx;
        GateSnapshot {
            encounter_active: ctx.encounter.is_some(),
            story_boss_active: ctx.boss.is_some(),
            bosses_alive: ctx.services.combat.bosses_alive(),
            arena_busy: ctx.arena.is_busy(),
            shop_visit_active: ctx.shop.is_some(),
            shop_ui_active: ctx.services.shop.is_shop_active(),
            player_level: ctx.services.combat.player_level(),
            min_player_level: ctx.config.min_player_level,
        }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        let gate = self.gate_snapshot();
        SessionSnapshot {
            tick: self.ctx.tick,
            cursor: self.ctx.sequencer.cursor(),
            script_len: self.ctx.sequencer.script_len(),
            current_entry: self.ctx.sequencer.current_entry().map(describe_entry),
            gate,
            gate_clear: EventGate::can_start_major_event(&gate),
            encounter: self.ctx.encounter.as_ref().map(EncounterInstance::snapshot),
            boss: self.ctx.boss.clone(),
            shop: self.ctx.shop.as_ref().map(ShopVisit::snapshot),
            shop_visits: self.ctx.shop_visits,
            arena: self.ctx.arena.snapshot(),
            freeplay_spawns: self.ctx.freeplay_spawns,
            lifetime_events: self.ctx.bus.lifetime_counts().clone(),
        }
    }

    /// One frame of every state machine, then the periodic spawn check.
    pub(crate) fn on_tick(&mut self, world: &mut SceneWorld) {
        self.ctx.tick = self.ctx.tick.saturating_add(1);
        let player_position = self.player_position(world);
        let paused = self.ctx.services.dialogue.is_dialogue_active();

        self.tick_encounter(world, player_position, paused);
        self.tick_shop(world, player_position, paused);
        self.tick_arena(world, player_position, paused);

        let interval = u64::from(self.ctx.config.spawn_check_interval_ticks.max(1));
        if self.ctx.tick % interval == 0 {
            self.spawn_next(world);
        }
        for event in self.ctx.bus.iter_emitted_so_far() {
            debug!(tick = self.ctx.tick, event = event.name(), "story_event");
        }
        self.ctx.bus.finish_tick_rollover();
    }

    /// Spawns whatever the script asks for next if the gate is clear.
    /// Returns true when something was placed in the world.
    pub(crate) fn spawn_next(&mut self, world: &mut SceneWorld) -> bool {
        let Some(permit) = self.begin_major_event() else {
            return false;
        };
        let Some(entry) = self.ctx.sequencer.current_entry().cloned() else {
            debug!(cursor = self.ctx.sequencer.cursor(), "script_exhausted");
            return false;
        };
        let player_position = self.player_position(world);
        match entry {
            ScriptEntry::Encounter(name) => {
                self.spawn_story_encounter(permit, &name, world, player_position)
            }
            ScriptEntry::Boss(name) => self.spawn_story_boss(permit, &name, world, player_position),
            ScriptEntry::Portal => self.spawn_portal(permit, world, player_position),
            ScriptEntry::Shop => self.spawn_shop(permit, world, player_position),
            ScriptEntry::StoryComplete => self.spawn_freeplay_encounter(permit, world, player_position),
        }
    }

    pub(crate) fn notify_guard_death(&mut self, world: &mut SceneWorld, id: EntityId) -> bool {
        let player_position = self.player_position(world);
        let ctx = &mut self.ctx;
        if let Some(encounter) = ctx.encounter.as_mut() {
            if encounter.owns_guard(id) {
                let mut env = tick_env!(ctx, world, player_position, false);
                return encounter.notify_guard_death(id, &mut env);
            }
        }
        match ctx.shop.as_mut() {
            Some(shop) => shop.notify_guard_death(id, world),
            None => false,
        }
    }

    pub(crate) fn notify_hostile_death(&mut self, world: &mut SceneWorld, id: EntityId) -> bool {
        self.ctx.arena.notify_hostile_death(id, world)
    }

    /// Routes a hit to whichever roster owns `id`. Returns true when the hit
    /// killed it.
    pub(crate) fn apply_guard_damage(
        &mut self,
        world: &mut SceneWorld,
        id: EntityId,
        amount: f32,
    ) -> bool {
        let player_position = self.player_position(world);
        let ctx = &mut self.ctx;
        if let Some(encounter) = ctx.encounter.as_mut() {
            if encounter.owns_guard(id) {
                let mut env = tick_env!(ctx, world, player_position, false);
                return encounter
                    .apply_guard_damage(id, amount, &mut env)
                    .unwrap_or(false);
            }
        }
        if let Some(shop) = ctx.shop.as_mut() {
            if shop.owns_guard(id) {
                return shop.apply_guard_damage(id, amount, world).unwrap_or(false);
            }
        }
        ctx.arena
            .apply_hostile_damage(id, amount, world)
            .unwrap_or(false)
    }

    pub(crate) fn notify_boss_defeated(&mut self, world: &mut SceneWorld) -> bool {
        let player_position = self.player_position(world);
        let ctx = &mut self.ctx;
        let Some(active) = ctx.boss.take() else {
            debug!("boss_defeated_without_request");
            return false;
        };
        let mut env = tick_env!(ctx, world, player_position, false);
        boss::conclude(&active, true, &mut env);
        let advance = match active.role {
            BossRole::Story => true,
            BossRole::EncounterFollowUp => match ctx.encounter.as_mut() {
                Some(encounter) => {
                    let outcome = encounter.follow_up_boss_defeated(&mut env);
                    outcome == RewardOutcome::Granted && encounter.origin() == EventOrigin::Story
                }
                None => false,
            },
        };
        if advance {
            ctx.advance_story("boss_defeated");
        }
        true
    }

    /// The combat model despawned a requested boss that did not die. The
    /// entry stays current and is offered again.
    pub(crate) fn notify_boss_abandoned(&mut self, world: &mut SceneWorld) -> bool {
        let player_position = self.player_position(world);
        let ctx = &mut self.ctx;
        let Some(active) = ctx.boss.take() else {
            return false;
        };
        let mut env = tick_env!(ctx, world, player_position, false);
        boss::conclude(&active, false, &mut env);
        if active.role == BossRole::EncounterFollowUp {
            if let Some(encounter) = ctx.encounter.as_mut() {
                encounter.follow_up_boss_abandoned();
            }
        }
        true
    }

    pub(crate) fn notify_shop_closed(&mut self, world: &mut SceneWorld) -> bool {
        let player_position = self.player_position(world);
        let ctx = &mut self.ctx;
        let Some(shop) = ctx.shop.as_mut() else {
            return false;
        };
        let origin = shop.origin();
        let mut env = tick_env!(ctx, world, player_position, false);
        let closed = shop.notify_closed(&mut env);
        if closed {
            ctx.conclude_shop_visit(origin);
        }
        closed
    }

    /// Restarts the playthrough: cursor to zero, every roster cleared and
    /// every placed actor except the player released.
    pub(crate) fn request_reset(&mut self, world: &mut SceneWorld) {
        let ctx = &mut self.ctx;
        if let Some(mut encounter) = ctx.encounter.take() {
            encounter.remove(world);
        }
        if let Some(mut shop) = ctx.shop.take() {
            shop.remove(world);
        }
        ctx.boss = None;
        ctx.arena.reset(world);

        let player_id = ctx.player_id;
        let leftovers = world
            .entities()
            .iter()
            .filter(|entity| Some(entity.id) != player_id)
            .map(|entity| entity.id)
            .collect::<Vec<_>>();
        for id in leftovers {
            world.remove_actor(id);
        }
        if let Some(player_id) = player_id {
            world.move_actor(player_id, ctx.config.player_spawn());
        }
        world.set_camera_zoom(CAMERA_ZOOM_DEFAULT);

        ctx.sequencer.reset();
        ctx.shop_visits = 0;
        ctx.freeplay_spawns = 0;
        ctx.rng = StdRng::seed_from_u64(ctx.config.seed);
        ctx.bus.emit(StoryEvent::SessionReset);
        info!(script_len = ctx.sequencer.script_len(), "session_reset");
    }

    /// The single place a spawn permit is requested.
    fn begin_major_event(&self) -> Option<SpawnPermit> {
        match EventGate::admit(&self.gate_snapshot()) {
            Ok(permit) => Some(permit),
            Err(blocker) => {
                debug!(
                    cursor = self.ctx.sequencer.cursor(),
                    blocker = blocker.as_str(),
                    "major_event_blocked"
                );
                None
            }
        }
    }

    fn player_position(&self, world: &SceneWorld) -> Vec2 {
        self.ctx
            .player_id
            .and_then(|id| world.actor_position(id))
            .unwrap_or_else(|| self.ctx.config.player_spawn())
    }

    fn spawn_story_encounter(
        &mut self,
        permit: SpawnPermit,
        name: &str,
        world: &mut SceneWorld,
        player_position: Vec2,
    ) -> bool {
        match self.ctx.defs.encounter_id_by_name(name) {
            Some(id) => self.spawn_encounter(permit, id, EventOrigin::Story, world, player_position),
            None => {
                self.ctx
                    .skip_entry("encounter", format!("unknown encounter template '{name}'"));
                false
            }
        }
    }

    fn spawn_freeplay_encounter(
        &mut self,
        permit: SpawnPermit,
        world: &mut SceneWorld,
        player_position: Vec2,
    ) -> bool {
        let count = self.ctx.defs.encounter_defs().len();
        if count == 0 {
            debug!("freeplay_without_encounter_defs");
            return false;
        }
        let index = self.ctx.rng.gen_range(0..count);
        let id = self.ctx.defs.encounter_defs()[index].id;
        let spawned = self.spawn_encounter(permit, id, EventOrigin::Freeplay, world, player_position);
        if spawned {
            self.ctx.freeplay_spawns = self.ctx.freeplay_spawns.saturating_add(1);
        }
        spawned
    }

    fn spawn_encounter(
        &mut self,
        permit: SpawnPermit,
        id: EncounterDefId,
        origin: EventOrigin,
        world: &mut SceneWorld,
        player_position: Vec2,
    ) -> bool {
        let position = self.ctx.spawn_position(player_position);
        let ctx = &mut self.ctx;
        let Some(template) = ctx.defs.encounter(id) else {
            return false;
        };
        let mut env = tick_env!(ctx, world, player_position, false);
        let instance = EncounterInstance::spawn(permit, template, origin, position, &mut env);
        ctx.encounter = Some(instance);
        true
    }

    fn spawn_story_boss(
        &mut self,
        permit: SpawnPermit,
        name: &str,
        world: &mut SceneWorld,
        player_position: Vec2,
    ) -> bool {
        let position = self.ctx.spawn_position(player_position);
        let ctx = &mut self.ctx;
        let mut env = tick_env!(ctx, world, player_position, false);
        match boss::request_story_boss(permit, &ctx.defs, name, position, &mut env) {
            Ok(active) => {
                ctx.boss = Some(active);
                true
            }
            Err(error) => {
                ctx.skip_entry("boss", error.to_string());
                false
            }
        }
    }

    fn spawn_portal(
        &mut self,
        permit: SpawnPermit,
        world: &mut SceneWorld,
        player_position: Vec2,
    ) -> bool {
        if self.ctx.arena.is_complete() {
            self.ctx
                .skip_entry("portal", "bonus arena already completed".to_string());
            return false;
        }
        let position = self.ctx.spawn_position(player_position);
        let ctx = &mut self.ctx;
        let mut env = tick_env!(ctx, world, player_position, false);
        ctx.arena.open_portal(permit, position, &mut env)
    }

    fn spawn_shop(
        &mut self,
        permit: SpawnPermit,
        world: &mut SceneWorld,
        player_position: Vec2,
    ) -> bool {
        let position = self.ctx.spawn_position(player_position);
        let ctx = &mut self.ctx;
        let Some(def) = ctx.defs.shop() else {
            ctx.skip_entry("shop", "no ShopDef loaded".to_string());
            return false;
        };
        let visit = ctx.shop_visits;
        let mut env = tick_env!(ctx, world, player_position, false);
        let shop = ShopVisit::spawn(permit, def, visit, EventOrigin::Story, position, &mut env);
        ctx.shop = Some(shop);
        true
    }

    fn tick_encounter(&mut self, world: &mut SceneWorld, player_position: Vec2, paused: bool) {
        let ctx = &mut self.ctx;
        let Some(encounter) = ctx.encounter.as_mut() else {
            return;
        };
        let origin = encounter.origin();
        let mut env = tick_env!(ctx, world, player_position, paused);
        let signal = encounter.tick(&mut env);
        match signal {
            EncounterSignal::Idle => {}
            EncounterSignal::RewardGranted => {
                if origin == EventOrigin::Story {
                    ctx.advance_story("encounter_reward");
                }
            }
            EncounterSignal::FollowUpBossDue(name) => {
                self.start_follow_up_boss(&name, world, player_position);
            }
            EncounterSignal::Removed | EncounterSignal::Abandoned => {
                ctx.encounter = None;
            }
        }
    }

    fn start_follow_up_boss(&mut self, name: &str, world: &mut SceneWorld, player_position: Vec2) {
        let ctx = &mut self.ctx;
        if ctx.boss.is_some() {
            return;
        }
        let Some(encounter) = ctx.encounter.as_mut() else {
            return;
        };
        let position = encounter.position().offset(0.0, FOLLOW_UP_BOSS_OFFSET);
        let mut env = tick_env!(ctx, world, player_position, false);
        match boss::request_follow_up_boss(&ctx.defs, name, position, &mut env) {
            Ok(active) => {
                encounter.follow_up_boss_started();
                ctx.boss = Some(active);
            }
            Err(error) => {
                warn!(
                    template = %encounter.template().def_name,
                    boss = name,
                    error = %error,
                    "follow_up_boss_skipped"
                );
                let outcome = encounter.give_reward(&mut env);
                if outcome == RewardOutcome::Granted && encounter.origin() == EventOrigin::Story {
                    ctx.advance_story("encounter_reward");
                }
            }
        }
    }

    fn tick_shop(&mut self, world: &mut SceneWorld, player_position: Vec2, paused: bool) {
        let ctx = &mut self.ctx;
        let Some(shop) = ctx.shop.as_mut() else {
            return;
        };
        let origin = shop.origin();
        let mut env = tick_env!(ctx, world, player_position, paused);
        match shop.tick(&mut env) {
            ShopSignal::Idle => {}
            ShopSignal::Closed => ctx.conclude_shop_visit(origin),
            ShopSignal::Removed | ShopSignal::Abandoned => ctx.shop = None,
        }
    }

    fn tick_arena(&mut self, world: &mut SceneWorld, player_position: Vec2, paused: bool) {
        let ctx = &mut self.ctx;
        let mut env = tick_env!(ctx, world, player_position, paused);
        if ctx.arena.tick(&ctx.defs, &mut env) == ArenaSignal::Completed {
            ctx.advance_story("arena_completed");
        }
    }
}

impl Scene for EventDirector {
    fn load(&mut self, world: &mut SceneWorld) {
        let spawn = self.ctx.config.player_spawn();
        let player_id = world.place_actor(ActorKind::Player, PLAYER_LABEL, spawn, PLAYER_SCALE);
        self.ctx.player_id = Some(player_id);
        info!(
            player_id = player_id.0,
            script_len = self.ctx.sequencer.script_len(),
            encounter_defs = self.ctx.defs.encounter_defs().len(),
            seed = self.ctx.config.seed,
            "event_director_loaded"
        );
    }

    fn update(&mut self, _fixed_dt_seconds: f32, world: &mut SceneWorld) -> SceneCommand {
        self.on_tick(world);
        SceneCommand::Continue
    }

    fn unload(&mut self, world: &mut SceneWorld) {
        match serde_json::to_string(&self.snapshot()) {
            Ok(json) => info!(snapshot = %json, "session_snapshot"),
            Err(error) => warn!(error = %error, "session_snapshot_failed"),
        }
        world.clear();
        self.ctx.player_id = None;
    }

    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        Some(format!(
            "wildwood | story {}/{} | arena stage {} | shop visits {}",
            self.ctx.sequencer.cursor(),
            self.ctx.sequencer.script_len(),
            self.ctx.arena.stage_index(),
            self.ctx.shop_visits
        ))
    }
}

fn describe_entry(entry: &ScriptEntry) -> String {
    match entry {
        ScriptEntry::Encounter(name) | ScriptEntry::Boss(name) => {
            format!("{}:{name}", entry.kind_token())
        }
        _ => entry.kind_token().to_string(),
    }
}
