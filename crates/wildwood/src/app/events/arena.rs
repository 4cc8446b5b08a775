use engine::{
    ActorKind, DefDatabase, EntityId, SceneWorld, Vec2, ARENA_STAGE_COUNT, CAMERA_ZOOM_DEFAULT,
};
use serde::Serialize;
use tracing::{info, warn};

use super::bus::StoryEvent;
use super::gate::SpawnPermit;
use super::roster::{GuardRoster, GuardStats};
use super::services::TickEnv;

pub(crate) const ARENA_COMPLETE: u8 = ARENA_STAGE_COUNT as u8;

const PORTAL_LABEL: &str = "portal";
const PORTAL_SCALE: Vec2 = Vec2 { x: 2.0, y: 3.0 };

/// Main-world state put aside while the player is inside the arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ArenaStash {
    pub(crate) player_position: Vec2,
    pub(crate) camera_zoom: f32,
}

/// Hostiles of exactly one stage.
#[derive(Debug)]
pub(crate) struct StageRoster {
    stage: u8,
    hostiles: GuardRoster,
}

impl StageRoster {
    pub(crate) fn stage(&self) -> u8 {
        self.stage
    }

    pub(crate) fn hostile_ids(&self) -> Vec<EntityId> {
        self.hostiles.ids()
    }

    pub(crate) fn len(&self) -> usize {
        self.hostiles.len()
    }

    pub(crate) fn health_of(&self, id: EntityId) -> Option<f32> {
        self.hostiles.health_of(id)
    }
}

#[derive(Debug)]
pub(crate) enum ArenaSession {
    Idle,
    PortalOpen { portal_id: EntityId, position: Vec2 },
    Inside { stash: ArenaStash, roster: StageRoster },
    Exiting { exit_ticks_left: u32, stash: ArenaStash },
}

impl ArenaSession {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PortalOpen { .. } => "portal_open",
            Self::Inside { .. } => "inside",
            Self::Exiting { .. } => "exiting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArenaSignal {
    Idle,
    Entered,
    /// The last stage was won; the story moves on.
    Completed,
    Exited,
    PortalAbandoned,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ArenaSnapshot {
    pub(crate) stage_index: u8,
    pub(crate) session: &'static str,
    pub(crate) hostiles_remaining: usize,
}

/// The three-stage bonus arena. `stage_index` only grows; reaching
/// `ARENA_COMPLETE` retires the arena for the playthrough.
#[derive(Debug)]
pub(crate) struct ArenaState {
    stage_index: u8,
    session: ArenaSession,
}

impl Default for ArenaState {
    fn default() -> Self {
        Self {
            stage_index: 0,
            session: ArenaSession::Idle,
        }
    }
}

impl ArenaState {
    pub(crate) fn stage_index(&self) -> u8 {
        self.stage_index
    }

    pub(crate) fn session(&self) -> &ArenaSession {
        &self.session
    }

    pub(crate) fn is_busy(&self) -> bool {
        !matches!(self.session, ArenaSession::Idle)
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.stage_index >= ARENA_COMPLETE
    }

    pub(crate) fn portal_position(&self) -> Option<Vec2> {
        match self.session {
            ArenaSession::PortalOpen { position, .. } => Some(position),
            _ => None,
        }
    }

    pub(crate) fn roster(&self) -> Option<&StageRoster> {
        match &self.session {
            ArenaSession::Inside { roster, .. } => Some(roster),
            _ => None,
        }
    }

    pub(crate) fn snapshot(&self) -> ArenaSnapshot {
        ArenaSnapshot {
            stage_index: self.stage_index,
            session: self.session.name(),
            hostiles_remaining: self.roster().map_or(0, StageRoster::len),
        }
    }

    pub(crate) fn open_portal(
        &mut self,
        _permit: SpawnPermit,
        position: Vec2,
        env: &mut TickEnv<'_>,
    ) -> bool {
        if self.is_complete() || self.is_busy() {
            warn!(
                stage_index = self.stage_index,
                session = self.session.name(),
                "arena_portal_refused"
            );
            return false;
        }
        let portal_id = env
            .world
            .place_actor(ActorKind::Portal, PORTAL_LABEL, position, PORTAL_SCALE);
        self.session = ArenaSession::PortalOpen {
            portal_id,
            position,
        };
        env.bus.emit(StoryEvent::PortalOpened {
            portal_id,
            stage: self.stage_index,
        });
        info!(
            stage = self.stage_index,
            portal_id = portal_id.0,
            x = position.x,
            y = position.y,
            "arena_portal_opened"
        );
        true
    }

    pub(crate) fn tick(&mut self, defs: &DefDatabase, env: &mut TickEnv<'_>) -> ArenaSignal {
        match &mut self.session {
            ArenaSession::Idle => ArenaSignal::Idle,
            ArenaSession::PortalOpen {
                portal_id,
                position,
            } => {
                let (portal_id, position) = (*portal_id, *position);
                let player_distance = position.distance(env.player_position);
                if player_distance <= env.config.portal_trigger_radius {
                    env.world.remove_actor(portal_id);
                    self.enter(defs, env);
                    ArenaSignal::Entered
                } else if player_distance > env.config.abandon_distance {
                    env.world.remove_actor(portal_id);
                    self.session = ArenaSession::Idle;
                    info!(stage = self.stage_index, player_distance, "arena_portal_abandoned");
                    ArenaSignal::PortalAbandoned
                } else {
                    ArenaSignal::Idle
                }
            }
            ArenaSession::Inside { roster, .. } => {
                if roster.hostiles.is_empty() {
                    self.win_current_stage(defs, env)
                } else {
                    if !env.paused {
                        roster.hostiles.step(env);
                    }
                    ArenaSignal::Idle
                }
            }
            ArenaSession::Exiting {
                exit_ticks_left,
                stash,
            } => {
                *exit_ticks_left = exit_ticks_left.saturating_sub(1);
                if *exit_ticks_left > 0 {
                    return ArenaSignal::Idle;
                }
                let stash = *stash;
                self.exit(stash, env);
                ArenaSignal::Exited
            }
        }
    }

    /// Drops a dead hostile of the current stage. Ids from other stages are
    /// ignored.
    pub(crate) fn notify_hostile_death(&mut self, id: EntityId, world: &mut SceneWorld) -> bool {
        match &mut self.session {
            ArenaSession::Inside { roster, .. } => roster.hostiles.remove(id, world),
            _ => false,
        }
    }

    pub(crate) fn apply_hostile_damage(
        &mut self,
        id: EntityId,
        amount: f32,
        world: &mut SceneWorld,
    ) -> Option<bool> {
        let ArenaSession::Inside { roster, .. } = &mut self.session else {
            return None;
        };
        let lethal = roster.hostiles.damage(id, amount)?;
        if lethal {
            roster.hostiles.remove(id, world);
        }
        Some(lethal)
    }

    /// Pays out the current stage, bumps the stage index and schedules the
    /// return to the main world. Returns `Completed` when the last stage
    /// was won.
    pub(crate) fn win_current_stage(
        &mut self,
        defs: &DefDatabase,
        env: &mut TickEnv<'_>,
    ) -> ArenaSignal {
        let (stash, stage) = match &mut self.session {
            ArenaSession::Inside { stash, roster } => {
                roster.hostiles.release(env.world);
                (*stash, roster.stage())
            }
            _ => return ArenaSignal::Idle,
        };
        if let Some(stage_def) = defs.arena_stage(stage) {
            env.services.combat.grant_upgrade(&stage_def.reward);
            env.services.dialogue.show_reward(&stage_def.reward_text);
        }
        self.stage_index = self.stage_index.saturating_add(1);
        self.session = ArenaSession::Exiting {
            exit_ticks_left: env.config.arena_exit_ticks,
            stash,
        };
        env.bus.emit(StoryEvent::ArenaStageWon { stage });
        info!(stage, next_stage = self.stage_index, "arena_stage_won");
        if self.is_complete() {
            env.bus.emit(StoryEvent::ArenaCompleted);
            info!("arena_completed");
            ArenaSignal::Completed
        } else {
            ArenaSignal::Idle
        }
    }

    pub(crate) fn reset(&mut self, world: &mut SceneWorld) {
        match &mut self.session {
            ArenaSession::PortalOpen { portal_id, .. } => {
                world.remove_actor(*portal_id);
            }
            ArenaSession::Inside { roster, .. } => roster.hostiles.release(world),
            ArenaSession::Idle | ArenaSession::Exiting { .. } => {}
        }
        *self = Self::default();
    }

    fn enter(&mut self, defs: &DefDatabase, env: &mut TickEnv<'_>) {
        env.services.combat.clear_main_world_hostiles();
        let stash = ArenaStash {
            player_position: env.player_position,
            camera_zoom: env.world.camera().target_zoom,
        };
        let origin = env.config.arena_origin();
        if let Some(player_id) = env.player_id {
            env.world.move_actor(player_id, origin);
        }
        env.world.set_camera_zoom(CAMERA_ZOOM_DEFAULT);

        let stage = self.stage_index;
        let hostiles = match defs.arena_stage(stage) {
            Some(stage_def) => {
                if !stage_def.intro_text.is_empty() {
                    env.services
                        .dialogue
                        .show_dialogue(&stage_def.label, &stage_def.intro_text);
                }
                let stats = GuardStats::scaled(env.config, env.services.combat.player_level(), 1.0);
                GuardRoster::spawn_ring(
                    env.world,
                    ActorKind::Hostile,
                    &stage_def.hostile_kind,
                    stage_def.hostile_count,
                    origin,
                    env.config.arena_spawn_radius,
                    stats,
                )
            }
            None => {
                warn!(stage, "arena_stage_def_missing");
                GuardRoster::default()
            }
        };
        let hostile_count = hostiles.len() as u32;
        self.session = ArenaSession::Inside {
            stash,
            roster: StageRoster { stage, hostiles },
        };
        env.bus.emit(StoryEvent::ArenaEntered {
            stage,
            hostile_count,
        });
        info!(stage, hostile_count, "arena_entered");
    }

    fn exit(&mut self, stash: ArenaStash, env: &mut TickEnv<'_>) {
        if let Some(player_id) = env.player_id {
            env.world.move_actor(player_id, stash.player_position);
        }
        env.world.set_camera_zoom(stash.camera_zoom);
        self.session = ArenaSession::Idle;
        env.bus.emit(StoryEvent::ArenaExited {
            next_stage: self.stage_index,
        });
        info!(next_stage = self.stage_index, "arena_exited");
    }
}
