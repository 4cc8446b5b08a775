use engine::{DefDatabase, Vec2, CAMERA_ZOOM_DEFAULT};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::bus::StoryEvent;
use super::gate::SpawnPermit;
use super::services::{ServiceError, TickEnv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) enum BossRole {
    /// Requested by a `boss` script entry; occupies the major-event slot.
    Story,
    /// Guards a structure's reward; rides on the encounter's slot.
    EncounterFollowUp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ActiveBoss {
    pub(crate) boss: String,
    pub(crate) role: BossRole,
}

#[derive(Debug, Error)]
pub(crate) enum BossRequestError {
    #[error("unknown boss template '{name}'")]
    UnknownBoss { name: String },
    #[error(transparent)]
    Service(#[from] ServiceError),
}

pub(crate) fn request_story_boss(
    _permit: SpawnPermit,
    defs: &DefDatabase,
    name: &str,
    position: Vec2,
    env: &mut TickEnv<'_>,
) -> Result<ActiveBoss, BossRequestError> {
    request_boss(defs, name, BossRole::Story, position, env)
}

pub(crate) fn request_follow_up_boss(
    defs: &DefDatabase,
    name: &str,
    position: Vec2,
    env: &mut TickEnv<'_>,
) -> Result<ActiveBoss, BossRequestError> {
    request_boss(defs, name, BossRole::EncounterFollowUp, position, env)
}

fn request_boss(
    defs: &DefDatabase,
    name: &str,
    role: BossRole,
    position: Vec2,
    env: &mut TickEnv<'_>,
) -> Result<ActiveBoss, BossRequestError> {
    let def = defs
        .boss_by_name(name)
        .ok_or_else(|| BossRequestError::UnknownBoss {
            name: name.to_string(),
        })?;
    env.services.combat.request_boss(def, position)?;
    env.world.set_camera_zoom(def.camera_zoom);
    env.bus.emit(StoryEvent::BossRequested {
        boss: def.def_name.clone(),
    });
    info!(
        boss = %def.def_name,
        role = ?role,
        x = position.x,
        y = position.y,
        "boss_requested"
    );
    Ok(ActiveBoss {
        boss: def.def_name.clone(),
        role,
    })
}

/// Releases the boss slot after the combat model reports the boss gone.
pub(crate) fn conclude(boss: &ActiveBoss, defeated: bool, env: &mut TickEnv<'_>) {
    env.world.set_camera_zoom(CAMERA_ZOOM_DEFAULT);
    if defeated {
        env.bus.emit(StoryEvent::BossDefeated {
            boss: boss.boss.clone(),
        });
    }
    info!(boss = %boss.boss, role = ?boss.role, defeated, "boss_concluded");
}
