use std::f32::consts::TAU;

use engine::{ActorKind, EntityId, SceneWorld, Vec2};
use serde::Serialize;

use crate::app::config::SessionConfig;

use super::services::TickEnv;

const GUARD_SCALE: Vec2 = Vec2 { x: 1.0, y: 1.0 };
const COURIER_SCALE: Vec2 = Vec2 { x: 1.0, y: 1.5 };

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GuardStats {
    pub(crate) health: f32,
    pub(crate) damage: f32,
}

impl GuardStats {
    pub(crate) fn scaled(config: &SessionConfig, player_level: u32, health_mult: f32) -> Self {
        let level_scale = 1.0 + player_level as f32 * 0.2;
        Self {
            health: config.guard_base_health * level_scale * health_mult,
            damage: config.guard_base_damage * level_scale,
        }
    }
}

#[derive(Debug, Clone)]
struct Guard {
    id: EntityId,
    health: f32,
    damage: f32,
    attack_cooldown: u32,
}

/// Hostiles protecting something. Guards close in on the player and strike
/// when in range; deaths are reported from outside.
#[derive(Debug, Default)]
pub(crate) struct GuardRoster {
    guards: Vec<Guard>,
}

impl GuardRoster {
    /// Places `count` actors evenly on a ring around `center`.
    pub(crate) fn spawn_ring(
        world: &mut SceneWorld,
        kind: ActorKind,
        label: &str,
        count: u32,
        center: Vec2,
        radius: f32,
        stats: GuardStats,
    ) -> Self {
        let mut guards = Vec::with_capacity(count as usize);
        for index in 0..count {
            let angle = index as f32 / count as f32 * TAU;
            let id = world.place_actor(kind, label, center.offset(angle, radius), GUARD_SCALE);
            guards.push(Guard {
                id,
                health: stats.health,
                damage: stats.damage,
                attack_cooldown: 0,
            });
        }
        Self { guards }
    }

    pub(crate) fn len(&self) -> usize {
        self.guards.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub(crate) fn contains(&self, id: EntityId) -> bool {
        self.guards.iter().any(|guard| guard.id == id)
    }

    pub(crate) fn ids(&self) -> Vec<EntityId> {
        self.guards.iter().map(|guard| guard.id).collect()
    }

    pub(crate) fn health_of(&self, id: EntityId) -> Option<f32> {
        self.guards
            .iter()
            .find(|guard| guard.id == id)
            .map(|guard| guard.health)
    }

    /// Drops the guard from the roster and releases its actor.
    pub(crate) fn remove(&mut self, id: EntityId, world: &mut SceneWorld) -> bool {
        let Some(index) = self.guards.iter().position(|guard| guard.id == id) else {
            return false;
        };
        self.guards.remove(index);
        world.remove_actor(id);
        true
    }

    /// Returns `Some(true)` when the hit was lethal, `None` for unknown ids.
    pub(crate) fn damage(&mut self, id: EntityId, amount: f32) -> Option<bool> {
        let guard = self.guards.iter_mut().find(|guard| guard.id == id)?;
        guard.health -= amount.max(0.0);
        Some(guard.health <= 0.0)
    }

    pub(crate) fn step(&mut self, env: &mut TickEnv<'_>) {
        for guard in &mut self.guards {
            guard.attack_cooldown = guard.attack_cooldown.saturating_sub(1);
            let Some(position) = env.world.actor_position(guard.id) else {
                continue;
            };
            if position.distance(env.player_position) > env.config.guard_attack_range {
                env.world.move_actor(
                    guard.id,
                    position.step_towards(env.player_position, env.config.guard_speed),
                );
            } else if guard.attack_cooldown == 0 {
                env.services.combat.damage_player(guard.damage);
                guard.attack_cooldown = env.config.guard_attack_cooldown_ticks;
            }
        }
    }

    pub(crate) fn release(&mut self, world: &mut SceneWorld) {
        for guard in self.guards.drain(..) {
            world.remove_actor(guard.id);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) enum CourierState {
    Approaching,
    Delivered,
}

/// An NPC that walks to the player and hands something over on contact.
#[derive(Debug, Clone)]
pub(crate) struct Courier {
    id: EntityId,
    state: CourierState,
}

impl Courier {
    pub(crate) fn dispatch(world: &mut SceneWorld, label: &str, position: Vec2) -> Self {
        Self {
            id: world.place_actor(ActorKind::Npc, label, position, COURIER_SCALE),
            state: CourierState::Approaching,
        }
    }

    pub(crate) fn id(&self) -> EntityId {
        self.id
    }

    pub(crate) fn state(&self) -> CourierState {
        self.state
    }

    /// True only on the tick contact is made. A courier whose actor has
    /// vanished counts as delivered so the encounter cannot stall.
    pub(crate) fn step(&mut self, env: &mut TickEnv<'_>) -> bool {
        if self.state == CourierState::Delivered {
            return false;
        }
        let Some(position) = env.world.actor_position(self.id) else {
            self.state = CourierState::Delivered;
            return true;
        };
        if position.distance(env.player_position) <= env.config.npc_contact_radius {
            self.state = CourierState::Delivered;
            return true;
        }
        env.world.move_actor(
            self.id,
            position.step_towards(env.player_position, env.config.npc_speed),
        );
        false
    }
}
