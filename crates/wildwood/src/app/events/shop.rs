use engine::{ActorKind, EntityId, SceneWorld, ShopDef, Vec2, CAMERA_ZOOM_DEFAULT};
use serde::Serialize;
use tracing::{info, warn};

use super::bus::StoryEvent;
use super::gate::SpawnPermit;
use super::roster::{Courier, GuardRoster, GuardStats};
use super::sequencer::EventOrigin;
use super::services::TickEnv;

const SHOP_TITLE: &str = "Monster Store";
const SHOPKEEPER_LABEL: &str = "shopkeeper";
const SHOP_SCALE: Vec2 = Vec2 { x: 6.0, y: 5.0 };
pub(crate) const SHOP_CAMERA_ZOOM: f32 = 2.5;

#[derive(Debug)]
pub(crate) enum ShopPhase {
    Guarding,
    ShopkeeperApproaching(Courier),
    Open,
    Closed { cleanup_ticks_left: u32 },
    Removed,
}

impl ShopPhase {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Guarding => "guarding",
            Self::ShopkeeperApproaching(_) => "shopkeeper_approaching",
            Self::Open => "open",
            Self::Closed { .. } => "closed",
            Self::Removed => "removed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShopSignal {
    Idle,
    /// The visit concluded; the owner counts the visit and advances the story.
    Closed,
    Removed,
    Abandoned,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ShopSnapshot {
    pub(crate) visit: u32,
    pub(crate) origin: EventOrigin,
    pub(crate) phase: &'static str,
    pub(crate) guards_remaining: usize,
}

/// One appearance of the travelling shop: guarded store, shopkeeper walk,
/// open economy UI, farewell and cleanup.
#[derive(Debug)]
pub(crate) struct ShopVisit {
    def: ShopDef,
    visit: u32,
    origin: EventOrigin,
    position: Vec2,
    structure_id: EntityId,
    courier_id: Option<EntityId>,
    guards: GuardRoster,
    phase: ShopPhase,
    opened: bool,
}

impl ShopVisit {
    pub(crate) fn spawn(
        _permit: SpawnPermit,
        def: &ShopDef,
        visit: u32,
        origin: EventOrigin,
        position: Vec2,
        env: &mut TickEnv<'_>,
    ) -> Self {
        let structure_id =
            env.world
                .place_actor(ActorKind::Structure, SHOP_TITLE, position, SHOP_SCALE);
        let stats = GuardStats::scaled(env.config, env.services.combat.player_level(), 1.0);
        let guards = GuardRoster::spawn_ring(
            env.world,
            ActorKind::Guard,
            &def.guard_kind,
            def.guard_count,
            position,
            env.config.guard_ring_radius,
            stats,
        );
        env.world.set_camera_zoom(SHOP_CAMERA_ZOOM);
        let appear = def.appear_line(visit);
        if !appear.is_empty() {
            env.services.dialogue.show_dialogue(SHOP_TITLE, appear);
        }
        env.bus.emit(StoryEvent::ShopSpawned { visit });
        info!(
            visit,
            guard_count = def.guard_count,
            x = position.x,
            y = position.y,
            "shop_spawned"
        );
        Self {
            def: def.clone(),
            visit,
            origin,
            position,
            structure_id,
            courier_id: None,
            guards,
            phase: ShopPhase::Guarding,
            opened: false,
        }
    }

    pub(crate) fn visit(&self) -> u32 {
        self.visit
    }

    pub(crate) fn origin(&self) -> EventOrigin {
        self.origin
    }

    pub(crate) fn position(&self) -> Vec2 {
        self.position
    }

    pub(crate) fn phase(&self) -> &ShopPhase {
        &self.phase
    }

    pub(crate) fn guard_ids(&self) -> Vec<EntityId> {
        self.guards.ids()
    }

    pub(crate) fn owns_guard(&self, id: EntityId) -> bool {
        self.guards.contains(id)
    }

    pub(crate) fn guard_health(&self, id: EntityId) -> Option<f32> {
        self.guards.health_of(id)
    }

    pub(crate) fn snapshot(&self) -> ShopSnapshot {
        ShopSnapshot {
            visit: self.visit,
            origin: self.origin,
            phase: self.phase.name(),
            guards_remaining: self.guards.len(),
        }
    }

    pub(crate) fn tick(&mut self, env: &mut TickEnv<'_>) -> ShopSignal {
        let player_distance = self.position.distance(env.player_position);
        let before_open = matches!(
            self.phase,
            ShopPhase::Guarding | ShopPhase::ShopkeeperApproaching(_)
        );
        if before_open && player_distance > env.config.abandon_distance {
            info!(visit = self.visit, player_distance, "shop_abandoned");
            self.remove(env.world);
            return ShopSignal::Abandoned;
        }

        match &mut self.phase {
            ShopPhase::Guarding => {
                if self.guards.is_empty() {
                    let courier = Courier::dispatch(env.world, SHOPKEEPER_LABEL, self.position);
                    self.courier_id = Some(courier.id());
                    self.phase = ShopPhase::ShopkeeperApproaching(courier);
                    let greeting = self.def.greeting_line(self.visit);
                    if !greeting.is_empty() {
                        env.services.dialogue.show_dialogue(SHOP_TITLE, greeting);
                    }
                    info!(visit = self.visit, "shop_guards_cleared");
                } else if !env.paused {
                    self.guards.step(env);
                }
                ShopSignal::Idle
            }
            ShopPhase::ShopkeeperApproaching(courier) => {
                if !env.paused && courier.step(env) {
                    self.open(env)
                } else {
                    ShopSignal::Idle
                }
            }
            ShopPhase::Open => {
                if player_distance <= env.config.shop_sweep_distance {
                    return ShopSignal::Idle;
                }
                env.services.shop.close_shop_ui();
                self.close(env);
                ShopSignal::Closed
            }
            ShopPhase::Closed { cleanup_ticks_left } => {
                *cleanup_ticks_left = cleanup_ticks_left.saturating_sub(1);
                let swept = self.opened && player_distance > env.config.shop_sweep_distance;
                if *cleanup_ticks_left > 0 && !swept {
                    return ShopSignal::Idle;
                }
                self.remove(env.world);
                env.bus.emit(StoryEvent::ShopRemoved { visit: self.visit });
                info!(visit = self.visit, swept, "shop_removed");
                ShopSignal::Removed
            }
            ShopPhase::Removed => ShopSignal::Idle,
        }
    }

    pub(crate) fn notify_guard_death(&mut self, id: EntityId, world: &mut SceneWorld) -> bool {
        self.guards.remove(id, world)
    }

    pub(crate) fn apply_guard_damage(
        &mut self,
        id: EntityId,
        amount: f32,
        world: &mut SceneWorld,
    ) -> Option<bool> {
        let lethal = self.guards.damage(id, amount)?;
        if lethal {
            self.guards.remove(id, world);
        }
        Some(lethal)
    }

    /// The economy UI reported the player closed the store. Only an open
    /// store can close; repeats are ignored.
    pub(crate) fn notify_closed(&mut self, env: &mut TickEnv<'_>) -> bool {
        if !matches!(self.phase, ShopPhase::Open) {
            return false;
        }
        self.close(env);
        true
    }

    pub(crate) fn remove(&mut self, world: &mut SceneWorld) {
        self.guards.release(world);
        world.remove_actor(self.structure_id);
        if let Some(courier_id) = self.courier_id.take() {
            world.remove_actor(courier_id);
        }
        world.set_camera_zoom(CAMERA_ZOOM_DEFAULT);
        self.phase = ShopPhase::Removed;
    }

    fn open(&mut self, env: &mut TickEnv<'_>) -> ShopSignal {
        env.world.set_camera_zoom(CAMERA_ZOOM_DEFAULT);
        match env.services.shop.open_shop(self.visit) {
            Ok(()) => {
                self.opened = true;
                self.phase = ShopPhase::Open;
                env.bus.emit(StoryEvent::ShopOpened { visit: self.visit });
                info!(visit = self.visit, "shop_opened");
                ShopSignal::Idle
            }
            Err(error) => {
                warn!(visit = self.visit, error = %error, "shop_open_failed");
                self.close(env);
                ShopSignal::Closed
            }
        }
    }

    fn close(&mut self, env: &mut TickEnv<'_>) {
        let farewell = self.def.farewell_line(self.visit);
        if !farewell.is_empty() {
            env.services.dialogue.show_dialogue(SHOP_TITLE, farewell);
        }
        self.phase = ShopPhase::Closed {
            cleanup_ticks_left: env.config.shop_cleanup_ticks,
        };
        env.bus.emit(StoryEvent::ShopClosed { visit: self.visit });
        info!(
            visit = self.visit,
            cleanup_ticks = env.config.shop_cleanup_ticks,
            "shop_closed"
        );
    }
}
