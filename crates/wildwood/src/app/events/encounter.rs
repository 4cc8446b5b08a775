use engine::{
    ActorKind, CompletionBehavior, EncounterDef, EntityId, SceneWorld, Vec2, CAMERA_ZOOM_DEFAULT,
};
use serde::Serialize;
use tracing::{debug, info};

use super::bus::StoryEvent;
use super::gate::SpawnPermit;
use super::roster::{Courier, CourierState, GuardRoster, GuardStats};
use super::sequencer::EventOrigin;
use super::services::TickEnv;

const REWARD_PICKUP_LABEL: &str = "heart";
const REWARD_PICKUP_SCALE: Vec2 = Vec2 { x: 1.0, y: 1.0 };

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FollowUp {
    None,
    Pending(String),
    BossActive(String),
}

#[derive(Debug)]
pub(crate) enum Completion {
    Npc(Courier),
    Structure { follow_up: FollowUp },
}

#[derive(Debug)]
pub(crate) enum EncounterPhase {
    Guarding,
    AwaitingCompletion(Completion),
    RewardGiven { teardown_ticks_left: u32 },
    Removed,
}

impl EncounterPhase {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Guarding => "guarding",
            Self::AwaitingCompletion(Completion::Npc(courier)) => match courier.state() {
                CourierState::Approaching => "awaiting_npc_approaching",
                CourierState::Delivered => "awaiting_npc_delivered",
            },
            Self::AwaitingCompletion(Completion::Structure { follow_up }) => match follow_up {
                FollowUp::None => "awaiting_structure",
                FollowUp::Pending(_) => "awaiting_structure_boss_pending",
                FollowUp::BossActive(_) => "awaiting_structure_boss_active",
            },
            Self::RewardGiven { .. } => "reward_given",
            Self::Removed => "removed",
        }
    }
}

/// What the owner must do after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EncounterSignal {
    Idle,
    RewardGranted,
    FollowUpBossDue(String),
    Removed,
    Abandoned,
}

enum PhaseStep {
    Wait,
    StepGuards,
    EnterCompletion,
    Reward,
    FollowUpDue(String),
    Teardown { swept: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RewardOutcome {
    Granted,
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EncounterSnapshot {
    pub(crate) template: String,
    pub(crate) origin: EventOrigin,
    pub(crate) phase: &'static str,
    pub(crate) guards_remaining: usize,
    pub(crate) guards_defeated: bool,
    pub(crate) reward_given: bool,
}

/// One scripted encounter: a structure, its guard roster and the way a
/// cleared encounter pays out.
#[derive(Debug)]
pub(crate) struct EncounterInstance {
    template: EncounterDef,
    origin: EventOrigin,
    position: Vec2,
    structure_id: EntityId,
    courier_id: Option<EntityId>,
    reward_pickup_id: Option<EntityId>,
    guards: GuardRoster,
    phase: EncounterPhase,
    guards_defeated: bool,
    reward_given: bool,
}

impl EncounterInstance {
    pub(crate) fn spawn(
        _permit: SpawnPermit,
        template: &EncounterDef,
        origin: EventOrigin,
        position: Vec2,
        env: &mut TickEnv<'_>,
    ) -> Self {
        let structure_id = env.world.place_actor(
            ActorKind::Structure,
            template.label.as_str(),
            position,
            template.scale,
        );
        let stats = GuardStats::scaled(
            env.config,
            env.services.combat.player_level(),
            template.guard_health_mult,
        );
        let guards = GuardRoster::spawn_ring(
            env.world,
            ActorKind::Guard,
            &template.guard_kind,
            template.guard_count,
            position,
            env.config.guard_ring_radius,
            stats,
        );
        env.world.set_camera_zoom(template.camera_zoom);
        if !template.spawn_text.is_empty() {
            env.services
                .dialogue
                .show_dialogue(&template.label, &template.spawn_text);
        }
        env.bus.emit(StoryEvent::EncounterSpawned {
            template: template.def_name.clone(),
            origin,
            guard_count: template.guard_count,
        });
        info!(
            template = %template.def_name,
            origin = ?origin,
            guard_count = template.guard_count,
            guard_health = stats.health,
            x = position.x,
            y = position.y,
            "encounter_spawned"
        );

        Self {
            template: template.clone(),
            origin,
            position,
            structure_id,
            courier_id: None,
            reward_pickup_id: None,
            guards,
            phase: EncounterPhase::Guarding,
            guards_defeated: false,
            reward_given: false,
        }
    }

    pub(crate) fn template(&self) -> &EncounterDef {
        &self.template
    }

    pub(crate) fn origin(&self) -> EventOrigin {
        self.origin
    }

    pub(crate) fn position(&self) -> Vec2 {
        self.position
    }

    pub(crate) fn phase(&self) -> &EncounterPhase {
        &self.phase
    }

    pub(crate) fn guard_ids(&self) -> Vec<EntityId> {
        self.guards.ids()
    }

    pub(crate) fn guards_remaining(&self) -> usize {
        self.guards.len()
    }

    pub(crate) fn guard_health(&self, id: EntityId) -> Option<f32> {
        self.guards.health_of(id)
    }

    pub(crate) fn guards_defeated(&self) -> bool {
        self.guards_defeated
    }

    pub(crate) fn reward_given(&self) -> bool {
        self.reward_given
    }

    pub(crate) fn is_removed(&self) -> bool {
        matches!(self.phase, EncounterPhase::Removed)
    }

    pub(crate) fn owns_guard(&self, id: EntityId) -> bool {
        self.guards.contains(id)
    }

    pub(crate) fn snapshot(&self) -> EncounterSnapshot {
        EncounterSnapshot {
            template: self.template.def_name.clone(),
            origin: self.origin,
            phase: self.phase.name(),
            guards_remaining: self.guards.len(),
            guards_defeated: self.guards_defeated,
            reward_given: self.reward_given,
        }
    }

    pub(crate) fn tick(&mut self, env: &mut TickEnv<'_>) -> EncounterSignal {
        if self.is_removed() {
            return EncounterSignal::Idle;
        }
        let player_distance = self.position.distance(env.player_position);
        if !self.reward_given && player_distance > env.config.abandon_distance {
            info!(
                template = %self.template.def_name,
                player_distance,
                "encounter_abandoned"
            );
            self.remove(env.world);
            env.bus.emit(StoryEvent::EncounterAbandoned {
                template: self.template.def_name.clone(),
            });
            return EncounterSignal::Abandoned;
        }

        let step = match &mut self.phase {
            EncounterPhase::Guarding if self.guards.is_empty() => PhaseStep::EnterCompletion,
            EncounterPhase::Guarding if env.paused => PhaseStep::Wait,
            EncounterPhase::Guarding => PhaseStep::StepGuards,
            EncounterPhase::AwaitingCompletion(Completion::Npc(courier)) => {
                if !env.paused && courier.step(env) {
                    PhaseStep::Reward
                } else {
                    PhaseStep::Wait
                }
            }
            EncounterPhase::AwaitingCompletion(Completion::Structure { follow_up }) => {
                if player_distance > env.config.structure_interact_radius {
                    PhaseStep::Wait
                } else {
                    match follow_up {
                        FollowUp::None => PhaseStep::Reward,
                        FollowUp::Pending(boss) => PhaseStep::FollowUpDue(boss.clone()),
                        FollowUp::BossActive(_) => PhaseStep::Wait,
                    }
                }
            }
            EncounterPhase::RewardGiven {
                teardown_ticks_left,
            } => {
                *teardown_ticks_left = teardown_ticks_left.saturating_sub(1);
                let swept = env
                    .config
                    .encounter_sweep_distance
                    .is_some_and(|sweep| player_distance > sweep);
                if *teardown_ticks_left == 0 || swept {
                    PhaseStep::Teardown { swept }
                } else {
                    PhaseStep::Wait
                }
            }
            EncounterPhase::Removed => PhaseStep::Wait,
        };

        match step {
            PhaseStep::Wait => EncounterSignal::Idle,
            PhaseStep::StepGuards => {
                self.guards.step(env);
                EncounterSignal::Idle
            }
            PhaseStep::EnterCompletion => {
                self.enter_awaiting_completion(env);
                EncounterSignal::Idle
            }
            PhaseStep::Reward => match self.give_reward(env) {
                RewardOutcome::Granted => EncounterSignal::RewardGranted,
                RewardOutcome::Ignored => EncounterSignal::Idle,
            },
            PhaseStep::FollowUpDue(boss) => EncounterSignal::FollowUpBossDue(boss),
            PhaseStep::Teardown { swept } => {
                info!(
                    template = %self.template.def_name,
                    swept,
                    "encounter_removed"
                );
                self.remove(env.world);
                env.bus.emit(StoryEvent::EncounterRemoved {
                    template: self.template.def_name.clone(),
                });
                EncounterSignal::Removed
            }
        }
    }

    /// Removes a dead guard from the roster. The roster emptying moves the
    /// encounter straight into its completion behavior.
    pub(crate) fn notify_guard_death(&mut self, id: EntityId, env: &mut TickEnv<'_>) -> bool {
        if !self.guards.remove(id, env.world) {
            return false;
        }
        debug!(
            template = %self.template.def_name,
            guard_id = id.0,
            guards_remaining = self.guards.len(),
            "encounter_guard_died"
        );
        if self.guards.is_empty() && matches!(self.phase, EncounterPhase::Guarding) {
            self.enter_awaiting_completion(env);
        }
        true
    }

    /// `None` when the guard is not part of this roster.
    pub(crate) fn apply_guard_damage(
        &mut self,
        id: EntityId,
        amount: f32,
        env: &mut TickEnv<'_>,
    ) -> Option<bool> {
        let lethal = self.guards.damage(id, amount)?;
        if lethal {
            self.notify_guard_death(id, env);
        }
        Some(lethal)
    }

    /// Issues the template reward once. Later calls, and calls on a removed
    /// instance, are no-ops.
    pub(crate) fn give_reward(&mut self, env: &mut TickEnv<'_>) -> RewardOutcome {
        if self.reward_given || self.is_removed() {
            debug!(
                template = %self.template.def_name,
                phase = self.phase.name(),
                "encounter_reward_ignored"
            );
            return RewardOutcome::Ignored;
        }
        self.reward_given = true;
        env.services.combat.grant_upgrade(&self.template.reward);
        env.services.dialogue.show_reward(&self.template.reward_text);
        if !self.template.completion_text.is_empty() {
            env.services
                .dialogue
                .show_dialogue(&self.template.label, &self.template.completion_text);
        }
        self.reward_pickup_id = Some(env.world.place_actor(
            ActorKind::Reward,
            REWARD_PICKUP_LABEL,
            self.position,
            REWARD_PICKUP_SCALE,
        ));
        self.phase = EncounterPhase::RewardGiven {
            teardown_ticks_left: env.config.encounter_teardown_ticks,
        };
        env.bus.emit(StoryEvent::RewardGranted {
            template: self.template.def_name.clone(),
            origin: self.origin,
        });
        info!(
            template = %self.template.def_name,
            reward = %self.template.reward,
            teardown_ticks = env.config.encounter_teardown_ticks,
            "encounter_reward_granted"
        );
        RewardOutcome::Granted
    }

    pub(crate) fn follow_up_boss_started(&mut self) -> bool {
        if let EncounterPhase::AwaitingCompletion(Completion::Structure { follow_up }) =
            &mut self.phase
        {
            if let FollowUp::Pending(boss) = follow_up {
                *follow_up = FollowUp::BossActive(boss.clone());
                return true;
            }
        }
        false
    }

    /// The follow-up boss died; the structure pays out now.
    pub(crate) fn follow_up_boss_defeated(&mut self, env: &mut TickEnv<'_>) -> RewardOutcome {
        match &self.phase {
            EncounterPhase::AwaitingCompletion(Completion::Structure {
                follow_up: FollowUp::BossActive(_),
            }) => self.give_reward(env),
            _ => RewardOutcome::Ignored,
        }
    }

    /// The follow-up boss was despawned without dying. Approaching the
    /// structure again re-requests it.
    pub(crate) fn follow_up_boss_abandoned(&mut self) {
        if let EncounterPhase::AwaitingCompletion(Completion::Structure { follow_up }) =
            &mut self.phase
        {
            if let FollowUp::BossActive(boss) = follow_up {
                *follow_up = FollowUp::Pending(boss.clone());
            }
        }
    }

    /// Releases every actor this encounter placed, the reward pickup included.
    pub(crate) fn remove(&mut self, world: &mut SceneWorld) {
        self.guards.release(world);
        world.remove_actor(self.structure_id);
        for id in [self.courier_id.take(), self.reward_pickup_id.take()]
            .into_iter()
            .flatten()
        {
            world.remove_actor(id);
        }
        world.set_camera_zoom(CAMERA_ZOOM_DEFAULT);
        self.phase = EncounterPhase::Removed;
    }

    fn enter_awaiting_completion(&mut self, env: &mut TickEnv<'_>) {
        self.guards_defeated = true;
        let completion = match &self.template.completion {
            CompletionBehavior::SpawnNpc { npc_label } => {
                let courier = Courier::dispatch(env.world, npc_label, self.position);
                self.courier_id = Some(courier.id());
                Completion::Npc(courier)
            }
            CompletionBehavior::InteractWithStructure { follow_up_boss } => {
                Completion::Structure {
                    follow_up: follow_up_boss
                        .clone()
                        .map_or(FollowUp::None, FollowUp::Pending),
                }
            }
        };
        self.phase = EncounterPhase::AwaitingCompletion(completion);
        env.bus.emit(StoryEvent::GuardsCleared {
            template: self.template.def_name.clone(),
        });
        info!(
            template = %self.template.def_name,
            phase = self.phase.name(),
            "encounter_guards_cleared"
        );
    }
}
