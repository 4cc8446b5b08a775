use engine::{BossDef, EntityId, SceneWorld, Vec2};
use thiserror::Error;

use crate::app::config::SessionConfig;

use super::bus::StoryEventBus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ServiceError {
    #[error("{service} is unavailable")]
    Unavailable { service: &'static str },
}

/// Narrative text and reward banners. While a dialogue is displayed guard
/// and hostile movement is paused.
pub(crate) trait DialogueUi {
    fn show_dialogue(&mut self, title: &str, text: &str);
    fn show_reward(&mut self, text: &str);
    fn is_dialogue_active(&self) -> bool;
}

/// Health pools, bosses and upgrades live outside the event layer.
pub(crate) trait CombatModel {
    fn player_level(&self) -> u32;
    /// Every boss alive in the world, scripted or not.
    fn bosses_alive(&self) -> u32;
    fn request_boss(&mut self, boss: &BossDef, position: Vec2) -> Result<(), ServiceError>;
    fn damage_player(&mut self, amount: f32);
    fn grant_upgrade(&mut self, upgrade: &str);
    fn clear_main_world_hostiles(&mut self);
}

pub(crate) trait ShopEconomy {
    fn is_shop_active(&self) -> bool;
    fn open_shop(&mut self, visit: u32) -> Result<(), ServiceError>;
    fn close_shop_ui(&mut self);
}

pub(crate) struct Services {
    pub(crate) dialogue: Box<dyn DialogueUi>,
    pub(crate) combat: Box<dyn CombatModel>,
    pub(crate) shop: Box<dyn ShopEconomy>,
}

/// Everything a state machine may touch during one step.
pub(crate) struct TickEnv<'a> {
    pub(crate) world: &'a mut SceneWorld,
    pub(crate) services: &'a mut Services,
    pub(crate) config: &'a SessionConfig,
    pub(crate) bus: &'a mut StoryEventBus,
    pub(crate) player_id: Option<EntityId>,
    pub(crate) player_position: Vec2,
    pub(crate) paused: bool,
}
