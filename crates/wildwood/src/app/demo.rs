use std::cell::RefCell;
use std::rc::Rc;

use engine::{BossDef, DefDatabase, Scene, SceneCommand, SceneWorld, Vec2};
use tracing::info;

use super::config::SessionConfig;
use super::events::{CombatModel, DialogueUi, EventDirector, ServiceError, Services, ShopEconomy};

const DIALOGUE_TICKS: u32 = 90;
const BOSS_FIGHT_TICKS: u32 = 600;
const SHOP_BROWSE_TICKS: u32 = 240;
const PLAYER_SPEED: f32 = 0.2;
const PLAYER_MAX_HEALTH: f32 = 100.0;
const STRIKE_RANGE: f32 = 2.5;
const STRIKE_INTERVAL_TICKS: u64 = 20;
const STRIKE_DAMAGE: f32 = 40.0;
const ARRIVAL_RADIUS: f32 = 1.0;
const FREEPLAY_ENCOUNTERS_BEFORE_QUIT: u32 = 2;
const PLAYTHROUGHS: u32 = 2;

/// Stand-in for the combat, dialogue and shop hosts of the full game.
#[derive(Debug)]
struct HostState {
    player_level: u32,
    player_health: f32,
    downed: bool,
    upgrades: Vec<String>,
    dialogue_ticks_left: u32,
    boss: Option<(String, u32)>,
    shop_ticks_left: Option<u32>,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            player_level: 1,
            player_health: PLAYER_MAX_HEALTH,
            downed: false,
            upgrades: Vec::new(),
            dialogue_ticks_left: 0,
            boss: None,
            shop_ticks_left: None,
        }
    }
}

type SharedHost = Rc<RefCell<HostState>>;

struct LogDialogue(SharedHost);

impl DialogueUi for LogDialogue {
    fn show_dialogue(&mut self, title: &str, text: &str) {
        info!(title, text, "dialogue_shown");
        self.0.borrow_mut().dialogue_ticks_left = DIALOGUE_TICKS;
    }

    fn show_reward(&mut self, text: &str) {
        info!(text, "reward_banner_shown");
    }

    fn is_dialogue_active(&self) -> bool {
        self.0.borrow().dialogue_ticks_left > 0
    }
}

struct AutoCombat(SharedHost);

impl CombatModel for AutoCombat {
    fn player_level(&self) -> u32 {
        self.0.borrow().player_level
    }

    fn bosses_alive(&self) -> u32 {
        u32::from(self.0.borrow().boss.is_some())
    }

    fn request_boss(&mut self, boss: &BossDef, position: Vec2) -> Result<(), ServiceError> {
        let mut host = self.0.borrow_mut();
        if host.boss.is_some() {
            return Err(ServiceError::Unavailable {
                service: "boss spawner",
            });
        }
        info!(boss = %boss.label, x = position.x, y = position.y, "boss_fight_started");
        host.boss = Some((boss.def_name.clone(), BOSS_FIGHT_TICKS));
        Ok(())
    }

    fn damage_player(&mut self, amount: f32) {
        let mut host = self.0.borrow_mut();
        host.player_health -= amount;
        if host.player_health <= 0.0 {
            info!(player_level = host.player_level, "player_downed");
            host.player_health = PLAYER_MAX_HEALTH;
            host.downed = true;
        }
    }

    fn grant_upgrade(&mut self, upgrade: &str) {
        let mut host = self.0.borrow_mut();
        host.upgrades.push(upgrade.to_string());
        host.player_level += 1;
        info!(
            upgrade,
            player_level = host.player_level,
            upgrades = host.upgrades.len(),
            "upgrade_granted"
        );
    }

    fn clear_main_world_hostiles(&mut self) {
        info!("main_world_hostiles_cleared");
    }
}

struct AutoShop(SharedHost);

impl ShopEconomy for AutoShop {
    fn is_shop_active(&self) -> bool {
        self.0.borrow().shop_ticks_left.is_some()
    }

    fn open_shop(&mut self, visit: u32) -> Result<(), ServiceError> {
        info!(visit, "shop_ui_opened");
        self.0.borrow_mut().shop_ticks_left = Some(SHOP_BROWSE_TICKS);
        Ok(())
    }

    fn close_shop_ui(&mut self) {
        self.0.borrow_mut().shop_ticks_left = None;
    }
}

/// Headless host: walks the player toward whatever the story offers, cuts
/// down guards in reach and stands in for the boss fight and shop UI.
pub(crate) struct DemoScene {
    director: EventDirector,
    host: SharedHost,
    ticks: u64,
    playthroughs_done: u32,
}

impl DemoScene {
    pub(crate) fn new(defs: DefDatabase, config: SessionConfig) -> Self {
        let host = SharedHost::default();
        let services = Services {
            dialogue: Box::new(LogDialogue(Rc::clone(&host))),
            combat: Box::new(AutoCombat(Rc::clone(&host))),
            shop: Box::new(AutoShop(Rc::clone(&host))),
        };
        Self {
            director: EventDirector::new(defs, config, services),
            host,
            ticks: 0,
            playthroughs_done: 0,
        }
    }

    fn drive_host(&mut self, world: &mut SceneWorld) {
        let (boss_down, boss_fled, shop_closed) = {
            let mut host = self.host.borrow_mut();
            host.dialogue_ticks_left = host.dialogue_ticks_left.saturating_sub(1);

            let boss_down = match host.boss.as_mut() {
                Some((_, ticks_left)) => {
                    *ticks_left = ticks_left.saturating_sub(1);
                    *ticks_left == 0
                }
                None => false,
            };
            if boss_down {
                host.boss = None;
            }
            // A downed player loses the fight; the boss leaves without dying.
            let boss_fled = std::mem::take(&mut host.downed) && host.boss.take().is_some();

            let shop_closed = match host.shop_ticks_left.as_mut() {
                Some(ticks_left) => {
                    *ticks_left = ticks_left.saturating_sub(1);
                    *ticks_left == 0
                }
                None => false,
            };
            if shop_closed {
                host.shop_ticks_left = None;
            }
            (boss_down, boss_fled, shop_closed)
        };

        if boss_down {
            self.director.notify_boss_defeated(world);
        }
        if boss_fled {
            info!("demo_boss_fled");
            self.director.notify_boss_abandoned(world);
        }
        if shop_closed {
            if let Some(shop) = self.director.shop() {
                info!(visit = shop.visit(), "demo_shop_browsed");
            }
            self.director.notify_shop_closed(world);
        }
    }

    fn autopilot(&mut self, world: &mut SceneWorld) {
        let Some(player_id) = self.director.player_id() else {
            return;
        };
        let Some(player) = world.actor_position(player_id) else {
            return;
        };

        if self.ticks % STRIKE_INTERVAL_TICKS == 0 {
            self.strike_in_reach(world, player);
        }

        if let Some(target) = self.objective(world) {
            if target.distance(player) > ARRIVAL_RADIUS {
                world.move_actor(player_id, player.step_towards(target, PLAYER_SPEED));
            }
        }
    }

    /// Wounds go through the director; killing blows are resolved here and
    /// reported as deaths, the way the full combat host does it.
    fn strike_in_reach(&mut self, world: &mut SceneWorld, player: Vec2) {
        let arena_hostiles = self
            .director
            .arena()
            .roster()
            .map(|roster| roster.hostile_ids())
            .unwrap_or_default();
        for id in self.director.hostile_ids() {
            let in_reach = world
                .actor_position(id)
                .is_some_and(|position| position.distance(player) <= STRIKE_RANGE);
            if !in_reach {
                continue;
            }
            let killing_blow = self
                .director
                .hostile_health(id)
                .is_some_and(|health| health <= STRIKE_DAMAGE);
            if !killing_blow {
                self.director.apply_guard_damage(world, id, STRIKE_DAMAGE);
            } else if arena_hostiles.contains(&id) {
                self.director.notify_hostile_death(world, id);
            } else {
                self.director.notify_guard_death(world, id);
            }
        }
    }

    fn objective(&self, world: &SceneWorld) -> Option<Vec2> {
        let nearest_hostile = self
            .director
            .hostile_ids()
            .into_iter()
            .find_map(|id| world.actor_position(id));
        if nearest_hostile.is_some() {
            return nearest_hostile;
        }
        if let Some(portal) = self.director.arena().portal_position() {
            return Some(portal);
        }
        if let Some(encounter) = self.director.encounter() {
            if !encounter.reward_given() {
                return Some(encounter.position());
            }
        }
        self.director.shop().map(|shop| shop.position())
    }

    fn finished(&self) -> bool {
        self.director.story_complete()
            && self.director.is_idle()
            && self.director.freeplay_spawns() >= FREEPLAY_ENCOUNTERS_BEFORE_QUIT
    }
}

impl Scene for DemoScene {
    fn load(&mut self, world: &mut SceneWorld) {
        self.director.load(world);
    }

    fn update(&mut self, fixed_dt_seconds: f32, world: &mut SceneWorld) -> SceneCommand {
        self.ticks = self.ticks.saturating_add(1);
        self.drive_host(world);
        self.autopilot(world);
        self.director.update(fixed_dt_seconds, world);
        let counts = self.director.bus().last_tick_counts();
        if counts.get("script_advanced") > 0 {
            info!(
                cursor = self.director.cursor(),
                story_complete = self.director.story_complete(),
                "demo_story_progress"
            );
        }
        if self.finished() {
            self.playthroughs_done += 1;
            {
                let host = self.host.borrow();
                info!(
                    ticks = self.ticks,
                    playthrough = self.playthroughs_done,
                    player_level = host.player_level,
                    upgrades = ?host.upgrades,
                    "demo_story_finished"
                );
            }
            if self.playthroughs_done >= PLAYTHROUGHS {
                return SceneCommand::Quit;
            }
            self.director.request_reset(world);
        }
        SceneCommand::Continue
    }

    fn unload(&mut self, world: &mut SceneWorld) {
        self.director.unload(world);
    }

    fn debug_title(&self, world: &SceneWorld) -> Option<String> {
        self.director.debug_title(world)
    }
}

#[cfg(test)]
mod tests {
    use engine::{
        run_ticks, CompletionBehavior, EncounterDef, EncounterDefId, ScriptEntry,
    };

    use super::*;

    #[test]
    fn host_state_drives_gate_inputs() {
        let host = SharedHost::default();
        let mut combat = AutoCombat(Rc::clone(&host));
        let shop = AutoShop(Rc::clone(&host));
        assert_eq!(combat.bosses_alive(), 0);
        combat.grant_upgrade("magnet");
        assert_eq!(combat.player_level(), 2);
        assert!(!shop.is_shop_active());
        host.borrow_mut().shop_ticks_left = Some(3);
        assert!(shop.is_shop_active());

        combat.damage_player(PLAYER_MAX_HEALTH);
        assert!(host.borrow().downed);
        assert_eq!(host.borrow().player_health, PLAYER_MAX_HEALTH);
    }

    fn two_guard_camp() -> DefDatabase {
        let camp = EncounterDef {
            id: EncounterDefId(0),
            def_name: "camp".to_string(),
            label: "Camp".to_string(),
            scale: Vec2::new(6.0, 8.0),
            guard_kind: "goblin".to_string(),
            guard_count: 2,
            guard_health_mult: 2.0,
            camera_zoom: 2.2,
            reward: "campUpgrade".to_string(),
            reward_text: "camp cleared".to_string(),
            completion: CompletionBehavior::InteractWithStructure {
                follow_up_boss: None,
            },
            spawn_text: String::new(),
            completion_text: String::new(),
        };
        DefDatabase::new(
            vec![camp],
            Vec::new(),
            Vec::new(),
            None,
            vec![
                ScriptEntry::Encounter("camp".to_string()),
                ScriptEntry::StoryComplete,
            ],
        )
    }

    #[test]
    fn strikes_wound_then_report_the_killing_blow() {
        let mut scene = DemoScene::new(two_guard_camp(), SessionConfig::default());
        let mut world = SceneWorld::default();
        scene.load(&mut world);
        world.apply_pending();
        assert!(scene.director.spawn_next(&mut world));
        world.apply_pending();

        let guard = scene.director.encounter().expect("encounter").guard_ids()[0];
        let guard_position = world.actor_position(guard).expect("guard placed");
        let full_health = scene.director.hostile_health(guard).expect("health");
        assert!(full_health > STRIKE_DAMAGE);

        scene.strike_in_reach(&mut world, guard_position);
        world.apply_pending();
        let wounded = scene.director.hostile_health(guard).expect("still standing");
        assert!((wounded - (full_health - STRIKE_DAMAGE)).abs() < 1e-3);

        scene.strike_in_reach(&mut world, guard_position);
        world.apply_pending();
        assert_eq!(scene.director.hostile_health(guard), None);
        assert!(world.actor_position(guard).is_none());
        assert_eq!(
            scene.director.encounter().expect("encounter").guards_remaining(),
            1
        );
    }

    #[test]
    fn demo_scene_runs_headless_without_content() {
        let defs = DefDatabase::new(
            Vec::new(),
            Vec::new(),
            Vec::new(),
            None,
            vec![ScriptEntry::StoryComplete],
        );
        let mut scene = DemoScene::new(defs, SessionConfig::default());
        let mut world = SceneWorld::default();
        scene.load(&mut world);
        world.apply_pending();
        let ran = run_ticks(&mut scene, &mut world, 1.0 / 60.0, 30);
        assert_eq!(ran, 30);
        assert_eq!(world.entity_count(), 1);
    }
}
