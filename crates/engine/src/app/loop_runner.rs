use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    build_def_database, resolve_app_paths, ContentPipelineError, ContentPlanRequest, DefDatabase,
    StartupError,
};

use super::metrics::MetricsAccumulator;
use super::{LoopMetricsSnapshot, Scene, SceneCommand, SceneWorld};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Stop after this many simulation ticks; `None` runs until the scene quits.
    pub max_ticks: Option<u64>,
    /// Pace ticks against the wall clock. When false every frame runs exactly one tick.
    pub realtime: bool,
    pub content_plan_request: ContentPlanRequest,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            max_ticks: None,
            realtime: true,
            content_plan_request: ContentPlanRequest::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to build content database: {0}")]
    ContentPipeline(#[from] ContentPipelineError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopReport {
    pub ticks_run: u64,
    pub quit_requested: bool,
    pub final_metrics: LoopMetricsSnapshot,
}

/// Factory invoked once the content database is available, so scenes can
/// resolve their templates before `load`.
pub fn run_app<S, F>(config: LoopConfig, build_scene: F) -> Result<LoopReport, AppError>
where
    S: Scene,
    F: FnOnce(DefDatabase) -> S,
{
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        base_content_dir = %app_paths.base_content_dir.display(),
        mods_dir = %app_paths.mods_dir.display(),
        "startup"
    );
    let def_database = build_def_database(&app_paths, &config.content_plan_request)?;
    let mut scene = build_scene(def_database);
    let mut world = SceneWorld::default();
    scene.load(&mut world);
    world.apply_pending();
    info!(entity_count = world.entity_count(), "scene_loaded");

    let report = run_loop(&config, &mut scene, &mut world);
    scene.unload(&mut world);
    world.apply_pending();
    info!(
        ticks_run = report.ticks_run,
        quit_requested = report.quit_requested,
        "shutdown"
    );
    Ok(report)
}

/// Drives `ticks` fixed steps with no pacing. Returns early if the scene quits.
pub fn run_ticks(
    scene: &mut dyn Scene,
    world: &mut SceneWorld,
    fixed_dt_seconds: f32,
    ticks: u64,
) -> u64 {
    let mut ran = 0u64;
    while ran < ticks {
        let command = scene.update(fixed_dt_seconds, world);
        world.apply_pending();
        world.tick_camera(fixed_dt_seconds);
        ran += 1;
        if command == SceneCommand::Quit {
            break;
        }
    }
    ran
}

fn run_loop(
    config: &LoopConfig,
    scene: &mut dyn Scene,
    world: &mut SceneWorld,
) -> LoopReport {
    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();

    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        max_ticks = ?config.max_ticks,
        realtime = config.realtime,
        "loop_config"
    );

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut quit_requested = false;

    'frames: loop {
        let now = Instant::now();
        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
        last_frame_instant = now;

        let ticks_to_run = if config.realtime {
            accumulator = accumulator.saturating_add(clamp_frame_delta(raw_frame_dt, max_frame_delta));
            let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
            accumulator = step_plan.remaining_accumulator;
            if step_plan.dropped_backlog > Duration::ZERO {
                metrics_accumulator.record_clamp();
                warn!(
                    dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                    max_ticks_per_frame, "sim_clamp_triggered"
                );
            }
            step_plan.ticks_to_run
        } else {
            1
        };

        for _ in 0..ticks_to_run {
            if reached_tick_limit(config.max_ticks, metrics_accumulator.total_ticks()) {
                break 'frames;
            }
            let command = scene.update(fixed_dt_seconds, world);
            world.apply_pending();
            world.tick_camera(fixed_dt_seconds);
            metrics_accumulator.record_tick();
            if command == SceneCommand::Quit {
                quit_requested = true;
                info!(reason = "scene_quit", "shutdown_requested");
                break 'frames;
            }
        }
        if reached_tick_limit(config.max_ticks, metrics_accumulator.total_ticks()) {
            break;
        }

        metrics_accumulator.record_frame(raw_frame_dt);
        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
            info!(
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                total_ticks = snapshot.total_ticks,
                clamped_frames = snapshot.clamped_frames,
                entity_count = world.entity_count(),
                title = scene.debug_title(world).unwrap_or_default(),
                "loop_metrics"
            );
        }

        if config.realtime {
            let elapsed = Instant::now().saturating_duration_since(now);
            if elapsed < fixed_dt {
                thread::sleep(fixed_dt - elapsed);
            }
        }
    }

    let final_metrics = metrics_accumulator.final_snapshot(Instant::now());
    LoopReport {
        ticks_run: final_metrics.total_ticks,
        quit_requested,
        final_metrics,
    }
}

fn reached_tick_limit(max_ticks: Option<u64>, ticks_run: u64) -> bool {
    max_ticks.is_some_and(|limit| ticks_run >= limit)
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActorKind, Vec2};

    struct CountingScene {
        updates: u64,
        quit_after: Option<u64>,
    }

    impl Scene for CountingScene {
        fn load(&mut self, world: &mut SceneWorld) {
            world.place_actor(ActorKind::Player, "player", Vec2::ZERO, Vec2::new(1.0, 1.0));
        }

        fn update(&mut self, _fixed_dt_seconds: f32, _world: &mut SceneWorld) -> SceneCommand {
            self.updates += 1;
            if self.quit_after.is_some_and(|limit| self.updates >= limit) {
                SceneCommand::Quit
            } else {
                SceneCommand::Continue
            }
        }

        fn unload(&mut self, world: &mut SceneWorld) {
            world.clear();
        }
    }

    fn fast_config(max_ticks: Option<u64>) -> LoopConfig {
        LoopConfig {
            max_ticks,
            realtime: false,
            ..LoopConfig::default()
        }
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(600), max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(48), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn run_loop_stops_at_tick_limit() {
        let mut scene = CountingScene {
            updates: 0,
            quit_after: None,
        };
        let mut world = SceneWorld::default();
        let report = run_loop(&fast_config(Some(25)), &mut scene, &mut world);
        assert_eq!(report.ticks_run, 25);
        assert_eq!(report.final_metrics.clamped_frames, 0);
        assert_eq!(scene.updates, 25);
        assert!(!report.quit_requested);
    }

    #[test]
    fn run_loop_honors_scene_quit() {
        let mut scene = CountingScene {
            updates: 0,
            quit_after: Some(7),
        };
        let mut world = SceneWorld::default();
        let report = run_loop(&fast_config(Some(100)), &mut scene, &mut world);
        assert!(report.quit_requested);
        assert_eq!(report.ticks_run, 7);
    }

    #[test]
    fn run_ticks_applies_pending_spawns() {
        let mut scene = CountingScene {
            updates: 0,
            quit_after: None,
        };
        let mut world = SceneWorld::default();
        scene.load(&mut world);
        assert_eq!(run_ticks(&mut scene, &mut world, 1.0 / 60.0, 3), 3);
        assert_eq!(world.entity_count(), 1);
    }
}
