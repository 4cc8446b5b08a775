mod loop_runner;
mod metrics;
mod scene;

pub use loop_runner::{run_app, run_ticks, AppError, LoopConfig, LoopReport};
pub use metrics::LoopMetricsSnapshot;
pub use scene::{
    ActorKind, Camera2D, Entity, EntityId, EntityIdAllocator, Scene, SceneCommand, SceneWorld,
    Vec2, CAMERA_ZOOM_DEFAULT, CAMERA_ZOOM_MAX, CAMERA_ZOOM_MIN,
};
