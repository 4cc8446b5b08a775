use std::process::ExitCode;

use engine::run_app;
use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::demo::DemoScene;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring { config, session } = app;
    match run_app(config, move |defs| DemoScene::new(defs, session)) {
        Ok(report) => {
            info!(
                ticks_run = report.ticks_run,
                quit_requested = report.quit_requested,
                tps = report.final_metrics.tps,
                clamped_frames = report.final_metrics.clamped_frames,
                "demo_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}
