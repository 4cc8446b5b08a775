use engine::{resolve_app_paths, ContentPlanRequest, LoopConfig, StartupError};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::config::{load_session_config, ConfigError, SessionConfig};

const ENABLED_MODS_ENV_VAR: &str = "WILDWOOD_ENABLED_MODS";
const MAX_TICKS_ENV_VAR: &str = "WILDWOOD_MAX_TICKS";

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{var} must be a positive integer, got '{value}'")]
    MaxTicks { var: &'static str, value: String },
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) session: SessionConfig,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Wildwood Startup ===");

    let app_paths = resolve_app_paths()?;
    let session = load_session_config(&app_paths.base_content_dir)?;
    let max_ticks = parse_max_ticks(std::env::var(MAX_TICKS_ENV_VAR).ok())?;
    let enabled_mods = std::env::var(ENABLED_MODS_ENV_VAR)
        .ok()
        .map(|raw| parse_enabled_mods(&raw))
        .unwrap_or_default();
    info!(
        enabled_mods = ?enabled_mods,
        max_ticks = ?max_ticks,
        "bootstrap_configured"
    );

    // A bounded run is a headless smoke test; skip wall-clock pacing.
    let config = LoopConfig {
        max_ticks,
        realtime: max_ticks.is_none(),
        content_plan_request: ContentPlanRequest { enabled_mods },
        ..LoopConfig::default()
    };

    Ok(AppWiring { config, session })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_enabled_mods(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_max_ticks(raw: Option<String>) -> Result<Option<u64>, BootstrapError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(BootstrapError::MaxTicks {
            var: MAX_TICKS_ENV_VAR,
            value: raw,
        }),
    }
}
