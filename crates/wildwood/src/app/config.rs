use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub(crate) const SESSION_CONFIG_FILE: &str = "session.json";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read session config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse session config {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid session config value {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Tunables for one playthrough. Distances are world units, durations are
/// simulation ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SessionConfig {
    pub(crate) seed: u64,
    pub(crate) min_player_level: u32,
    pub(crate) player_spawn: [f32; 2],
    pub(crate) spawn_check_interval_ticks: u32,
    pub(crate) spawn_distance: f32,
    pub(crate) abandon_distance: f32,
    pub(crate) encounter_teardown_ticks: u32,
    /// Distance sweep for rewarded encounters. `None` leaves removal to the
    /// teardown countdown alone.
    pub(crate) encounter_sweep_distance: Option<f32>,
    pub(crate) structure_interact_radius: f32,
    pub(crate) npc_speed: f32,
    pub(crate) npc_contact_radius: f32,
    pub(crate) guard_ring_radius: f32,
    pub(crate) guard_speed: f32,
    pub(crate) guard_attack_range: f32,
    pub(crate) guard_attack_cooldown_ticks: u32,
    pub(crate) guard_base_health: f32,
    pub(crate) guard_base_damage: f32,
    pub(crate) shop_cleanup_ticks: u32,
    pub(crate) shop_sweep_distance: f32,
    pub(crate) portal_trigger_radius: f32,
    pub(crate) arena_origin: [f32; 2],
    pub(crate) arena_spawn_radius: f32,
    pub(crate) arena_exit_ticks: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed_3001,
            min_player_level: 1,
            player_spawn: [0.0, 0.0],
            spawn_check_interval_ticks: 300,
            spawn_distance: 25.0,
            abandon_distance: 120.0,
            encounter_teardown_ticks: 180,
            encounter_sweep_distance: None,
            structure_interact_radius: 4.0,
            npc_speed: 0.05,
            npc_contact_radius: 2.5,
            guard_ring_radius: 5.0,
            guard_speed: 0.04,
            guard_attack_range: 1.5,
            guard_attack_cooldown_ticks: 60,
            guard_base_health: 30.0,
            guard_base_damage: 4.0,
            shop_cleanup_ticks: 1800,
            shop_sweep_distance: 80.0,
            portal_trigger_radius: 2.0,
            arena_origin: [1000.0, 1000.0],
            arena_spawn_radius: 8.0,
            arena_exit_ticks: 120,
        }
    }
}

impl SessionConfig {
    pub(crate) fn player_spawn(&self) -> Vec2 {
        Vec2::new(self.player_spawn[0], self.player_spawn[1])
    }

    pub(crate) fn arena_origin(&self) -> Vec2 {
        Vec2::new(self.arena_origin[0], self.arena_origin[1])
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.spawn_check_interval_ticks == 0 {
            return Err(invalid("spawn_check_interval_ticks", "must be at least 1"));
        }
        let distances = [
            ("spawn_distance", self.spawn_distance),
            ("abandon_distance", self.abandon_distance),
            ("structure_interact_radius", self.structure_interact_radius),
            ("npc_speed", self.npc_speed),
            ("npc_contact_radius", self.npc_contact_radius),
            ("guard_speed", self.guard_speed),
            ("guard_attack_range", self.guard_attack_range),
            ("guard_base_health", self.guard_base_health),
            ("shop_sweep_distance", self.shop_sweep_distance),
            ("portal_trigger_radius", self.portal_trigger_radius),
        ];
        for (field, value) in distances {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(field, "must be finite and > 0"));
            }
        }
        let non_negative = [
            ("guard_ring_radius", self.guard_ring_radius),
            ("guard_base_damage", self.guard_base_damage),
            ("arena_spawn_radius", self.arena_spawn_radius),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, "must be finite and >= 0"));
            }
        }
        if let Some(sweep) = self.encounter_sweep_distance {
            if !sweep.is_finite() || sweep <= 0.0 {
                return Err(invalid(
                    "encounter_sweep_distance",
                    "must be finite and > 0 when set",
                ));
            }
        }
        if self.abandon_distance <= self.spawn_distance {
            return Err(invalid(
                "abandon_distance",
                "must exceed spawn_distance or every spawn is abandoned at once",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.to_string(),
    }
}

/// Reads `session.json` from the base content directory. A missing file
/// yields the defaults.
pub(crate) fn load_session_config(base_content_dir: &Path) -> Result<SessionConfig, ConfigError> {
    let path = base_content_dir.join(SESSION_CONFIG_FILE);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "session_config_defaulted");
            return Ok(SessionConfig::default());
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    let config = parse_session_config(&raw, &path)?;
    info!(
        path = %path.display(),
        seed = config.seed,
        min_player_level = config.min_player_level,
        "session_config_loaded"
    );
    Ok(config)
}

pub(crate) fn parse_session_config(raw: &str, path: &Path) -> Result<SessionConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let config = match serde_path_to_error::deserialize::<_, SessionConfig>(&mut deserializer) {
        Ok(config) => config,
        Err(error) => {
            let json_path = error.path().to_string();
            let source = error.into_inner();
            let message = if json_path.is_empty() || json_path == "." {
                source.to_string()
            } else {
                format!("at {json_path}: {source}")
            };
            return Err(ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            });
        }
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<SessionConfig, ConfigError> {
        parse_session_config(raw, Path::new("session.json"))
    }

    #[test]
    fn empty_object_uses_defaults() {
        let config = parse("{}").expect("parse");
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = parse(r#"{ "seed": 7, "encounter_teardown_ticks": 12 }"#).expect("parse");
        assert_eq!(config.seed, 7);
        assert_eq!(config.encounter_teardown_ticks, 12);
        assert_eq!(config.shop_cleanup_ticks, 1800);
    }

    #[test]
    fn unknown_field_is_rejected_with_path() {
        let err = parse(r#"{ "seed": 1, "boss_gold": 9 }"#).expect_err("unknown");
        let text = err.to_string();
        assert!(text.contains("boss_gold"), "{text}");
    }

    #[test]
    fn type_error_names_json_path() {
        let err = parse(r#"{ "arena_origin": [1.0, "x"] }"#).expect_err("type");
        let text = err.to_string();
        assert!(text.contains("arena_origin"), "{text}");
    }

    #[test]
    fn zero_spawn_interval_is_invalid() {
        let err = parse(r#"{ "spawn_check_interval_ticks": 0 }"#).expect_err("invalid");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "spawn_check_interval_ticks",
                ..
            }
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::TempDir::new().expect("temp");
        let config = load_session_config(temp.path()).expect("load");
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn file_on_disk_is_parsed() {
        let temp = tempfile::TempDir::new().expect("temp");
        fs::write(
            temp.path().join(SESSION_CONFIG_FILE),
            r#"{ "min_player_level": 4, "encounter_sweep_distance": 40.0 }"#,
        )
        .expect("write");
        let config = load_session_config(temp.path()).expect("load");
        assert_eq!(config.min_player_level, 4);
        assert_eq!(config.encounter_sweep_distance, Some(40.0));
    }
}
