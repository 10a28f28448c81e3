use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};

const CONFIG_FILE: &str = "proctordesk";
const ENV_PREFIX: &str = "PROCTORDESK";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub backend: BackendSettings,
    #[validate]
    pub proctoring: ProctoringSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "proctordesk_db".to_string(),
            user: "proctordesk_user".to_string(),
            password: String::new(),
        }
    }
}

impl DatabaseSettings {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// REST endpoint of the hosted backend. When `rest_url` is unset the
/// PostgreSQL connection is used instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub rest_url: Option<String>,
    pub api_key: Option<String>,
    pub face_service_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_snapshot_window"))]
pub struct ProctoringSettings {
    #[validate(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: f32,
    #[validate(range(min = 1))]
    pub snapshot_interval_min_secs: u64,
    #[validate(range(min = 1))]
    pub snapshot_interval_max_secs: u64,
    pub navigation_throttle_secs: u64,
    #[validate(range(min = 1))]
    pub liveness_probe_ms: u64,
    #[validate(range(min = 1))]
    pub camera_ready_timeout_ms: u64,
    #[validate(range(min = 1))]
    pub camera_poll_ms: u64,
    #[validate(range(min = 1, max = 1000))]
    pub frame_interval_ms: u64,
    pub preferred_width: u32,
    pub preferred_height: u32,
    #[validate(range(min = 1, max = 100))]
    pub snapshot_jpeg_quality: u8,
    /// Include captured stills in the persisted verification log.
    pub persist_snapshots: bool,
}

impl Default for ProctoringSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            snapshot_interval_min_secs: 20,
            snapshot_interval_max_secs: 30,
            navigation_throttle_secs: 15,
            liveness_probe_ms: 2000,
            camera_ready_timeout_ms: 5000,
            camera_poll_ms: 100,
            frame_interval_ms: 100,
            preferred_width: 640,
            preferred_height: 480,
            snapshot_jpeg_quality: 70,
            persist_snapshots: true,
        }
    }
}

impl ProctoringSettings {
    pub fn snapshot_window(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.snapshot_interval_min_secs),
            Duration::from_secs(self.snapshot_interval_max_secs),
        )
    }

    pub fn navigation_throttle(&self) -> Duration {
        Duration::from_secs(self.navigation_throttle_secs)
    }

    pub fn liveness_probe(&self) -> Duration {
        Duration::from_millis(self.liveness_probe_ms)
    }

    pub fn camera_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.camera_ready_timeout_ms)
    }

    pub fn camera_poll(&self) -> Duration {
        Duration::from_millis(self.camera_poll_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

fn validate_snapshot_window(settings: &ProctoringSettings) -> Result<(), ValidationError> {
    if settings.snapshot_interval_min_secs > settings.snapshot_interval_max_secs {
        return Err(ValidationError::new("snapshot_interval_min_exceeds_max"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: Option<PathBuf>,
}

impl StorageSettings {
    /// Explicit `data_dir`, else the platform app-data location.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }

        let base = std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("XDG_DATA_HOME").map(PathBuf::from))
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("share")))
            .unwrap_or_else(|| PathBuf::from("."));

        base.join("ProctorDesk")
    }
}

impl AppConfig {
    /// Defaults, then legacy `DB_*` variables, then `proctordesk.toml`, then
    /// `PROCTORDESK__SECTION__KEY` variables.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            info!("No .env file loaded ({}), using process environment", e);
        }

        let mut builder = Config::builder();
        for (var, key) in [
            ("DB_HOST", "database.host"),
            ("DB_NAME", "database.name"),
            ("DB_USER", "database.user"),
            ("DB_PASSWORD", "database.password"),
        ] {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_default(key, value)?;
            }
        }
        if let Ok(port) = std::env::var("DB_PORT") {
            match port.parse::<i64>() {
                Ok(port) => builder = builder.set_default("database.port", port)?,
                Err(_) => warn!("⚠️ Ignoring non-numeric DB_PORT: {}", port),
            }
        }

        let config: AppConfig = builder
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        info!(
            "Configuration loaded (database: {}@{}:{}/{}, rest backend: {})",
            config.database.user,
            config.database.host,
            config.database.port,
            config.database.name,
            config.backend.rest_url.is_some()
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.proctoring.similarity_threshold, 0.7);
        assert_eq!(config.proctoring.snapshot_window(), (Duration::from_secs(20), Duration::from_secs(30)));
        assert_eq!(config.proctoring.camera_ready_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_inverted_snapshot_window_is_rejected() {
        let settings = ProctoringSettings {
            snapshot_interval_min_secs: 40,
            snapshot_interval_max_secs: 30,
            ..ProctoringSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        let settings = ProctoringSettings {
            similarity_threshold: 1.5,
            ..ProctoringSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_explicit_data_dir_wins() {
        let storage = StorageSettings {
            data_dir: Some(PathBuf::from("/tmp/proctordesk-test")),
        };
        assert_eq!(storage.resolve_data_dir(), PathBuf::from("/tmp/proctordesk-test"));
    }
}
