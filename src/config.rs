use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::logging::LogRotationPolicy;

/// Where the daemon keeps its own files. Independent of the kiosk settings,
/// which describe the managed application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_dir: PathBuf,
    pub settings_path: PathBuf,
    pub log_path: PathBuf,
    pub log_rotation: LogRotationPolicy,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let base_dir = env::var("KIOSK_HOME")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_local_dir()
                    .unwrap_or_else(env::temp_dir)
                    .join("kiosk-keeper")
            });
        let settings_path = env::var("KIOSK_SETTINGS")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| base_dir.join("settings.toml"));
        let log_path = base_dir.join("kiosk-keeper.log");
        let log_rotation = LogRotationPolicy {
            max_size_bytes: env_u64("KIOSK_LOG_MAX_SIZE_MB", 10)
                .max(1)
                .saturating_mul(1024 * 1024),
            max_files: env_u64("KIOSK_LOG_MAX_FILES", 5).max(1) as u32,
        };

        let config = Self {
            base_dir,
            settings_path,
            log_path,
            log_rotation,
        };
        config.ensure_layout()?;
        Ok(config)
    }

    /// Applies command line overrides on top of the environment.
    pub fn with_overrides(mut self, settings: Option<&Path>, log_file: Option<&Path>) -> Self {
        if let Some(path) = settings {
            self.settings_path = path.to_path_buf();
        }
        if let Some(path) = log_file {
            self.log_path = path.to_path_buf();
        }
        self
    }

    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("failed to create {}", self.base_dir.display()))?;
        Ok(())
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
