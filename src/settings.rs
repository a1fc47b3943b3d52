use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::errors::KioskError;
use crate::timer::restart_interval;

pub const DEFAULT_APP_NAME: &str = "Google Chrome";
pub const DEFAULT_LOCATION: &str = "/Applications/Google Chrome.app";
const DEFAULT_WAIT_SECS: u64 = 5;
const DEFAULT_RESTART_SECS: i64 = -1;
const DEFAULT_LAUNCH_RETRIES: u32 = 3;

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    site: Option<String>,
    #[serde(default)]
    switches: Vec<String>,
    #[serde(rename = "isDisplay", default)]
    is_display: bool,
    location: Option<PathBuf>,
    wait: Option<u64>,
    restart: Option<i64>,
    #[serde(rename = "remove-profile")]
    remove_profile: Option<bool>,
    #[serde(rename = "app-name")]
    app_name: Option<String>,
    #[serde(rename = "profile-dir")]
    profile_dir: Option<PathBuf>,
    #[serde(rename = "launch-retries")]
    launch_retries: Option<u32>,
}

/// Kiosk settings with every default resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct KioskSettings {
    pub site: String,
    pub switches: Vec<String>,
    pub is_display: bool,
    pub location: PathBuf,
    pub wait_secs: u64,
    pub restart_secs: i64,
    pub remove_profile: bool,
    pub app_name: String,
    pub profile_dir: Option<PathBuf>,
    pub launch_retries: u32,
}

impl KioskSettings {
    pub fn load(path: &Path) -> Result<Self, KioskError> {
        debug!("getting settings from: {}", path.display());
        let payload = fs::read_to_string(path).map_err(|source| KioskError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &payload)
    }

    /// Parses `payload` as JSON when `path` has a `.json` extension and as TOML
    /// otherwise.
    pub fn parse(path: &Path, payload: &str) -> Result<Self, KioskError> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let raw: RawSettings = if is_json {
            serde_json::from_str(payload).map_err(|err| KioskError::SettingsParse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?
        } else {
            toml::from_str(payload).map_err(|err| KioskError::SettingsParse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?
        };

        Self::resolve(path, raw)
    }

    fn resolve(path: &Path, raw: RawSettings) -> Result<Self, KioskError> {
        let site = raw
            .site
            .filter(|site| !site.trim().is_empty())
            .ok_or_else(|| KioskError::MissingSite(path.to_path_buf()))?;

        let settings = Self {
            site,
            switches: raw.switches,
            is_display: raw.is_display,
            location: raw
                .location
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCATION)),
            wait_secs: raw.wait.unwrap_or(DEFAULT_WAIT_SECS).max(1),
            restart_secs: raw.restart.unwrap_or(DEFAULT_RESTART_SECS),
            remove_profile: raw.remove_profile.unwrap_or(true),
            app_name: raw
                .app_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            profile_dir: raw.profile_dir.or_else(default_profile_dir),
            launch_retries: raw.launch_retries.unwrap_or(DEFAULT_LAUNCH_RETRIES).max(1),
        };

        debug!("site: {}", settings.site);
        debug!("location: {}", settings.location.display());
        debug!("wait: {}", settings.wait_secs);
        debug!("restart seconds: {}", settings.restart_secs);
        debug!("remove profile: {}", settings.remove_profile);
        Ok(settings)
    }

    /// Extra switches first, then kiosk mode, then the target itself.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = self.switches.clone();
        args.push("--kiosk".to_string());
        if self.is_display {
            args.push(format!("--app={}", self.site));
        } else {
            args.push(self.site.clone());
        }
        args
    }

    /// `location` is either an application bundle or the binary itself.
    pub fn binary_path(&self) -> PathBuf {
        let is_bundle = self
            .location
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("app"));
        if is_bundle {
            self.location
                .join("Contents")
                .join("MacOS")
                .join(&self.app_name)
        } else {
            self.location.clone()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    pub fn restart_interval(&self) -> Option<Duration> {
        restart_interval(self.restart_secs)
    }
}

fn default_profile_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join("Library")
            .join("Application Support")
            .join("Google")
    })
}
