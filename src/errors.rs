use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KioskError {
    #[error("no site was specified in {0}")]
    MissingSite(PathBuf),
    #[error("failed to read settings {path}: {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse settings {path}: {message}")]
    SettingsParse { path: PathBuf, message: String },
    #[error("unable to remove profile {path}: {source}")]
    ProfileReset {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("gave up after {0} consecutive launch failures")]
    LaunchRetriesExhausted(u32),
}

impl KioskError {
    /// Errors that must end supervision immediately rather than be retried on
    /// the next tick.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, KioskError::Spawn { .. })
    }
}
