use std::path::PathBuf;

use clap::Parser;

const BUILD_VERSION: &str = env!("KIOSK_BUILD_VERSION");
const HELP_AFTER: &str = "\
Environment
  KIOSK_HOME             directory for the daemon log and default settings
  KIOSK_SETTINGS         settings file (TOML, or JSON with a .json extension)
  KIOSK_LOG_MAX_SIZE_MB  rotate the daemon log above this size (default 10)
  KIOSK_LOG_MAX_FILES    rotated logs to keep (default 5)
  RUST_LOG               tracing filter, overrides --debug

Examples
  kiosk-keeper --settings /Library/Management/kiosk.toml
  kiosk-keeper --check --settings kiosk.json
  kiosk-keeper --debug --verbose
";

#[derive(Debug, Parser)]
#[command(
    name = "kiosk-keeper",
    version = BUILD_VERSION,
    about = "Keeps a kiosk application running, frontmost and refreshed",
    after_help = HELP_AFTER
)]
pub struct Cli {
    /// Settings file; defaults to KIOSK_SETTINGS or <KIOSK_HOME>/settings.toml.
    #[arg(long)]
    pub settings: Option<PathBuf>,
    /// Daemon log file; defaults to <KIOSK_HOME>/kiosk-keeper.log.
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
    /// Also log to stderr.
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
    /// Validate the settings, print the launch command and exit.
    #[arg(long, default_value_t = false)]
    pub check: bool,
}
