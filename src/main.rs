mod cli;
mod config;
mod errors;
mod logging;
mod probes;
mod process;
mod settings;
mod signals;
mod supervisor;
mod timer;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use crate::cli::Cli;
use crate::config::AppConfig;
use crate::probes::SystemProbes;
use crate::process::AppLauncher;
use crate::settings::KioskSettings;
use crate::signals::{ShutdownFlag, SignalTrap};
use crate::supervisor::{Supervisor, SupervisorOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config =
        AppConfig::load()?.with_overrides(cli.settings.as_deref(), cli.log_file.as_deref());

    if cli.check {
        return check_settings(&config);
    }

    logging::init_tracing(&config.log_path, config.log_rotation, cli.debug, cli.verbose)?;
    debug!("kiosk-keeper started");

    if let Err(err) = run(&config).await {
        error!("{err:#}");
        return Err(err);
    }
    debug!("kiosk-keeper finished");
    Ok(())
}

async fn run(config: &AppConfig) -> Result<()> {
    let settings = KioskSettings::load(&config.settings_path)?;
    let shutdown = ShutdownFlag::new();
    let _trap = SignalTrap::install(shutdown.clone())?;

    let launcher = AppLauncher::new(settings.binary_path(), settings.profile_dir.clone());
    let mut supervisor = Supervisor::new(
        SystemProbes::new(),
        launcher,
        SupervisorOptions::from_settings(&settings),
        shutdown,
    );
    supervisor.run().await
}

fn check_settings(config: &AppConfig) -> Result<()> {
    let settings = KioskSettings::load(&config.settings_path)?;
    println!("settings: {}", config.settings_path.display());
    println!("binary:   {}", settings.binary_path().display());
    println!("args:     {}", settings.launch_args().join(" "));
    println!("wait:     {}s", settings.wait_secs);
    match settings.restart_interval() {
        Some(interval) => println!("restart:  every {}s", interval.as_secs()),
        None => println!("restart:  never"),
    }
    match (settings.remove_profile, settings.profile_dir.as_ref()) {
        (true, Some(dir)) => println!("profile:  reset {}", dir.display()),
        (true, None) => println!("profile:  reset requested, no profile directory known"),
        (false, _) => println!("profile:  kept"),
    }
    Ok(())
}
