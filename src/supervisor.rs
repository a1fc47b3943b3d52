use std::time::Duration;

use anyhow::Result;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::errors::KioskError;
use crate::probes::EnvironmentProbes;
use crate::process::{Launcher, ProcessHandle};
use crate::settings::KioskSettings;
use crate::signals::ShutdownFlag;
use crate::timer::RestartTimer;

/// Poll interval while the screen is inactive, so the kiosk comes back quickly
/// once it wakes.
pub const SUPPRESSED_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub app_name: String,
    pub args: Vec<String>,
    pub reset_profile: bool,
    pub tick_interval: Duration,
    pub restart_interval: Option<Duration>,
    pub launch_retries: u32,
}

impl SupervisorOptions {
    pub fn from_settings(settings: &KioskSettings) -> Self {
        Self {
            app_name: settings.app_name.clone(),
            args: settings.launch_args(),
            reset_profile: settings.remove_profile,
            tick_interval: settings.tick_interval(),
            restart_interval: settings.restart_interval(),
            launch_retries: settings.launch_retries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaunchCause {
    Exited,
    Backgrounded,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Alive and frontmost; nothing to do.
    Steady,
    /// Screensaver or display sleep. `stopped` is true on the tick that
    /// terminated the running instance.
    Suppressed { stopped: bool },
    /// The restart timer stopped the instance; the next tick follows at once
    /// and relaunches it.
    ScheduledStop,
    Relaunched(RelaunchCause),
    /// Spawning a replacement failed; retried on the next tick.
    LaunchFailed,
    /// A stop request arrived mid-tick so no replacement was launched.
    Stopping,
}

impl TickOutcome {
    pub fn pause(&self, tick_interval: Duration) -> Duration {
        match self {
            TickOutcome::Suppressed { .. } => SUPPRESSED_POLL_INTERVAL,
            TickOutcome::ScheduledStop | TickOutcome::Stopping => Duration::ZERO,
            _ => tick_interval,
        }
    }
}

/// Keeps exactly one instance of the managed application alive, frontmost and
/// periodically refreshed.
///
/// Each [`tick`](Supervisor::tick) samples the environment and applies the
/// first matching rule, in priority order:
///
/// 1. screensaver or display sleep: stop the instance and poll quickly;
/// 2. restart timer fired: re-arm it and stop the instance, relaunching on an
///    immediate follow-up tick;
/// 3. instance lost the foreground: stop it;
/// 4. instance not running: relaunch it.
pub struct Supervisor<P, L: Launcher> {
    probes: P,
    launcher: L,
    options: SupervisorOptions,
    shutdown: ShutdownFlag,
    process: Option<L::Handle>,
    restart_timer: RestartTimer,
    launch_failures: u32,
}

impl<P, L> Supervisor<P, L>
where
    P: EnvironmentProbes,
    L: Launcher,
{
    pub fn new(
        probes: P,
        launcher: L,
        options: SupervisorOptions,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            probes,
            launcher,
            options,
            shutdown,
            process: None,
            restart_timer: RestartTimer::disabled(),
            launch_failures: 0,
        }
    }

    pub fn current_pid(&self) -> Option<u32> {
        self.process.as_ref().map(|process| process.pid())
    }

    /// Starts supervision and returns once a stop request has been observed.
    /// The managed instance is always signalled on the way out.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;
        let result = self.supervise().await;
        self.release();
        result
    }

    /// Clears out instances left over from an earlier run and launches a
    /// fresh one. Any failure here is fatal.
    pub async fn start(&mut self) -> Result<()> {
        let app_name = self.options.app_name.clone();
        let strays = self.probes.find_pids(&app_name).await;
        if !strays.is_empty() {
            debug!("{app_name} was already running... killing...");
            self.launcher.kill_strays(&strays).await?;
        }

        info!("starting {app_name}");
        let handle = self
            .launcher
            .start(&self.options.args, self.options.reset_profile)
            .await?;
        self.process = Some(handle);
        debug!("supervising pid {:?}", self.current_pid());
        self.arm_restart_timer(Instant::now());
        Ok(())
    }

    async fn supervise(&mut self) -> Result<()> {
        while !self.shutdown.is_set() {
            let outcome = self.tick().await?;
            sleep(outcome.pause(self.options.tick_interval)).await;
        }
        debug!("stop requested; leaving supervision loop");
        Ok(())
    }

    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let mut running = self.is_running();

        if self.probes.is_screensaver_active().await || self.probes.is_display_asleep().await {
            if running {
                debug!("closing {} while display inactive", self.options.app_name);
                self.stop_current().await?;
            }
            return Ok(TickOutcome::Suppressed { stopped: running });
        }

        let mut cause = RelaunchCause::Exited;
        let now = Instant::now();
        if self.restart_timer.fired(now) {
            debug!(
                "restarting after {} seconds",
                self.options.restart_interval.unwrap_or_default().as_secs()
            );
            // Re-armed before stopping so a slow shutdown cannot fire it twice.
            self.arm_restart_timer(now);
            if running {
                self.stop_current().await?;
                return Ok(TickOutcome::ScheduledStop);
            }
            debug!(
                "{} wasn't running when the restart timer fired",
                self.options.app_name
            );
        } else if running
            && !self.shutdown.is_set()
            && !self.probes.is_frontmost(&self.options.app_name).await
        {
            debug!("{} isn't active", self.options.app_name);
            self.stop_current().await?;
            running = false;
            cause = RelaunchCause::Backgrounded;
        }

        if running {
            return Ok(TickOutcome::Steady);
        }
        if self.shutdown.is_set() {
            debug!("stop requested; not relaunching {}", self.options.app_name);
            return Ok(TickOutcome::Stopping);
        }
        self.relaunch(cause).await
    }

    fn is_running(&mut self) -> bool {
        self.process
            .as_mut()
            .is_some_and(|process| !process.poll().has_exited())
    }

    async fn stop_current(&mut self) -> Result<()> {
        let Some(process) = self.process.as_mut() else {
            return Ok(());
        };
        process.terminate()?;
        let state = process.wait().await?;
        debug!("pid {} stopped: {state}", process.pid());
        Ok(())
    }

    async fn relaunch(&mut self, cause: RelaunchCause) -> Result<TickOutcome> {
        let app_name = &self.options.app_name;
        error!("{app_name} isn't running");
        if let Some(process) = self.process.as_mut() {
            let pid = process.pid();
            let poll = process.poll();
            debug!("dead {app_name}: {pid} poll: {poll}");
        }

        match self
            .launcher
            .start(&self.options.args, self.options.reset_profile)
            .await
        {
            Ok(handle) => {
                debug!(
                    "relaunched {app_name} as pid {} with {}",
                    handle.pid(),
                    handle.args().join(" ")
                );
                self.process = Some(handle);
                self.launch_failures = 0;
                Ok(TickOutcome::Relaunched(cause))
            }
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                self.process = None;
                self.launch_failures += 1;
                error!(
                    "failed to relaunch {app_name} ({}/{}): {err}",
                    self.launch_failures, self.options.launch_retries
                );
                if self.launch_failures >= self.options.launch_retries {
                    return Err(KioskError::LaunchRetriesExhausted(self.launch_failures).into());
                }
                Ok(TickOutcome::LaunchFailed)
            }
        }
    }

    fn arm_restart_timer(&mut self, now: Instant) {
        self.restart_timer = RestartTimer::arm(now, self.options.restart_interval);
        if let Some(deadline) = self.restart_timer.deadline() {
            debug!(
                "restart timer set: {}s from now",
                deadline.duration_since(now).as_secs()
            );
        }
    }

    fn release(&mut self) {
        if let Some(process) = self.process.as_mut() {
            let pid = process.pid();
            if let Err(err) = process.terminate() {
                warn!("failed to terminate pid {pid} on exit: {err:#}");
            }
        }
        info!("{} supervision finished", self.options.app_name);
    }
}
