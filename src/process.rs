use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::errors::KioskError;

const STRAY_GRACE_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Running,
    /// Exit code, `None` when the process was ended by a signal.
    Exited(Option<i32>),
}

impl ExitState {
    pub fn has_exited(&self) -> bool {
        matches!(self, ExitState::Exited(_))
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitState::Running => write!(f, "running"),
            ExitState::Exited(Some(code)) => write!(f, "exited({code})"),
            ExitState::Exited(None) => write!(f, "exited(signal)"),
        }
    }
}

/// One launched instance of the managed application.
pub trait ProcessHandle {
    fn pid(&self) -> u32;

    /// Arguments the instance was launched with.
    fn args(&self) -> &[String];

    /// Non-blocking liveness check. Never cached by the caller.
    fn poll(&mut self) -> ExitState;

    /// Asks the process to exit without waiting for it.
    fn terminate(&mut self) -> Result<()>;

    /// Blocks until the OS reports the process gone.
    async fn wait(&mut self) -> Result<ExitState>;
}

/// Starts the managed application and clears leftovers from earlier runs.
pub trait Launcher {
    type Handle: ProcessHandle;

    async fn start(
        &mut self,
        args: &[String],
        reset_profile: bool,
    ) -> Result<Self::Handle, KioskError>;

    /// Stops instances that were running before supervision began.
    async fn kill_strays(&mut self, pids: &[u32]) -> Result<()>;
}

pub struct ChildHandle {
    child: Child,
    pid: u32,
    args: Vec<String>,
}

impl ProcessHandle for ChildHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn args(&self) -> &[String] {
        &self.args
    }

    fn poll(&mut self) -> ExitState {
        match self.child.try_wait() {
            Ok(Some(status)) => ExitState::Exited(status.code()),
            Ok(None) => ExitState::Running,
            Err(err) => {
                // Reporting it as exited would relaunch next to a live instance.
                warn!("failed to poll pid {}: {err}", self.pid);
                ExitState::Running
            }
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> Result<()> {
        // `id()` is cleared once the child is reaped; its pid may belong to
        // someone else by now.
        match self.child.id() {
            Some(pid) => signal_group(pid, nix::sys::signal::Signal::SIGTERM),
            None => {
                debug!("pid {} already reaped; nothing to terminate", self.pid);
                Ok(())
            }
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> Result<()> {
        self.child
            .start_kill()
            .with_context(|| format!("failed to terminate pid {}", self.pid))
    }

    async fn wait(&mut self) -> Result<ExitState> {
        let status = self
            .child
            .wait()
            .await
            .with_context(|| format!("failed to wait for pid {}", self.pid))?;
        Ok(ExitState::Exited(status.code()))
    }
}

/// Launches the configured binary with its output discarded.
pub struct AppLauncher {
    program: PathBuf,
    profile_dir: Option<PathBuf>,
    stray_grace: Duration,
}

impl AppLauncher {
    pub fn new(program: PathBuf, profile_dir: Option<PathBuf>) -> Self {
        Self {
            program,
            profile_dir,
            stray_grace: STRAY_GRACE_PERIOD,
        }
    }

    fn spawn(&self, args: &[String]) -> Result<ChildHandle, KioskError> {
        debug!("> {} {}", self.program.display(), args.join(" "));

        let mut command = Command::new(&self.program);
        #[cfg(unix)]
        {
            // Own process group so terminate reaches helper processes too.
            unsafe {
                command.pre_exec(|| {
                    if nix::libc::setpgid(0, 0) == 0 {
                        Ok(())
                    } else {
                        Err(io::Error::last_os_error())
                    }
                });
            }
        }
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let spawn_error = |source: io::Error| KioskError::Spawn {
            program: self.program.clone(),
            source,
        };
        let child = command.spawn().map_err(spawn_error)?;
        let pid = child
            .id()
            .ok_or_else(|| spawn_error(io::Error::other("spawned child has no pid")))?;
        debug!("managed PID: {pid}");

        Ok(ChildHandle {
            child,
            pid,
            args: args.to_vec(),
        })
    }
}

impl Launcher for AppLauncher {
    type Handle = ChildHandle;

    async fn start(
        &mut self,
        args: &[String],
        reset_profile: bool,
    ) -> Result<ChildHandle, KioskError> {
        if reset_profile {
            match self.profile_dir.as_deref() {
                Some(dir) => remove_profile(dir)?,
                None => warn!("profile reset requested but no profile directory is known"),
            }
        }
        self.spawn(args)
    }

    async fn kill_strays(&mut self, pids: &[u32]) -> Result<()> {
        if pids.is_empty() {
            return Ok(());
        }
        for pid in pids {
            terminate_pid(*pid)?;
        }

        let start = Instant::now();
        while start.elapsed() < self.stray_grace {
            if !pids.iter().any(|pid| process_exists(*pid)) {
                return Ok(());
            }
            sleep(Duration::from_millis(200)).await;
        }

        for pid in pids.iter().filter(|pid| process_exists(**pid)) {
            warn!("pid {pid} ignored SIGTERM; killing");
            force_kill_pid(*pid);
        }
        Ok(())
    }
}

/// Deletes the application's profile directory. A missing directory is fine;
/// anything else is returned to the caller.
pub fn remove_profile(path: &Path) -> Result<(), KioskError> {
    debug!("removing user profile: {}", path.display());
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("profile already absent: {}", path.display());
            Ok(())
        }
        Err(source) => {
            error!("unable to remove: {}: {source}", path.display());
            Err(KioskError::ProfileReset {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(-(pid as i32)), signal) {
        Ok(()) => return Ok(()),
        Err(Errno::ESRCH) => {}
        Err(err) => warn!("failed to send {signal:?} to process group {pid}: {err}"),
    }
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(anyhow::anyhow!("failed to send {signal:?} to {pid}: {err}")),
    }
}

#[cfg(unix)]
fn terminate_pid(pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    debug!("sending SIGTERM to stray pid {pid}");
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(anyhow::anyhow!("failed to send SIGTERM to {pid}: {err}")),
    }
}

#[cfg(unix)]
fn force_kill_pid(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None::<Signal>) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn terminate_pid(pid: u32) -> Result<()> {
    force_kill_pid(pid);
    Ok(())
}

#[cfg(not(unix))]
fn force_kill_pid(pid: u32) {
    use sysinfo::{Pid as SysPid, ProcessesToUpdate, System};

    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[SysPid::from_u32(pid)]), true);
    if let Some(process) = system.process(SysPid::from_u32(pid)) {
        process.kill();
    }
}

#[cfg(not(unix))]
fn process_exists(pid: u32) -> bool {
    use sysinfo::{Pid as SysPid, ProcessesToUpdate, System};

    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[SysPid::from_u32(pid)]), true);
    system.process(SysPid::from_u32(pid)).is_some()
}
