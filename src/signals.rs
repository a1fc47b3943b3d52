use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::debug;

/// Set once a stop request arrives and never cleared. Clones share the same
/// underlying flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    stopped: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Routes SIGINT, SIGQUIT, SIGTERM and SIGTSTP into a [`ShutdownFlag`] so the
/// supervisor can finish its tick and stop the managed process itself.
pub struct SignalTrap;

impl SignalTrap {
    #[cfg(unix)]
    pub fn install(flag: ShutdownFlag) -> Result<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt()).context("failed to trap SIGINT")?;
        let mut quit = signal(SignalKind::quit()).context("failed to trap SIGQUIT")?;
        let mut terminate = signal(SignalKind::terminate()).context("failed to trap SIGTERM")?;
        let mut suspend = signal(SignalKind::from_raw(nix::libc::SIGTSTP))
            .context("failed to trap SIGTSTP")?;

        Ok(tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    Some(()) = interrupt.recv() => "SIGINT",
                    Some(()) = quit.recv() => "SIGQUIT",
                    Some(()) = terminate.recv() => "SIGTERM",
                    Some(()) = suspend.recv() => "SIGTSTP",
                    else => break,
                };
                debug!("received signal: {name}");
                flag.trigger();
            }
        }))
    }

    #[cfg(not(unix))]
    pub fn install(flag: ShutdownFlag) -> Result<JoinHandle<()>> {
        Ok(tokio::spawn(async move {
            loop {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::warn!("failed to wait for CTRL-C signal: {err}");
                    break;
                }
                debug!("received signal: CTRL-C");
                flag.trigger();
            }
        }))
    }
}
