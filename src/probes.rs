use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use serde::Deserialize;
use sysinfo::{Pid as SysPid, ProcessesToUpdate, System};
use tokio::process::Command;
use tracing::debug;

const SCREENSAVER_PROCESS: &str = "ScreenSaverEngine";
const IOREG: &str = "/usr/sbin/ioreg";
const OSASCRIPT: &str = "osascript";
/// `CurrentPowerState` values below this mean the display is dimmed or off.
const DISPLAY_AWAKE_POWER_STATE: u32 = 3;

/// Questions the supervisor asks about the machine every tick.
///
/// Implementations never fail: a probe that cannot answer reports the safe
/// default documented on each method.
pub trait EnvironmentProbes {
    /// PIDs whose process name contains `name`. Empty when nothing matches or
    /// the lookup fails.
    async fn find_pids(&mut self, name: &str) -> Vec<u32>;

    /// True while a screensaver engine process exists.
    async fn is_screensaver_active(&mut self) -> bool;

    /// True only when the display power state was read and reports sleep.
    /// An unreadable state counts as awake.
    async fn is_display_asleep(&mut self) -> bool;

    /// True only when `app_name` is frontmost with at least one window. Any
    /// failure counts as not frontmost.
    async fn is_frontmost(&mut self, app_name: &str) -> bool;
}

/// Probes backed by the process table, `ioreg` and `osascript`.
pub struct SystemProbes {
    system: System,
    own_pid: Option<SysPid>,
    ioreg: PathBuf,
    osascript: PathBuf,
}

impl SystemProbes {
    pub fn new() -> Self {
        Self::with_commands(PathBuf::from(IOREG), PathBuf::from(OSASCRIPT))
    }

    /// Probes that run the given `ioreg` and `osascript` programs.
    pub fn with_commands(ioreg: PathBuf, osascript: PathBuf) -> Self {
        Self {
            system: System::new(),
            own_pid: sysinfo::get_current_pid().ok(),
            ioreg,
            osascript,
        }
    }
}

impl Default for SystemProbes {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentProbes for SystemProbes {
    async fn find_pids(&mut self, name: &str) -> Vec<u32> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        let mut pids: Vec<u32> = self
            .system
            .processes()
            .iter()
            .filter(|(pid, _)| Some(**pid) != self.own_pid)
            .filter(|(_, process)| process.thread_kind().is_none())
            .filter(|(_, process)| process.name().to_string_lossy().contains(name))
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        if !pids.is_empty() {
            debug!("{name}: pids: {pids:?}");
        }
        pids
    }

    async fn is_screensaver_active(&mut self) -> bool {
        !self.find_pids(SCREENSAVER_PROCESS).await.is_empty()
    }

    async fn is_display_asleep(&mut self) -> bool {
        match display_power_state(&self.ioreg).await {
            Ok(state) => state < DISPLAY_AWAKE_POWER_STATE,
            Err(err) => {
                debug!("display power state unavailable, assuming awake: {err:#}");
                false
            }
        }
    }

    async fn is_frontmost(&mut self, app_name: &str) -> bool {
        match query_frontmost(&self.osascript, app_name).await {
            Ok(frontmost) => frontmost,
            Err(err) => {
                debug!("frontmost query for {app_name} failed: {err:#}");
                false
            }
        }
    }
}

async fn display_power_state(ioreg: &Path) -> Result<u32> {
    let output = Command::new(ioreg)
        .args(["-w", "0", "-n", "IODisplayWrangler", "-r", "IODisplayWrangler"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to run {}", ioreg.display()))?;
    if !output.status.success() {
        anyhow::bail!("{} exited with {}", ioreg.display(), output.status);
    }
    parse_power_state(&String::from_utf8_lossy(&output.stdout))
}

#[derive(Debug, Deserialize)]
struct PowerManagement {
    #[serde(rename = "CurrentPowerState")]
    current_power_state: u32,
}

/// Reads `CurrentPowerState` out of the `IOPowerManagement` dictionary that
/// ioreg prints as `{"Key"=value,...}`.
fn parse_power_state(ioreg_output: &str) -> Result<u32> {
    let dictionary = ioreg_output
        .lines()
        .find_map(|line| {
            line.split_once("\"IOPowerManagement\" = ")
                .map(|(_, rest)| rest.trim())
        })
        .context("IOPowerManagement not present in ioreg output")?;
    let parsed: PowerManagement = serde_json::from_str(&dictionary.replace('=', ":"))
        .with_context(|| format!("unexpected IOPowerManagement value: {dictionary}"))?;
    Ok(parsed.current_power_state)
}

async fn query_frontmost(osascript: &Path, app_name: &str) -> Result<bool> {
    let output = Command::new(osascript)
        .args(["-e", &frontmost_script(app_name)])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to run {}", osascript.display()))?;
    if !output.status.success() {
        anyhow::bail!("{} exited with {}", osascript.display(), output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
}

// Goes through System Events so no Accessibility permission is needed.
fn frontmost_script(app_name: &str) -> String {
    let app_name = app_name.replace('\\', "\\\\").replace('"', "\\\"");
    [
        "tell application \"System Events\"".to_string(),
        "try".to_string(),
        format!("tell process \"{app_name}\""),
        "if (frontmost is false) then return false".to_string(),
        "end tell".to_string(),
        format!("tell application \"{app_name}\""),
        "return (count of windows) is greater than 0".to_string(),
        "end tell".to_string(),
        "on error".to_string(),
        "return false".to_string(),
        "end try".to_string(),
        "end tell".to_string(),
    ]
    .join("\n")
}
