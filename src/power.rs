//! Power management: keeping the device awake during downloads and
//! requesting a full power cycle.

use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result, bail};
use log::{debug, warn};

/// Keeps automatic sleep suppressed until dropped.
pub struct SleepGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SleepGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for SleepGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Suppresses automatic low-power transitions.
pub trait SleepInhibitor: Send + Sync {
    fn inhibit(&self) -> SleepGuard;
}

/// Never inhibits anything.
pub struct NoopInhibitor;

impl SleepInhibitor for NoopInhibitor {
    fn inhibit(&self) -> SleepGuard {
        SleepGuard::noop()
    }
}

/// Holds a `systemd-inhibit` lock for as long as the guard lives.
pub struct SystemdInhibitor {
    why: String,
}

impl SystemdInhibitor {
    pub fn new(why: impl Into<String>) -> Self {
        Self { why: why.into() }
    }

    fn spawn(&self) -> std::io::Result<Child> {
        Command::new("systemd-inhibit")
            .arg("--what=sleep:idle")
            .arg("--mode=block")
            .arg(format!("--why={}", self.why))
            .args(["sleep", "infinity"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

impl SleepInhibitor for SystemdInhibitor {
    fn inhibit(&self) -> SleepGuard {
        match self.spawn() {
            Ok(mut child) => {
                debug!("Sleep inhibited (pid {})", child.id());
                SleepGuard::new(move || {
                    let _ = child.kill();
                    let _ = child.wait();
                    debug!("Sleep inhibition released");
                })
            }
            Err(e) => {
                warn!("Could not inhibit sleep: {}", e);
                SleepGuard::noop()
            }
        }
    }
}

/// Requests a full device power cycle.
///
/// A successful call means the request was accepted; the process is expected
/// to exit right after.
pub trait PowerControl {
    fn power_cycle(&self) -> Result<()>;
}

/// Runs a shell-free command such as `systemctl reboot`.
pub struct CommandPower {
    argv: Vec<String>,
}

impl CommandPower {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl PowerControl for CommandPower {
    fn power_cycle(&self) -> Result<()> {
        let (program, args) = self
            .argv
            .split_first()
            .context("Reboot command is empty")?;

        let status = Command::new(program)
            .args(args)
            .status()
            .with_context(|| format!("Failed to run {}", program))?;

        if !status.success() {
            bail!("{} exited with {}", program, status);
        }
        Ok(())
    }
}
