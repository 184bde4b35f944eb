//! Update actions.
//!
//! Every action walks the same sequence:
//! confirm, download, extract, optional relocation, report, acknowledge.
//! What differs between actions is data: the URL, the staging path, the
//! destination root and the relocation pair. Only failures of the display
//! or input escape as `Err`; update failures end up in [`ActionOutcome`].

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{error, info, warn};

use crate::config::{FirmwarePack, Relocation, UpdateTarget, UpdaterConfig};
use crate::error::UpdateError;
use crate::io::Transfer;
use crate::power::PowerControl;
use crate::ui::{Display, Intent, Ui};
use crate::zip::{Extract, ExtractReport};

/// How an action ended.
#[derive(Debug)]
pub enum ActionOutcome {
    /// The confirmation prompt was declined; nothing was touched.
    Cancelled,
    Completed,
    Failed(UpdateError),
    /// The user asked to leave the program.
    Exit,
    /// A power cycle was requested and accepted.
    PowerCycle,
}

impl ActionOutcome {
    /// Whether the action requires the menu loop to stop.
    pub fn ends_session(&self) -> bool {
        matches!(self, ActionOutcome::Exit | ActionOutcome::PowerCycle)
    }
}

/// Capabilities the runner acts through.
pub struct Services<'a> {
    pub transfer: &'a dyn Transfer,
    pub extractor: &'a dyn Extract,
    pub power: &'a dyn PowerControl,
}

/// One download-and-install job.
struct Job<'a> {
    name: &'a str,
    url: &'a str,
    staging_path: PathBuf,
    destination: PathBuf,
    relocation: Option<&'a Relocation>,
}

impl<'a> From<&'a UpdateTarget> for Job<'a> {
    fn from(target: &'a UpdateTarget) -> Self {
        Self {
            name: &target.name,
            url: &target.url,
            staging_path: target.staging_path.clone(),
            destination: target.destination.clone(),
            relocation: target.relocation.as_ref(),
        }
    }
}

pub struct ActionRunner<'a> {
    config: &'a UpdaterConfig,
    services: Services<'a>,
    ui: Ui,
}

impl<'a> ActionRunner<'a> {
    pub fn new(config: &'a UpdaterConfig, services: Services<'a>, ui: Ui) -> Self {
        Self {
            config,
            services,
            ui,
        }
    }

    pub fn ui(&mut self) -> &mut Ui {
        &mut self.ui
    }

    /// Update a single component.
    pub async fn update_target(&mut self, target: &UpdateTarget) -> Result<ActionOutcome> {
        if !self.ui.confirm(&format!("Update {}?", target.name))? {
            return Ok(ActionOutcome::Cancelled);
        }

        self.ui.fresh_screen(None)?;
        self.ui.message("")?;
        self.ui.message(&format!("Downloading {}...", target.name))?;

        let outcome = match self.install(Job::from(target)).await? {
            Ok(_) => {
                self.ui
                    .message(&format!("{} updated successfully!", target.name))?;
                ActionOutcome::Completed
            }
            Err(e) => {
                self.report_failure(&e)?;
                ActionOutcome::Failed(e)
            }
        };

        self.acknowledge()?;
        Ok(outcome)
    }

    /// Update several components back to back, then offer a reboot.
    ///
    /// There is a single confirmation up front and a single report at the
    /// end; a failure of one component does not stop the next.
    pub async fn update_all(&mut self, targets: &[&UpdateTarget]) -> Result<ActionOutcome> {
        let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        if !self
            .ui
            .confirm(&format!("Update {} together?", names.join(" + ")))?
        {
            return Ok(ActionOutcome::Cancelled);
        }

        self.ui.fresh_screen(None)?;
        let mut first_error = None;
        for target in targets {
            self.ui.message(&format!("Updating {}...", target.name))?;
            match self.install(Job::from(*target)).await? {
                Ok(_) => self.ui.message(&format!("{} done.", target.name))?,
                Err(e) => {
                    self.ui
                        .message(&format!("{} failed: {}", target.name, e.headline()))?;
                    first_error.get_or_insert(e);
                }
            }
        }

        self.ui.message("")?;
        match first_error {
            None => self.ui.message("All updates complete!")?,
            Some(_) => self.ui.message("Updates finished with errors.")?,
        }
        self.ui.message("Press Enter to reboot now, or Esc to go back.")?;

        loop {
            match self.ui.next_intent()? {
                Intent::Confirm => return self.request_power_cycle(),
                Intent::Back => break,
                _ => {}
            }
        }

        Ok(match first_error {
            None => ActionOutcome::Completed,
            Some(e) => ActionOutcome::Failed(e),
        })
    }

    /// Download and unpack one optional firmware pack into its own folder.
    pub async fn download_pack(&mut self, pack: &FirmwarePack) -> Result<ActionOutcome> {
        if !self.ui.confirm(&format!("Download {}?", pack.name))? {
            return Ok(ActionOutcome::Cancelled);
        }

        self.ui.fresh_screen(None)?;
        self.ui.message("")?;
        self.ui.message(&format!("Downloading {}...", pack.name))?;

        let destination = self.config.pack_destination(pack);
        let job = Job {
            name: &pack.name,
            url: &pack.url,
            staging_path: self.config.pack_staging_path(pack),
            destination: destination.clone(),
            relocation: None,
        };

        let outcome = match self.install(job).await? {
            Ok(_) => {
                self.ui.message("Firmware pack downloaded successfully!")?;
                self.ui.message("Saved to:")?;
                self.ui.message(&destination.display().to_string())?;
                self.ui.message("Open Daybreak and select this folder.")?;
                ActionOutcome::Completed
            }
            Err(e) => {
                self.report_failure(&e)?;
                ActionOutcome::Failed(e)
            }
        };

        self.ui.message("")?;
        self.ui.message("Press Enter to return to firmware list")?;
        self.ui.wait_for(Intent::Confirm)?;
        Ok(outcome)
    }

    /// Replace the updater's own executable.
    ///
    /// On success the new binary only takes effect after a relaunch, so the
    /// user is asked to exit.
    pub async fn update_self(&mut self) -> Result<ActionOutcome> {
        if !self.ui.confirm("Update the app itself?")? {
            return Ok(ActionOutcome::Cancelled);
        }

        self.ui.fresh_screen(None)?;
        self.ui.message("")?;
        self.ui.message("Downloading latest app version...")?;

        let config = self.config;
        let app = &config.app;
        match self.download_replacing(&app.url, &app.install_path).await? {
            Ok(()) => {
                self.ui.message("")?;
                self.ui.message("Update successful!")?;
                self.ui.message("New version downloaded.")?;
                self.ui.message("Press q to exit the app")?;
                self.ui.message("Then relaunch it")?;
                self.ui.wait_for(Intent::Exit)?;
                Ok(ActionOutcome::Exit)
            }
            Err(e) => {
                self.ui.message("")?;
                self.ui.message("Update failed!")?;
                self.ui.message("Check internet connection.")?;
                self.acknowledge()?;
                Ok(ActionOutcome::Failed(e))
            }
        }
    }

    /// Announce and request a full power cycle.
    pub async fn reboot(&mut self, system_version: &str) -> Result<ActionOutcome> {
        self.ui.fresh_screen(Some(system_version))?;
        self.ui.message("")?;
        self.ui.message("Rebooting (full power cycle)...")?;
        self.ui.message("The console will turn off and boot back into CFW.")?;
        tokio::time::sleep(self.config.reboot_delay()).await;

        let outcome = self.request_power_cycle()?;
        if !outcome.ends_session() {
            self.acknowledge()?;
        }
        Ok(outcome)
    }

    fn request_power_cycle(&mut self) -> Result<ActionOutcome> {
        info!("Requesting power cycle");
        match self.services.power.power_cycle() {
            Ok(()) => Ok(ActionOutcome::PowerCycle),
            Err(e) => {
                error!("Power cycle failed: {:#}", e);
                self.ui.message(&format!("Reboot failed: {}", e))?;
                Ok(ActionOutcome::Completed)
            }
        }
    }

    /// Download, extract and relocate.
    ///
    /// The outer `Result` carries display failures, the inner one the
    /// outcome of the update itself.
    async fn install(&mut self, job: Job<'_>) -> Result<Result<ExtractReport, UpdateError>> {
        if let Err(e) = self.download(job.url, &job.staging_path).await? {
            return Ok(Err(e));
        }

        self.ui.message("")?;
        self.ui.message(&format!("Extracting {}...", job.name))?;
        let report = match self
            .services
            .extractor
            .extract(&job.staging_path, &job.destination)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                error!("{}: {}", job.name, e);
                return Ok(Err(e));
            }
        };
        if report.skipped > 0 {
            warn!("{}: {} entries could not be written", job.name, report.skipped);
        }

        if let Some(relocation) = job.relocation {
            if let Err(e) = relocate(&job.destination, relocation).await {
                error!("{}: {}", job.name, e);
                return Ok(Err(e));
            }
        }

        Ok(Ok(report))
    }

    async fn download(&mut self, url: &str, dest: &Path) -> Result<Result<(), UpdateError>> {
        if let Some(parent) = dest.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }

        let display: &mut dyn Display = self.ui.display();
        let mut progress = |downloaded: u64, total: u64| {
            let _ = display.progress(downloaded, total);
        };
        let result = self
            .services
            .transfer
            .fetch(url, dest, Some(&mut progress))
            .await;
        self.ui.display().clear_progress()?;

        Ok(result.map(|_| ()).map_err(UpdateError::from))
    }

    /// Download next to `dest` and swap it in only once complete, so a
    /// failed download leaves the existing file untouched.
    async fn download_replacing(
        &mut self,
        url: &str,
        dest: &Path,
    ) -> Result<Result<(), UpdateError>> {
        let partial = partial_path(dest);
        if let Err(e) = self.download(url, &partial).await? {
            return Ok(Err(e));
        }
        if let Err(source) = tokio::fs::rename(&partial, dest).await {
            error!("Could not replace {}: {}", dest.display(), source);
            let _ = tokio::fs::remove_file(&partial).await;
            return Ok(Err(UpdateError::Relocation {
                from: partial,
                to: dest.to_path_buf(),
                source,
            }));
        }
        Ok(Ok(()))
    }

    fn report_failure(&mut self, e: &UpdateError) -> Result<()> {
        self.ui.message("")?;
        self.ui.message(e.headline())?;
        Ok(())
    }

    fn acknowledge(&mut self) -> Result<()> {
        self.ui.message("")?;
        self.ui.message("Press Enter to return to menu")?;
        self.ui.wait_for(Intent::Confirm)
    }
}

/// `dest` with `.part` appended to its file name.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Move the relocation source to its target, both relative to `root`.
async fn relocate(root: &Path, relocation: &Relocation) -> Result<(), UpdateError> {
    let from = root.join(&relocation.from);
    let to = root.join(&relocation.to);
    let fail = |source| UpdateError::Relocation {
        from: from.clone(),
        to: to.clone(),
        source,
    };

    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }
    tokio::fs::rename(&from, &to).await.map_err(fail)?;
    info!("Moved {} to {}", from.display(), to.display());
    Ok(())
}
