//! Top-level menu and the firmware sub-menu.

use anyhow::Result;
use log::info;

use crate::action::{ActionOutcome, ActionRunner};
use crate::config::UpdaterConfig;
use crate::ui::{Intent, Selection};

const MAIN_TITLE: &str = "Use Up/Down to select   Enter = confirm   q = exit";
const FIRMWARE_TITLE: &str = "Select firmware pack:";
const FIRMWARE_HINTS: [&str; 2] = ["Enter = Download selected pack", "Esc = Back"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    UpdateAll,
    UpdateSystem,
    UpdateBootloader,
    Firmware,
    UpdateApp,
    Reboot,
}

/// Release tags shown next to the component entries.
#[derive(Debug, Clone)]
pub struct ReleaseVersions {
    pub system: String,
    pub bootloader: String,
}

/// Why the menu loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuExit {
    Quit,
    PowerCycle,
}

/// Fixed option list, in display order.
pub fn menu_entries(config: &UpdaterConfig, versions: &ReleaseVersions) -> Vec<(String, MenuAction)> {
    vec![
        (
            format!(
                "Update CFW ({} + {})",
                config.system.name, config.bootloader.name
            ),
            MenuAction::UpdateAll,
        ),
        (
            format!("Update {} ({})", config.system.name, versions.system),
            MenuAction::UpdateSystem,
        ),
        (
            format!("Update {} ({})", config.bootloader.name, versions.bootloader),
            MenuAction::UpdateBootloader,
        ),
        ("Update Firmware".to_string(), MenuAction::Firmware),
        (
            format!("Update App ({})", config.app_version),
            MenuAction::UpdateApp,
        ),
        ("Exit & Reboot".to_string(), MenuAction::Reboot),
    ]
}

pub struct Menu<'a> {
    config: &'a UpdaterConfig,
    runner: ActionRunner<'a>,
    labels: Vec<String>,
    actions: Vec<MenuAction>,
    system_version: String,
}

impl<'a> Menu<'a> {
    pub fn new(
        config: &'a UpdaterConfig,
        runner: ActionRunner<'a>,
        versions: &ReleaseVersions,
        system_version: String,
    ) -> Self {
        let (labels, actions) = menu_entries(config, versions).into_iter().unzip();
        Self {
            config,
            runner,
            labels,
            actions,
            system_version,
        }
    }

    /// Run until the user exits or a power cycle is accepted.
    pub async fn run(&mut self) -> Result<MenuExit> {
        let mut selection = Selection::new(self.actions.len());
        self.draw(selection, true)?;

        loop {
            let intent = self.runner.ui().next_intent()?;
            if selection.apply(intent) {
                self.draw(selection, false)?;
                continue;
            }

            match intent {
                Intent::Confirm => {
                    let action = self.actions[selection.index()];
                    let outcome = self.dispatch(action).await?;
                    info!("{} finished: {:?}", self.labels[selection.index()], outcome);
                    match outcome {
                        ActionOutcome::Exit => return Ok(MenuExit::Quit),
                        ActionOutcome::PowerCycle => return Ok(MenuExit::PowerCycle),
                        _ => self.draw(selection, true)?,
                    }
                }
                Intent::Exit => return Ok(MenuExit::Quit),
                _ => {}
            }
        }
    }

    async fn dispatch(&mut self, action: MenuAction) -> Result<ActionOutcome> {
        let config = self.config;
        match action {
            MenuAction::UpdateAll => {
                self.runner
                    .update_all(&[&config.system, &config.bootloader])
                    .await
            }
            MenuAction::UpdateSystem => self.runner.update_target(&config.system).await,
            MenuAction::UpdateBootloader => self.runner.update_target(&config.bootloader).await,
            MenuAction::Firmware => self.firmware_menu().await,
            MenuAction::UpdateApp => self.runner.update_self().await,
            MenuAction::Reboot => self.runner.reboot(&self.system_version).await,
        }
    }

    /// Pick a firmware pack; Back returns to the main menu untouched.
    async fn firmware_menu(&mut self) -> Result<ActionOutcome> {
        let config = self.config;
        let names: Vec<String> = config
            .firmware_packs
            .iter()
            .map(|pack| pack.name.clone())
            .collect();
        let mut selection = Selection::new(names.len());
        self.draw_firmware(&names, selection, true)?;

        loop {
            let intent = self.runner.ui().next_intent()?;
            if selection.apply(intent) {
                self.draw_firmware(&names, selection, false)?;
                continue;
            }

            match intent {
                Intent::Confirm => {
                    let pack = &config.firmware_packs[selection.index()];
                    let outcome = self.runner.download_pack(pack).await?;
                    info!("{} finished: {:?}", pack.name, outcome);
                    if outcome.ends_session() {
                        return Ok(outcome);
                    }
                    self.draw_firmware(&names, selection, true)?;
                }
                Intent::Back => return Ok(ActionOutcome::Cancelled),
                _ => {}
            }
        }
    }

    fn draw(&mut self, selection: Selection, full: bool) -> Result<()> {
        let ui = self.runner.ui();
        if full {
            ui.fresh_screen(Some(&self.system_version))?;
        } else {
            ui.header(Some(&self.system_version))?;
        }
        ui.display()
            .list(MAIN_TITLE, &self.labels, selection.index())
    }

    fn draw_firmware(&mut self, names: &[String], selection: Selection, full: bool) -> Result<()> {
        let ui = self.runner.ui();
        if full {
            ui.fresh_screen(None)?;
            ui.display().hints(&FIRMWARE_HINTS)?;
        }
        ui.display()
            .list(FIRMWARE_TITLE, names, selection.index())
    }
}
