//! Entry point for the cfw-updater console program.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::info;

use cfw_updater::io::HttpTransfer;
use cfw_updater::power::{CommandPower, NoopInhibitor, SleepInhibitor, SystemdInhibitor};
use cfw_updater::probe::{FALLBACK_VERSION, probe_version};
use cfw_updater::ui::Ui;
use cfw_updater::ui::terminal::{TerminalDisplay, TerminalInput, TerminalSession};
use cfw_updater::zip::StagedZipExtractor;
use cfw_updater::{ActionRunner, Cli, Menu, MenuExit, ReleaseVersions, Services, UpdaterConfig};

/// Single-threaded on purpose: actions run strictly one after another and
/// the screen is frozen while one is in progress.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = UpdaterConfig::load(cli.config.as_deref(), &cli.root)?;

    let log_path = cli.log_file.clone().unwrap_or_else(|| config.log_path.clone());
    init_logging(&log_path, cli.log_level());
    info!(
        "cfw-updater {} starting, root {}",
        config.app_version,
        cli.root.display()
    );

    let inhibitor: Arc<dyn SleepInhibitor> = if cli.no_inhibit {
        Arc::new(NoopInhibitor)
    } else {
        Arc::new(SystemdInhibitor::new("Downloading system update"))
    };
    let transfer = HttpTransfer::new(config.user_agent.clone(), inhibitor);
    let extractor = StagedZipExtractor;
    let power = CommandPower::new(config.reboot_command.clone());

    let versions = if cli.offline {
        ReleaseVersions {
            system: FALLBACK_VERSION.to_string(),
            bootloader: FALLBACK_VERSION.to_string(),
        }
    } else {
        ReleaseVersions {
            system: release_tag(&transfer, config.system.release_api.as_deref(), &config).await,
            bootloader: release_tag(&transfer, config.bootloader.release_api.as_deref(), &config)
                .await,
        }
    };
    let system_version = config.system_version();

    let exit = {
        let _session = TerminalSession::enter()?;
        let ui = Ui::new(
            Box::new(TerminalDisplay::new()),
            Box::new(TerminalInput),
            config.poll_interval(),
            config.app_version.clone(),
        );
        let services = Services {
            transfer: &transfer,
            extractor: &extractor,
            power: &power,
        };
        let runner = ActionRunner::new(&config, services, ui);
        Menu::new(&config, runner, &versions, system_version)
            .run()
            .await?
    };

    match exit {
        MenuExit::Quit => info!("Exiting"),
        MenuExit::PowerCycle => info!("Power cycle requested, exiting"),
    }
    Ok(())
}

async fn release_tag(transfer: &HttpTransfer, api: Option<&str>, config: &UpdaterConfig) -> String {
    match api {
        Some(api) => {
            if let Some(parent) = config.probe_path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            probe_version(transfer, api, &config.probe_path).await
        }
        None => FALLBACK_VERSION.to_string(),
    }
}

/// Log to a file: stderr belongs to the full-screen UI.
fn init_logging(path: &Path, level: log::LevelFilter) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);

    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(_) => {
            // nowhere safe to write; keep the screen clean
            builder.filter_level(log::LevelFilter::Off);
        }
    }
    builder.init();
}
