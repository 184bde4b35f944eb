//! Updater configuration.
//!
//! Everything the menu and the action runner need is collected into one
//! [`UpdaterConfig`] that is built once at startup and only ever borrowed
//! afterwards. The built-in defaults describe the stock release channels;
//! a TOML file can replace any of them.
//!
//! Paths in the configuration are relative to the storage root (the SD card
//! mount point, `/` on the device) and are resolved by [`UpdaterConfig::resolve`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// One component that is installed by downloading and extracting a zip.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UpdateTarget {
    /// Name shown in menu entries and progress lines.
    pub name: String,
    /// Zip archive to download.
    pub url: String,
    /// GitHub "latest release" endpoint used to label the menu entry.
    #[serde(default)]
    pub release_api: Option<String>,
    /// Where the archive is staged before extraction.
    pub staging_path: PathBuf,
    /// Directory the archive is extracted into.
    #[serde(default)]
    pub destination: PathBuf,
    /// File moved after extraction, relative to `destination`.
    #[serde(default)]
    pub relocation: Option<Relocation>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Relocation {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Optional firmware pack offered in the firmware sub-menu.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FirmwarePack {
    pub name: String,
    pub url: String,
}

impl FirmwarePack {
    /// File-system friendly form of the display name.
    ///
    /// Always a single plain path component, so it cannot leave the
    /// firmware root.
    pub fn safe_name(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| match c {
                ' ' | '(' | ')' | '/' | '\\' | ':' => '_',
                c => c,
            })
            .collect();
        if name.chars().all(|c| c == '.') {
            // empty, "." or ".."
            return "_".repeat(name.len().max(1));
        }
        name
    }
}

/// The updater's own executable.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AppUpdate {
    pub url: String,
    pub install_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdaterConfig {
    pub app_version: String,
    pub user_agent: String,
    /// Input polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Pause before the power-cycle request, in milliseconds.
    pub reboot_delay_ms: u64,
    /// Scratch file used by the version prober.
    pub probe_path: PathBuf,
    /// Text file holding the installed system firmware version.
    pub system_version_file: Option<PathBuf>,
    pub log_path: PathBuf,
    /// Command run to power-cycle the device.
    pub reboot_command: Vec<String>,
    pub system: UpdateTarget,
    pub bootloader: UpdateTarget,
    pub app: AppUpdate,
    pub firmware_root: PathBuf,
    pub firmware_packs: Vec<FirmwarePack>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            app_version: "v1.0.0".to_string(),
            user_agent: "TheOtherSide-Updater/1.0".to_string(),
            poll_interval_ms: 50,
            reboot_delay_ms: 3000,
            probe_path: "switch/temp.json".into(),
            system_version_file: None,
            log_path: "switch/cfw-updater.log".into(),
            reboot_command: vec!["systemctl".to_string(), "reboot".to_string()],
            system: UpdateTarget {
                name: "Atmosphere".to_string(),
                url: "https://github.com/eradicatinglove/Atmosphere/releases/download/v1.10.1/TheOtherSide_ams_1.10.1.zip".to_string(),
                release_api: Some(
                    "https://api.github.com/repos/eradicatinglove/Atmosphere/releases/latest"
                        .to_string(),
                ),
                staging_path: "switch/ams.zip".into(),
                destination: PathBuf::new(),
                relocation: None,
            },
            bootloader: UpdateTarget {
                name: "Hekate".to_string(),
                url: "https://github.com/eradicatinglove/hekate/releases/download/v6.4.2/TheOtherSide_hekate_6.4.2.zip".to_string(),
                release_api: Some(
                    "https://api.github.com/repos/eradicatinglove/hekate/releases/latest"
                        .to_string(),
                ),
                staging_path: "switch/hekate.zip".into(),
                destination: PathBuf::new(),
                relocation: Some(Relocation {
                    from: "bootloader/hekate_ctcaer.bin".into(),
                    to: "atmosphere/reboot_payload.bin".into(),
                }),
            },
            app: AppUpdate {
                url: "https://github.com/eradicatinglove/the-other-side-updater/releases/latest/download/the_other_side_updater.nro".to_string(),
                install_path: "switch/the_other_side_updater.nro".into(),
            },
            firmware_root: "firmware".into(),
            firmware_packs: vec![
                FirmwarePack {
                    name: "Firmware (21.1.0)".to_string(),
                    url: "https://github.com/eradicatinglove/The-Other-Side-firmware/releases/download/fw-21.1.0/Firmware_21.1.0.zip".to_string(),
                },
                FirmwarePack {
                    name: "Firmware (20.5.0)".to_string(),
                    url: "https://github.com/eradicatinglove/The-Other-Side-firmware/releases/download/fw-20.5.0/20.5.0.zip".to_string(),
                },
            ],
        }
    }
}

impl UpdaterConfig {
    /// Load the configuration and resolve it against `root`.
    ///
    /// Without a file the built-in defaults are used. Keys missing from the
    /// file keep their default value.
    pub fn load(path: Option<&Path>, root: &Path) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config.resolve(root))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn validate(&self) -> Result<()> {
        if self.firmware_packs.is_empty() {
            anyhow::bail!("At least one firmware pack must be configured");
        }
        if self.reboot_command.is_empty() {
            anyhow::bail!("reboot_command must not be empty");
        }
        Ok(())
    }

    /// Rebase every configured path under `root`.
    ///
    /// Relocation paths stay relative: they are joined with the target's
    /// destination when the relocation runs.
    pub fn resolve(mut self, root: &Path) -> Self {
        let rebase = |path: &mut PathBuf| {
            *path = join_under(root, path);
        };

        rebase(&mut self.probe_path);
        rebase(&mut self.log_path);
        rebase(&mut self.firmware_root);
        rebase(&mut self.app.install_path);
        if let Some(path) = self.system_version_file.as_mut() {
            rebase(path);
        }
        for target in [&mut self.system, &mut self.bootloader] {
            rebase(&mut target.staging_path);
            rebase(&mut target.destination);
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reboot_delay(&self) -> Duration {
        Duration::from_millis(self.reboot_delay_ms)
    }

    /// Staging archive for a firmware pack.
    pub fn pack_staging_path(&self, pack: &FirmwarePack) -> PathBuf {
        self.firmware_root.join(format!("{}.zip", pack.safe_name()))
    }

    /// Directory a firmware pack is extracted into.
    pub fn pack_destination(&self, pack: &FirmwarePack) -> PathBuf {
        self.firmware_root.join(pack.safe_name())
    }

    /// Installed system firmware version for the header.
    pub fn system_version(&self) -> String {
        self.system_version_file
            .as_deref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|text| text.lines().next().map(|line| line.trim().to_string()))
            .filter(|line| !line.is_empty())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Join `path` under `root`, treating absolute paths as root-relative.
fn join_under(root: &Path, path: &Path) -> PathBuf {
    let relative = path.strip_prefix("/").unwrap_or(path);
    root.join(relative)
}
