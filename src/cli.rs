use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "cfw-updater")]
#[command(version)]
#[command(about = "Menu-driven CFW, bootloader and firmware pack updater", long_about = None)]
#[command(after_help = "Keys:\n  \
  Up/Down (k/j)    move the selection\n  \
  Enter (a)        confirm\n  \
  Esc (b)          cancel / back\n  \
  q (+)            exit")]
pub struct Cli {
    /// Storage root every configured path is resolved against
    #[arg(short = 'r', long, value_name = "DIR", default_value = "/")]
    pub root: PathBuf,

    /// TOML file overriding the built-in release channels
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write the log here instead of the configured log path
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Skip the release tag lookups at startup
    #[arg(long)]
    pub offline: bool,

    /// Do not hold a sleep inhibitor lock during downloads
    #[arg(long)]
    pub no_inhibit: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
