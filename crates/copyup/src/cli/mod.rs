//! CLI definition and handler.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use serde::Serialize;

use crate::driver::{CopyUpConfig, CopyUpDriver, TmpfsSymlinkDriver};
use crate::filesystem::HostMounts;

/// copyup - make directories writable on tmpfs without copying them
///
/// Run inside a private mount namespace, e.g. `unshare -rm copyup /etc /run`.
#[derive(Parser, Debug)]
#[command(name = "copyup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directories to copy up, in order
    pub dirs: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "COPYUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root the staging directory is created under
    #[arg(long, value_name = "DIR")]
    pub staging_root: Option<PathBuf>,

    /// Destination path to leave absent, e.g. /etc/apparmor.d
    #[arg(short = 'x', long = "exclude", value_name = "PATH")]
    pub exclude: Vec<PathBuf>,

    /// Print a JSON report instead of one directory per line
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Outcome printed by `--json`.
#[derive(Debug, Serialize)]
struct Report<'a> {
    copied: &'a [PathBuf],
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Cli {
    /// Merge the config file with command-line overrides.
    pub fn load_config(&self) -> Result<CopyUpConfig> {
        let mut config = match &self.config {
            Some(path) => CopyUpConfig::from_toml_file(path)?,
            None => CopyUpConfig::default(),
        };

        if let Some(root) = &self.staging_root {
            config = config.with_staging_root(root);
        }

        Ok(config.with_exclusions(self.exclude.iter().cloned()))
    }

    /// Execute the copy-up against the host mount table.
    pub fn execute(&self) -> Result<()> {
        let config = self.load_config()?;
        tracing::debug!(?config, "Loaded configuration");

        let driver = TmpfsSymlinkDriver::from_config(HostMounts, &config);

        match driver.copy_up(&self.dirs) {
            Ok(copied) => {
                self.print(&Report {
                    copied: &copied,
                    stage: None,
                    error: None,
                })?;
                Ok(())
            }
            Err(failure) => {
                self.print(&Report {
                    copied: &failure.copied,
                    stage: Some(failure.error.stage()),
                    error: Some(failure.error.to_string()),
                })?;
                Err(failure.into())
            }
        }
    }

    fn print(&self, report: &Report<'_>) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(report)?);
        } else {
            for dir in report.copied {
                println!("{}", dir.display());
            }
        }
        Ok(())
    }
}
