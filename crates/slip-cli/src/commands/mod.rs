//! Subcommand implementations.

pub mod config;
pub mod scan;

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use slip_core::SlipConfig;

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slip")
        .join("config.json")
}

/// Config file in effect: the explicit path if given, otherwise the default.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load the configuration, falling back to defaults when no file exists.
///
/// An explicitly requested file must exist.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<SlipConfig> {
    if let Some(path) = explicit {
        return SlipConfig::from_file(Path::new(path))
            .with_context(|| format!("Failed to load config file {}", path));
    }

    let path = default_config_path();
    if path.exists() {
        debug!("Loading config from {}", path.display());
        Ok(SlipConfig::from_file(&path)?)
    } else {
        Ok(SlipConfig::default())
    }
}
