//! Resolves the xcpe config and data roots, honouring environment overrides
//! so tests and packaged installs can relocate them.
//!
//! Types:
//!
//! - `AppPaths` holds the resolved directories and derives file locations
//!   from them.
//!
//! Functions:
//!
//! - `AppPaths::discover` applies `XCPE_CONFIG_DIR` / `XCPE_DATA_DIR` over
//!   the platform defaults from `directories-next`.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "XCPE_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "XCPE_DATA_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "xcwallpaper";
const APPLICATION: &str = "xcpe";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let config_override = env_override(ENV_CONFIG_DIR);
        let data_override = env_override(ENV_DATA_DIR);
        if let (Some(config_dir), Some(data_dir)) = (&config_override, &data_override) {
            return Ok(Self {
                config_dir: config_dir.clone(),
                data_dir: data_dir.clone(),
            });
        }

        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        Ok(Self {
            config_dir: config_override.unwrap_or_else(|| project_dirs.config_dir().to_path_buf()),
            data_dir: data_override.unwrap_or_else(|| project_dirs.data_dir().to_path_buf()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Default destination for packed effects.
    pub fn effects_dir(&self) -> PathBuf {
        self.data_dir.join("effects")
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
