use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// User preferences read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where `pack` writes when no `--output` is given.
    pub output_dir: Option<PathBuf>,
    /// Author recorded when a project manifest leaves it empty.
    pub author: Option<String>,
    /// Refuse to pack when any parameter line fails to parse.
    pub strict_parameters: bool,
}

impl Settings {
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file at {}", path.display()))?;
            let settings: Self = toml::from_str(&contents)
                .with_context(|| format!("failed to parse settings file at {}", path.display()))?;
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("settings path has no parent: {}", path.display()))?;
        fs::create_dir_all(dir).with_context(|| {
            format!(
                "failed to prepare directory for settings file at {}",
                dir.display()
            )
        })?;
        let serialized =
            toml::to_string_pretty(self).context("failed to serialize settings to TOML")?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write settings file to {}", path.display()))?;
        Ok(())
    }
}
