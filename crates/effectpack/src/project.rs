//! Authoring projects on disk: an `effect.toml` next to the pass sources,
//! parameter files and images that make up one effect.
//!
//! Types:
//!
//! - `ProjectManifest` is the parsed `effect.toml`: effect metadata and the
//!   ordered pass list. Pass ids are positional, 1 for the first pass.
//! - `ProjectPass` names a pass's shader file, optional parameter file and
//!   image files, relative to the project root.
//! - `ProjectError` classifies manifest parsing, validation and I/O failures.
//! - `EffectProject` couples the resolved root with its manifest.
//!
//! Functions:
//!
//! - `EffectProject::load` reads and validates `effect.toml`.
//! - `EffectProject::shader_code` joins the pass sources in pass order.
//! - `EffectProject::parameters` parses every pass's parameter file.
//! - `EffectProject::to_encode_job` gathers everything the packager needs.
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::crypto::PackageKey;
use crate::format::join_passes;
use crate::metadata::EffectMetadata;
use crate::package::EncodeJob;
use crate::paramlang::{ParamParser, ParseOutcome};

pub const PROJECT_FILE: &str = "effect.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProjectManifest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub passes: Vec<ProjectPass>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProjectPass {
    pub source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<PathBuf>,
    #[serde(default)]
    pub images: Vec<PathBuf>,
}

impl ProjectManifest {
    /// Returns human-readable problems; empty when the manifest is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.id.trim().is_empty() {
            issues.push("id must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            issues.push("name must not be empty".to_string());
        }
        if self.passes.is_empty() {
            issues.push("at least one [[passes]] entry is required".to_string());
        }
        for (index, pass) in self.passes.iter().enumerate() {
            if pass.source.as_os_str().is_empty() {
                issues.push(format!("pass {} has an empty source path", index + 1));
            }
            if pass
                .parameters
                .as_ref()
                .is_some_and(|path| path.as_os_str().is_empty())
            {
                issues.push(format!("pass {} has an empty parameters path", index + 1));
            }
        }
        issues
    }
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project manifest not found at {0}")]
    ManifestMissing(PathBuf),

    #[error("failed to parse project manifest: {0}")]
    ManifestParse(#[from] toml::de::Error),

    #[error("project manifest validation failed: {0:?}")]
    ManifestValidation(Vec<String>),

    #[error("failed to read shader source {path}: {source}")]
    ShaderSource { path: PathBuf, source: io::Error },

    #[error("failed to read parameter file {path}: {source}")]
    ParameterFile { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct EffectProject {
    root: PathBuf,
    manifest: ProjectManifest,
}

impl EffectProject {
    /// Loads `effect.toml` from `root`. Also accepts the path of the manifest
    /// file itself.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let root = root.as_ref();
        let (root, manifest_path) = if root.is_file() {
            let parent = root.parent().unwrap_or(Path::new("")).to_path_buf();
            (parent, root.to_path_buf())
        } else {
            (root.to_path_buf(), root.join(PROJECT_FILE))
        };
        if !manifest_path.exists() {
            return Err(ProjectError::ManifestMissing(manifest_path));
        }

        let manifest_raw = fs::read_to_string(&manifest_path)?;
        let manifest: ProjectManifest = toml::from_str(&manifest_raw)?;
        let issues = manifest.validate();
        if !issues.is_empty() {
            return Err(ProjectError::ManifestValidation(issues));
        }

        debug!(root = %root.display(), passes = manifest.passes.len(), "loaded effect project");
        Ok(Self { root, manifest })
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn manifest(&self) -> &ProjectManifest {
        &self.manifest
    }

    /// Passes paired with their 1-based pass id.
    pub fn passes(&self) -> impl Iterator<Item = (i32, &ProjectPass)> {
        (1..).zip(self.manifest.passes.iter())
    }

    /// Reads every pass source and joins them with the pass separator.
    pub fn shader_code(&self) -> Result<String, ProjectError> {
        let mut sources = Vec::with_capacity(self.manifest.passes.len());
        for (_, pass) in self.passes() {
            let path = self.root.join(&pass.source);
            let source = fs::read_to_string(&path)
                .map_err(|source| ProjectError::ShaderSource { path, source })?;
            sources.push(source);
        }
        Ok(join_passes(&sources))
    }

    /// Parses each pass's parameter file. Passes without one contribute no
    /// parameters; unreadable files are errors.
    pub fn parameters(&self, parser: &ParamParser) -> Result<ParseOutcome, ProjectError> {
        let mut outcome = ParseOutcome::default();
        for (pass_id, pass) in self.passes() {
            let Some(relative) = &pass.parameters else {
                continue;
            };
            let path = self.root.join(relative);
            let text = fs::read_to_string(&path)
                .map_err(|source| ProjectError::ParameterFile { path, source })?;
            outcome.merge(parser.parse_block(pass_id, &text));
        }
        Ok(outcome)
    }

    /// Image paths of every pass, resolved against the root. Missing files
    /// are kept; the packager stores them as placeholders.
    pub fn image_paths(&self) -> Vec<PathBuf> {
        self.manifest
            .passes
            .iter()
            .flat_map(|pass| pass.images.iter())
            .map(|image| self.root.join(image))
            .collect()
    }

    pub fn metadata(&self, created: DateTime<Utc>) -> EffectMetadata {
        EffectMetadata {
            id: self.manifest.id.clone(),
            effect_name: self.manifest.name.clone(),
            author: self.manifest.author.clone(),
            description: self.manifest.description.clone(),
            create_time: created.trunc_subsecs(0),
            version: self.manifest.version.clone(),
            tags: self.manifest.tags.clone(),
        }
    }

    /// Builds an encode job. The returned outcome carries the parameter
    /// diagnostics; the job holds the parameters that parsed.
    pub fn to_encode_job(
        &self,
        key: Option<PackageKey>,
        created: DateTime<Utc>,
    ) -> Result<(EncodeJob, ParseOutcome), ProjectError> {
        let shader_code = self.shader_code()?;
        let mut outcome = self.parameters(&ParamParser::new())?;
        let parameters = std::mem::take(&mut outcome.parameters);
        let job = EncodeJob {
            metadata: self.metadata(created),
            shader_code,
            image_paths: self.image_paths(),
            parameters,
            key,
        };
        Ok((job, outcome))
    }
}
