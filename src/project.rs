//! Project descriptors and the global project registry.
//!
//! A project is a code prefix plus a root directory holding ticket files.
//! The registry is a directory of small YAML descriptor files, one per
//! project; descriptors are independently created, edited, and deleted —
//! sometimes by hand or by other tools — so loading is tolerant of files
//! that fail to parse.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CorkboardError, Result};
use crate::paths::registry_dir;
use crate::types::validate_project_code;

/// Filename of the per-project counter hint, relative to the project root.
pub const COUNTER_FILE: &str = ".corkboard-next";

/// Optional document-discovery settings for a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Glob-like paths to scan, relative to the project root.
    #[serde(default)]
    pub paths: Vec<String>,

    /// Folder names excluded from recursion.
    #[serde(default, rename = "exclude-folders")]
    pub exclude_folders: Vec<String>,

    /// Maximum recursion depth.
    #[serde(default, rename = "max-depth", skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
}

impl DiscoveryConfig {
    /// Reject absolute, parent-escaping, or empty paths before any
    /// filesystem access.
    pub fn validate(&self) -> Result<()> {
        for path in &self.paths {
            validate_relative(path)?;
        }
        for folder in &self.exclude_folders {
            if folder.is_empty() || folder.contains('/') || folder.contains('\\') {
                return Err(CorkboardError::InvalidDiscoveryPath(
                    folder.clone(),
                    "exclude entries must be plain folder names".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Validate that a configured path is relative and stays inside the project.
fn validate_relative(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(CorkboardError::InvalidDiscoveryPath(
            path.to_string(),
            "path must not be empty".to_string(),
        ));
    }
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(CorkboardError::InvalidDiscoveryPath(
            path.to_string(),
            "path must be relative".to_string(),
        ));
    }
    for component in p.components() {
        if matches!(component, Component::ParentDir) {
            return Err(CorkboardError::InvalidDiscoveryPath(
                path.to_string(),
                "path must not escape the project root".to_string(),
            ));
        }
    }
    Ok(())
}

/// A registered project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub code: String,
    pub name: String,

    /// Project root directory.
    pub path: PathBuf,

    /// Ticket directory, relative to `path`.
    #[serde(rename = "tickets-path")]
    pub tickets_path: String,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(
        default,
        rename = "document-discovery",
        skip_serializing_if = "Option::is_none"
    )]
    pub document_discovery: Option<DiscoveryConfig>,

    /// Where this descriptor was loaded from.
    #[serde(skip)]
    pub descriptor_path: Option<PathBuf>,
}

fn default_active() -> bool {
    true
}

impl Project {
    pub fn tickets_dir(&self) -> PathBuf {
        self.path.join(&self.tickets_path)
    }

    pub fn counter_file(&self) -> PathBuf {
        self.path.join(COUNTER_FILE)
    }

    /// Validate code and configured paths. Runs before anything touches the
    /// filesystem.
    pub fn validate(&self) -> Result<()> {
        validate_project_code(&self.code)?;
        validate_relative(&self.tickets_path)?;
        if let Some(discovery) = &self.document_discovery {
            discovery.validate()?;
        }
        Ok(())
    }
}

/// The global registry: a directory of per-project descriptor files.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    dir: PathBuf,
}

impl ProjectRegistry {
    /// Open a registry at an explicit directory (tests point this at a
    /// temp dir).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ProjectRegistry { dir: dir.into() }
    }

    /// Open the registry at the default location.
    pub fn open_default() -> Self {
        ProjectRegistry {
            dir: registry_dir(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every parseable descriptor in the registry directory.
    ///
    /// Descriptors that fail to parse or validate are skipped with a
    /// warning; one broken file must not take the registry down.
    pub fn load_all(&self) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        if !self.dir.exists() {
            return Ok(projects);
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| {
            CorkboardError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read registry at {}: {}", self.dir.display(), e),
            ))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "yaml" && ext != "yml") {
                continue;
            }
            match Self::load_descriptor(&path) {
                Ok(project) => projects.push(project),
                Err(e) => {
                    eprintln!(
                        "Warning: skipping unreadable project descriptor {}: {e}",
                        path.display()
                    );
                }
            }
        }

        projects.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(projects)
    }

    /// Load and validate a single descriptor file.
    pub fn load_descriptor(path: &Path) -> Result<Project> {
        let content = fs::read_to_string(path).map_err(|e| {
            CorkboardError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read descriptor at {}: {}", path.display(), e),
            ))
        })?;
        let mut project: Project = serde_yaml_ng::from_str(&content)?;
        project.validate()?;
        project.descriptor_path = Some(path.to_path_buf());
        Ok(project)
    }

    /// Find an active-or-not project by code (case-insensitive).
    pub fn get(&self, code: &str) -> Result<Project> {
        let wanted = code.to_uppercase();
        self.load_all()?
            .into_iter()
            .find(|p| p.code == wanted)
            .ok_or(CorkboardError::ProjectNotFound(wanted))
    }

    /// Write a project descriptor, creating the registry directory if needed.
    pub fn save(&self, project: &Project) -> Result<()> {
        project.validate()?;
        fs::create_dir_all(&self.dir).map_err(|e| {
            CorkboardError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create registry directory at {}: {}",
                    self.dir.display(),
                    e
                ),
            ))
        })?;
        let path = self.descriptor_path_for(&project.code);
        let content = serde_yaml_ng::to_string(project)?;
        fs::write(&path, content).map_err(|e| {
            CorkboardError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write descriptor at {}: {}", path.display(), e),
            ))
        })?;
        Ok(())
    }

    /// Flip a project's active flag and persist it.
    pub fn set_active(&self, code: &str, active: bool) -> Result<()> {
        let mut project = self.get(code)?;
        project.active = active;
        self.save(&project)
    }

    pub fn descriptor_path_for(&self, code: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", code.to_lowercase()))
    }
}
