use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::CorkboardError;

/// Matches a ticket code at the start of a string: project code followed by
/// a number. The number may be zero-padded on disk (`MDT-004`); the canonical
/// form has no leading zeros.
static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9]{1,4})-(\d+)").expect("code regex compiles"));

/// Matches a full, already-uppercased project code.
static PROJECT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9]{1,4}$").expect("project code regex compiles"));

/// Validate a project code: 2-5 uppercase alphanumerics, starting with a letter.
pub fn validate_project_code(code: &str) -> crate::error::Result<()> {
    if PROJECT_CODE_RE.is_match(code) {
        Ok(())
    } else {
        Err(CorkboardError::InvalidProjectCode(
            code.to_string(),
            "expected 2-5 uppercase alphanumerics starting with a letter".to_string(),
        ))
    }
}

/// A project-scoped ticket code, e.g. `MDT-4`.
///
/// Parsing is tolerant: lowercase input and zero-padded numbers are accepted
/// and normalized. Display always produces the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketCode {
    pub project: String,
    pub number: u32,
}

impl TicketCode {
    pub fn new(project: &str, number: u32) -> crate::error::Result<Self> {
        let project = project.to_uppercase();
        validate_project_code(&project)?;
        if number == 0 {
            return Err(CorkboardError::InvalidTicketCode(format!(
                "{project}-{number}"
            )));
        }
        Ok(TicketCode { project, number })
    }

    /// Extract the filename-encoded code from a file stem like
    /// `MDT-004-dark-mode-toggle`. Anything after the number is a slug.
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        let caps = CODE_RE.captures(stem)?;
        let project = caps.get(1)?.as_str().to_uppercase();
        let number: u32 = caps.get(2)?.as_str().parse().ok()?;
        if number == 0 || !PROJECT_CODE_RE.is_match(&project) {
            return None;
        }
        Some(TicketCode { project, number })
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.project, self.number)
    }
}

impl FromStr for TicketCode {
    type Err = CorkboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = CODE_RE
            .captures(trimmed)
            .ok_or_else(|| CorkboardError::InvalidTicketCode(s.to_string()))?;
        // The regex must consume the whole string, not just a prefix.
        if caps.get(0).map(|m| m.len()) != Some(trimmed.len()) {
            return Err(CorkboardError::InvalidTicketCode(s.to_string()));
        }
        let project = caps[1].to_uppercase();
        let number: u32 = caps[2]
            .parse()
            .map_err(|_| CorkboardError::InvalidTicketCode(s.to_string()))?;
        if number == 0 {
            return Err(CorkboardError::InvalidTicketCode(s.to_string()));
        }
        Ok(TicketCode { project, number })
    }
}

/// Ticket workflow status. Variant order is workflow order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash,
)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    #[default]
    Proposed,
    Approved,
    InProgress,
    Implemented,
    OnHold,
    Rejected,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketStatus::Proposed => write!(f, "proposed"),
            TicketStatus::Approved => write!(f, "approved"),
            TicketStatus::InProgress => write!(f, "in-progress"),
            TicketStatus::Implemented => write!(f, "implemented"),
            TicketStatus::OnHold => write!(f, "on-hold"),
            TicketStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for TicketStatus {
    type Err = CorkboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "proposed" => Ok(TicketStatus::Proposed),
            "approved" => Ok(TicketStatus::Approved),
            "in-progress" | "in progress" => Ok(TicketStatus::InProgress),
            "implemented" => Ok(TicketStatus::Implemented),
            "on-hold" | "on hold" => Ok(TicketStatus::OnHold),
            "rejected" => Ok(TicketStatus::Rejected),
            _ => Err(CorkboardError::InvalidStatus(s.to_string())),
        }
    }
}

pub const VALID_STATUSES: &[&str] = &[
    "proposed",
    "approved",
    "in-progress",
    "implemented",
    "on-hold",
    "rejected",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TicketType {
    #[default]
    Feature,
    Bug,
    TechDebt,
    Architecture,
    Docs,
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketType::Feature => write!(f, "feature"),
            TicketType::Bug => write!(f, "bug"),
            TicketType::TechDebt => write!(f, "tech-debt"),
            TicketType::Architecture => write!(f, "architecture"),
            TicketType::Docs => write!(f, "docs"),
        }
    }
}

impl FromStr for TicketType {
    type Err = CorkboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "feature" => Ok(TicketType::Feature),
            "bug" => Ok(TicketType::Bug),
            "tech-debt" | "tech debt" => Ok(TicketType::TechDebt),
            "architecture" => Ok(TicketType::Architecture),
            "docs" | "documentation" => Ok(TicketType::Docs),
            _ => Err(CorkboardError::InvalidType(s.to_string())),
        }
    }
}

pub const VALID_TYPES: &[&str] = &["feature", "bug", "tech-debt", "architecture", "docs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketPriority::Low => write!(f, "low"),
            TicketPriority::Medium => write!(f, "medium"),
            TicketPriority::High => write!(f, "high"),
            TicketPriority::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for TicketPriority {
    type Err = CorkboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(TicketPriority::Low),
            "medium" => Ok(TicketPriority::Medium),
            "high" => Ok(TicketPriority::High),
            "critical" => Ok(TicketPriority::Critical),
            _ => Err(CorkboardError::InvalidPriority(s.to_string())),
        }
    }
}

pub const VALID_PRIORITIES: &[&str] = &["low", "medium", "high", "critical"];

/// Frontmatter-backed ticket metadata.
///
/// `code` is kept as the raw embedded string so that a mismatch between the
/// filename-encoded code and the embedded code can be surfaced instead of
/// silently normalized away.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip)]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<TicketType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TicketPriority>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,

    #[serde(default, rename = "depends-on", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    #[serde(skip)]
    pub file_path: Option<PathBuf>,
}

impl TicketMetadata {
    /// Parse the embedded code string, if present and well-formed.
    pub fn parsed_code(&self) -> Option<TicketCode> {
        self.code.as_deref().and_then(|c| c.parse().ok())
    }
}
