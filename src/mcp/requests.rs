//! MCP tool request types and input validation.
//!
//! Request parameter structs for all MCP tools, with validation that runs
//! before any filesystem access.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

/// Maximum length for ticket titles (in characters).
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length for section content and descriptions (in characters).
pub const MAX_CONTENT_LENGTH: usize = 50_000;

fn validate_title(title: &str) -> Result<(), String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("Title must not be empty".to_string());
    }
    if trimmed.chars().count() > MAX_TITLE_LENGTH {
        return Err(format!("Title exceeds {MAX_TITLE_LENGTH} characters"));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err("Title must not contain control characters".to_string());
    }
    Ok(())
}

fn validate_content(content: &str, what: &str) -> Result<(), String> {
    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(format!("{what} exceeds {MAX_CONTENT_LENGTH} characters"));
    }
    Ok(())
}

/// Request parameters for listing registered projects.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ListProjectsRequest {
    /// Include deactivated projects (default: false)
    #[schemars(description = "Include deactivated projects in the listing")]
    pub all: Option<bool>,
}

/// Request parameters for fetching a full ticket.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GetTicketRequest {
    /// Ticket key, e.g. MDT-66 (case-insensitive, zero padding tolerated)
    #[schemars(description = "Ticket key like MDT-66; case and zero padding are normalized")]
    pub key: String,
}

/// Request parameters for listing a ticket's sections.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ListSectionsRequest {
    #[schemars(description = "Ticket key like MDT-66")]
    pub key: String,
}

/// Request parameters for reading one section.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GetSectionRequest {
    #[schemars(description = "Ticket key like MDT-66")]
    pub key: String,

    /// Exact header text, or a hierarchical path joined with ' > '
    #[schemars(
        description = "Section reference: exact header text (e.g. 'Description') or a hierarchical path (e.g. 'Implementation > Testing')"
    )]
    pub section: String,
}

/// Request parameters for editing one section.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct UpdateSectionRequest {
    #[schemars(description = "Ticket key like MDT-66")]
    pub key: String,

    #[schemars(
        description = "Section reference: exact header text or a ' > '-joined hierarchical path"
    )]
    pub section: String,

    /// New content for the section
    #[schemars(description = "Content to write into the section")]
    pub content: String,

    /// Edit mode: replace (default), append, or prepend
    #[schemars(description = "How to place the content: replace, append, or prepend")]
    pub mode: Option<String>,
}

impl UpdateSectionRequest {
    pub(crate) fn validate(&self) -> Result<(), String> {
        validate_content(&self.content, "Section content")
    }
}

/// Request parameters for allocating the next ticket number.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct NextNumberRequest {
    #[schemars(description = "Project code, e.g. MDT")]
    pub project: String,
}

/// Request parameters for scanning a project for duplicate codes.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct FindDuplicatesRequest {
    #[schemars(description = "Project code, e.g. MDT")]
    pub project: String,
}

/// Request parameters for previewing a duplicate rename.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct PreviewRenameRequest {
    #[schemars(description = "Project code, e.g. MDT")]
    pub project: String,

    /// Path of the duplicate file, as reported by find_duplicates
    #[schemars(description = "Path of the duplicate ticket file")]
    pub file: String,
}

/// Request parameters for resolving one duplicate file.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ResolveDuplicateRequest {
    #[schemars(description = "Project code, e.g. MDT")]
    pub project: String,

    /// Path of the duplicate file to act on, as reported by find_duplicates
    #[schemars(description = "Path of the duplicate ticket file")]
    pub file: String,

    /// Resolution action: rename (assign next free number) or delete
    #[schemars(description = "Action: 'rename' or 'delete'")]
    pub action: String,
}

/// Request parameters for creating a new ticket.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CreateTicketRequest {
    #[schemars(description = "Project code, e.g. MDT")]
    pub project: String,

    /// Title of the ticket (required)
    #[schemars(description = "The title for the new ticket (max 200 chars, non-empty)")]
    pub title: String,

    /// Ticket type: feature, bug, tech-debt, architecture, or docs
    #[schemars(description = "Type: feature, bug, tech-debt, architecture, or docs")]
    #[serde(rename = "type")]
    pub ticket_type: Option<String>,

    /// Priority: low, medium, high, or critical
    #[schemars(description = "Priority: low, medium, high, or critical")]
    pub priority: Option<String>,

    /// Description/body content for the ticket
    #[schemars(description = "Optional description for the ticket body")]
    pub description: Option<String>,
}

impl CreateTicketRequest {
    pub(crate) fn validate(&self) -> Result<(), String> {
        validate_title(&self.title)?;
        if let Some(ref description) = self.description {
            validate_content(description, "Description")?;
        }
        Ok(())
    }
}
