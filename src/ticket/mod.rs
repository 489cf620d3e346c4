//! Ticket files: reading, locating, and creating.

mod builder;

pub use builder::TicketBuilder;

use std::path::{Path, PathBuf};

use crate::error::{CorkboardError, Result};
use crate::parser::{parse_ticket, split_frontmatter};
use crate::project::Project;
use crate::types::{TicketCode, TicketMetadata};

/// A ticket loaded from disk.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub metadata: TicketMetadata,
    /// Raw file content, frontmatter included.
    pub content: String,
    pub path: PathBuf,
}

impl Ticket {
    /// The markdown body (everything after the frontmatter).
    pub fn body(&self) -> String {
        split_frontmatter(&self.content)
            .map(|(_, body)| body)
            .unwrap_or_else(|_| self.content.clone())
    }
}

/// Parse raw content into a `Ticket`.
pub fn ticket_from_content(path: &Path, content: String) -> Result<Ticket> {
    let mut metadata = parse_ticket(&content)?;
    metadata.file_path = Some(path.to_path_buf());
    Ok(Ticket {
        metadata,
        content,
        path: path.to_path_buf(),
    })
}

/// Locate a ticket file by its filename-encoded code.
///
/// The scan tolerates concurrent external mutation: a file listed one moment
/// may be gone the next, and the caller gets a clean not-found either way.
pub fn find_ticket_file(project: &Project, code: &TicketCode) -> Result<PathBuf> {
    let dir = project.tickets_dir();
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CorkboardError::TicketNotFound(code.to_string()));
        }
        Err(e) => {
            return Err(CorkboardError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to scan ticket directory {}: {}", dir.display(), e),
            )));
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "md") {
            continue;
        }
        let stem_code = path
            .file_stem()
            .and_then(|stem| TicketCode::from_file_stem(&stem.to_string_lossy()));
        if stem_code.as_ref() == Some(code) {
            return Ok(path);
        }
    }

    Err(CorkboardError::TicketNotFound(code.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_project(tmp: &TempDir) -> Project {
        let project = Project {
            code: "MDT".to_string(),
            name: "Markdown Ticket".to_string(),
            path: tmp.path().to_path_buf(),
            tickets_path: "tickets".to_string(),
            active: true,
            document_discovery: None,
            descriptor_path: None,
        };
        fs::create_dir_all(project.tickets_dir()).unwrap();
        project
    }

    #[test]
    fn test_find_ticket_file_tolerates_padding() {
        let tmp = TempDir::new().unwrap();
        let project = make_project(&tmp);
        fs::write(
            project.tickets_dir().join("MDT-004-padded.md"),
            "---\ncode: MDT-4\n---\n# Padded\n",
        )
        .unwrap();

        let code = TicketCode::new("MDT", 4).unwrap();
        let path = find_ticket_file(&project, &code).unwrap();
        assert!(path.ends_with("MDT-004-padded.md"));
    }

    #[test]
    fn test_find_ticket_file_not_found() {
        let tmp = TempDir::new().unwrap();
        let project = make_project(&tmp);
        let code = TicketCode::new("MDT", 1).unwrap();
        assert!(matches!(
            find_ticket_file(&project, &code),
            Err(CorkboardError::TicketNotFound(_))
        ));
    }

    #[test]
    fn test_ticket_body() {
        let content = "---\ncode: MDT-1\n---\n# Title\n\nBody text.\n".to_string();
        let ticket = ticket_from_content(Path::new("/x/MDT-1.md"), content).unwrap();
        assert_eq!(ticket.body(), "# Title\n\nBody text.\n");
        assert_eq!(ticket.metadata.title.as_deref(), Some("Title"));
    }
}
