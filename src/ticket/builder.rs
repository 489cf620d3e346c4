use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{CorkboardError, Result};
use crate::numbering;
use crate::project::Project;
use crate::types::{TicketCode, TicketPriority, TicketStatus, TicketType};
use crate::utils::{iso_now, slugify};

/// Attempts before giving up when racing writers keep taking our number.
const MAX_CREATE_ATTEMPTS: u32 = 8;

/// Builds and writes a new ticket file.
///
/// Number allocation is scan-based and stateless, so two builders racing on
/// the same project can compute the same number. The `create_new` open is
/// the serialization point: the loser sees `AlreadyExists` and re-runs
/// allocation against the directory the winner just extended.
pub struct TicketBuilder {
    title: String,
    description: Option<String>,
    ticket_type: Option<String>,
    priority: Option<String>,
    status: Option<String>,
    created: Option<String>,
}

impl TicketBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        TicketBuilder {
            title: title.into(),
            description: None,
            ticket_type: None,
            priority: None,
            status: None,
            created: None,
        }
    }

    pub fn description(mut self, description: Option<impl Into<String>>) -> Self {
        self.description = description.map(|d| d.into());
        self
    }

    pub fn ticket_type(mut self, ticket_type: impl Into<String>) -> Self {
        self.ticket_type = Some(ticket_type.into());
        self
    }

    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn created(mut self, created: Option<impl Into<String>>) -> Self {
        self.created = created.map(|c| c.into());
        self
    }

    /// Allocate a number, render the file, and write it into the project's
    /// ticket directory.
    pub fn build(self, project: &Project) -> Result<(TicketCode, PathBuf)> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(CorkboardError::Other(
                "ticket title must not be empty".to_string(),
            ));
        }

        let status = self.status.unwrap_or_else(|| "proposed".to_string());
        let ticket_type = self.ticket_type.unwrap_or_else(|| "feature".to_string());
        let priority = self.priority.unwrap_or_else(|| "medium".to_string());

        TicketStatus::from_str(&status)?;
        TicketType::from_str(&ticket_type)?;
        TicketPriority::from_str(&priority)?;

        let created = self.created.unwrap_or_else(iso_now);
        let slug = slugify(title);

        let dir = project.tickets_dir();
        std::fs::create_dir_all(&dir).map_err(|e| {
            CorkboardError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create ticket directory {}: {}",
                    dir.display(),
                    e
                ),
            ))
        })?;

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let number = numbering::next_number(project)?;
            let code = TicketCode::new(&project.code, number)?;
            let filename = if slug.is_empty() {
                format!("{code}.md")
            } else {
                format!("{code}-{slug}.md")
            };
            let path = dir.join(filename);

            let content = render_ticket(&code, &status, &ticket_type, &priority, &created, title, self.description.as_deref());

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).map_err(|e| {
                        CorkboardError::Io(std::io::Error::new(
                            e.kind(),
                            format!("Failed to write ticket at {}: {}", path.display(), e),
                        ))
                    })?;
                    return Ok((code, path));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    // A concurrent writer claimed this number; allocate again.
                    tracing::debug!("ticket number {number} taken, reallocating");
                    continue;
                }
                Err(e) => {
                    return Err(CorkboardError::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to create ticket at {}: {}", path.display(), e),
                    )));
                }
            }
        }

        Err(CorkboardError::AllocationFailed(format!(
            "gave up after {MAX_CREATE_ATTEMPTS} attempts, every allocated number was taken"
        )))
    }
}

fn render_ticket(
    code: &TicketCode,
    status: &str,
    ticket_type: &str,
    priority: &str,
    created: &str,
    title: &str,
    description: Option<&str>,
) -> String {
    let mut lines = vec![
        "---".to_string(),
        format!("code: {code}"),
        format!("status: {status}"),
        format!("type: {ticket_type}"),
        format!("priority: {priority}"),
        "related: []".to_string(),
        "depends-on: []".to_string(),
        "blocks: []".to_string(),
        format!("created: {created}"),
        "---".to_string(),
        format!("# {title}"),
    ];
    if let Some(description) = description {
        lines.push(String::new());
        lines.push("## Description".to_string());
        lines.push(String::new());
        lines.push(description.trim_end().to_string());
    }
    let mut content = lines.join("\n");
    content.push('\n');
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_ticket;
    use crate::types::TicketStatus;
    use tempfile::TempDir;

    fn make_project(tmp: &TempDir) -> Project {
        Project {
            code: "MDT".to_string(),
            name: "Markdown Ticket".to_string(),
            path: tmp.path().to_path_buf(),
            tickets_path: "tickets".to_string(),
            active: true,
            document_discovery: None,
            descriptor_path: None,
        }
    }

    #[test]
    fn test_build_writes_parseable_ticket() {
        let tmp = TempDir::new().unwrap();
        let project = make_project(&tmp);

        let (code, path) = TicketBuilder::new("Dark mode toggle")
            .description(Some("Let users pick a theme."))
            .ticket_type("feature")
            .priority("high")
            .build(&project)
            .unwrap();

        assert_eq!(code.to_string(), "MDT-1");
        assert!(path.ends_with("MDT-1-dark-mode-toggle.md"));

        let metadata = parse_ticket(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(metadata.code.as_deref(), Some("MDT-1"));
        assert_eq!(metadata.status, Some(TicketStatus::Proposed));
        assert_eq!(metadata.title.as_deref(), Some("Dark mode toggle"));
    }

    #[test]
    fn test_build_sequential_numbers() {
        let tmp = TempDir::new().unwrap();
        let project = make_project(&tmp);

        let (first, _) = TicketBuilder::new("First").build(&project).unwrap();
        let (second, _) = TicketBuilder::new("Second").build(&project).unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
    }

    #[test]
    fn test_build_skips_taken_number() {
        let tmp = TempDir::new().unwrap();
        let project = make_project(&tmp);
        std::fs::create_dir_all(project.tickets_dir()).unwrap();

        // Simulate a racer that created MDT-1 with the exact same slug after
        // our scan would have run: pre-create the colliding filename.
        std::fs::write(
            project.tickets_dir().join("MDT-1-same.md"),
            "---\ncode: MDT-1\n---\n# Same\n",
        )
        .unwrap();

        let (code, _) = TicketBuilder::new("Same").build(&project).unwrap();
        assert_eq!(code.number, 2);
    }

    #[test]
    fn test_build_rejects_invalid_enum_values() {
        let tmp = TempDir::new().unwrap();
        let project = make_project(&tmp);
        assert!(
            TicketBuilder::new("Bad")
                .status("nonsense")
                .build(&project)
                .is_err()
        );
        assert!(TicketBuilder::new("  ").build(&project).is_err());
    }
}
