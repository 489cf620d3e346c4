use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CorkboardError, Result};
use crate::types::TicketMetadata;

/// Matches the frontmatter block at the start of a ticket file.
static FRONTMATTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^---\r?\n(.*?)\r?\n---\r?\n(.*)$").expect("frontmatter regex compiles")
});

/// Matches the first level-one heading in a body.
pub static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#\s+(.*)$").expect("title regex compiles"));

/// Split a ticket file into (frontmatter YAML, body).
///
/// The format is:
/// ```text
/// ---
/// key: value
/// ---
/// # Title
///
/// Body content...
/// ```
pub fn split_frontmatter(content: &str) -> Result<(String, String)> {
    let captures = FRONTMATTER_RE
        .captures(content)
        .ok_or_else(|| CorkboardError::InvalidFormat("missing YAML frontmatter".to_string()))?;

    let yaml = captures.get(1).map(|m| m.as_str()).unwrap_or("");
    let body = captures.get(2).map(|m| m.as_str()).unwrap_or("");
    Ok((yaml.to_string(), body.to_string()))
}

/// Parse a ticket file's content into `TicketMetadata`.
///
/// Frontmatter fields are deserialized with serde; the title comes from the
/// body's first `#` heading, never from the frontmatter.
pub fn parse_ticket(content: &str) -> Result<TicketMetadata> {
    let (yaml, body) = split_frontmatter(content)?;

    let mut metadata: TicketMetadata = serde_yaml_ng::from_str(&yaml)
        .map_err(|e| CorkboardError::InvalidFormat(format!("YAML parsing error: {e}")))?;
    metadata.title = extract_title(&body);

    Ok(metadata)
}

/// Extract the title from a body (first `#` heading), trimming a trailing CR.
pub fn extract_title(body: &str) -> Option<String> {
    TITLE_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('\r').trim().to_string())
}

/// Update a single field in the YAML frontmatter, preserving every other byte
/// of the file.
///
/// If the field exists its value line is rewritten in place (keeping that
/// line's own terminator); if it doesn't, it is appended as the last
/// frontmatter line. Used by duplicate resolution, which must not disturb
/// anything beyond the embedded code field.
pub fn update_frontmatter_field(content: &str, field: &str, value: &str) -> Result<String> {
    let mut lines: Vec<&str> = content.split_inclusive('\n').collect();

    let is_marker = |line: &str| {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        trimmed == "---"
    };

    if lines.is_empty() || !is_marker(lines[0]) {
        return Err(CorkboardError::InvalidFormat(
            "missing YAML frontmatter".to_string(),
        ));
    }

    let close = lines
        .iter()
        .skip(1)
        .position(|l| is_marker(l))
        .map(|i| i + 1)
        .ok_or_else(|| CorkboardError::InvalidFormat("unterminated frontmatter".to_string()))?;

    let prefix = format!("{field}:");
    let mut replacement: Option<(usize, String)> = None;
    for (i, line) in lines.iter().enumerate().take(close).skip(1) {
        if line.starts_with(&prefix) {
            let terminator: String = line
                .chars()
                .rev()
                .take_while(|c| *c == '\n' || *c == '\r')
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            replacement = Some((i, format!("{field}: {value}{terminator}")));
            break;
        }
    }

    let inserted;
    match replacement {
        Some((i, line)) => {
            inserted = line;
            lines[i] = &inserted;
        }
        None => {
            inserted = format!("{field}: {value}\n");
            lines.insert(close, &inserted);
        }
    }

    Ok(lines.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TicketPriority, TicketStatus, TicketType};

    #[test]
    fn test_parse_basic_ticket() {
        let content = r#"---
code: MDT-4
status: in-progress
type: feature
priority: high
related: []
depends-on: ["MDT-2"]
created: 2025-11-02T09:30:00Z
---
# Dark mode toggle

This is the description.
"#;

        let metadata = parse_ticket(content).unwrap();
        assert_eq!(metadata.code.as_deref(), Some("MDT-4"));
        assert_eq!(metadata.status, Some(TicketStatus::InProgress));
        assert_eq!(metadata.ticket_type, Some(TicketType::Feature));
        assert_eq!(metadata.priority, Some(TicketPriority::High));
        assert_eq!(metadata.title, Some("Dark mode toggle".to_string()));
        assert_eq!(metadata.depends_on, vec!["MDT-2"]);
        assert!(metadata.related.is_empty());
        assert!(metadata.blocks.is_empty());
    }

    #[test]
    fn test_parse_missing_frontmatter() {
        let content = "# No frontmatter\n\nJust content.";
        assert!(parse_ticket(content).is_err());
    }

    #[test]
    fn test_parse_crlf_line_endings() {
        let content = "---\r\ncode: MDT-7\r\nstatus: proposed\r\n---\r\n# CRLF Ticket\r\n";
        let metadata = parse_ticket(content).unwrap();
        assert_eq!(metadata.code.as_deref(), Some("MDT-7"));
        assert_eq!(metadata.title, Some("CRLF Ticket".to_string()));
    }

    #[test]
    fn test_parse_empty_relationship_keys() {
        let content = "---\ncode: MDT-9\nrelated:\ndepends-on:\nblocks:\n---\n# Empty lists\n";
        let metadata = parse_ticket(content).unwrap();
        assert!(metadata.related.is_empty());
        assert!(metadata.depends_on.is_empty());
        assert!(metadata.blocks.is_empty());
    }

    #[test]
    fn test_update_field_existing() {
        let content = "---\ncode: MDT-4\nstatus: proposed\n---\n# Title\n\nBody.\n";
        let updated = update_frontmatter_field(content, "code", "MDT-9").unwrap();
        assert_eq!(
            updated,
            "---\ncode: MDT-9\nstatus: proposed\n---\n# Title\n\nBody.\n"
        );
    }

    #[test]
    fn test_update_field_missing_appends() {
        let content = "---\ncode: MDT-4\n---\n# Title\n";
        let updated = update_frontmatter_field(content, "status", "approved").unwrap();
        assert_eq!(updated, "---\ncode: MDT-4\nstatus: approved\n---\n# Title\n");
    }

    #[test]
    fn test_update_field_preserves_crlf() {
        let content = "---\r\ncode: MDT-4\r\n---\r\n# Title\r\n";
        let updated = update_frontmatter_field(content, "code", "MDT-5").unwrap();
        assert_eq!(updated, "---\r\ncode: MDT-5\r\n---\r\n# Title\r\n");
    }

    #[test]
    fn test_update_field_body_dashes_untouched() {
        let content = "---\ncode: MDT-4\n---\n# Title\n\n---\nnot frontmatter\n---\n";
        let updated = update_frontmatter_field(content, "code", "MDT-5").unwrap();
        assert!(updated.contains("code: MDT-5"));
        assert!(updated.ends_with("# Title\n\n---\nnot frontmatter\n---\n"));
    }

    #[test]
    fn test_update_field_no_frontmatter_errors() {
        let content = "# Just a title\n";
        assert!(update_frontmatter_field(content, "code", "MDT-1").is_err());
    }
}
