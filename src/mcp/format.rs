//! Markdown formatting for MCP tool responses.
//!
//! Everything here renders to markdown optimized for LLM consumption; the
//! raw structures stay in the core modules.

use crate::numbering::{DuplicateReport, RenamePreview, Resolution};
use crate::project::Project;
use crate::sections::Section;
use crate::ticket::Ticket;

pub fn format_projects(projects: &[Project], include_inactive: bool) -> String {
    let mut out = String::from("# Projects\n\n");
    let mut shown = 0;
    for project in projects {
        if !project.active && !include_inactive {
            continue;
        }
        shown += 1;
        out.push_str(&format!(
            "- **{}** — {} ({}){}\n",
            project.code,
            project.name,
            project.tickets_dir().display(),
            if project.active { "" } else { " [inactive]" },
        ));
    }
    if shown == 0 {
        out.push_str("No projects registered.\n");
    }
    out
}

pub fn format_ticket(ticket: &Ticket) -> String {
    let metadata = &ticket.metadata;
    let code = metadata.code.as_deref().unwrap_or("(no code)");
    let title = metadata.title.as_deref().unwrap_or("(untitled)");

    let mut out = format!("# {code}: {title}\n\n");
    out.push_str(&format!(
        "**Status:** {} | **Type:** {} | **Priority:** {}\n",
        metadata.status.unwrap_or_default(),
        metadata.ticket_type.unwrap_or_default(),
        metadata.priority.unwrap_or_default(),
    ));
    if let Some(created) = &metadata.created {
        out.push_str(&format!("**Created:** {created}\n"));
    }
    if !metadata.depends_on.is_empty() {
        out.push_str(&format!(
            "**Depends on:** {}\n",
            metadata.depends_on.join(", ")
        ));
    }
    if !metadata.blocks.is_empty() {
        out.push_str(&format!("**Blocks:** {}\n", metadata.blocks.join(", ")));
    }
    if !metadata.related.is_empty() {
        out.push_str(&format!("**Related:** {}\n", metadata.related.join(", ")));
    }
    out.push_str(&format!("**File:** {}\n\n---\n\n", ticket.path.display()));
    out.push_str(&ticket.body());
    out
}

pub fn format_sections(key: &str, sections: &[Section]) -> String {
    if sections.is_empty() {
        return format!("Ticket {key} has no sections.\n");
    }
    let mut out = format!("# Sections of {key}\n\n");
    for section in sections {
        out.push_str(&format!(
            "- {} `{}` (lines {}-{})\n",
            "#".repeat(section.level as usize),
            section.path_string(),
            section.start_line + 1,
            section.end_line,
        ));
    }
    out
}

pub fn format_section(key: &str, section: &Section) -> String {
    format!(
        "**Section:** {} (level {}, lines {}-{}) of {key}\n\n---\n{}---\n",
        section.path_string(),
        section.level,
        section.start_line + 1,
        section.end_line,
        section.content,
    )
}

pub fn format_duplicates(project: &str, report: &DuplicateReport) -> String {
    if report.is_clean() {
        return format!("No duplicate ticket codes found in {project}.\n");
    }

    let mut out = format!("# Duplicate report for {project}\n\n");
    for group in &report.groups {
        out.push_str(&format!(
            "## {} ({} files)\n\n",
            group.code,
            group.files.len()
        ));
        for file in &group.files {
            out.push_str(&format!(
                "- `{}` — {}{}\n",
                file.path.display(),
                file.title.as_deref().unwrap_or("(no title)"),
                match &file.embedded_code {
                    Some(code) => format!(" (embedded code: {code})"),
                    None => " (no embedded code)".to_string(),
                },
            ));
        }
        out.push('\n');
    }

    if !report.mismatches.is_empty() {
        out.push_str("## Filename/embedded code mismatches\n\n");
        for mismatch in &report.mismatches {
            out.push_str(&format!(
                "- `{}`: filename says {}, frontmatter says {}\n",
                mismatch.path.display(),
                mismatch.filename_code,
                mismatch.embedded_code,
            ));
        }
    }
    out
}

pub fn format_rename_preview(preview: &RenamePreview) -> String {
    format!(
        "Rename preview: {} -> {} ({} -> {})\n",
        preview.old_code, preview.new_code, preview.old_filename, preview.new_filename,
    )
}

pub fn format_resolution(resolution: &Resolution) -> String {
    match resolution {
        Resolution::Renamed(preview) => format!(
            "Renamed {} to {} ({} -> {}).\n",
            preview.old_code, preview.new_code, preview.old_filename, preview.new_filename,
        ),
        Resolution::Deleted { path } => format!("Deleted {}.\n", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::ticket_from_content;
    use std::path::Path;

    #[test]
    fn test_format_ticket_includes_attributes_and_body() {
        let content = "---\ncode: MDT-4\nstatus: in-progress\ntype: feature\npriority: high\ndepends-on: [MDT-2]\ncreated: 2025-11-02T09:30:00Z\n---\n# Dark mode\n\nBody here.\n".to_string();
        let ticket = ticket_from_content(Path::new("/p/MDT-4-dark.md"), content).unwrap();
        let out = format_ticket(&ticket);
        assert!(out.contains("# MDT-4: Dark mode"));
        assert!(out.contains("**Status:** in-progress"));
        assert!(out.contains("**Depends on:** MDT-2"));
        assert!(out.contains("Body here."));
    }

    #[test]
    fn test_format_sections_shows_hierarchy() {
        let sections = crate::sections::list_sections("# T\n\n## A\n\n### B\n");
        let out = format_sections("MDT-1", &sections);
        assert!(out.contains("`T > A > B`"));
    }
}
