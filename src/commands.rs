//! CLI command implementations. Thin wrappers over the store.

use std::path::Path;
use std::sync::Arc;

use owo_colors::{OwoColorize, Stream::Stdout};

use crate::error::Result;
use crate::numbering::Resolution;
use crate::sections::{EditMode, SectionRef};
use crate::store::Store;
use crate::ticket::TicketBuilder;
use crate::types::TicketStatus;

/// List registered projects.
pub fn cmd_projects(store: &Store, all: bool) -> Result<()> {
    let projects = store.projects()?;
    let mut shown = 0;
    for project in &projects {
        if !project.active && !all {
            continue;
        }
        shown += 1;
        let code = format!("{:<5}", project.code);
        println!(
            "{}  {}  {}{}",
            code.if_supports_color(Stdout, |c| c.bold().to_string()),
            project.name,
            project.tickets_dir().display(),
            if project.active { "" } else { "  (inactive)" },
        );
    }
    if shown == 0 {
        println!("No projects registered. Add a descriptor under the registry directory.");
    }
    Ok(())
}

fn status_colored(status: TicketStatus) -> String {
    let text = status.to_string();
    match status {
        TicketStatus::Proposed => text
            .if_supports_color(Stdout, |s| s.blue().to_string())
            .to_string(),
        TicketStatus::Approved => text
            .if_supports_color(Stdout, |s| s.green().to_string())
            .to_string(),
        TicketStatus::InProgress => text
            .if_supports_color(Stdout, |s| s.yellow().to_string())
            .to_string(),
        TicketStatus::Implemented => text
            .if_supports_color(Stdout, |s| s.bright_green().to_string())
            .to_string(),
        TicketStatus::OnHold => text
            .if_supports_color(Stdout, |s| s.magenta().to_string())
            .to_string(),
        TicketStatus::Rejected => text
            .if_supports_color(Stdout, |s| s.red().to_string())
            .to_string(),
    }
}

/// Display one ticket: attributes header, then the body.
pub async fn cmd_show(store: &Store, key: &str) -> Result<()> {
    let ticket = store.get_ticket(key).await?;
    let metadata = &ticket.metadata;

    println!(
        "{} {} [ {} ]",
        metadata
            .code
            .as_deref()
            .unwrap_or("(no code)")
            .if_supports_color(Stdout, |c| c.bold().to_string()),
        metadata.title.as_deref().unwrap_or("(untitled)"),
        status_colored(metadata.status.unwrap_or_default()),
    );
    println!(
        "type: {}  priority: {}  created: {}",
        metadata.ticket_type.unwrap_or_default(),
        metadata.priority.unwrap_or_default(),
        metadata.created.as_deref().unwrap_or("-"),
    );
    if !metadata.depends_on.is_empty() {
        println!("depends-on: {}", metadata.depends_on.join(", "));
    }
    if !metadata.blocks.is_empty() {
        println!("blocks: {}", metadata.blocks.join(", "));
    }
    if !metadata.related.is_empty() {
        println!("related: {}", metadata.related.join(", "));
    }
    println!();
    print!("{}", ticket.body());
    Ok(())
}

/// List a ticket's sections, or print one section.
pub async fn cmd_sections(store: &Store, key: &str, section: Option<&str>) -> Result<()> {
    match section {
        Some(reference) => {
            let section = store.section(key, &SectionRef::parse(reference)).await?;
            print!("{}", section.content);
        }
        None => {
            for section in store.sections(key).await? {
                println!(
                    "{} {}",
                    "#".repeat(section.level as usize),
                    section.path_string()
                );
            }
        }
    }
    Ok(())
}

/// Edit one section of a ticket.
pub async fn cmd_edit_section(
    store: &Store,
    key: &str,
    reference: &str,
    mode: EditMode,
    content: &str,
) -> Result<()> {
    let section = store
        .edit_section(key, &SectionRef::parse(reference), mode, content)
        .await?;
    println!("Updated section '{}' of {key}.", section.path_string());
    Ok(())
}

/// Allocate and print the next ticket number.
pub fn cmd_next(store: &Store, project: &str) -> Result<()> {
    let number = store.next_number(project)?;
    println!("{number}");
    Ok(())
}

/// Report duplicates, optionally resolving one file.
pub fn cmd_duplicates(
    store: &Store,
    project: &str,
    resolve: Option<(crate::numbering::ResolveAction, &Path)>,
) -> Result<()> {
    if let Some((action, file)) = resolve {
        match store.resolve_duplicate(action, file, project)? {
            Resolution::Renamed(preview) => {
                println!(
                    "Renamed {} -> {} ({} -> {})",
                    preview.old_code, preview.new_code, preview.old_filename, preview.new_filename
                );
            }
            Resolution::Deleted { path } => println!("Deleted {}", path.display()),
        }
        return Ok(());
    }

    let report = store.find_duplicates(project)?;
    if report.is_clean() {
        println!("No duplicates in {}.", project.to_uppercase());
        return Ok(());
    }
    for group in &report.groups {
        println!(
            "{} ({} files):",
            group
                .code
                .if_supports_color(Stdout, |c| c.red().bold().to_string()),
            group.files.len()
        );
        for file in &group.files {
            println!(
                "  {}  {}",
                file.path.display(),
                file.title.as_deref().unwrap_or("(no title)")
            );
        }
    }
    for mismatch in &report.mismatches {
        println!(
            "{} {}: filename says {}, frontmatter says {}",
            "mismatch".if_supports_color(Stdout, |c| c.yellow().to_string()),
            mismatch.path.display(),
            mismatch.filename_code,
            mismatch.embedded_code,
        );
    }
    Ok(())
}

/// Create a ticket from the command line.
pub fn cmd_create(
    store: &Store,
    project: &str,
    title: &str,
    ticket_type: &str,
    priority: &str,
    description: Option<&str>,
) -> Result<()> {
    let builder = TicketBuilder::new(title)
        .ticket_type(ticket_type)
        .priority(priority)
        .description(description);
    let (code, path) = store.create_ticket(project, builder)?;
    println!("Created {code} at {}", path.display());
    Ok(())
}

/// Subscribe to the change stream and print NDJSON until interrupted.
pub async fn cmd_events(store: Arc<Store>) -> Result<()> {
    store.start_watching()?;
    let mut subscription = store.subscribe();
    while let Some(message) = subscription.recv().await {
        println!("{}", serde_json::to_string(&message)?);
    }
    Ok(())
}
