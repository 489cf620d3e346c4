use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use corkboard::commands::{
    cmd_create, cmd_duplicates, cmd_edit_section, cmd_events, cmd_next, cmd_projects,
    cmd_sections, cmd_show,
};
use corkboard::error::CorkboardError;
use corkboard::sections::EditMode;
use corkboard::store::Store;
use corkboard::types::{VALID_PRIORITIES, VALID_TYPES};

#[derive(Parser)]
#[command(name = "corkboard")]
#[command(about = "Live markdown ticket store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered projects
    Projects {
        /// Include deactivated projects
        #[arg(long)]
        all: bool,
    },

    /// Display a ticket
    Show {
        /// Ticket key, e.g. MDT-66 (case-insensitive)
        key: String,
    },

    /// Create a new ticket
    Create {
        /// Project code, e.g. MDT
        project: String,

        /// Ticket title
        title: String,

        /// Type: feature, bug, tech-debt, architecture, docs
        #[arg(short = 't', long = "type", default_value = "feature")]
        ticket_type: String,

        /// Priority: low, medium, high, critical
        #[arg(short, long, default_value = "medium")]
        priority: String,

        /// Description text
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List a ticket's sections, or print one
    Sections {
        /// Ticket key, e.g. MDT-66
        key: String,

        /// Section reference (exact text or 'A > B' path)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Edit one section of a ticket
    EditSection {
        /// Ticket key, e.g. MDT-66
        key: String,

        /// Section reference (exact text or 'A > B' path)
        section: String,

        /// New content (reads stdin if omitted)
        content: Option<String>,

        /// Edit mode: replace, append, or prepend
        #[arg(short, long, default_value = "replace")]
        mode: EditModeArg,
    },

    /// Print the next ticket number for a project
    Next {
        /// Project code, e.g. MDT
        project: String,
    },

    /// Report duplicate ticket codes, optionally resolving one file
    Duplicates {
        /// Project code, e.g. MDT
        project: String,

        /// Resolution action: rename or delete
        #[arg(long, requires = "file")]
        resolve: Option<String>,

        /// The duplicate file to act on
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Stream change events as NDJSON
    Events,

    /// Start the MCP server (STDIO transport)
    Mcp,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum EditModeArg {
    Replace,
    Append,
    Prepend,
}

impl From<EditModeArg> for EditMode {
    fn from(mode: EditModeArg) -> Self {
        match mode {
            EditModeArg::Replace => EditMode::Replace,
            EditModeArg::Append => EditMode::Append,
            EditModeArg::Prepend => EditMode::Prepend,
        }
    }
}

/// Exit codes: 1 = invalid input, 4 = not found, 6 = general error.
fn exit_code_for(error: &CorkboardError) -> u8 {
    match error {
        CorkboardError::InvalidTicketCode(_)
        | CorkboardError::InvalidProjectCode(_, _)
        | CorkboardError::InvalidDiscoveryPath(_, _)
        | CorkboardError::InvalidFormat(_)
        | CorkboardError::InvalidStatus(_)
        | CorkboardError::InvalidType(_)
        | CorkboardError::InvalidPriority(_)
        | CorkboardError::AmbiguousSection(_, _)
        | CorkboardError::BadSectionNesting(_, _) => 1,
        CorkboardError::TicketNotFound(_)
        | CorkboardError::ProjectNotFound(_)
        | CorkboardError::SectionNotFound(_) => 4,
        _ => 6,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let store = match Store::open_default() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(6);
        }
    };

    let result = match cli.command {
        Commands::Projects { all } => cmd_projects(&store, all),
        Commands::Show { key } => cmd_show(&store, &key).await,
        Commands::Create {
            project,
            title,
            ticket_type,
            priority,
            description,
        } => {
            if !VALID_TYPES.contains(&ticket_type.as_str()) {
                Err(CorkboardError::InvalidType(ticket_type))
            } else if !VALID_PRIORITIES.contains(&priority.as_str()) {
                Err(CorkboardError::InvalidPriority(priority))
            } else {
                cmd_create(
                    &store,
                    &project,
                    &title,
                    &ticket_type,
                    &priority,
                    description.as_deref(),
                )
            }
        }
        Commands::Sections { key, section } => {
            cmd_sections(&store, &key, section.as_deref()).await
        }
        Commands::EditSection {
            key,
            section,
            content,
            mode,
        } => {
            let content = match content {
                Some(content) => Ok(content),
                None => std::io::read_to_string(std::io::stdin()).map_err(CorkboardError::Io),
            };
            match content {
                Ok(content) => {
                    cmd_edit_section(&store, &key, &section, mode.into(), &content).await
                }
                Err(e) => Err(e),
            }
        }
        Commands::Next { project } => cmd_next(&store, &project),
        Commands::Duplicates {
            project,
            resolve,
            file,
        } => {
            let action = resolve.map(|action| action.parse()).transpose();
            match action {
                Ok(action) => cmd_duplicates(&store, &project, action.zip(file.as_deref())),
                Err(e) => Err(e),
            }
        }
        Commands::Events => cmd_events(Arc::clone(&store)).await,
        Commands::Mcp => corkboard::mcp::serve(Arc::clone(&store)).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}
