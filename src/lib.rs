pub mod broadcast;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod mcp;
pub mod numbering;
pub mod parser;
pub mod paths;
pub mod project;
pub mod sections;
pub mod store;
pub mod ticket;
pub mod types;
pub mod utils;
pub mod watcher;

pub use broadcast::{Broadcaster, Subscription};
pub use cache::{DerivedCache, FileMetadata};
pub use config::Config;
pub use error::{CorkboardError, Result};
pub use events::{ChangeEvent, ChangeKind, PushKind, PushMessage};
pub use numbering::{
    DuplicateGroup, DuplicateReport, RenamePreview, Resolution, ResolveAction, find_duplicates,
    next_number, preview_rename, resolve,
};
pub use project::{DiscoveryConfig, Project, ProjectRegistry};
pub use sections::{EditMode, Section, SectionRef, apply_edit, find_section, list_sections};
pub use store::Store;
pub use ticket::{Ticket, TicketBuilder};
pub use types::{
    TicketCode, TicketMetadata, TicketPriority, TicketStatus, TicketType, VALID_PRIORITIES,
    VALID_STATUSES, VALID_TYPES,
};
pub use watcher::ChangeDetector;
