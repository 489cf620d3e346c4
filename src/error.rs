use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorkboardError {
    #[error("ticket '{0}' not found")]
    TicketNotFound(String),

    #[error("project '{0}' not found in registry")]
    ProjectNotFound(String),

    #[error("section '{0}' not found")]
    SectionNotFound(String),

    #[error("section path '{0}' is ambiguous: {1}")]
    AmbiguousSection(String, String),

    #[error("section path '{0}' has malformed nesting: {1}")]
    BadSectionNesting(String, String),

    #[error("invalid ticket code '{0}'")]
    InvalidTicketCode(String),

    #[error("invalid project code '{0}': {1}")]
    InvalidProjectCode(String, String),

    #[error("invalid discovery path '{0}': {1}")]
    InvalidDiscoveryPath(String, String),

    #[error("invalid ticket format: {0}")]
    InvalidFormat(String),

    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    #[error("invalid ticket type '{0}'")]
    InvalidType(String),

    #[error("invalid priority '{0}'")]
    InvalidPriority(String),

    #[error("failed to allocate ticket number: {0}")]
    AllocationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("MCP server error: {0}")]
    McpServer(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CorkboardError>;
