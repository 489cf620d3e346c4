//! MCP (Model Context Protocol) server for corkboard.
//!
//! Exposes the live ticket store to AI agents over STDIO transport.
//!
//! # Architecture
//!
//! - `mod.rs` - Server setup and initialization
//! - `tools.rs` - Tool implementations
//! - `requests.rs` - Tool request types and validation
//! - `format.rs` - Markdown formatting of tool responses
//!
//! # Usage
//!
//! ```bash
//! corkboard mcp    # Start MCP server (STDIO transport)
//! ```

pub mod format;
pub mod requests;
pub mod tools;

use std::sync::Arc;

use rmcp::{
    RoleServer, ServerHandler, ServiceExt,
    handler::server::tool::ToolCallContext,
    model::{
        CallToolRequestParam, CallToolResult, ErrorData, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    transport::stdio,
};

use crate::error::{CorkboardError, Result};
use crate::store::Store;
use tools::CorkboardTools;

pub const SERVER_NAME: &str = "corkboard";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

impl ServerHandler for CorkboardTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Corkboard MCP server provides access to markdown ticket projects. \
                 Tickets are markdown files with YAML frontmatter, organized into \
                 projects with codes like MDT; ticket keys look like MDT-66. \
                 \n\nAvailable tools:\n\
                  - list_projects: List registered projects\n\
                  - get_ticket: Get full ticket content and relationships\n\
                  - list_sections: List a ticket's sections with hierarchy\n\
                  - get_section: Read one section (exact text or 'A > B' path)\n\
                  - update_section: Replace/append/prepend within a section\n\
                  - next_number: Allocate the next ticket number for a project\n\
                  - find_duplicates: Report duplicate codes and mismatches\n\
                  - preview_rename: Preview a duplicate rename without acting\n\
                  - resolve_duplicate: Rename or delete one duplicate file\n\
                  - create_ticket: Create a new ticket"
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
                title: None,
                description: None,
                icons: None,
                website_url: None,
            },
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _pagination: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        let items = self.router().list_all();
        Ok(ListToolsResult::with_all_items(items))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let tcc = ToolCallContext::new(self, request, context);
        self.router().call(tcc).await
    }
}

/// Start the MCP server with STDIO transport.
///
/// Starts the store's change detector first so tool responses reflect live
/// filesystem state, then blocks until the client disconnects.
pub async fn serve(store: Arc<Store>) -> Result<()> {
    // Log startup to stderr (stdout is the transport)
    eprintln!("Starting corkboard MCP server...");

    if let Err(e) = store.start_watching() {
        eprintln!("Warning: failed to start filesystem watcher: {e}");
    }

    let server = CorkboardTools::new(store);

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| CorkboardError::McpServer(format!("Failed to start: {e}")))?;

    service
        .waiting()
        .await
        .map_err(|e| CorkboardError::McpServer(format!("Server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::project::ProjectRegistry;

    #[test]
    fn test_server_info() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(Store::open(
            ProjectRegistry::new(tmp.path().join("projects")),
            Config::default(),
        ));
        let server = CorkboardTools::new(store);
        let info = server.get_info();

        assert!(info.instructions.is_some());
        let instructions = info.instructions.unwrap();
        assert!(instructions.contains("get_ticket"));
        assert!(instructions.contains("update_section"));
        assert!(instructions.contains("resolve_duplicate"));
        assert_eq!(info.server_info.name, SERVER_NAME);
        assert_eq!(info.server_info.version, SERVER_VERSION);
    }
}
