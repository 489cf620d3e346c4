//! MCP tool implementations.
//!
//! ## Available Tools
//!
//! | Tool | Description |
//! |------|-------------|
//! | `list_projects` | List registered projects |
//! | `get_ticket` | Get full ticket content and relationships |
//! | `list_sections` | List a ticket's sections with hierarchy |
//! | `get_section` | Read one section by text or hierarchical path |
//! | `update_section` | Replace/append/prepend content within a section |
//! | `next_number` | Allocate the next ticket number for a project |
//! | `find_duplicates` | Report duplicate ticket codes and code mismatches |
//! | `preview_rename` | Preview a duplicate rename without acting |
//! | `resolve_duplicate` | Rename or delete one duplicate file |
//! | `create_ticket` | Create a new ticket |

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use rmcp::handler::server::{tool::ToolRouter, wrapper::Parameters};

use crate::sections::{EditMode, SectionRef};
use crate::store::Store;
use crate::ticket::TicketBuilder;

use super::format::{
    format_duplicates, format_projects, format_rename_preview, format_resolution, format_section,
    format_sections, format_ticket,
};
use super::requests::{
    CreateTicketRequest, FindDuplicatesRequest, GetSectionRequest, GetTicketRequest,
    ListProjectsRequest, ListSectionsRequest, NextNumberRequest, PreviewRenameRequest,
    ResolveDuplicateRequest, UpdateSectionRequest,
};

// ============================================================================
// Tool Router Implementation
// ============================================================================

/// The corkboard MCP tool handler
#[derive(Clone)]
pub struct CorkboardTools {
    store: Arc<Store>,
    tool_router: ToolRouter<Self>,
}

/// Macro to register a tool with MCP.
/// Generates the ToolRoute boilerplate: extract args, deserialize, call impl, wrap result.
///
/// # Parameters
/// - `$router`: The ToolRouter to add the route to
/// - `$name`: Tool name string
/// - `$desc`: Tool description string
/// - `$req_type`: The request type for deserialization
/// - `$method`: The method to call on `self` that implements the tool logic
/// - `$optional`: `true` if arguments are optional (uses `unwrap_or_default`),
///   `false` if required (errors on missing args)
macro_rules! register_tool {
    ($router:expr, $name:expr, $desc:expr, $req_type:ty, $method:ident, $optional:expr) => {{
        use rmcp::handler::server::tool::ToolRoute;
        use rmcp::model::Tool;
        use rmcp::schemars::schema_for;
        use std::sync::Arc;

        let schema_value = serde_json::to_value(schema_for!($req_type)).unwrap();
        let schema_obj = match schema_value {
            serde_json::Value::Object(obj) => obj,
            _ => panic!("Schema must be an object"),
        };
        let tool = Tool::new($name.to_string(), $desc.to_string(), Arc::new(schema_obj));
        let route = ToolRoute::new_dyn(
            tool,
            |ctx: rmcp::handler::server::tool::ToolCallContext<'_, CorkboardTools>| {
                Box::pin(async move {
                    let this = ctx.service;
                    let args = if $optional {
                        ctx.arguments.unwrap_or_default()
                    } else {
                        ctx.arguments.ok_or(rmcp::model::ErrorData {
                            code: rmcp::model::ErrorCode::INVALID_PARAMS,
                            message: std::borrow::Cow::Borrowed("Missing arguments"),
                            data: None,
                        })?
                    };
                    let request: $req_type =
                        serde_json::from_value(serde_json::Value::Object(args)).map_err(|e| {
                            rmcp::model::ErrorData {
                                code: rmcp::model::ErrorCode::INVALID_PARAMS,
                                message: std::borrow::Cow::Owned(format!(
                                    "Invalid parameters: {e}"
                                )),
                                data: None,
                            }
                        })?;
                    match this.$method(Parameters(request)).await {
                        Ok(result) => Ok(rmcp::model::CallToolResult {
                            content: vec![rmcp::model::Content::text(result)],
                            structured_content: None,
                            is_error: None,
                            meta: None,
                        }),
                        Err(e) => Ok(rmcp::model::CallToolResult {
                            content: vec![rmcp::model::Content::text(e)],
                            structured_content: None,
                            is_error: Some(true),
                            meta: None,
                        }),
                    }
                })
            },
        );
        $router.add_route(route);
    }};
}

impl CorkboardTools {
    /// Create a new handler over a store, with all tools registered.
    pub fn new(store: Arc<Store>) -> Self {
        let mut router = ToolRouter::new();

        register_tool!(
            router,
            "list_projects",
            "List registered projects with their codes and ticket directories.",
            ListProjectsRequest,
            list_projects_impl,
            true
        );

        register_tool!(
            router,
            "get_ticket",
            "Get full ticket content including metadata, relationships, and body. Keys like 'mdt-66' are normalized.",
            GetTicketRequest,
            get_ticket_impl,
            false
        );

        register_tool!(
            router,
            "list_sections",
            "List a ticket's markdown sections in document order with hierarchical paths.",
            ListSectionsRequest,
            list_sections_impl,
            false
        );

        register_tool!(
            router,
            "get_section",
            "Read one section of a ticket by exact header text or a ' > '-joined hierarchical path.",
            GetSectionRequest,
            get_section_impl,
            false
        );

        register_tool!(
            router,
            "update_section",
            "Edit one section of a ticket. Mode is replace (default), append, or prepend; content outside the section is untouched.",
            UpdateSectionRequest,
            update_section_impl,
            false
        );

        register_tool!(
            router,
            "next_number",
            "Allocate the next safe ticket number for a project (scan-based, collision-free).",
            NextNumberRequest,
            next_number_impl,
            false
        );

        register_tool!(
            router,
            "find_duplicates",
            "Report duplicate ticket codes in a project, including filename/frontmatter code mismatches. Resolution is never automatic.",
            FindDuplicatesRequest,
            find_duplicates_impl,
            false
        );

        register_tool!(
            router,
            "preview_rename",
            "Preview the rename a resolve_duplicate 'rename' would perform, without acting.",
            PreviewRenameRequest,
            preview_rename_impl,
            false
        );

        register_tool!(
            router,
            "resolve_duplicate",
            "Resolve one duplicate ticket file: 'rename' assigns the next free number, 'delete' removes the file.",
            ResolveDuplicateRequest,
            resolve_duplicate_impl,
            false
        );

        register_tool!(
            router,
            "create_ticket",
            "Create a new ticket in a project. Returns the allocated code and file path.",
            CreateTicketRequest,
            create_ticket_impl,
            false
        );

        CorkboardTools {
            store,
            tool_router: router,
        }
    }

    pub fn router(&self) -> &ToolRouter<Self> {
        &self.tool_router
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // ========================================================================
    // Tool implementations
    // ========================================================================

    async fn list_projects_impl(
        &self,
        Parameters(request): Parameters<ListProjectsRequest>,
    ) -> Result<String, String> {
        let projects = self.store.projects().map_err(|e| e.to_string())?;
        Ok(format_projects(&projects, request.all.unwrap_or(false)))
    }

    async fn get_ticket_impl(
        &self,
        Parameters(request): Parameters<GetTicketRequest>,
    ) -> Result<String, String> {
        let ticket = self
            .store
            .get_ticket(&request.key)
            .await
            .map_err(|e| e.to_string())?;
        Ok(format_ticket(&ticket))
    }

    async fn list_sections_impl(
        &self,
        Parameters(request): Parameters<ListSectionsRequest>,
    ) -> Result<String, String> {
        let sections = self
            .store
            .sections(&request.key)
            .await
            .map_err(|e| e.to_string())?;
        Ok(format_sections(&request.key, &sections))
    }

    async fn get_section_impl(
        &self,
        Parameters(request): Parameters<GetSectionRequest>,
    ) -> Result<String, String> {
        let section_ref = SectionRef::parse(&request.section);
        let section = self
            .store
            .section(&request.key, &section_ref)
            .await
            .map_err(|e| e.to_string())?;
        Ok(format_section(&request.key, &section))
    }

    async fn update_section_impl(
        &self,
        Parameters(request): Parameters<UpdateSectionRequest>,
    ) -> Result<String, String> {
        request.validate()?;
        let mode = match &request.mode {
            Some(mode) => EditMode::from_str(mode).map_err(|e| e.to_string())?,
            None => EditMode::Replace,
        };
        let section_ref = SectionRef::parse(&request.section);
        let section = self
            .store
            .edit_section(&request.key, &section_ref, mode, &request.content)
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!(
            "Updated section '{}' of {} ({} mode).",
            section.path_string(),
            request.key,
            match mode {
                EditMode::Replace => "replace",
                EditMode::Append => "append",
                EditMode::Prepend => "prepend",
            },
        ))
    }

    async fn next_number_impl(
        &self,
        Parameters(request): Parameters<NextNumberRequest>,
    ) -> Result<String, String> {
        let number = self
            .store
            .next_number(&request.project)
            .map_err(|e| e.to_string())?;
        Ok(format!(
            "Next ticket number for {}: {number}",
            request.project.to_uppercase()
        ))
    }

    async fn find_duplicates_impl(
        &self,
        Parameters(request): Parameters<FindDuplicatesRequest>,
    ) -> Result<String, String> {
        let report = self
            .store
            .find_duplicates(&request.project)
            .map_err(|e| e.to_string())?;
        Ok(format_duplicates(&request.project.to_uppercase(), &report))
    }

    async fn preview_rename_impl(
        &self,
        Parameters(request): Parameters<PreviewRenameRequest>,
    ) -> Result<String, String> {
        let preview = self
            .store
            .preview_rename(Path::new(&request.file), &request.project)
            .map_err(|e| e.to_string())?;
        Ok(format_rename_preview(&preview))
    }

    async fn resolve_duplicate_impl(
        &self,
        Parameters(request): Parameters<ResolveDuplicateRequest>,
    ) -> Result<String, String> {
        let action = request.action.parse().map_err(
            |e: crate::error::CorkboardError| e.to_string(),
        )?;
        let resolution = self
            .store
            .resolve_duplicate(action, Path::new(&request.file), &request.project)
            .map_err(|e| e.to_string())?;
        Ok(format_resolution(&resolution))
    }

    async fn create_ticket_impl(
        &self,
        Parameters(request): Parameters<CreateTicketRequest>,
    ) -> Result<String, String> {
        request.validate()?;
        let mut builder = TicketBuilder::new(request.title.trim());
        if let Some(ticket_type) = &request.ticket_type {
            builder = builder.ticket_type(ticket_type.clone());
        }
        if let Some(priority) = &request.priority {
            builder = builder.priority(priority.clone());
        }
        builder = builder.description(request.description.as_deref());

        let (code, path) = self
            .store
            .create_ticket(&request.project, builder)
            .map_err(|e| e.to_string())?;
        Ok(format!(
            "Created **{code}**: \"{}\" at {}",
            request.title.trim(),
            path.display()
        ))
    }
}
