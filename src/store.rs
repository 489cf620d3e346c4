//! The live ticket store: registry + cache + change detection + fan-out.
//!
//! A `Store` owns one `DerivedCache`, one `Broadcaster`, and (once
//! `start_watching` is called) one `ChangeDetector` bound to the registry's
//! projects. Handlers and the MCP layer go through the store; they never
//! touch the components directly.
//!
//! The ticket directory has no isolation: files appear and disappear
//! underneath every operation here. Reads map a vanished file to a
//! not-found, and writes are last-write-wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::broadcast::{Broadcaster, Subscription};
use crate::cache::{DerivedCache, FileMetadata};
use crate::config::Config;
use crate::error::{CorkboardError, Result};
use crate::numbering::{self, DuplicateReport, RenamePreview, Resolution, ResolveAction};
use crate::project::{Project, ProjectRegistry};
use crate::sections::{self, EditMode, Section, SectionRef};
use crate::ticket::{self, Ticket, TicketBuilder};
use crate::types::TicketCode;
use crate::watcher::ChangeDetector;

pub struct Store {
    config: Config,
    registry: ProjectRegistry,
    cache: Arc<DerivedCache>,
    broadcaster: Arc<Broadcaster>,
    detector: Mutex<Option<ChangeDetector>>,
    heartbeat: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Store {
    /// Open a store over an explicit registry (tests use temp dirs).
    pub fn open(registry: ProjectRegistry, config: Config) -> Self {
        let cache = Arc::new(DerivedCache::from_config(&config));
        Store {
            config,
            registry,
            cache,
            broadcaster: Broadcaster::new(),
            detector: Mutex::new(None),
            heartbeat: Mutex::new(None),
        }
    }

    /// Open the default registry with the on-disk global config.
    pub fn open_default() -> Result<Self> {
        Ok(Self::open(ProjectRegistry::open_default(), Config::load()?))
    }

    /// Start the change detector and the heartbeat task. Idempotent.
    pub fn start_watching(&self) -> Result<()> {
        let mut detector = self.detector.lock();
        if detector.is_some() {
            return Ok(());
        }
        *detector = Some(ChangeDetector::start(
            &self.registry,
            Arc::clone(&self.cache),
            Arc::clone(&self.broadcaster),
            self.config.debounce(),
        )?);

        let mut heartbeat = self.heartbeat.lock();
        if heartbeat.is_none() {
            *heartbeat = Some(self.broadcaster.start_heartbeat(self.config.heartbeat()));
        }
        Ok(())
    }

    /// Stop watching and the heartbeat. Subscriptions stay registered but
    /// receive nothing further.
    pub fn stop_watching(&self) {
        if let Some(detector) = self.detector.lock().take() {
            detector.stop();
        }
        if let Some(heartbeat) = self.heartbeat.lock().take() {
            heartbeat.abort();
        }
    }

    /// Subscribe to the change event stream.
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn projects(&self) -> Result<Vec<Project>> {
        self.registry.load_all()
    }

    pub fn project(&self, code: &str) -> Result<Project> {
        self.registry.get(code)
    }

    // ------------------------------------------------------------------
    // Cache-backed read operations
    // ------------------------------------------------------------------

    pub async fn read_file(&self, path: &Path) -> Result<String> {
        self.cache
            .get_content(path)
            .await?
            .ok_or_else(|| CorkboardError::TicketNotFound(path.display().to_string()))
    }

    pub async fn file_metadata(&self, path: &Path) -> Result<FileMetadata> {
        self.cache
            .get_metadata(path)
            .await?
            .ok_or_else(|| CorkboardError::TicketNotFound(path.display().to_string()))
    }

    /// Invalidate one cached path. For components that write outside the
    /// store's own flow.
    pub fn invalidate(&self, path: &Path) {
        self.cache.invalidate(path);
    }

    // ------------------------------------------------------------------
    // Ticket operations
    // ------------------------------------------------------------------

    /// Resolve a ticket key like `mdt-66` to its project and file.
    pub fn locate(&self, key: &str) -> Result<(Project, TicketCode, PathBuf)> {
        let code: TicketCode = key.parse()?;
        let project = self.registry.get(&code.project)?;
        let path = ticket::find_ticket_file(&project, &code)?;
        Ok((project, code, path))
    }

    pub async fn get_ticket(&self, key: &str) -> Result<Ticket> {
        let (_, code, path) = self.locate(key)?;
        let content = self
            .cache
            .get_content(&path)
            .await?
            .ok_or_else(|| CorkboardError::TicketNotFound(code.to_string()))?;
        ticket::ticket_from_content(&path, content)
    }

    /// Create a ticket via the builder; broadcasts nothing itself — the
    /// detector observes the write and closes the loop.
    pub fn create_ticket(
        &self,
        project_code: &str,
        builder: TicketBuilder,
    ) -> Result<(TicketCode, PathBuf)> {
        let project = self.registry.get(project_code)?;
        let (code, path) = builder.build(&project)?;
        self.cache.invalidate(&path);
        Ok((code, path))
    }

    // ------------------------------------------------------------------
    // Section operations
    // ------------------------------------------------------------------

    pub async fn sections(&self, key: &str) -> Result<Vec<Section>> {
        let ticket = self.get_ticket(key).await?;
        Ok(sections::list_sections(&ticket.body()))
    }

    pub async fn section(&self, key: &str, section_ref: &SectionRef) -> Result<Section> {
        let ticket = self.get_ticket(key).await?;
        sections::resolve(&ticket.body(), section_ref)
    }

    /// Structure-preserving section edit: replace, append, or prepend within
    /// the section's boundaries, leaving all other bytes untouched.
    pub async fn edit_section(
        &self,
        key: &str,
        section_ref: &SectionRef,
        mode: EditMode,
        new_content: &str,
    ) -> Result<Section> {
        let (_, _, path) = self.locate(key)?;
        // Read from disk, not the cache: the edit must splice into the
        // current on-disk bytes even if a cached copy is fresh enough for
        // display purposes.
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CorkboardError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", path.display(), e),
            ))
        })?;

        let (_, body) = crate::parser::split_frontmatter(&content)?;
        let section = sections::resolve(&body, section_ref)?;
        let new_body = sections::apply_edit(&body, &section, mode, new_content);

        // Reassemble with the original frontmatter bytes (the body is a
        // suffix of the raw content).
        let frontmatter_len = content.len() - body.len();
        let mut updated = String::with_capacity(frontmatter_len + new_body.len());
        updated.push_str(&content[..frontmatter_len]);
        updated.push_str(&new_body);

        tokio::fs::write(&path, &updated).await.map_err(|e| {
            CorkboardError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write {}: {}", path.display(), e),
            ))
        })?;
        self.cache.invalidate(&path);

        sections::resolve(&new_body, section_ref)
    }

    // ------------------------------------------------------------------
    // Numbering operations
    // ------------------------------------------------------------------

    pub fn next_number(&self, project_code: &str) -> Result<u32> {
        let project = self.registry.get(project_code)?;
        numbering::next_number(&project)
    }

    pub fn find_duplicates(&self, project_code: &str) -> Result<DuplicateReport> {
        let project = self.registry.get(project_code)?;
        numbering::find_duplicates(&project)
    }

    pub fn preview_rename(&self, file: &Path, project_code: &str) -> Result<RenamePreview> {
        let project = self.registry.get(project_code)?;
        numbering::preview_rename(file, &project)
    }

    pub fn resolve_duplicate(
        &self,
        action: ResolveAction,
        file: &Path,
        project_code: &str,
    ) -> Result<Resolution> {
        let project = self.registry.get(project_code)?;
        let resolution = numbering::resolve(action, file, &project)?;
        self.cache.invalidate(file);
        if let Resolution::Renamed(preview) = &resolution {
            self.cache
                .invalidate(&file.with_file_name(&preview.new_filename));
        }
        Ok(resolution)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.stop_watching();
    }
}
