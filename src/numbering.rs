//! Ticket number allocation and duplicate-code repair.
//!
//! Allocation reconciles two sources: an authoritative scan of the ticket
//! directory and a persisted counter hint. The scan prevents reuse; the hint
//! only ratchets the result upward, which keeps numbering monotonic across
//! manual file deletions. Because allocation is stateless between calls, the
//! ticket-file write (with `create_new`) is the serialization point for
//! racing allocators — see `ticket::create_ticket`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{CorkboardError, Result};
use crate::parser::{parse_ticket, update_frontmatter_field};
use crate::project::Project;
use crate::types::TicketCode;

/// Compute the next safe ticket number for a project and persist the hint.
///
/// Returns `max(highest scanned number + 1, stored hint)`. A stale-low hint
/// loses to the scan; a stale-high hint wins, preserving monotonicity for
/// the lifetime of the counter file.
pub fn next_number(project: &Project) -> Result<u32> {
    let next = peek_next_number(project)?;
    write_hint(project, next + 1);
    Ok(next)
}

/// Compute the next number without persisting anything.
pub fn peek_next_number(project: &Project) -> Result<u32> {
    let scanned = scan_max(project)?;
    let hint = read_hint(project).unwrap_or(1);
    Ok((scanned + 1).max(hint))
}

/// Highest ticket number found by scanning existing filenames. Zero when
/// the directory is missing or holds no tickets for this project.
pub fn scan_max(project: &Project) -> Result<u32> {
    let dir = project.tickets_dir();
    let mut max = 0;
    for path in ticket_files(&dir)? {
        if let Some(code) = code_from_path(&path) {
            if code.project == project.code {
                max = max.max(code.number);
            }
        }
    }
    Ok(max)
}

fn read_hint(project: &Project) -> Option<u32> {
    let content = fs::read_to_string(project.counter_file()).ok()?;
    content.trim().parse().ok()
}

fn write_hint(project: &Project, next: u32) {
    let path = project.counter_file();
    if let Err(e) = fs::write(&path, format!("{next}\n")) {
        // The hint is an optimization; losing it only costs a rescan.
        tracing::warn!("failed to write counter hint {}: {e}", path.display());
    }
}

/// All `.md` files directly inside a ticket directory.
fn ticket_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => {
            return Err(CorkboardError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to scan ticket directory {}: {}", dir.display(), e),
            )));
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "md") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn code_from_path(path: &Path) -> Option<TicketCode> {
    path.file_stem()
        .and_then(|stem| TicketCode::from_file_stem(&stem.to_string_lossy()))
}

/// One file participating in a duplicate group.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateFile {
    pub path: PathBuf,
    pub title: Option<String>,
    /// The raw `code` field embedded in the frontmatter, if any.
    pub embedded_code: Option<String>,
}

/// Two or more files resolving to the same code.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub code: String,
    pub files: Vec<DuplicateFile>,
}

/// A file whose filename-encoded code disagrees with its embedded code.
/// Surfaced for repair, never silently resolved.
#[derive(Debug, Clone, Serialize)]
pub struct CodeMismatch {
    pub path: PathBuf,
    pub filename_code: String,
    pub embedded_code: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateReport {
    pub groups: Vec<DuplicateGroup>,
    pub mismatches: Vec<CodeMismatch>,
}

impl DuplicateReport {
    pub fn is_clean(&self) -> bool {
        self.groups.is_empty() && self.mismatches.is_empty()
    }
}

/// Group a project's ticket files by code, using both the filename and the
/// embedded frontmatter as sources.
pub fn find_duplicates(project: &Project) -> Result<DuplicateReport> {
    let mut by_code: BTreeMap<String, Vec<DuplicateFile>> = BTreeMap::new();
    let mut mismatches = Vec::new();

    for path in ticket_files(&project.tickets_dir())? {
        let filename_code = code_from_path(&path).filter(|c| c.project == project.code);

        // Files that vanish mid-scan or fail to parse still count for
        // filename-based grouping; their embedded code is just unknown.
        let metadata = fs::read_to_string(&path)
            .ok()
            .and_then(|content| parse_ticket(&content).ok());
        let embedded_raw = metadata.as_ref().and_then(|m| m.code.clone());
        let embedded_code = metadata
            .as_ref()
            .and_then(|m| m.parsed_code())
            .filter(|c| c.project == project.code);
        let title = metadata.and_then(|m| m.title);

        let file = DuplicateFile {
            path: path.clone(),
            title,
            embedded_code: embedded_raw,
        };

        if let (Some(from_name), Some(from_meta)) = (&filename_code, &embedded_code) {
            if from_name != from_meta {
                mismatches.push(CodeMismatch {
                    path: path.clone(),
                    filename_code: from_name.to_string(),
                    embedded_code: from_meta.to_string(),
                });
            }
        }

        // Membership in a group comes from either source; a mismatched file
        // participates under both codes.
        let mut seen_codes: Vec<String> = Vec::new();
        for code in [&filename_code, &embedded_code].into_iter().flatten() {
            let key = code.to_string();
            if !seen_codes.contains(&key) {
                seen_codes.push(key.clone());
                by_code.entry(key).or_default().push(file.clone());
            }
        }
    }

    let groups = by_code
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|(code, files)| DuplicateGroup { code, files })
        .collect();

    Ok(DuplicateReport { groups, mismatches })
}

/// What a rename resolution would do.
#[derive(Debug, Clone, Serialize)]
pub struct RenamePreview {
    pub old_code: String,
    pub new_code: String,
    pub old_filename: String,
    pub new_filename: String,
}

/// A duplicate-resolution action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveAction {
    Rename,
    Delete,
}

impl std::str::FromStr for ResolveAction {
    type Err = CorkboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "rename" => Ok(ResolveAction::Rename),
            "delete" => Ok(ResolveAction::Delete),
            _ => Err(CorkboardError::Other(format!(
                "invalid resolve action: {s} (expected 'rename' or 'delete')"
            ))),
        }
    }
}

/// The result of applying a resolution.
#[derive(Debug, Clone, Serialize)]
pub enum Resolution {
    Renamed(RenamePreview),
    Deleted { path: PathBuf },
}

/// Compute the rename a `resolve(Rename, ..)` would perform, without acting.
///
/// The preview allocates nothing; the number shown may be taken by a
/// concurrent actor before `resolve` runs, which is why `resolve` recomputes
/// against a fresh scan.
pub fn preview_rename(file: &Path, project: &Project) -> Result<RenamePreview> {
    build_rename(file, project, peek_next_number(project)?)
}

fn build_rename(file: &Path, project: &Project, new_number: u32) -> Result<RenamePreview> {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| CorkboardError::TicketNotFound(file.display().to_string()))?;
    let old_code = TicketCode::from_file_stem(&stem)
        .ok_or_else(|| CorkboardError::InvalidTicketCode(stem.clone()))?;
    let new_code = TicketCode::new(&project.code, new_number)?;

    // Keep the slug: everything after the filename-encoded code.
    let matched_len = old_code.project.len() + 1 + digits_in_stem(&stem, old_code.project.len() + 1);
    let suffix = &stem[matched_len..];

    Ok(RenamePreview {
        old_code: old_code.to_string(),
        new_code: new_code.to_string(),
        old_filename: format!("{stem}.md"),
        new_filename: format!("{new_code}{suffix}.md"),
    })
}

/// Number of digit characters following the `PROJECT-` prefix in a stem.
fn digits_in_stem(stem: &str, start: usize) -> usize {
    stem[start..].chars().take_while(|c| c.is_ascii_digit()).count()
}

/// Apply a duplicate resolution against a fresh directory scan.
///
/// `Rename` assigns the file the next safe number, rewrites the embedded
/// `code` field (and nothing else), and renames the file. `Delete` removes
/// the file.
pub fn resolve(action: ResolveAction, file: &Path, project: &Project) -> Result<Resolution> {
    if !file.exists() {
        return Err(CorkboardError::TicketNotFound(file.display().to_string()));
    }

    match action {
        ResolveAction::Delete => {
            fs::remove_file(file).map_err(|e| {
                CorkboardError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to delete {}: {}", file.display(), e),
                ))
            })?;
            Ok(Resolution::Deleted {
                path: file.to_path_buf(),
            })
        }
        ResolveAction::Rename => {
            // Fresh scan immediately before acting: a number allocated by a
            // concurrent actor since the preview must not be reused.
            let new_number = peek_next_number(project)?;
            let preview = build_rename(file, project, new_number)?;

            let content = fs::read_to_string(file).map_err(|e| {
                CorkboardError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read {}: {}", file.display(), e),
                ))
            })?;
            let updated = match update_frontmatter_field(&content, "code", &preview.new_code) {
                Ok(updated) => updated,
                Err(_) => {
                    // No frontmatter to fix up; the filename is still the
                    // authoritative source.
                    tracing::warn!(
                        "no frontmatter in {}, renaming file only",
                        file.display()
                    );
                    content
                }
            };

            let new_path = file.with_file_name(&preview.new_filename);
            fs::write(file, updated).map_err(|e| {
                CorkboardError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to update {}: {}", file.display(), e),
                ))
            })?;
            fs::rename(file, &new_path).map_err(|e| {
                CorkboardError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to rename {} to {}: {}",
                        file.display(),
                        new_path.display(),
                        e
                    ),
                ))
            })?;

            write_hint(project, new_number + 1);
            Ok(Resolution::Renamed(preview))
        }
    }
}
