//! Header-delimited sections of a ticket body.
//!
//! A section is a contiguous line range starting at a markdown header and
//! running to the line before the next header of the same or shallower
//! level. Header detection is fence-aware: `#` lines inside fenced code
//! blocks are content, not headers, and an unclosed fence swallows the rest
//! of the document.
//!
//! Sections are recomputed from the body on every call. Edits splice
//! terminator-preserving line slices, so every byte outside the target
//! section's line range survives an edit unchanged.

use std::fmt;
use std::str::FromStr;

use crate::error::{CorkboardError, Result};

/// Separator for hierarchical section references: `Implementation > Testing`.
pub const PATH_SEPARATOR: &str = " > ";

/// A header-delimited region of a document.
///
/// Line numbers are 0-based; `end_line` is exclusive and points at the next
/// header of level <= `level`, or one past the last line. The header line
/// itself is part of the section's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Header text with the `#` markers stripped.
    pub title: String,
    /// Nesting level, 1-6.
    pub level: u8,
    /// Ancestor header texts plus this section's own title, outermost first.
    pub path: Vec<String>,
    pub start_line: usize,
    pub end_line: usize,
    /// Raw content between the header line and `end_line`, terminators intact.
    pub content: String,
}

impl Section {
    /// The hierarchical path as a display string.
    pub fn path_string(&self) -> String {
        self.path.join(PATH_SEPARATOR)
    }
}

/// How `apply_edit` places new content relative to the existing section body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Replace,
    Append,
    Prepend,
}

impl FromStr for EditMode {
    type Err = CorkboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "replace" => Ok(EditMode::Replace),
            "append" => Ok(EditMode::Append),
            "prepend" => Ok(EditMode::Prepend),
            _ => Err(CorkboardError::Other(format!("invalid edit mode: {s}"))),
        }
    }
}

/// A section reference: exact header text, or a ` > `-joined hierarchical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionRef {
    Exact(String),
    Path(Vec<String>),
}

impl SectionRef {
    pub fn parse(s: &str) -> Self {
        if s.contains(PATH_SEPARATOR) {
            SectionRef::Path(
                s.split(PATH_SEPARATOR)
                    .map(|part| part.trim().to_string())
                    .collect(),
            )
        } else {
            SectionRef::Exact(s.trim().to_string())
        }
    }
}

impl fmt::Display for SectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionRef::Exact(text) => write!(f, "{text}"),
            SectionRef::Path(parts) => write!(f, "{}", parts.join(PATH_SEPARATOR)),
        }
    }
}

/// Tracks whether the scanner is inside a fenced code block.
struct FenceState {
    /// (marker char, marker length) of the open fence, if any.
    open: Option<(char, usize)>,
}

impl FenceState {
    fn new() -> Self {
        FenceState { open: None }
    }

    /// Feed one line; returns true if the line is a fence marker (and thus
    /// never a header). Headers are only recognized while `open` is None
    /// *before* the line is fed.
    fn feed(&mut self, line: &str) -> bool {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let Some((marker, len, rest)) = fence_marker(trimmed) else {
            return false;
        };
        match self.open {
            None => {
                // Opening fence; a language tag after the marker is allowed.
                self.open = Some((marker, len));
                true
            }
            Some((open_marker, open_len)) => {
                // A closing fence must match the marker, be at least as long,
                // and carry nothing but whitespace.
                if marker == open_marker && len >= open_len && rest.trim().is_empty() {
                    self.open = None;
                }
                true
            }
        }
    }

    fn inside(&self) -> bool {
        self.open.is_some()
    }
}

/// Recognize a fence marker line: three or more backticks or tildes at the
/// start of the line. Returns (marker char, run length, remainder).
fn fence_marker(line: &str) -> Option<(char, usize, &str)> {
    let first = line.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let len = line.chars().take_while(|c| *c == first).count();
    if len < 3 {
        return None;
    }
    Some((first, len, &line[len..]))
}

/// Parse a header line: `#` repeated 1-6 times, a space, then text.
fn header_line(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let text = rest.trim();
    if text.is_empty() {
        return None;
    }
    Some((hashes as u8, text.to_string()))
}

/// Parse all sections of a body in document order.
pub fn list_sections(body: &str) -> Vec<Section> {
    let lines: Vec<&str> = body.split_inclusive('\n').collect();

    // First pass: locate headers, honoring fence state.
    let mut fence = FenceState::new();
    let mut headers: Vec<(usize, u8, String)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if fence.feed(line) {
            continue;
        }
        if fence.inside() {
            continue;
        }
        if let Some((level, text)) = header_line(line) {
            headers.push((i, level, text));
        }
    }

    // Second pass: compute ranges and hierarchical paths.
    let mut sections = Vec::with_capacity(headers.len());
    let mut stack: Vec<(u8, String)> = Vec::new();
    for (idx, &(start, level, ref title)) in headers.iter().enumerate() {
        let end = headers[idx + 1..]
            .iter()
            .find(|&&(_, next_level, _)| next_level <= level)
            .map(|&(next_start, _, _)| next_start)
            .unwrap_or(lines.len());

        while stack.last().is_some_and(|(l, _)| *l >= level) {
            stack.pop();
        }
        stack.push((level, title.clone()));
        let path: Vec<String> = stack.iter().map(|(_, t)| t.clone()).collect();

        let content: String = lines[start + 1..end].concat();
        sections.push(Section {
            title: title.clone(),
            level,
            path,
            start_line: start,
            end_line: end,
            content,
        });
    }

    sections
}

/// Find the first section (document order) whose header text matches exactly.
pub fn find_section(body: &str, title: &str) -> Result<Section> {
    list_sections(body)
        .into_iter()
        .find(|s| s.title == title)
        .ok_or_else(|| CorkboardError::SectionNotFound(title.to_string()))
}

/// Find a section by hierarchical path, outermost first.
///
/// The chain may skip intermediate levels but every element must nest inside
/// the previous one. Errors distinguish the section being absent, the path
/// matching more than one section, and the titles existing without the
/// required nesting.
pub fn find_section_by_path(body: &str, chain: &[String]) -> Result<Section> {
    let display = chain.join(PATH_SEPARATOR);
    let Some(target) = chain.last() else {
        return Err(CorkboardError::SectionNotFound(display));
    };

    let sections = list_sections(body);
    let candidates: Vec<&Section> = sections
        .iter()
        .filter(|s| &s.title == target && chain_matches(&s.path, chain))
        .collect();

    match candidates.len() {
        1 => Ok(candidates[0].clone()),
        0 => {
            if !sections.iter().any(|s| &s.title == target) {
                return Err(CorkboardError::SectionNotFound(display));
            }
            // Every title in the chain exists somewhere, but not nested as
            // requested.
            if chain
                .iter()
                .all(|t| sections.iter().any(|s| &s.title == t))
            {
                Err(CorkboardError::BadSectionNesting(
                    display,
                    "headers exist but are not nested in the requested order".to_string(),
                ))
            } else {
                Err(CorkboardError::SectionNotFound(display))
            }
        }
        n => Err(CorkboardError::AmbiguousSection(
            display,
            format!("{n} sections match; qualify the path with more ancestors"),
        )),
    }
}

/// Resolve a `SectionRef` against a body.
pub fn resolve(body: &str, section_ref: &SectionRef) -> Result<Section> {
    match section_ref {
        SectionRef::Exact(text) => find_section(body, text),
        SectionRef::Path(chain) => find_section_by_path(body, chain),
    }
}

/// True if `chain` is an in-order subsequence of `path` ending at its tail.
fn chain_matches(path: &[String], chain: &[String]) -> bool {
    if chain.is_empty() || path.last() != chain.last() {
        return false;
    }
    let mut it = path.iter();
    chain.iter().all(|want| it.any(|have| have == want))
}

/// Apply an edit to `section` within `body`, returning the new body.
///
/// Only lines within the section's range change; everything outside is
/// spliced back byte-for-byte. The section must have been computed from the
/// same `body` the edit is applied to.
pub fn apply_edit(body: &str, section: &Section, mode: EditMode, new_content: &str) -> String {
    let lines: Vec<&str> = body.split_inclusive('\n').collect();

    let mut block = new_content.to_string();
    if !block.is_empty() && !block.ends_with('\n') {
        block.push('\n');
    }

    // Insertion point, as a line index into `lines`.
    let (keep_to, resume_from) = match mode {
        // Everything after the header is replaced.
        EditMode::Replace => (section.start_line + 1, section.end_line),
        // After the existing content, before the next header.
        EditMode::Append => (section.end_line, section.end_line),
        // Immediately after the header line.
        EditMode::Prepend => (section.start_line + 1, section.start_line + 1),
    };

    let mut out = String::with_capacity(body.len() + block.len());
    out.push_str(&lines[..keep_to].concat());
    // The preceding line is inside the section's range; give it a terminator
    // if the document ended without one, so the block starts on its own line.
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&block);
    out.push_str(&lines[resume_from..].concat());
    out
}
