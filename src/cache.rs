//! Time-bounded cache of file content and derived metadata.
//!
//! One read populates both the raw content and the extracted metadata for a
//! path. Entries expire after a TTL and are explicitly invalidated by the
//! change detector before it broadcasts the corresponding event, so a read
//! that follows an observed change always sees post-change data.
//!
//! A vanished file is cached as a negative entry for the TTL window —
//! without this, a dangling watch entry would hit the disk on every access.
//! The map is bounded: inserts past capacity first purge expired entries,
//! then evict the oldest.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;

use crate::config::Config;
use crate::error::{CorkboardError, Result};
use crate::parser::{extract_title, split_frontmatter};

/// Metadata derived from a file's content and filesystem attributes.
///
/// Extraction never fails: a file without a title or with unreadable
/// attributes just gets `None` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    /// First level-one header of the body.
    pub title: Option<String>,
    /// Creation timestamp (ISO 8601); falls back to the change time on
    /// platforms without birth time.
    pub created: Option<String>,
    /// Last-modified timestamp (ISO 8601).
    pub modified: Option<String>,
}

#[derive(Debug, Clone)]
enum CachedFile {
    Found {
        content: String,
        metadata: FileMetadata,
    },
    /// The file could not be found when last read.
    Missing,
}

struct Entry {
    data: CachedFile,
    captured_at: Instant,
}

pub struct DerivedCache {
    entries: DashMap<PathBuf, Entry>,
    ttl: Duration,
    capacity: usize,
}

impl DerivedCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        DerivedCache {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_ttl(), config.cache_capacity)
    }

    /// Cached file content; `None` means the file does not exist (possibly
    /// a cached negative result). Transient IO errors are returned as-is
    /// and are never cached.
    pub async fn get_content(&self, path: &Path) -> Result<Option<String>> {
        match self.lookup_or_read(path).await? {
            CachedFile::Found { content, .. } => Ok(Some(content)),
            CachedFile::Missing => Ok(None),
        }
    }

    /// Cached derived metadata; `None` means the file does not exist.
    pub async fn get_metadata(&self, path: &Path) -> Result<Option<FileMetadata>> {
        match self.lookup_or_read(path).await? {
            CachedFile::Found { metadata, .. } => Ok(Some(metadata)),
            CachedFile::Missing => Ok(None),
        }
    }

    /// Drop the entry for a path. Called by the change detector before the
    /// matching event is broadcast.
    pub fn invalidate(&self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn lookup_or_read(&self, path: &Path) -> Result<CachedFile> {
        if let Some(entry) = self.entries.get(path) {
            if entry.captured_at.elapsed() < self.ttl {
                return Ok(entry.data.clone());
            }
        }

        let data = match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let metadata = extract_metadata(path, &content).await;
                CachedFile::Found { content, metadata }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CachedFile::Missing,
            Err(e) => {
                // Transient failure: surface with context, do not cache.
                return Err(CorkboardError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read {}: {}", path.display(), e),
                )));
            }
        };

        self.insert(path.to_path_buf(), data.clone());
        Ok(data)
    }

    /// Replace the entry for a path, enforcing the capacity bound.
    fn insert(&self, path: PathBuf, data: CachedFile) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&path) {
            self.purge_expired();
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            path,
            Entry {
                data,
                captured_at: Instant::now(),
            },
        );
    }

    fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.captured_at.elapsed() < ttl);
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.captured_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            tracing::debug!("cache at capacity, evicting {}", key.display());
            self.entries.remove(&key);
        }
    }
}

/// Derive metadata from content plus filesystem attributes.
async fn extract_metadata(path: &Path, content: &str) -> FileMetadata {
    // Prefer the body title so a `# comment` line in the frontmatter can
    // never masquerade as one.
    let title = match split_frontmatter(content) {
        Ok((_, body)) => extract_title(&body),
        Err(_) => extract_title(content),
    };

    let (created, modified) = match tokio::fs::metadata(path).await {
        Ok(meta) => {
            let modified = meta.modified().ok();
            let created = meta.created().ok().or(modified);
            (created.and_then(to_iso), modified.and_then(to_iso))
        }
        Err(_) => (None, None),
    };

    FileMetadata {
        title,
        created,
        modified,
    }
}

fn to_iso(time: SystemTime) -> Option<String> {
    jiff::Timestamp::try_from(time).ok().map(|t| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_ticket(dir: &Path, name: &str, title: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(
            &path,
            format!("---\ncode: MDT-1\nstatus: proposed\n---\n# {title}\n\nBody.\n"),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_get_content_and_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = write_ticket(tmp.path(), "MDT-1-first.md", "First Ticket");
        let cache = DerivedCache::new(Duration::from_secs(60), 16);

        let content = cache.get_content(&path).await.unwrap().unwrap();
        assert!(content.contains("# First Ticket"));

        let metadata = cache.get_metadata(&path).await.unwrap().unwrap();
        assert_eq!(metadata.title, Some("First Ticket".to_string()));
        assert!(metadata.created.is_some());
        assert!(metadata.modified.is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_read_served_from_cache_until_invalidated() {
        let tmp = TempDir::new().unwrap();
        let path = write_ticket(tmp.path(), "MDT-2-second.md", "Old Title");
        let cache = DerivedCache::new(Duration::from_secs(60), 16);

        cache.get_content(&path).await.unwrap();
        fs::write(&path, "---\ncode: MDT-2\n---\n# New Title\n").unwrap();

        // Within the TTL and without invalidation the cached copy wins.
        let metadata = cache.get_metadata(&path).await.unwrap().unwrap();
        assert_eq!(metadata.title, Some("Old Title".to_string()));

        cache.invalidate(&path);
        let metadata = cache.get_metadata(&path).await.unwrap().unwrap();
        assert_eq!(metadata.title, Some("New Title".to_string()));
    }

    #[tokio::test]
    async fn test_missing_file_is_negative_cached() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("MDT-3-gone.md");
        let cache = DerivedCache::new(Duration::from_secs(60), 16);

        assert!(cache.get_content(&path).await.unwrap().is_none());
        assert_eq!(cache.len(), 1);

        // Creating the file afterwards does not change the cached negative
        // until invalidation (the watcher's job).
        write_ticket(tmp.path(), "MDT-3-gone.md", "Now Exists");
        assert!(cache.get_content(&path).await.unwrap().is_none());

        cache.invalidate(&path);
        assert!(cache.get_content(&path).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ttl_expiry_rereads() {
        let tmp = TempDir::new().unwrap();
        let path = write_ticket(tmp.path(), "MDT-4-ttl.md", "Before");
        let cache = DerivedCache::new(Duration::from_millis(20), 16);

        cache.get_content(&path).await.unwrap();
        fs::write(&path, "---\ncode: MDT-4\n---\n# After\n").unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let metadata = cache.get_metadata(&path).await.unwrap().unwrap();
        assert_eq!(metadata.title, Some("After".to_string()));
    }

    #[tokio::test]
    async fn test_capacity_bound_evicts() {
        let tmp = TempDir::new().unwrap();
        let cache = DerivedCache::new(Duration::from_secs(60), 2);

        for i in 0..4 {
            let path = write_ticket(tmp.path(), &format!("MDT-{i}-cap.md"), "T");
            cache.get_content(&path).await.unwrap();
        }
        assert!(cache.len() <= 2);
    }

    #[tokio::test]
    async fn test_metadata_without_title_is_nulled_not_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.md");
        fs::write(&path, "no frontmatter, no heading\n").unwrap();
        let cache = DerivedCache::new(Duration::from_secs(60), 16);

        let metadata = cache.get_metadata(&path).await.unwrap().unwrap();
        assert_eq!(metadata.title, None);
        assert!(metadata.modified.is_some());
    }
}
