//! Shared helpers for integration tests: a throwaway registry with one
//! project, plus ticket-file builders.
#![allow(dead_code)] // each test binary uses a different subset

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use corkboard::config::Config;
use corkboard::project::{Project, ProjectRegistry};
use corkboard::store::Store;

/// A temporary board: registry directory + one registered project.
pub struct TestBoard {
    /// Keeps the temp dir alive for the test's duration.
    pub tmp: TempDir,
    pub registry: ProjectRegistry,
    pub project: Project,
}

impl TestBoard {
    pub fn new(code: &str) -> Self {
        let tmp = TempDir::new().expect("failed to create temp dir");
        // Canonicalize so paths compare equal to what the OS watcher reports.
        let root = tmp.path().canonicalize().expect("failed to canonicalize");
        let registry = ProjectRegistry::new(root.join("registry"));

        let project = Project {
            code: code.to_string(),
            name: format!("{code} test project"),
            path: root.join(code.to_lowercase()),
            tickets_path: "tickets".to_string(),
            active: true,
            document_discovery: None,
            descriptor_path: None,
        };
        fs::create_dir_all(project.tickets_dir()).expect("failed to create tickets dir");
        registry.save(&project).expect("failed to save project");

        TestBoard {
            tmp,
            registry,
            project,
        }
    }

    /// Canonicalized root of the temp directory.
    pub fn root(&self) -> PathBuf {
        self.tmp.path().canonicalize().expect("failed to canonicalize")
    }

    /// A store over this board with a fast debounce for watcher tests.
    pub fn store(&self) -> Store {
        let mut config = Config::default();
        config.debounce_ms = 100;
        config.heartbeat_secs = 3600;
        Store::open(ProjectRegistry::new(self.registry.dir()), config)
    }

    /// Write a ticket file with the standard frontmatter and the given body.
    pub fn write_ticket(&self, filename: &str, code: &str, body: &str) -> PathBuf {
        let path = self.project.tickets_dir().join(filename);
        fs::write(
            &path,
            format!(
                "---\ncode: {code}\nstatus: proposed\ntype: feature\npriority: medium\n\
                 created: 2025-11-02T09:30:00Z\n---\n{body}"
            ),
        )
        .expect("failed to write ticket");
        path
    }
}
