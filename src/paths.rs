use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable that overrides the corkboard home directory.
pub const HOME_ENV: &str = "CORKBOARD_HOME";

/// Returns the corkboard home directory.
///
/// Resolution order:
/// 1. `CORKBOARD_HOME` environment variable (if set)
/// 2. The platform config directory, e.g. `~/.config/corkboard`
pub fn corkboard_home() -> PathBuf {
    if let Ok(home) = std::env::var(HOME_ENV) {
        return PathBuf::from(home);
    }
    if let Some(dirs) = directories::ProjectDirs::from("", "", "corkboard") {
        return dirs.config_dir().to_path_buf();
    }
    PathBuf::from(".corkboard")
}

/// Returns the global project registry directory.
///
/// The registry is a directory of small per-project descriptor files;
/// see `project::ProjectRegistry`.
pub fn registry_dir() -> PathBuf {
    corkboard_home().join("projects")
}

/// Returns the path to the global config file.
pub fn global_config_path() -> PathBuf {
    corkboard_home().join("config.yaml")
}

/// RAII guard that sets `CORKBOARD_HOME` and restores the previous value on
/// drop. Tests that use this must be marked `#[serial]` — the process
/// environment is global.
pub struct HomeGuard {
    original: Option<OsString>,
}

impl HomeGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let original = std::env::var_os(HOME_ENV);
        // SAFETY: callers hold this guard inside #[serial] tests, so no other
        // thread touches the environment concurrently.
        unsafe { std::env::set_var(HOME_ENV, path.into()) };
        Self { original }
    }
}

impl Drop for HomeGuard {
    fn drop(&mut self) {
        // SAFETY: same single-threaded discipline as in `new`.
        match &self.original {
            Some(val) => unsafe { std::env::set_var(HOME_ENV, val) },
            None => unsafe { std::env::remove_var(HOME_ENV) },
        }
    }
}
