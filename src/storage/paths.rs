//! Where llmroute keeps its files.
//!
//! Platform directories come from `directories`; `rooted` puts everything
//! under one directory for tests and portable installs.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Config and data directories.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config: PathBuf,
    /// Holds the ledger journal.
    pub data: PathBuf,
}

impl AppPaths {
    /// Platform paths, or `~/.config/llmroute` and `~/.local/share/llmroute`
    /// when the platform lookup fails.
    #[must_use]
    pub fn new() -> Self {
        if let Some(dirs) = ProjectDirs::from("dev", "llmroute", "llmroute") {
            return Self {
                config: dirs.config_dir().to_path_buf(),
                data: dirs.data_dir().to_path_buf(),
            };
        }
        let home = BaseDirs::new().map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
        Self {
            config: home.join(".config").join("llmroute"),
            data: home.join(".local").join("share").join("llmroute"),
        }
    }

    #[must_use]
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config: root.join("config"),
            data: root.join("data"),
        }
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Catalog picked up automatically when it exists and nothing else
    /// names one.
    #[must_use]
    pub fn catalog_file(&self) -> PathBuf {
        self.config.join("catalog.toml")
    }

    #[must_use]
    pub fn ledger_db_file(&self) -> PathBuf {
        self.data.join("ledger.sqlite")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
