//! Game catalog for RexOS
//!
//! Crawls games folders (including ROM archives and symlinked folders) and
//! builds a searchable index of playable files per system. Two index formats
//! are supported: a flat tar container loaded fully into memory, and a SQLite
//! key-value store searched with range scans.

mod checker;
mod container;
mod crawler;
mod flat;
mod gamelist;
mod indexer;
mod resolver;
mod search;
mod store;

pub use checker::ExistenceChecker;
pub use container::{CONTAINER_EXTENSION, is_container, list_entries, split_container_path};
pub use crawler::{crawl, crawl_all, dedupe_by_base_name};
pub use flat::{FlatIndex, StagedFlatIndex};
pub use gamelist::{gamelist_filename, write_gamelists};
pub use indexer::{IndexStatus, Indexer, RebuildSummary, SystemFailure};
pub use resolver::{
    SystemPath, active_system_paths, best_match, find_file, group_by_system, match_systems,
    system_paths,
};
pub use search::{IndexEngine, NameMatch};
pub use store::{KvIndex, StagedKvIndex, name_key};

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Root folder unavailable: {path}")]
    RootUnavailable { path: PathBuf },

    #[error("Container unreadable: {path}: {reason}")]
    ContainerUnreadable { path: PathBuf, reason: String },

    #[error("Index store unavailable: {path}: {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    #[error("Index not found: {0}")]
    IndexMissing(PathBuf),

    #[error("Invalid index file: {0}")]
    InvalidIndex(String),

    #[error("No system matches {0}")]
    NoSystemMatch(PathBuf),

    #[error("Failed to replace index {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Indexing task failed: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    Config(#[from] rexos_config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// A playable file discovered by the crawler
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrawlEntry {
    pub system_id: String,
    /// Filesystem path, or `<container>/<entry>` for files inside an archive
    pub path: PathBuf,
}

impl CrawlEntry {
    pub fn new(system_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            system_id: system_id.into(),
            path: path.into(),
        }
    }

    /// Index name: the file name without its extension
    pub fn name(&self) -> String {
        entry_name(&self.path)
    }
}

pub(crate) fn entry_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchResult {
    pub system_id: String,
    pub name: String,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name_strips_extension() {
        let entry = CrawlEntry::new("SNES", "/roms/SNES/Super Mario World (USA).sfc");
        assert_eq!(entry.name(), "Super Mario World (USA)");
    }

    #[test]
    fn test_entry_name_inside_container() {
        let entry = CrawlEntry::new("NES", "/roms/NES/pack.zip/Games/Super Mario Bros. 3.nes");
        assert_eq!(entry.name(), "Super Mario Bros. 3");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: CatalogError = rexos_config::ConfigError::UnknownSystem("Jaguar".into()).into();
        assert!(matches!(
            err,
            CatalogError::Config(rexos_config::ConfigError::UnknownSystem(id)) if id == "Jaguar"
        ));
    }
}
