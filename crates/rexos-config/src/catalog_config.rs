//! Game catalog configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which on-disk index format a rebuild produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexGeneration {
    /// Single tar container of per-system name/path lists, loaded fully on open
    Flat,
    /// SQLite key-value store, searched by range scans
    #[default]
    KeyValue,
}

/// Search index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index format produced by rebuilds
    #[serde(default)]
    pub generation: IndexGeneration,

    /// Flat index container path
    #[serde(default = "default_flat_path")]
    pub flat_path: PathBuf,

    /// Key-value store path
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Systems indexed in parallel by the key-value rebuild
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_flat_path() -> PathBuf {
    PathBuf::from("/roms/.rexos/search.tar")
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/roms/.rexos/games.db")
}

fn default_concurrency() -> usize {
    4
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            generation: IndexGeneration::default(),
            flat_path: default_flat_path(),
            store_path: default_store_path(),
            concurrency: default_concurrency(),
        }
    }
}

impl IndexConfig {
    /// Path of the index for the configured generation
    pub fn active_path(&self) -> &PathBuf {
        match self.generation {
            IndexGeneration::Flat => &self.flat_path,
            IndexGeneration::KeyValue => &self.store_path,
        }
    }

    /// Concurrency bound, never below one
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// Plain-text gamelist output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamelistConfig {
    /// Directory receiving `<system>_gamelist.txt` files
    #[serde(default = "default_gamelist_dir")]
    pub output_dir: PathBuf,

    /// Keep only the first file seen for each file name
    #[serde(default)]
    pub dedupe: bool,
}

fn default_gamelist_dir() -> PathBuf {
    PathBuf::from("/roms/.rexos/gamelists")
}

impl Default for GamelistConfig {
    fn default() -> Self {
        Self {
            output_dir: default_gamelist_dir(),
            dedupe: false,
        }
    }
}
