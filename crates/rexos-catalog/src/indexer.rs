//! Index rebuild orchestration
//!
//! Drives a rebuild of whichever index generation is configured and reports
//! progress through a caller-supplied callback. The callback always runs on
//! the caller's task, so it may hold non-`Send` state such as a terminal UI.

use crate::crawler::crawl;
use crate::flat::FlatIndex;
use crate::resolver::{group_by_system, system_paths};
use crate::search::IndexEngine;
use crate::store::KvIndex;
use crate::{CatalogError, CrawlEntry};
use rexos_config::{CatalogConfig, IndexConfig, IndexGeneration, System, SystemRegistry};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Progress of a running rebuild.
///
/// Step 1 is folder resolution, then one step per system as its crawl
/// starts, then a last step with an empty system id while the index is
/// written out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub total_steps: usize,
    pub current_step: usize,
    #[serde(rename = "currentSystemId")]
    pub system_id: String,
    pub files_indexed: usize,
}

impl IndexStatus {
    pub(crate) fn new(total_steps: usize) -> Self {
        Self {
            total_steps,
            current_step: 1,
            ..Default::default()
        }
    }

    pub(crate) fn advance(&mut self, system_id: &str) {
        self.current_step += 1;
        self.system_id = system_id.to_string();
    }

    /// True for the final step, once every system has been crawled
    pub fn is_writing(&self) -> bool {
        self.current_step == self.total_steps && self.system_id.is_empty()
    }
}

/// A system whose crawl failed during a rebuild
#[derive(Debug)]
pub struct SystemFailure {
    pub system_id: String,
    pub error: CatalogError,
}

/// Outcome of a rebuild that ran to completion
#[derive(Debug, Default)]
pub struct RebuildSummary {
    pub systems: usize,
    pub files_indexed: usize,
    pub failures: Vec<SystemFailure>,
    /// Every file found, grouped by system in crawl order
    pub entries: Vec<CrawlEntry>,
    /// False when the previous index was kept because every system failed
    pub index_replaced: bool,
}

impl RebuildSummary {
    /// Ids of systems with at least one failure
    pub fn failed_systems(&self) -> HashSet<&str> {
        self.failures.iter().map(|f| f.system_id.as_str()).collect()
    }

    /// True if systems were requested and every one of them failed
    pub fn all_failed(&self) -> bool {
        self.systems > 0 && self.failed_systems().len() >= self.systems
    }
}

enum CrawlEvent {
    Started(String),
    Found(usize),
    Failed(SystemFailure),
}

/// Rebuilds and opens the games index described by a [`CatalogConfig`]
#[derive(Debug, Clone)]
pub struct Indexer {
    registry: SystemRegistry,
    games_folders: Vec<PathBuf>,
    index: IndexConfig,
}

impl Indexer {
    pub fn new(registry: SystemRegistry, games_folders: Vec<PathBuf>, index: IndexConfig) -> Self {
        Self {
            registry,
            games_folders,
            index,
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(
            config.registry(),
            config.games_folders.clone(),
            config.index.clone(),
        )
    }

    pub fn registry(&self) -> &SystemRegistry {
        &self.registry
    }

    pub fn games_folders(&self) -> &[PathBuf] {
        &self.games_folders
    }

    /// Path of the configured index
    pub fn index_path(&self) -> &Path {
        self.index.active_path()
    }

    /// Whether the configured index has been built
    pub fn index_exists(&self) -> bool {
        match self.index.generation {
            IndexGeneration::Flat => FlatIndex::exists(self.index_path()),
            IndexGeneration::KeyValue => KvIndex::exists(self.index_path()),
        }
    }

    /// Look up systems by id or alias; no ids selects every system
    pub fn select_systems(&self, ids: &[String]) -> Result<Vec<System>, CatalogError> {
        if ids.is_empty() {
            return Ok(self.registry.all().to_vec());
        }

        let mut systems: Vec<System> = Vec::with_capacity(ids.len());
        for id in ids {
            let system = self.registry.lookup(id)?;
            if !systems.iter().any(|s| s.id == system.id) {
                systems.push(system.clone());
            }
        }
        Ok(systems)
    }

    /// Open the configured index for searching
    pub fn open(&self) -> Result<Box<dyn IndexEngine>, CatalogError> {
        match self.index.generation {
            IndexGeneration::Flat => Ok(Box::new(FlatIndex::open(self.index_path())?)),
            IndexGeneration::KeyValue => Ok(Box::new(KvIndex::open(self.index_path())?)),
        }
    }

    /// Crawl `systems` and replace the configured index.
    ///
    /// Crawl failures are collected per system in the summary. If every
    /// system failed the previous index is kept and `index_replaced` stays
    /// false. Only failing to create or replace the index itself is returned
    /// as an error, in which case the previous index is also left as it was.
    pub async fn rebuild<F>(
        &self,
        systems: &[System],
        on_status: F,
    ) -> Result<RebuildSummary, CatalogError>
    where
        F: FnMut(&IndexStatus),
    {
        info!(
            "Rebuilding {:?} index for {} systems at {}",
            self.index.generation,
            systems.len(),
            self.index_path().display()
        );

        let summary = match self.index.generation {
            IndexGeneration::Flat => self.rebuild_flat(systems, on_status).await?,
            IndexGeneration::KeyValue => {
                KvIndex::rebuild(
                    self.index_path(),
                    &self.games_folders,
                    systems,
                    self.index.effective_concurrency(),
                    on_status,
                )
                .await?
            }
        };

        info!(
            "Indexed {} files, {} failures",
            summary.files_indexed,
            summary.failures.len()
        );
        Ok(summary)
    }

    /// Sequential crawl of every (system, folder) pair, then one write
    async fn rebuild_flat<F>(
        &self,
        systems: &[System],
        mut on_status: F,
    ) -> Result<RebuildSummary, CatalogError>
    where
        F: FnMut(&IndexStatus),
    {
        // folder resolution, one step per system, then the final write
        let mut status = IndexStatus::new(systems.len() + 2);
        let mut summary = RebuildSummary {
            systems: systems.len(),
            ..Default::default()
        };

        let mut grouped = group_by_system(system_paths(&self.games_folders, systems));
        let work: Vec<(System, Vec<PathBuf>)> = systems
            .iter()
            .map(|system| (system.clone(), grouped.remove(&system.id).unwrap_or_default()))
            .collect();
        on_status(&status);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let crawler = tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();

            for (system, roots) in work {
                let _ = tx.send(CrawlEvent::Started(system.id.clone()));

                for root in roots {
                    match crawl(&system, &root) {
                        Ok(paths) => {
                            let _ = tx.send(CrawlEvent::Found(paths.len()));
                            entries.extend(
                                paths
                                    .into_iter()
                                    .map(|path| CrawlEntry::new(system.id.clone(), path)),
                            );
                        }
                        Err(error) => {
                            let _ = tx.send(CrawlEvent::Failed(SystemFailure {
                                system_id: system.id.clone(),
                                error,
                            }));
                        }
                    }
                }
            }

            entries
        });

        while let Some(event) = rx.recv().await {
            match event {
                CrawlEvent::Started(system_id) => {
                    status.advance(&system_id);
                    on_status(&status);
                }
                CrawlEvent::Found(files) => {
                    status.files_indexed += files;
                    summary.files_indexed += files;
                }
                CrawlEvent::Failed(failure) => {
                    warn!("Indexing {} failed: {}", failure.system_id, failure.error);
                    summary.failures.push(failure);
                }
            }
        }

        let entries = crawler
            .await
            .map_err(|err| CatalogError::Task(err.to_string()))?;

        status.advance("");
        on_status(&status);

        if summary.all_failed() {
            warn!(
                "Every system failed, keeping existing index {}",
                self.index.flat_path.display()
            );
            summary.entries = entries;
            return Ok(summary);
        }

        let index_path = self.index.flat_path.clone();
        let (staged, entries) = tokio::task::spawn_blocking(move || {
            let staged = FlatIndex::stage(&entries, &index_path);
            (staged, entries)
        })
        .await
        .map_err(|err| CatalogError::Task(err.to_string()))?;

        summary.files_indexed = staged?.commit()?;
        summary.entries = entries;
        summary.index_replaced = true;

        Ok(summary)
    }
}
