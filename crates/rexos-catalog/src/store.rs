//! Key-value games index
//!
//! A single SQLite table used as an ordered key-value store: keys are
//! `<system>:<name>`, values are paths. Searches seek to a system's key prefix
//! and walk forward while the prefix holds, so nothing is loaded up front.

use crate::crawler::crawl;
use crate::flat::index_dir;
use crate::indexer::{IndexStatus, RebuildSummary, SystemFailure};
use crate::resolver::system_paths;
use crate::search::{IndexEngine, NameMatch};
use crate::{CatalogError, CrawlEntry, SearchResult, entry_name};
use rexos_config::System;
use rusqlite::{Connection, OpenFlags, params};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempPath;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Key of a game in the names table
pub fn name_key(system_id: &str, name: &str) -> String {
    format!("{}:{}", system_id, name)
}

/// Read-only handle on a built key-value index
pub struct KvIndex {
    path: PathBuf,
    conn: Connection,
}

/// A fully written and synced store waiting to replace the live one
#[derive(Debug)]
pub struct StagedKvIndex {
    temp: TempPath,
    target: PathBuf,
    files: usize,
}

impl StagedKvIndex {
    /// Location of the temporary store
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    pub fn files(&self) -> usize {
        self.files
    }

    /// Atomically move the staged store over the target path
    pub fn commit(self) -> Result<usize, CatalogError> {
        self.temp
            .persist(&self.target)
            .map_err(|err| CatalogError::Persist {
                path: self.target.clone(),
                source: err.error,
            })?;

        info!(
            "Games index written to {} ({} files)",
            self.target.display(),
            self.files
        );
        Ok(self.files)
    }
}

enum TaskEvent {
    Started(String),
    Finished(String, Result<Vec<PathBuf>, CatalogError>),
}

impl KvIndex {
    /// True if a store exists at `path`
    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Open a built store read-only
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if !Self::exists(path) {
            return Err(CatalogError::IndexMissing(path.to_path_buf()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| CatalogError::StoreUnavailable {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Crawl every system's folders and build a new store next to `index_path`.
    ///
    /// One task per system, at most `concurrency` running at once. Each task
    /// crawls its folders in order and writes its entries in one transaction.
    /// A failing system is recorded in the summary and does not stop the others.
    /// The live index is untouched until [`StagedKvIndex::commit`].
    pub async fn stage<F>(
        index_path: &Path,
        games_folders: &[PathBuf],
        systems: &[System],
        concurrency: usize,
        mut on_status: F,
    ) -> Result<(StagedKvIndex, RebuildSummary), CatalogError>
    where
        F: FnMut(&IndexStatus),
    {
        // folder resolution, one step per system, then the final write
        let mut status = IndexStatus::new(systems.len() + 2);
        let mut summary = RebuildSummary {
            systems: systems.len(),
            ..Default::default()
        };

        let temp = create_temp_store(index_path)?;
        let conn = Arc::new(Mutex::new(open_for_build(&temp)?));

        let mut work: Vec<(System, Vec<PathBuf>)> = systems
            .iter()
            .map(|system| (system.clone(), Vec::new()))
            .collect();
        for found in system_paths(games_folders, systems) {
            if let Some((_, roots)) = work.iter_mut().find(|(s, _)| s.id == found.system_id) {
                roots.push(found.path);
            }
        }
        on_status(&status);

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for (system, roots) in work {
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let conn = conn.clone();

            tasks.spawn(async move {
                let system_id = system.id.clone();
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        let _ = tx.send(TaskEvent::Started(system_id.clone()));
                        tokio::task::spawn_blocking(move || index_system(&conn, &system, &roots))
                            .await
                            .unwrap_or_else(|err| Err(CatalogError::Task(err.to_string())))
                    }
                    Err(err) => Err(CatalogError::Task(err.to_string())),
                };
                let _ = tx.send(TaskEvent::Finished(system_id, result));
            });
        }
        drop(tx);

        while let Some(event) = rx.recv().await {
            match event {
                TaskEvent::Started(system_id) => {
                    status.advance(&system_id);
                    on_status(&status);
                }
                TaskEvent::Finished(system_id, Ok(paths)) => {
                    debug!("Indexed {} files for {}", paths.len(), system_id);
                    status.files_indexed += paths.len();
                    summary.files_indexed += paths.len();
                    summary.entries.extend(
                        paths
                            .into_iter()
                            .map(|path| CrawlEntry::new(system_id.clone(), path)),
                    );
                }
                TaskEvent::Finished(system_id, Err(error)) => {
                    warn!("Indexing {} failed: {}", system_id, error);
                    summary.failures.push(SystemFailure { system_id, error });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|err| CatalogError::Task(err.to_string()))?;
        }

        status.advance("");
        on_status(&status);

        let conn = Arc::try_unwrap(conn)
            .map_err(|_| CatalogError::Task("index store still in use".to_string()))?
            .into_inner()
            .map_err(|_| CatalogError::Task("index store lock poisoned".to_string()))?;
        conn.close().map_err(|(_, err)| err)?;
        File::open(&temp)?.sync_all()?;

        let staged = StagedKvIndex {
            temp,
            target: index_path.to_path_buf(),
            files: summary.files_indexed,
        };
        Ok((staged, summary))
    }

    /// Build a new store and replace the one at `index_path`.
    ///
    /// If every requested system failed, the new store is discarded and the
    /// existing one is kept; check [`RebuildSummary::index_replaced`].
    pub async fn rebuild<F>(
        index_path: &Path,
        games_folders: &[PathBuf],
        systems: &[System],
        concurrency: usize,
        on_status: F,
    ) -> Result<RebuildSummary, CatalogError>
    where
        F: FnMut(&IndexStatus),
    {
        let (staged, mut summary) =
            Self::stage(index_path, games_folders, systems, concurrency, on_status).await?;

        if summary.all_failed() {
            warn!(
                "Every system failed, keeping existing index {}",
                index_path.display()
            );
            drop(staged);
            return Ok(summary);
        }

        staged.commit()?;
        summary.index_replaced = true;
        Ok(summary)
    }

    fn scan_system(
        &self,
        system_id: &str,
        test: &dyn Fn(&str) -> bool,
        results: &mut Vec<SearchResult>,
    ) -> Result<(), CatalogError> {
        let prefix = name_key(system_id, "");
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key, value FROM names WHERE key >= ?1 ORDER BY key")?;
        let mut rows = stmt.query(params![prefix])?;

        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let Some(name) = key.strip_prefix(prefix.as_str()) else {
                break;
            };

            if test(name) {
                results.push(SearchResult {
                    system_id: system_id.to_string(),
                    name: name.to_string(),
                    path: row.get(1)?,
                });
            }
        }

        Ok(())
    }

    fn scan_all(
        &self,
        test: &dyn Fn(&str) -> bool,
        results: &mut Vec<SearchResult>,
    ) -> Result<(), CatalogError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key, value FROM names ORDER BY key")?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let Some((system_id, name)) = key.split_once(':') else {
                continue;
            };

            if test(name) {
                results.push(SearchResult {
                    system_id: system_id.to_string(),
                    name: name.to_string(),
                    path: row.get(1)?,
                });
            }
        }

        Ok(())
    }

    fn search_systems(
        &self,
        systems: &[System],
        matcher: &NameMatch,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        let mut results = Vec::new();
        for system in systems {
            self.scan_system(&system.id, &|name| matcher.matches(name), &mut results)?;
        }
        Ok(results)
    }

    /// Names equal to `query` (case-insensitive)
    pub fn search_names_exact(
        &self,
        systems: &[System],
        query: &str,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        self.search_systems(systems, &NameMatch::exact(query))
    }

    /// Names containing `query` (case-insensitive)
    pub fn search_names_partial(
        &self,
        systems: &[System],
        query: &str,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        self.search_systems(systems, &NameMatch::partial(query))
    }

    /// Names containing every word of `query` (case-insensitive)
    pub fn search_names_words(
        &self,
        systems: &[System],
        query: &str,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        self.search_systems(systems, &NameMatch::words(query))
    }

    /// Names matching `pattern`; an invalid pattern matches nothing
    pub fn search_names_regex(
        &self,
        systems: &[System],
        pattern: &str,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        self.search_systems(systems, &NameMatch::regex(pattern))
    }

    /// Path stored for an exact key, if any
    pub fn get(&self, system_id: &str, name: &str) -> Result<Option<String>, CatalogError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM names WHERE key = ?1")?;
        let mut rows = stmt.query(params![name_key(system_id, name)])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

impl IndexEngine for KvIndex {
    fn scan(
        &self,
        system: Option<&str>,
        test: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        let mut results = Vec::new();
        match system {
            Some(system_id) => self.scan_system(system_id, test, &mut results)?,
            None => self.scan_all(test, &mut results)?,
        }
        Ok(results)
    }

    fn systems(&self) -> Result<Vec<String>, CatalogError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT substr(key, 1, instr(key, ':') - 1) FROM names ORDER BY 1",
        )?;
        let systems = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(systems)
    }

    fn total(&self) -> Result<usize, CatalogError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM names", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn create_temp_store(index_path: &Path) -> Result<TempPath, CatalogError> {
    let unavailable = |err: std::io::Error| CatalogError::StoreUnavailable {
        path: index_path.to_path_buf(),
        reason: err.to_string(),
    };

    let dir = index_dir(index_path);
    fs::create_dir_all(dir).map_err(unavailable)?;
    let temp = tempfile::Builder::new()
        .prefix(".games-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(unavailable)?;

    Ok(temp.into_temp_path())
}

/// Open a fresh store for writing. Durability is deferred to the final sync.
fn open_for_build(path: &Path) -> Result<Connection, CatalogError> {
    let unavailable = |err: rusqlite::Error| CatalogError::StoreUnavailable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };

    let conn = Connection::open(path).map_err(unavailable)?;
    conn.pragma_update_and_check(None, "journal_mode", "MEMORY", |row| row.get::<_, String>(0))
        .map_err(unavailable)?;
    conn.pragma_update(None, "synchronous", "OFF")
        .map_err(unavailable)?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS names (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        ) WITHOUT ROWID;
    "#,
    )
    .map_err(unavailable)?;

    Ok(conn)
}

/// Crawl one system's folders in order and write its entries in one transaction
fn index_system(
    conn: &Mutex<Connection>,
    system: &System,
    roots: &[PathBuf],
) -> Result<Vec<PathBuf>, CatalogError> {
    let mut paths = Vec::new();
    for root in roots {
        paths.extend(crawl(system, root)?);
    }

    if paths.is_empty() {
        return Ok(paths);
    }

    let mut conn = conn
        .lock()
        .map_err(|_| CatalogError::Task("index store lock poisoned".to_string()))?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached("INSERT OR REPLACE INTO names (key, value) VALUES (?1, ?2)")?;
        for path in &paths {
            stmt.execute(params![
                name_key(&system.id, &entry_name(path)),
                path.to_string_lossy()
            ])?;
        }
    }
    tx.commit()?;

    Ok(paths)
}
