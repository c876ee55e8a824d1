//! Flat search index
//!
//! Per system, two line-aligned text files (`<system>__names` and
//! `<system>__paths`) packed into one tar container. The whole container is
//! loaded into memory on open and searched by linear scan.

use crate::search::{IndexEngine, NameMatch};
use crate::{CatalogError, CrawlEntry, SearchResult};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

const NAMES_SUFFIX: &str = "names";
const PATHS_SUFFIX: &str = "paths";

#[derive(Debug, Default)]
struct SystemLists {
    names: Vec<String>,
    paths: Vec<String>,
}

/// In-memory flat index
#[derive(Debug)]
pub struct FlatIndex {
    path: PathBuf,
    systems: BTreeMap<String, SystemLists>,
}

/// A fully written index waiting to replace the live one
#[derive(Debug)]
pub struct StagedFlatIndex {
    temp: NamedTempFile,
    target: PathBuf,
    files: usize,
}

impl StagedFlatIndex {
    /// Location of the temporary container
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Number of entries written
    pub fn files(&self) -> usize {
        self.files
    }

    /// Atomically move the staged container over the target path
    pub fn commit(self) -> Result<usize, CatalogError> {
        self.temp
            .persist(&self.target)
            .map_err(|err| CatalogError::Persist {
                path: self.target.clone(),
                source: err.error,
            })?;

        tracing::info!(
            "Flat index written to {} ({} files)",
            self.target.display(),
            self.files
        );
        Ok(self.files)
    }
}

impl FlatIndex {
    /// True if a flat index exists at `path`
    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Write `entries` to a temporary container next to `index_path`.
    ///
    /// Entries are not deduplicated; the live index is untouched until
    /// [`StagedFlatIndex::commit`].
    pub fn stage(entries: &[CrawlEntry], index_path: &Path) -> Result<StagedFlatIndex, CatalogError> {
        let mut streams: BTreeMap<&str, (String, String)> = BTreeMap::new();
        let mut files = 0;

        for entry in entries {
            let path = entry.path.to_string_lossy();
            if path.contains('\n') {
                tracing::warn!("Skipping path containing a newline: {:?}", path);
                continue;
            }

            let (names, paths) = streams.entry(entry.system_id.as_str()).or_default();
            names.push_str(&entry.name());
            names.push('\n');
            paths.push_str(&path);
            paths.push('\n');
            files += 1;
        }

        let dir = index_dir(index_path);
        fs::create_dir_all(dir)?;
        let temp = tempfile::Builder::new()
            .prefix(".search-")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        let mtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut builder = tar::Builder::new(temp);
        for (system_id, (names, paths)) in &streams {
            append_stream(&mut builder, &format!("{}__{}", system_id, NAMES_SUFFIX), names, mtime)?;
            append_stream(&mut builder, &format!("{}__{}", system_id, PATHS_SUFFIX), paths, mtime)?;
        }
        let temp = builder.into_inner()?;
        temp.as_file().sync_all()?;

        Ok(StagedFlatIndex {
            temp,
            target: index_path.to_path_buf(),
            files,
        })
    }

    /// Write `entries` and replace the index at `index_path`
    pub fn generate(entries: &[CrawlEntry], index_path: &Path) -> Result<usize, CatalogError> {
        Self::stage(entries, index_path)?.commit()
    }

    /// Load an index into memory
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if !Self::exists(path) {
            return Err(CatalogError::IndexMissing(path.to_path_buf()));
        }

        let mut archive = tar::Archive::new(BufReader::new(File::open(path)?));
        let mut systems: BTreeMap<String, SystemLists> = BTreeMap::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let file_name = entry.path()?.to_string_lossy().to_string();
            let (system_id, kind) = file_name
                .rsplit_once("__")
                .ok_or_else(|| CatalogError::InvalidIndex(file_name.clone()))?;

            let mut contents = String::new();
            entry.read_to_string(&mut contents)?;
            let lines: Vec<String> = contents.lines().map(|l| l.to_string()).collect();

            let lists = systems.entry(system_id.to_string()).or_default();
            match kind {
                NAMES_SUFFIX => lists.names = lines,
                PATHS_SUFFIX => lists.paths = lines,
                _ => return Err(CatalogError::InvalidIndex(file_name)),
            }
        }

        for (system_id, lists) in &systems {
            if lists.names.len() != lists.paths.len() {
                return Err(CatalogError::InvalidIndex(format!(
                    "{}: {} names but {} paths",
                    system_id,
                    lists.names.len(),
                    lists.paths.len()
                )));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            systems,
        })
    }

    /// Path the index was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn search_system(&self, system_id: &str, test: &dyn Fn(&str) -> bool) -> Vec<SearchResult> {
        let Some(lists) = self.systems.get(system_id) else {
            return Vec::new();
        };

        lists
            .names
            .iter()
            .zip(&lists.paths)
            .filter(|(name, _)| test(name.as_str()))
            .map(|(name, path)| SearchResult {
                system_id: system_id.to_string(),
                name: name.clone(),
                path: path.clone(),
            })
            .collect()
    }

    fn search_all(&self, test: &dyn Fn(&str) -> bool) -> Vec<SearchResult> {
        self.systems
            .keys()
            .flat_map(|system_id| self.search_system(system_id, test))
            .collect()
    }

    /// Names in `system_id` containing `query`
    pub fn search_system_by_name(&self, system_id: &str, query: &str) -> Vec<SearchResult> {
        let matcher = NameMatch::partial(query);
        self.search_system(system_id, &|name| matcher.matches(name))
    }

    /// Names in any system containing `query`
    pub fn search_all_by_name(&self, query: &str) -> Vec<SearchResult> {
        let matcher = NameMatch::partial(query);
        self.search_all(&|name| matcher.matches(name))
    }

    /// Names in `system_id` matching `pattern`; an invalid pattern matches nothing
    pub fn search_system_by_name_regex(&self, system_id: &str, pattern: &str) -> Vec<SearchResult> {
        let matcher = NameMatch::regex(pattern);
        self.search_system(system_id, &|name| matcher.matches(name))
    }

    /// Names in `system_id` containing every word of `query`
    pub fn search_system_by_words(&self, system_id: &str, query: &str) -> Vec<SearchResult> {
        let matcher = NameMatch::words(query);
        self.search_system(system_id, &|name| matcher.matches(name))
    }

    /// Names in any system containing every word of `query`
    pub fn search_all_by_words(&self, query: &str) -> Vec<SearchResult> {
        let matcher = NameMatch::words(query);
        self.search_all(&|name| matcher.matches(name))
    }
}

impl IndexEngine for FlatIndex {
    fn scan(
        &self,
        system: Option<&str>,
        test: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        Ok(match system {
            Some(system_id) => self.search_system(system_id, test),
            None => self.search_all(test),
        })
    }

    fn systems(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.systems.keys().cloned().collect())
    }

    fn total(&self) -> Result<usize, CatalogError> {
        Ok(self.systems.values().map(|lists| lists.paths.len()).sum())
    }
}

fn append_stream(
    builder: &mut tar::Builder<NamedTempFile>,
    name: &str,
    data: &str,
    mtime: u64,
) -> Result<(), CatalogError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    builder.append_data(&mut header, name, data.as_bytes())?;
    Ok(())
}

pub(crate) fn index_dir(index_path: &Path) -> &Path {
    match index_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
