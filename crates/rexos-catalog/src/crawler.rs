//! Games folder crawling
//!
//! Walks a system's root folder and returns every file matching the system's
//! extensions. Archives are opened as pseudo-directories and their matching
//! entries reported as `<archive>/<entry>`. Symlinked folders are followed but
//! reported under the symlink's own (logical) location.

use crate::container::{is_container, list_entries};
use crate::{CatalogError, CrawlEntry};
use rexos_config::{System, SystemRegistry};
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Crawl `root` for files belonging to `system`.
///
/// Fails with [`CatalogError::RootUnavailable`] if `root` cannot be statted,
/// is not a directory (after following symlinks) or cannot be listed.
/// Result order follows directory iteration order and is not guaranteed.
pub fn crawl(system: &System, root: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let unavailable = || CatalogError::RootUnavailable {
        path: root.to_path_buf(),
    };

    let metadata = fs::metadata(root).map_err(|_| unavailable())?;
    if !metadata.is_dir() {
        return Err(unavailable());
    }

    let mut walker = Walker::new(system);
    let mut found = Vec::new();
    walker.walk(root, &mut found).map_err(|err| {
        warn!("Cannot read root folder {}: {}", root.display(), err);
        unavailable()
    })?;

    debug!(
        "Crawled {} for {}: {} files",
        root.display(),
        system.id,
        found.len()
    );
    Ok(found)
}

/// Crawl every `(system, root folder)` pair.
///
/// `on_progress` is called with the system id and root before each crawl.
/// Stops at the first error; callers wanting to skip failing roots should
/// call [`crawl`] per pair instead.
pub fn crawl_all<F>(
    registry: &SystemRegistry,
    system_paths: &BTreeMap<String, Vec<PathBuf>>,
    mut on_progress: F,
) -> Result<Vec<CrawlEntry>, CatalogError>
where
    F: FnMut(&str, &Path),
{
    let mut entries = Vec::new();

    for (system_id, roots) in system_paths {
        let system = registry.lookup(system_id)?;

        for root in roots {
            on_progress(&system.id, root);
            let paths = crawl(system, root)?;
            entries.extend(
                paths
                    .into_iter()
                    .map(|path| CrawlEntry::new(system.id.clone(), path)),
            );
        }
    }

    Ok(entries)
}

/// Keep only the first path seen for each file name
pub fn dedupe_by_base_name(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen: HashSet<OsString> = HashSet::new();

    paths
        .iter()
        .filter(|path| match path.file_name() {
            Some(name) => seen.insert(name.to_os_string()),
            None => true,
        })
        .cloned()
        .collect()
}

/// Physical identity of a directory, used to break symlink cycles
#[derive(Debug, PartialEq, Eq, Hash)]
enum DirIdentity {
    #[cfg(unix)]
    Inode { dev: u64, ino: u64 },
    #[cfg(not(unix))]
    Canonical(PathBuf),
}

impl DirIdentity {
    #[cfg(unix)]
    fn of(_path: &Path, metadata: &Metadata) -> io::Result<Self> {
        use std::os::unix::fs::MetadataExt;
        Ok(DirIdentity::Inode {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(path: &Path, _metadata: &Metadata) -> io::Result<Self> {
        Ok(DirIdentity::Canonical(fs::canonicalize(path)?))
    }
}

struct Walker<'a> {
    system: &'a System,
    visited: HashSet<DirIdentity>,
}

impl<'a> Walker<'a> {
    fn new(system: &'a System) -> Self {
        Self {
            system,
            visited: HashSet::new(),
        }
    }

    /// Walk `dir`, appending matches to `found`.
    ///
    /// Only errors reading `dir` itself are returned; unreadable children are
    /// logged and skipped.
    fn walk(&mut self, dir: &Path, found: &mut Vec<PathBuf>) -> io::Result<()> {
        let metadata = fs::metadata(dir)?;
        if !self.visited.insert(DirIdentity::of(dir, &metadata)?) {
            debug!("Already visited {}, skipping", dir.display());
            return Ok(());
        }

        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Error reading {}: {}", dir.display(), err);
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    warn!("Cannot stat {}: {}", path.display(), err);
                    continue;
                }
            };

            if file_type.is_symlink() {
                self.visit_symlink(&path, found);
            } else if file_type.is_dir() {
                if let Err(err) = self.walk(&path, found) {
                    warn!("Skipping unreadable folder {}: {}", path.display(), err);
                }
            } else if file_type.is_file() {
                self.visit_file(&path, found);
            }
        }

        Ok(())
    }

    fn visit_symlink(&mut self, link: &Path, found: &mut Vec<PathBuf>) {
        let target = match fs::canonicalize(link) {
            Ok(target) => target,
            Err(err) => {
                debug!("Skipping broken symlink {}: {}", link.display(), err);
                return;
            }
        };

        let metadata = match fs::metadata(&target) {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!("Skipping symlink {}: {}", link.display(), err);
                return;
            }
        };

        if metadata.is_dir() {
            let mut linked = Vec::new();
            if let Err(err) = self.walk(&target, &mut linked) {
                warn!("Skipping unreadable folder {}: {}", link.display(), err);
            }
            found.extend(
                linked
                    .into_iter()
                    .map(|path| relocate(&path, &target, link)),
            );
        } else if metadata.is_file() {
            self.visit_file(link, found);
        }
    }

    fn visit_file(&self, path: &Path, found: &mut Vec<PathBuf>) {
        if is_container(path) {
            match list_entries(path) {
                Ok(entries) => {
                    for entry in entries {
                        if self.system.matches_file(&entry) {
                            found.push(path.join(entry));
                        }
                    }
                }
                Err(err) => warn!("{}", err),
            }
        } else if self.system.matches_file(&path.to_string_lossy()) {
            found.push(path.to_path_buf());
        }
    }
}

/// Rewrite a path found under `physical` so it sits under `logical` instead
fn relocate(path: &Path, physical: &Path, logical: &Path) -> PathBuf {
    match path.strip_prefix(physical) {
        Ok(rest) => logical.join(rest),
        Err(_) => path.to_path_buf(),
    }
}
