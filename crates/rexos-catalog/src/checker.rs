//! Existence checks for indexed paths, including files inside archives

use crate::container::{list_entries, split_container_path};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Answers whether an indexed path still exists.
///
/// Archive listings are cached per archive for the lifetime of the checker.
/// Not `Sync`-shared: give each thread its own checker.
#[derive(Debug, Default)]
pub struct ExistenceChecker {
    containers: HashMap<String, HashSet<String>>,
}

impl ExistenceChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `path` exists on disk, or names an entry inside a readable archive
    pub fn exists(&mut self, path: &str) -> bool {
        if Path::new(path).exists() {
            return true;
        }

        match split_container_path(path) {
            Some((container, entry)) => self.container_has(container, entry),
            None => false,
        }
    }

    fn container_has(&mut self, container: &str, entry: &str) -> bool {
        let entries = self
            .containers
            .entry(container.to_string())
            .or_insert_with(|| match list_entries(Path::new(container)) {
                Ok(entries) => entries.into_iter().collect(),
                Err(err) => {
                    tracing::debug!("{}", err);
                    HashSet::new()
                }
            });

        entries.contains(entry)
    }

    /// Number of archives whose listing is cached
    pub fn cached_containers(&self) -> usize {
        self.containers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[&str]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for entry in entries {
            zip.start_file(*entry, options).unwrap();
            zip.write_all(b"ROM").unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_plain_paths() {
        let temp = TempDir::new().unwrap();
        let rom = temp.path().join("Contra.nes");
        std::fs::write(&rom, b"ROM").unwrap();

        let mut checker = ExistenceChecker::new();
        assert!(checker.exists(&rom.to_string_lossy()));
        assert!(!checker.exists(&temp.path().join("Gone.nes").to_string_lossy()));
        assert_eq!(checker.cached_containers(), 0);
    }

    #[test]
    fn test_container_entries() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pack.zip");
        write_zip(&archive, &["Contra.nes", "Sub/Kirby.nes"]);
        let base = archive.to_string_lossy().to_string();

        let mut checker = ExistenceChecker::new();
        assert!(checker.exists(&format!("{}/Contra.nes", base)));
        assert!(checker.exists(&format!("{}/Sub/Kirby.nes", base)));
        assert!(!checker.exists(&format!("{}/Kirby.nes", base)));
        assert!(!checker.exists(&format!("{}/contra.nes", base)));
        assert_eq!(checker.cached_containers(), 1);
    }

    #[test]
    fn test_listing_is_cached() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pack.zip");
        write_zip(&archive, &["Contra.nes"]);
        let entry = format!("{}/Contra.nes", archive.to_string_lossy());

        let mut checker = ExistenceChecker::new();
        assert!(checker.exists(&entry));

        std::fs::remove_file(&archive).unwrap();
        assert!(checker.exists(&entry));
    }

    #[test]
    fn test_unreadable_container_is_false() {
        let temp = TempDir::new().unwrap();
        let broken = temp.path().join("broken.zip");
        std::fs::write(&broken, b"garbage").unwrap();

        let mut checker = ExistenceChecker::new();
        assert!(!checker.exists(&format!("{}/Contra.nes", broken.to_string_lossy())));
        assert!(!checker.exists(&format!(
            "{}/Contra.nes",
            temp.path().join("missing.zip").to_string_lossy()
        )));
    }
}
