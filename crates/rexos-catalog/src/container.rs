//! ROM archives treated as pseudo-directories

use crate::CatalogError;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path};
use tracing::debug;

/// File suffix of archives opened during crawling
pub const CONTAINER_EXTENSION: &str = ".zip";

/// True when the file name ends in the container extension (case-insensitive)
pub fn is_container(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(CONTAINER_EXTENSION)
        })
        .unwrap_or(false)
}

/// List the file entries of an archive.
///
/// Directory entries are skipped, as are entries whose name is absolute or
/// climbs out of the archive with `..`.
pub fn list_entries(path: &Path) -> Result<Vec<String>, CatalogError> {
    let unreadable = |reason: String| CatalogError::ContainerUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| unreadable(e.to_string()))?;
    let archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| unreadable(e.to_string()))?;

    let entries = archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .filter(|name| {
            let contained = is_contained(name);
            if !contained {
                debug!("Skipping entry {:?} of {}", name, path.display());
            }
            contained
        })
        .map(|name| name.to_string())
        .collect();

    Ok(entries)
}

/// True if every component of `entry` is a plain name
fn is_contained(entry: &str) -> bool {
    !entry.is_empty()
        && Path::new(entry)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

/// Split `<container>.zip/<entry>` into its container path and entry name
pub fn split_container_path(path: &str) -> Option<(&str, &str)> {
    let marker = format!("{}/", CONTAINER_EXTENSION);
    let lower = path.to_ascii_lowercase();
    let idx = lower.find(&marker)?;

    let container = &path[..idx + CONTAINER_EXTENSION.len()];
    let entry = &path[idx + marker.len()..];
    if entry.is_empty() {
        return None;
    }

    Some((container, entry))
}
