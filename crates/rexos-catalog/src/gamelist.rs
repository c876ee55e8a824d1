//! Plain-text gamelists, one file per system listing every game path

use crate::crawler::dedupe_by_base_name;
use crate::{CatalogError, CrawlEntry};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of a system's gamelist
pub fn gamelist_filename(system_id: &str) -> String {
    format!("{}_gamelist.txt", system_id.to_lowercase())
}

/// Write a gamelist per system into `dir`, replacing existing ones.
///
/// With `dedupe`, only the first path for each file name is listed.
/// Returns the number of paths written across all gamelists.
pub fn write_gamelists(dir: &Path, entries: &[CrawlEntry], dedupe: bool) -> Result<usize, CatalogError> {
    let mut grouped: BTreeMap<&str, Vec<PathBuf>> = BTreeMap::new();
    for entry in entries {
        grouped
            .entry(entry.system_id.as_str())
            .or_default()
            .push(entry.path.clone());
    }

    fs::create_dir_all(dir)?;

    let mut written = 0;
    for (system_id, paths) in grouped {
        let paths = if dedupe {
            dedupe_by_base_name(&paths)
        } else {
            paths
        };

        let mut temp = tempfile::Builder::new()
            .prefix(".gamelist-")
            .tempfile_in(dir)?;
        for path in &paths {
            writeln!(temp, "{}", path.display())?;
        }
        temp.as_file().sync_all()?;

        let target = dir.join(gamelist_filename(system_id));
        temp.persist(&target).map_err(|err| CatalogError::Persist {
            path: target.clone(),
            source: err.error,
        })?;

        info!("Wrote {} games to {}", paths.len(), target.display());
        written += paths.len();
    }

    Ok(written)
}
