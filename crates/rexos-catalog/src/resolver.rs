//! Mapping between games folders on disk and systems
//!
//! Games folders (`/roms`, `/media/usb0`, ...) hold one folder per system,
//! named after the system's configured folder names. Folder names are
//! matched case-insensitively since FAT-formatted cards do not preserve case
//! reliably.

use crate::CatalogError;
use rexos_config::{System, SystemRegistry};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A system's root folder inside a games folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPath {
    pub system_id: String,
    pub path: PathBuf,
}

/// Return `path` if it exists, otherwise the entry of its parent directory
/// whose name matches the final component ignoring case.
pub fn find_file(path: &Path) -> Option<PathBuf> {
    if path.exists() {
        return Some(path.to_path_buf());
    }

    let name = path.file_name()?.to_string_lossy().to_lowercase();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::read_dir(parent)
        .ok()?
        .flatten()
        .find(|entry| entry.file_name().to_string_lossy().to_lowercase() == name)
        .map(|entry| parent.join(entry.file_name()))
}

/// Every existing root folder of every system, across all games folders
pub fn system_paths(games_folders: &[PathBuf], systems: &[System]) -> Vec<SystemPath> {
    let mut found = Vec::new();

    for system in systems {
        for games_folder in games_folders {
            let Some(games_folder) = find_file(games_folder) else {
                continue;
            };

            for folder in &system.folders {
                if let Some(path) = find_file(&games_folder.join(folder)) {
                    found.push(SystemPath {
                        system_id: system.id.clone(),
                        path,
                    });
                }
            }
        }
    }

    found
}

/// The first existing root folder of each system, in games folder order
pub fn active_system_paths(games_folders: &[PathBuf], systems: &[System]) -> Vec<SystemPath> {
    systems
        .iter()
        .filter_map(|system| {
            games_folders
                .iter()
                .filter_map(|games_folder| find_file(games_folder))
                .flat_map(|games_folder| {
                    system
                        .folders
                        .iter()
                        .map(move |folder| games_folder.join(folder))
                })
                .find_map(|candidate| find_file(&candidate))
                .map(|path| SystemPath {
                    system_id: system.id.clone(),
                    path,
                })
        })
        .collect()
}

/// Group resolved folders by system id, keeping discovery order per system
pub fn group_by_system(paths: Vec<SystemPath>) -> BTreeMap<String, Vec<PathBuf>> {
    let mut grouped: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for SystemPath { system_id, path } in paths {
        grouped.entry(system_id).or_default().push(path);
    }
    grouped
}

/// Systems whose root folder contains `path`.
///
/// `path` must live under one of the games folders. Unless it refers to a
/// directory (exists as one, or ends with `/`), candidates are narrowed to
/// systems accepting its extension.
pub fn match_systems<'a>(
    games_folders: &[PathBuf],
    registry: &'a SystemRegistry,
    path: &Path,
) -> Vec<&'a System> {
    let raw = path.to_string_lossy();
    let lower = raw.to_lowercase();

    let containing: Vec<&PathBuf> = games_folders
        .iter()
        .filter(|folder| is_under(&lower, folder))
        .collect();
    if containing.is_empty() {
        return Vec::new();
    }

    let is_dir = raw.ends_with('/') || path.is_dir();

    registry
        .all()
        .iter()
        .filter(|system| {
            containing.iter().any(|games_folder| {
                system
                    .folders
                    .iter()
                    .any(|folder| is_under(&lower, &games_folder.join(folder)))
            })
        })
        .filter(|system| is_dir || system.matches_file(&raw))
        .collect()
}

/// True if lowercased `path` is `root` or lies below it, ignoring case
fn is_under(path: &str, root: &Path) -> bool {
    let root = root.to_string_lossy().to_lowercase();
    let root = root.trim_end_matches('/');
    path == root || path.starts_with(&format!("{}/", root))
}

/// The most likely system for `path`, preferring systems that belong to a
/// named set when several match.
pub fn best_match<'a>(
    games_folders: &[PathBuf],
    registry: &'a SystemRegistry,
    path: &Path,
) -> Result<&'a System, CatalogError> {
    let candidates = match_systems(games_folders, registry, path);

    candidates
        .iter()
        .find(|system| system.set_name.as_deref().is_some_and(|name| !name.is_empty()))
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| CatalogError::NoSystemMatch(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> SystemRegistry {
        SystemRegistry::builtin()
    }

    fn ids(systems: &[&System]) -> Vec<String> {
        systems.iter().map(|s| s.id.clone()).collect()
    }

    #[test]
    fn test_find_file_ignores_case() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("Snes")).unwrap();

        assert_eq!(
            find_file(&temp.path().join("SNES")),
            Some(temp.path().join("Snes"))
        );
        assert_eq!(
            find_file(&temp.path().join("Snes")),
            Some(temp.path().join("Snes"))
        );
        assert_eq!(find_file(&temp.path().join("GBA")), None);
        assert_eq!(find_file(&temp.path().join("missing/GBA")), None);
    }

    #[test]
    fn test_system_paths_across_games_folders() {
        let temp = TempDir::new().unwrap();
        let sd = temp.path().join("roms");
        let usb = temp.path().join("usb0");
        fs::create_dir_all(sd.join("NES")).unwrap();
        fs::create_dir_all(sd.join("fds")).unwrap();
        fs::create_dir_all(usb.join("nes")).unwrap();

        let registry = registry();
        let systems = vec![
            registry.lookup("NES").unwrap().clone(),
            registry.lookup("FDS").unwrap().clone(),
            registry.lookup("SNES").unwrap().clone(),
        ];
        let folders = vec![sd.clone(), usb.clone(), temp.path().join("absent")];

        let paths = system_paths(&folders, &systems);
        assert_eq!(
            paths,
            vec![
                SystemPath { system_id: "NES".into(), path: sd.join("NES") },
                SystemPath { system_id: "NES".into(), path: usb.join("nes") },
                SystemPath { system_id: "FDS".into(), path: sd.join("NES") },
                SystemPath { system_id: "FDS".into(), path: sd.join("fds") },
                SystemPath { system_id: "FDS".into(), path: usb.join("nes") },
            ]
        );

        let grouped = group_by_system(paths);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["NES"], vec![sd.join("NES"), usb.join("nes")]);

        let active = active_system_paths(&folders, &systems);
        assert_eq!(
            active,
            vec![
                SystemPath { system_id: "NES".into(), path: sd.join("NES") },
                SystemPath { system_id: "FDS".into(), path: sd.join("NES") },
            ]
        );
    }

    #[test]
    fn test_match_systems_by_folder_and_extension() {
        let registry = registry();
        let folders = vec![PathBuf::from("/roms"), PathBuf::from("/media/usb0")];

        let matched = match_systems(&folders, &registry, Path::new("/roms/snes/Super Metroid.SFC"));
        assert_eq!(ids(&matched), vec!["SNES"]);

        // NES folder is shared with FDS, extension decides
        let matched = match_systems(&folders, &registry, Path::new("/roms/NES/Zelda.fds"));
        assert_eq!(ids(&matched), vec!["FDS"]);

        let matched = match_systems(&folders, &registry, Path::new("/roms/NES/readme.txt"));
        assert!(matched.is_empty());

        let matched = match_systems(&folders, &registry, Path::new("/srv/NES/Contra.nes"));
        assert!(matched.is_empty());
    }

    #[test]
    fn test_match_systems_games_folders_sharing_prefix() {
        let registry = registry();
        let folders = vec![
            PathBuf::from("/roms"),
            PathBuf::from("/roms2"),
            PathBuf::from("/media/usb0"),
        ];

        let matched = match_systems(&folders, &registry, Path::new("/roms2/SNES/Super Metroid.sfc"));
        assert_eq!(ids(&matched), vec!["SNES"]);

        let best = best_match(&folders, &registry, Path::new("/ROMS2/nes/Contra.nes")).unwrap();
        assert_eq!(best.id, "NES");

        // "/roms/SNES" must not claim "/roms/SNES2"
        let matched = match_systems(&folders, &registry, Path::new("/roms/SNES2/Super Metroid.sfc"));
        assert!(matched.is_empty());
    }

    #[test]
    fn test_match_systems_trailing_slash_games_folder() {
        let registry = registry();
        let folders = vec![PathBuf::from("/media/usb0/")];

        let matched = match_systems(&folders, &registry, Path::new("/media/usb0/GBA/Metroid Fusion.gba"));
        assert_eq!(ids(&matched), vec!["GBA"]);
    }

    #[test]
    fn test_match_systems_directory_reference() {
        let registry = registry();
        let folders = vec![PathBuf::from("/roms")];

        let matched = match_systems(&folders, &registry, Path::new("/roms/NES/"));
        assert_eq!(ids(&matched), vec!["NES", "FDS"]);
    }

    #[test]
    fn test_best_match_prefers_set_name() {
        let registry = SystemRegistry::new(vec![
            System::new("Plain", "Plain", &["MIXED"], &[".bin"]),
            System::new("Grouped", "Grouped", &["MIXED"], &[".bin"]).with_set_name("Grouped"),
        ]);
        let folders = vec![PathBuf::from("/roms")];

        let best = best_match(&folders, &registry, Path::new("/roms/MIXED/game.bin")).unwrap();
        assert_eq!(best.id, "Grouped");
    }

    #[test]
    fn test_best_match_first_without_set_name() {
        let registry = SystemRegistry::new(vec![
            System::new("First", "First", &["MIXED"], &[".bin"]),
            System::new("Second", "Second", &["MIXED"], &[".bin"]),
        ]);
        let folders = vec![PathBuf::from("/roms")];

        let best = best_match(&folders, &registry, Path::new("/roms/MIXED/game.bin")).unwrap();
        assert_eq!(best.id, "First");
    }

    #[test]
    fn test_best_match_no_system() {
        let registry = registry();
        let folders = vec![PathBuf::from("/roms")];

        let err = best_match(&folders, &registry, Path::new("/roms/Unknown/game.xyz")).unwrap_err();
        assert!(matches!(err, CatalogError::NoSystemMatch(_)));
    }
}
