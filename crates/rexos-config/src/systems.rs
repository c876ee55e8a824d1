//! System registry
//!
//! Static definitions of the platforms the catalog knows about: which folder
//! names hold their games and which file extensions are playable.

use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// A game system (emulated platform)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    /// Canonical identifier (e.g., "GameboyColor")
    pub id: String,

    /// Display name
    pub name: String,

    /// Alternate spellings accepted by lookups
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Shared BIOS/set grouping marker
    #[serde(default)]
    pub set_name: Option<String>,

    /// Folder names, relative to a games folder
    #[serde(default)]
    pub folders: Vec<String>,

    /// Playable file extensions (".nes", ".sfc", ...)
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl System {
    pub fn new(id: &str, name: &str, folders: &[&str], extensions: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            aliases: Vec::new(),
            set_name: None,
            folders: folders.iter().map(|f| f.to_string()).collect(),
            extensions: extensions.iter().map(|e| normalize_extension(e)).collect(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_set_name(mut self, set_name: &str) -> Self {
        self.set_name = Some(set_name.to_string());
        self
    }

    /// True when `path` ends in one of this system's extensions (case-insensitive)
    pub fn matches_file(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        self.extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
    }

    /// True when `id` names this system or one of its aliases
    pub fn is_named(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(id))
    }

    fn normalize(&mut self) {
        self.extensions = self.extensions.iter().map(|e| normalize_extension(e)).collect();
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Read-only table of known systems
#[derive(Debug, Clone)]
pub struct SystemRegistry {
    systems: Vec<System>,
}

impl Default for SystemRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SystemRegistry {
    /// Registry containing only the given systems
    pub fn new(systems: Vec<System>) -> Self {
        let mut registry = Self { systems: Vec::new() };
        registry.extend(systems);
        registry
    }

    /// Built-in system table
    pub fn builtin() -> Self {
        Self::new(builtin_systems())
    }

    /// Add systems, replacing any existing entry with the same id
    pub fn extend(&mut self, systems: impl IntoIterator<Item = System>) {
        for mut system in systems {
            system.normalize();
            match self
                .systems
                .iter_mut()
                .find(|s| s.id.eq_ignore_ascii_case(&system.id))
            {
                Some(existing) => *existing = system,
                None => self.systems.push(system),
            }
        }
    }

    /// Look up a system by id or alias (case-insensitive)
    pub fn lookup(&self, id: &str) -> Result<&System, ConfigError> {
        self.systems
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(id))
            .or_else(|| self.systems.iter().find(|s| s.is_named(id)))
            .ok_or_else(|| ConfigError::UnknownSystem(id.to_string()))
    }

    /// All systems, in registry order
    pub fn all(&self) -> &[System] {
        &self.systems
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

fn builtin_systems() -> Vec<System> {
    vec![
        // Nintendo
        System::new("NES", "NES", &["NES"], &[".nes"]),
        System::new("FDS", "Famicom Disk System", &["NES", "FDS"], &[".fds"])
            .with_aliases(&["FamicomDiskSystem"])
            .with_set_name("FDS"),
        System::new("SNES", "SNES", &["SNES"], &[".sfc", ".smc"])
            .with_aliases(&["SuperNintendo"]),
        System::new("Gameboy", "Gameboy", &["GAMEBOY"], &[".gb"]).with_aliases(&["GB"]),
        System::new("GameboyColor", "Gameboy Color", &["GAMEBOY", "GBC"], &[".gbc"])
            .with_aliases(&["GBC"])
            .with_set_name("GBC"),
        System::new("GBA", "Gameboy Advance", &["GBA"], &[".gba"])
            .with_aliases(&["GameboyAdvance"]),
        // Sega
        System::new("Genesis", "Genesis", &["Genesis"], &[".bin", ".gen", ".md"])
            .with_aliases(&["MegaDrive"]),
        System::new("MasterSystem", "Master System", &["SMS"], &[".sms"]).with_aliases(&["SMS"]),
        System::new("GameGear", "Game Gear", &["SMS", "GameGear"], &[".gg"])
            .with_aliases(&["GG"])
            .with_set_name("GameGear"),
        // Atari
        System::new("Atari2600", "Atari 2600", &["ATARI7800", "Atari2600"], &[".a26"])
            .with_set_name("Atari2600"),
        System::new("Atari7800", "Atari 7800", &["ATARI7800"], &[".a78"]),
        // NEC
        System::new("TurboGrafx16", "TurboGrafx-16", &["TGFX16"], &[".pce", ".sgx"])
            .with_aliases(&["PCEngine"]),
        // Sony
        System::new("PSX", "Playstation", &["PSX"], &[".cue", ".chd", ".exe"])
            .with_aliases(&["Playstation", "PS1"]),
        // Arcade
        System::new("Arcade", "Arcade", &["_Arcade"], &[".mra"]),
    ]
}
