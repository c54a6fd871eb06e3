//! Kernel configuration loading and parsing.
//!
//! Parses `trellis.toml` (or an override path supplied by the embedder),
//! extracting the module search path and string-arena tuning. Unknown fields
//! are ignored so the file can grow without breaking older kernels; a file
//! that fails to parse falls back to defaults rather than aborting startup.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

/// Smallest permitted arena chunk; configured values below this are clamped.
pub const MIN_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Deserialize, Clone)]
pub struct ModulesConfig {
    /// Directories searched for loadable modules, in order. The process
    /// working directory is always searched last.
    #[serde(default)]
    pub dirs: Vec<PathBuf>,
    /// Whether `attach-*` misses may trigger `global-load-module`.
    #[serde(default = "ModulesConfig::default_autoload")]
    pub autoload: bool,
}

impl ModulesConfig {
    const fn default_autoload() -> bool {
        true
    }
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            autoload: Self::default_autoload(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArenaConfig {
    /// Requested chunk size for the short-string arena.
    #[serde(default = "ArenaConfig::default_chunk_size")]
    pub chunk_size: usize,
}

impl ArenaConfig {
    const fn default_chunk_size() -> usize {
        MIN_CHUNK_SIZE
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::default_chunk_size(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub modules: ModulesConfig,
    #[serde(default)]
    pub arena: ArenaConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Original file string, when one was read.
    pub raw: Option<String>,
    /// Parsed (or default) data.
    pub file: ConfigFile,
}

impl Config {
    /// Arena chunk size with the minimum applied.
    pub fn effective_chunk_size(&self) -> usize {
        let raw = self.file.arena.chunk_size;
        let clamped = raw.max(MIN_CHUNK_SIZE);
        if clamped != raw {
            info!(target: "config", raw, clamped, "arena_chunk_size_clamped");
        }
        clamped
    }
}

/// Best-effort config path: the working directory first, then the platform
/// config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("trellis.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("trellis").join("trellis.toml");
    }
    PathBuf::from("trellis.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => Ok(Config {
                raw: Some(content),
                file,
            }),
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "parse_failed_using_defaults");
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}
