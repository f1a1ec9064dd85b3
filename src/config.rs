//! Configuration management for nst-emu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`NST_EMU_TCDM_BYTES`, ...)
//! 2. Project-local config file (`./nst-emu.toml`)
//! 3. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # nst-emu.toml
//!
//! # TCDM size in bytes (default 128 KiB)
//! tcdm_bytes = 131072
//!
//! # Assert AGU cursors against the TCDM window while jobs run
//! check_tcdm_addrs = true
//!
//! # Where --dump writes job and memory dumps
//! dump_dir = "dumps"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// nst-emu configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// TCDM size in bytes.
    pub tcdm_bytes: Option<usize>,

    /// Whether jobs run with the AGU address window assertion enabled.
    pub check_tcdm_addrs: Option<bool>,

    /// Directory for job and memory dumps.
    pub dump_dir: Option<String>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `nst-emu.toml`
    /// 3. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(local) = Self::load_local_config() {
            config.merge(local);
        }

        config.apply_env_overrides();
        config
    }

    /// Get the cached global configuration.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// TCDM size in bytes, defaulting to the reference 128 KiB buffer.
    pub fn tcdm_bytes(&self) -> usize {
        self.tcdm_bytes.unwrap_or(128 * 1024)
    }

    /// Whether to run with the AGU address window assertion. Defaults on.
    pub fn check_tcdm_addrs(&self) -> bool {
        self.check_tcdm_addrs.unwrap_or(true)
    }

    /// Dump directory, defaulting to `dumps`.
    pub fn dump_dir(&self) -> String {
        self.dump_dir.clone().unwrap_or_else(|| "dumps".to_string())
    }

    /// Load project-local configuration from ./nst-emu.toml
    fn load_local_config() -> Option<Self> {
        Self::load_from_file(Path::new("nst-emu.toml"))
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.tcdm_bytes.is_some() {
            self.tcdm_bytes = other.tcdm_bytes;
        }
        if other.check_tcdm_addrs.is_some() {
            self.check_tcdm_addrs = other.check_tcdm_addrs;
        }
        if other.dump_dir.is_some() {
            self.dump_dir = other.dump_dir;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("NST_EMU_TCDM_BYTES") {
            match v.parse() {
                Ok(bytes) => self.tcdm_bytes = Some(bytes),
                Err(_) => log::warn!("Ignoring unparsable NST_EMU_TCDM_BYTES={}", v),
            }
        }
        if let Ok(v) = std::env::var("NST_EMU_CHECK_TCDM") {
            self.check_tcdm_addrs = Some(v != "0" && !v.eq_ignore_ascii_case("false"));
        }
        if let Ok(v) = std::env::var("NST_EMU_DUMP_DIR") {
            self.dump_dir = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tcdm_bytes(), 128 * 1024);
        assert!(config.check_tcdm_addrs());
        assert_eq!(config.dump_dir(), "dumps");
    }

    #[test]
    fn test_merge_prefers_other_when_set() {
        let mut base = Config::default();
        base.tcdm_bytes = Some(4096);
        base.merge(Config {
            tcdm_bytes: None,
            check_tcdm_addrs: Some(false),
            dump_dir: None,
        });
        assert_eq!(base.tcdm_bytes(), 4096);
        assert!(!base.check_tcdm_addrs());
    }

    #[test]
    fn test_toml_parsing() {
        let config: Config =
            toml::from_str("tcdm_bytes = 8192\ncheck_tcdm_addrs = false\n").unwrap();
        assert_eq!(config.tcdm_bytes(), 8192);
        assert!(!config.check_tcdm_addrs());
        assert!(config.dump_dir.is_none());
    }
}
