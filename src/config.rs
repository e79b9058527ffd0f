//=========================================================================
// Runtime Configuration
//=========================================================================
//
// TOML file read once at startup. Every field has a default, so a
// missing file or a partial one is fine; a malformed one is an error.
//
// ```toml
// script_root = "scripts"
// entry = "main.lua"
// hot_reload = true
// target_fps = 60.0
// console_toggle_key = "backquote"
// ```
//
//=========================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::core::input::KeyCode;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory holding the script tree; watched for hot reload.
    pub script_root: PathBuf,
    /// Entry file, relative to `script_root`.
    pub entry: String,
    pub hot_reload: bool,
    pub target_fps: f64,
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub console_toggle_key: String,
    /// `env_logger` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            script_root: PathBuf::from("scripts"),
            entry: "main.lua".to_string(),
            hot_reload: true,
            target_fps: 60.0,
            window_title: "Aetheric Runtime".to_string(),
            window_width: 1280,
            window_height: 720,
            console_toggle_key: "backquote".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Reads `path`. A file that does not exist yields the defaults.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(EngineError::ConfigIo {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config = Self::parse(&content).map_err(|source| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.console_key()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn console_key(&self) -> EngineResult<KeyCode> {
        Ok(self.console_toggle_key.parse()?)
    }

    pub fn entry_path(&self) -> PathBuf {
        self.script_root.join(&self.entry)
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
