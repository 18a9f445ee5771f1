//! Emulator configuration: host-facing settings persisted as TOML,
//! loaded once at startup and otherwise left untouched by the core.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "pocketdmi_config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorConfig {
    pub boot: BootConfig,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootConfig {
    /// Path to the 16 KiB boot ROM image.
    pub boot_rom_path: PathBuf,

    /// Path to the last-loaded cartridge image, if any.
    pub cartridge_path: Option<PathBuf>,

    /// Directory backup images are persisted to between sessions.
    pub backup_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub scale: u32,
    pub vsync: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub enabled: bool,
    pub volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Verbosity passed through to `env_logger`'s filter, e.g. "info" or
    /// "pocketdmi::cpu=debug".
    pub verbosity: String,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        EmulatorConfig {
            boot: BootConfig {
                boot_rom_path: PathBuf::from("boot.bin"),
                cartridge_path: None,
                backup_directory: PathBuf::from("saves"),
            },
            video: VideoConfig {
                scale: 3,
                vsync: true,
            },
            audio: AudioConfig {
                enabled: true,
                volume: 0.5,
            },
            trace: TraceConfig {
                verbosity: "info".to_string(),
            },
        }
    }
}

impl EmulatorConfig {
    /// Loads configuration from the default file, falling back to (and
    /// persisting) defaults when the file is missing.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(ConfigError::NotFound { .. }) => {
                let config = Self::default();
                let _ = config.save();
                config
            }
            Err(err) => {
                log::warn!("falling back to default configuration: {err}");
                Self::default()
            }
        }
    }

    pub fn load() -> Result<Self, ConfigError> {
        let path = PathBuf::from(CONFIG_FILE);
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Malformed { path, source })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = PathBuf::from(CONFIG_FILE);
        let contents = toml::to_string_pretty(self).expect("EmulatorConfig always serializes");
        fs::write(&path, contents).map_err(|source| ConfigError::Unreadable { path, source })
    }
}
