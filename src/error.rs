//! Typed errors for the ambient configuration and boot-up layer. Guest-side
//! faults (undefined instructions, misaligned accesses) are handled in-band
//! inside the processor and never surface here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path}")]
    NotFound { path: PathBuf },

    #[error("configuration file at {path} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration file at {path} is not valid TOML: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum BootError {
    #[error("boot ROM at {path} could not be read: {source}")]
    BootRomUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cartridge image at {path} could not be read: {source}")]
    CartridgeUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cartridge image at {path} is empty")]
    EmptyCartridge { path: PathBuf },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
