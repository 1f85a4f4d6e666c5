// ─────────────────────────────────────────────────────────────────────────────
//  avr-upload :: error
// ─────────────────────────────────────────────────────────────────────────────

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    /// A required configuration key is missing or malformed.
    #[error("Configuration error for '{key}': {reason}")]
    Config { key: String, reason: String },

    #[error("Could not find a board on the selected port '{port}' (waited {elapsed_ms} ms)\n  \
             Hint: check that you have the correct port selected. If it is correct, \
             try pressing the board's reset button after initiating the upload")]
    DeviceNotFound { port: String, elapsed_ms: u64 },

    #[error("Port '{port}' not accessible: {source}")]
    PortAccess {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Could not list serial ports: {0}")]
    PortEnumeration(#[source] serialport::Error),

    #[error("Could not launch {program}: {source}\n  Hint: install avrdude or point `hardware` at an Arduino install")]
    ToolLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {}: {source}", path.display())]
    SettingsFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn missing(key: &str) -> Self {
        UploadError::Config {
            key:    key.to_owned(),
            reason: "missing".into(),
        }
    }

    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        UploadError::Config {
            key:    key.to_owned(),
            reason: reason.into(),
        }
    }

    /// True for configuration problems (abort before anything touches the board).
    pub fn is_config(&self) -> bool {
        matches!(self, UploadError::Config { .. } | UploadError::SettingsFile { .. })
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
