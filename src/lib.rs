// ─────────────────────────────────────────────────────────────────────────────
//  avr_upload  ·  public library API
// ─────────────────────────────────────────────────────────────────────────────

//! Drive avrdude uploads to AVR boards.
//!
//! Board and programmer configuration is turned into an avrdude argument
//! vector. Boards with a USB-CDC bootloader (Leonardo, Micro, …) are first
//! reset with a 1200-baud touch, after which the bootloader's port is found
//! again before flashing.
//!
//! ```no_run
//! use avr_upload::{Settings, UploadRequest, Uploader};
//!
//! let mut settings = Settings::load_default()?;
//! settings.preset = Some("leonardo".into());
//! settings.preferences.insert("serial.port", "/dev/ttyACM0");
//!
//! let outcome = Uploader::system(settings).upload(&UploadRequest {
//!     build_path:       "build".into(),
//!     artifact_name:    "blink".into(),
//!     using_programmer: false,
//! })?;
//! assert!(outcome.success, "{}", outcome.output);
//! # Ok::<(), avr_upload::UploadError>(())
//! ```

pub mod avrdude;
pub mod boards;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod ports;
pub mod reset;
pub mod tools;
pub mod upload;

pub use avrdude::ArgumentVector;
pub use boards::{Board, Programmer};
pub use clock::{Clock, SystemClock};
pub use config::{ConfigSource, Profile, Settings, Target, TargetTable};
pub use error::{Result, UploadError};
pub use executor::{AvrdudeRunner, ExecOutcome, ProcessExecutor};
pub use ports::{PortEnumerator, PortSnapshot, PortToucher, SystemPorts};
pub use reset::{ResetKind, ResetTiming, Restoration};
pub use tools::{Platform, ToolPrefix};
pub use upload::{BurnOutcome, UploadMode, UploadOutcome, UploadRequest, Uploader};
