//! Configuration file parsing, validation and hot reload.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize into RawConfig)
//!     → validation.rs (semantic checks)
//!     → ConfigSnapshot (validated, immutable)
//!     → executor::apply
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs builds a new snapshot
//!     → snapshot sent to the main loop, which applies it with force
//! ```
//!
//! A snapshot never changes after it is built. Every field of the file
//! format has a default, so an empty file is a valid configuration that
//! binds nothing. Serde handles shape errors; `validation` collects the
//! semantic ones (credentials, proxy names, rule targets, DNS) together.

pub mod loader;
pub mod schema;
pub mod snapshot;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use snapshot::{ConfigSnapshot, ControllerSettings, GeneralSettings};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
