//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Runtime::new → apply(force) → control API → watcher
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Shutdown::trigger → API drains → Runtime::shutdown
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!     SIGHUP → reload config file with force
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{SignalAction, Signals};
