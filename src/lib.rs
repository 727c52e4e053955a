//! Local proxy gateway core: listener reconciliation, configuration
//! dispatch and the control API.

pub mod api;
pub mod auth;
pub mod config;
pub mod dns;
pub mod executor;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod outbound;
pub mod runtime;
pub mod tunnel;

pub use config::ConfigSnapshot;
pub use executor::{apply, ApplyReport};
pub use lifecycle::Shutdown;
pub use runtime::Runtime;
