//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Hold the current log verbosity
//! - Re-target the filter at runtime when `log-level` changes
//!
//! # Design Decisions
//! - `tracing` + `tracing-subscriber` with an `EnvFilter` behind a reload layer
//! - `RUST_LOG`, when set, overrides the configured level at startup only
//! - A `LogControl` without an installed handle still tracks the level,
//!   so isolated runtimes in tests need no global subscriber

use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Configured log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Silent,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    /// Filter directive understood by `EnvFilter`.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "off",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Get/set access to the process log verbosity.
#[derive(Default)]
pub struct LogControl {
    level: Mutex<LogLevel>,
    handle: Option<FilterHandle>,
}

impl LogControl {
    /// A control that only records the level.
    pub fn detached(level: LogLevel) -> Self {
        Self {
            level: Mutex::new(level),
            handle: None,
        }
    }

    pub fn with_handle(level: LogLevel, handle: FilterHandle) -> Self {
        Self {
            level: Mutex::new(level),
            handle: Some(handle),
        }
    }

    pub fn level(&self) -> LogLevel {
        *self.level.lock().expect("log level mutex poisoned")
    }

    pub fn set_level(&self, level: LogLevel) {
        *self.level.lock().expect("log level mutex poisoned") = level;

        if let Some(handle) = &self.handle {
            if let Err(e) = handle.reload(filter_for(level)) {
                tracing::warn!(error = %e, "Failed to reload log filter");
                return;
            }
        }
        tracing::info!(level = %level, "Log level updated");
    }
}

fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::new(format!("{},tower_http={}", level.directive(), level.directive()))
}

/// Install the global subscriber and return a control bound to it.
pub fn init(level: LogLevel) -> LogControl {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level));
    let (filter_layer, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();

    LogControl::with_handle(level, handle)
}
