//! Run progress reporting.
//!
//! The engine reports each agent's status per ticker; sinks decide where that
//! goes (tracing only, or also a live log stream for connected clients).

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait ProgressSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn update_status(&self, agent: &str, ticker: Option<&str>, status: &str) {
        let level = if status.starts_with("Failed") || status.starts_with("Error") {
            LogLevel::Warning
        } else if status == "Done" {
            LogLevel::Success
        } else {
            LogLevel::Info
        };
        self.log(level, &status_line(agent, ticker, status));
    }
}

/// `[agent] ticker: status`, or `[agent] status` without a ticker.
pub fn status_line(agent: &str, ticker: Option<&str>, status: &str) -> String {
    match ticker {
        Some(t) => format!("[{agent}] {t}: {status}"),
        None => format!("[{agent}] {status}"),
    }
}

/// Sends progress to `tracing` only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info | LogLevel::Success => tracing::info!(%level, "{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
    }
}
