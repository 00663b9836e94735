use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RenderError {
    pub fn launch(message: impl Into<String>) -> Self {
        RenderError::Launch(message.into())
    }

    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn export(message: impl Into<String>) -> Self {
        RenderError::Export(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RenderError::Launch(_) => ErrorCategory::Launch,
            RenderError::NavigationTimeout(_) => ErrorCategory::NavigationTimeout,
            RenderError::Navigation { .. } | RenderError::InvalidUrl(_) => {
                ErrorCategory::Navigation
            }
            // Capture against a session that never reached `Loaded` is an export fault.
            RenderError::Export(_) | RenderError::InvalidState(_) => ErrorCategory::Export,
            RenderError::Io(_) => ErrorCategory::Io,
            RenderError::Config(_) => ErrorCategory::Config,
        }
    }

    /// Operator-facing hint logged next to the error. Never sent to HTTP callers.
    pub fn remediation(&self) -> &'static str {
        match self {
            RenderError::Launch(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("not found") || lower.contains("could not auto detect") {
                    "Install Chromium or set browser.executable / CHROME_PATH to an existing binary."
                } else if lower.contains("timed out") {
                    "Raise browser.launch_timeout or check host load; the engine did not come up in time."
                } else {
                    "Check the engine flags in browser.args and that the host can start Chromium."
                }
            }
            RenderError::NavigationTimeout(_) => {
                "Raise wait.navigation_timeout / wait.probe_timeout or check that the page stops polling the network."
            }
            RenderError::Navigation { .. } | RenderError::InvalidUrl(_) => {
                "Verify the target URL is well-formed (http:// or https://) and reachable from this host."
            }
            RenderError::Export(_) | RenderError::InvalidState(_) => {
                "Inspect the render logs for an earlier failure; capture requires a loaded page."
            }
            RenderError::Io(_) => "Check free space and permissions of the staging directory.",
            RenderError::Config(_) => "Fix the configuration file or CLI flags and restart.",
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Launch,
    NavigationTimeout,
    Navigation,
    Export,
    Io,
    Config,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Launch => "launch",
            ErrorCategory::NavigationTimeout => "navigation_timeout",
            ErrorCategory::Navigation => "navigation",
            ErrorCategory::Export => "export",
            ErrorCategory::Io => "io",
            ErrorCategory::Config => "config",
        };
        f.write_str(name)
    }
}
