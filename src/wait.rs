//! When is a page ready to capture?
//!
//! There is no generic answer. [`RenderWaitPolicy`] approximates it: wait for
//! network quiescence within a navigation deadline, optionally scroll to wake
//! lazy content, sleep a fixed settle delay for client-side rendering, then
//! poll an optional [`ReadinessProbe`] for a stricter signal.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::browser::{EnginePage, NetworkActivity};
use crate::{RenderError, Result};

/// Overall deadline for navigation plus quiescence.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);

/// How long the network must stay quiet.
pub const DEFAULT_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// Requests allowed to remain in flight while still counting as quiet.
pub const DEFAULT_MAX_INFLIGHT: usize = 2;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Scrolls to the bottom of the document so lazy loaders fire.
pub const SCROLL_SCRIPT: &str = "(() => { const el = document.scrollingElement || document.body; window.scrollTo(0, el.scrollHeight); return el.scrollHeight; })()";

/// A caller-supplied readiness condition evaluated after the settle delay.
#[async_trait]
pub trait ReadinessProbe: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn is_ready(&self, page: &dyn EnginePage) -> Result<bool>;
}

/// Ready once `document.readyState` is `complete`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentReadyProbe;

#[async_trait]
impl ReadinessProbe for DocumentReadyProbe {
    fn name(&self) -> &str {
        "document-ready"
    }

    async fn is_ready(&self, page: &dyn EnginePage) -> Result<bool> {
        let value = page
            .evaluate("document.readyState === 'complete'")
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

/// Ready once an element matching a CSS selector exists.
#[derive(Debug, Clone)]
pub struct SelectorProbe {
    selector: String,
}

impl SelectorProbe {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    fn expression(&self) -> String {
        // serde_json quoting yields a valid JS string literal.
        let literal = serde_json::Value::String(self.selector.clone()).to_string();
        format!("document.querySelector({literal}) !== null")
    }
}

#[async_trait]
impl ReadinessProbe for SelectorProbe {
    fn name(&self) -> &str {
        "selector"
    }

    async fn is_ready(&self, page: &dyn EnginePage) -> Result<bool> {
        let value = page.evaluate(&self.expression()).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

/// Wait semantics applied by [`crate::browser::BrowserSession::navigate`].
#[derive(Debug, Clone)]
pub struct RenderWaitPolicy {
    pub navigation_timeout: Duration,
    pub idle_window: Duration,
    pub max_inflight: usize,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub scroll_before_settle: bool,
    pub probe: Option<Arc<dyn ReadinessProbe>>,
    pub probe_timeout: Duration,
}

impl Default for RenderWaitPolicy {
    fn default() -> Self {
        Self {
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            idle_window: DEFAULT_IDLE_WINDOW,
            max_inflight: DEFAULT_MAX_INFLIGHT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            scroll_before_settle: false,
            probe: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl RenderWaitPolicy {
    /// Upper bound on the time a page can spend in navigation and settling.
    pub fn max_duration(&self) -> Duration {
        let probe = if self.probe.is_some() {
            self.probe_timeout
        } else {
            Duration::ZERO
        };
        self.navigation_timeout + self.settle_delay + probe
    }

    /// Load `url` and wait for quiescence, all within `navigation_timeout`.
    pub async fn navigate(&self, page: &dyn EnginePage, url: &str) -> Result<()> {
        let activity = page.activity();
        let start = Instant::now();
        let load = async {
            page.goto(url).await?;
            self.await_quiescence(&activity).await;
            Ok::<(), RenderError>(())
        };

        match timeout(self.navigation_timeout, load).await {
            Ok(result) => {
                result?;
                debug!(
                    url,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    requests = activity.snapshot().total_started,
                    "network quiescent"
                );
                Ok(())
            }
            Err(_) => {
                let snapshot = activity.snapshot();
                warn!(
                    url,
                    in_flight = snapshot.in_flight,
                    timeout = ?self.navigation_timeout,
                    "navigation deadline exceeded"
                );
                Err(RenderError::NavigationTimeout(self.navigation_timeout))
            }
        }
    }

    /// Resolve once `activity` has been quiet for `idle_window`. Unbounded;
    /// callers apply the deadline.
    pub async fn await_quiescence(&self, activity: &NetworkActivity) {
        while !activity.is_quiescent(self.max_inflight, self.idle_window) {
            sleep(self.poll_interval).await;
        }
    }

    /// Post-load phase: optional scroll, fixed delay, optional probe.
    pub async fn settle(&self, page: &dyn EnginePage) -> Result<()> {
        if self.scroll_before_settle {
            // Lazy content is a best effort; a failing scroll does not fail the render.
            if let Err(err) = page.evaluate(SCROLL_SCRIPT).await {
                warn!(error = %err, "scroll before settle failed");
            }
        }

        if !self.settle_delay.is_zero() {
            debug!(delay = ?self.settle_delay, "settling before capture");
            sleep(self.settle_delay).await;
        }

        match &self.probe {
            Some(probe) => self.await_probe(probe.as_ref(), page).await,
            None => Ok(()),
        }
    }

    async fn await_probe(&self, probe: &dyn ReadinessProbe, page: &dyn EnginePage) -> Result<()> {
        let poll = async {
            loop {
                if probe.is_ready(page).await? {
                    return Ok::<(), RenderError>(());
                }
                sleep(self.poll_interval).await;
            }
        };

        match timeout(self.probe_timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                warn!(probe = probe.name(), timeout = ?self.probe_timeout, "readiness probe never passed");
                Err(RenderError::NavigationTimeout(self.probe_timeout))
            }
        }
    }
}
