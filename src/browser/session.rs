//! One isolated browser session per render request.

use std::fmt;

use tracing::{debug, warn};
use uuid::Uuid;

use super::{EngineLease, EnginePage, SessionProvider};
use crate::wait::RenderWaitPolicy;
use crate::{RenderError, Result, Viewport};

/// Lifecycle of a [`BrowserSession`].
///
/// `Created → Launching → Ready → Navigating → Loaded → Closed`. `Error` is
/// entered when launching, page setup or navigation fails; from there only
/// `close` is valid. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Launching,
    Ready,
    Navigating,
    Loaded,
    Error,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Owns one engine process (and at most one page) for the lifetime of a
/// single render request.
///
/// [`BrowserSession::close`] must be called on every exit path; it is
/// idempotent and never fails.
pub struct BrowserSession {
    id: Uuid,
    state: SessionState,
    lease: Option<EngineLease>,
    page: Option<Box<dyn EnginePage>>,
}

impl Default for BrowserSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Created,
            lease: None,
            page: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Acquire an engine process from `provider`.
    pub async fn launch(&mut self, provider: &dyn SessionProvider) -> Result<()> {
        self.expect_state(SessionState::Created, "launch")?;
        self.state = SessionState::Launching;

        match provider.checkout().await {
            Ok(lease) => {
                self.lease = Some(lease);
                self.state = SessionState::Ready;
                debug!(session = %self.id, mode = ?provider.mode(), "session ready");
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Error;
                Err(err)
            }
        }
    }

    /// Open the rendering surface, optionally sized to `viewport`.
    pub async fn new_page(&mut self, viewport: Option<Viewport>) -> Result<()> {
        self.expect_state(SessionState::Ready, "open a page")?;
        if self.page.is_some() {
            return Err(RenderError::InvalidState(
                "session already has a page".to_string(),
            ));
        }
        let lease = self
            .lease
            .as_mut()
            .ok_or_else(|| RenderError::InvalidState("session has no engine".to_string()))?;

        match lease.process().open_page(viewport).await {
            Ok(page) => {
                self.page = Some(page);
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Error;
                Err(err)
            }
        }
    }

    /// Load `url` and block until `policy` considers the page ready.
    pub async fn navigate(&mut self, url: &str, policy: &RenderWaitPolicy) -> Result<()> {
        self.expect_state(SessionState::Ready, "navigate")?;
        let page = self
            .page
            .as_deref()
            .ok_or_else(|| RenderError::InvalidState("navigate before new_page".to_string()))?;

        self.state = SessionState::Navigating;
        let outcome = match policy.navigate(page, url).await {
            Ok(()) => policy.settle(page).await,
            Err(err) => Err(err),
        };

        self.state = match outcome {
            Ok(()) => SessionState::Loaded,
            Err(_) => SessionState::Error,
        };
        outcome
    }

    /// The page, provided navigation completed.
    pub fn loaded_page(&self) -> Result<&dyn EnginePage> {
        match (self.state, self.page.as_deref()) {
            (SessionState::Loaded, Some(page)) => Ok(page),
            (state, _) => Err(RenderError::export(format!(
                "session is {state}; capture requires a loaded page"
            ))),
        }
    }

    /// Release the page and the engine process. Safe to call in any state and
    /// any number of times.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        let mut healthy = matches!(self.state, SessionState::Ready | SessionState::Loaded);
        if let Some(page) = self.page.take() {
            if let Err(err) = page.close().await {
                warn!(session = %self.id, error = %err, "page close failed");
                healthy = false;
            }
        }
        if let Some(lease) = self.lease.take() {
            lease.release(healthy).await;
        }

        debug!(session = %self.id, from = %self.state, "session closed");
        self.state = SessionState::Closed;
    }

    fn expect_state(&self, expected: SessionState, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RenderError::InvalidState(format!(
                "cannot {action} while session is {}",
                self.state
            )))
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.state != SessionState::Closed && self.lease.is_some() {
            warn!(session = %self.id, state = %self.state, "session dropped without close");
        }
    }
}
