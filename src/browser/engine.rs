//! Seams between the render pipeline and a concrete browser engine.
//!
//! The pipeline only talks to these traits. [`super::ChromiumEngine`] is the
//! production implementation; tests plug in a scripted engine.

use std::sync::Arc;

use async_trait::async_trait;

use super::NetworkActivity;
use crate::export::PdfOptions;
use crate::{Result, Viewport};

/// Starts engine processes.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Start one isolated engine process with a private profile directory.
    ///
    /// Fails with [`crate::RenderError::Launch`] when the binary is missing or
    /// the process does not come up.
    async fn launch(&self) -> Result<Box<dyn EngineProcess>>;
}

/// A running engine process, exclusively owned by one session at a time.
#[async_trait]
pub trait EngineProcess: Send + Sync {
    /// Create a fresh rendering surface, sized to `viewport` when given.
    async fn open_page(&mut self, viewport: Option<Viewport>) -> Result<Box<dyn EnginePage>>;

    /// Terminate the process and release everything attached to it.
    async fn shutdown(&mut self) -> Result<()>;
}

/// One page inside an engine process.
#[async_trait]
pub trait EnginePage: Send + Sync {
    /// Live request counters, fed by the engine's network events.
    fn activity(&self) -> Arc<NetworkActivity>;

    /// Start loading `url`. Returns once the main document has loaded; network
    /// quiescence is the caller's concern.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Evaluate a script expression in the page and return its JSON value
    /// (`null` for `undefined`).
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;

    /// Run the engine's paginated capture.
    async fn print_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()>;
}
