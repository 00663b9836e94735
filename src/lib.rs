//! pagepdf library
//!
//! Renders web pages in an isolated headless Chromium session and exports
//! them as paginated PDF documents, served over HTTP.
//!
//! # Module Overview
//!
//! - [`browser`] - engine traits, Chromium driver, sessions and providers
//! - [`wait`] - readiness heuristics (network quiescence, settle delay, probes)
//! - [`export`] - print-to-PDF capture
//! - [`staging`] - transient on-disk storage of exported documents
//! - [`janitor`] - periodic sweep of the staging directory
//! - [`pipeline`] - the per-request render pipeline
//! - [`server`] - HTTP routes and process lifecycle
//! - [`config`] - configuration file support
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagepdf_lib::{ChromiumEngine, ChromiumOptions, RenderProfile, RenderRequest, Renderer};
//! use pagepdf_lib::{RenderWaitPolicy, SpawnPerRequest, TempFileStore};
//!
//! # async fn example() -> pagepdf_lib::Result<()> {
//! let engine = Arc::new(ChromiumEngine::new(ChromiumOptions::default()));
//! let renderer = Renderer::new(
//!     Arc::new(SpawnPerRequest::new(engine)),
//!     TempFileStore::new("temp", "generated-report"),
//! );
//! let profile = Arc::new(RenderProfile::standard(RenderWaitPolicy::default()));
//! let request = RenderRequest::new(url::Url::parse("https://example.com")?, profile);
//! let staged = renderer.render(&request).await?;
//! println!("{} bytes at {}", staged.len(), staged.path().display());
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod export;
pub mod janitor;
pub mod pipeline;
pub mod profile;
pub mod server;
pub mod staging;
pub mod telemetry;
pub mod viewport;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

pub use browser::{
    BrowserSession, ChromiumEngine, ChromiumOptions, Engine, EnginePage, EngineProcess,
    PooledProvider, ProviderMode, SessionProvider, SessionState, SpawnPerRequest,
};
pub use config::Config;
pub use error::{ErrorCategory, RenderError, Result};
pub use export::{ExportedDocument, PdfExporter, PdfOptions, PDF_SIGNATURE};
pub use janitor::{Janitor, SweepReport};
pub use pipeline::{RenderRequest, Renderer};
pub use profile::{ExportProfile, Margins, Orientation, PageSize, RenderProfile};
pub use server::{build_router, serve, AppState};
pub use staging::{StagedFile, TempFileStore};
pub use telemetry::{LogFormat, LoggingConfig};
pub use viewport::Viewport;
pub use wait::{DocumentReadyProbe, ReadinessProbe, RenderWaitPolicy, SelectorProbe};
