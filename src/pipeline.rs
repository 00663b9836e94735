//! The render pipeline: one isolated session per request, closed on every exit
//! path, followed by staging of the exported document.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use url::Url;

use crate::browser::{BrowserSession, SessionProvider};
use crate::export::{ExportedDocument, PdfExporter};
use crate::profile::RenderProfile;
use crate::staging::{StagedFile, TempFileStore};
use crate::{RenderError, Result, Viewport};

/// One inbound render. Immutable once built.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub target_url: Url,
    pub viewport: Option<Viewport>,
    pub profile: Arc<RenderProfile>,
}

impl RenderRequest {
    pub fn new(target_url: Url, profile: Arc<RenderProfile>) -> Self {
        Self {
            target_url,
            viewport: profile.viewport,
            profile,
        }
    }

    /// Build a request from the raw `url` query value, falling back to
    /// `default_url` when it is absent or blank.
    pub fn resolve(
        query: Option<&str>,
        default_url: &Url,
        profile: Arc<RenderProfile>,
    ) -> Result<Self> {
        let target_url = resolve_target(query, default_url)?;
        Ok(Self::new(target_url, profile))
    }
}

/// Parse the target address. Only `http` and `https` are rendered.
pub fn resolve_target(query: Option<&str>, default_url: &Url) -> Result<Url> {
    let raw = match query.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(default_url.clone()),
    };

    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RenderError::navigation(
            raw,
            format!("unsupported scheme '{other}'"),
        )),
    }
}

/// Runs [`RenderRequest`]s against sessions from a [`SessionProvider`] and
/// stages the results in a [`TempFileStore`].
#[derive(Clone)]
pub struct Renderer {
    provider: Arc<dyn SessionProvider>,
    store: TempFileStore,
    exporter: PdfExporter,
}

impl Renderer {
    pub fn new(provider: Arc<dyn SessionProvider>, store: TempFileStore) -> Self {
        Self {
            provider,
            store,
            exporter: PdfExporter::new(),
        }
    }

    /// Render `request` to a staged PDF.
    ///
    /// The session is closed before this returns, whatever the outcome. The
    /// returned [`StagedFile`] deletes itself once streamed or dropped.
    pub async fn render(&self, request: &RenderRequest) -> Result<StagedFile> {
        let start = Instant::now();
        let mut session = BrowserSession::new();

        let captured = self.capture(&mut session, request).await;
        session.close().await;
        let document = captured?;

        let staged = self.store.write(&document).await?;
        info!(
            url = %request.target_url,
            profile = %request.profile.name,
            bytes = staged.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "render complete"
        );
        Ok(staged)
    }

    async fn capture(
        &self,
        session: &mut BrowserSession,
        request: &RenderRequest,
    ) -> Result<ExportedDocument> {
        session.launch(self.provider.as_ref()).await?;
        session.new_page(request.viewport).await?;
        debug!(session = %session.id(), url = %request.target_url, "navigating");
        session
            .navigate(request.target_url.as_str(), &request.profile.wait)
            .await?;
        self.exporter.export(session, &request.profile.export).await
    }
}
