//! Paginated capture of a loaded page.

use std::time::{Instant, SystemTime};

use tracing::debug;

use crate::browser::BrowserSession;
use crate::profile::{ExportProfile, Orientation};
use crate::{RenderError, Result};

/// Every PDF file starts with these bytes.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Engine-neutral print parameters. Paper size is portrait, in inches; the
/// engine rotates it when `landscape` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub landscape: bool,
    pub print_background: bool,
    pub scale: f64,
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
}

impl From<&ExportProfile> for PdfOptions {
    fn from(profile: &ExportProfile) -> Self {
        let (paper_width, paper_height) = profile.page_size.dimensions_in();
        Self {
            landscape: profile.orientation == Orientation::Landscape,
            print_background: profile.print_background,
            scale: profile.scale,
            paper_width,
            paper_height,
            margin_top: profile.margins.top,
            margin_right: profile.margins.right,
            margin_bottom: profile.margins.bottom,
            margin_left: profile.margins.left,
        }
    }
}

/// Bytes produced by one capture.
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub bytes: Vec<u8>,
    pub created_at: SystemTime,
}

impl ExportedDocument {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_SIGNATURE)
}

/// Runs the engine's print-to-PDF on a session's loaded page.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExporter;

impl PdfExporter {
    pub fn new() -> Self {
        Self
    }

    /// Capture the session's page with `profile`. Fails with
    /// [`RenderError::Export`] unless the session is `Loaded` and the engine
    /// returns a well-formed document.
    pub async fn export(
        &self,
        session: &BrowserSession,
        profile: &ExportProfile,
    ) -> Result<ExportedDocument> {
        let page = session.loaded_page()?;
        let options = PdfOptions::from(profile);

        let start = Instant::now();
        let bytes = page.print_pdf(&options).await?;
        if bytes.is_empty() {
            return Err(RenderError::export("engine returned an empty document"));
        }
        if !is_pdf(&bytes) {
            return Err(RenderError::export(
                "engine output does not start with the PDF signature",
            ));
        }

        debug!(
            session = %session.id(),
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pdf exported"
        );
        Ok(ExportedDocument {
            bytes,
            created_at: SystemTime::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::browser::SpawnPerRequest;
    use crate::profile::{Margins, PageSize};
    use crate::testing::{FakeEngine, PdfScript};
    use crate::wait::RenderWaitPolicy;

    async fn loaded_session(engine: &FakeEngine) -> BrowserSession {
        let provider = SpawnPerRequest::new(Arc::new(engine.clone()));
        let mut session = BrowserSession::new();
        session.launch(&provider).await.unwrap();
        session.new_page(None).await.unwrap();
        let policy = RenderWaitPolicy {
            idle_window: Duration::from_millis(5),
            poll_interval: Duration::from_millis(1),
            settle_delay: Duration::ZERO,
            ..RenderWaitPolicy::default()
        };
        session.navigate("https://example.com/report", &policy).await.unwrap();
        session
    }

    #[test]
    fn options_follow_profile() {
        let profile = ExportProfile {
            page_size: PageSize::Letter,
            orientation: Orientation::Portrait,
            scale: 1.0,
            print_background: false,
            margins: Margins {
                top: 0.5,
                ..Margins::zero()
            },
        };
        let options = PdfOptions::from(&profile);
        assert!(!options.landscape);
        assert!(!options.print_background);
        assert_eq!((options.paper_width, options.paper_height), (8.5, 11.0));
        assert!((options.margin_top - 0.5).abs() < f64::EPSILON);
        assert_eq!(options.margin_left, 0.0);
    }

    #[tokio::test]
    async fn exports_loaded_page() {
        let engine = FakeEngine::new();
        let mut session = loaded_session(&engine).await;

        let doc = PdfExporter::new()
            .export(&session, &ExportProfile::default())
            .await
            .unwrap();
        assert!(is_pdf(&doc.bytes));
        assert!(!doc.is_empty());
        assert_eq!(
            engine.stats().pdf_options(),
            vec![PdfOptions::from(&ExportProfile::default())]
        );
        session.close().await;
    }

    #[tokio::test]
    async fn refuses_session_that_never_loaded() {
        let engine = FakeEngine::new();
        let provider = SpawnPerRequest::new(Arc::new(engine.clone()));
        let mut session = BrowserSession::new();
        session.launch(&provider).await.unwrap();
        session.new_page(None).await.unwrap();

        let err = PdfExporter::new()
            .export(&session, &ExportProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Export(_)));
        assert!(engine.stats().pdf_options().is_empty());
        session.close().await;
    }

    #[tokio::test]
    async fn refuses_closed_session() {
        let engine = FakeEngine::new();
        let mut session = loaded_session(&engine).await;
        session.close().await;

        let err = PdfExporter::new()
            .export(&session, &ExportProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Export(_)));
    }

    #[tokio::test]
    async fn rejects_non_pdf_output() {
        let engine = FakeEngine::new().with_pdf(PdfScript::Bytes(b"<html>oops</html>".to_vec()));
        let mut session = loaded_session(&engine).await;

        let err = PdfExporter::new()
            .export(&session, &ExportProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Export(_)));
        session.close().await;
    }

    #[tokio::test]
    async fn rejects_empty_output() {
        let engine = FakeEngine::new().with_pdf(PdfScript::Bytes(Vec::new()));
        let mut session = loaded_session(&engine).await;

        let err = PdfExporter::new()
            .export(&session, &ExportProfile::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
        session.close().await;
    }
}
