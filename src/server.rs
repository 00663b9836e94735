//! HTTP surface.
//!
//! Every configured [`RenderProfile`] is mounted as `POST <route>?url=<address>`.
//! Successful renders stream the staged PDF back; any failure is logged in
//! full and answered with an opaque `500`.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{error, info, info_span, warn, Instrument, Span};
use url::Url;
use uuid::Uuid;

use crate::browser::{
    ChromiumEngine, Engine, PooledProvider, ProviderMode, SessionProvider, SpawnPerRequest,
};
use crate::config::{Config, ProviderConfig};
use crate::pipeline::{RenderRequest, Renderer};
use crate::profile::RenderProfile;
use crate::staging::StagedFile;
use crate::{RenderError, Result};

/// Body of every failed render response.
pub const GENERIC_FAILURE: &str = "An error occurred while generating the PDF.";

#[derive(Clone)]
pub struct AppState {
    renderer: Arc<Renderer>,
    default_url: Arc<Url>,
}

impl AppState {
    pub fn new(renderer: Renderer, default_url: Url) -> Self {
        Self {
            renderer: Arc::new(renderer),
            default_url: Arc::new(default_url),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
    pub url: Option<String>,
}

pub fn build_router(state: AppState, profiles: Vec<RenderProfile>) -> Router {
    let mut router = Router::new().route("/healthz", get(healthz));
    for profile in profiles {
        let route = profile.route.clone();
        let profile = Arc::new(profile);
        router = router.route(
            &route,
            post(
                move |State(state): State<AppState>,
                      query: std::result::Result<Query<RenderQuery>, QueryRejection>| {
                    let profile = profile.clone();
                    async move {
                        match query {
                            Ok(Query(query)) => render_pdf(state, profile, query).await,
                            Err(rejection) => {
                                warn!(
                                    profile = %profile.name,
                                    error = %rejection.body_text(),
                                    "malformed render query"
                                );
                                generic_failure()
                            }
                        }
                    }
                },
            ),
        );
    }
    router.with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn render_pdf(state: AppState, profile: Arc<RenderProfile>, query: RenderQuery) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("render", %request_id, profile = %profile.name);

    async move {
        let started = Instant::now();
        let request =
            match RenderRequest::resolve(query.url.as_deref(), &state.default_url, profile.clone()) {
                Ok(request) => request,
                Err(err) => return failure(&err),
            };
        info!(url = %request.target_url, "render requested");

        // Detached from the connection: a client that hangs up must not cancel
        // the pipeline between acquiring and releasing its session.
        let renderer = state.renderer.clone();
        let task = tokio::spawn(
            async move { renderer.render(&request).await }.instrument(Span::current()),
        );
        let staged = match task.await {
            Ok(Ok(staged)) => staged,
            Ok(Err(err)) => return failure(&err),
            Err(err) => {
                error!(error = %err, "render task aborted");
                return generic_failure();
            }
        };

        match pdf_response(staged, &profile.filename).await {
            Ok(response) => {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "streaming pdf");
                response
            }
            Err(err) => failure(&err),
        }
    }
    .instrument(span)
    .await
}

async fn pdf_response(staged: StagedFile, filename: &str) -> Result<Response> {
    let len = staged.len();
    let stream = staged.into_stream().await?;

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    match content_disposition(filename) {
        Some(value) => {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        None => warn!(filename, "filename is not a valid header value, attachment name omitted"),
    }
    Ok(response)
}

/// `attachment; filename=<filename>`, or `None` when that is not a legal
/// header value.
pub(crate) fn content_disposition(filename: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("attachment; filename={filename}")).ok()
}

fn failure(err: &RenderError) -> Response {
    error!(
        category = %err.category(),
        remediation = err.remediation(),
        error = %err,
        "render failed"
    );
    generic_failure()
}

fn generic_failure() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE).into_response()
}

pub fn build_provider(config: &ProviderConfig, engine: Arc<dyn Engine>) -> Arc<dyn SessionProvider> {
    match config.mode {
        ProviderMode::Spawn => Arc::new(SpawnPerRequest::new(engine)),
        ProviderMode::Pooled => Arc::new(PooledProvider::new(engine, config.pool_size)),
    }
}

/// Run the service until Ctrl-C or SIGTERM.
pub async fn serve(config: Config) -> Result<()> {
    config.validate()?;
    let store = config.store();
    store.ensure_directory().await?;

    let engine: Arc<dyn Engine> = Arc::new(ChromiumEngine::new(config.chromium_options()));
    let provider = build_provider(&config.provider, engine);
    let janitor = config.janitor.enabled.then(|| config.janitor().spawn());

    let profiles = config.render_profiles();
    let routes: Vec<String> = profiles.iter().map(|p| p.route.clone()).collect();
    let state = AppState::new(Renderer::new(provider.clone(), store), config.default_url()?);
    let router = build_router(state, profiles);

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(
        addr = %listener.local_addr()?,
        provider = ?config.provider.mode,
        routes = ?routes,
        staging = %config.staging.dir.display(),
        "pagepdf listening"
    );

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(janitor) = janitor {
        janitor.abort();
    }
    provider.shutdown().await;
    info!("pagepdf stopped");
    served.map_err(RenderError::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}
