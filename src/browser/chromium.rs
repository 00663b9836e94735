//! Chromium driver built on chromiumoxide (Chrome DevTools Protocol).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{Engine, EnginePage, EngineProcess, NetworkActivity};
use crate::export::PdfOptions;
use crate::{RenderError, Result, Viewport};

/// Default time allowed for the engine process to start.
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-command timeout of the DevTools connection.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Time allowed for a graceful `Browser.close` before the process is killed.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Hardened flags for running in containers on trusted input.
pub const DEFAULT_CHROMIUM_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-zygote",
    "--single-process",
];

/// Launch configuration for [`ChromiumEngine`].
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Explicit binary; when absent chromiumoxide's discovery is used.
    pub executable: Option<PathBuf>,
    /// Parent directory for per-process profile directories (system temp dir
    /// when absent).
    pub profile_root: Option<PathBuf>,
    pub headless: bool,
    pub args: Vec<String>,
    pub launch_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            profile_root: None,
            headless: true,
            args: DEFAULT_CHROMIUM_ARGS.iter().map(|a| a.to_string()).collect(),
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Spawns one headless Chromium per [`Engine::launch`] call.
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    options: ChromiumOptions,
}

impl ChromiumEngine {
    pub fn new(options: ChromiumOptions) -> Self {
        Self { options }
    }

    fn profile_dir(&self) -> Result<TempDir> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("pagepdf-profile-");
            b
        };
        let dir = match &self.options.profile_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    fn browser_config(&self, profile_dir: &Path) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile_dir)
            .request_timeout(self.options.request_timeout);
        if !self.options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.options.executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &self.options.args {
            builder = builder.arg(arg.as_str());
        }
        builder
            .build()
            .map_err(|msg| RenderError::launch(format!("invalid engine configuration: {msg}")))
    }

    fn map_launch_error(&self, err: CdpError) -> RenderError {
        match err {
            CdpError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                let binary = self
                    .options
                    .executable
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "chromium".to_string());
                RenderError::launch(format!("engine binary not found: {binary}"))
            }
            other => RenderError::launch(other.to_string()),
        }
    }
}

#[async_trait]
impl Engine for ChromiumEngine {
    fn name(&self) -> &str {
        "chromium"
    }

    async fn launch(&self) -> Result<Box<dyn EngineProcess>> {
        let profile_dir = self.profile_dir()?;
        let config = self.browser_config(profile_dir.path())?;

        let start = Instant::now();
        let (browser, mut handler) = timeout(self.options.launch_timeout, Browser::launch(config))
            .await
            .map_err(|_| {
                RenderError::launch(format!(
                    "engine start timed out after {:?}",
                    self.options.launch_timeout
                ))
            })?
            .map_err(|err| self.map_launch_error(err))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                match event {
                    Ok(()) => {}
                    Err(CdpError::Ws(err)) => {
                        debug!(error = %err, "devtools connection closed");
                        break;
                    }
                    Err(err) => debug!(error = %err, "devtools handler error"),
                }
            }
        });

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            profile = %profile_dir.path().display(),
            "chromium started"
        );

        Ok(Box::new(ChromiumProcess {
            browser: Some(browser),
            handler: handler_task,
            request_timeout: self.options.request_timeout,
            _profile_dir: profile_dir,
        }))
    }
}

struct ChromiumProcess {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
    request_timeout: Duration,
    // Removed from disk when the process is released.
    _profile_dir: TempDir,
}

#[async_trait]
impl EngineProcess for ChromiumProcess {
    async fn open_page(&mut self, viewport: Option<Viewport>) -> Result<Box<dyn EnginePage>> {
        let browser = self
            .browser
            .as_mut()
            .ok_or_else(|| RenderError::InvalidState("engine process already shut down".into()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| RenderError::launch(format!("failed to open page: {err}")))?;

        if let Some(vp) = viewport {
            page.execute(SetDeviceMetricsOverrideParams::new(
                i64::from(vp.width),
                i64::from(vp.height),
                vp.device_scale_factor,
                false,
            ))
            .await
            .map_err(|err| RenderError::launch(format!("failed to apply viewport {vp}: {err}")))?;
        }

        let page = ChromiumPage::attach(page, self.request_timeout).await?;
        Ok(Box::new(page))
    }

    async fn shutdown(&mut self) -> Result<()> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };

        let result = match graceful_close(CLOSE_GRACE, close_and_wait(&mut browser)).await {
            GracefulClose::Exited => Ok(()),
            GracefulClose::Failed(err) => {
                warn!(error = %err, "graceful engine close failed, killing process");
                kill(&mut browser).await
            }
            GracefulClose::TimedOut => {
                warn!(grace = ?CLOSE_GRACE, "engine did not exit in time, killing process");
                kill(&mut browser).await
            }
        };
        self.handler.abort();
        result
    }
}

impl Drop for ChromiumProcess {
    fn drop(&mut self) {
        self.handler.abort();
        if self.browser.is_some() {
            warn!("chromium process dropped without shutdown");
        }
    }
}

#[derive(Debug)]
enum GracefulClose {
    Exited,
    Failed(RenderError),
    TimedOut,
}

/// Bound the whole close sequence, including waiting for the child to exit.
async fn graceful_close<F>(grace: Duration, close: F) -> GracefulClose
where
    F: std::future::Future<Output = Result<()>>,
{
    match timeout(grace, close).await {
        Ok(Ok(())) => GracefulClose::Exited,
        Ok(Err(err)) => GracefulClose::Failed(err),
        Err(_) => GracefulClose::TimedOut,
    }
}

async fn close_and_wait(browser: &mut Browser) -> Result<()> {
    browser
        .close()
        .await
        .map_err(|err| RenderError::InvalidState(format!("engine close failed: {err}")))?;
    browser.wait().await?;
    Ok(())
}

async fn kill(browser: &mut Browser) -> Result<()> {
    match browser.kill().await {
        Some(Err(err)) => Err(err.into()),
        _ => Ok(()),
    }
}

struct ChromiumPage {
    page: Page,
    activity: Arc<NetworkActivity>,
    listeners: Vec<JoinHandle<()>>,
    request_timeout: Duration,
    current_url: Mutex<String>,
}

impl ChromiumPage {
    async fn attach(page: Page, request_timeout: Duration) -> Result<Self> {
        let setup_err = |err: CdpError| RenderError::launch(format!("failed to prepare page: {err}"));

        page.execute(EnableParams::default()).await.map_err(setup_err)?;

        let activity = Arc::new(NetworkActivity::new());
        let mut started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(setup_err)?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(setup_err)?;
        let mut failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(setup_err)?;

        let tracker = activity.clone();
        let on_started = tokio::spawn(async move {
            while let Some(event) = started.next().await {
                tracker.request_started(event.request_id.inner().clone());
            }
        });
        let tracker = activity.clone();
        let on_finished = tokio::spawn(async move {
            while let Some(event) = finished.next().await {
                tracker.request_finished(event.request_id.inner());
            }
        });
        let tracker = activity.clone();
        let on_failed = tokio::spawn(async move {
            while let Some(event) = failed.next().await {
                tracker.request_finished(event.request_id.inner());
            }
        });

        Ok(Self {
            page,
            activity,
            listeners: vec![on_started, on_finished, on_failed],
            request_timeout,
            current_url: Mutex::new("about:blank".to_string()),
        })
    }

    fn current_url(&self) -> String {
        self.current_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EnginePage for ChromiumPage {
    fn activity(&self) -> Arc<NetworkActivity> {
        self.activity.clone()
    }

    async fn goto(&self, url: &str) -> Result<()> {
        *self.current_url.lock().unwrap_or_else(PoisonError::into_inner) = url.to_string();
        match self.page.goto(url).await {
            Ok(_) => Ok(()),
            Err(CdpError::Timeout) => Err(RenderError::NavigationTimeout(self.request_timeout)),
            Err(err) => Err(RenderError::navigation(url, err.to_string())),
        }
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|err| RenderError::navigation(self.current_url(), format!("script failed: {err}")))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn print_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>> {
        let params = PrintToPdfParams {
            landscape: Some(options.landscape),
            print_background: Some(options.print_background),
            scale: Some(options.scale),
            paper_width: Some(options.paper_width),
            paper_height: Some(options.paper_height),
            margin_top: Some(options.margin_top),
            margin_right: Some(options.margin_right),
            margin_bottom: Some(options.margin_bottom),
            margin_left: Some(options.margin_left),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };
        match self.page.pdf(params).await {
            Ok(bytes) => Ok(bytes),
            Err(CdpError::Timeout) => Err(RenderError::export(format!(
                "capture timed out after {:?}",
                self.request_timeout
            ))),
            Err(err) => Err(RenderError::export(err.to_string())),
        }
    }

    async fn close(&self) -> Result<()> {
        for listener in &self.listeners {
            listener.abort();
        }
        self.page
            .clone()
            .close()
            .await
            .map_err(|err| RenderError::InvalidState(format!("failed to close page: {err}")))
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}
