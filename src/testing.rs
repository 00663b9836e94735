//! Scripted engine for unit tests. Records every call so tests can assert on
//! resource release without a real browser.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::{Engine, EnginePage, EngineProcess, NetworkActivity};
use crate::export::PdfOptions;
use crate::{RenderError, Result, Viewport};

#[derive(Debug, Clone)]
pub enum NavigationScript {
    /// Main document loads and the network goes quiet.
    Succeed,
    Fail(&'static str),
    /// `goto` never returns.
    Hang,
    /// Document loads but `n` requests stay in flight forever.
    Busy(usize),
}

#[derive(Debug, Clone)]
pub enum PdfScript {
    /// A minimal PDF that embeds the last visited URL.
    EchoUrl,
    Bytes(Vec<u8>),
    Fail(&'static str),
}

#[derive(Debug, Default)]
struct Recorded {
    launched: usize,
    shut_down: usize,
    pages_closed: usize,
    visited: Vec<String>,
    viewports: Vec<Option<Viewport>>,
    evaluated: Vec<String>,
    pdf_options: Vec<PdfOptions>,
}

/// Shared view of what a [`FakeEngine`] and its processes did.
#[derive(Debug, Clone, Default)]
pub struct FakeStats {
    inner: Arc<Mutex<Recorded>>,
}

impl FakeStats {
    fn with<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn launched(&self) -> usize {
        self.with(|r| r.launched)
    }

    pub fn shut_down(&self) -> usize {
        self.with(|r| r.shut_down)
    }

    pub fn pages_closed(&self) -> usize {
        self.with(|r| r.pages_closed)
    }

    pub fn visited(&self) -> Vec<String> {
        self.with(|r| r.visited.clone())
    }

    pub fn viewports(&self) -> Vec<Option<Viewport>> {
        self.with(|r| r.viewports.clone())
    }

    pub fn evaluated(&self) -> Vec<String> {
        self.with(|r| r.evaluated.clone())
    }

    pub fn pdf_options(&self) -> Vec<PdfOptions> {
        self.with(|r| r.pdf_options.clone())
    }
}

#[derive(Debug, Clone)]
struct Script {
    fail_launch: bool,
    navigation: NavigationScript,
    pdf: PdfScript,
    eval_result: Value,
}

#[derive(Debug, Clone)]
pub struct FakeEngine {
    script: Script,
    stats: FakeStats,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            script: Script {
                fail_launch: false,
                navigation: NavigationScript::Succeed,
                pdf: PdfScript::EchoUrl,
                eval_result: Value::Bool(true),
            },
            stats: FakeStats::default(),
        }
    }

    pub fn failing_launch(mut self) -> Self {
        self.script.fail_launch = true;
        self
    }

    pub fn with_navigation(mut self, navigation: NavigationScript) -> Self {
        self.script.navigation = navigation;
        self
    }

    pub fn with_pdf(mut self, pdf: PdfScript) -> Self {
        self.script.pdf = pdf;
        self
    }

    pub fn with_eval_result(mut self, value: Value) -> Self {
        self.script.eval_result = value;
        self
    }

    pub fn stats(&self) -> FakeStats {
        self.stats.clone()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn launch(&self) -> Result<Box<dyn EngineProcess>> {
        if self.script.fail_launch {
            return Err(RenderError::launch("engine binary not found: /nonexistent/chromium"));
        }
        self.stats.with(|r| r.launched += 1);
        Ok(Box::new(FakeProcess {
            script: self.script.clone(),
            stats: self.stats.clone(),
            running: true,
        }))
    }
}

struct FakeProcess {
    script: Script,
    stats: FakeStats,
    running: bool,
}

#[async_trait]
impl EngineProcess for FakeProcess {
    async fn open_page(&mut self, viewport: Option<Viewport>) -> Result<Box<dyn EnginePage>> {
        if !self.running {
            return Err(RenderError::InvalidState("fake process is stopped".to_string()));
        }
        self.stats.with(|r| r.viewports.push(viewport));
        Ok(Box::new(FakePage {
            script: self.script.clone(),
            stats: self.stats.clone(),
            activity: Arc::new(NetworkActivity::new()),
            url: Mutex::new(String::new()),
        }))
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.running {
            self.running = false;
            self.stats.with(|r| r.shut_down += 1);
        }
        Ok(())
    }
}

struct FakePage {
    script: Script,
    stats: FakeStats,
    activity: Arc<NetworkActivity>,
    url: Mutex<String>,
}

#[async_trait]
impl EnginePage for FakePage {
    fn activity(&self) -> Arc<NetworkActivity> {
        self.activity.clone()
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.stats.with(|r| r.visited.push(url.to_string()));
        *self.url.lock().unwrap_or_else(PoisonError::into_inner) = url.to_string();

        match &self.script.navigation {
            NavigationScript::Succeed => {
                self.activity.request_started("document");
                self.activity.request_finished("document");
                Ok(())
            }
            NavigationScript::Fail(message) => Err(RenderError::navigation(url, *message)),
            NavigationScript::Hang => std::future::pending().await,
            NavigationScript::Busy(n) => {
                for i in 0..*n {
                    self.activity.request_started(format!("pending-{i}"));
                }
                Ok(())
            }
        }
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.stats.with(|r| r.evaluated.push(expression.to_string()));
        Ok(self.script.eval_result.clone())
    }

    async fn print_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>> {
        self.stats.with(|r| r.pdf_options.push(options.clone()));
        match &self.script.pdf {
            PdfScript::EchoUrl => {
                let url = self.url.lock().unwrap_or_else(PoisonError::into_inner).clone();
                Ok(format!("%PDF-1.7\n% {url}\n%%EOF\n").into_bytes())
            }
            PdfScript::Bytes(bytes) => Ok(bytes.clone()),
            PdfScript::Fail(message) => Err(RenderError::export(*message)),
        }
    }

    async fn close(&self) -> Result<()> {
        self.stats.with(|r| r.pages_closed += 1);
        Ok(())
    }
}
