//! TOML configuration.
//!
//! Priority: explicit path > `~/.config/pagepdf/config.toml` > built-in
//! defaults. Durations are written in humantime form (`"60s"`, `"24h"`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::browser::{
    ChromiumOptions, ProviderMode, DEFAULT_CHROMIUM_ARGS, DEFAULT_LAUNCH_TIMEOUT,
};
use crate::janitor::{Janitor, DEFAULT_MIN_AGE, DEFAULT_SWEEP_INTERVAL};
use crate::profile::{ExportProfile, Margins, Orientation, PageSize, RenderProfile};
use crate::server::content_disposition;
use crate::staging::{TempFileStore, DEFAULT_FILE_PREFIX, DEFAULT_STAGING_DIR};
use crate::telemetry::LoggingConfig;
use crate::wait::{
    ReadinessProbe, RenderWaitPolicy, SelectorProbe, DEFAULT_IDLE_WINDOW, DEFAULT_MAX_INFLIGHT,
    DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_PROBE_TIMEOUT,
};
use crate::{RenderError, Result, Viewport};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_TARGET_URL: &str = "https://example.com/";
pub const DEFAULT_POOL_SIZE: usize = 2;

const SCALE_RANGE: std::ops::RangeInclusive<f64> = 0.1..=2.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub staging: StagingConfig,
    pub browser: BrowserConfig,
    pub provider: ProviderConfig,
    pub wait: WaitConfig,
    pub janitor: JanitorConfig,
    pub logging: LoggingConfig,
    pub profiles: Vec<ProfileConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            staging: StagingConfig::default(),
            browser: BrowserConfig::default(),
            provider: ProviderConfig::default(),
            wait: WaitConfig::default(),
            janitor: JanitorConfig::default(),
            logging: LoggingConfig::default(),
            profiles: default_profiles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Rendered when a request carries no `url` parameter.
    pub default_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            default_url: DEFAULT_TARGET_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagingConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_STAGING_DIR),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserConfig {
    pub executable: Option<PathBuf>,
    pub profile_root: Option<PathBuf>,
    pub headless: bool,
    pub args: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub launch_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            profile_root: None,
            headless: true,
            args: DEFAULT_CHROMIUM_ARGS.iter().map(|s| s.to_string()).collect(),
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub mode: ProviderMode,
    pub pool_size: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Spawn,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitConfig {
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub idle_window: Duration,
    pub max_inflight: usize,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            idle_window: DEFAULT_IDLE_WINDOW,
            max_inflight: DEFAULT_MAX_INFLIGHT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl WaitConfig {
    /// Shared part of every profile's wait policy; settle behaviour is per
    /// profile.
    pub fn policy(&self) -> RenderWaitPolicy {
        RenderWaitPolicy {
            navigation_timeout: self.navigation_timeout,
            idle_window: self.idle_window,
            max_inflight: self.max_inflight,
            poll_interval: self.poll_interval,
            probe_timeout: self.probe_timeout,
            ..RenderWaitPolicy::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JanitorConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Files younger than this are left alone. `0s` sweeps everything.
    #[serde(with = "humantime_serde")]
    pub min_age: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_SWEEP_INTERVAL,
            min_age: DEFAULT_MIN_AGE,
        }
    }
}

/// One `[[profiles]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    pub name: String,
    pub route: String,
    pub filename: String,
    pub viewport: Option<Viewport>,
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub scale: f64,
    pub print_background: bool,
    pub margins: Margins,
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    pub scroll_before_settle: bool,
    pub ready_selector: Option<String>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self::from_profile(&RenderProfile::standard(RenderWaitPolicy::default()))
    }
}

impl ProfileConfig {
    pub fn from_profile(profile: &RenderProfile) -> Self {
        Self {
            name: profile.name.clone(),
            route: profile.route.clone(),
            filename: profile.filename.clone(),
            viewport: profile.viewport,
            page_size: profile.export.page_size,
            orientation: profile.export.orientation,
            scale: profile.export.scale,
            print_background: profile.export.print_background,
            margins: profile.export.margins,
            settle_delay: profile.wait.settle_delay,
            scroll_before_settle: profile.wait.scroll_before_settle,
            ready_selector: None,
        }
    }

    pub fn to_render_profile(&self, base: &RenderWaitPolicy) -> RenderProfile {
        let probe = self
            .ready_selector
            .as_ref()
            .map(|selector| -> Arc<dyn ReadinessProbe> {
                Arc::new(SelectorProbe::new(selector.clone()))
            });
        RenderProfile {
            name: self.name.clone(),
            route: self.route.clone(),
            filename: self.filename.clone(),
            viewport: self.viewport,
            export: ExportProfile {
                page_size: self.page_size,
                orientation: self.orientation,
                scale: self.scale,
                print_background: self.print_background,
                margins: self.margins,
            },
            wait: RenderWaitPolicy {
                settle_delay: self.settle_delay,
                scroll_before_settle: self.scroll_before_settle,
                probe,
                ..base.clone()
            },
        }
    }
}

fn default_profiles() -> Vec<ProfileConfig> {
    let base = RenderWaitPolicy::default();
    vec![
        ProfileConfig::from_profile(&RenderProfile::standard(base.clone())),
        ProfileConfig::from_profile(&RenderProfile::amp(base)),
    ]
}

impl Config {
    /// Load from `path`, else the central config file if present, else defaults.
    /// Validation is left to the caller so CLI overrides can be applied first.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let source = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::central_config_path().filter(|p| p.is_file()),
        };
        let Some(source) = source else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(&source).map_err(|err| {
            RenderError::Config(format!("failed to read config {}: {err}", source.display()))
        })?;
        Self::from_toml(&raw).map_err(|err| {
            RenderError::Config(format!("invalid config {}: {err}", source.display()))
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| RenderError::Config(err.to_string()))
    }

    /// `$XDG_CONFIG_HOME/pagepdf/config.toml`, falling back to `~/.config`.
    pub fn central_config_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("pagepdf").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        self.default_url()?;

        if self.staging.file_prefix.trim().is_empty() {
            return Err(invalid("staging.file_prefix must not be empty"));
        }
        if self.provider.mode == ProviderMode::Pooled && self.provider.pool_size == 0 {
            return Err(invalid("provider.pool_size must be at least 1 in pooled mode"));
        }
        if self.wait.poll_interval.is_zero() {
            return Err(invalid("wait.poll_interval must be greater than zero"));
        }
        if self.wait.navigation_timeout.is_zero() {
            return Err(invalid("wait.navigation_timeout must be greater than zero"));
        }
        if self.browser.launch_timeout.is_zero() {
            return Err(invalid("browser.launch_timeout must be greater than zero"));
        }
        if self.janitor.enabled && self.janitor.interval.is_zero() {
            return Err(invalid("janitor.interval must be greater than zero"));
        }

        if self.profiles.is_empty() {
            return Err(invalid("at least one [[profiles]] entry is required"));
        }
        let mut routes = std::collections::HashSet::new();
        for profile in &self.profiles {
            validate_profile(profile)?;
            if !routes.insert(profile.route.as_str()) {
                return Err(invalid(format!("duplicate route '{}'", profile.route)));
            }
        }

        if self.janitor.enabled && !self.janitor.min_age.is_zero() {
            let longest = self.longest_request();
            if self.janitor.min_age < longest {
                return Err(invalid(format!(
                    "janitor.min_age ({:?}) is shorter than the longest render ({:?}); staged files could be swept mid-request",
                    self.janitor.min_age, longest,
                )));
            }
        }
        Ok(())
    }

    /// Upper bound on navigation plus settling across all profiles.
    pub fn longest_request(&self) -> Duration {
        let base = self.wait.policy();
        self.profiles
            .iter()
            .map(|p| p.to_render_profile(&base).wait.max_duration())
            .max()
            .unwrap_or(base.navigation_timeout)
    }

    pub fn default_url(&self) -> Result<Url> {
        let url = Url::parse(&self.server.default_url).map_err(|err| {
            invalid(format!(
                "server.default_url '{}' is not a URL: {err}",
                self.server.default_url
            ))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid(format!(
                "server.default_url must be http or https, got '{other}'"
            ))),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn chromium_options(&self) -> ChromiumOptions {
        ChromiumOptions {
            executable: self.browser.executable.clone(),
            profile_root: self.browser.profile_root.clone(),
            headless: self.browser.headless,
            args: self.browser.args.clone(),
            launch_timeout: self.browser.launch_timeout,
            // Individual DevTools commands must outlive the navigation deadline.
            request_timeout: self.wait.navigation_timeout,
        }
    }

    pub fn render_profiles(&self) -> Vec<RenderProfile> {
        let base = self.wait.policy();
        self.profiles
            .iter()
            .map(|p| p.to_render_profile(&base))
            .collect()
    }

    pub fn store(&self) -> TempFileStore {
        TempFileStore::new(&self.staging.dir, &self.staging.file_prefix)
    }

    pub fn janitor(&self) -> Janitor {
        Janitor::new(&self.staging.dir, self.janitor.interval, self.janitor.min_age)
    }
}

fn validate_profile(profile: &ProfileConfig) -> Result<()> {
    let name = &profile.name;
    if name.trim().is_empty() {
        return Err(invalid("profile name must not be empty"));
    }
    if !profile.route.starts_with('/') {
        return Err(invalid(format!(
            "profile '{name}': route '{}' must start with '/'",
            profile.route
        )));
    }
    if profile.filename.trim().is_empty()
        || profile.filename.contains(['"', '/', '\\'])
        || content_disposition(&profile.filename).is_none()
    {
        return Err(invalid(format!(
            "profile '{name}': filename '{}' is not a plain file name",
            profile.filename
        )));
    }
    if !SCALE_RANGE.contains(&profile.scale) {
        return Err(invalid(format!(
            "profile '{name}': scale {} outside 0.1..=2.0",
            profile.scale
        )));
    }
    if !profile.margins.is_valid() {
        return Err(invalid(format!("profile '{name}': margins must be non-negative")));
    }
    if let PageSize::Custom { width, height } = profile.page_size {
        if !(width > 0.0 && height > 0.0) {
            return Err(invalid(format!("profile '{name}': custom page size must be positive")));
        }
    }
    if let Some(viewport) = profile.viewport {
        if viewport.width == 0 || viewport.height == 0 {
            return Err(invalid(format!("profile '{name}': viewport must be non-zero")));
        }
    }
    if matches!(&profile.ready_selector, Some(s) if s.trim().is_empty()) {
        return Err(invalid(format!("profile '{name}': ready_selector must not be empty")));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> RenderError {
    RenderError::Config(message.into())
}
