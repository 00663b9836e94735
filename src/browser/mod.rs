//! Browser engine sessions.
//!
//! # Module Structure
//!
//! - [`engine`] - traits the pipeline uses to drive an engine
//! - [`chromium`] - headless Chromium over the DevTools protocol
//! - [`activity`] - per-page in-flight request tracking
//! - [`session`] - per-request session and its state machine
//! - [`provider`] - spawn-per-request and pooled process supply

mod activity;
mod chromium;
mod engine;
mod provider;
mod session;

pub use activity::{ActivitySnapshot, NetworkActivity};
pub use chromium::{
    ChromiumEngine, ChromiumOptions, DEFAULT_CHROMIUM_ARGS, DEFAULT_LAUNCH_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use engine::{Engine, EnginePage, EngineProcess};
pub use provider::{EngineLease, PooledProvider, ProviderMode, SessionProvider, SpawnPerRequest};
pub use session::{BrowserSession, SessionState};
