use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use pagepdf_lib::{Config, ProviderMode};

#[derive(Parser)]
#[command(name = "pagepdf")]
#[command(
    version,
    about = "Render web pages in headless Chromium and serve them as PDF downloads",
    long_about = "pagepdf\n\nModes:\n- serve: run the HTTP service (POST /generate-pdf?url=..., POST /generate-amp-pdf?url=...).\n- sweep: run one janitor pass over the staging directory and print the report as JSON.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable debug logging (RUST_LOG overrides)")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Config file (TOML); defaults to ~/.config/pagepdf/config.toml when present. CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve(ServeArgs),
    /// Sweep the staging directory once and exit
    Sweep(SweepArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    #[arg(long, env = "PORT", help = "Listening port [default: 3000]")]
    pub port: Option<u16>,

    #[arg(long, help = "Listening address [default: 0.0.0.0]")]
    pub host: Option<String>,

    #[arg(long, value_name = "DIR", help = "Staging directory for exported documents [default: temp]")]
    pub staging_dir: Option<PathBuf>,

    #[arg(long, env = "CHROME_PATH", value_name = "PATH", help = "Chromium executable (auto-detected when omitted)")]
    pub chrome: Option<PathBuf>,

    #[arg(
        long,
        value_name = "N",
        help = "Reuse up to N browser processes instead of launching one per request"
    )]
    pub pooled: Option<usize>,
}

impl ServeArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(dir) = &self.staging_dir {
            config.staging.dir = dir.clone();
        }
        if let Some(chrome) = &self.chrome {
            config.browser.executable = Some(chrome.clone());
        }
        if let Some(size) = self.pooled {
            config.provider.mode = ProviderMode::Pooled;
            config.provider.pool_size = size;
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct SweepArgs {
    #[arg(long, value_name = "DIR", help = "Staging directory to sweep [default: temp]")]
    pub staging_dir: Option<PathBuf>,

    #[arg(long, help = "Remove every regular file regardless of age")]
    pub all: bool,
}

impl SweepArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.staging_dir {
            config.staging.dir = dir.clone();
        }
        if self.all {
            config.janitor.min_age = Duration::ZERO;
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
