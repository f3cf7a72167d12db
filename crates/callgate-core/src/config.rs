//! Gateway configuration
//!
//! Centralized configuration management using the `config` crate.
//! Configuration is loaded once at startup from built-in defaults, optional
//! config files, and `CALLGATE__*` environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use tracing::debug;

/// Main gateway configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub esl: EslConfig,
    pub web: WebConfig,
    pub media: MediaConfig,
    pub gateway: RouteConfig,
}

/// How the frame reader delimits a body announced by `Content-Length`
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// Read exactly `Content-Length` bytes after the header block
    #[default]
    ContentLength,
    /// Treat the next blank-line delimited chunk as the body
    NextFrame,
}

/// FreeSWITCH event socket connection
#[derive(Debug, Deserialize, Clone)]
pub struct EslConfig {
    #[serde(default = "default_esl_host")]
    pub host: String,

    #[serde(default = "default_esl_port")]
    pub port: u16,

    /// Shared secret sent with `auth`
    #[serde(default = "default_esl_password")]
    pub password: String,

    #[serde(default)]
    pub framing: FramingMode,

    /// Upper bound for connect plus auth/subscribe handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_esl_host() -> String {
    "127.0.0.1".to_string()
}

fn default_esl_port() -> u16 {
    8021
}

fn default_esl_password() -> String {
    "ClueCon".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

/// Subscriber-facing HTTP/websocket listener
#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,

    #[serde(default = "default_web_port")]
    pub port: u16,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Static help page served at `/`
    #[serde(default = "default_help_page")]
    pub help_page: String,
}

fn default_web_host() -> String {
    "127.0.0.1".to_string()
}

fn default_web_port() -> u16 {
    8000
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_help_page() -> String {
    "static/websocket.html".to_string()
}

/// Media playback location
#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    /// Prefix joined verbatim with `<identity>/<file>`
    #[serde(default = "default_media_root")]
    pub root: String,
}

fn default_media_root() -> String {
    "/opt/sounds/".to_string()
}

/// Outbound call routing
#[derive(Debug, Deserialize, Clone)]
pub struct RouteConfig {
    /// Sofia gateway name used by `originate`
    #[serde(default = "default_route")]
    pub route: String,
}

fn default_route() -> String {
    "mss".to_string()
}

impl GatewayConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Self::with_defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("CALLGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        debug!(run_mode = %run_mode, "Configuration sources loaded");
        config.try_deserialize()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("esl.host", default_esl_host())?
            .set_default("esl.port", i64::from(default_esl_port()))?
            .set_default("esl.password", default_esl_password())?
            .set_default("esl.framing", "content_length")?
            .set_default("esl.connect_timeout_secs", default_connect_timeout() as i64)?
            .set_default("web.host", default_web_host())?
            .set_default("web.port", i64::from(default_web_port()))?
            .set_default("web.workers", default_workers() as i64)?
            .set_default("web.help_page", default_help_page())?
            .set_default("media.root", default_media_root())?
            .set_default("gateway.route", default_route())
    }

    /// Subscriber listener bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.web.host, self.web.port)
    }

    /// Control link address
    pub fn esl_addr(&self) -> String {
        format!("{}:{}", self.esl.host, self.esl.port)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            esl: EslConfig {
                host: default_esl_host(),
                port: default_esl_port(),
                password: default_esl_password(),
                framing: FramingMode::default(),
                connect_timeout_secs: default_connect_timeout(),
            },
            web: WebConfig {
                host: default_web_host(),
                port: default_web_port(),
                workers: default_workers(),
                help_page: default_help_page(),
            },
            media: MediaConfig {
                root: default_media_root(),
            },
            gateway: RouteConfig {
                route: default_route(),
            },
        }
    }
}
