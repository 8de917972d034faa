//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::HashMap,
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "edgepurge";
const ENV_PREFIX: &str = "EDGEPURGE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_EDGERC_PATH: &str = ".edgerc";
const DEFAULT_EDGERC_SECTION: &str = "default";
const DEFAULT_AKAMAI_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POST_PURGE_DELAY_SECS: u64 = 5;
const DEFAULT_POST_PURGE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POST_PURGE_CONCURRENCY: u32 = 1;

/// Validated runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub akamai: AkamaiSettings,
    pub post_purge: PostPurgeSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct AkamaiSettings {
    /// Fast Purge API base URL; required to serve.
    pub host: Option<Url>,
    pub edgerc_path: PathBuf,
    pub edgerc_section: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PostPurgeSettings {
    pub enabled: bool,
    pub delay: Duration,
    pub request_timeout: Duration,
    pub concurrency: NonZeroU32,
    /// Extra headers attached to every verification request.
    pub headers: HeaderMap,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    akamai: RawAkamaiSettings,
    post_purge: RawPostPurgeSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(host) = overrides.akamai_host.as_ref() {
            self.akamai.host = Some(host.clone());
        }
        if let Some(path) = overrides.akamai_edgerc_path.as_ref() {
            self.akamai.edgerc_path = Some(path.clone());
        }
        if let Some(section) = overrides.akamai_edgerc_section.as_ref() {
            self.akamai.edgerc_section = Some(section.clone());
        }
        if let Some(seconds) = overrides.akamai_request_timeout_seconds {
            self.akamai.request_timeout_seconds = Some(seconds);
        }
        if let Some(enabled) = overrides.post_purge_enabled {
            self.post_purge.enabled = Some(enabled);
        }
        if let Some(seconds) = overrides.post_purge_delay_seconds {
            self.post_purge.delay_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.post_purge_request_timeout_seconds {
            self.post_purge.request_timeout_seconds = Some(seconds);
        }
        if let Some(concurrency) = overrides.post_purge_concurrency {
            self.post_purge.concurrency = Some(concurrency);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            akamai,
            post_purge,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            akamai: build_akamai_settings(akamai)?,
            post_purge: build_post_purge_settings(post_purge)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_shutdown = positive_seconds(
        server.graceful_shutdown_seconds,
        DEFAULT_GRACEFUL_SHUTDOWN_SECS,
        "server.graceful_shutdown_seconds",
    )?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_akamai_settings(akamai: RawAkamaiSettings) -> Result<AkamaiSettings, LoadError> {
    let host = match akamai.host.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Some(parse_api_host(value)?),
        _ => None,
    };

    let edgerc_path = akamai
        .edgerc_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EDGERC_PATH));
    if edgerc_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "akamai.edgerc_path",
            "path must not be empty",
        ));
    }

    let edgerc_section = akamai
        .edgerc_section
        .unwrap_or_else(|| DEFAULT_EDGERC_SECTION.to_string());
    if edgerc_section.trim().is_empty() {
        return Err(LoadError::invalid(
            "akamai.edgerc_section",
            "section must not be empty",
        ));
    }

    let request_timeout = positive_seconds(
        akamai.request_timeout_seconds,
        DEFAULT_AKAMAI_TIMEOUT_SECS,
        "akamai.request_timeout_seconds",
    )?;

    Ok(AkamaiSettings {
        host,
        edgerc_path,
        edgerc_section: edgerc_section.trim().to_string(),
        request_timeout,
    })
}

fn build_post_purge_settings(
    post_purge: RawPostPurgeSettings,
) -> Result<PostPurgeSettings, LoadError> {
    let delay = Duration::from_secs(
        post_purge
            .delay_seconds
            .unwrap_or(DEFAULT_POST_PURGE_DELAY_SECS),
    );

    let request_timeout = positive_seconds(
        post_purge.request_timeout_seconds,
        DEFAULT_POST_PURGE_TIMEOUT_SECS,
        "post_purge.request_timeout_seconds",
    )?;

    let concurrency = NonZeroU32::new(
        post_purge
            .concurrency
            .unwrap_or(DEFAULT_POST_PURGE_CONCURRENCY),
    )
    .ok_or_else(|| LoadError::invalid("post_purge.concurrency", "must be greater than zero"))?;

    let mut headers = HeaderMap::with_capacity(post_purge.headers.len());
    for (name, value) in post_purge.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            LoadError::invalid("post_purge.headers", format!("header `{name}`: {err}"))
        })?;
        let header_value = HeaderValue::from_str(&value).map_err(|err| {
            LoadError::invalid("post_purge.headers", format!("header `{name}`: {err}"))
        })?;
        headers.insert(header_name, header_value);
    }

    Ok(PostPurgeSettings {
        enabled: post_purge.enabled.unwrap_or(false),
        delay,
        request_timeout,
        concurrency,
        headers,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAkamaiSettings {
    host: Option<String>,
    edgerc_path: Option<PathBuf>,
    edgerc_section: Option<String>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPostPurgeSettings {
    enabled: Option<bool>,
    delay_seconds: Option<u64>,
    request_timeout_seconds: Option<u64>,
    concurrency: Option<u32>,
    headers: HashMap<String, String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Accepts either a full base URL or a bare `.edgerc`-style host name.
pub fn parse_api_host(value: &str) -> Result<Url, LoadError> {
    let candidate = if value.contains("://") {
        value.to_string()
    } else {
        format!("https://{value}")
    };

    let url = Url::parse(&candidate)
        .map_err(|err| LoadError::invalid("akamai.host", format!("`{value}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "akamai.host",
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(LoadError::invalid("akamai.host", "host is missing"));
    }

    Ok(url)
}

fn positive_seconds(
    value: Option<u64>,
    default: u64,
    key: &'static str,
) -> Result<Duration, LoadError> {
    let seconds = value.unwrap_or(default);
    if seconds == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(seconds))
}
