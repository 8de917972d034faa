use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the edgepurge binary.
#[derive(Debug, Parser)]
#[command(
    name = "edgepurge",
    version,
    about = "Forward purge requests to the Akamai Fast Purge API"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "EDGEPURGE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the purge HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the Fast Purge API host.
    #[arg(long = "akamai-host", value_name = "URL")]
    pub akamai_host: Option<String>,

    /// Override the EdgeGrid credentials file.
    #[arg(
        long = "akamai-edgerc-path",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub akamai_edgerc_path: Option<PathBuf>,

    /// Override the section read from the EdgeGrid credentials file.
    #[arg(long = "akamai-edgerc-section", value_name = "NAME")]
    pub akamai_edgerc_section: Option<String>,

    /// Override the timeout applied to purge API calls.
    #[arg(long = "akamai-request-timeout-seconds", value_name = "SECONDS")]
    pub akamai_request_timeout_seconds: Option<u64>,

    /// Toggle post-purge verification requests.
    #[arg(
        long = "post-purge-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub post_purge_enabled: Option<bool>,

    /// Override the delay before verification requests start.
    #[arg(long = "post-purge-delay-seconds", value_name = "SECONDS")]
    pub post_purge_delay_seconds: Option<u64>,

    /// Override the timeout applied to each verification request.
    #[arg(long = "post-purge-request-timeout-seconds", value_name = "SECONDS")]
    pub post_purge_request_timeout_seconds: Option<u64>,

    /// Override how many paths are verified concurrently.
    #[arg(long = "post-purge-concurrency", value_name = "COUNT")]
    pub post_purge_concurrency: Option<u32>,
}
