use std::time::Duration;

use clap::{Args, Subcommand};
use overstream_listener::{ListenerConfig, DEFAULT_WORKER_COUNT};
use overstream_transport::{ChannelConfig, ChannelName, MaxInstances, TransmissionMode};

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod info;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a channel and print every line clients send.
    Serve(ServeArgs),
    /// Connect to a channel and send lines.
    Send(SendArgs),
    /// Show the resolved channel address and effective configuration.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format).await,
        Command::Send(args) => send::run(args, format).await,
        Command::Info(args) => info::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

/// Listener tuning shared by `serve` and `info`.
#[derive(Args, Debug, Clone)]
pub struct ListenerOpts {
    /// Number of concurrently accepting workers.
    #[arg(long, env = "OVERSTREAM_WORKERS", default_value_t = DEFAULT_WORKER_COUNT)]
    pub workers: usize,
    /// Maximum server instances of the channel (1-254). Default: unlimited.
    #[arg(long, env = "OVERSTREAM_MAX_INSTANCES", value_name = "N")]
    pub max_instances: Option<u8>,
    /// Use message transmission mode (Windows named pipes only).
    #[arg(long)]
    pub message_mode: bool,
    /// Bound on establishing the keep-alive pair (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub keepalive_timeout: String,
}

impl ListenerOpts {
    pub fn to_config(&self) -> CliResult<ListenerConfig> {
        let max_instances = match self.max_instances {
            Some(n) => MaxInstances::Limited(n),
            None => MaxInstances::Unlimited,
        };
        let mode = if self.message_mode {
            TransmissionMode::Message
        } else {
            TransmissionMode::Byte
        };
        let channel = ChannelConfig::default()
            .with_max_instances(max_instances)
            .with_transmission_mode(mode);

        Ok(ListenerConfig::default()
            .with_channel(channel)
            .with_worker_count(self.workers)
            .with_keepalive_timeout(parse_duration(&self.keepalive_timeout)?))
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Channel name (or absolute socket path on Unix).
    pub name: String,
    #[command(flatten)]
    pub listener: ListenerOpts,
    /// Write every received line back to its client.
    #[arg(long)]
    pub echo: bool,
    /// Exit after printing N lines.
    #[arg(long)]
    pub count: Option<usize>,
    /// Longest accepted line in bytes.
    #[arg(long, default_value_t = overstream_line::DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Channel name (or absolute socket path on Unix).
    pub name: String,
    /// Line to send; repeat for several. `\r\n` is appended to each.
    #[arg(long = "line", short = 'l', value_name = "LINE", required = true)]
    pub lines: Vec<String>,
    /// Read and print N response lines.
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub wait: usize,
    /// Bound on connecting and on waiting for responses (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Channel name (or absolute socket path on Unix).
    pub name: String,
    #[command(flatten)]
    pub listener: ListenerOpts,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_name(input: &str) -> CliResult<ChannelName> {
    ChannelName::new(input).map_err(|err| transport_error("invalid channel name", err))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_invalid() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn listener_opts_build_config() {
        let opts = ListenerOpts {
            workers: 3,
            max_instances: Some(8),
            message_mode: false,
            keepalive_timeout: "250ms".to_string(),
        };
        let config = opts.to_config().unwrap();
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.channel.max_instances, MaxInstances::Limited(8));
        assert_eq!(config.keepalive_timeout, Duration::from_millis(250));
        config.validate().unwrap();
    }

    #[test]
    fn empty_name_is_usage_error() {
        assert_eq!(parse_name("").unwrap_err().code, USAGE);
    }
}
