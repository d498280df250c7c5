use std::time::Duration;

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use overstream_listener::{connect, ListenerConfig};
use overstream_transport::{MaxInstances, TransmissionMode};
use serde::Serialize;

use crate::cmd::{parse_name, InfoArgs};
use crate::exit::{listener_error, CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Serialize)]
struct InfoOutput {
    name: String,
    path: String,
    platform: &'static str,
    /// Whether a server currently accepts on the channel.
    reachable: bool,
    transport: Option<&'static str>,
    worker_count: usize,
    max_instances: Option<usize>,
    transmission_mode: TransmissionMode,
    keepalive_timeout_ms: u128,
    busy_backoff_ms: u128,
}

pub async fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let name = parse_name(&args.name)?;
    let config = args.listener.to_config()?;
    config
        .validate()
        .map_err(|err| listener_error("invalid configuration", err))?;

    let transport = match tokio::time::timeout(PROBE_TIMEOUT, connect(&name)).await {
        Ok(Ok(stream)) => Some(stream.transport_name()),
        _ => None,
    };

    let out = InfoOutput {
        name: name.to_string(),
        path: name.platform_path().display().to_string(),
        platform: std::env::consts::OS,
        reachable: transport.is_some(),
        transport,
        worker_count: config.worker_count,
        max_instances: config.channel.max_instances.limit(),
        transmission_mode: config.channel.transmission_mode,
        keepalive_timeout_ms: config.keepalive_timeout.as_millis(),
        busy_backoff_ms: config.busy_backoff.as_millis(),
    };

    print_info(&out, &config, format);
    Ok(SUCCESS)
}

fn print_info(out: &InfoOutput, config: &ListenerConfig, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in rows(out, config) {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Channel Info:");
            for (field, value) in rows(out, config) {
                println!("  {:<18}{value}", format!("{field}:"));
            }
        }
        OutputFormat::Raw => println!("{}", out.path),
    }
}

fn rows(out: &InfoOutput, config: &ListenerConfig) -> Vec<(&'static str, String)> {
    let max_instances = match config.channel.max_instances {
        MaxInstances::Unlimited => "unlimited".to_string(),
        MaxInstances::Limited(n) => n.to_string(),
    };
    vec![
        ("Name", out.name.clone()),
        ("Path", out.path.clone()),
        ("Platform", out.platform.to_string()),
        ("Reachable", out.reachable.to_string()),
        ("Transport", out.transport.unwrap_or("-").to_string()),
        ("Workers", out.worker_count.to_string()),
        ("Max instances", max_instances),
        ("Mode", format!("{:?}", out.transmission_mode).to_lowercase()),
        ("Keep-alive timeout", format!("{}ms", out.keepalive_timeout_ms)),
        ("Busy backoff", format!("{}ms", out.busy_backoff_ms)),
    ]
}
