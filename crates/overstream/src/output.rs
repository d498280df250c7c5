use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// A line received from a connection.
#[derive(Debug, Clone, Serialize)]
pub struct LineEvent {
    /// Per-run connection number, `0` for the client side of `send`.
    pub connection: u64,
    pub line: String,
}

#[derive(Serialize)]
struct LineOutput<'a> {
    connection: u64,
    len: usize,
    line: &'a str,
    timestamp: String,
}

pub fn print_line(event: &LineEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = LineOutput {
                connection: event.connection,
                len: event.line.len(),
                line: &event.line,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CONNECTION", "LEN", "LINE"])
                .add_row(vec![
                    event.connection.to_string(),
                    event.line.len().to_string(),
                    event.line.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("[{}] {}", event.connection, display_line(&event.line));
        }
        OutputFormat::Raw => {
            print_raw(event.line.as_bytes());
            print_raw(b"\n");
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Empty lines end a header block; make them visible.
fn display_line(line: &str) -> &str {
    if line.is_empty() {
        "<blank>"
    } else {
        line
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_is_marked() {
        assert_eq!(display_line(""), "<blank>");
        assert_eq!(display_line("Host: x"), "Host: x");
    }

    #[test]
    fn json_output_carries_line_and_length() {
        let out = LineOutput {
            connection: 3,
            len: 5,
            line: "hello",
            timestamp: "0".to_string(),
        };
        let json = serde_json::to_string(&out).unwrap();
        assert_eq!(
            json,
            r#"{"connection":3,"len":5,"line":"hello","timestamp":"0"}"#
        );
    }
}
