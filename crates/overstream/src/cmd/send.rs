use std::time::Duration;

use overstream_line::LineReader;
use overstream_listener::{dial, DialedChannel};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cmd::{parse_duration, parse_name, SendArgs};
use crate::exit::{line_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_line, LineEvent, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let name = parse_name(&args.name)?;
    let timeout = parse_duration(&args.timeout)?;

    let lines = args.lines;
    let mut dialed = tokio::task::spawn_blocking(move || -> CliResult<DialedChannel> {
        let dialed = dial(&name, timeout).map_err(|err| transport_error("connect failed", err))?;
        for line in &lines {
            dialed
                .write_line(line)
                .map_err(|err| transport_error("send failed", err))?;
        }
        debug!(lines = lines.len(), "lines sent");
        Ok(dialed)
    })
    .await
    .map_err(|err| CliError::new(INTERNAL, format!("send task failed: {err}")))??;

    if args.wait > 0 {
        read_responses(&mut dialed, args.wait, timeout, format).await?;
    }

    Ok(SUCCESS)
}

async fn read_responses(
    dialed: &mut DialedChannel,
    count: usize,
    timeout: Duration,
    format: OutputFormat,
) -> CliResult<()> {
    let deadline = CancellationToken::new();
    let timer = tokio::spawn({
        let deadline = deadline.clone();
        async move {
            tokio::time::sleep(timeout).await;
            deadline.cancel();
        }
    });

    let mut reader = LineReader::new();
    let mut result = Ok(());
    for received in 0..count {
        match reader.read_line(dialed.reader_mut(), &deadline).await {
            Ok(line) => print_line(
                &LineEvent {
                    connection: 0,
                    line,
                },
                format,
            ),
            Err(err) if deadline.is_cancelled() => {
                debug!(error = %err, "response wait timed out");
                result = Err(CliError::new(
                    TIMEOUT,
                    format!("received {received} of {count} lines within {timeout:?}"),
                ));
                break;
            }
            Err(err) => {
                result = Err(line_error("receive failed", err));
                break;
            }
        }
    }

    timer.abort();
    result
}
