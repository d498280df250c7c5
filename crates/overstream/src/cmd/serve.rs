use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use overstream_line::{LineError, LineReader};
use overstream_listener::PipeListener;
use overstream_transport::{IpcStream, StreamSource};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cmd::{parse_name, ServeArgs};
use crate::exit::{listener_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_line, LineEvent, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let name = parse_name(&args.name)?;
    let config = args.listener.to_config()?;
    let mut listener =
        PipeListener::new(name, config).map_err(|err| listener_error("invalid configuration", err))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<LineEvent>();
    let connections = Arc::new(AtomicU64::new(0));
    let shutdown = CancellationToken::new();
    let session = Session {
        tx,
        connections,
        shutdown: shutdown.clone(),
        echo: args.echo,
        max_line_length: args.max_line_length,
    };

    listener
        .start(
            move |stream: IpcStream| session.clone().handle(stream),
            &CancellationToken::new(),
        )
        .await
        .map_err(|err| listener_error("start failed", err))?;
    info!(
        channel = %listener.channel_name(),
        workers = listener.config().worker_count,
        "serving; press Ctrl-C to stop"
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut printed = 0usize;
    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(err) = signal {
                    warn!(error = %err, "ctrl-c handler failed; stopping");
                }
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                print_line(&event, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
        }
    }

    shutdown.cancel();
    let stats = listener.stats();
    let report = listener.stop(&CancellationToken::new()).await;
    info!(?report, accepted = stats.accepted, handler_panics = stats.handler_panics, "shutdown complete");

    Ok(if report.is_clean() { SUCCESS } else { FAILURE })
}

#[derive(Clone)]
struct Session {
    tx: mpsc::UnboundedSender<LineEvent>,
    connections: Arc<AtomicU64>,
    shutdown: CancellationToken,
    echo: bool,
    max_line_length: usize,
}

impl Session {
    async fn handle(self, stream: IpcStream) {
        let connection = self.connections.fetch_add(1, Ordering::Relaxed) + 1;
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut source = StreamSource::new(read_half);
        let mut reader = LineReader::with_max_line_length(self.max_line_length);

        loop {
            let line = match reader.read_line(&mut source, &self.shutdown).await {
                Ok(line) => line,
                Err(LineError::EndOfStream) => {
                    debug!(connection, "client disconnected");
                    return;
                }
                Err(LineError::Cancelled) => {
                    debug!(connection, "connection closed for shutdown");
                    return;
                }
                Err(err) => {
                    warn!(connection, error = %err, "dropping connection");
                    return;
                }
            };

            if self.echo {
                let mut framed = line.clone().into_bytes();
                framed.extend_from_slice(b"\r\n");
                if let Err(err) = write_half.write_all(&framed).await {
                    warn!(connection, error = %err, "echo failed");
                    return;
                }
            }

            if self.tx.send(LineEvent { connection, line }).is_err() {
                return;
            }
        }
    }
}
