//! Line echo server over a local IPC channel.
//!
//! ```text
//! cargo run -p overstream --example line-echo -- my-channel
//! overstream send my-channel --line "hello" --wait 1
//! ```

use futures_util::SinkExt;
use overstream::line::{LineCodec, LineError, LineReader};
use overstream::listener::{ListenerConfig, PipeListener};
use overstream::transport::{ChannelName, IpcStream, StreamSource};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

async fn echo(stream: IpcStream) {
    let (read_half, write_half) = tokio::io::split(stream);
    let mut source = StreamSource::new(read_half);
    let mut reader = LineReader::new();
    let mut writer = FramedWrite::new(write_half, LineCodec::new());
    let cancel = CancellationToken::new();

    loop {
        match reader.read_line(&mut source, &cancel).await {
            Ok(line) => {
                if let Err(err) = writer.send(line).await {
                    tracing::warn!(error = %err, "echo failed");
                    return;
                }
            }
            Err(LineError::EndOfStream) => return,
            Err(err) => {
                tracing::warn!(error = %err, "read failed");
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let name: ChannelName = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "overstream-echo".to_string())
        .parse()?;

    let mut listener = PipeListener::new(name.clone(), ListenerConfig::default())?;
    listener.start(echo, &CancellationToken::new()).await?;
    tracing::info!(channel = %name, "echoing lines; Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    let report = listener.stop(&CancellationToken::new()).await;
    tracing::info!(?report, "stopped");
    Ok(())
}
