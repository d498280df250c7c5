#![cfg(unix)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use overstream_line::LineReader;
use overstream_listener::{
    connect, ListenerConfig, ListenerError, ListenerHealth, PipeListener, ShutdownReport,
};
use overstream_transport::{ChannelName, IpcStream, StreamSource};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn unique_name(tag: &str) -> ChannelName {
    ChannelName::new(format!(
        "ovs-it-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
    .expect("name should be valid")
}

fn small_config() -> ListenerConfig {
    ListenerConfig::default().with_worker_count(2)
}

/// Handler that forwards every line it reads to `tx`.
fn line_collector(
    tx: mpsc::UnboundedSender<String>,
) -> impl Fn(IpcStream) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
       + Send
       + Sync
       + 'static {
    move |stream: IpcStream| {
        let tx = tx.clone();
        Box::pin(async move {
            let mut source = StreamSource::new(stream);
            let mut reader = LineReader::new();
            let cancel = CancellationToken::new();
            while let Ok(line) = reader.read_line(&mut source, &cancel).await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
    }
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("line should arrive in time")
        .expect("handler channel should stay open")
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_receives_lines() {
    let name = unique_name("lines");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut listener = PipeListener::new(name.clone(), small_config()).expect("config is valid");
    listener
        .start(line_collector(tx), &CancellationToken::new())
        .await
        .expect("listener should start");
    assert_eq!(listener.health(), ListenerHealth::Running);

    let mut client = connect(&name).await.expect("client should connect");
    client
        .write_all(b"GET /_ping HTTP/1.1\r\nHost: docker\r\n\r\n")
        .await
        .expect("client should write");

    assert_eq!(recv(&mut rx).await, "GET /_ping HTTP/1.1");
    assert_eq!(recv(&mut rx).await, "Host: docker");
    assert_eq!(recv(&mut rx).await, "");

    let report = listener.stop(&CancellationToken::new()).await;
    assert!(report.is_clean());
    assert_eq!(report.workers_stopped, 2);
    assert_eq!(report.keepalive_disposed, 2);
    assert_eq!(listener.stats().accepted, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_connecting_right_after_start_is_served() {
    let name = unique_name("immediate");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut listener = PipeListener::new(name.clone(), ListenerConfig::default().with_worker_count(1))
        .expect("config is valid");
    listener
        .start(line_collector(tx), &CancellationToken::new())
        .await
        .expect("listener should start");

    let mut client = connect(&name).await.expect("channel must resolve once start returns");
    client.write_all(b"first\n").await.expect("client should write");
    assert_eq!(recv(&mut rx).await, "first");

    listener.stop(&CancellationToken::new()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_handler_does_not_block_next_client() {
    let name = unique_name("slow");
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel::<usize>();

    let handler = {
        let calls = Arc::clone(&calls);
        move |stream: IpcStream| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let tx = tx.clone();
            async move {
                let _ = tx.send(n);
                if n == 0 {
                    // Hold the first connection forever.
                    std::future::pending::<()>().await;
                }
                drop(stream);
            }
        }
    };

    let mut listener = PipeListener::new(name.clone(), ListenerConfig::default().with_worker_count(1))
        .expect("config is valid");
    listener
        .start(handler, &CancellationToken::new())
        .await
        .expect("listener should start");

    let _first = connect(&name).await.expect("first client should connect");
    let _second = connect(&name).await.expect("second client should connect");

    let mut seen = Vec::new();
    for _ in 0..2 {
        let n = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("both handlers should start promptly")
            .expect("sender alive");
        seen.push(n);
    }
    seen.sort_unstable();
    assert_eq!(seen, [0, 1]);
    assert!(listener.stats().active_handlers >= 1);

    listener.stop(&CancellationToken::new()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rapid_reconnect_never_loses_channel() {
    let name = unique_name("churn");
    let mut listener = PipeListener::new(name.clone(), small_config()).expect("config is valid");
    listener
        .start(
            |stream: IpcStream| async move { drop(stream) },
            &CancellationToken::new(),
        )
        .await
        .expect("listener should start");

    for i in 0..50 {
        let client = connect(&name)
            .await
            .unwrap_or_else(|e| panic!("connect #{i} should succeed: {e}"));
        drop(client);
        assert!(name.platform_path().exists(), "channel vanished after #{i}");
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while listener.stats().accepted < 50 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(listener.stats().accepted, 50);

    listener.stop(&CancellationToken::new()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_is_idempotent() {
    let name = unique_name("idem");
    let mut listener = PipeListener::new(name, small_config()).expect("config is valid");

    assert_eq!(
        listener.stop(&CancellationToken::new()).await,
        ShutdownReport::default()
    );

    listener
        .start(
            |stream: IpcStream| async move { drop(stream) },
            &CancellationToken::new(),
        )
        .await
        .expect("listener should start");
    let first = listener.stop(&CancellationToken::new()).await;
    assert_eq!(first.workers_stopped, 2);

    let second = listener.stop(&CancellationToken::new()).await;
    assert_eq!(second, ShutdownReport::default());
    assert_eq!(listener.health(), ListenerHealth::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_removes_channel_and_restart_recreates_it() {
    let name = unique_name("restart");
    let path = name.platform_path();
    let mut listener = PipeListener::new(name.clone(), small_config()).expect("config is valid");

    for _ in 0..2 {
        listener
            .start(
                |stream: IpcStream| async move { drop(stream) },
                &CancellationToken::new(),
            )
            .await
            .expect("listener should start");
        assert!(path.exists());
        connect(&name).await.expect("client should connect");

        listener.stop(&CancellationToken::new()).await;
        assert!(!path.exists(), "socket file should be removed on stop");
        assert!(connect(&name).await.is_err());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn second_start_is_rejected() {
    let name = unique_name("twice");
    let mut listener = PipeListener::new(name, small_config()).expect("config is valid");
    let noop = |stream: IpcStream| async move { drop(stream) };

    listener
        .start(noop, &CancellationToken::new())
        .await
        .expect("listener should start");
    let again = listener.start(noop, &CancellationToken::new()).await;
    assert!(matches!(again, Err(ListenerError::AlreadyRunning)));

    listener.stop(&CancellationToken::new()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_start_leaves_nothing_behind() {
    let name = unique_name("cancel-start");
    let mut listener = PipeListener::new(name.clone(), small_config()).expect("config is valid");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = listener
        .start(|stream: IpcStream| async move { drop(stream) }, &cancel)
        .await;
    assert!(matches!(result, Err(ListenerError::Cancelled)));
    assert!(!listener.is_running());
    assert!(!name.platform_path().exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn name_owned_by_live_listener_is_refused() {
    let name = unique_name("owned");
    let noop = |stream: IpcStream| async move { drop(stream) };
    let mut owner = PipeListener::new(name.clone(), small_config()).expect("config is valid");
    owner
        .start(noop, &CancellationToken::new())
        .await
        .expect("owner should start");

    let mut intruder = PipeListener::new(name.clone(), small_config()).expect("config is valid");
    let result = intruder.start(noop, &CancellationToken::new()).await;
    assert!(matches!(result, Err(ListenerError::Transport(_))));

    // The owner keeps serving.
    connect(&name).await.expect("owner should still accept");
    owner.stop(&CancellationToken::new()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_panic_is_contained() {
    let name = unique_name("panic");
    let mut listener = PipeListener::new(name.clone(), small_config()).expect("config is valid");
    listener
        .start(
            |_stream: IpcStream| async move { panic!("handler blew up") },
            &CancellationToken::new(),
        )
        .await
        .expect("listener should start");

    for _ in 0..3 {
        connect(&name).await.expect("client should connect");
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while listener.stats().handler_panics < 3 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let stats = listener.stats();
    assert_eq!(stats.handler_panics, 3);
    assert_eq!(stats.active_handlers, 0);
    assert_eq!(listener.health(), ListenerHealth::Running);

    let report = listener.stop(&CancellationToken::new()).await;
    assert!(report.is_clean(), "handler panics must not leak into worker outcomes");
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_stop_still_quiesces() {
    let name = unique_name("cancel-stop");
    let mut listener = PipeListener::new(name.clone(), small_config()).expect("config is valid");
    listener
        .start(
            |stream: IpcStream| async move { drop(stream) },
            &CancellationToken::new(),
        )
        .await
        .expect("listener should start");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = listener.stop(&cancel).await;

    assert_eq!(
        report.workers_stopped + report.keepalive_disposed + report.aborted_tasks,
        4
    );
    assert_eq!(listener.health(), ListenerHealth::Stopped);
    assert!(!name.platform_path().exists());
}
