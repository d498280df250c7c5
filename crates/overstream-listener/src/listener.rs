use std::sync::Arc;

use overstream_transport::{Channel, ChannelName, TransportError};
use serde::Serialize;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ListenerConfig;
use crate::error::{ListenerError, Result};
use crate::handler::ConnectionHandler;
use crate::keepalive::{KeepAliveSide, KeepAlivePair};
use crate::stats::{Counters, ListenerHealth, ListenerStats};
use crate::worker::{AcceptorWorker, EndpointSource};

/// What a lifecycle or worker task reports when it finishes.
#[derive(Debug)]
pub(crate) enum TaskOutcome {
    Worker {
        id: usize,
        result: std::result::Result<(), TransportError>,
    },
    KeepAlive {
        side: KeepAliveSide,
    },
}

/// Summary of how a listener's tasks ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Workers that observed the stop and exited.
    pub workers_stopped: usize,
    /// Workers that had already terminated with an error.
    pub workers_failed: usize,
    /// Keep-alive endpoints disposed.
    pub keepalive_disposed: usize,
    /// Tasks that panicked.
    pub panicked_tasks: usize,
    /// Tasks aborted because the stop itself was cancelled.
    pub aborted_tasks: usize,
}

impl ShutdownReport {
    /// No worker failed and nothing panicked.
    pub fn is_clean(&self) -> bool {
        self.workers_failed == 0 && self.panicked_tasks == 0
    }

    fn record(&mut self, joined: std::result::Result<TaskOutcome, JoinError>) {
        match joined {
            Ok(TaskOutcome::Worker { result: Ok(()), .. }) => self.workers_stopped += 1,
            Ok(TaskOutcome::Worker { result: Err(err), .. }) if err.is_cancelled() => {
                self.workers_stopped += 1;
            }
            Ok(TaskOutcome::Worker {
                id,
                result: Err(err),
            }) => {
                warn!(worker = id, error = %err, "worker had failed before stop");
                self.workers_failed += 1;
            }
            Ok(TaskOutcome::KeepAlive { .. }) => self.keepalive_disposed += 1,
            Err(err) if err.is_cancelled() => self.aborted_tasks += 1,
            Err(err) => {
                error!(error = %err, "listener task panicked");
                self.panicked_tasks += 1;
            }
        }
    }
}

struct Running {
    channel: Arc<Channel>,
    scope: CancellationToken,
    tasks: JoinSet<TaskOutcome>,
}

/// Keeps a named channel permanently available and hands every client that
/// connects to a [`ConnectionHandler`].
///
/// A keep-alive pair anchors the channel name for the whole run, and
/// `worker_count` acceptor workers each hold one waiting endpoint. The
/// listener can be started again after [`stop`](Self::stop).
pub struct PipeListener {
    name: ChannelName,
    config: ListenerConfig,
    counters: Arc<Counters>,
    running: Option<Running>,
}

impl PipeListener {
    pub fn new(name: ChannelName, config: ListenerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name,
            config,
            counters: Arc::new(Counters::default()),
            running: None,
        })
    }

    /// Start accepting.
    ///
    /// When this returns `Ok`, the channel name resolves and a client that
    /// connects right away is served by the first worker. `cancel` aborts
    /// the startup only; everything created so far is disposed. Use
    /// [`stop`](Self::stop) to end a running listener.
    pub async fn start<H: ConnectionHandler>(
        &mut self,
        handler: H,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.running.is_some() {
            return Err(ListenerError::AlreadyRunning);
        }

        let running = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(channel = %self.name, "listener startup cancelled");
                return Err(ListenerError::Cancelled);
            }
            launched = self.launch(handler) => launched?,
        };

        self.running = Some(running);
        Ok(())
    }

    async fn launch<H: ConnectionHandler>(&self, handler: H) -> Result<Running> {
        let mut channel = Channel::bind(self.name.clone(), self.config.channel.clone())?;
        let keepalive = KeepAlivePair::establish(&channel, self.config.keepalive_timeout).await?;
        channel.publish()?;
        let channel = Arc::new(channel);

        // Created before returning so an immediate client has a waiting endpoint.
        let first = channel.create_endpoint()?;

        let scope = CancellationToken::new();
        let mut tasks = JoinSet::new();
        keepalive.spawn_disposal(&mut tasks, &scope);

        self.spawn_workers(&mut tasks, &channel, Some(first), Arc::new(handler), &scope);

        info!(
            channel = %self.name,
            path = ?channel.path(),
            workers = self.config.worker_count,
            "listener started"
        );
        Ok(Running {
            channel,
            scope,
            tasks,
        })
    }

    /// Spawn `worker_count` acceptor workers; the first one starts on `first`.
    fn spawn_workers<H, S>(
        &self,
        tasks: &mut JoinSet<TaskOutcome>,
        source: &Arc<S>,
        mut first: Option<S::Endpoint>,
        handler: Arc<H>,
        scope: &CancellationToken,
    ) where
        H: ConnectionHandler,
        S: EndpointSource,
    {
        self.counters.workers_started(self.config.worker_count);
        for id in 0..self.config.worker_count {
            let worker = AcceptorWorker {
                id,
                source: Arc::clone(source),
                handler: Arc::clone(&handler),
                counters: Arc::clone(&self.counters),
                scope: scope.clone(),
                busy_backoff: self.config.busy_backoff,
            };
            let endpoint = first.take();
            tasks.spawn(async move {
                let result = worker.run(endpoint).await;
                TaskOutcome::Worker { id, result }
            });
        }
    }

    /// Stop accepting and wait until every worker and keep-alive task has
    /// finished.
    ///
    /// Never fails: stopping an idle listener returns an empty report. If
    /// `cancel` fires while waiting, the remaining tasks are aborted and
    /// then reaped, so this still returns only once nothing is left running.
    /// Connection handlers already dispatched are not waited for.
    pub async fn stop(&mut self, cancel: &CancellationToken) -> ShutdownReport {
        let Some(mut running) = self.running.take() else {
            debug!(channel = %self.name, "stop on idle listener");
            return ShutdownReport::default();
        };

        running.scope.cancel();
        let mut report = ShutdownReport::default();
        let mut aborted = false;
        loop {
            let joined = tokio::select! {
                biased;
                joined = running.tasks.join_next() => joined,
                () = cancel.cancelled(), if !aborted => {
                    warn!(
                        channel = %self.name,
                        remaining = running.tasks.len(),
                        "stop cancelled; aborting remaining tasks"
                    );
                    running.tasks.abort_all();
                    aborted = true;
                    continue;
                }
            };
            match joined {
                Some(joined) => report.record(joined),
                None => break,
            }
        }
        drop(running.channel);

        if report.is_clean() {
            info!(channel = %self.name, ?report, "listener stopped");
        } else {
            warn!(channel = %self.name, ?report, "listener stopped with failures");
        }
        report
    }

    pub fn health(&self) -> ListenerHealth {
        match &self.running {
            None => ListenerHealth::Stopped,
            Some(_) if self.counters.live_workers() == 0 => ListenerHealth::Degraded,
            Some(_) => ListenerHealth::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn stats(&self) -> ListenerStats {
        self.counters.snapshot()
    }

    pub fn channel_name(&self) -> &ChannelName {
        &self.name
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }
}

impl Drop for PipeListener {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            // Dropping the JoinSet aborts the tasks; cancel first so waits end cleanly.
            running.scope.cancel();
            debug!(channel = %self.name, "listener dropped while running");
        }
    }
}

impl std::fmt::Debug for PipeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeListener")
            .field("name", &self.name)
            .field("health", &self.health())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_treats_cancelled_worker_as_clean() {
        let mut report = ShutdownReport::default();
        report.record(Ok(TaskOutcome::Worker {
            id: 0,
            result: Err(TransportError::Cancelled),
        }));
        report.record(Ok(TaskOutcome::Worker {
            id: 1,
            result: Ok(()),
        }));
        report.record(Ok(TaskOutcome::KeepAlive {
            side: KeepAliveSide::Server,
        }));

        assert_eq!(report.workers_stopped, 2);
        assert_eq!(report.keepalive_disposed, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn report_counts_failed_workers() {
        let mut report = ShutdownReport::default();
        report.record(Ok(TaskOutcome::Worker {
            id: 3,
            result: Err(TransportError::Unsupported("gone")),
        }));
        assert_eq!(report.workers_failed, 1);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn report_counts_panics_and_aborts() {
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        tasks.spawn(async { panic!("boom") });
        let mut report = ShutdownReport::default();
        report.record(tasks.join_next().await.expect("task should be joined"));

        tasks.spawn(std::future::pending());
        tasks.abort_all();
        report.record(tasks.join_next().await.expect("task should be joined"));

        assert_eq!(report.panicked_tasks, 1);
        assert_eq!(report.aborted_tasks, 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn new_rejects_invalid_config() {
        let name = ChannelName::new("ovs-invalid").expect("name should be valid");
        let result = PipeListener::new(name, ListenerConfig::default().with_worker_count(0));
        assert!(matches!(result, Err(ListenerError::InvalidConfig(_))));
    }

    #[cfg(unix)]
    mod scripted_workers {
        use overstream_transport::IpcStream;

        use super::*;
        use crate::worker::scripted::{wait_until, ScriptedSource, Step};

        fn unique_name(tag: &str) -> ChannelName {
            ChannelName::new(format!(
                "ovs-lst-{tag}-{}-{}",
                std::process::id(),
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .expect("time should be after epoch")
                    .as_nanos()
            ))
            .expect("name should be valid")
        }

        /// Mark `listener` running with workers drawing from `source`.
        fn run_on(listener: &mut PipeListener, source: &Arc<ScriptedSource>) {
            let channel = Channel::bind(listener.name.clone(), listener.config.channel.clone())
                .expect("channel should bind");
            let scope = CancellationToken::new();
            let mut tasks = JoinSet::new();
            listener.spawn_workers(
                &mut tasks,
                source,
                None,
                Arc::new(|_stream: IpcStream| async {}),
                &scope,
            );
            listener.running = Some(Running {
                channel: Arc::new(channel),
                scope,
                tasks,
            });
        }

        #[tokio::test]
        async fn degraded_when_every_worker_fails() {
            let config = ListenerConfig::default().with_worker_count(2);
            let mut listener =
                PipeListener::new(unique_name("degraded"), config).expect("config should be valid");
            let source = ScriptedSource::new([Step::CreateFails, Step::CreateFails]);
            run_on(&mut listener, &source);

            wait_until(|| listener.health() == ListenerHealth::Degraded).await;
            assert!(listener.is_running());
            assert_eq!(listener.stats().failed_workers, 2);
            assert_eq!(listener.stats().live_workers, 0);

            let report = listener.stop(&CancellationToken::new()).await;
            assert_eq!(report.workers_failed, 2);
            assert_eq!(report.workers_stopped, 0);
            assert!(!report.is_clean());
            assert_eq!(listener.health(), ListenerHealth::Stopped);
        }

        #[tokio::test]
        async fn one_failed_worker_leaves_listener_running() {
            let config = ListenerConfig::default().with_worker_count(3);
            let mut listener =
                PipeListener::new(unique_name("partial"), config).expect("config should be valid");
            let source = ScriptedSource::new([Step::CreateFails]);
            run_on(&mut listener, &source);

            wait_until(|| listener.stats().failed_workers == 1 && source.requests() >= 3).await;
            assert_eq!(listener.health(), ListenerHealth::Running);
            assert_eq!(listener.stats().live_workers, 2);

            let report = listener.stop(&CancellationToken::new()).await;
            assert_eq!(report.workers_stopped, 2);
            assert_eq!(report.workers_failed, 1);
        }

        #[tokio::test]
        async fn busy_channel_is_not_a_failure() {
            let config = ListenerConfig::default()
                .with_worker_count(2)
                .with_busy_backoff(std::time::Duration::from_millis(10));
            let mut listener =
                PipeListener::new(unique_name("busy"), config).expect("config should be valid");
            let source = ScriptedSource::new([Step::Busy, Step::Busy, Step::Busy]);
            run_on(&mut listener, &source);

            wait_until(|| source.requests() >= 5).await;
            assert_eq!(listener.health(), ListenerHealth::Running);
            assert_eq!(listener.stats().failed_workers, 0);

            let report = listener.stop(&CancellationToken::new()).await;
            assert_eq!(report.workers_stopped, 2);
            assert!(report.is_clean());
        }
    }
}
