use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use overstream_transport::{Channel, IpcStream, ServerEndpoint, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, trace, warn, Instrument};

use crate::handler::ConnectionHandler;
use crate::stats::Counters;

/// Where an acceptor worker gets its endpoints from.
pub(crate) trait EndpointSource: Send + Sync + 'static {
    type Endpoint: PendingEndpoint;

    fn create_endpoint(&self) -> Result<Self::Endpoint, TransportError>;
}

/// A server endpoint that has not been connected yet.
pub(crate) trait PendingEndpoint: Send + 'static {
    fn wait_for_connection(self) -> impl Future<Output = Result<IpcStream, TransportError>> + Send;
}

impl EndpointSource for Channel {
    type Endpoint = ServerEndpoint;

    fn create_endpoint(&self) -> Result<ServerEndpoint, TransportError> {
        Channel::create_endpoint(self)
    }
}

impl PendingEndpoint for ServerEndpoint {
    fn wait_for_connection(self) -> impl Future<Output = Result<IpcStream, TransportError>> + Send {
        ServerEndpoint::wait_for_connection(self)
    }
}

/// One accept loop: create an endpoint, wait for a client, dispatch, repeat.
pub(crate) struct AcceptorWorker<H, S = Channel> {
    pub(crate) id: usize,
    pub(crate) source: Arc<S>,
    pub(crate) handler: Arc<H>,
    pub(crate) counters: Arc<Counters>,
    pub(crate) scope: CancellationToken,
    pub(crate) busy_backoff: Duration,
}

impl<H: ConnectionHandler, S: EndpointSource> AcceptorWorker<H, S> {
    /// Run until the scope fires or endpoint creation fails for good.
    ///
    /// `first` is an endpoint created before the worker was spawned; it is
    /// waited on before any new one is created.
    pub(crate) async fn run(self, first: Option<S::Endpoint>) -> Result<(), TransportError> {
        debug!(worker = self.id, "acceptor worker started");
        let result = self.accept_loop(first).await;

        let failed = result.is_err();
        let live = self.counters.worker_exited(failed);
        match &result {
            Ok(()) => debug!(worker = self.id, "acceptor worker stopped"),
            Err(err) if live == 0 => error!(
                worker = self.id,
                error = %err,
                "last acceptor worker failed; listener is degraded and accepts no new clients"
            ),
            Err(err) => warn!(
                worker = self.id,
                live_workers = live,
                error = %err,
                "acceptor worker failed"
            ),
        }
        result
    }

    async fn accept_loop(&self, mut pending: Option<S::Endpoint>) -> Result<(), TransportError> {
        loop {
            let endpoint = match pending.take() {
                Some(endpoint) => endpoint,
                None => match self.create_endpoint().await? {
                    Some(endpoint) => endpoint,
                    None => return Ok(()),
                },
            };

            tokio::select! {
                biased;
                () = self.scope.cancelled() => {
                    trace!(worker = self.id, "wait cancelled; endpoint disposed undispatched");
                    return Ok(());
                }
                connected = endpoint.wait_for_connection() => match connected {
                    Ok(stream) => self.dispatch(stream),
                    Err(err) if err.is_cancelled() => return Ok(()),
                    Err(err) => {
                        if err.is_transient() {
                            self.counters.transient_fault();
                            debug!(worker = self.id, error = %err, "client went away during accept");
                        } else {
                            warn!(worker = self.id, error = %err, "accept failed; retrying");
                            if !self.pause().await {
                                return Ok(());
                            }
                        }
                    }
                },
            }
        }
    }

    /// Create a fresh endpoint, backing off while the instance limit is hit.
    ///
    /// Returns `Ok(None)` if the scope fires while backing off.
    async fn create_endpoint(&self) -> Result<Option<S::Endpoint>, TransportError> {
        loop {
            if self.scope.is_cancelled() {
                return Ok(None);
            }
            match self.source.create_endpoint() {
                Ok(endpoint) => return Ok(Some(endpoint)),
                Err(TransportError::InstancesExhausted) => {
                    trace!(worker = self.id, backoff = ?self.busy_backoff, "all instances busy");
                    if !self.pause().await {
                        return Ok(None);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Sleep for the busy backoff; `false` if the scope fired first.
    async fn pause(&self) -> bool {
        tokio::select! {
            biased;
            () = self.scope.cancelled() => false,
            () = tokio::time::sleep(self.busy_backoff) => true,
        }
    }

    /// Hand the stream to the handler on its own task; never awaited here.
    fn dispatch(&self, stream: IpcStream) {
        let id = self.counters.connection_accepted();
        let span = info_span!("connection", id, worker = self.id);
        debug!(parent: &span, transport = stream.transport_name(), "connection accepted");

        let handler = Arc::clone(&self.handler);
        let counters = Arc::clone(&self.counters);
        let task = tokio::spawn(
            async move { handler.on_connection(stream).await }.instrument(span.clone()),
        );

        tokio::spawn(async move {
            let panicked = match task.await {
                Ok(()) => false,
                Err(err) if err.is_panic() => {
                    error!(parent: &span, "connection handler panicked");
                    true
                }
                Err(_) => false,
            };
            counters.handler_finished(panicked);
            trace!(parent: &span, "connection handler finished");
        });
    }
}
