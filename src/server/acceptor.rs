// src/server/acceptor.rs

//! The acceptor: owns the listening endpoint and runs the accept loop.

use super::accept_policy::{AcceptAction, AcceptErrorPolicy, DefaultAcceptPolicy};
use super::listener::Listener;
use crate::connection::{ConnectionContext, ConnectionHandler};
use crate::core::metrics;
use crate::core::registry::ConnectionRecord;
use crate::core::{BrokerError, ServerState};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// The lifecycle of an acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorPhase {
    Created,
    Listening,
    Accepting,
    Stopped,
}

/// A cloneable handle that stops an acceptor from another task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop_tx: Arc<watch::Sender<bool>>,
    phase: Arc<Mutex<AcceptorPhase>>,
}

impl StopHandle {
    /// Makes the accept loop exit and close the listening endpoint. Connections
    /// already accepted receive the shutdown signal but are not aborted.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn phase(&self) -> AcceptorPhase {
        *self.phase.lock()
    }
}

/// Accepts connections, registers them, and runs each one's handler on its
/// own task.
pub struct Acceptor<L: Listener> {
    state: Arc<ServerState>,
    listener: Option<L>,
    handler: Arc<dyn ConnectionHandler<L::Stream>>,
    policy: Box<dyn AcceptErrorPolicy>,
    phase: Arc<Mutex<AcceptorPhase>>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl Acceptor<TcpListener> {
    /// Creates an acceptor that will bind the configured `host:port` on `start`.
    pub fn new(state: Arc<ServerState>, handler: Arc<dyn ConnectionHandler<TcpStream>>) -> Self {
        Self::build(state, None, handler, AcceptorPhase::Created)
    }

    /// Binds the listening endpoint and returns its local address.
    pub async fn start(&mut self) -> Result<SocketAddr, BrokerError> {
        let phase = self.phase();
        if phase != AcceptorPhase::Created {
            return Err(BrokerError::InvalidState(format!(
                "cannot start an acceptor in phase {phase:?}"
            )));
        }

        let address = self.state.config.address();
        let listener = TcpListener::bind(&address).await.map_err(|source| {
            error!(network = "tcp", address = %address, error = %source, "Error on listener start");
            BrokerError::Bind {
                address: address.clone(),
                source,
            }
        })?;
        let local_addr = listener.local_addr()?;
        info!(network = "tcp", address = %local_addr, "Server start");

        self.listener = Some(listener);
        self.set_phase(AcceptorPhase::Listening);
        Ok(local_addr)
    }

    /// Binds and then accepts until stopped.
    pub async fn serve(mut self) -> Result<(), BrokerError> {
        self.start().await?;
        self.run().await
    }
}

impl<L: Listener> Acceptor<L> {
    /// Creates an acceptor around a listener that is already bound.
    pub fn with_listener(
        state: Arc<ServerState>,
        listener: L,
        handler: Arc<dyn ConnectionHandler<L::Stream>>,
    ) -> Self {
        Self::build(state, Some(listener), handler, AcceptorPhase::Listening)
    }

    fn build(
        state: Arc<ServerState>,
        listener: Option<L>,
        handler: Arc<dyn ConnectionHandler<L::Stream>>,
        phase: AcceptorPhase,
    ) -> Self {
        let policy = DefaultAcceptPolicy::new(state.config.accept_backoff);
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            state,
            listener,
            handler,
            policy: Box::new(policy),
            phase: Arc::new(Mutex::new(phase)),
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        }
    }

    /// Replaces the accept error policy.
    pub fn with_policy(mut self, policy: impl AcceptErrorPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn phase(&self) -> AcceptorPhase {
        *self.phase.lock()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop_tx: self.stop_tx.clone(),
            phase: self.phase.clone(),
        }
    }

    fn set_phase(&self, phase: AcceptorPhase) {
        debug!("Acceptor entering phase {:?}.", phase);
        *self.phase.lock() = phase;
    }

    /// Runs the accept loop until a stop is requested or the listener fails.
    ///
    /// Returns `Ok(())` after a requested stop and `BrokerError::Listener`
    /// after a fatal accept error. Either way the listener is closed, handlers
    /// get the shutdown signal and up to `shutdown_grace` to finish, and the
    /// registry is drained.
    pub async fn run(mut self) -> Result<(), BrokerError> {
        let Some(mut listener) = self.listener.take() else {
            return Err(BrokerError::InvalidState(
                "acceptor has no bound listener".to_string(),
            ));
        };
        let network = listener.network();
        let mut client_tasks: JoinSet<()> = JoinSet::new();
        self.set_phase(AcceptorPhase::Accepting);

        let outcome = loop {
            tokio::select! {
                biased;

                _ = stop_requested(&mut self.stop_rx) => {
                    info!("Stop requested, closing listener.");
                    break Ok(());
                }

                Some(res) = client_tasks.join_next(), if !client_tasks.is_empty() => {
                    if let Err(e) = res
                        && e.is_panic()
                    {
                        error!("A connection handler panicked: {e:?}");
                    }
                }

                res = listener.accept() => match res {
                    Ok((stream, addr)) => self.admit(&mut client_tasks, stream, addr, network),
                    Err(e) => {
                        let action = self.policy.classify(&e);
                        metrics::ACCEPT_ERRORS_TOTAL
                            .with_label_values(&[action.as_label()])
                            .inc();
                        match action {
                            AcceptAction::Retry => {
                                self.state.stats.increment_transient_accept_errors();
                                warn!(error = %e, "Error accept connection");
                            }
                            AcceptAction::RetryAfter(pause) => {
                                self.state.stats.increment_transient_accept_errors();
                                warn!(error = %e, "Error accept connection, pausing for {:?}", pause);
                                let stopped = tokio::select! {
                                    biased;
                                    _ = stop_requested(&mut self.stop_rx) => true,
                                    _ = tokio::time::sleep(pause) => false,
                                };
                                if stopped {
                                    info!("Stop requested during accept backoff, closing listener.");
                                    break Ok(());
                                }
                            }
                            AcceptAction::Stop => {
                                error!(error = %e, "Listener failed, no longer accepting connections");
                                break Err(BrokerError::Listener(e));
                            }
                        }
                    }
                },
            }
        };

        drop(listener);
        self.set_phase(AcceptorPhase::Stopped);
        self.drain(client_tasks).await;
        outcome
    }

    /// Registers an accepted connection and spawns its handler.
    fn admit(
        &self,
        client_tasks: &mut JoinSet<()>,
        stream: L::Stream,
        addr: SocketAddr,
        network: &'static str,
    ) {
        let id = self.state.ids.next_id();
        let (record, close_rx) = ConnectionRecord::new(id, addr, network);

        // Register before the context exists: the context's guard removes
        // this id when dropped.
        if let Err(e) = self.state.registry.add(id, record) {
            error!("{e}; dropping connection from {addr}.");
            return;
        }
        self.state.stats.increment_total_connections();
        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();

        let ctx = ConnectionContext::new(stream, id, addr, network, self.state.clone(), close_rx);
        let handler = self.handler.clone();
        client_tasks.spawn(async move {
            if let Err(e) = handler.handle(ctx).await {
                warn!("Connection {} from {} terminated unexpectedly: {}", id, addr, e);
            }
        });

        info!(address = %addr, network, id = id.get(), "New connection");
    }

    /// Signals connection handlers, gives them the grace period, then clears
    /// whatever is left in the registry.
    async fn drain(&self, mut client_tasks: JoinSet<()>) {
        let _ = self.state.shutdown_tx.send(());

        if !client_tasks.is_empty() {
            let grace = self.state.config.shutdown_grace;
            info!(
                "Waiting up to {:?} for {} connection(s) to finish...",
                grace,
                client_tasks.len()
            );
            let finished = tokio::time::timeout(grace, async {
                while let Some(res) = client_tasks.join_next().await {
                    if let Err(e) = res
                        && e.is_panic()
                    {
                        error!("A connection handler panicked: {e:?}");
                    }
                }
            })
            .await;
            if finished.is_err() {
                warn!(
                    "{} connection(s) still running after the grace period; detaching them.",
                    client_tasks.len()
                );
                client_tasks.detach_all();
            }
        }

        let cleared = self.state.registry.drain();
        if cleared > 0 {
            warn!("Cleared {} connection record(s) at shutdown.", cleared);
        }
        info!("Acceptor stopped.");
    }
}

/// Resolves once the stop flag is set. The watch borrow is released before
/// returning so the accept loop future stays `Send`.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}
