//! Reconnect supervisor
//!
//! Presents a durable per-reader handle: the transient client underneath is
//! replaced whenever the connection drops, while callers keep one stable
//! send surface. Sends issued while no client is live simply wait for the
//! next successful reconnect (or the caller's deadline).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;

use crate::protocol::Request;

use super::{ClientError, ConnectionConfig, ReaderClient, ReaderNotification};

/// Retries granted to a send that keeps landing on a closing connection.
pub const CLOSED_SENDER_RETRIES: usize = 3;

/// Send errors
#[derive(Error, Debug)]
pub enum SendError {
    #[error("device is shutting down")]
    ShuttingDown,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub type SendResult<T> = Result<T, SendError>;

/// The live client, stamped with a generation so retrying senders can tell
/// a fresh connection from the one that just failed them.
type ClientSlot = (u64, Option<Arc<ReaderClient>>);

/// A durable handle to one named reader.
pub struct ReaderSupervisor {
    name: String,
    addr: Arc<RwLock<SocketAddr>>,
    client_rx: watch::Receiver<ClientSlot>,
    reconnect_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    stopped: AtomicBool,
    task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl ReaderSupervisor {
    /// Creates the supervisor and starts its reconnect loop immediately.
    pub fn new(
        name: String,
        addr: SocketAddr,
        config: ConnectionConfig,
        notifications: mpsc::Sender<ReaderNotification>,
    ) -> Self {
        let addr = Arc::new(RwLock::new(addr));
        let (client_tx, client_rx) = watch::channel((0, None));
        let (reconnect_tx, reconnect_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let reconnect = ReconnectLoop {
            name: name.clone(),
            addr: addr.clone(),
            client_tx,
            reconnect_rx,
            shutdown_rx,
            config,
            notifications,
            generation: 0,
        };
        let task = tokio::spawn(reconnect.run());

        Self {
            name,
            addr,
            client_rx,
            reconnect_tx,
            shutdown_tx,
            stopped: AtomicBool::new(false),
            task: AsyncMutex::new(Some(task)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn addr(&self) -> SocketAddr {
        *self.addr.read().await
    }

    /// Sends `request` over the live connection, waiting through reconnects.
    ///
    /// A send that fails because the connection closed underneath it is
    /// retried on the next connection, up to [`CLOSED_SENDER_RETRIES`] times.
    /// Rejections from the reader itself are surfaced immediately, never
    /// retried. Callers bound the total wait with `tokio::time::timeout`.
    pub async fn try_send<R: Request>(&self, request: &R) -> SendResult<R::Response> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SendError::ShuttingDown);
        }

        let mut client_rx = self.client_rx.clone();
        let mut last_generation = 0;
        let mut retries_left = CLOSED_SENDER_RETRIES;

        loop {
            let (generation, client) = self.await_client(&mut client_rx, last_generation).await?;
            last_generation = generation;

            match client.request(request).await {
                Err(ClientError::ConnectionClosed) if retries_left > 0 => {
                    retries_left -= 1;
                    tracing::debug!(
                        "device {}: connection closed mid-request; waiting for reconnect ({} retries left)",
                        self.name,
                        retries_left
                    );
                }
                Err(ClientError::ConnectionClosed) => {
                    return Err(ClientError::ConnectionClosed.into())
                }
                Err(e) => return Err(e.into()),
                Ok(response) => return Ok(response),
            }
        }
    }

    /// Waits for a live client newer than `newer_than`.
    async fn await_client(
        &self,
        client_rx: &mut watch::Receiver<ClientSlot>,
        newer_than: u64,
    ) -> SendResult<(u64, Arc<ReaderClient>)> {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Err(SendError::ShuttingDown);
            }
            {
                let slot = client_rx.borrow_and_update();
                if let (generation, Some(client)) = &*slot {
                    if *generation > newer_than && !client.is_closed() {
                        return Ok((*generation, client.clone()));
                    }
                }
            }
            if client_rx.changed().await.is_err() {
                // the reconnect loop is gone; nothing will ever connect
                return Err(SendError::ShuttingDown);
            }
        }
    }

    /// Points the supervisor at a new address, reconnecting if it changed.
    ///
    /// The current connection is closed here, not in the reconnect loop, so
    /// a send racing this update cannot land on the old reader.
    pub async fn update_addr(&self, addr: SocketAddr) {
        {
            let mut current = self.addr.write().await;
            if *current == addr {
                tracing::debug!("device {}: address unchanged ({})", self.name, addr);
                return;
            }
            *current = addr;
        }
        tracing::info!("device {}: address changed to {}", self.name, addr);

        let client = self.client_rx.borrow().1.clone();
        match client {
            Some(client) => client.shutdown().await,
            // no live connection to tear down; nudge the loop so a dial in
            // flight (or a backoff sleep) picks the new address up promptly
            None => {
                let _ = self.reconnect_tx.try_send(());
            }
        }
    }

    /// Stops the reconnect loop and closes any live connection.
    ///
    /// Afterwards every `try_send` fails with [`SendError::ShuttingDown`].
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!("device {}: reconnect task failed: {}", self.name, e);
            }
        }
        tracing::debug!("device {}: stopped", self.name);
    }
}

struct ReconnectLoop {
    name: String,
    addr: Arc<RwLock<SocketAddr>>,
    client_tx: watch::Sender<ClientSlot>,
    reconnect_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
    config: ConnectionConfig,
    notifications: mpsc::Sender<ReaderNotification>,
    generation: u64,
}

impl ReconnectLoop {
    /// Dials until connected, publishes the client, then waits for it to
    /// fail (or be told to reconnect) and starts over.
    async fn run(mut self) {
        let mut backoff_step = 0;

        loop {
            let addr = *self.addr.read().await;
            match ReaderClient::connect(addr, self.config.clone(), self.notifications.clone()).await
            {
                Ok(client) => {
                    backoff_step = 0;
                    self.generation += 1;
                    tracing::info!(
                        "device {}: connected to {} (LLRP {})",
                        self.name,
                        addr,
                        client.version()
                    );
                    self.client_tx
                        .send_replace((self.generation, Some(client.clone())));

                    let mut stopping = false;
                    tokio::select! {
                        _ = client.closed() => {
                            tracing::warn!("device {}: connection to {} lost", self.name, addr);
                        }
                        // a closed trigger channel is not a request
                        Some(_) = self.reconnect_rx.recv() => {
                            tracing::info!("device {}: reconnect requested", self.name);
                            client.shutdown().await;
                        }
                        _ = self.shutdown_rx.recv() => {
                            client.shutdown().await;
                            stopping = true;
                        }
                    }

                    self.client_tx.send_replace((self.generation, None));
                    if stopping {
                        break;
                    }
                }
                Err(e) => {
                    let ladder = &self.config.backoff;
                    let delay = ladder[backoff_step.min(ladder.len() - 1)];
                    backoff_step += 1;
                    tracing::warn!(
                        "device {}: failed to connect to {}: {}; retrying in {:?}",
                        self.name,
                        addr,
                        e,
                        delay
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        Some(_) = self.reconnect_rx.recv() => {
                            // a new address deserves a fresh backoff
                            backoff_step = 0;
                        }
                        _ = self.shutdown_rx.recv() => break,
                    }
                }
            }
        }

        tracing::debug!("device {}: reconnect loop exited", self.name);
    }
}
