//! Reader client
//!
//! One TCP connection to one LLRP reader. Any number of tasks may send
//! concurrently; a message id assigned at send time correlates each request
//! with its response, and a dedicated task owns the read side of the socket:
//! - Responses are routed to the waiting sender by id
//! - Unsolicited messages (reports, events, keepalives) go to a notification
//!   channel
//! - Anything else is logged and discarded

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};

use crate::protocol::{
    check_response_kind, CloseConnection, CodecError, ErrorMessage, GetSupportedVersion, Header,
    InboundMessage, MessageKind, OutboundMessage, ProtocolVersion, Request, SetProtocolVersion,
    StatusCode, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};

use super::ConnectionConfig;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("message write interrupted, connection is desynchronized: {0}")]
    PayloadWriteInterrupted(std::io::Error),

    #[error("reader rejected {request:?}: {code}: {description}")]
    ReaderRejected {
        request: MessageKind,
        code: StatusCode,
        description: String,
    },
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientState {
    /// TCP dial in progress.
    Connecting,
    /// Socket up, negotiating the protocol version.
    Handshaking,
    /// Accepting sends.
    Ready,
    /// Rejecting new sends, failing pending ones.
    Draining,
    /// Receive task has exited.
    Closed,
}

/// A complete message received from the reader.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub header: Header,
    pub payload: Bytes,
}

impl IncomingMessage {
    pub fn kind(&self) -> Option<MessageKind> {
        self.header.kind()
    }
}

/// An unsolicited reader message forwarded to the host.
#[derive(Debug, Clone)]
pub struct ReaderNotification {
    pub kind: MessageKind,
    pub message_id: u32,
    pub payload: Bytes,
}

type PendingMap = HashMap<u32, oneshot::Sender<IncomingMessage>>;

/// One correlated LLRP connection.
pub struct ReaderClient {
    peer: SocketAddr,
    writer: AsyncMutex<OwnedWriteHalf>,
    version: AtomicU8,
    next_id: AtomicU32,
    pending: Mutex<PendingMap>,
    state_tx: watch::Sender<ClientState>,
    config: ConnectionConfig,
}

impl ReaderClient {
    /// Connects to a reader, starts the receive task and negotiates the
    /// protocol version.
    pub async fn connect(
        addr: SocketAddr,
        config: ConnectionConfig,
        notifications: mpsc::Sender<ReaderNotification>,
    ) -> ClientResult<Arc<Self>> {
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("timed out connecting to {}", addr),
                ))
            })??;

        let (read_half, write_half) = stream.into_split();
        let (state_tx, state_rx) = watch::channel(ClientState::Connecting);

        let client = Arc::new(Self {
            peer: addr,
            writer: AsyncMutex::new(write_half),
            version: AtomicU8::new(ProtocolVersion::MIN.as_u8()),
            next_id: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
            state_tx,
            config,
        });

        tokio::spawn(receive_loop(
            read_half,
            client.clone(),
            notifications,
            state_rx,
        ));

        client.state_tx.send_replace(ClientState::Handshaking);
        if let Err(e) = client.negotiate().await {
            client.shutdown().await;
            return Err(e);
        }
        client.state_tx.send_replace(ClientState::Ready);

        tracing::debug!(
            "connected to reader at {} (LLRP {})",
            addr,
            client.version()
        );
        Ok(client)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ClientState {
        *self.state_tx.borrow()
    }

    /// True once the connection stopped accepting sends.
    pub fn is_closed(&self) -> bool {
        self.state() >= ClientState::Draining
    }

    /// The protocol version negotiated with this reader.
    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion::from_u8(self.version.load(Ordering::Relaxed))
            .unwrap_or(ProtocolVersion::MIN)
    }

    /// Resolves once the receive task has exited.
    pub async fn closed(&self) {
        let mut state_rx = self.state_tx.subscribe();
        // an error means the sender is gone, which also means closed
        let _ = state_rx.wait_for(|s| *s == ClientState::Closed).await;
    }

    /// Sends a message and waits for the response bearing the same id.
    ///
    /// The id slot is removed if the caller gives up waiting, but a request
    /// already flushed to the socket is not rescinded; its late response is
    /// discarded by the receive task.
    pub async fn send_await(&self, kind: MessageKind, payload: Bytes) -> ClientResult<IncomingMessage> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        if payload.len() as u64 > u64::from(MAX_PAYLOAD_SIZE) {
            return Err(CodecError::OversizePayload {
                len: payload.len() as u64,
            }
            .into());
        }

        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(message_id, tx);
        let _slot = PendingSlot {
            pending: &self.pending,
            message_id,
        };

        let header = Header {
            version: self.version.load(Ordering::Relaxed),
            message_type: kind.as_u16(),
            payload_len: payload.len() as u32,
            message_id,
        };
        let encoded = header.encode()?;

        {
            // one writer at a time; header and payload go out as one unit
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.write_all(&encoded).await {
                self.begin_drain();
                return Err(ClientError::Io(e));
            }
            if !payload.is_empty() {
                if let Err(e) = writer.write_all(&payload).await {
                    // the peer's framing is gone; nothing on this
                    // connection can be trusted anymore
                    self.begin_drain();
                    return Err(ClientError::PayloadWriteInterrupted(e));
                }
            }
            if let Err(e) = writer.flush().await {
                self.begin_drain();
                return Err(ClientError::Io(e));
            }
        }

        rx.await.map_err(|_| ClientError::ConnectionClosed)
    }

    /// Sends `request` and decodes its paired response.
    ///
    /// ErrorMessage replies and non-success status blocks both surface as
    /// [`ClientError::ReaderRejected`].
    pub async fn request<R: Request>(&self, request: &R) -> ClientResult<R::Response> {
        let kind = <R as OutboundMessage>::KIND;
        let payload = request.to_bytes()?;
        let reply = self.send_await(kind, payload).await?;

        if reply.header.message_type == MessageKind::ErrorMessage.as_u16() {
            let error = ErrorMessage::decode(reply.payload)?;
            return Err(ClientError::ReaderRejected {
                request: kind,
                code: error.status.code,
                description: error.status.description,
            });
        }

        check_response_kind(kind, reply.header.message_type)?;
        let response = R::Response::decode(reply.payload)?;
        if let Some(status) = response.status() {
            if !status.is_success() {
                return Err(ClientError::ReaderRejected {
                    request: kind,
                    code: status.code,
                    description: status.description.clone(),
                });
            }
        }
        Ok(response)
    }

    /// Closes the connection, failing any pending requests.
    ///
    /// A CloseConnection exchange is attempted first when the connection is
    /// still healthy; the reader may already be gone, so failures there are
    /// only logged.
    pub async fn shutdown(&self) {
        if self.state() == ClientState::Ready {
            let close = self.request(&CloseConnection);
            match tokio::time::timeout(self.config.close_timeout, close).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::debug!("close request to {} failed: {}", self.peer, e),
                Err(_) => tracing::debug!("close request to {} timed out", self.peer),
            }
        }

        self.begin_drain();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    /// Stops accepting sends and fails everything in flight.
    fn begin_drain(&self) {
        self.state_tx.send_if_modified(|state| {
            if *state < ClientState::Draining {
                *state = ClientState::Draining;
                true
            } else {
                false
            }
        });
        // dropping the senders wakes every waiter with ConnectionClosed
        self.pending.lock().unwrap().clear();
    }

    /// Negotiates the newest protocol version both sides speak.
    ///
    /// Readers predating GetSupportedVersion answer the probe with an
    /// ErrorMessage; those get the minimum version, silently.
    async fn negotiate(&self) -> ClientResult<()> {
        let mut target = match self.request(&GetSupportedVersion).await {
            Ok(response) => ProtocolVersion::from_u8(response.supported_version)
                .unwrap_or(ProtocolVersion::MIN)
                .min(ProtocolVersion::MAX),
            Err(ClientError::ReaderRejected { code, .. }) => {
                tracing::debug!(
                    "reader {} rejected the version probe ({}); using LLRP {}",
                    self.peer,
                    code,
                    ProtocolVersion::MIN
                );
                ProtocolVersion::MIN
            }
            Err(e) => return Err(e),
        };

        if target > ProtocolVersion::MIN {
            match self
                .request(&SetProtocolVersion {
                    version: target.as_u8(),
                })
                .await
            {
                Ok(_) => {}
                Err(ClientError::ReaderRejected { code, .. }) => {
                    tracing::debug!(
                        "reader {} rejected version {} ({}); using LLRP {}",
                        self.peer,
                        target,
                        code,
                        ProtocolVersion::MIN
                    );
                    target = ProtocolVersion::MIN;
                }
                Err(e) => return Err(e),
            }
        }

        self.version.store(target.as_u8(), Ordering::Relaxed);
        Ok(())
    }

    /// Answers a reader keepalive, echoing its id.
    async fn acknowledge_keepalive(&self, message_id: u32) {
        let header = Header {
            version: self.version.load(Ordering::Relaxed),
            message_type: MessageKind::KeepAliveAck.as_u16(),
            payload_len: 0,
            message_id,
        };
        let encoded = match header.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("failed to encode keepalive ack: {}", e);
                return;
            }
        };

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_all(&encoded).await {
            tracing::warn!("failed to acknowledge keepalive from {}: {}", self.peer, e);
            return;
        }
        let _ = writer.flush().await;
    }
}

/// Removes the pending entry when a sender stops waiting.
struct PendingSlot<'a> {
    pending: &'a Mutex<PendingMap>,
    message_id: u32,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.lock().unwrap().remove(&self.message_id);
    }
}

/// Owns the read side of the socket for the life of the connection.
async fn receive_loop(
    mut reader: OwnedReadHalf,
    client: Arc<ReaderClient>,
    notifications: mpsc::Sender<ReaderNotification>,
    mut state_rx: watch::Receiver<ClientState>,
) {
    let reason = loop {
        let mut header_buf = [0u8; HEADER_SIZE];
        tokio::select! {
            result = reader.read_exact(&mut header_buf) => {
                if let Err(e) = result {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        break "connection closed by reader".to_string();
                    }
                    break format!("read error: {}", e);
                }
            }
            _ = state_rx.wait_for(|s| *s >= ClientState::Draining) => {
                break "shutdown requested".to_string();
            }
        }

        // a bad header leaves nothing to skip, so just move on to the next
        let header = match Header::decode(&header_buf) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!("discarding message with invalid header: {}", e);
                continue;
            }
        };

        let payload = if header.payload_len == 0 {
            Bytes::new()
        } else {
            match read_payload(&mut reader, header.payload_len, &mut state_rx).await {
                Ok(payload) => payload,
                Err(reason) => break reason,
            }
        };

        let slot = client.pending.lock().unwrap().remove(&header.message_id);
        if let Some(tx) = slot {
            if tx.send(IncomingMessage { header, payload }).is_err() {
                tracing::debug!(
                    "response {} arrived after its sender gave up",
                    header.message_id
                );
            }
            continue;
        }

        match header.kind() {
            Some(kind) if kind.is_notification() => {
                if kind == MessageKind::KeepAlive {
                    client.acknowledge_keepalive(header.message_id).await;
                }
                let notification = ReaderNotification {
                    kind,
                    message_id: header.message_id,
                    payload,
                };
                if notifications.send(notification).await.is_err() {
                    tracing::debug!("notification outlet closed; dropping {:?}", kind);
                }
            }
            _ => {
                // either a response nobody is waiting for (likely cancelled)
                // or a type we don't know, possibly from the reserved band
                tracing::warn!(
                    "discarding message with no waiting sender: type {} id {}",
                    header.message_type,
                    header.message_id
                );
            }
        }
    };

    tracing::debug!("reader connection to {} closed: {}", client.peer, reason);
    client.begin_drain();
    client.state_tx.send_replace(ClientState::Closed);
}

/// Reads exactly `len` payload bytes; a short read is fatal because the
/// stream can no longer be reframed.
async fn read_payload(
    reader: &mut OwnedReadHalf,
    len: u32,
    state_rx: &mut watch::Receiver<ClientState>,
) -> Result<Bytes, String> {
    let mut buf = Vec::with_capacity((len as usize).min(64 * 1024));
    let read = async {
        // the limit keeps a pipelined next message out of this buffer
        let mut limited = reader.take(u64::from(len));
        limited.read_to_end(&mut buf).await
    };

    let got = tokio::select! {
        result = read => result.map_err(|e| format!("payload read error: {}", e))?,
        _ = state_rx.wait_for(|s| *s >= ClientState::Draining) => {
            return Err("shutdown requested".to_string());
        }
    };

    if got != len as usize {
        return Err(CodecError::PayloadReadShort {
            expected: len,
            got: got as u32,
        }
        .to_string());
    }
    Ok(Bytes::from(buf))
}
