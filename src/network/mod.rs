//! Reader-facing networking
//!
//! Provides:
//! - A client holding one correlated LLRP connection to one reader
//! - A supervisor that keeps a client alive across disconnects
//! - Connection settings shared by both

mod client;
mod supervisor;

pub use client::*;
pub use supervisor::*;

use std::net::SocketAddr;
use std::time::Duration;

/// Settings for a single reader connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Grace given to the CloseConnection exchange during shutdown.
    pub close_timeout: Duration,
    /// Reconnect backoff ladder; the last entry repeats.
    pub backoff: Vec<Duration>,
    /// Capacity of the unsolicited-message channel.
    pub notification_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(1),
            backoff: [1, 2, 4, 8, 30]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            notification_buffer: 64,
        }
    }
}

/// Resolve a hostname to a socket address.
pub async fn resolve_addr(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}

/// A scripted LLRP reader for tests.
#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::BytesMut;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::protocol::{Header, LlrpStatus, MessageKind, StatusCode, HEADER_SIZE};

    use super::ConnectionConfig;

    /// Opt-in test logging: `RUST_LOG=debug cargo test -- --nocapture`.
    pub fn init_logging() {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let _ = tracing_subscriber::registry()
            .with(fmt::layer())
            .with(EnvFilter::from_default_env())
            .try_init();
    }

    pub fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_millis(500),
            close_timeout: Duration::from_millis(50),
            backoff: vec![Duration::from_millis(10)],
            notification_buffer: 16,
        }
    }

    /// An encoded LLRPStatus parameter reporting success.
    pub fn ok_status() -> Vec<u8> {
        let mut buf = BytesMut::new();
        LlrpStatus::success().encode_into(&mut buf).unwrap();
        buf.to_vec()
    }

    /// An encoded LLRPStatus parameter reporting `code`.
    pub fn error_status(code: u16, description: &str) -> Vec<u8> {
        let mut buf = BytesMut::new();
        LlrpStatus {
            code: StatusCode(code),
            description: description.to_string(),
            detail: vec![],
        }
        .encode_into(&mut buf)
        .unwrap();
        buf.to_vec()
    }

    pub async fn read_frame(stream: &mut TcpStream) -> (Header, Vec<u8>) {
        let mut head = [0u8; HEADER_SIZE];
        stream.read_exact(&mut head).await.unwrap();
        let header = Header::decode(&head).unwrap();
        let mut payload = vec![0u8; header.payload_len as usize];
        stream.read_exact(&mut payload).await.unwrap();
        (header, payload)
    }

    pub async fn write_frame(
        stream: &mut TcpStream,
        kind: MessageKind,
        message_id: u32,
        payload: &[u8],
    ) {
        let header = Header {
            version: 1,
            message_type: kind.as_u16(),
            payload_len: payload.len() as u32,
            message_id,
        };
        stream.write_all(&header.encode().unwrap()).await.unwrap();
        stream.write_all(payload).await.unwrap();
    }

    /// Answers the version handshake, offering LLRP 1.1.
    pub async fn serve_handshake(stream: &mut TcpStream) {
        let (header, _) = read_frame(stream).await;
        assert_eq!(header.kind(), Some(MessageKind::GetSupportedVersion));
        let mut payload = vec![2u8, 2u8];
        payload.extend(ok_status());
        write_frame(
            stream,
            MessageKind::GetSupportedVersionResponse,
            header.message_id,
            &payload,
        )
        .await;

        let (header, payload) = read_frame(stream).await;
        assert_eq!(header.kind(), Some(MessageKind::SetProtocolVersion));
        assert_eq!(payload, vec![2u8]);
        write_frame(
            stream,
            MessageKind::SetProtocolVersionResponse,
            header.message_id,
            &ok_status(),
        )
        .await;
    }

    /// Answers every request with a success status until the connection
    /// drops; CloseConnection ends the session cleanly.
    pub async fn serve_requests(stream: &mut TcpStream, requests: &AtomicUsize) {
        loop {
            let mut head = [0u8; HEADER_SIZE];
            if stream.read_exact(&mut head).await.is_err() {
                return;
            }
            let header = Header::decode(&head).unwrap();
            let mut payload = vec![0u8; header.payload_len as usize];
            if stream.read_exact(&mut payload).await.is_err() {
                return;
            }

            let kind = header.kind().expect("request with an unknown type");
            let response = kind.response_kind().expect("request with no pairing");
            write_frame(stream, response, header.message_id, &ok_status()).await;
            if kind == MessageKind::CloseConnection {
                return;
            }
            requests.fetch_add(1, Ordering::SeqCst);
        }
    }
}
