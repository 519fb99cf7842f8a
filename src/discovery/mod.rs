//! Reader discovery
//!
//! LLRP readers greet every new TCP connection with a ReaderEventNotification
//! before the client says anything, so a probe only has to connect and look
//! at the first message header. Candidates come from configuration; the scan
//! runs once at startup and reports what it found on the discovery outlet.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::task::JoinSet;

use crate::config::DiscoverySettings;
use crate::network::resolve_addr;
use crate::protocol::{Header, MessageKind, HEADER_SIZE};
use crate::service::{DiscoveredDevice, ProtocolProperties};

/// Probes every configured candidate and returns the readers that answered.
pub async fn scan(settings: &DiscoverySettings) -> Vec<DiscoveredDevice> {
    if settings.hosts.is_empty() {
        tracing::debug!("discovery enabled but no candidate hosts configured");
        return Vec::new();
    }

    let mut probes = JoinSet::new();
    for host in &settings.hosts {
        let host = host.clone();
        let port = settings.port;
        let deadline = settings.probe_timeout();
        probes.spawn(async move { probe(&host, port, deadline).await });
    }

    let mut found = Vec::new();
    while let Some(result) = probes.join_next().await {
        if let Ok(Some(device)) = result {
            found.push(device);
        }
    }

    tracing::info!("discovery scan complete: {} reader(s) found", found.len());
    found
}

/// Connects to one candidate and checks whether it opens with an LLRP
/// reader event. Anything else (refused, silent, not LLRP) is a miss.
async fn probe(host: &str, port: u16, deadline: Duration) -> Option<DiscoveredDevice> {
    let attempt = async {
        let addr = resolve_addr(host, port).await?;
        let mut stream = TcpStream::connect(addr).await?;
        let mut greeting = [0u8; HEADER_SIZE];
        stream.read_exact(&mut greeting).await?;
        Ok::<_, std::io::Error>(greeting)
    };

    let greeting = match tokio::time::timeout(deadline, attempt).await {
        Ok(Ok(greeting)) => greeting,
        Ok(Err(e)) => {
            tracing::trace!("probe {}:{} failed: {}", host, port, e);
            return None;
        }
        Err(_) => {
            tracing::trace!("probe {}:{} timed out", host, port);
            return None;
        }
    };

    let header = Header::decode(&greeting).ok()?;
    if header.kind() != Some(MessageKind::ReaderEventNotification) {
        tracing::debug!(
            "{}:{} answered but did not greet like an LLRP reader (type {})",
            host,
            port,
            header.message_type
        );
        return None;
    }

    tracing::info!("discovered LLRP reader at {}:{}", host, port);
    let mut tcp = HashMap::new();
    tcp.insert("host".to_string(), host.to_string());
    tcp.insert("port".to_string(), port.to_string());
    let mut protocols = ProtocolProperties::new();
    protocols.insert("tcp".to_string(), tcp);

    Some(DiscoveredDevice {
        name: format!("LLRP-{}-{}", host.replace('.', "-"), port),
        protocols,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn fake_reader() -> (TcpListener, u16, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port, "127.0.0.1".to_string())
    }

    fn settings(hosts: Vec<String>, port: u16) -> DiscoverySettings {
        DiscoverySettings {
            enabled: true,
            hosts,
            port,
            probe_timeout_ms: 500,
        }
    }

    #[tokio::test]
    async fn scan_finds_a_greeting_reader() {
        let (listener, port, host) = fake_reader().await;

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // connection-attempt event, 14 payload bytes of event data
            let header = Header {
                version: 1,
                message_type: MessageKind::ReaderEventNotification.as_u16(),
                payload_len: 14,
                message_id: 0,
            };
            stream.write_all(&header.encode().unwrap()).await.unwrap();
            stream.write_all(&[0u8; 14]).await.unwrap();
        });

        let found = scan(&settings(vec![host.clone()], port)).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, format!("LLRP-127-0-0-1-{}", port));
        assert_eq!(found[0].protocols["tcp"]["host"], host);
        assert_eq!(found[0].protocols["tcp"]["port"], port.to_string());
    }

    #[tokio::test]
    async fn scan_ignores_peers_that_are_not_readers() {
        let (listener, port, host) = fake_reader().await;

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"HTTP/1.1 400 no\r\n").await.unwrap();
        });

        let found = scan(&settings(vec![host], port)).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn scan_ignores_silent_and_dead_candidates() {
        // a listener that accepts but never speaks
        let (listener, silent_port, host) = fake_reader().await;
        let _keep = tokio::spawn(async move {
            let _stream = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        // and a port with nothing behind it
        let closed_port = {
            let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
            probe.local_addr().unwrap().port()
        };

        let found = scan(&settings(vec![host.clone()], silent_port)).await;
        assert!(found.is_empty());
        let found = scan(&settings(vec![host], closed_port)).await;
        assert!(found.is_empty());
    }
}
