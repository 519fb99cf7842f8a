//! Adapter surface and device registry
//!
//! The host framework calls in here with device names and schemaless
//! resource requests; the driver resolves each name to a reconnecting
//! supervisor, translates resources into LLRP requests and hands back
//! JSON-encoded responses. Unsolicited reader traffic is forwarded per
//! device onto the host's async channel.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;

use crate::config::ServiceConfig;
use crate::discovery;
use crate::network::{
    resolve_addr, ReaderNotification, ReaderSupervisor, SendError,
};
use crate::protocol::{
    AddRoSpec, DeleteAccessSpec, DeleteRoSpec, DisableAccessSpec, DisableRoSpec, EnableAccessSpec,
    EnableRoSpec, GetAccessSpecs, GetReaderCapabilities, GetReaderConfig, GetRoSpecs, MessageKind,
    RoSpec, SetReaderConfig, StartRoSpec, StopRoSpec,
};

use super::{AsyncValues, CommandRequest, CommandValue, DiscoveredDevice, ProtocolProperties};

pub const RESOURCE_READER_CAPABILITIES: &str = "ReaderCapabilities";
pub const RESOURCE_READER_CONFIG: &str = "ReaderConfig";
pub const RESOURCE_READER_NOTIFICATION: &str = "ReaderEventNotification";
pub const RESOURCE_RO_SPEC: &str = "ROSpec";
pub const RESOURCE_RO_SPEC_ID: &str = "ROSpecID";
pub const RESOURCE_ACCESS_SPEC: &str = "AccessSpec";
pub const RESOURCE_ACCESS_SPEC_ID: &str = "AccessSpecID";
pub const RESOURCE_RO_ACCESS_REPORT: &str = "ROAccessReport";
pub const RESOURCE_ACTION: &str = "Action";

pub const ACTION_ENABLE: &str = "Enable";
pub const ACTION_START: &str = "Start";
pub const ACTION_STOP: &str = "Stop";
pub const ACTION_DISABLE: &str = "Disable";
pub const ACTION_DELETE: &str = "Delete";

/// Driver errors
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("missing requests")]
    MissingRequests,

    #[error("unknown resource: {0:?}")]
    UnknownResource(String),

    #[error("{operation} needs at least {needed} parameters, but got {got}")]
    MissingParameter {
        operation: String,
        needed: usize,
        got: usize,
    },

    #[error("{operation} expected parameter {index} to be {expected}, but got {got}")]
    WrongParameterName {
        operation: String,
        index: usize,
        expected: String,
        got: String,
    },

    #[error("{operation} parameter {name} has the wrong type")]
    WrongParameterType { operation: String, name: String },

    #[error("unknown {resource} action: {action:?}")]
    BadActionName { resource: String, action: String },

    #[error("expected {expected} resources for {resource} op, but got {got}")]
    WrongResourceCount {
        resource: String,
        expected: usize,
        got: usize,
    },

    #[error("missing tcp protocol")]
    MissingProtocol,

    #[error("tcp missing host or port ({host:?}, {port:?})")]
    MissingHostPort { host: String, port: String },

    #[error("unable to create addr for tcp protocol ({host:?}, {port:?}): {reason}")]
    AddrInvalid {
        host: String,
        port: String,
        reason: String,
    },

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("bad JSON at the command boundary: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// The device-service driver: one supervisor per named reader plus the
/// entry points the host invokes.
pub struct Driver {
    config: ServiceConfig,
    devices: RwLock<HashMap<String, Arc<ReaderSupervisor>>>,
    async_tx: mpsc::Sender<AsyncValues>,
    discovery_tx: mpsc::Sender<Vec<DiscoveredDevice>>,
}

impl Driver {
    /// Builds the driver, records the host outlets and, when enabled,
    /// schedules the one-time discovery scan.
    pub fn initialize(
        config: ServiceConfig,
        async_tx: mpsc::Sender<AsyncValues>,
        discovery_tx: mpsc::Sender<Vec<DiscoveredDevice>>,
    ) -> Arc<Self> {
        let driver = Arc::new(Self {
            config,
            devices: RwLock::new(HashMap::new()),
            async_tx,
            discovery_tx,
        });

        if driver.config.discovery.enabled {
            let settings = driver.config.discovery.clone();
            let discovery_tx = driver.discovery_tx.clone();
            tokio::spawn(async move {
                let found = discovery::scan(&settings).await;
                if discovery_tx.send(found).await.is_err() {
                    tracing::debug!("discovery outlet closed before the scan finished");
                }
            });
        }

        driver
    }

    /// Triggers a read for each requested resource, returning one
    /// JSON-string value per request.
    pub async fn handle_read(
        &self,
        device_name: &str,
        protocols: &ProtocolProperties,
        requests: &[CommandRequest],
    ) -> DriverResult<Vec<CommandValue>> {
        tracing::debug!(
            "handle_read: device {} requests {:?}",
            device_name,
            requests
        );
        if requests.is_empty() {
            return Err(DriverError::MissingRequests);
        }

        let device = self.device(device_name, protocols).await?;
        match tokio::time::timeout(
            self.config.service.request_timeout(),
            read_all(&device, requests),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SendError::DeadlineExceeded.into()),
        }
    }

    /// Performs the write described by `requests` and `params`; on success
    /// the JSON response is also pushed onto the async channel so
    /// observers see the confirmation.
    pub async fn handle_write(
        &self,
        device_name: &str,
        protocols: &ProtocolProperties,
        requests: &[CommandRequest],
        params: &[CommandValue],
    ) -> DriverResult<()> {
        tracing::debug!(
            "handle_write: device {} requests {:?}",
            device_name,
            requests
        );
        if requests.is_empty() {
            return Err(DriverError::MissingRequests);
        }

        let device = self.device(device_name, protocols).await?;
        let (resource, response) = match tokio::time::timeout(
            self.config.service.request_timeout(),
            write_one(&device, requests, params),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(SendError::DeadlineExceeded.into()),
        };

        let async_tx = self.async_tx.clone();
        let device_name = device_name.to_string();
        tokio::spawn(async move {
            let values = AsyncValues {
                device_name,
                values: vec![CommandValue::string(resource, response)],
            };
            if async_tx.send(values).await.is_err() {
                tracing::debug!("async outlet closed; dropping write confirmation");
            }
        });

        Ok(())
    }

    /// Registers a device, creating its supervisor if needed.
    pub async fn add_device(
        &self,
        device_name: &str,
        protocols: &ProtocolProperties,
    ) -> DriverResult<()> {
        tracing::debug!("adding device: {}", device_name);
        self.device(device_name, protocols).await.map(|_| ())
    }

    /// Re-resolves the device's address and reconnects if it changed.
    pub async fn update_device(
        &self,
        device_name: &str,
        protocols: &ProtocolProperties,
    ) -> DriverResult<()> {
        tracing::debug!("updating device: {}", device_name);
        let device = self.device(device_name, protocols).await?;
        let addr = parse_addr(protocols).await?;
        match tokio::time::timeout(
            self.config.service.shutdown_grace(),
            device.update_addr(addr),
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(_) => Err(SendError::DeadlineExceeded.into()),
        }
    }

    /// Forgets a device; its supervisor is stopped in the background so the
    /// host callback doesn't wait on socket teardown.
    pub async fn remove_device(&self, device_name: &str) {
        tracing::debug!("removing device: {}", device_name);
        if let Some(device) = self.devices.write().await.remove(device_name) {
            let grace = self.config.service.shutdown_grace();
            tokio::spawn(async move {
                let _ = tokio::time::timeout(grace, device.stop()).await;
            });
        }
    }

    /// Stops every device. Unless `force` is set, total shutdown is bounded
    /// by the grace window.
    pub async fn stop(&self, force: bool) {
        let devices: Vec<_> = self
            .devices
            .write()
            .await
            .drain()
            .map(|(_, device)| device)
            .collect();
        tracing::debug!("stopping {} device(s), force={}", devices.len(), force);

        if force {
            for device in devices {
                tokio::spawn(async move { device.stop().await });
            }
            return;
        }

        let mut stops = JoinSet::new();
        for device in devices {
            stops.spawn(async move { device.stop().await });
        }
        let grace = self.config.service.shutdown_grace();
        let _ = tokio::time::timeout(grace, async {
            while stops.join_next().await.is_some() {}
        })
        .await;
    }

    /// Returns the supervisor for `name`, creating it if needed.
    ///
    /// Creation is single-flight: concurrent calls for the same name all
    /// land on one supervisor and exactly one reconnect loop.
    async fn device(
        &self,
        name: &str,
        protocols: &ProtocolProperties,
    ) -> DriverResult<Arc<ReaderSupervisor>> {
        // fast path under the shared lock
        {
            let devices = self.devices.read().await;
            if let Some(device) = devices.get(name) {
                return Ok(device.clone());
            }
        }

        let addr = parse_addr(protocols).await?;

        let mut devices = self.devices.write().await;
        // recheck: someone else may have created it while we waited
        if let Some(device) = devices.get(name) {
            return Ok(device.clone());
        }

        let (notify_tx, notify_rx) =
            mpsc::channel(self.config.connection().notification_buffer);
        let device = Arc::new(ReaderSupervisor::new(
            name.to_string(),
            addr,
            self.config.connection(),
            notify_tx,
        ));
        tokio::spawn(forward_notifications(
            name.to_string(),
            notify_rx,
            self.async_tx.clone(),
        ));
        devices.insert(name.to_string(), device.clone());
        tracing::info!("created device {} at {}", name, addr);
        Ok(device)
    }
}

/// Turns unsolicited reader messages into async readings for the host.
async fn forward_notifications(
    device_name: String,
    mut notifications: mpsc::Receiver<ReaderNotification>,
    async_tx: mpsc::Sender<AsyncValues>,
) {
    while let Some(notification) = notifications.recv().await {
        let resource = match notification.kind {
            MessageKind::RoAccessReport => RESOURCE_RO_ACCESS_REPORT,
            MessageKind::ReaderEventNotification => RESOURCE_READER_NOTIFICATION,
            // keepalives are answered by the client, not surfaced
            _ => continue,
        };

        let reading = json!({
            "message_id": notification.message_id,
            "data": notification.payload.as_ref(),
        })
        .to_string();

        let values = AsyncValues {
            device_name: device_name.clone(),
            values: vec![CommandValue::string(resource, reading)],
        };
        if async_tx.send(values).await.is_err() {
            return;
        }
    }
}

async fn read_all(
    device: &ReaderSupervisor,
    requests: &[CommandRequest],
) -> DriverResult<Vec<CommandValue>> {
    let mut responses = Vec::with_capacity(requests.len());
    for request in requests {
        let response = match request.resource.as_str() {
            RESOURCE_READER_CONFIG => {
                serde_json::to_string(&device.try_send(&GetReaderConfig::default()).await?)?
            }
            RESOURCE_READER_CAPABILITIES => {
                serde_json::to_string(&device.try_send(&GetReaderCapabilities::default()).await?)?
            }
            RESOURCE_RO_SPEC => serde_json::to_string(&device.try_send(&GetRoSpecs).await?)?,
            RESOURCE_ACCESS_SPEC => {
                serde_json::to_string(&device.try_send(&GetAccessSpecs).await?)?
            }
            other => return Err(DriverError::UnknownResource(other.to_string())),
        };
        responses.push(CommandValue::string(&request.resource, response));
    }
    Ok(responses)
}

/// Executes one write op, returning the confirmed resource name and the
/// JSON-encoded reader response.
async fn write_one(
    device: &ReaderSupervisor,
    requests: &[CommandRequest],
    params: &[CommandValue],
) -> DriverResult<(String, String)> {
    let resource = requests[0].resource.clone();
    let response = match resource.as_str() {
        RESOURCE_READER_CONFIG => {
            let data = str_param("SetReaderConfig", 0, RESOURCE_READER_CONFIG, params)?;
            let request: SetReaderConfig = serde_json::from_str(data)?;
            serde_json::to_string(&device.try_send(&request).await?)?
        }

        RESOURCE_RO_SPEC => {
            // the incoming body is the spec itself, not the AddROSpec wrapper
            let data = str_param("AddROSpec", 0, RESOURCE_RO_SPEC, params)?;
            let ro_spec: RoSpec = serde_json::from_str(data)?;
            serde_json::to_string(&device.try_send(&AddRoSpec { ro_spec }).await?)?
        }

        RESOURCE_RO_SPEC_ID => {
            if params.len() != 2 {
                return Err(DriverError::WrongResourceCount {
                    resource,
                    expected: 2,
                    got: params.len(),
                });
            }
            let action = str_param(RESOURCE_RO_SPEC, 1, RESOURCE_ACTION, params)?.to_string();
            let operation = format!("{}{}", action, RESOURCE_RO_SPEC);
            let ro_spec_id = u32_param(&operation, 0, RESOURCE_RO_SPEC_ID, params)?;

            match action.as_str() {
                ACTION_ENABLE => {
                    serde_json::to_string(&device.try_send(&EnableRoSpec { ro_spec_id }).await?)?
                }
                ACTION_START => {
                    serde_json::to_string(&device.try_send(&StartRoSpec { ro_spec_id }).await?)?
                }
                ACTION_STOP => {
                    serde_json::to_string(&device.try_send(&StopRoSpec { ro_spec_id }).await?)?
                }
                ACTION_DISABLE => {
                    serde_json::to_string(&device.try_send(&DisableRoSpec { ro_spec_id }).await?)?
                }
                ACTION_DELETE => {
                    serde_json::to_string(&device.try_send(&DeleteRoSpec { ro_spec_id }).await?)?
                }
                other => {
                    return Err(DriverError::BadActionName {
                        resource: RESOURCE_RO_SPEC_ID.to_string(),
                        action: other.to_string(),
                    })
                }
            }
        }

        RESOURCE_ACCESS_SPEC_ID => {
            if requests.len() != 2 {
                return Err(DriverError::WrongResourceCount {
                    resource,
                    expected: 2,
                    got: requests.len(),
                });
            }
            // the action arrives as the second resource name
            let action = requests[1].resource.clone();
            let operation = format!("{}{}", action, RESOURCE_ACCESS_SPEC_ID);
            let access_spec_id = u32_param(&operation, 0, RESOURCE_ACCESS_SPEC_ID, params)?;

            match action.as_str() {
                ACTION_ENABLE => serde_json::to_string(
                    &device.try_send(&EnableAccessSpec { access_spec_id }).await?,
                )?,
                ACTION_DISABLE => serde_json::to_string(
                    &device
                        .try_send(&DisableAccessSpec { access_spec_id })
                        .await?,
                )?,
                ACTION_DELETE => serde_json::to_string(
                    &device.try_send(&DeleteAccessSpec { access_spec_id }).await?,
                )?,
                other => {
                    return Err(DriverError::BadActionName {
                        resource: RESOURCE_ACCESS_SPEC_ID.to_string(),
                        action: other.to_string(),
                    })
                }
            }
        }

        other => return Err(DriverError::UnknownResource(other.to_string())),
    };

    Ok((resource, response))
}

fn get_param<'a>(
    operation: &str,
    index: usize,
    name: &str,
    params: &'a [CommandValue],
) -> DriverResult<&'a CommandValue> {
    if index >= params.len() {
        return Err(DriverError::MissingParameter {
            operation: operation.to_string(),
            needed: index + 1,
            got: params.len(),
        });
    }

    let value = &params[index];
    if value.resource != name {
        return Err(DriverError::WrongParameterName {
            operation: operation.to_string(),
            index,
            expected: name.to_string(),
            got: value.resource.clone(),
        });
    }

    Ok(value)
}

fn str_param<'a>(
    operation: &str,
    index: usize,
    name: &str,
    params: &'a [CommandValue],
) -> DriverResult<&'a str> {
    get_param(operation, index, name, params)?
        .as_str()
        .ok_or_else(|| DriverError::WrongParameterType {
            operation: operation.to_string(),
            name: name.to_string(),
        })
}

fn u32_param(
    operation: &str,
    index: usize,
    name: &str,
    params: &[CommandValue],
) -> DriverResult<u32> {
    get_param(operation, index, name, params)?
        .as_u32()
        .ok_or_else(|| DriverError::WrongParameterType {
            operation: operation.to_string(),
            name: name.to_string(),
        })
}

/// Extracts a TCP address from a device's protocol properties.
///
/// Expects `{"tcp": {"host": "<host>", "port": "<port>"}}`.
async fn parse_addr(protocols: &ProtocolProperties) -> DriverResult<SocketAddr> {
    let tcp = protocols.get("tcp").ok_or(DriverError::MissingProtocol)?;
    let host = tcp.get("host").cloned().unwrap_or_default();
    let port = tcp.get("port").cloned().unwrap_or_default();
    if host.is_empty() || port.is_empty() {
        return Err(DriverError::MissingHostPort { host, port });
    }

    let port_num: u16 = port.parse().map_err(|e| DriverError::AddrInvalid {
        host: host.clone(),
        port: port.clone(),
        reason: format!("{}", e),
    })?;

    resolve_addr(&host, port_num)
        .await
        .map_err(|e| DriverError::AddrInvalid {
            host,
            port,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;

    use crate::config::{DiscoverySettings, NetworkSettings, ServiceSettings};
    use crate::network::testutil::{read_frame, serve_handshake, serve_requests, write_frame};
    use crate::network::testutil::ok_status;
    use crate::protocol::MessageKind;

    fn test_service_config() -> ServiceConfig {
        ServiceConfig {
            service: ServiceSettings {
                request_timeout_ms: 5_000,
                shutdown_grace_ms: 500,
            },
            network: NetworkSettings {
                connect_timeout_ms: 500,
                close_timeout_ms: 50,
                backoff_ms: vec![10],
                notification_buffer: 16,
            },
            discovery: DiscoverySettings {
                enabled: false,
                ..Default::default()
            },
        }
    }

    fn tcp_protocols(addr: SocketAddr) -> ProtocolProperties {
        let mut tcp = HashMap::new();
        tcp.insert("host".to_string(), addr.ip().to_string());
        tcp.insert("port".to_string(), addr.port().to_string());
        let mut protocols = ProtocolProperties::new();
        protocols.insert("tcp".to_string(), tcp);
        protocols
    }

    fn test_driver() -> (
        Arc<Driver>,
        mpsc::Receiver<AsyncValues>,
        mpsc::Receiver<Vec<DiscoveredDevice>>,
    ) {
        let (async_tx, async_rx) = mpsc::channel(16);
        let (discovery_tx, discovery_rx) = mpsc::channel(4);
        let driver = Driver::initialize(test_service_config(), async_tx, discovery_tx);
        (driver, async_rx, discovery_rx)
    }

    /// Accepts connections forever, counting requests across all of them.
    fn spawn_harness(listener: TcpListener, requests: Arc<AtomicUsize>, accepts: Arc<AtomicUsize>) {
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                accepts.fetch_add(1, Ordering::SeqCst);
                let requests = requests.clone();
                tokio::spawn(async move {
                    serve_handshake(&mut stream).await;
                    serve_requests(&mut stream, &requests).await;
                });
            }
        });
    }

    async fn harness() -> (SocketAddr, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let accepts = Arc::new(AtomicUsize::new(0));
        spawn_harness(listener, requests.clone(), accepts.clone());
        (addr, requests, accepts)
    }

    #[tokio::test]
    async fn read_returns_one_json_value_per_request() {
        let (addr, _requests, _accepts) = harness().await;
        let (driver, _async_rx, _discovery_rx) = test_driver();

        let requests = [
            CommandRequest::new(RESOURCE_READER_CONFIG),
            CommandRequest::new(RESOURCE_RO_SPEC),
        ];
        let values = driver
            .handle_read("reader-1", &tcp_protocols(addr), &requests)
            .await
            .unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values[0].resource, RESOURCE_READER_CONFIG);
        let parsed: serde_json::Value =
            serde_json::from_str(values[0].as_str().unwrap()).unwrap();
        assert_eq!(parsed["status"]["code"], 0);

        driver.stop(false).await;
    }

    #[tokio::test]
    async fn read_rejects_empty_and_unknown_requests() {
        let (addr, _requests, _accepts) = harness().await;
        let (driver, _async_rx, _discovery_rx) = test_driver();
        let protocols = tcp_protocols(addr);

        let result = driver.handle_read("reader-1", &protocols, &[]).await;
        assert!(matches!(result, Err(DriverError::MissingRequests)));

        let requests = [CommandRequest::new("TagInventory")];
        let result = driver.handle_read("reader-1", &protocols, &requests).await;
        assert!(matches!(result, Err(DriverError::UnknownResource(_))));

        driver.stop(false).await;
    }

    #[tokio::test]
    async fn write_ro_spec_id_action_sends_the_matching_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (driver, mut async_rx, _discovery_rx) = test_driver();

        let seen = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            serve_handshake(&mut stream).await;
            let (header, payload) = read_frame(&mut stream).await;
            write_frame(
                &mut stream,
                header.kind().unwrap().response_kind().unwrap(),
                header.message_id,
                &ok_status(),
            )
            .await;
            // keep the connection alive until the driver is done
            let requests = AtomicUsize::new(0);
            serve_requests(&mut stream, &requests).await;
            (header, payload)
        });

        let requests = [CommandRequest::new(RESOURCE_RO_SPEC_ID)];
        let params = [
            CommandValue::uint32(RESOURCE_RO_SPEC_ID, 42),
            CommandValue::string(RESOURCE_ACTION, ACTION_ENABLE),
        ];
        driver
            .handle_write("reader-1", &tcp_protocols(addr), &requests, &params)
            .await
            .unwrap();

        // the confirmation shows up on the async channel
        let confirmation = async_rx.recv().await.unwrap();
        assert_eq!(confirmation.device_name, "reader-1");
        assert_eq!(confirmation.values[0].resource, RESOURCE_RO_SPEC_ID);

        driver.stop(false).await;
        let (header, payload) = seen.await.unwrap();
        assert_eq!(header.kind(), Some(MessageKind::EnableRoSpec));
        assert_eq!(payload, vec![0, 0, 0, 42]);
    }

    #[tokio::test]
    async fn write_rejects_bad_action_names() {
        let (addr, requests_seen, _accepts) = harness().await;
        let (driver, _async_rx, _discovery_rx) = test_driver();

        let requests = [CommandRequest::new(RESOURCE_RO_SPEC_ID)];
        let params = [
            CommandValue::uint32(RESOURCE_RO_SPEC_ID, 42),
            CommandValue::string(RESOURCE_ACTION, "Restart"),
        ];
        let result = driver
            .handle_write("reader-1", &tcp_protocols(addr), &requests, &params)
            .await;

        match result {
            Err(DriverError::BadActionName { action, .. }) => assert_eq!(action, "Restart"),
            other => panic!("expected a bad action error, got {:?}", other),
        }
        assert_eq!(requests_seen.load(Ordering::SeqCst), 0);

        driver.stop(false).await;
    }

    #[tokio::test]
    async fn write_parameter_checks() {
        let (addr, _requests, _accepts) = harness().await;
        let (driver, _async_rx, _discovery_rx) = test_driver();
        let protocols = tcp_protocols(addr);
        let requests = [CommandRequest::new(RESOURCE_RO_SPEC_ID)];

        // too few parameters
        let params = [CommandValue::uint32(RESOURCE_RO_SPEC_ID, 42)];
        let result = driver
            .handle_write("reader-1", &protocols, &requests, &params)
            .await;
        assert!(matches!(
            result,
            Err(DriverError::WrongResourceCount { expected: 2, got: 1, .. })
        ));

        // wrong parameter name
        let params = [
            CommandValue::uint32("SpecID", 42),
            CommandValue::string(RESOURCE_ACTION, ACTION_ENABLE),
        ];
        let result = driver
            .handle_write("reader-1", &protocols, &requests, &params)
            .await;
        assert!(matches!(result, Err(DriverError::WrongParameterName { .. })));

        // wrong parameter type
        let params = [
            CommandValue::string(RESOURCE_RO_SPEC_ID, "42"),
            CommandValue::string(RESOURCE_ACTION, ACTION_ENABLE),
        ];
        let result = driver
            .handle_write("reader-1", &protocols, &requests, &params)
            .await;
        assert!(matches!(result, Err(DriverError::WrongParameterType { .. })));

        driver.stop(false).await;
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_supervisor() {
        let (addr, _requests, accepts) = harness().await;
        let (driver, _async_rx, _discovery_rx) = test_driver();
        let protocols = tcp_protocols(addr);

        let mut tasks = Vec::new();
        for _ in 0..100 {
            let driver = driver.clone();
            let protocols = protocols.clone();
            tasks.push(tokio::spawn(async move {
                driver.add_device("reader-1", &protocols).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(driver.devices.read().await.len(), 1);
        // give the lone reconnect loop time to dial
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(accepts.load(Ordering::SeqCst), 1);

        driver.stop(false).await;
    }

    #[tokio::test]
    async fn update_device_redials_the_new_address() {
        let (addr_a, requests_a, _accepts_a) = harness().await;
        let (addr_b, requests_b, _accepts_b) = harness().await;
        let (driver, _async_rx, _discovery_rx) = test_driver();

        let reads = [CommandRequest::new(RESOURCE_RO_SPEC)];
        driver
            .handle_read("reader-1", &tcp_protocols(addr_a), &reads)
            .await
            .unwrap();
        assert_eq!(requests_a.load(Ordering::SeqCst), 1);

        driver
            .update_device("reader-1", &tcp_protocols(addr_b))
            .await
            .unwrap();
        driver
            .handle_read("reader-1", &tcp_protocols(addr_b), &reads)
            .await
            .unwrap();
        assert_eq!(requests_a.load(Ordering::SeqCst), 1);
        assert_eq!(requests_b.load(Ordering::SeqCst), 1);

        driver.stop(false).await;
    }

    #[tokio::test]
    async fn notifications_are_forwarded_as_async_values() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (driver, mut async_rx, _discovery_rx) = test_driver();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            serve_handshake(&mut stream).await;
            write_frame(&mut stream, MessageKind::RoAccessReport, 0xF00, &[1, 2, 3]).await;
            let requests = AtomicUsize::new(0);
            serve_requests(&mut stream, &requests).await;
        });

        driver
            .add_device("reader-1", &tcp_protocols(addr))
            .await
            .unwrap();

        let values = async_rx.recv().await.unwrap();
        assert_eq!(values.device_name, "reader-1");
        assert_eq!(values.values[0].resource, RESOURCE_RO_ACCESS_REPORT);
        let reading: serde_json::Value =
            serde_json::from_str(values.values[0].as_str().unwrap()).unwrap();
        assert_eq!(reading["data"], serde_json::json!([1, 2, 3]));

        driver.stop(false).await;
    }

    #[tokio::test]
    async fn stop_clears_the_registry() {
        let (addr, _requests, _accepts) = harness().await;
        let (driver, _async_rx, _discovery_rx) = test_driver();

        driver
            .add_device("reader-1", &tcp_protocols(addr))
            .await
            .unwrap();
        driver
            .add_device("reader-2", &tcp_protocols(addr))
            .await
            .unwrap();
        assert_eq!(driver.devices.read().await.len(), 2);

        driver.stop(false).await;
        assert!(driver.devices.read().await.is_empty());
    }

    #[test]
    fn parameter_index_bound_is_checked() {
        let params = [CommandValue::uint32(RESOURCE_RO_SPEC_ID, 1)];

        assert!(get_param("EnableROSpec", 0, RESOURCE_RO_SPEC_ID, &params).is_ok());
        // index == len is out of bounds, not a valid access
        let result = get_param("EnableROSpec", 1, RESOURCE_ACTION, &params);
        assert!(matches!(
            result,
            Err(DriverError::MissingParameter {
                needed: 2,
                got: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn protocol_properties_validation() {
        assert!(matches!(
            parse_addr(&ProtocolProperties::new()).await,
            Err(DriverError::MissingProtocol)
        ));

        let mut protocols = ProtocolProperties::new();
        protocols.insert("tcp".to_string(), HashMap::new());
        assert!(matches!(
            parse_addr(&protocols).await,
            Err(DriverError::MissingHostPort { .. })
        ));

        let mut tcp = HashMap::new();
        tcp.insert("host".to_string(), "127.0.0.1".to_string());
        tcp.insert("port".to_string(), "llrp".to_string());
        protocols.insert("tcp".to_string(), tcp);
        assert!(matches!(
            parse_addr(&protocols).await,
            Err(DriverError::AddrInvalid { .. })
        ));
    }
}
