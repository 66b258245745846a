//! UDP device server
//!
//! Answers protocol datagrams from a shared [`ResourceRegistry`]. The socket is
//! bound up front so bind errors surface at startup; the receive loop runs from
//! `on_start` until `on_stop`.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use factory_runtime::{Service, ServiceContext, ServiceResult, ServiceSpec};

use super::ResourceRegistry;
use crate::protocol::ResponseCode;
use crate::protocol::wire::{self, MAX_DATAGRAM, WireResponse};

pub const SERVER_SERVICE_ID: &str = "simulator/server";

pub struct DeviceServer {
    registry: Arc<ResourceRegistry>,
    socket: Arc<UdpSocket>,
    task: Option<JoinHandle<()>>,
}

impl DeviceServer {
    /// Binds immediately; `on_start` only starts serving
    pub async fn bind(registry: Arc<ResourceRegistry>, addr: SocketAddr) -> crate::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            registry,
            socket: Arc::new(socket),
            task: None,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl Service for DeviceServer {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec::new(SERVER_SERVICE_ID, "Device Server")
            .with_description("Serves simulated resources over UDP")
    }

    async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        let local = self
            .socket
            .local_addr()
            .map_err(|e| factory_runtime::ServiceError::InitializationFailed(e.to_string()))?;
        info!(%local, resources = self.registry.len(), "Device server listening");

        self.task = Some(tokio::spawn(serve(
            Arc::clone(&self.socket),
            Arc::clone(&self.registry),
        )));
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        info!("Device server stopped");
        Ok(())
    }
}

async fn serve(socket: Arc<UdpSocket>, registry: Arc<ResourceRegistry>) {
    let mut buffer = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                trace!(error = %e, "UDP receive error");
                continue;
            }
        };
        let datagram = &buffer[..len];

        let reply = match wire::decode_request(datagram) {
            Ok(request) => {
                let response =
                    registry.handle(request.method, &request.path, request.payload.as_ref());
                debug!(
                    %from,
                    method = %request.method,
                    path = %request.path,
                    code = %response.code,
                    "Request handled"
                );
                WireResponse {
                    id: request.id,
                    code: response.code,
                    payload: response.payload,
                }
            }
            Err(e) => match wire::salvage_id(datagram) {
                Some(id) => {
                    warn!(%from, id, error = %e, "Malformed request");
                    WireResponse {
                        id,
                        code: ResponseCode::BadRequest,
                        payload: None,
                    }
                }
                None => {
                    warn!(%from, error = %e, "Dropping undecodable datagram");
                    continue;
                }
            },
        };

        match wire::encode(&reply) {
            Ok(bytes) => {
                if let Err(e) = socket.send_to(&bytes, from).await {
                    warn!(%from, error = %e, "Failed to send response");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode response"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::IslandConfig;
    use crate::protocol::{
        Address, ProtocolError, SwitchState, Transport, UdpTransport, WELL_KNOWN_CORE,
        extract_reading, link_format,
    };
    use factory_runtime::ServiceManager;

    async fn start() -> (ServiceManager, Arc<ResourceRegistry>, SocketAddr) {
        let registry = Arc::new(ResourceRegistry::from_islands(&[
            IslandConfig::new("tornitura", "isola-1").with_counts(1, 0, 0),
        ]));
        let server = DeviceServer::bind(Arc::clone(&registry), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let manager = ServiceManager::new();
        manager.spawn(server).await.unwrap();
        (manager, registry, addr)
    }

    #[tokio::test]
    async fn test_serves_registry_over_udp() {
        let (manager, registry, addr) = start().await;
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(2))
            .await
            .unwrap();
        let base = Address::udp(addr);

        let directory = transport.get(&base.join(WELL_KNOWN_CORE)).await.unwrap();
        let links = link_format::parse(directory.payload.unwrap().as_str().unwrap()).unwrap();
        assert_eq!(links.len(), 2);

        let bin = transport.get(&base.join("/tornitura/isola-1/waste/bin-1")).await.unwrap();
        assert_eq!(extract_reading(&bin.payload.unwrap()).unwrap(), 20.0);

        let compactor = base.join("/tornitura/isola-1/waste/compactor-1");
        transport.put_status(&compactor, SwitchState::On).await.unwrap();
        assert_eq!(
            registry.actuator_state("/tornitura/isola-1/waste/compactor-1"),
            Some(SwitchState::On)
        );

        let err = transport.post(&compactor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Status { code: ResponseCode::MethodNotAllowed, .. }));

        manager.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_request_gets_bad_request() {
        let (manager, _, addr) = start().await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client
            .send_to(br#"{"id": 41, "method": "DELETE", "path": "/x"}"#, addr)
            .await
            .unwrap();
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();

        let reply = wire::decode_response(&buffer[..len]).unwrap();
        assert_eq!(reply.id, 41);
        assert_eq!(reply.code, ResponseCode::BadRequest);

        manager.shutdown_all().await.unwrap();
    }
}
