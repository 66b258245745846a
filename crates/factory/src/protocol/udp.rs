//! UDP client transport
//!
//! One socket is shared by every caller. Requests get a message id, a pending
//! entry is registered, and a background receiver task completes the entry when
//! the matching response arrives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::wire::{self, MAX_DATAGRAM, WireRequest, WireResponse};
use super::{Address, ProtocolError, ProtocolResult, Request, Response, Scheme, Transport};

type PendingTable = DashMap<u32, oneshot::Sender<WireResponse>>;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    pending: Arc<PendingTable>,
    next_id: AtomicU32,
    request_timeout: Duration,
    receiver: JoinHandle<()>,
}

impl UdpTransport {
    /// Bind the client socket and start the response receiver
    pub async fn bind(local: SocketAddr, request_timeout: Duration) -> ProtocolResult<Self> {
        let socket = Arc::new(UdpSocket::bind(local).await?);
        debug!(local = %socket.local_addr()?, "UDP transport bound");

        let pending = Arc::new(PendingTable::new());
        let receiver = tokio::spawn(receive_loop(Arc::clone(&socket), Arc::clone(&pending)));

        Ok(Self {
            socket,
            pending,
            next_id: AtomicU32::new(1),
            request_timeout,
            receiver,
        })
    }

    /// Bind an ephemeral port on all interfaces
    pub async fn ephemeral(request_timeout: Duration) -> ProtocolResult<Self> {
        Self::bind(SocketAddr::from(([0, 0, 0, 0], 0)), request_timeout).await
    }

    pub fn local_addr(&self) -> ProtocolResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    async fn resolve(address: &Address) -> ProtocolResult<SocketAddr> {
        if address.scheme() != Scheme::Udp {
            return Err(ProtocolError::InvalidAddress(address.to_string()));
        }
        tokio::net::lookup_host(address.authority())
            .await?
            .next()
            .ok_or_else(|| ProtocolError::InvalidAddress(address.to_string()))
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn request(&self, request: Request) -> ProtocolResult<Response> {
        let target = Self::resolve(&request.address).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let datagram = wire::encode(&WireRequest {
            id,
            method: request.method,
            path: request.address.path().to_string(),
            payload: request.payload,
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if let Err(e) = self.socket.send_to(&datagram, target).await {
            self.pending.remove(&id);
            return Err(e.into());
        }
        trace!(id, method = %request.method, address = %request.address, "Request sent");

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(Response {
                code: response.code,
                payload: response.payload,
            }),
            Ok(Err(_)) => Err(ProtocolError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                Err(ProtocolError::Timeout(request.address.to_string()))
            }
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, pending: Arc<PendingTable>) {
    let mut buffer = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                // ICMP port-unreachable surfaces here on some platforms
                trace!(error = %e, "UDP receive error");
                continue;
            }
        };

        match wire::decode_response(&buffer[..len]) {
            Ok(response) => match pending.remove(&response.id) {
                Some((_, tx)) => {
                    let _ = tx.send(response);
                }
                None => debug!(id = response.id, %from, "Late or unknown response dropped"),
            },
            Err(e) => warn!(%from, error = %e, "Undecodable response datagram"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Method, ResponseCode};
    use serde_json::json;

    /// Answers every request once with a fixed code, echoing the path
    async fn echo_server(code: ResponseCode) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM];
            loop {
                let (len, from) = socket.recv_from(&mut buffer).await.unwrap();
                let request = wire::decode_request(&buffer[..len]).unwrap();
                let reply = WireResponse {
                    id: request.id,
                    code,
                    payload: Some(json!({"path": request.path, "method": request.method})),
                };
                socket.send_to(&wire::encode(&reply).unwrap(), from).await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_round_trip_over_loopback() {
        let server = echo_server(ResponseCode::Content).await;
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(2))
            .await
            .unwrap();

        let address =
            Address::parse(&format!("udp://{server}/tornitura/isola-1/waste/bin-1")).unwrap();
        let response = transport.get(&address).await.unwrap();

        assert_eq!(response.code, ResponseCode::Content);
        assert_eq!(
            response.payload,
            Some(json!({"path": "/tornitura/isola-1/waste/bin-1", "method": Method::Get}))
        );
        assert!(transport.pending.is_empty());
    }

    #[tokio::test]
    async fn test_error_code_surfaces_as_status() {
        let server = echo_server(ResponseCode::MethodNotAllowed).await;
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(2))
            .await
            .unwrap();

        let address =
            Address::parse(&format!("udp://{server}/tornitura/isola-1/waste/bin-1")).unwrap();
        let err = transport.post(&address).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Status { code: ResponseCode::MethodNotAllowed, .. }
        ));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        // bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport =
            UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Duration::from_millis(100))
                .await
                .unwrap();

        let silent_addr = silent.local_addr().unwrap();
        let address = Address::parse(&format!("udp://{silent_addr}/x-1")).unwrap();
        let err = transport.get(&address).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Timeout(_)));
        assert!(transport.pending.is_empty());
    }

    #[tokio::test]
    async fn test_local_scheme_rejected() {
        let transport = UdpTransport::ephemeral(Duration::from_millis(100)).await.unwrap();
        let address = Address::parse("local://simulator/x").unwrap();
        assert!(matches!(
            transport.get(&address).await,
            Err(ProtocolError::InvalidAddress(_))
        ));
    }
}
