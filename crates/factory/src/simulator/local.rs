//! In-process transport

use std::sync::Arc;

use async_trait::async_trait;

use super::ResourceRegistry;
use crate::protocol::{Address, ProtocolError, ProtocolResult, Request, Response, Scheme, Transport};

/// Authority used for `local://` addresses
pub const LOCAL_AUTHORITY: &str = "simulator";

/// Dispatches requests straight into a [`ResourceRegistry`]
#[derive(Clone)]
pub struct LocalTransport {
    registry: Arc<ResourceRegistry>,
}

impl LocalTransport {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }

    /// Base address to discover against
    pub fn base_address(&self) -> Address {
        Address::local(LOCAL_AUTHORITY)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn request(&self, request: Request) -> ProtocolResult<Response> {
        if request.address.scheme() != Scheme::Local {
            return Err(ProtocolError::InvalidAddress(request.address.to_string()));
        }
        Ok(self
            .registry
            .handle(request.method, request.address.path(), request.payload.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IslandConfig;
    use crate::protocol::{ResponseCode, SwitchState, extract_reading};

    fn transport() -> (LocalTransport, Arc<ResourceRegistry>) {
        let registry = Arc::new(ResourceRegistry::from_islands(&[
            IslandConfig::new("tornitura", "isola-1").with_counts(0, 1, 0),
        ]));
        (LocalTransport::new(Arc::clone(&registry)), registry)
    }

    #[tokio::test]
    async fn test_requests_reach_registry() {
        let (transport, registry) = transport();
        let base = transport.base_address();
        let pump = base.join("/tornitura/isola-1/coolant/pump-1");
        let tank = base.join("/tornitura/isola-1/coolant/turbidity-1");

        transport.put_status(&pump, SwitchState::On).await.unwrap();
        assert_eq!(
            registry.actuator_state("/tornitura/isola-1/coolant/pump-1"),
            Some(SwitchState::On)
        );

        let response = transport.get(&tank).await.unwrap();
        assert_eq!(extract_reading(&response.payload.unwrap()).unwrap(), 5.0);
    }

    #[tokio::test]
    async fn test_error_codes_and_schemes() {
        let (transport, _) = transport();
        let missing = transport.base_address().join("/tornitura/isola-1/coolant/pump-7");
        let err = transport.get(&missing).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Status { code: ResponseCode::NotFound, .. }));

        let udp = Address::parse("udp://127.0.0.1:5683/tornitura/isola-1/coolant/pump-1").unwrap();
        assert!(matches!(transport.get(&udp).await, Err(ProtocolError::InvalidAddress(_))));
    }
}
