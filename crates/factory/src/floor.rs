//! Run modes
//!
//! Puts the services for `server`, `controller` and `standalone` onto a
//! [`ServiceManager`]. The caller owns the manager and shuts it down.

use std::net::SocketAddr;
use std::sync::Arc;

use factory_runtime::ServiceManager;

use crate::Result;
use crate::config::FactoryConfig;
use crate::controller::ControllerService;
use crate::protocol::{Transport, UdpTransport};
use crate::simulator::{DeviceServer, LocalTransport, PhysicsService, ResourceRegistry};
use crate::topology::build_topology;

/// Device server plus physics engine
///
/// Returns the registry and the address actually bound (`server.bind` may use port 0).
pub async fn start_server(
    manager: &ServiceManager,
    config: &FactoryConfig,
) -> Result<(Arc<ResourceRegistry>, SocketAddr)> {
    let registry = Arc::new(ResourceRegistry::from_islands(&config.islands));

    let server = DeviceServer::bind(Arc::clone(&registry), config.server.bind).await?;
    let addr = server.local_addr()?;
    manager.spawn(server).await?;
    manager
        .spawn(PhysicsService::new(Arc::clone(&registry), config.server.physics_interval()))
        .await?;

    Ok((registry, addr))
}

/// Controller talking UDP to `controller.target`
pub async fn start_controller(manager: &ServiceManager, config: &FactoryConfig) -> Result<()> {
    let transport: Arc<dyn Transport> =
        Arc::new(UdpTransport::ephemeral(config.controller.request_timeout()).await?);

    manager
        .spawn(ControllerService::new(
            transport,
            config.controller.target.clone(),
            build_topology(&config.islands),
            &config.controller,
        ))
        .await?;
    Ok(())
}

/// Physics engine and controller sharing one registry, no sockets
pub async fn start_standalone(
    manager: &ServiceManager,
    config: &FactoryConfig,
) -> Result<Arc<ResourceRegistry>> {
    let registry = Arc::new(ResourceRegistry::from_islands(&config.islands));
    let local = LocalTransport::new(Arc::clone(&registry));
    let base = local.base_address();

    manager
        .spawn(PhysicsService::new(Arc::clone(&registry), config.server.physics_interval()))
        .await?;
    manager
        .spawn(ControllerService::new(
            Arc::new(local),
            base,
            build_topology(&config.islands),
            &config.controller,
        ))
        .await?;

    Ok(registry)
}
