//! Component wiring
//!
//! Builds every component around one shared transport and tears them down in
//! reverse order.

use std::sync::Arc;

use relay_core::Result;
use relay_distribution::{DistributionServer, SubscriberHub};
use relay_order_gateway::OrderGateway;
use relay_subscription::SubscriptionBridge;
use relay_transport::TransportClient;
use tokio::net::TcpListener;

use crate::config::RelayConfig;

pub struct Relay {
    transport: Arc<TransportClient>,
    gateway: Arc<OrderGateway>,
    bridge: Arc<SubscriptionBridge>,
    server: Arc<DistributionServer>,
}

impl Relay {
    /// Connect and authenticate upstream, then assemble the rest
    pub async fn start(config: &RelayConfig, credential: &str) -> Result<Self> {
        let transport_config = config.transport_config();
        let transport = Arc::new(TransportClient::new());
        transport
            .connect_and_authenticate(
                &transport_config.url,
                credential,
                transport_config.connect_timeout,
            )
            .await?;
        Ok(Self::assemble(transport, config))
    }

    /// Wire components around an already connected transport
    ///
    /// The hub is the bridge's fan-out sink and the bridge is the server's
    /// upstream. The bridge observes the transport on its own, so it is not
    /// attached to the gateway as a notification sink.
    pub fn assemble(transport: Arc<TransportClient>, config: &RelayConfig) -> Self {
        let hub = Arc::new(SubscriberHub::new());

        let bridge = Arc::new(
            SubscriptionBridge::new(transport.clone(), hub.clone())
                .with_timeout(config.transport_config().request_timeout),
        );
        bridge.start();

        let gateway = Arc::new(OrderGateway::new(transport.clone(), config.gateway_config()));
        gateway.start();

        let server = Arc::new(DistributionServer::new(
            config.server.clone(),
            hub,
            bridge.clone(),
        ));

        Self {
            transport,
            gateway,
            bridge,
            server,
        }
    }

    pub fn transport(&self) -> &Arc<TransportClient> {
        &self.transport
    }

    pub fn gateway(&self) -> &Arc<OrderGateway> {
        &self.gateway
    }

    pub fn bridge(&self) -> &Arc<SubscriptionBridge> {
        &self.bridge
    }

    pub fn server(&self) -> &Arc<DistributionServer> {
        &self.server
    }

    /// Serve downstream clients on a background task
    pub fn spawn_server(&self, listener: TcpListener) -> tokio::task::JoinHandle<()> {
        let server = self.server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                tracing::error!(error = %e, "Distribution server failed");
            }
        })
    }

    /// Server first, then upstream subscriptions, then the connection
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down relay");
        self.server.shutdown();
        self.bridge.stop().await;
        self.transport.close();
        tracing::info!("Relay stopped");
    }
}
