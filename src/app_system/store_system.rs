use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use crate::actor_framework::{ResourceActor, ResourceClient};
use crate::clients::{AccountClient, CatalogClient, OrderClient};
use crate::config::GatewayConfig;
use crate::domain::{Account, Order, Product};
use crate::error::SystemError;
use crate::gateway::Gateway;
use crate::orchestrator::OrderOrchestrator;

/// Sequential ids of the form `<prefix>_<n>`, starting at 1.
fn counter_ids(prefix: &'static str) -> impl Fn() -> String + Send + Sync + 'static {
    let counter = Arc::new(AtomicU64::new(1));
    move || format!("{prefix}_{}", counter.fetch_add(1, Ordering::SeqCst))
}

/// The three backend services plus the gateway in front of them.
///
/// Starts one `ResourceActor` per service, wraps each in a policy-enforcing
/// client and builds the gateway over those clients.
pub struct StoreSystem {
    pub account_client: AccountClient,
    pub catalog_client: CatalogClient,
    pub order_client: OrderClient,
    pub gateway: Gateway,
    #[cfg(test)]
    pub(crate) raw: RawClients,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

/// Direct handles on the services, bypassing call policies. Tests read
/// per-service request counters through these.
#[cfg(test)]
pub(crate) struct RawClients {
    pub accounts: ResourceClient<Account>,
    pub products: ResourceClient<Product>,
    pub orders: ResourceClient<Order>,
}

impl StoreSystem {
    /// Starts every service. Must be called inside a Tokio runtime.
    pub fn new(config: &GatewayConfig) -> Self {
        let (account_actor, accounts) =
            ResourceActor::<Account>::new(config.service_buffer_size, counter_ids("account"));
        let (product_actor, products) =
            ResourceActor::<Product>::new(config.service_buffer_size, counter_ids("product"));
        let (order_actor, orders) =
            ResourceActor::<Order>::new(config.service_buffer_size, counter_ids("order"));

        let handles = vec![
            tokio::spawn(account_actor.run()),
            tokio::spawn(product_actor.run()),
            tokio::spawn(order_actor.run()),
        ];

        Self::wire(config, accounts, products, orders, handles)
    }

    pub fn from_env() -> Result<Self, SystemError> {
        let config = GatewayConfig::from_env()?;
        Ok(Self::new(&config))
    }

    fn wire(
        config: &GatewayConfig,
        accounts: ResourceClient<Account>,
        products: ResourceClient<Product>,
        orders: ResourceClient<Order>,
        handles: Vec<tokio::task::JoinHandle<()>>,
    ) -> Self {
        #[cfg(test)]
        let raw = RawClients {
            accounts: accounts.clone(),
            products: products.clone(),
            orders: orders.clone(),
        };

        let account_client = AccountClient::new(accounts, config.account);
        let catalog_client = CatalogClient::new(products, config.catalog);
        let order_client = OrderClient::new(orders, config.order);
        let gateway = Gateway::new(
            account_client.clone(),
            catalog_client.clone(),
            order_client.clone(),
            config,
        );

        info!(services = handles.len(), "Store system started");
        Self {
            account_client,
            catalog_client,
            order_client,
            gateway,
            #[cfg(test)]
            raw,
            handles,
        }
    }

    pub fn orchestrator(&self) -> &OrderOrchestrator {
        self.gateway.orchestrator()
    }

    /// Closes every service channel and waits for the services to drain.
    /// Clones of the clients or gateway held elsewhere keep their service alive.
    pub async fn shutdown(mut self) -> Result<(), SystemError> {
        info!("Shutting down system...");

        // Dropping the clients closes the service channels.
        let handles = std::mem::take(&mut self.handles);
        drop(self);

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Service task failed");
                return Err(SystemError::TaskFailed(e));
            }
        }

        info!("System shutdown complete.");
        Ok(())
    }
}
