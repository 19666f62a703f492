use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::loader::BatchFn;
use crate::actor_framework::Page;
use crate::clients::{AccountClient, CatalogClient, OrderClient};
use crate::domain::{Account, Order, OrderFilter, Product};
use crate::error::ServiceError;

#[async_trait]
impl BatchFn<String, Account> for AccountClient {
    fn kind(&self) -> &'static str {
        "account"
    }

    async fn load(&self, keys: &[String]) -> Result<HashMap<String, Account>, ServiceError> {
        Ok(self.get_accounts(keys.to_vec()).await?.found)
    }
}

#[async_trait]
impl BatchFn<String, Product> for CatalogClient {
    fn kind(&self) -> &'static str {
        "product"
    }

    async fn load(&self, keys: &[String]) -> Result<HashMap<String, Product>, ServiceError> {
        Ok(self.get_products(keys.to_vec()).await?.found)
    }
}

/// Orders grouped by owning account. An account without orders maps to an
/// empty list rather than `NotFound`.
#[derive(Clone)]
pub struct OrdersByAccount(pub OrderClient);

#[async_trait]
impl BatchFn<String, Vec<Order>> for OrdersByAccount {
    fn kind(&self) -> &'static str {
        "order"
    }

    async fn load(&self, keys: &[String]) -> Result<HashMap<String, Vec<Order>>, ServiceError> {
        let filter = OrderFilter {
            account_ids: Some(keys.to_vec()),
        };
        let orders = self.0.list_orders(filter, Page::all()).await?;

        let mut grouped: HashMap<String, Vec<Order>> =
            keys.iter().map(|key| (key.clone(), Vec::new())).collect();
        for order in orders {
            if let Some(bucket) = grouped.get_mut(&order.account_id) {
                bucket.push(order);
            }
        }
        Ok(grouped)
    }
}

/// Shared, immutable batch sources. Each pass builds fresh loaders over them.
#[derive(Clone)]
pub struct BatchSources {
    pub accounts: Arc<dyn BatchFn<String, Account>>,
    pub products: Arc<dyn BatchFn<String, Product>>,
    pub orders_by_account: Arc<dyn BatchFn<String, Vec<Order>>>,
}

impl BatchSources {
    pub fn new(accounts: AccountClient, catalog: CatalogClient, orders: OrderClient) -> Self {
        Self {
            accounts: Arc::new(accounts),
            products: Arc::new(catalog),
            orders_by_account: Arc::new(OrdersByAccount(orders)),
        }
    }
}
