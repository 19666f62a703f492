//! Order creation across the account, catalog and order services.
//!
//! Steps 1-4 only read; persisting the order is the single commit point, so a
//! failure anywhere leaves no state behind and needs no compensation.

use std::collections::{HashMap, HashSet};
use tracing::{error, info, instrument, warn};

use crate::batch::{BatchSources, PassLoaders};
use crate::clients::{CatalogClient, OrderClient};
use crate::domain::{Order, OrderCreate, OrderLine, Product};
use crate::error::{OrderError, ServiceError};

/// One requested line: which product, how many.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequestLine {
    pub product_id: String,
    pub quantity: u32,
}

impl OrderRequestLine {
    pub fn new(product_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrder {
    pub account_id: String,
    pub lines: Vec<OrderRequestLine>,
}

/// A persisted line annotated with catalog details known at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydratedLine {
    pub line: OrderLine,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydratedOrder {
    pub order: Order,
    pub lines: Vec<HydratedLine>,
}

#[derive(Clone)]
pub struct OrderOrchestrator {
    sources: BatchSources,
    catalog: CatalogClient,
    orders: OrderClient,
    revalidate_on_commit: bool,
}

impl OrderOrchestrator {
    pub fn new(
        sources: BatchSources,
        catalog: CatalogClient,
        orders: OrderClient,
        revalidate_on_commit: bool,
    ) -> Self {
        Self {
            sources,
            catalog,
            orders,
            revalidate_on_commit,
        }
    }

    /// Creates an order in a resolution pass of its own.
    pub async fn create_order(&self, request: CreateOrder) -> Result<HydratedOrder, OrderError> {
        let loaders = PassLoaders::new(&self.sources);
        self.create_order_in(&loaders, request).await
    }

    /// Creates an order inside an existing pass. Products resolved here stay in
    /// the pass cache, so hydrating the result costs no second catalog call.
    #[instrument(
        fields(account_id = %request.account_id, lines = request.lines.len()),
        skip(self, loaders, request)
    )]
    pub async fn create_order_in(
        &self,
        loaders: &PassLoaders,
        request: CreateOrder,
    ) -> Result<HydratedOrder, OrderError> {
        info!("Processing create_order request");
        validate_request(&request)?;

        let product_ids = distinct_product_ids(&request.lines);

        // Step 1: account check and catalog lookup run concurrently.
        let (account, products) = tokio::join!(
            loaders.accounts.load(request.account_id.clone()),
            loaders.products.load_many(product_ids.clone()),
        );

        // Step 2: validate account
        match account {
            Ok(account) => info!(account_name = %account.name, "Account validation successful"),
            Err(ServiceError::NotFound { .. }) => {
                error!("Account not found");
                return Err(OrderError::InvalidAccount(request.account_id));
            }
            Err(e) => {
                error!(error = %e, "Account validation failed");
                return Err(OrderError::Unavailable(e));
            }
        }

        // Step 3: validate products
        let catalog = resolve_products(products)?;
        info!(products = catalog.len(), "Product validation successful");

        // Step 4: snapshot prices and total
        let lines: Vec<OrderLine> = request
            .lines
            .iter()
            .filter_map(|requested| {
                catalog.get(&requested.product_id).map(|product| OrderLine {
                    product_id: requested.product_id.clone(),
                    quantity: requested.quantity,
                    price: product.price,
                })
            })
            .collect();
        let total_price = Order::total_of(&lines)
            .ok_or_else(|| OrderError::Validation("order total overflows".to_string()))?;
        info!(total = %total_price, "Order priced");

        if self.revalidate_on_commit {
            self.revalidate(&product_ids).await?;
        }

        // Step 5: single commit point
        let payload = OrderCreate {
            account_id: request.account_id,
            lines,
            total_price,
        };
        let order = self.orders.create_order(payload).await.map_err(|e| {
            error!(error = %e, "Order persistence failed");
            OrderError::Persist(e)
        })?;
        info!(order_id = %order.id, "Order created successfully");

        // Step 6: hydrate from the products already resolved in step 1
        let lines = order
            .lines
            .iter()
            .map(|line| {
                let product = catalog.get(&line.product_id);
                HydratedLine {
                    line: line.clone(),
                    name: product.map(|p| p.name.clone()).unwrap_or_default(),
                    description: product.map(|p| p.description.clone()).unwrap_or_default(),
                }
            })
            .collect();

        Ok(HydratedOrder { order, lines })
    }

    /// Uncached catalog read right before commit. Narrows the window in which a
    /// product deleted after step 1 could still be ordered.
    async fn revalidate(&self, product_ids: &[String]) -> Result<(), OrderError> {
        let found = self
            .catalog
            .get_products(product_ids.to_vec())
            .await
            .map_err(OrderError::Unavailable)?;
        if found.missing.is_empty() {
            return Ok(());
        }
        let mut missing = found.missing;
        missing.sort();
        warn!(missing = ?missing, "Products vanished before commit");
        Err(OrderError::InvalidProduct(missing))
    }
}

fn validate_request(request: &CreateOrder) -> Result<(), OrderError> {
    if request.account_id.trim().is_empty() {
        return Err(OrderError::Validation("account id required".to_string()));
    }
    if request.lines.is_empty() {
        return Err(OrderError::Validation(
            "order must contain at least one product".to_string(),
        ));
    }
    for line in &request.lines {
        if line.product_id.trim().is_empty() {
            return Err(OrderError::Validation("product id required".to_string()));
        }
        if line.quantity == 0 {
            return Err(OrderError::Validation(format!(
                "quantity for {} must be positive",
                line.product_id
            )));
        }
    }
    Ok(())
}

fn distinct_product_ids(lines: &[OrderRequestLine]) -> Vec<String> {
    let mut seen = HashSet::new();
    lines
        .iter()
        .filter(|line| seen.insert(line.product_id.as_str()))
        .map(|line| line.product_id.clone())
        .collect()
}

/// All-or-nothing: any unreachable catalog answer or unknown id fails the order.
fn resolve_products(
    results: Vec<(String, Result<Product, ServiceError>)>,
) -> Result<HashMap<String, Product>, OrderError> {
    let mut catalog = HashMap::with_capacity(results.len());
    let mut missing = Vec::new();
    for (id, result) in results {
        match result {
            Ok(product) => {
                catalog.insert(id, product);
            }
            Err(ServiceError::NotFound { .. }) => missing.push(id),
            Err(e) => {
                error!(error = %e, "Product validation failed");
                return Err(OrderError::Unavailable(e));
            }
        }
    }
    if !missing.is_empty() {
        error!(missing = ?missing, "Products not found");
        return Err(OrderError::InvalidProduct(missing));
    }
    Ok(catalog)
}
