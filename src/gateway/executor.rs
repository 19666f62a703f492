//! Drives a plan to completion within one resolution pass.
//!
//! Every list level resolves its items with `join_all`, so all siblings
//! register their lookups before any loader flushes: one backend call per
//! entity kind per level, whatever the number of parents.

use futures::future::join_all;
use serde_json::{json, Value as JsonValue};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, instrument, warn};

use super::parser::OperationKind;
use super::plan::{
    AccountField, LineField, OrderField, Plan, ProductField, RootField, Selection,
};
use super::response::{GraphError, JsonMap, PathSegment, Response};
use super::Gateway;
use crate::actor_framework::Page;
use crate::batch::PassLoaders;
use crate::domain::{Account, AccountCreate, AccountFilter, Order, OrderLine, Product, ProductFilter};
use crate::error::{QueryError, ServiceError};

/// State owned by one resolution pass. Dropped with the pass.
pub(super) struct Pass<'g> {
    gateway: &'g Gateway,
    loaders: PassLoaders,
    errors: Mutex<Vec<GraphError>>,
}

fn child(path: &[PathSegment], segment: impl Into<PathSegment>) -> Vec<PathSegment> {
    let mut path = path.to_vec();
    path.push(segment.into());
    path
}

fn money(value: rust_decimal::Decimal) -> JsonValue {
    JsonValue::String(value.to_string())
}

impl<'g> Pass<'g> {
    pub(super) fn new(gateway: &'g Gateway) -> Self {
        Self {
            gateway,
            loaders: PassLoaders::new(&gateway.sources),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Resolves every root field. Query roots run concurrently; mutation roots
    /// run one after another and the first failure aborts the rest.
    #[instrument(skip_all, fields(kind = ?plan.kind, roots = plan.roots.len()))]
    pub(super) async fn execute(&self, plan: &Plan) -> Result<JsonMap, QueryError> {
        let values = match plan.kind {
            OperationKind::Query => join_all(plan.roots.iter().map(|root| self.resolve_root(root)))
                .await
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?,
            OperationKind::Mutation => {
                let mut values = Vec::with_capacity(plan.roots.len());
                for root in &plan.roots {
                    values.push(self.resolve_root(root).await?);
                }
                values
            }
        };

        Ok(plan
            .roots
            .iter()
            .map(|root| root.key.clone())
            .zip(values)
            .collect())
    }

    pub(super) fn assemble(self, data: JsonMap) -> Response {
        let errors = self.errors.into_inner().unwrap_or_else(PoisonError::into_inner);
        Response {
            data: JsonValue::Object(data),
            errors,
        }
    }

    fn record(&self, path: Vec<PathSegment>, error: &ServiceError) {
        debug!(path = ?path, error = %error, "Field resolved to null");
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(GraphError {
                message: error.to_string(),
                path,
            });
    }

    async fn resolve_root(&self, root: &Selection<RootField>) -> Result<JsonValue, QueryError> {
        let path = vec![PathSegment::from(root.key.as_str())];
        let required = |source: ServiceError| {
            warn!(field = %root.key, error = %source, "Required field failed");
            QueryError::Unavailable {
                field: root.key.clone(),
                source,
            }
        };
        let mutation = |source: ServiceError| QueryError::Mutation {
            field: root.key.clone(),
            source,
        };

        match &root.field {
            RootField::Accounts { id, page, fields } => {
                let accounts = match id {
                    Some(id) => self.account_by_id(id).await.map_err(required)?,
                    None => self.list_accounts(*page).await.map_err(required)?,
                };
                Ok(self.accounts_json(&accounts, fields, &path).await)
            }
            RootField::Products {
                id,
                query,
                page,
                fields,
            } => {
                let products = match id {
                    Some(id) => self.product_by_id(id).await.map_err(required)?,
                    None => self
                        .list_products(query.clone(), *page)
                        .await
                        .map_err(required)?,
                };
                Ok(products_json(&products, fields))
            }
            RootField::CreateAccount { name, fields } => {
                let account = self
                    .gateway
                    .accounts
                    .create_account(AccountCreate { name: name.clone() })
                    .await
                    .map_err(mutation)?;
                self.loaders
                    .accounts
                    .prime(account.id.clone(), account.clone());
                self.loaders
                    .orders_by_account
                    .prime(account.id.clone(), Vec::new());
                Ok(self.account_json(&account, fields, path).await)
            }
            RootField::CreateProduct { payload, fields } => {
                let product = self
                    .gateway
                    .catalog
                    .create_product(payload.clone())
                    .await
                    .map_err(mutation)?;
                self.loaders
                    .products
                    .prime(product.id.clone(), product.clone());
                Ok(product_json(&product, fields))
            }
            RootField::CreateOrder { request, fields } => {
                let created = self
                    .gateway
                    .orchestrator
                    .create_order_in(&self.loaders, request.clone())
                    .await?;
                Ok(self.order_json(&created.order, fields, path).await)
            }
        }
    }

    /// Unknown ids resolve to an empty list rather than an error.
    async fn account_by_id(&self, id: &str) -> Result<Vec<Account>, ServiceError> {
        match self.loaders.accounts.load(id.to_string()).await {
            Ok(account) => Ok(vec![account]),
            Err(ServiceError::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn product_by_id(&self, id: &str) -> Result<Vec<Product>, ServiceError> {
        match self.loaders.products.load(id.to_string()).await {
            Ok(product) => Ok(vec![product]),
            Err(ServiceError::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn list_accounts(&self, page: Page) -> Result<Vec<Account>, ServiceError> {
        let accounts = self
            .gateway
            .accounts
            .list_accounts(AccountFilter, page)
            .await?;
        for account in &accounts {
            self.loaders
                .accounts
                .prime(account.id.clone(), account.clone());
        }
        Ok(accounts)
    }

    async fn list_products(
        &self,
        query: Option<String>,
        page: Page,
    ) -> Result<Vec<Product>, ServiceError> {
        let filter = ProductFilter { query, ids: None };
        let products = self.gateway.catalog.list_products(filter, page).await?;
        for product in &products {
            self.loaders
                .products
                .prime(product.id.clone(), product.clone());
        }
        Ok(products)
    }

    async fn accounts_json(
        &self,
        accounts: &[Account],
        fields: &[Selection<AccountField>],
        path: &[PathSegment],
    ) -> JsonValue {
        let items = join_all(
            accounts
                .iter()
                .enumerate()
                .map(|(i, account)| self.account_json(account, fields, child(path, i))),
        )
        .await;
        JsonValue::Array(items)
    }

    async fn account_json(
        &self,
        account: &Account,
        fields: &[Selection<AccountField>],
        path: Vec<PathSegment>,
    ) -> JsonValue {
        let mut object = JsonMap::new();
        for selection in fields {
            let value = match &selection.field {
                AccountField::Id => json!(account.id),
                AccountField::Name => json!(account.name),
                AccountField::Orders(order_fields) => {
                    let at = child(&path, selection.key.as_str());
                    match self.loaders.orders_by_account.load(account.id.clone()).await {
                        Ok(orders) => self.orders_json(&orders, order_fields, &at).await,
                        Err(e) => {
                            self.record(at, &e);
                            JsonValue::Null
                        }
                    }
                }
            };
            object.insert(selection.key.clone(), value);
        }
        JsonValue::Object(object)
    }

    async fn orders_json(
        &self,
        orders: &[Order],
        fields: &[Selection<OrderField>],
        path: &[PathSegment],
    ) -> JsonValue {
        let items = join_all(
            orders
                .iter()
                .enumerate()
                .map(|(i, order)| self.order_json(order, fields, child(path, i))),
        )
        .await;
        JsonValue::Array(items)
    }

    async fn order_json(
        &self,
        order: &Order,
        fields: &[Selection<OrderField>],
        path: Vec<PathSegment>,
    ) -> JsonValue {
        let mut object = JsonMap::new();
        for selection in fields {
            let value = match &selection.field {
                OrderField::Id => json!(order.id),
                OrderField::AccountId => json!(order.account_id),
                OrderField::CreatedAt => json!(order.created_at.to_rfc3339()),
                OrderField::TotalPrice => money(order.total_price),
                OrderField::Products(line_fields) => {
                    let at = child(&path, selection.key.as_str());
                    let items = join_all(
                        order
                            .lines
                            .iter()
                            .enumerate()
                            .map(|(i, line)| self.line_json(line, line_fields, child(&at, i))),
                    )
                    .await;
                    JsonValue::Array(items)
                }
            };
            object.insert(selection.key.clone(), value);
        }
        JsonValue::Object(object)
    }

    /// Snapshot fields come from the order itself; name and description are
    /// looked up in the catalog and go null if the product is gone.
    async fn line_json(
        &self,
        line: &OrderLine,
        fields: &[Selection<LineField>],
        path: Vec<PathSegment>,
    ) -> JsonValue {
        let needs_catalog = fields
            .iter()
            .any(|s| matches!(s.field, LineField::Name | LineField::Description));
        let product = if needs_catalog {
            Some(self.loaders.products.load(line.product_id.clone()).await)
        } else {
            None
        };

        let mut object = JsonMap::new();
        for selection in fields {
            let value = match selection.field {
                LineField::Id => json!(line.product_id),
                LineField::Price => money(line.price),
                LineField::Quantity => json!(line.quantity),
                LineField::Name | LineField::Description => match &product {
                    Some(Ok(product)) if selection.field == LineField::Name => json!(product.name),
                    Some(Ok(product)) => json!(product.description),
                    Some(Err(e)) => {
                        self.record(child(&path, selection.key.as_str()), e);
                        JsonValue::Null
                    }
                    None => JsonValue::Null,
                },
            };
            object.insert(selection.key.clone(), value);
        }
        JsonValue::Object(object)
    }
}

fn products_json(products: &[Product], fields: &[Selection<ProductField>]) -> JsonValue {
    JsonValue::Array(
        products
            .iter()
            .map(|product| product_json(product, fields))
            .collect(),
    )
}

fn product_json(product: &Product, fields: &[Selection<ProductField>]) -> JsonValue {
    let mut object = JsonMap::new();
    for selection in fields {
        let value = match selection.field {
            ProductField::Id => json!(product.id),
            ProductField::Name => json!(product.name),
            ProductField::Description => json!(product.description),
            ProductField::Price => money(product.price),
        };
        object.insert(selection.key.clone(), value);
    }
    JsonValue::Object(object)
}
