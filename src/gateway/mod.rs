//! The query surface in front of the account, catalog and order services.
//!
//! One call to [`Gateway::execute`] is one resolution pass:
//! `Parse` → `PlanForExecution` → `Execute` → `Assemble` → `Complete`.
//! The pass owns its batch loaders; nothing is shared between passes except
//! the clients and their call policies.

mod executor;
pub mod parser;
pub mod plan;
pub mod response;
pub mod schema;

pub use response::{GraphError, PathSegment, Response};

use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::batch::BatchSources;
use crate::clients::{AccountClient, CatalogClient, OrderClient};
use crate::config::GatewayConfig;
use crate::error::QueryError;
use crate::orchestrator::OrderOrchestrator;
use executor::Pass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Parse,
    PlanForExecution,
    Execute,
    Assemble,
    Complete,
}

#[derive(Clone)]
pub struct Gateway {
    accounts: AccountClient,
    catalog: CatalogClient,
    sources: BatchSources,
    orchestrator: OrderOrchestrator,
    request_timeout: Duration,
    max_page_size: usize,
}

impl Gateway {
    pub fn new(
        accounts: AccountClient,
        catalog: CatalogClient,
        orders: OrderClient,
        config: &GatewayConfig,
    ) -> Self {
        let sources = BatchSources::new(accounts.clone(), catalog.clone(), orders.clone());
        let orchestrator = OrderOrchestrator::new(
            sources.clone(),
            catalog.clone(),
            orders,
            config.revalidate_on_commit,
        );
        Self {
            accounts,
            catalog,
            sources,
            orchestrator,
            request_timeout: config.request_timeout,
            max_page_size: config.max_page_size,
        }
    }

    pub fn orchestrator(&self) -> &OrderOrchestrator {
        &self.orchestrator
    }

    /// Runs one query or mutation under the request deadline. When the
    /// deadline fires the pass future is dropped, which cancels its
    /// outstanding backend calls.
    #[instrument(skip_all)]
    pub async fn execute(&self, source: &str) -> Result<Response, QueryError> {
        match tokio::time::timeout(self.request_timeout, self.resolve(source)).await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!(error = %e, "Request failed");
                }
                result
            }
            Err(_) => {
                warn!(deadline = ?self.request_timeout, "Request deadline exceeded");
                Err(QueryError::Timeout(self.request_timeout))
            }
        }
    }

    async fn resolve(&self, source: &str) -> Result<Response, QueryError> {
        debug!(phase = ?Phase::Parse);
        let document = parser::parse(source)?;
        schema::validate(&document)?;

        debug!(phase = ?Phase::PlanForExecution);
        let plan = plan::plan(&document, self.max_page_size)?;

        debug!(phase = ?Phase::Execute, owners = ?plan.owners);
        let pass = Pass::new(self);
        let data = pass.execute(&plan).await?;

        debug!(phase = ?Phase::Assemble);
        let response = pass.assemble(data);

        info!(
            phase = ?Phase::Complete,
            operation = ?document.kind,
            name = document.name.as_deref().unwrap_or(""),
            errors = response.errors.len(),
            "Request resolved"
        );
        Ok(response)
    }
}
