//! Typed clients for the account, catalog and order services.
//!
//! Every call is bounded by the service's [`CallPolicy`]: a per-call timeout,
//! a bulkhead limiting in-flight calls, and (for reads only) a bounded number
//! of immediate retries. Transport failures surface as
//! [`ServiceError::Unavailable`], never as `NotFound`.

#[macro_use]
mod macros;

pub mod account_client;
pub mod catalog_client;
pub mod order_client;

pub use account_client::AccountClient;
pub use catalog_client::CatalogClient;
pub use order_client::OrderClient;

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::actor_framework::{Entity, Found, FrameworkError, Page, ResourceClient};
use crate::config::CallPolicy;
use crate::error::ServiceError;

/// Policy-enforcing wrapper around a [`ResourceClient`].
pub struct ServiceClient<T: Entity> {
    service: &'static str,
    inner: ResourceClient<T>,
    policy: CallPolicy,
    bulkhead: Arc<Semaphore>,
}

impl<T: Entity> Clone for ServiceClient<T> {
    fn clone(&self) -> Self {
        Self {
            service: self.service,
            inner: self.inner.clone(),
            policy: self.policy,
            bulkhead: Arc::clone(&self.bulkhead),
        }
    }
}

impl<T: Entity> ServiceClient<T> {
    pub fn new(service: &'static str, inner: ResourceClient<T>, policy: CallPolicy) -> Self {
        Self {
            service,
            inner,
            bulkhead: Arc::new(Semaphore::new(policy.max_in_flight)),
            policy,
        }
    }

    /// Fetch by ids. Unknown ids come back in `missing`; the call itself only
    /// fails when the service cannot be reached.
    pub async fn get_by_ids(&self, ids: Vec<T::Id>) -> Result<Found<T>, ServiceError> {
        let inner = &self.inner;
        self.read("get_by_ids", move || inner.get_by_ids(ids.clone()))
            .await
    }

    pub async fn list(&self, filter: T::Filter, page: Page) -> Result<Vec<T>, ServiceError> {
        let inner = &self.inner;
        self.read("list", move || inner.list(filter.clone(), page))
            .await
    }

    /// Not retried: a create that timed out may still have been applied.
    pub async fn create(&self, payload: T::CreatePayload) -> Result<T, ServiceError> {
        self.attempt(self.inner.create(payload)).await
    }

    pub async fn update(&self, id: T::Id, patch: T::Patch) -> Result<T, ServiceError> {
        self.attempt(self.inner.update(id, patch)).await
    }

    pub async fn delete(&self, id: T::Id) -> Result<(), ServiceError> {
        self.attempt(self.inner.delete(id)).await
    }

    async fn read<R, Fut>(
        &self,
        op: &'static str,
        make_call: impl Fn() -> Fut,
    ) -> Result<R, ServiceError>
    where
        Fut: Future<Output = Result<R, FrameworkError>>,
    {
        let mut retries = 0;
        loop {
            match self.attempt(make_call()).await {
                Err(err) if err.is_unavailable() && retries < self.policy.read_retries => {
                    retries += 1;
                    warn!(service = self.service, op, retries, error = %err, "Retrying read");
                }
                other => return other,
            }
        }
    }

    /// One bounded call. Waiting for a bulkhead permit counts against the timeout.
    async fn attempt<R>(
        &self,
        call: impl Future<Output = Result<R, FrameworkError>>,
    ) -> Result<R, ServiceError> {
        let bounded = async {
            let _permit = self
                .bulkhead
                .acquire()
                .await
                .map_err(|_| ServiceError::unavailable(self.service, "bulkhead closed"))?;
            call.await.map_err(|err| self.map_error(err))
        };

        match tokio::time::timeout(self.policy.timeout, bounded).await {
            Ok(result) => result,
            Err(_) => {
                debug!(service = self.service, timeout = ?self.policy.timeout, "Call timed out");
                Err(ServiceError::unavailable(
                    self.service,
                    format!("timed out after {:?}", self.policy.timeout),
                ))
            }
        }
    }

    fn map_error(&self, err: FrameworkError) -> ServiceError {
        match err {
            FrameworkError::ActorClosed | FrameworkError::ActorDropped => {
                ServiceError::unavailable(self.service, err.to_string())
            }
            FrameworkError::NotFound(id) => ServiceError::NotFound { kind: T::KIND, id },
            FrameworkError::Rejected(reason) => ServiceError::Rejected {
                service: self.service,
                reason,
            },
        }
    }
}
