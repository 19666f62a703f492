use tracing::{debug, instrument};

use crate::domain::{Product, ProductPatch};
use crate::error::ServiceError;

impl_service_client!(CatalogClient, Product, "catalog", product);

impl CatalogClient {
    /// Catalog-owned edit. Existing orders keep their snapshot prices.
    #[instrument(skip(self))]
    pub async fn update_product(&self, id: String, patch: ProductPatch) -> Result<Product, ServiceError> {
        debug!("Sending request");
        self.inner.update(id, patch).await
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: String) -> Result<(), ServiceError> {
        debug!("Sending request");
        self.inner.delete(id).await
    }
}
