//! Per-pass batching of id lookups.
//!
//! A [`BatchLoader`] collects the ids requested while one resolution step runs
//! and turns them into a single backend call. [`PassLoaders`] bundles the
//! loaders one query or mutation needs; it is created at pass start and
//! dropped with the pass, so batches and memoized results never leak between
//! requests.

pub mod loader;
pub mod sources;

pub use loader::{BatchFn, BatchKey, BatchLoader};
pub use sources::{BatchSources, OrdersByAccount};

use crate::domain::{Account, Order, Product};

/// The loaders of one resolution pass, one per entity kind.
pub struct PassLoaders {
    pub accounts: BatchLoader<String, Account>,
    pub products: BatchLoader<String, Product>,
    pub orders_by_account: BatchLoader<String, Vec<Order>>,
}

impl PassLoaders {
    pub fn new(sources: &BatchSources) -> Self {
        Self {
            accounts: BatchLoader::new(sources.accounts.clone()),
            products: BatchLoader::new(sources.products.clone()),
            orders_by_account: BatchLoader::new(sources.orders_by_account.clone()),
        }
    }
}
