//! In-process resource services.
//!
//! Each backend (accounts, catalog, orders) owns its records inside a
//! [`ResourceActor`] and is only reachable through a [`ResourceClient`] message
//! channel. The gateway never touches a store directly.

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

// =============================================================================
// 1. THE ABSTRACTION
// =============================================================================

/// Trait that any record must implement to be served by a [`ResourceActor`].
pub trait Entity: Clone + Send + Sync + Debug + 'static {
    type Id: Eq + Hash + Ord + Clone + Send + Sync + Display + Debug;
    type CreatePayload: Send + Sync + Debug;
    type Patch: Send + Sync + Debug;
    type Filter: Send + Sync + Debug + Clone + Default;

    /// Entity kind, used in logs and errors.
    const KIND: &'static str;

    fn id(&self) -> &Self::Id;

    /// Construct the full record from the service-assigned id and the payload.
    fn from_create(id: Self::Id, payload: Self::CreatePayload) -> Result<Self, String>;

    fn on_update(&mut self, patch: Self::Patch) -> Result<(), String>;
    fn on_delete(&self) -> Result<(), String> {
        Ok(())
    }

    /// Whether this record is selected by a `List` filter.
    fn matches(&self, filter: &Self::Filter) -> bool;
}

/// Offset pagination for `List` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: usize,
    pub take: usize,
}

impl Page {
    pub fn new(skip: usize, take: usize) -> Self {
        Self { skip, take }
    }

    /// Every record.
    pub fn all() -> Self {
        Self { skip: 0, take: usize::MAX }
    }
}

/// Result of a `GetByIds` request. Unknown ids never fail the request.
#[derive(Debug, Clone)]
pub struct Found<T: Entity> {
    pub found: HashMap<T::Id, T>,
    pub missing: Vec<T::Id>,
}

impl<T: Entity> Default for Found<T> {
    fn default() -> Self {
        Self {
            found: HashMap::new(),
            missing: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameworkError {
    #[error("Actor closed")]
    ActorClosed,
    #[error("Actor dropped the request")]
    ActorDropped,
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Rejected: {0}")]
    Rejected(String),
}

// =============================================================================
// 2. THE GENERIC MESSAGES
// =============================================================================

pub type Response<T> = oneshot::Sender<Result<T, FrameworkError>>;

#[derive(Debug)]
pub enum ResourceRequest<T: Entity> {
    GetByIds {
        ids: Vec<T::Id>,
        respond_to: Response<Found<T>>,
    },
    Create {
        payload: T::CreatePayload,
        respond_to: Response<T>,
    },
    List {
        filter: T::Filter,
        page: Page,
        respond_to: Response<Vec<T>>,
    },
    Update {
        id: T::Id,
        patch: T::Patch,
        respond_to: Response<T>,
    },
    Delete {
        id: T::Id,
        respond_to: Response<()>,
    },
    #[cfg(test)]
    Stats {
        respond_to: Response<ReadStats>,
    },
}

/// Read traffic served by one actor.
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub get_by_ids: usize,
    pub list: usize,
}

// =============================================================================
// 3. THE GENERIC ACTOR SERVER
// =============================================================================

pub struct ResourceActor<T: Entity> {
    receiver: mpsc::Receiver<ResourceRequest<T>>,
    store: HashMap<T::Id, T>,
    insertion_order: Vec<T::Id>,
    next_id_fn: Box<dyn Fn() -> T::Id + Send + Sync>,
    #[cfg(test)]
    stats: ReadStats,
}

impl<T: Entity> ResourceActor<T> {
    pub fn new(
        buffer_size: usize,
        next_id_fn: impl Fn() -> T::Id + Send + Sync + 'static,
    ) -> (Self, ResourceClient<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            store: HashMap::new(),
            insertion_order: Vec::new(),
            next_id_fn: Box::new(next_id_fn),
            #[cfg(test)]
            stats: ReadStats::default(),
        };
        (actor, ResourceClient::new(sender))
    }

    #[instrument(name = "resource_service", fields(kind = T::KIND), skip(self))]
    pub async fn run(mut self) {
        info!("Service starting");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                ResourceRequest::GetByIds { ids, respond_to } => {
                    #[cfg(test)]
                    {
                        self.stats.get_by_ids += 1;
                    }
                    let _ = respond_to.send(Ok(self.handle_get_by_ids(ids)));
                }
                ResourceRequest::Create { payload, respond_to } => {
                    let _ = respond_to.send(self.handle_create(payload));
                }
                ResourceRequest::List {
                    filter,
                    page,
                    respond_to,
                } => {
                    #[cfg(test)]
                    {
                        self.stats.list += 1;
                    }
                    let _ = respond_to.send(Ok(self.handle_list(&filter, page)));
                }
                ResourceRequest::Update {
                    id,
                    patch,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_update(id, patch));
                }
                ResourceRequest::Delete { id, respond_to } => {
                    let _ = respond_to.send(self.handle_delete(id));
                }
                #[cfg(test)]
                ResourceRequest::Stats { respond_to } => {
                    let _ = respond_to.send(Ok(self.stats));
                }
            }
        }

        info!("Service stopped");
    }

    #[instrument(fields(requested = ids.len()), skip(self, ids))]
    fn handle_get_by_ids(&self, ids: Vec<T::Id>) -> Found<T> {
        let mut result = Found::default();
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            match self.store.get(&id) {
                Some(item) => {
                    result.found.insert(id, item.clone());
                }
                None => result.missing.push(id),
            }
        }
        debug!(
            found = result.found.len(),
            missing = result.missing.len(),
            "Processed get_by_ids request"
        );
        result
    }

    #[instrument(skip(self, payload))]
    fn handle_create(&mut self, payload: T::CreatePayload) -> Result<T, FrameworkError> {
        let id = (self.next_id_fn)();
        let item = T::from_create(id.clone(), payload).map_err(|reason| {
            warn!(%reason, "Create rejected");
            FrameworkError::Rejected(reason)
        })?;
        self.store.insert(id.clone(), item.clone());
        self.insertion_order.push(id.clone());
        info!(id = %id, "Created");
        Ok(item)
    }

    #[instrument(skip(self, filter))]
    fn handle_list(&self, filter: &T::Filter, page: Page) -> Vec<T> {
        let items: Vec<T> = self
            .insertion_order
            .iter()
            .filter_map(|id| self.store.get(id))
            .filter(|item| item.matches(filter))
            .skip(page.skip)
            .take(page.take)
            .cloned()
            .collect();
        debug!(count = items.len(), "Listed");
        items
    }

    #[instrument(fields(id = %id), skip(self, patch))]
    fn handle_update(&mut self, id: T::Id, patch: T::Patch) -> Result<T, FrameworkError> {
        let item = self
            .store
            .get_mut(&id)
            .ok_or_else(|| FrameworkError::NotFound(id.to_string()))?;
        item.on_update(patch).map_err(FrameworkError::Rejected)?;
        info!("Updated");
        Ok(item.clone())
    }

    #[instrument(fields(id = %id), skip(self))]
    fn handle_delete(&mut self, id: T::Id) -> Result<(), FrameworkError> {
        let item = self
            .store
            .get(&id)
            .ok_or_else(|| FrameworkError::NotFound(id.to_string()))?;
        item.on_delete().map_err(FrameworkError::Rejected)?;
        self.store.remove(&id);
        self.insertion_order.retain(|existing| existing != &id);
        info!("Deleted");
        Ok(())
    }
}

// =============================================================================
// 4. THE GENERIC CLIENT
// =============================================================================

pub struct ResourceClient<T: Entity> {
    sender: mpsc::Sender<ResourceRequest<T>>,
}

// Derived Clone would require `T: Clone` on the payload types too.
impl<T: Entity> Clone for ResourceClient<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Entity> ResourceClient<T> {
    pub fn new(sender: mpsc::Sender<ResourceRequest<T>>) -> Self {
        Self { sender }
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(Response<R>) -> ResourceRequest<T>,
    ) -> Result<R, FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| FrameworkError::ActorClosed)?;
        response.await.map_err(|_| FrameworkError::ActorDropped)?
    }

    pub async fn get_by_ids(&self, ids: Vec<T::Id>) -> Result<Found<T>, FrameworkError> {
        self.request(|respond_to| ResourceRequest::GetByIds { ids, respond_to })
            .await
    }

    pub async fn create(&self, payload: T::CreatePayload) -> Result<T, FrameworkError> {
        self.request(|respond_to| ResourceRequest::Create {
            payload,
            respond_to,
        })
        .await
    }

    pub async fn list(&self, filter: T::Filter, page: Page) -> Result<Vec<T>, FrameworkError> {
        self.request(|respond_to| ResourceRequest::List {
            filter,
            page,
            respond_to,
        })
        .await
    }

    pub async fn update(&self, id: T::Id, patch: T::Patch) -> Result<T, FrameworkError> {
        self.request(|respond_to| ResourceRequest::Update {
            id,
            patch,
            respond_to,
        })
        .await
    }

    pub async fn delete(&self, id: T::Id) -> Result<(), FrameworkError> {
        self.request(|respond_to| ResourceRequest::Delete { id, respond_to })
            .await
    }

    #[cfg(test)]
    pub async fn stats(&self) -> Result<ReadStats, FrameworkError> {
        self.request(|respond_to| ResourceRequest::Stats { respond_to })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Debug, PartialEq)]
    struct Note {
        id: String,
        text: String,
    }

    #[derive(Debug)]
    struct NoteCreate {
        text: String,
    }

    #[derive(Debug, Clone, Default)]
    struct NoteFilter {
        contains: Option<String>,
    }

    impl Entity for Note {
        type Id = String;
        type CreatePayload = NoteCreate;
        type Patch = String;
        type Filter = NoteFilter;

        const KIND: &'static str = "note";

        fn id(&self) -> &String {
            &self.id
        }

        fn from_create(id: String, payload: NoteCreate) -> Result<Self, String> {
            if payload.text.is_empty() {
                return Err("text required".to_string());
            }
            Ok(Self {
                id,
                text: payload.text,
            })
        }

        fn on_update(&mut self, patch: String) -> Result<(), String> {
            self.text = patch;
            Ok(())
        }

        fn matches(&self, filter: &NoteFilter) -> bool {
            filter
                .contains
                .as_deref()
                .map_or(true, |needle| self.text.contains(needle))
        }
    }

    fn start() -> ResourceClient<Note> {
        let counter = Arc::new(AtomicU64::new(1));
        let next_id = move || format!("note_{}", counter.fetch_add(1, Ordering::SeqCst));
        let (actor, client) = ResourceActor::new(10, next_id);
        tokio::spawn(actor.run());
        client
    }

    async fn create(client: &ResourceClient<Note>, text: &str) -> Note {
        client
            .create(NoteCreate { text: text.into() })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn get_by_ids_reports_missing_ids_without_failing() {
        let client = start();
        let first = create(&client, "alpha").await;

        let found = client
            .get_by_ids(vec![first.id.clone(), "note_99".into(), first.id.clone()])
            .await
            .unwrap();

        assert_eq!(found.found.len(), 1);
        assert_eq!(found.found[&first.id], first);
        assert_eq!(found.missing, vec!["note_99".to_string()]);
    }

    #[tokio::test]
    async fn list_keeps_insertion_order_and_applies_filter_and_page() {
        let client = start();
        for text in ["apple", "banana", "apricot", "avocado"] {
            create(&client, text).await;
        }

        let filter = NoteFilter {
            contains: Some("a".into()),
        };
        let all = client.list(filter.clone(), Page::all()).await.unwrap();
        let texts: Vec<_> = all.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, ["apple", "banana", "apricot", "avocado"]);

        let page = client.list(filter, Page::new(1, 2)).await.unwrap();
        let texts: Vec<_> = page.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, ["banana", "apricot"]);
    }

    #[tokio::test]
    async fn create_rejection_and_missing_update_are_reported() {
        let client = start();

        let rejected = client.create(NoteCreate { text: String::new() }).await;
        assert_eq!(rejected, Err(FrameworkError::Rejected("text required".into())));

        let missing = client.update("note_7".into(), "x".into()).await;
        assert_eq!(missing, Err(FrameworkError::NotFound("note_7".into())));
    }

    #[tokio::test]
    async fn delete_removes_from_reads_and_listing() {
        let client = start();
        let note = create(&client, "gone").await;
        create(&client, "kept").await;

        client.delete(note.id.clone()).await.unwrap();

        let found = client.get_by_ids(vec![note.id.clone()]).await.unwrap();
        assert!(found.found.is_empty());
        let listed = client.list(NoteFilter::default(), Page::all()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(client.delete(note.id).await, Err(FrameworkError::NotFound("note_1".into())));
    }

    #[tokio::test]
    async fn stats_count_read_requests() {
        let client = start();
        create(&client, "a").await;
        client.get_by_ids(vec!["note_1".into()]).await.unwrap();
        client.list(NoteFilter::default(), Page::all()).await.unwrap();
        client.list(NoteFilter::default(), Page::all()).await.unwrap();

        let stats = client.stats().await.unwrap();
        assert_eq!(stats, ReadStats { get_by_ids: 1, list: 2 });
    }
}
