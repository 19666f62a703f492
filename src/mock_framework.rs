//! # Mock Framework
//!
//! Utilities for testing clients in isolation.
//!
//! Use [`create_mock_client`] to get a client and a receiver, then use helpers
//! like [`expect_get_by_ids`] or [`expect_create`] to assert what the client
//! sent and to script the service's answer.

use crate::actor_framework::{Entity, Found, FrameworkError, Page, ResourceClient, ResourceRequest};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub type Responder<R> = oneshot::Sender<Result<R, FrameworkError>>;

/// Creates a mock client and a receiver for asserting requests.
///
/// No `ResourceActor` is spawned: the test plays the service by reading the
/// receiver and answering each request, which makes success, failure and
/// delays deterministic.
pub fn create_mock_client<T: Entity>(
    buffer_size: usize,
) -> (ResourceClient<T>, mpsc::Receiver<ResourceRequest<T>>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (ResourceClient::new(sender), receiver)
}

/// Helper to verify that the next message is a GetByIds request
pub async fn expect_get_by_ids<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(Vec<T::Id>, Responder<Found<T>>)> {
    match receiver.recv().await {
        Some(ResourceRequest::GetByIds { ids, respond_to }) => Some((ids, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Create request
pub async fn expect_create<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::CreatePayload, Responder<T>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Create {
            payload,
            respond_to,
        }) => Some((payload, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a List request
pub async fn expect_list<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::Filter, Page, Responder<Vec<T>>)> {
    match receiver.recv().await {
        Some(ResourceRequest::List {
            filter,
            page,
            respond_to,
        }) => Some((filter, page, respond_to)),
        _ => None,
    }
}

/// Asserts that nothing else reaches the service within `wait`.
pub async fn expect_silence<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
    wait: Duration,
) -> bool {
    tokio::time::timeout(wait, receiver.recv()).await.is_err()
}

/// Builds a [`Found`] answer from the requested ids and the known records.
pub fn found_from<T: Entity>(ids: &[T::Id], known: &[T]) -> Found<T> {
    let mut result = Found::default();
    for id in ids {
        match known.iter().find(|item| item.id() == id) {
            Some(item) => {
                result.found.insert(id.clone(), item.clone());
            }
            None => result.missing.push(id.clone()),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, AccountCreate};

    #[tokio::test]
    async fn test_mock_client() {
        let (client, mut receiver) = create_mock_client::<Account>(10);

        let create_task = tokio::spawn(async move {
            client
                .create(AccountCreate {
                    name: "Test".to_string(),
                })
                .await
        });

        let (payload, responder) = expect_create(&mut receiver)
            .await
            .expect("Expected Create request");
        assert_eq!(payload.name, "Test");
        responder
            .send(Ok(Account::new("account_1", "Test")))
            .unwrap();

        let result = create_task.await.unwrap();
        assert_eq!(result, Ok(Account::new("account_1", "Test")));
    }

    #[tokio::test]
    async fn found_from_splits_known_and_missing() {
        let known = [Account::new("a1", "Ann")];
        let found = found_from(&["a1".to_string(), "a2".to_string()], &known);
        assert_eq!(found.found["a1"].name, "Ann");
        assert_eq!(found.missing, vec!["a2".to_string()]);
    }
}
