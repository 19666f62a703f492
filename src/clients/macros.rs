/// Generates a typed client around [`ServiceClient`](super::ServiceClient):
/// `new`, `get_<entity>s`, `list_<entity>s` and `create_<entity>`.
macro_rules! impl_service_client {
    ($client_name:ident, $entity:ty, $service:literal, $entity_name_snake:ident) => {
        paste::paste! {
            #[derive(Clone)]
            pub struct $client_name {
                inner: $crate::clients::ServiceClient<$entity>,
            }

            impl $client_name {
                pub fn new(
                    inner: $crate::actor_framework::ResourceClient<$entity>,
                    policy: $crate::config::CallPolicy,
                ) -> Self {
                    Self {
                        inner: $crate::clients::ServiceClient::new($service, inner, policy),
                    }
                }

                #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
                pub async fn [<get_ $entity_name_snake s>](
                    &self,
                    ids: Vec<String>,
                ) -> Result<$crate::actor_framework::Found<$entity>, $crate::error::ServiceError> {
                    tracing::debug!("Sending request");
                    self.inner.get_by_ids(ids).await
                }

                #[tracing::instrument(skip(self))]
                pub async fn [<list_ $entity_name_snake s>](
                    &self,
                    filter: <$entity as $crate::actor_framework::Entity>::Filter,
                    page: $crate::actor_framework::Page,
                ) -> Result<Vec<$entity>, $crate::error::ServiceError> {
                    tracing::debug!("Sending request");
                    self.inner.list(filter, page).await
                }

                #[tracing::instrument(skip(self))]
                pub async fn [<create_ $entity_name_snake>](
                    &self,
                    payload: <$entity as $crate::actor_framework::Entity>::CreatePayload,
                ) -> Result<$entity, $crate::error::ServiceError> {
                    tracing::debug!("Sending request");
                    self.inner.create(payload).await
                }
            }
        }
    };
}
