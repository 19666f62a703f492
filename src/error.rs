use thiserror::Error;

/// Failure of a single backend call, as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{service} service unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },
    #[error("{service} service rejected the request: {reason}")]
    Rejected { service: &'static str, reason: String },
}

impl ServiceError {
    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        ServiceError::Unavailable {
            service,
            reason: reason.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ServiceError::Unavailable { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Order validation error: {0}")]
    Validation(String),
    #[error("Invalid account: {0}")]
    InvalidAccount(String),
    #[error("Invalid products: {}", .0.join(", "))]
    InvalidProduct(Vec<String>),
    #[error("Order dependencies unavailable: {0}")]
    Unavailable(ServiceError),
    #[error("Order was not persisted: {0}")]
    Persist(ServiceError),
}

/// Errors that abort a whole resolution pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Schema validation failed: {}", .0.join("; "))]
    SchemaValidation(Vec<String>),
    #[error("Required field `{field}` failed: {source}")]
    Unavailable {
        field: String,
        #[source]
        source: ServiceError,
    },
    #[error("Mutation `{field}` failed: {source}")]
    Mutation {
        field: String,
        #[source]
        source: ServiceError,
    },
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error("Request deadline of {0:?} exceeded")]
    Timeout(std::time::Duration),
}

impl QueryError {
    pub fn schema(message: impl Into<String>) -> Self {
        QueryError::SchemaValidation(vec![message.into()])
    }
}

/// Startup and shutdown failures of the whole system.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error("Service task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}
