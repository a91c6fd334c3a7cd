//! Client collaborator
//!
//! The resource engine never talks to the network itself. Every remote call
//! goes through a [`Client`], which owns transport, signing, retries and
//! payload encoding.
//!
//! # Module Structure
//!
//! - [`http`] - JSON-over-HTTP client (reqwest)
//! - [`stub`] - In-memory client with queued responses, for tests and demos
//!
//! # Example
//!
//! ```ignore
//! use cloudres::client::{Client, StubClient};
//! use serde_json::json;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = StubClient::new();
//!     client.stub("GetBucketLocation", json!({"LocationConstraint": "us-west-2"}));
//!     let response = client.invoke("GetBucketLocation", json!({"Bucket": "x"})).await?;
//!     Ok(())
//! }
//! ```

pub mod http;
pub mod stub;

pub use http::HttpClient;
pub use stub::StubClient;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// The single contract the engine consumes: `invoke(operation, params)`.
///
/// Implementations must be safe to share between tasks; one client is
/// shared by every resource derived from the same service.
#[async_trait]
pub trait Client: Send + Sync {
    async fn invoke(&self, operation: &str, params: Value) -> anyhow::Result<Value>;
}

#[async_trait]
impl<T: Client + ?Sized> Client for Arc<T> {
    async fn invoke(&self, operation: &str, params: Value) -> anyhow::Result<Value> {
        (**self).invoke(operation, params).await
    }
}

/// Error reported by the remote service (as opposed to a transport failure).
///
/// Waiter `error` matchers compare against [`ServiceError::code`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ServiceError {
    pub code: String,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Find a service error anywhere in an error chain
    pub fn find(error: &anyhow::Error) -> Option<&ServiceError> {
        error.chain().find_map(|e| e.downcast_ref::<ServiceError>())
    }
}
