//! Resource abstraction layer
//!
//! Resource types are described by definition documents instead of code.
//! A document is compiled into a [`Model`] once; a [`Service`] binds the model
//! to a client and hands out [`Resource`] instances whose operations are
//! dispatched by name.
//!
//! # Architecture
//!
//! - [`path`] - Dotted member paths with list projection
//! - [`source`] - Where one request or identifier value comes from
//! - [`builder`] - Assembles parameter and identifier structures
//! - [`operation`] - Load, actions, references, batch actions, waiters
//! - [`definition`] - Per-type dispatch table and introspection
//! - [`loader`] - Parses and validates definition documents
//! - [`runtime`] - Resource instances and operation dispatch
//! - [`waiter`] - Acceptor matching and poll bookkeeping
//!
//! # Example
//!
//! ```ignore
//! use cloudres::client::StubClient;
//! use cloudres::resource::{Args, Model, Service};
//! use std::sync::Arc;
//!
//! async fn objects(document: &str) -> cloudres::Result<()> {
//!     let model = Model::from_json_str("s3", document)?;
//!     let service = Service::new(model, Arc::new(StubClient::new()));
//!     let bucket = service.resource("Bucket", [("Name", "my-bucket")])?;
//!     let objects = bucket.call("Objects", Args::new()).await?;
//!     Ok(())
//! }
//! ```

mod batch;
pub mod builder;
pub mod definition;
pub mod loader;
pub mod operation;
pub mod path;
pub mod runtime;
pub mod source;
pub mod waiter;

pub use builder::{Args, Builder, Request};
pub use definition::{
    AttributeDescription, MemberType, OperationDescription, ResourceDefinition,
    ResourceDescription, Shape,
};
pub use loader::{Model, LOAD};
pub use operation::{Operation, OperationKind};
pub use path::{Path, Resolved};
pub use runtime::{load_all, Output, Resource, Service};
pub use source::BuilderSource;
pub use waiter::{WaiterOptions, WaiterState};
