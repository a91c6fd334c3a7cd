//! cloudres - declarative resource layer over a service client
//!
//! Resource types, their identifiers and their operations are read from
//! definition documents; a pluggable [`client::Client`] performs the actual
//! calls.

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod resource;

pub use error::{Error, Result};

/// Version injected at compile time via CLOUDRES_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("CLOUDRES_VERSION") {
    Some(v) => v,
    None => "dev",
};
