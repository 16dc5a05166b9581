//! Schema-driven API explorer.
//!
//! Loads an OpenAPI document from a running service, indexes its
//! operations, synthesizes input forms from parameter and body schemas,
//! and executes the resulting requests. Uploaded assets and executed
//! requests are remembered in a local state directory.

pub mod assets;
pub mod client;
pub mod error;
pub mod executor;
pub mod explorer;
pub mod form;
pub mod history;
pub mod index;
pub mod render;
pub mod s3;
pub mod schema;
pub mod sources;
pub mod storage;

pub use error::{ExplorerError, Result};
pub use explorer::{Explorer, HealthState};
