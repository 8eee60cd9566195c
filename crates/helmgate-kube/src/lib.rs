//! helmgate Kube - cluster API helpers
//!
//! Resolves which schema version of a resource kind the live cluster serves,
//! probing candidates in preference order and caching the answer per kind.

pub mod error;
pub mod schema;

pub use error::{KubeError, Result};
pub use schema::{ClusterProbe, ResourceKind, SchemaProbe, SchemaVersionResolver};
