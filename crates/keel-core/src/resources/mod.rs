//! Per-resource helpers.
//!
//! Each helper is a thin set of calls into the [`EngineApi`] primitives with
//! resource-specific paths. Image builds and network creation go through the
//! engine CLI via a [`CommandRunner`](crate::command::CommandRunner).
//!
//! ```text
//!  Client ──▶ Containers / Images / Networks / Nodes / Services / Volumes
//!                 │                     │
//!                 ▼                     ▼
//!        Arc<dyn EngineApi>   Arc<dyn CommandRunner>
//! ```
//!
//! [`EngineApi`]: crate::client::EngineApi

mod containers;
mod images;
mod networks;
mod nodes;
mod services;
mod volumes;

pub use containers::Containers;
pub use images::{BuildParams, Images};
pub use networks::{NetworkParams, Networks};
pub use nodes::Nodes;
pub use services::Services;
pub use volumes::Volumes;

use crate::query::Query;

/// Query carrying the optimistic-concurrency `version` of a swarm object.
fn version_query(version: u64) -> Query {
    Query::new().param("version", version)
}
