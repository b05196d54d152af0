#![deny(unsafe_code)]

//! Keel core client runtime.
//!
//! Talks to a container engine's HTTP API over a unix domain socket or a
//! (possibly TLS-secured) TCP endpoint, and consumes the engine's live event
//! feed with automatic reconnection. The CLI and any other consumer go
//! through [`Client`].

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future: the return type for async
/// trait methods that need dynamic dispatch (`dyn Trait`).
///
/// Native `async fn` in traits is not object-safe, so traits consumed as
/// `Arc<dyn Trait>` return a concrete `Pin<Box<dyn Future>>` instead.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// High-level client and the request primitives shared by resource helpers.
pub mod client;
/// External command-line tool invocation.
pub mod command;
/// Engine endpoint resolution (socket path, host, TLS material).
pub mod endpoint;
/// Error taxonomy for engine calls.
pub mod error;
/// Resilient, auto-reconnecting event feed consumer.
pub mod events;
/// Query parameters and filter encoding.
pub mod query;
/// Per-resource helpers (containers, images, networks, nodes, services, volumes).
pub mod resources;
/// Request targets, dispatch over both transports, and status classification.
pub mod transport;

pub use client::{Client, EngineApi, ListSelector};
pub use command::{CommandError, CommandOutput, CommandRunner, EngineCli};
pub use endpoint::{Endpoint, EndpointError, Scheme, TlsMaterial};
pub use error::ClientError;
pub use events::{Event, EventNotification, EventStream};
pub use query::{Filters, Query};
pub use transport::{RequestSpec, ResponseOutcome, Transport};
