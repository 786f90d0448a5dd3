//! route-sync - continuous route reconciliation between Kubernetes and Cloud Foundry
//!
//! route-sync discovers routable backends from a Kubernetes cluster and advertises
//! them to the Cloud Foundry routing tier. Services opt in with a marker label:
//! `tcp-route-sync: <frontend-port>` registers a Layer-4 route through the routing
//! API, `http-route-sync: <hostname>` registers a Layer-7 route through the
//! gorouter's NATS registration channel.
//!
//! The desired route set is rebuilt from scratch on every cycle; the downstream
//! systems expire stale advertisements on their own (TTL on the TCP side). There is
//! no diffing and no cross-cycle state.
//!
//! # Modules
//!
//! - [`route`] - Route data model and the `Source`/`Router` seams
//! - [`kubernetes`] - Route discovery from namespaces, nodes, and labeled services
//! - [`cloudfoundry`] - Route publication over NATS and the routing API
//! - [`uaa`] - Client-credentials token fetching with a cached bearer token
//! - [`pooler`] - The cancellable fixed-interval reconciliation loop
//! - [`app`] - Wiring and lifecycle (bus connect, interrupt handling)
//! - [`config`] - YAML configuration loading and validation
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod app;
pub mod cloudfoundry;
pub mod config;
pub mod error;
pub mod kubernetes;
pub mod pooler;
pub mod route;
pub mod uaa;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
