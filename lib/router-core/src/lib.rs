//! Status reconciliation core for the gateway ingress controller
//!
//! This library provides:
//! - Versioned resource adapter normalizing route/upstream schema versions
//! - Sync executor driving the data-plane through the [`DataPlane`] trait
//! - Status reporter writing conditions and load balancer addresses
//! - Work queue and reconciliation controller with per-key serialization

pub mod adapter;
pub mod backoff;
pub mod condition;
pub mod config;
pub mod controller;
pub mod dataplane;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod reporter;
pub mod resource;
pub mod store;

#[cfg(test)]
mod testing;

pub use adapter::{normalize, NormalizedResource};
pub use backoff::BackoffPolicy;
pub use config::GlobalConfig;
pub use controller::{Controller, Phase};
pub use dataplane::{DataPlane, RouteObject, UpstreamObject};
pub use error::{CoreError, Result};
pub use executor::{SyncExecutor, SyncOutcome};
pub use metrics::ControllerMetrics;
pub use registry::SyncRegistry;
pub use reporter::{ReportOutcome, StatusReporter};
pub use resource::{
    RawResource, ResourceKey, ResourceKind, ResourceStatus, SchemaVersion, StoredResource,
};
pub use store::{ResourceStore, StatusWrite};
