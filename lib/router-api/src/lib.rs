//! Custom resource definitions reconciled by the router controller
//!
//! This library defines the `apisix.apache.org` resources in every schema
//! version the controller can watch:
//! - ApisixRoute: host/path matching rules pointing at Kubernetes Services
//! - ApisixUpstream: load-balancing and retry policy for a Service
//!
//! Both versions share the same status shape (see [`status`]).

pub mod status;
pub mod v2;
pub mod v2beta3;

pub use status::{ApisixStatus, Condition};

/// API group for all gateway resources
pub const API_GROUP: &str = "apisix.apache.org";
