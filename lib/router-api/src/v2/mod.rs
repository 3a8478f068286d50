/// API version v2 of the gateway resources
///
/// Compared to v2beta3, routes gain per-rule timeouts and plugin config
/// references, and upstreams gain host passing policy.

pub mod route;
pub mod upstream;

pub use route::{ApisixRoute, ApisixRouteSpec};
pub use upstream::{ApisixUpstream, ApisixUpstreamSpec};

/// API version string for this module's resources
pub const API_VERSION: &str = "apisix.apache.org/v2";
