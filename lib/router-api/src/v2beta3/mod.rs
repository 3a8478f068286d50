/// API version v2beta3 of the gateway resources

pub mod route;
pub mod upstream;

pub use route::{ApisixRoute, ApisixRouteSpec};
pub use upstream::{ApisixUpstream, ApisixUpstreamSpec};

/// API version string for this module's resources
pub const API_VERSION: &str = "apisix.apache.org/v2beta3";
