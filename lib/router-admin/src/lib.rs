//! Data-plane administrative API integration
pub mod client;

pub use client::{AdminClient, AdminConfig};
