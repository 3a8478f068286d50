//! Process-wide configuration consumed by the status reporter

use crate::error::{CoreError, Result};

/// Read once at startup and immutable for the lifetime of the process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalConfig {
    /// When false, no status, condition or load balancer writes happen
    pub status_updates_enabled: bool,
    /// Address published on Ingress load balancer status
    pub published_address: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            status_updates_enabled: true,
            published_address: None,
        }
    }
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(address) = &self.published_address {
            if address.trim().is_empty() {
                return Err(CoreError::config("publish address must not be empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_published_address_is_fatal() {
        let config = GlobalConfig {
            status_updates_enabled: true,
            published_address: Some(" ".to_string()),
        };
        assert!(matches!(config.validate(), Err(CoreError::FatalConfig(_))));
        assert!(GlobalConfig::default().validate().is_ok());
    }
}
