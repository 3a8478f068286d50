use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Desired state is malformed; retrying cannot help
    #[error("invalid spec: {0}")]
    Validation(String),

    /// The data-plane was unreachable or rejected the change
    #[error("failed to sync with the data plane: {0}")]
    TransientSync(String),

    /// A status write raced another writer
    #[error("status update conflict: {0}")]
    Conflict(String),

    /// The process cannot start with the given configuration
    #[error("invalid configuration: {0}")]
    FatalConfig(String),

    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] kube::error::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn sync(msg: impl Into<String>) -> Self {
        Self::TransientSync(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::FatalConfig(msg.into())
    }

    /// Condition reason recorded for a resource that failed with this error
    pub fn reason(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "InvalidSpec",
            CoreError::Conflict(_) => "StatusConflict",
            CoreError::FatalConfig(_) => "InvalidConfiguration",
            CoreError::TransientSync(_)
            | CoreError::KubernetesError(_)
            | CoreError::SerializationError(_) => "SyncFailed",
        }
    }

    /// Whether the controller should retry after backoff
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CoreError::Validation(_) | CoreError::FatalConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_not_retryable() {
        let err = CoreError::validation("rule \"r1\" has no backends");
        assert!(!err.is_retryable());
        assert_eq!(err.reason(), "InvalidSpec");
        assert_eq!(err.to_string(), "invalid spec: rule \"r1\" has no backends");
    }

    #[test]
    fn test_sync_is_retryable() {
        let err = CoreError::sync("connection refused");
        assert!(err.is_retryable());
        assert_eq!(err.reason(), "SyncFailed");
        assert!(err.to_string().contains("data plane"));
    }
}
