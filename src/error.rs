use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifehubError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },
    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl LifehubError {
    /// Transient failures are worth a retry from the caller; the rest are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(_) | Self::Timeout { .. } | Self::Http(_) => true,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LifehubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_transience() {
        let err = LifehubError::Config("x".to_string());
        assert!(format!("{err}").contains("configuration error"));
        assert!(!err.is_transient());

        let err = LifehubError::Timeout {
            operation: "meals".to_string(),
            seconds: 10,
        };
        assert_eq!(format!("{err}"), "meals timed out after 10s");
        assert!(err.is_transient());

        let err = LifehubError::Upstream {
            status: 401,
            message: "invalid key".to_string(),
        };
        assert!(format!("{err}").contains("401"));
        assert!(!err.is_transient());
        assert!(LifehubError::Upstream {
            status: 429,
            message: String::new()
        }
        .is_transient());
        assert!(!LifehubError::NotAuthenticated.is_transient());
    }
}
