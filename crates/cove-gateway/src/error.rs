use tracing::error;

/// Failure taxonomy for gateway handlers. Every variant except `Internal`
/// carries a short, action-specific string suitable for direct display;
/// `Internal` is logged with full detail and shown to the client only as a
/// generic per-operation message.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Referenced chat/channel/message/user/role does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Authenticated but not allowed; the connection stays open.
    #[error("{0}")]
    Forbidden(String),
    /// Malformed or invalid input; nothing was mutated.
    #[error("{0}")]
    Invalid(String),
    /// Duplicate action, rejected idempotently.
    #[error("{0}")]
    Conflict(String),
    /// Persistence or backend failure. Never leaked to the client.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// The string that goes into the `{error}` ack for operation `op`,
    /// logging the original cause server-side for internal failures.
    pub fn client_message(&self, op: &str) -> String {
        match self {
            Self::Internal(source) => {
                error!("internal error during {op}: {source:#}");
                format!("Server error during {op}.")
            }
            other => other.to_string(),
        }
    }
}
