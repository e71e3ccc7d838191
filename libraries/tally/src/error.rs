#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// A missing or malformed user or counter id. Raised before any remote call.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("remote store unavailable ({code}): {message}")]
    RemoteUnavailable { code: String, message: String },
    #[error("operation not supported by this store: {0}")]
    NotImplemented(&'static str),
}

impl SyncError {
    pub fn unavailable(code: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::RemoteUnavailable {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable code, for logs.
    pub fn code(&self) -> &str {
        match self {
            SyncError::InvalidIdentity(_) => "invalid-identity",
            SyncError::RemoteUnavailable { code, .. } => code,
            SyncError::NotImplemented(_) => "unimplemented",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("sign-in rejected: {0}")]
    Rejected(String),
    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] SyncError),
}
