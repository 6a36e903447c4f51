use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("TYPE_ALREADY_KNOWN: {0}")]
    AlreadyKnown(String),
    #[error("UNKNOWN_TYPE: {0}")]
    UnknownType(String),
    #[error("DUPLICATE_ROUTE: {0}")]
    DuplicateRoute(String),
    #[error("UNKNOWN_SCHEME: {0}")]
    UnknownScheme(String),
    #[error("UNKNOWN_VIEW: {0}")]
    UnknownView(String),
    #[error("INVALID_CONFIG: {0}")]
    Config(String),
    #[error("UNSUPPORTED_EXTENSION: {0}")]
    UnsupportedExtension(String),
    #[error("NO_SUCH_ROUTE: {0}")]
    NoSuchRoute(String),
    #[error("AMBIGUOUS_PERSPECTIVE: {0}")]
    AmbiguousPerspective(String),
    #[error("INVALID_IDENTITY: {0}")]
    InvalidIdentity(String),
    #[error("MISSING_FIELD: {0}")]
    MissingField(String),
    #[error("CODEC_FAILURE: {0}")]
    Codec(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl StoreError {
    /// Errors raised while setting up a `Db`, as opposed to errors raised by
    /// a particular read, write or walk.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::AlreadyKnown(_) | Self::DuplicateRoute(_) | Self::UnknownScheme(_) | Self::Config(_)
        )
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<walkdir::Error> for StoreError {
    fn from(value: walkdir::Error) -> Self {
        match value.path() {
            Some(path) => Self::Io(format!("{}: {}", path.to_string_lossy(), value)),
            None => Self::Io(value.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value.to_string())
    }
}

impl From<serde_yaml::Error> for StoreError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Codec(value.to_string())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(value: anyhow::Error) -> Self {
        Self::Codec(value.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::StoreError;

    #[test]
    fn messages_carry_error_codes() {
        let error = StoreError::DuplicateRoute("item/*/*".to_string());
        assert_eq!(error.to_string(), "DUPLICATE_ROUTE: item/*/*");
        assert!(error.is_configuration());
        assert!(!StoreError::NoSuchRoute("x".to_string()).is_configuration());
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = StoreError::from(io);
        assert!(error.to_string().starts_with("IO_FAILURE"));
    }
}
