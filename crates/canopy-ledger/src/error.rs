//! Ledger and chain errors

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Ledger API key not configured
    #[error("ledger credentials not configured")]
    MissingCredentials,

    /// Network failure talking to the ledger service or RPC node
    #[error("ledger transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not have the expected shape
    #[error("ledger response decode error: {0}")]
    Decode(String),

    /// Reading the certificate image failed
    #[error("certificate image error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON-RPC error object
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl LedgerError {
    /// Whether a retry later could plausibly succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Rpc { .. } => true,
            Self::MissingCredentials | Self::Decode(_) | Self::Io(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_errors_are_retryable() {
        let err = LedgerError::Rpc {
            code: -32000,
            message: "header not found".into(),
        };
        assert!(err.is_retryable());
        assert!(!LedgerError::MissingCredentials.is_retryable());
        assert_eq!(err.to_string(), "rpc error -32000: header not found");
    }
}
