/// Error taxonomy shared by every provider transport and service.
///
/// Each variant maps to one class of failure so callers (and the fallback
/// wrapper) can decide whether an error is a configuration problem, a
/// transport failure, or a protocol-level fault reported by the peer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Invalid or incomplete configuration (missing API key, missing
    /// required option, bad URL).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The transport could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer rejected our credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A network-level failure on an established transport.
    #[error("network error: {0}")]
    Network(String),

    /// The peer sent something we could not interpret: unexpected event,
    /// malformed JSON, missing expected field.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An error reported by the provider itself (Minimax `task_failed`,
    /// Cartesia `error` frames, gRPC trailer errors, HTTP error bodies).
    #[error("provider error: {0}")]
    Upstream(String),

    /// The provider has not been initialized yet.
    #[error("provider not initialized")]
    NotInitialized,

    /// The streaming client is closed; no further sends are accepted.
    #[error("client is closed")]
    Closed,

    /// The operation exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The operation was cancelled before completion.
    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Maps a gRPC status onto the taxonomy.
    pub fn from_grpc_status(status: &tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Unauthenticated => {
                ProviderError::AuthenticationFailed(status.message().to_string())
            }
            tonic::Code::PermissionDenied => ProviderError::AuthenticationFailed(format!(
                "permission denied: {}",
                status.message()
            )),
            tonic::Code::InvalidArgument => {
                ProviderError::Configuration(status.message().to_string())
            }
            tonic::Code::Unavailable => {
                ProviderError::Network(format!("service unavailable: {}", status.message()))
            }
            tonic::Code::DeadlineExceeded => ProviderError::Timeout(status.message().to_string()),
            tonic::Code::Cancelled => ProviderError::Cancelled,
            other => ProviderError::Upstream(format!("gRPC error {other:?}: {}", status.message())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grpc_status_mapping() {
        let status = tonic::Status::unauthenticated("bad key");
        assert!(matches!(
            ProviderError::from_grpc_status(&status),
            ProviderError::AuthenticationFailed(_)
        ));

        let status = tonic::Status::unavailable("down");
        assert!(matches!(
            ProviderError::from_grpc_status(&status),
            ProviderError::Network(_)
        ));

        let status = tonic::Status::internal("boom");
        assert!(matches!(
            ProviderError::from_grpc_status(&status),
            ProviderError::Upstream(_)
        ));
    }
}
