/// Failure modes of the bridge.
///
/// None of these reach subscribers. They are logged and the bridge keeps
/// running in whatever degraded state results.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("cannot reach controller at {addr}: {source}")]
    ConnectionFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("controller closed the connection")]
    ConnectionClosed,
    #[error("controller i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed subscriber payload: {0}")]
    MalformedPayload(String),
}

impl BridgeError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailure { .. } => "connection_failure",
            Self::ConnectionClosed => "connection_closed",
            Self::Io(_) => "io",
            Self::MalformedPayload(_) => "malformed_payload",
        }
    }
}
