use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChordError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to join ring: {0}")]
    JoinFailed(String),

    #[error("Remote peer failed: {0}")]
    RemoteFailure(String),
}

impl ChordError {
    /// True when the error means the peer could not be reached at all, as
    /// opposed to a peer that answered with a rejection.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ChordError::Network(NetworkError::PeerUnreachable(_)))
    }
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("gRPC server error: {0}")]
    Grpc(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("Malformed peer descriptor: {0}")]
    MalformedPeer(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Protocol violation: unknown opcode {0}")]
    ProtocolViolation(u32),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    Invalid(String),
}
