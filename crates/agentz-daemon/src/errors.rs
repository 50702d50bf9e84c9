#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("Ingester already running with PID {0}")]
    AlreadyRunning(u32),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Store error: {source}")]
    StoreError {
        #[from]
        source: agentz_store::StoreError,
    },

    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl From<agentz_protocol::CodecError> for DaemonError {
    fn from(error: agentz_protocol::CodecError) -> Self {
        match error {
            agentz_protocol::CodecError::Io { source } => DaemonError::IoError { source },
            agentz_protocol::CodecError::Protocol { message } => {
                DaemonError::ProtocolError(message)
            }
        }
    }
}
