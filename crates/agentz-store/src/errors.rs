use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on stream '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// fsync failed after the write; the event must not be published to
    /// other components because it may not survive a crash.
    #[error("Append to '{path}' is not durable: {source}")]
    AppendNotDurable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode event: {message}")]
    EncodeError { message: String },

    #[error("Stream '{path}' is corrupt at byte {offset}: {message}")]
    CorruptFrame {
        path: PathBuf,
        offset: u64,
        message: String,
    },
}
