//! Error types for OPL2 sequencing and playback

/// Error type for player operations
///
/// Every variant carries only `Copy` data, so raising one on the pulse path
/// never allocates.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerError {
    /// A program change referenced a patch the table does not contain.
    ///
    /// Playback continues with the default patch applied to the channel.
    #[error("Configuration error: patch {index} missing from table, default applied to channel {channel}")]
    Configuration {
        /// Requested program index
        index: u8,
        /// Channel the default patch was applied to
        channel: u8,
    },

    /// The cursor reached the store bound without finding an end-of-stream record.
    ///
    /// Playback halts and all voices are silenced.
    #[error("Bounds error: record at offset {cursor} crosses stream bound {bound}")]
    Bounds {
        /// Offset of the record that could not be read
        cursor: usize,
        /// Readable size of the event store
        bound: usize,
    },

    /// The event store failed to deliver a record.
    #[error("Event store error at offset {cursor}: {kind:?}")]
    Store {
        /// Offset of the failed read
        cursor: usize,
        /// Underlying I/O error kind
        kind: std::io::ErrorKind,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(&'static str),
}

/// Result type for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;
