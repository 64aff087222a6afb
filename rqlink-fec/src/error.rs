//! Error type shared by every handle operation.

use thiserror::Error;

/// Errors surfaced by encoder/decoder handles, the notifier and the factories.
#[derive(Debug, Error)]
pub enum Error {
    /// The OTI was rejected or the engine could not be set up.
    #[error("construction failed: {0}")]
    Construction(String),
    /// The handle has been closed, or is closing.
    #[error("handle already closed")]
    AlreadyClosed,
    /// The queue is already subscribed to this decoder.
    #[error("ready-block queue already registered")]
    AlreadyRegistered,
    /// The queue was never subscribed, or has been removed.
    #[error("ready-block queue not registered")]
    NotRegistered,
    /// The engine returned fewer bytes than the block or object holds.
    #[error("decode failure: expected {expected} bytes, engine returned {actual}")]
    ShortRead {
        /// Bytes the block or object holds.
        expected: usize,
        /// Bytes the engine wrote.
        actual: usize,
    },
    /// The caller's buffer cannot hold the result.
    #[error("buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall {
        /// Required length.
        needed: usize,
        /// Length supplied.
        actual: usize,
    },
    /// SBN is not below Z.
    #[error("source block {sbn} out of range ({num_blocks} blocks)")]
    BlockOutOfRange {
        /// Offending block number.
        sbn: u8,
        /// Z.
        num_blocks: u8,
    },
    /// ESI is not below the block's usable symbol count.
    #[error("encoding symbol id {0} out of range")]
    SymbolIdOutOfRange(u32),
    /// A submitted symbol is not exactly one symbol long.
    #[error("symbol length {actual} does not match symbol size {expected}")]
    SymbolLength {
        /// T.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },
    /// The engine could not produce the requested symbol, e.g. the block was freed.
    #[error("engine produced no symbol for block {sbn} esi {esi}")]
    Encode {
        /// Block number.
        sbn: u8,
        /// Encoding symbol id.
        esi: u32,
    },
    /// Decoder construction outside a tokio runtime without an explicit handle.
    #[error("no tokio runtime available for ready-block delivery")]
    NoRuntime,
}

/// Result alias for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Shorthand for [`Error::Construction`].
    pub fn construction<S: Into<String>>(msg: S) -> Self {
        Error::Construction(msg.into())
    }
}
