use thiserror::Error;

/// Everything that can go wrong while loading or querying a container.
///
/// Load-time variants abort construction of a [`crate::Dictionary`];
/// query-time variants are returned per call and leave the dictionary usable.
#[derive(Debug, Error)]
pub enum MdictError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch in {context}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        context: &'static str,
        expected: u32,
        actual: u32,
    },

    /// Decoded length disagrees with the declared length.
    #[error("size mismatch in {context}: expected {expected} bytes, found {found}")]
    SizeMismatch {
        context: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("key block sizes add up to {found}, header declares {expected}")]
    BlockSizeMismatch { expected: u64, found: u64 },

    #[error("key count mismatch in {context}: expected {expected}, found {found}")]
    KeyCountMismatch {
        context: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("record index ends at {found}, expected {expected}")]
    WrongIndexSize { expected: u64, found: u64 },

    #[error("record blocks end at {found}, expected {expected}")]
    WrongIndexPosition { expected: u64, found: u64 },

    #[error("compression method {0} not supported")]
    UnsupportedCompression(u8),

    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    #[error("offset {offset} outside of record stream (0..={limit})")]
    OffsetOutOfRange { offset: u64, limit: u64 },

    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("byte source lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, MdictError>;
