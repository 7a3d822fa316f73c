use thiserror::Error;

/// Errors surfaced by the RaptorQ-family decoder and its cache, per the
/// semantic taxonomy: most are local-reject-and-continue, a few are fatal
/// for the owning fingerprint, and invariant breaches panic instead of
/// returning here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("encoding symbol id {esi} invalid (size {size}, expected {expected})")]
    InvalidSymbol {
        esi: u32,
        size: usize,
        expected: usize,
    },
    #[error("encoding symbol id {0} already received")]
    DuplicateSymbol(u32),
    #[error("K={0} out of range [1, 8192]")]
    ParameterOutOfRange(u32),
    #[error("reconstruction failed: {0}")]
    Reconstruction(String),
    #[error("reconstruction attempted before decode completed")]
    DecodeNotDone,
}

/// Errors at the framing boundary (chunk header parsing, TCP length-prefixed
/// framing). These never leak into decoder state -- the adapter closes the
/// stream or drops the chunk and moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("truncated at offset {offset}: need {needed} bytes, have {available}")]
    Truncation {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("magic mismatch: expected {expected:#x}, got {got:#x}")]
    MagicMismatch { expected: u32, got: u32 },
    #[error("read timed out")]
    Timeout,
}
