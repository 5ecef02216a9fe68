//! The nine error kinds from spec sec. 7, as a `thiserror` enum consumed
//! internally by editors; the CLI surface converts everything to
//! `anyhow::Error` at the dispatch boundary (teacher's existing idiom).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImgError {
    #[error("bad magic: expected {expected}, got {actual}")]
    BadMagic { expected: String, actual: String },

    #[error("truncated input: needed {needed} bytes, have {have}")]
    Truncated { needed: u64, have: u64 },

    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },

    #[error("invalid field `{field}`: {detail}")]
    InvalidField { field: String, detail: String },

    #[error("allocation failed: {0}")]
    AllocFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("format limit exceeded: {0}")]
    FormatLimit(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, ImgError>;
