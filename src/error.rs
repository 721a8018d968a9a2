//! Error types for the container and bit-framing codecs.
//!
//! Each family keeps its own enum with a stable integer code, mirroring
//! the return-code surface the codecs expose to embedders; the CLI and
//! library callers work with the enums directly.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::gf::RsError;

/// Failures of the container pack/unpack paths. All of these are fatal to
/// the run; recoverable conditions (bad slices, failed columns, missing
/// frames) are counted in the statistics instead.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("cannot open input '{0}': {1}")]
    InputOpen(PathBuf, #[source] io::Error),

    #[error("cannot open output '{0}': {1}")]
    OutputOpen(PathBuf, #[source] io::Error),

    #[error("container header truncated")]
    TruncatedHeader,

    #[error("unsupported container: {0}")]
    UnsupportedFormat(String),

    #[error("bad container geometry: {0}")]
    BadGeometry(String),

    #[error(transparent)]
    CodecInit(#[from] RsError),

    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

impl ContainerError {
    /// Stable negative code for embedders keyed on integers.
    pub fn code(&self) -> i32 {
        match self {
            ContainerError::InputOpen(..) => -1,
            ContainerError::OutputOpen(..) => -2,
            ContainerError::TruncatedHeader => -3,
            ContainerError::UnsupportedFormat(_) => -4,
            ContainerError::BadGeometry(_) => -5,
            ContainerError::CodecInit(_) => -6,
            ContainerError::Io(_) => -8,
            ContainerError::InvalidParams(_) => -101,
        }
    }
}

/// Failures of the bit wrap/unwrap paths.
#[derive(Debug, Error)]
pub enum WrapError {
    #[error("cannot open input '{0}': {1}")]
    InputOpen(PathBuf, #[source] io::Error),

    #[error("cannot open output '{0}': {1}")]
    OutputOpen(PathBuf, #[source] io::Error),

    #[error("flag pattern contains a character other than '0' or '1'")]
    InvalidPattern,

    #[error("flag pattern must not be empty")]
    EmptyPattern,

    #[error("ratio divisor must be positive, got {0}")]
    InvalidRatio(f64),

    #[error("input file is empty")]
    EmptyInput,

    #[error("flag pattern not found before end of stream")]
    FlagNotFound,

    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

impl WrapError {
    /// Stable negative code for embedders keyed on integers.
    pub fn code(&self) -> i32 {
        match self {
            WrapError::InputOpen(..) => -1,
            WrapError::OutputOpen(..) => -2,
            WrapError::InvalidPattern | WrapError::EmptyPattern => -3,
            WrapError::InvalidRatio(_) | WrapError::EmptyInput | WrapError::FlagNotFound => -4,
            WrapError::Io(_) => -99,
        }
    }
}

/// Umbrella error for callers driving both codecs.
#[derive(Debug, Error)]
pub enum RsctError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Wrap(#[from] WrapError),
}
