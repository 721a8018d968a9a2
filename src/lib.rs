//! Reed-Solomon resilient container and bit-level framing codec for
//! lossy, offline channels.
//!
//! Two cooperating codecs:
//!
//! - the **container codec** ([`pack_container`] / [`unpack_container`])
//!   protects a file with column-wise systematic RS(192+r, 192) parity
//!   over GF(2^8), per-shard CRC-16 side tables, per-block CRC-32 tags
//!   and interleaved, individually CRC-32-protected slices, so a reader
//!   can reassemble and repair the payload from a damaged stream;
//! - the **bit wrap codec** ([`wrap_file_bits`] / [`unwrap_file_bits`])
//!   frames a file's bit stream between arbitrary bit-precise sentinel
//!   flags with random dummy bits on both sides, recovered by streaming
//!   KMP over the bit sequence.
//!
//! Process-wide knobs (progress callback, cancellation, residual-BER
//! coefficient, last-run statistics and flag positions) live in
//! [`control`].

pub mod bitio;
pub mod control;
pub mod crc;
pub mod error;
pub mod format;
pub mod gf;
pub mod io_utils;
pub mod kmp;
pub mod pack;
pub mod unpack;
pub mod unwrap;
pub mod wrap;

pub use control::{
    last_end_flag_pos, last_start_flag_pos, last_unpack_stats, request_cancel, set_progress_cb,
    set_residual_coeff, ContainerStats, ProgressFn,
};
pub use error::{ContainerError, RsctError, WrapError};
pub use format::{PadMode, FRAME_BYTES, K_SHARDS, MAX_R, SHARD_LEN};
pub use gf::ReedSolomon;
pub use pack::{pack_container, pack_container_ex, PackOptions};
pub use unpack::{unpack_container, unpack_container_ex};
pub use unwrap::unwrap_file_bits;
pub use wrap::{wrap_file_bits, wrap_file_bits_ratio};

/// Outcome of a pack or unpack run that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The whole input was processed.
    Completed,
    /// Cancellation was observed at a loop boundary; the output holds a
    /// partial result.
    Canceled,
}
