//! Process-wide control surface: progress reporting, cooperative
//! cancellation, the residual-BER coefficient, decode statistics and the
//! last bit-unwrap flag positions.
//!
//! Everything here is a simple atomic or a mutex-guarded slot. Concurrent
//! pack/unpack calls are not supported; hosts serialize them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::format::{PadMode, K_SHARDS, SHARD_LEN};

/// Progress observer: `(done, total)` in slice counts.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// IEEE-754 bits of the default residual coefficient 0.40.
const DEFAULT_RESIDUAL_BITS: u64 = 0x3FD9_9999_9999_999A;

static PROGRESS: Mutex<Option<ProgressFn>> = Mutex::new(None);
static CANCEL: AtomicBool = AtomicBool::new(false);
static RESIDUAL_COEFF: AtomicU64 = AtomicU64::new(DEFAULT_RESIDUAL_BITS);
static LAST_START_FLAG_POS: AtomicU64 = AtomicU64::new(0);
static LAST_END_FLAG_POS: AtomicU64 = AtomicU64::new(0);
static LAST_STATS: Mutex<Option<ContainerStats>> = Mutex::new(None);

/// Quality metrics of the most recent unpack run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContainerStats {
    pub frames_total: u64,
    pub slices_total_est: u64,
    pub slices_ok: u64,
    pub slices_bad: u64,
    /// `SHARD_LEN * frames_total`.
    pub codewords_total: u64,
    /// `(k + r) * codewords_total`.
    pub symbols_total: u64,
    /// `k * codewords_total`.
    pub data_symbols_total: u64,
    pub corrected_symbols: u64,
    pub used_erasures_cols: u64,
    pub rs_fail_columns: u64,
    pub pad_mode_used: PadMode,
    /// Retained for record-layout compatibility; always 0.
    pub ser_rs: f64,
    /// Residual bad-byte estimate over bytes written.
    pub ber_est: f64,
}

impl ContainerStats {
    pub(crate) fn for_geometry(frames: u64, r: u64, pad_mode: PadMode) -> Self {
        let codewords = SHARD_LEN as u64 * frames;
        Self {
            frames_total: frames,
            codewords_total: codewords,
            symbols_total: (K_SHARDS as u64 + r) * codewords,
            data_symbols_total: K_SHARDS as u64 * codewords,
            pad_mode_used: pad_mode,
            ..Self::default()
        }
    }
}

/// Install (or clear) the progress callback.
pub fn set_progress_cb(cb: Option<ProgressFn>) {
    *PROGRESS.lock().unwrap() = cb;
}

pub(crate) fn report_progress(done: u64, total: u64) {
    if let Some(cb) = PROGRESS.lock().unwrap().as_ref() {
        cb(done, total);
    }
}

/// Raise or clear the cooperative cancellation flag. Running pack/unpack
/// loops observe it at their next safe boundary.
pub fn request_cancel(yes: bool) {
    CANCEL.store(yes, Ordering::SeqCst);
}

pub(crate) fn cancel_requested() -> bool {
    CANCEL.load(Ordering::SeqCst)
}

/// Set the residual-BER coefficient, clamped into [0, 1].
pub fn set_residual_coeff(v: f64) {
    let v = v.clamp(0.0, 1.0);
    RESIDUAL_COEFF.store(v.to_bits(), Ordering::SeqCst);
}

pub(crate) fn residual_coeff() -> f64 {
    f64::from_bits(RESIDUAL_COEFF.load(Ordering::SeqCst))
}

/// Statistics of the most recent unpack, if one has run.
pub fn last_unpack_stats() -> Option<ContainerStats> {
    LAST_STATS.lock().unwrap().clone()
}

pub(crate) fn store_stats(stats: &ContainerStats) {
    *LAST_STATS.lock().unwrap() = Some(stats.clone());
}

/// 1-based bit position where the start flag of the last unwrap began;
/// 0 when no run found one.
pub fn last_start_flag_pos() -> u64 {
    LAST_START_FLAG_POS.load(Ordering::SeqCst)
}

/// 1-based bit position where the end flag of the last unwrap began;
/// 0 when no run found one.
pub fn last_end_flag_pos() -> u64 {
    LAST_END_FLAG_POS.load(Ordering::SeqCst)
}

pub(crate) fn reset_flag_positions() {
    LAST_START_FLAG_POS.store(0, Ordering::SeqCst);
    LAST_END_FLAG_POS.store(0, Ordering::SeqCst);
}

pub(crate) fn set_start_flag_pos(pos: u64) {
    LAST_START_FLAG_POS.store(pos, Ordering::SeqCst);
}

pub(crate) fn set_end_flag_pos(pos: u64) {
    LAST_END_FLAG_POS.store(pos, Ordering::SeqCst);
}
