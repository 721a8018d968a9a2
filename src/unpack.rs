//! Container decoder: resynchronizing parse, slice reassembly, per-column
//! erasure decode and quality statistics.
//!
//! Phase A scans the stream for frame and slice magics with a 4-byte
//! sliding window, so records may arrive in any order with arbitrary
//! garbage between them. Phase B decodes frames in index order, deriving
//! erasure positions from the CRC-16 side tables and from the short last
//! frame, and applies the configured padding policy to columns the codec
//! gives up on. Recoverable damage never aborts the run; only header,
//! format and output I/O failures do.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::control::{self, ContainerStats};
use crate::crc::{crc16, crc32};
use crate::error::ContainerError;
use crate::format::{
    compute_pad, payload_len, scatter_payload, FrameHeader, GlobalHeader, PadMode, SliceHeader,
    FORMAT_VERSION, FRAME_BYTES, FRAME_MAGIC, GLOBAL_MAGIC, K_SHARDS, MAX_R, SHARD_LEN,
    SLICE_MAGIC,
};
use crate::gf::ReedSolomon;
use crate::RunStatus;

/// Reassembly buffer for one frame; allocated the first time a header or
/// slice for the frame shows up.
struct FrameSlot {
    data_len: u16,
    have_hdr: bool,
    crc32_data: u32,
    crc32_par: u32,
    data: Vec<u8>,
    par: Vec<u8>,
    /// Raw little-endian CRC-16 tables as they sit on the wire.
    crc_d: Vec<u8>,
    crc_p: Vec<u8>,
    crc_d_filled: usize,
    crc_p_filled: usize,
}

impl FrameSlot {
    fn new(r: usize, data_len: u16) -> Self {
        Self {
            data_len,
            have_hdr: false,
            crc32_data: 0,
            crc32_par: 0,
            data: vec![0u8; FRAME_BYTES],
            par: vec![0u8; r * SHARD_LEN],
            crc_d: vec![0u8; K_SHARDS * 2],
            crc_p: vec![0u8; r * 2],
            crc_d_filled: 0,
            crc_p_filled: 0,
        }
    }
}

/// Unpack `container` to `output` with the RAW padding policy.
pub fn unpack_container(
    container: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<RunStatus, ContainerError> {
    unpack_container_ex(container, output, PadMode::Raw)
}

/// Unpack with an explicit padding policy for unrecoverable columns.
///
/// The statistics of the run are retrievable afterwards through
/// [`crate::control::last_unpack_stats`], including after a fatal error,
/// populated up to the point of termination.
pub fn unpack_container_ex(
    container: impl AsRef<Path>,
    output: impl AsRef<Path>,
    pad_mode: PadMode,
) -> Result<RunStatus, ContainerError> {
    let mut stats = ContainerStats {
        pad_mode_used: pad_mode,
        ..ContainerStats::default()
    };
    let res = unpack_inner(container.as_ref(), output.as_ref(), pad_mode, &mut stats);
    control::store_stats(&stats);
    res
}

fn unpack_inner(
    container: &Path,
    output: &Path,
    pad_mode: PadMode,
    stats: &mut ContainerStats,
) -> Result<RunStatus, ContainerError> {
    let fin =
        File::open(container).map_err(|e| ContainerError::InputOpen(container.into(), e))?;
    let mut reader = BufReader::with_capacity(1 << 20, fin);
    let fout =
        File::create(output).map_err(|e| ContainerError::OutputOpen(output.into(), e))?;
    let mut writer = BufWriter::with_capacity(1 << 20, fout);

    let mut hdr_buf = [0u8; GlobalHeader::LEN];
    reader
        .read_exact(&mut hdr_buf)
        .map_err(|_| ContainerError::TruncatedHeader)?;
    let gh = GlobalHeader::decode(&hdr_buf);
    if gh.magic != GLOBAL_MAGIC || gh.version != FORMAT_VERSION {
        return Err(ContainerError::UnsupportedFormat(format!(
            "magic {:#010x}, version {}",
            gh.magic, gh.version
        )));
    }
    if gh.k as usize != K_SHARDS || gh.shard_len as usize != SHARD_LEN {
        return Err(ContainerError::BadGeometry(format!(
            "k={}, shard_len={}",
            gh.k, gh.shard_len
        )));
    }
    let r = gh.r as usize;
    if r == 0 || r > MAX_R {
        return Err(ContainerError::BadGeometry(format!("r={}", gh.r)));
    }
    if gh.pad as usize != compute_pad(r) {
        return Err(ContainerError::BadGeometry(format!(
            "pad={} for r={}",
            gh.pad, gh.r
        )));
    }
    let frames = gh.frame_count;
    if frames > u64::from(u32::MAX) {
        return Err(ContainerError::BadGeometry(format!(
            "frame_count={frames}"
        )));
    }

    let rs = ReedSolomon::new(r, gh.pad as usize)?;

    let par_bytes = r * SHARD_LEN;
    let crc_d_bytes = K_SHARDS * 2;
    let crc_p_bytes = r * 2;
    let pay = payload_len(r);

    *stats = ContainerStats::for_geometry(frames, r as u64, pad_mode);
    if gh.slice_bytes != 0 {
        stats.slices_total_est = frames * (pay as u64).div_ceil(gh.slice_bytes as u64);
    }
    let total_slices = stats.slices_total_est;
    debug!(frames, r, original_size = gh.original_size, "unpacking container");

    let mut slots: Vec<Option<FrameSlot>> = std::iter::repeat_with(|| None)
        .take(frames as usize)
        .collect();
    let mut done_slices = 0u64;
    let mut canceled = false;

    // Phase A: collect records, resynchronizing on the magics.
    loop {
        if control::cancel_requested() {
            canceled = true;
            break;
        }
        let magic = match find_next_magic(&mut reader)? {
            Some(m) => m,
            None => break,
        };
        if magic == FRAME_MAGIC {
            let mut tail = [0u8; FrameHeader::TAIL];
            if !read_exact_or_eof(&mut reader, &mut tail)? {
                break;
            }
            let fh = FrameHeader::decode_tail(&tail);
            if fh.index >= frames
                || fh.parity_len as usize != par_bytes
                || fh.data_len as usize > FRAME_BYTES
            {
                continue;
            }
            let slot = slots[fh.index as usize].get_or_insert_with(|| FrameSlot::new(r, 0));
            slot.data_len = fh.data_len;
            slot.have_hdr = true;
            slot.crc32_data = fh.crc32_data;
            slot.crc32_par = fh.crc32_par;
        } else {
            let mut tail = [0u8; SliceHeader::TAIL];
            if !read_exact_or_eof(&mut reader, &mut tail)? {
                break;
            }
            let sh = SliceHeader::decode_tail(&tail);
            if sh.size == 0 {
                continue;
            }
            let mut buf = vec![0u8; sh.size as usize];
            if !read_exact_or_eof(&mut reader, &mut buf)? {
                break;
            }
            if crc32(&buf) != sh.crc32_slice {
                stats.slices_bad += 1;
                continue;
            }
            stats.slices_ok += 1;

            if sh.frame_index < frames {
                let slot = slots[sh.frame_index as usize].get_or_insert_with(|| {
                    let dl = if sh.frame_index == frames - 1 {
                        (gh.original_size)
                            .saturating_sub((frames - 1) * FRAME_BYTES as u64)
                            .min(FRAME_BYTES as u64) as u16
                    } else {
                        FRAME_BYTES as u16
                    };
                    FrameSlot::new(r, dl)
                });
                let landed = scatter_payload(
                    &mut [
                        &mut slot.data,
                        &mut slot.par,
                        &mut slot.crc_d,
                        &mut slot.crc_p,
                    ],
                    sh.offset as usize,
                    &buf,
                );
                slot.crc_d_filled += landed[2];
                slot.crc_p_filled += landed[3];
            }
            done_slices += 1;
            control::report_progress(done_slices, total_slices);
        }
    }

    // Phase B: decode frames in order and emit the original-size prefix.
    let mut written = 0u64;
    let mut total_written = 0u64;
    let mut residual_bad = 0u64;
    let coeff = control::residual_coeff();
    let mut code = [0u8; K_SHARDS + MAX_R];
    let mut eras_data: Vec<usize> = Vec::with_capacity(K_SHARDS);
    let mut eras_par: Vec<usize> = Vec::with_capacity(MAX_R);
    let mut erasures: Vec<usize> = Vec::with_capacity(MAX_R);

    for idx in 0..frames as usize {
        if canceled || control::cancel_requested() {
            canceled = true;
            break;
        }
        let to_write = (gh.original_size - written).min(FRAME_BYTES as u64) as usize;

        let (before, rest) = slots.split_at_mut(idx);
        let slot = match rest[0].as_mut() {
            None => {
                // Nothing at all arrived for this frame.
                write_zeros(&mut writer, to_write)?;
                written += to_write as u64;
                total_written += to_write as u64;
                continue;
            }
            Some(s) => s,
        };

        eras_data.clear();
        eras_par.clear();
        let dlen = (slot.data_len as usize).min(FRAME_BYTES);
        if dlen < FRAME_BYTES {
            // Shards past the end of a short frame are known-zero padding;
            // a partially filled boundary shard is suspect as well.
            let full = dlen / SHARD_LEN;
            let rem = dlen % SHARD_LEN;
            let cutoff = full + usize::from(rem != 0);
            for j in cutoff..K_SHARDS {
                eras_data.push(j);
            }
            if rem != 0 {
                eras_data.push(full);
            }
        }

        let has_crc_tables =
            slot.crc_d_filled >= crc_d_bytes && slot.crc_p_filled >= crc_p_bytes;
        if has_crc_tables {
            for j in 0..K_SHARDS {
                let stored = u16::from_le_bytes([slot.crc_d[j * 2], slot.crc_d[j * 2 + 1]]);
                if crc16(&slot.data[j * SHARD_LEN..(j + 1) * SHARD_LEN]) != stored {
                    eras_data.push(j);
                }
            }
            for j in 0..r {
                let stored = u16::from_le_bytes([slot.crc_p[j * 2], slot.crc_p[j * 2 + 1]]);
                if crc16(&slot.par[j * SHARD_LEN..(j + 1) * SHARD_LEN]) != stored {
                    eras_par.push(K_SHARDS + j);
                }
            }
        }

        // Erasure budget is r positions: data candidates first, then
        // parity, in the order they were found.
        erasures.clear();
        for &e in eras_data.iter().chain(eras_par.iter()) {
            if erasures.len() == r {
                break;
            }
            erasures.push(e);
        }

        for i in 0..SHARD_LEN {
            for j in 0..K_SHARDS {
                code[j] = slot.data[j * SHARD_LEN + i];
            }
            for j in 0..r {
                code[K_SHARDS + j] = slot.par[j * SHARD_LEN + i];
            }
            if !erasures.is_empty() {
                stats.used_erasures_cols += 1;
            }
            match rs.decode(&mut code[..K_SHARDS + r], &erasures) {
                Some(n) => {
                    stats.corrected_symbols += n as u64;
                    for j in 0..K_SHARDS {
                        slot.data[j * SHARD_LEN + i] = code[j];
                    }
                }
                None => {
                    stats.rs_fail_columns += 1;
                    match pad_mode {
                        PadMode::Raw => {}
                        PadMode::Zero => {
                            for j in 0..K_SHARDS {
                                slot.data[j * SHARD_LEN + i] = 0;
                            }
                        }
                        PadMode::Temporal => {
                            if let Some(prev) = before.last().and_then(|p| p.as_ref()) {
                                for j in 0..K_SHARDS {
                                    let id = j * SHARD_LEN + i;
                                    slot.data[id] = prev.data[id];
                                }
                            } else {
                                for j in 0..K_SHARDS {
                                    slot.data[j * SHARD_LEN + i] = 0;
                                }
                            }
                        }
                    }
                }
            }
        }

        // Post-decode residual observation over the CRC-16 tables.
        if has_crc_tables {
            for j in 0..K_SHARDS {
                let stored = u16::from_le_bytes([slot.crc_d[j * 2], slot.crc_d[j * 2 + 1]]);
                if crc16(&slot.data[j * SHARD_LEN..(j + 1) * SHARD_LEN]) != stored {
                    residual_bad += (SHARD_LEN as f64 * coeff) as u64;
                }
            }
        }
        if slot.have_hdr {
            if crc32(&slot.data) != slot.crc32_data {
                warn!(frame = idx, "data block CRC-32 still mismatching after decode");
            }
            if crc32(&slot.par) != slot.crc32_par {
                debug!(frame = idx, "parity block arrived damaged");
            }
        }

        if to_write > 0 {
            writer.write_all(&slot.data[..to_write])?;
            written += to_write as u64;
            total_written += to_write as u64;
        }
    }

    writer.flush()?;

    stats.ber_est = if total_written > 0 && residual_bad > 0 {
        residual_bad as f64 / total_written as f64
    } else {
        0.0
    };
    debug!(
        slices_ok = stats.slices_ok,
        slices_bad = stats.slices_bad,
        rs_fail_columns = stats.rs_fail_columns,
        canceled,
        "unpack finished"
    );

    Ok(if canceled {
        RunStatus::Canceled
    } else {
        RunStatus::Completed
    })
}

/// Slide a 4-byte window over the stream until a frame or slice magic
/// lines up. `None` at end of input.
fn find_next_magic<R: Read>(r: &mut R) -> io::Result<Option<u32>> {
    let mut win = [0u8; 4];
    if !read_exact_or_eof(r, &mut win)? {
        return Ok(None);
    }
    loop {
        let v = u32::from_le_bytes(win);
        if v == FRAME_MAGIC || v == SLICE_MAGIC {
            return Ok(Some(v));
        }
        let mut byte = [0u8; 1];
        if !read_exact_or_eof(r, &mut byte)? {
            return Ok(None);
        }
        win.rotate_left(1);
        win[3] = byte[0];
    }
}

/// Like `read_exact` but reports a clean end-of-input as `false` instead
/// of an error, including mid-buffer truncation.
fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(true)
}

fn write_zeros<W: Write>(w: &mut W, mut n: usize) -> io::Result<()> {
    let zeros = [0u8; 4096];
    while n > 0 {
        let take = n.min(zeros.len());
        w.write_all(&zeros[..take])?;
        n -= take;
    }
    Ok(())
}
