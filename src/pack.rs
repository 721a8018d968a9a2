//! Container encoder: frames, column-wise parity, CRC sidebands and the
//! interleaved slice sweep.
//!
//! Frames are processed in interleave groups of up to `il_depth` frames.
//! Group layout on disk: every frame header of the group first, then one
//! slice per frame for each payload offset stride, round-robin across the
//! group. Readers must not rely on that ordering; it exists to spread a
//! burst of lost bytes across many frames.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::control;
use crate::crc::{crc16, crc32};
use crate::error::ContainerError;
use crate::format::{
    compute_pad, gather_payload, payload_len, FrameHeader, GlobalHeader, SliceHeader, FRAME_BYTES,
    IL_DEPTH_DEFAULT, K_SHARDS, MAX_R, R_DEFAULT, SHARD_LEN, SLICE_BYTES_DEFAULT,
};
use crate::gf::ReedSolomon;
use crate::RunStatus;

/// Tunables of a pack run. Out-of-range values fall back to the defaults
/// rather than failing, matching the container's embedder contract.
#[derive(Debug, Clone, Copy)]
pub struct PackOptions {
    /// Parity shards per frame, 1..=63.
    pub r: usize,
    /// Frames per interleave group.
    pub il_depth: u16,
    /// Slice size in bytes.
    pub slice_bytes: u16,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            r: R_DEFAULT,
            il_depth: IL_DEPTH_DEFAULT,
            slice_bytes: SLICE_BYTES_DEFAULT,
        }
    }
}

struct PackFrame {
    data: Vec<u8>,
    par: Vec<u8>,
    crc_d: Vec<u8>,
    crc_p: Vec<u8>,
}

/// Pack `input` into a v4 container at `output` with `r` parity shards and
/// default interleaving.
pub fn pack_container(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    r: usize,
) -> Result<RunStatus, ContainerError> {
    pack_container_ex(
        input,
        output,
        PackOptions {
            r,
            ..PackOptions::default()
        },
    )
}

/// Pack with explicit interleave depth and slice size.
pub fn pack_container_ex(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    opts: PackOptions,
) -> Result<RunStatus, ContainerError> {
    let input = input.as_ref();
    let output = output.as_ref();

    let r = if opts.r == 0 || opts.r > MAX_R {
        R_DEFAULT
    } else {
        opts.r
    };
    let il_depth = if opts.il_depth == 0 {
        IL_DEPTH_DEFAULT
    } else {
        opts.il_depth
    };
    let slice_bytes = if opts.slice_bytes == 0 {
        SLICE_BYTES_DEFAULT
    } else {
        opts.slice_bytes
    };

    let rs = ReedSolomon::new(r, compute_pad(r))?;

    let fin = File::open(input).map_err(|e| ContainerError::InputOpen(input.into(), e))?;
    let original_size = fin.metadata()?.len();
    let mut reader = BufReader::with_capacity(1 << 20, fin);
    let fout = File::create(output).map_err(|e| ContainerError::OutputOpen(output.into(), e))?;
    let mut writer = BufWriter::with_capacity(1 << 20, fout);

    let gh = GlobalHeader::new(r as u16, original_size, il_depth, slice_bytes);
    writer.write_all(&gh.encode())?;

    let frames = gh.frame_count;
    let s = slice_bytes as usize;
    let pay = payload_len(r);
    let total_slices = frames * (pay as u64).div_ceil(s as u64);
    debug!(frames, r, il_depth, slice_bytes, "packing container");

    let mut slice_buf = vec![0u8; s];
    let mut done_slices = 0u64;
    let mut canceled = false;
    let mut fbase = 0u64;

    while fbase < frames {
        if control::cancel_requested() {
            canceled = true;
            break;
        }
        let in_grp = (frames - fbase).min(il_depth as u64) as usize;

        let mut group: Vec<PackFrame> = Vec::with_capacity(in_grp);
        for gi in 0..in_grp {
            let fidx = fbase + gi as u64;
            let to_read = if fidx == frames - 1 {
                (original_size - fidx * FRAME_BYTES as u64).min(FRAME_BYTES as u64) as usize
            } else {
                FRAME_BYTES
            };

            let mut data = vec![0u8; FRAME_BYTES];
            read_fill(&mut reader, &mut data[..to_read])?;

            let mut par = vec![0u8; r * SHARD_LEN];
            encode_frame_parity(&rs, &data, r, &mut par);

            let mut crc_d = vec![0u8; K_SHARDS * 2];
            for j in 0..K_SHARDS {
                let c = crc16(&data[j * SHARD_LEN..(j + 1) * SHARD_LEN]);
                crc_d[j * 2..j * 2 + 2].copy_from_slice(&c.to_le_bytes());
            }
            let mut crc_p = vec![0u8; r * 2];
            for j in 0..r {
                let c = crc16(&par[j * SHARD_LEN..(j + 1) * SHARD_LEN]);
                crc_p[j * 2..j * 2 + 2].copy_from_slice(&c.to_le_bytes());
            }

            let hdr = FrameHeader {
                index: fidx,
                data_len: to_read as u16,
                parity_len: (r * SHARD_LEN) as u16,
                crc32_data: crc32(&data),
                crc32_par: crc32(&par),
            };
            writer.write_all(&hdr.encode())?;

            group.push(PackFrame {
                data,
                par,
                crc_d,
                crc_p,
            });
        }

        let mut off = 0usize;
        while off < pay {
            if control::cancel_requested() {
                canceled = true;
                break;
            }
            let chunk = s.min(pay - off);
            for (gi, frame) in group.iter().enumerate() {
                gather_payload(
                    &[&frame.data, &frame.par, &frame.crc_d, &frame.crc_p],
                    off,
                    &mut slice_buf[..chunk],
                );
                let sh = SliceHeader {
                    frame_index: fbase + gi as u64,
                    offset: off as u32,
                    size: chunk as u16,
                    crc32_slice: crc32(&slice_buf[..chunk]),
                };
                writer.write_all(&sh.encode())?;
                writer.write_all(&slice_buf[..chunk])?;
                done_slices += 1;
                control::report_progress(done_slices, total_slices);
            }
            off += s;
        }

        fbase += in_grp as u64;
        if canceled {
            break;
        }
    }

    writer.flush()?;
    debug!(done_slices, canceled, "pack finished");
    Ok(if canceled {
        RunStatus::Canceled
    } else {
        RunStatus::Completed
    })
}

/// Column-wise systematic encode: column `i` of all data shards forms one
/// codeword whose parity symbols land in column `i` of the parity shards.
fn encode_frame_parity(rs: &ReedSolomon, data: &[u8], r: usize, par: &mut [u8]) {
    let mut cw = [0u8; K_SHARDS + MAX_R];
    for i in 0..SHARD_LEN {
        for j in 0..K_SHARDS {
            cw[j] = data[j * SHARD_LEN + i];
        }
        let (d, p) = cw.split_at_mut(K_SHARDS);
        rs.encode(d, &mut p[..r]);
        for j in 0..r {
            par[j * SHARD_LEN + i] = cw[K_SHARDS + j];
        }
    }
}

/// Fill `buf` from `r`, tolerating short input; unread bytes keep their
/// zero fill.
fn read_fill<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(())
}
