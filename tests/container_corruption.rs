//! Damage-path container tests: shard corruption, slice loss, padding
//! policies and the statistics they leave behind.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rsct::crc::crc32;
use rsct::format::GlobalHeader;
use rsct::{
    last_unpack_stats, pack_container, unpack_container_ex, ContainerStats, PadMode, RunStatus,
};

// Unpack statistics are process-wide; serialize the tests in this binary.
static GUARD: Mutex<()> = Mutex::new(());

fn lock() -> MutexGuard<'static, ()> {
    GUARD.lock().unwrap_or_else(|e| e.into_inner())
}

fn pattern_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

struct SliceRec {
    pos: usize,
    frame: u64,
    offset: u32,
    size: u16,
}

/// Walk a freshly packed container and list its slice records.
fn parse_slices(bytes: &[u8]) -> Vec<SliceRec> {
    let mut v = Vec::new();
    let mut pos = GlobalHeader::LEN;
    while pos + 4 <= bytes.len() {
        match &bytes[pos..pos + 4] {
            b"RSF4" => pos += 24,
            b"RSL4" => {
                let frame = u64::from_le_bytes(bytes[pos + 4..pos + 12].try_into().unwrap());
                let offset = u32::from_le_bytes(bytes[pos + 12..pos + 16].try_into().unwrap());
                let size = u16::from_le_bytes(bytes[pos + 16..pos + 18].try_into().unwrap());
                v.push(SliceRec {
                    pos,
                    frame,
                    offset,
                    size,
                });
                pos += 22 + size as usize;
            }
            other => panic!("unexpected record magic {other:?} at {pos}"),
        }
    }
    v
}

/// Edit a slice payload in place and re-stamp its CRC-32 so the reader
/// accepts the damaged bytes.
fn patch_slice(bytes: &mut [u8], rec: &SliceRec, edit: impl FnOnce(&mut [u8])) {
    let start = rec.pos + 22;
    let end = start + rec.size as usize;
    edit(&mut bytes[start..end]);
    let crc = crc32(&bytes[start..end]);
    bytes[rec.pos + 18..rec.pos + 22].copy_from_slice(&crc.to_le_bytes());
}

fn pack_to_bytes(dir: &Path, input: &[u8], r: usize) -> Vec<u8> {
    let inp = dir.join("in.bin");
    let cont = dir.join("c.rsct");
    fs::write(&inp, input).unwrap();
    pack_container(&inp, &cont, r).unwrap();
    fs::read(&cont).unwrap()
}

fn unpack_bytes(dir: &Path, container: &[u8], pad: PadMode) -> (Vec<u8>, ContainerStats) {
    let cont = dir.join("damaged.rsct");
    let out = dir.join("out.bin");
    fs::write(&cont, container).unwrap();
    assert_eq!(
        unpack_container_ex(&cont, &out, pad).unwrap(),
        RunStatus::Completed
    );
    (fs::read(&out).unwrap(), last_unpack_stats().unwrap())
}

#[test]
fn corrupted_shards_recover_through_crc16_erasures() {
    let _g = lock();
    let dir = tempfile::tempdir().unwrap();
    let input = pattern_bytes(12_288);
    let mut container = pack_to_bytes(dir.path(), &input, 16);

    // Damage two adjacent data shards inside the first slice; the slice
    // CRC is re-stamped so the damage reaches the frame buffer.
    let slices = parse_slices(&container);
    let first = slices.iter().find(|s| s.offset == 0).unwrap();
    patch_slice(&mut container, first, |payload| {
        for b in &mut payload[32..96] {
            *b ^= 0xFF;
        }
    });

    let (output, stats) = unpack_bytes(dir.path(), &container, PadMode::Raw);
    assert_eq!(output, input);
    assert_eq!(stats.slices_bad, 0);
    assert_eq!(stats.rs_fail_columns, 0);
    assert_eq!(stats.used_erasures_cols, 64);
    // Two erased shards located in every column.
    assert_eq!(stats.corrected_symbols, 2 * 64);
}

#[test]
fn dropped_slices_within_parity_budget_recover() {
    let _g = lock();
    let dir = tempfile::tempdir().unwrap();
    let input = pattern_bytes(12_288);
    let container = pack_to_bytes(dir.path(), &input, 16);

    // Remove the slices at offsets 512 and 1024: 1024 data bytes, which
    // is 16 shards, exactly the parity budget.
    let slices = parse_slices(&container);
    let drop_a = slices.iter().find(|s| s.offset == 512).unwrap();
    let drop_b = slices.iter().find(|s| s.offset == 1024).unwrap();
    let mut damaged = Vec::new();
    damaged.extend_from_slice(&container[..drop_a.pos]);
    damaged.extend_from_slice(&container[drop_a.pos + 22 + drop_a.size as usize..drop_b.pos]);
    damaged.extend_from_slice(&container[drop_b.pos + 22 + drop_b.size as usize..]);

    let (output, stats) = unpack_bytes(dir.path(), &damaged, PadMode::Raw);
    assert_eq!(output, input);
    assert_eq!(stats.slices_ok, 25);
    assert_eq!(stats.rs_fail_columns, 0);
    assert_eq!(stats.used_erasures_cols, 64);
    assert_eq!(stats.corrected_symbols, 16 * 64);
}

#[test]
fn slice_with_bad_crc_is_discarded_and_repaired_around() {
    let _g = lock();
    let dir = tempfile::tempdir().unwrap();
    let input = pattern_bytes(12_288);
    let mut container = pack_to_bytes(dir.path(), &input, 16);

    // Flip payload bytes without fixing the slice CRC: the whole slice is
    // dropped and its 8 shards come back through erasure decoding.
    let slices = parse_slices(&container);
    let victim = slices.iter().find(|s| s.offset == 2048).unwrap();
    container[victim.pos + 22] ^= 0xFF;

    let (output, stats) = unpack_bytes(dir.path(), &container, PadMode::Raw);
    assert_eq!(output, input);
    assert_eq!(stats.slices_bad, 1);
    assert_eq!(stats.slices_ok, 26);
    assert_eq!(stats.rs_fail_columns, 0);
    assert_eq!(stats.corrected_symbols, 8 * 64);
}

#[test]
fn zero_policy_blanks_unrecoverable_column() {
    let _g = lock();
    let dir = tempfile::tempdir().unwrap();
    let input = pattern_bytes(12_288);
    let mut container = pack_to_bytes(dir.path(), &input, 16);

    // Corrupt byte 0 (column 0) of 17 distinct data shards: one more
    // than the erasure budget, so column 0 cannot be recovered.
    let slices = parse_slices(&container);
    for shard in 0..17usize {
        let byte_pos = shard * 64;
        let rec = slices
            .iter()
            .find(|s| {
                (s.offset as usize..s.offset as usize + s.size as usize).contains(&byte_pos)
            })
            .unwrap();
        patch_slice(&mut container, rec, |payload| {
            payload[byte_pos - rec.offset as usize] ^= 0xFF;
        });
    }

    let (output, stats) = unpack_bytes(dir.path(), &container, PadMode::Zero);
    assert_eq!(stats.rs_fail_columns, 1);
    assert!(stats.ber_est > 0.0);
    for j in 0..192 {
        assert_eq!(output[j * 64], 0, "column 0 of shard {j}");
        // The rest of each shard survives untouched.
        assert_eq!(output[j * 64 + 1..(j + 1) * 64], input[j * 64 + 1..(j + 1) * 64]);
    }
}

#[test]
fn raw_policy_leaves_unrecoverable_column_as_received() {
    let _g = lock();
    let dir = tempfile::tempdir().unwrap();
    let input = pattern_bytes(12_288);
    let mut container = pack_to_bytes(dir.path(), &input, 16);

    let slices = parse_slices(&container);
    for shard in 0..17usize {
        let byte_pos = shard * 64;
        let rec = slices
            .iter()
            .find(|s| {
                (s.offset as usize..s.offset as usize + s.size as usize).contains(&byte_pos)
            })
            .unwrap();
        patch_slice(&mut container, rec, |payload| {
            payload[byte_pos - rec.offset as usize] ^= 0xFF;
        });
    }

    let (output, stats) = unpack_bytes(dir.path(), &container, PadMode::Raw);
    assert_eq!(stats.rs_fail_columns, 1);
    for j in 0..192 {
        let expect = if j < 17 {
            input[j * 64] ^ 0xFF
        } else {
            input[j * 64]
        };
        assert_eq!(output[j * 64], expect, "column 0 of shard {j}");
        assert_eq!(output[j * 64 + 1..(j + 1) * 64], input[j * 64 + 1..(j + 1) * 64]);
    }
}

#[test]
fn temporal_policy_copies_previous_frame_column() {
    let _g = lock();
    let dir = tempfile::tempdir().unwrap();
    let input = pattern_bytes(12_288 * 2);
    let mut container = pack_to_bytes(dir.path(), &input, 16);

    // Kill column 5 of the second frame beyond the erasure budget.
    let slices = parse_slices(&container);
    for shard in 0..17usize {
        let byte_pos = shard * 64 + 5;
        let rec = slices
            .iter()
            .find(|s| {
                s.frame == 1
                    && (s.offset as usize..s.offset as usize + s.size as usize)
                        .contains(&byte_pos)
            })
            .unwrap();
        patch_slice(&mut container, rec, |payload| {
            payload[byte_pos - rec.offset as usize] ^= 0xFF;
        });
    }

    let (output, stats) = unpack_bytes(dir.path(), &container, PadMode::Temporal);
    assert_eq!(stats.rs_fail_columns, 1);
    assert_eq!(&output[..12_288], &input[..12_288]);
    for j in 0..192 {
        let base = 12_288 + j * 64;
        // Column 5 is patched from frame 0, the rest is frame 1's own.
        assert_eq!(output[base + 5], input[j * 64 + 5], "shard {j}");
        for c in 0..64 {
            if c != 5 {
                assert_eq!(output[base + c], input[12_288 + j * 64 + c]);
            }
        }
    }
}

#[test]
fn missing_frame_emits_zeros() {
    let _g = lock();
    let dir = tempfile::tempdir().unwrap();
    let input = pattern_bytes(12_288 * 2);
    let container = pack_to_bytes(dir.path(), &input, 16);

    // Drop every record belonging to frame 1, header included.
    let bytes = &container;
    let mut damaged = Vec::new();
    let mut pos = GlobalHeader::LEN;
    damaged.extend_from_slice(&bytes[..pos]);
    while pos + 4 <= bytes.len() {
        match &bytes[pos..pos + 4] {
            b"RSF4" => {
                let idx = u64::from_le_bytes(bytes[pos + 4..pos + 12].try_into().unwrap());
                if idx == 0 {
                    damaged.extend_from_slice(&bytes[pos..pos + 24]);
                }
                pos += 24;
            }
            b"RSL4" => {
                let frame = u64::from_le_bytes(bytes[pos + 4..pos + 12].try_into().unwrap());
                let size =
                    u16::from_le_bytes(bytes[pos + 16..pos + 18].try_into().unwrap()) as usize;
                if frame == 0 {
                    damaged.extend_from_slice(&bytes[pos..pos + 22 + size]);
                }
                pos += 22 + size;
            }
            other => panic!("unexpected record magic {other:?}"),
        }
    }

    let (output, _) = unpack_bytes(dir.path(), &damaged, PadMode::Raw);
    assert_eq!(&output[..12_288], &input[..12_288]);
    assert!(output[12_288..].iter().all(|&b| b == 0));
    assert_eq!(output.len(), input.len());
}
