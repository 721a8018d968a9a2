//! Bit-level file unwrapper: locate the sentinel flags by streaming KMP
//! and emit exactly the bits between them.
//!
//! A FIFO window of the end flag's length defers emission so the flag
//! bits themselves never leak into the output. The 1-based bit positions
//! where each flag began are published through
//! [`crate::control::last_start_flag_pos`] and
//! [`crate::control::last_end_flag_pos`]; both reset to 0 when a run
//! starts.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use tracing::debug;

use crate::bitio::{BitReader, BitWriter};
use crate::control;
use crate::error::WrapError;
use crate::kmp::BitKmp;
use crate::wrap::{parse_bit_pattern, IO_BUF};

/// Extract the payload between `start_pattern` and `end_pattern` from
/// `input` into `output`. Both patterns must be non-empty.
pub fn unwrap_file_bits(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start_pattern: &str,
    end_pattern: &str,
) -> Result<(), WrapError> {
    control::reset_flag_positions();

    let input = input.as_ref();
    let output = output.as_ref();

    let fin = File::open(input).map_err(|e| WrapError::InputOpen(input.into(), e))?;
    let fout = File::create(output).map_err(|e| WrapError::OutputOpen(output.into(), e))?;

    let start_bits = parse_bit_pattern(start_pattern)?;
    let end_bits = parse_bit_pattern(end_pattern)?;
    if start_bits.is_empty() || end_bits.is_empty() {
        return Err(WrapError::EmptyPattern);
    }

    let mut kmp_start = BitKmp::new(&start_bits);
    let mut kmp_end = BitKmp::new(&end_bits);
    let mut br = BitReader::new(fin, IO_BUF);
    let mut bw = BitWriter::new(BufWriter::with_capacity(IO_BUF, fout));

    let mut bit_index: u64 = 0;

    let mut found_start = false;
    while let Some(bit) = br.next_bit()? {
        bit_index += 1;
        if kmp_start.feed(bit) {
            control::set_start_flag_pos(bit_index - start_bits.len() as u64 + 1);
            found_start = true;
            break;
        }
    }
    if !found_start {
        return Err(WrapError::FlagNotFound);
    }

    let lend = kmp_end.len();
    let mut tail: VecDeque<u8> = VecDeque::with_capacity(lend + 1);

    let mut found_end = false;
    while let Some(bit) = br.next_bit()? {
        bit_index += 1;
        tail.push_back(bit);
        if kmp_end.feed(bit) {
            control::set_end_flag_pos(bit_index - lend as u64 + 1);
            if tail.len() >= lend {
                for _ in 0..lend {
                    tail.pop_back();
                }
            } else {
                tail.clear();
            }
            found_end = true;
            break;
        }
        // Everything older than the window is guaranteed payload.
        if tail.len() > lend {
            if let Some(out) = tail.pop_front() {
                bw.write_bit(out)?;
            }
        }
    }
    if !found_end {
        return Err(WrapError::FlagNotFound);
    }

    while let Some(b) = tail.pop_front() {
        bw.write_bit(b)?;
    }
    bw.pad_to_byte()?;
    bw.flush()?;
    debug!(
        start = control::last_start_flag_pos(),
        end = control::last_end_flag_pos(),
        "unwrapped payload"
    );
    Ok(())
}
