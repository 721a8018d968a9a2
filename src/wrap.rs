//! Bit-level file wrapper: random dummy bits, sentinel flags, payload.
//!
//! Output bit sequence, MSB-first per byte, zero-padded to a whole byte:
//!
//! ```text
//! [dummy_left random bits] [start flag] [payload bits] [end flag] [dummy_right random bits]
//! ```
//!
//! The flags are arbitrary bit strings supplied by the caller; the reader
//! needs to know them out of band. A seed of 0 draws the dummy bits from
//! OS entropy, any other seed produces a deterministic stream.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::debug;

use crate::bitio::BitWriter;
use crate::error::WrapError;

/// Stream buffer size for both directions.
pub(crate) const IO_BUF: usize = 8 << 20;

/// Parse a '0'/'1' string into one bit symbol per byte.
pub(crate) fn parse_bit_pattern(s: &str) -> Result<Vec<u8>, WrapError> {
    s.chars()
        .map(|c| match c {
            '0' => Ok(0),
            '1' => Ok(1),
            _ => Err(WrapError::InvalidPattern),
        })
        .collect()
}

fn make_rng(seed: u32) -> StdRng {
    if seed == 0 {
        StdRng::from_entropy()
    } else {
        StdRng::seed_from_u64(seed as u64)
    }
}

/// Emit `nbits` random bits: whole bytes through the aligned fast path,
/// the remainder bit by bit from one extra random byte, MSB-first.
fn write_dummy_bits<W: Write>(
    bw: &mut BitWriter<W>,
    nbits: u64,
    rng: &mut StdRng,
) -> io::Result<()> {
    if nbits == 0 {
        return Ok(());
    }
    let full_bytes = nbits / 8;
    let tail_bits = (nbits % 8) as u8;

    if full_bytes > 0 {
        let mut tmp = vec![0u8; full_bytes.min(1 << 20) as usize];
        let mut remaining = full_bytes;
        while remaining > 0 {
            let chunk = remaining.min(tmp.len() as u64) as usize;
            rng.fill_bytes(&mut tmp[..chunk]);
            bw.write_full_bytes(&tmp[..chunk])?;
            remaining -= chunk as u64;
        }
    }
    if tail_bits > 0 {
        let last = (rng.next_u64() & 0xff) as u8;
        for b in (8 - tail_bits..8).rev() {
            bw.write_bit((last >> b) & 1)?;
        }
    }
    Ok(())
}

/// Wrap `input` into `output` with explicit dummy-bit counts on each side.
/// Empty flag strings skip the corresponding emission.
pub fn wrap_file_bits(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start_pattern: &str,
    end_pattern: &str,
    dummy_left_bits: u64,
    dummy_right_bits: u64,
    seed: u32,
) -> Result<(), WrapError> {
    let input = input.as_ref();
    let output = output.as_ref();

    let mut fin = File::open(input).map_err(|e| WrapError::InputOpen(input.into(), e))?;
    let fout = File::create(output).map_err(|e| WrapError::OutputOpen(output.into(), e))?;

    let start_bits = parse_bit_pattern(start_pattern)?;
    let end_bits = parse_bit_pattern(end_pattern)?;

    let mut rng = make_rng(seed);
    let mut bw = BitWriter::new(BufWriter::with_capacity(IO_BUF, fout));
    debug!(
        left = dummy_left_bits,
        right = dummy_right_bits,
        start = start_bits.len(),
        end = end_bits.len(),
        "wrapping file"
    );

    write_dummy_bits(&mut bw, dummy_left_bits, &mut rng)?;
    if !start_bits.is_empty() {
        bw.write_bits(&start_bits)?;
    }

    let mut chunk = vec![0u8; IO_BUF];
    loop {
        let got = fin.read(&mut chunk)?;
        if got == 0 {
            break;
        }
        bw.write_full_bytes(&chunk[..got])?;
    }

    if !end_bits.is_empty() {
        bw.write_bits(&end_bits)?;
    }
    write_dummy_bits(&mut bw, dummy_right_bits, &mut rng)?;

    bw.pad_to_byte()?;
    bw.flush()?;
    Ok(())
}

/// Wrap with dummy counts derived from the payload size: each side gets
/// `floor(payload_bits / (2 * ratio_divisor))` random bits.
pub fn wrap_file_bits_ratio(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start_pattern: &str,
    end_pattern: &str,
    ratio_divisor: f64,
    seed: u32,
) -> Result<(), WrapError> {
    if !(ratio_divisor > 0.0) {
        return Err(WrapError::InvalidRatio(ratio_divisor));
    }
    let input = input.as_ref();
    let size = std::fs::metadata(input)
        .map_err(|e| WrapError::InputOpen(input.into(), e))?
        .len();
    if size == 0 {
        return Err(WrapError::EmptyInput);
    }
    let n_bits = size * 8;
    let dummy_each = (n_bits as f64 / (2.0 * ratio_divisor)) as u64;
    wrap_file_bits(
        input,
        output,
        start_pattern,
        end_pattern,
        dummy_each,
        dummy_each,
        seed,
    )
}
