//! CRC primitives shared by the container codec.
//!
//! Two polynomials are in play: CRC-32 (IEEE 802.3, reflected) tags whole
//! blocks and slices, CRC-16-CCITT (0x1021, init 0xFFFF, unreflected) tags
//! individual shards. Both are pure functions of their input bytes.

use crc::{Crc, CRC_16_IBM_3740};

/// CRC-16-CCITT engine (poly 0x1021, init 0xFFFF, no reflection, no xorout).
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// CRC-32 over `buf` (IEEE 802.3: reflected 0xEDB88320, init and final xor
/// 0xFFFFFFFF).
pub fn crc32(buf: &[u8]) -> u32 {
    crc32fast::hash(buf)
}

/// CRC-16-CCITT over `buf`.
pub fn crc16(buf: &[u8]) -> u16 {
    CRC16.checksum(buf)
}
