// crc.rs — CRC-32 (reflected, inverted, standard polynomial)
// Block checksums delegate to the `crc` crate; the streaming register and the
// 4-byte forcing patch need the raw table, which the crate does not expose.

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC_CALC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const CRC32_POLY: u32 = 0xEDB8_8320;

const CRC32_TABLE: [u32; 256] = build_table();

/// Inverse of the table's top byte; the top bytes are a permutation for
/// this polynomial, which is what makes the forcing patch solvable.
const CRC32_TOP_INDEX: [u8; 256] = build_top_index();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = i as u32;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 1 != 0 { (r >> 1) ^ CRC32_POLY } else { r >> 1 };
            bit += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

const fn build_top_index() -> [u8; 256] {
    let mut idx = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        idx[(CRC32_TABLE[i] >> 24) as usize] = i as u8;
        i += 1;
    }
    idx
}

/// Initial register state.
#[inline]
pub fn crc32_init() -> u32 {
    0xffff_ffff
}

/// Feed bytes through the register.
pub fn crc32_update(mut reg: u32, data: &[u8]) -> u32 {
    for &b in data {
        reg = (reg >> 8) ^ CRC32_TABLE[((reg ^ b as u32) & 0xff) as usize];
    }
    reg
}

/// Final (inverted) checksum value.
#[inline]
pub fn crc32_final(reg: u32) -> u32 {
    !reg
}

/// One-shot checksum for a whole block.
pub fn crc32_block(data: &[u8]) -> u32 {
    CRC_CALC.checksum(data)
}

/// The 4 bytes that, appended to a stream whose register state is `reg`,
/// drive the final checksum to exactly `target`.
///
/// Solved backwards through the table one byte at a time; each step has
/// exactly one table entry with the required top byte.
pub fn crc32_force_patch(reg: u32, target: u32) -> [u8; 4] {
    let want = !target; // register state that finalizes to `target`

    let mut idx = [0usize; 4];
    let mut cur = want;
    for i in (0..4).rev() {
        let t = CRC32_TOP_INDEX[(cur >> 24) as usize] as usize;
        idx[i] = t;
        cur = (cur ^ CRC32_TABLE[t]) << 8;
    }

    let mut out = [0u8; 4];
    let mut r = reg;
    for i in 0..4 {
        out[i] = (r as u8) ^ (idx[i] as u8);
        r = (r >> 8) ^ CRC32_TABLE[idx[i]];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // standard check value for CRC-32/ISO-HDLC over "123456789"
        assert_eq!(crc32_block(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_streaming_matches_block() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut reg = crc32_init();
        for chunk in data.chunks(7) {
            reg = crc32_update(reg, chunk);
        }
        assert_eq!(crc32_final(reg), crc32_block(data));
    }

    #[test]
    fn test_force_patch_hits_target() {
        let prefix = b"lump bytes before the dummy record";
        let target = 0xDEAD_BEEF;

        let reg = crc32_update(crc32_init(), prefix);
        let patch = crc32_force_patch(reg, target);

        let mut full = prefix.to_vec();
        full.extend_from_slice(&patch);
        assert_eq!(crc32_block(&full), target);
    }

    #[test]
    fn test_force_patch_empty_prefix() {
        let patch = crc32_force_patch(crc32_init(), 0x1234_5678);
        assert_eq!(crc32_block(&patch), 0x1234_5678);
    }

    #[test]
    fn test_force_patch_followed_by_verification_stream() {
        // patching mid-build then continuing the stream must be consistent
        let a = b"first lump";
        let target = 0x0BAD_F00D;
        let reg = crc32_update(crc32_init(), a);
        let patch = crc32_force_patch(reg, target);
        let reg = crc32_update(reg, &patch);
        assert_eq!(crc32_final(reg), target);
    }
}
