// vis.rs — Leaf-visibility run-length codec
//
// A leaf's row covers the world's visible leaves (leaf 0 excluded): bit i
// means leaf i+1 is visible, packed LSB-first, one row per leaf with a vis
// offset. Compressed form: a zero byte plus a count stands for that many
// zero bytes, any other byte is literal.

use bit_vec::BitVec;
use log::warn;

/// Row stride in bytes for a given visible-leaf count.
#[inline]
pub fn row_bytes(leaf_count: usize) -> usize {
    leaf_count.div_ceil(8)
}

/// Decompress one leaf's row. Missing or short data decodes all-visible,
/// matching what engines assume for maps without vis.
pub fn decompress(visdata: &[u8], offset: usize, leaf_count: usize) -> BitVec {
    let row = row_bytes(leaf_count);
    let mut bytes = vec![0u8; row];

    if visdata.is_empty() || offset >= visdata.len() {
        // no vis info, everything visible
        bytes.fill(0xff);
    } else {
        let mut out_p = 0;
        let mut inp = offset;
        while out_p < row {
            if inp >= visdata.len() {
                warn!("vis decompression ran off the end of the lump");
                break;
            }
            let b = visdata[inp];
            if b != 0 {
                bytes[out_p] = b;
                out_p += 1;
                inp += 1;
                continue;
            }
            if inp + 1 >= visdata.len() {
                warn!("vis decompression truncated zero run");
                break;
            }
            let mut c = visdata[inp + 1] as usize;
            inp += 2;
            if out_p + c > row {
                warn!("vis decompression overrun");
                c = row - out_p;
            }
            out_p += c; // bytes are already zero
        }
    }

    let mut bits = BitVec::from_elem(leaf_count, false);
    for i in 0..leaf_count {
        if bytes[i >> 3] & (1 << (i & 7)) != 0 {
            bits.set(i, true);
        }
    }
    bits
}

/// Compress one row back to the run-length form.
pub fn compress(row: &BitVec) -> Vec<u8> {
    let nbytes = row_bytes(row.len());
    let mut bytes = vec![0u8; nbytes];
    for (i, bit) in row.iter().enumerate() {
        if bit {
            bytes[i >> 3] |= 1 << (i & 7);
        }
    }

    let mut out = Vec::with_capacity(nbytes);
    let mut i = 0;
    while i < nbytes {
        if bytes[i] != 0 {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let mut run = 0u8;
        while i < nbytes && bytes[i] == 0 && run < 255 {
            run += 1;
            i += 1;
        }
        out.push(0);
        out.push(run);
    }
    out
}
