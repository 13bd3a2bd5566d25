// error.rs — Fatal decode failures

use thiserror::Error;

/// A decode failure is fatal for the whole file: no partial map is produced.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("file truncated ({0} bytes)")]
    Truncated(usize),

    #[error("unrecognized version tag {0:#010x}")]
    BadVersion(u32),

    #[error("lump {lump} out of range (offset {offset}, length {length}, file {file_len})")]
    LumpOutOfRange {
        lump: usize,
        offset: u32,
        length: u32,
        file_len: usize,
    },

    #[error("funny lump size: lump {lump} is {length} bytes, stride {stride}")]
    FunnyLumpSize {
        lump: usize,
        length: usize,
        stride: usize,
    },

    #[error("bad contents value {0}")]
    BadContents(i32),

    #[error("texture lump corrupt: {0}")]
    BadTextureLump(String),

    #[error("extended header corrupt: {0}")]
    BadExtendedHeader(String),
}
