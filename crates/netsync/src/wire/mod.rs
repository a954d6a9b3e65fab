//! Byte layouts exchanged through the host transport.
//!
//! Two formats live here: the compact delta record stream sent every tick,
//! and the self-describing keyed batch used for occasional bulk data.

mod keyed;
mod record;

pub use keyed::{KeyedBatchWriter, KeyedEntry, read_keyed_batch};
pub use record::{
    DeltaBatchReader, DeltaBatchWriter, DeltaRecord, RECORD_HEADER_LEN, record_len,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("truncated record: need {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("mask has unknown bits set: {0:#04x}")]
    UnknownMaskBits(u8),
    #[error("invalid zone byte: {0}")]
    InvalidZone(u8),
    #[error("key is empty, too long or not valid UTF-8")]
    InvalidKey,
    #[error("payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("negative entry count: {0}")]
    NegativeCount(i32),
}
