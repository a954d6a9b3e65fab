use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::WireError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedEntry {
    pub key: String,
    pub payload: Bytes,
}

/// Builds `i32 count` followed by `(u16 key_len, key, u32 payload_len, payload)`
/// entries, all little-endian.
#[derive(Debug, Default)]
pub struct KeyedBatchWriter {
    body: BytesMut,
    count: i32,
}

impl KeyedBatchWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, payload: &[u8]) -> Result<(), WireError> {
        if key.is_empty() || key.len() > u16::MAX as usize {
            return Err(WireError::InvalidKey);
        }
        if payload.len() > u32::MAX as usize {
            return Err(WireError::PayloadTooLarge {
                size: payload.len(),
                limit: u32::MAX as usize,
            });
        }

        self.body.reserve(2 + key.len() + 4 + payload.len());
        self.body.put_u16_le(key.len() as u16);
        self.body.put_slice(key.as_bytes());
        self.body.put_u32_le(payload.len() as u32);
        self.body.put_slice(payload);
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn finish(self) -> Bytes {
        let mut out = BytesMut::with_capacity(4 + self.body.len());
        out.put_i32_le(self.count);
        out.extend_from_slice(&self.body);
        out.freeze()
    }
}

pub fn read_keyed_batch(mut buf: &[u8]) -> Result<Vec<KeyedEntry>, WireError> {
    ensure(buf, 4)?;
    let count = buf.get_i32_le();
    if count < 0 {
        return Err(WireError::NegativeCount(count));
    }

    // Each entry takes at least 6 bytes, which bounds a hostile count.
    let mut entries = Vec::with_capacity((count as usize).min(buf.len() / 6));
    for _ in 0..count {
        ensure(buf, 2)?;
        let key_len = buf.get_u16_le() as usize;
        ensure(buf, key_len)?;
        let key = std::str::from_utf8(&buf[..key_len])
            .map_err(|_| WireError::InvalidKey)?
            .to_owned();
        buf.advance(key_len);
        if key.is_empty() {
            return Err(WireError::InvalidKey);
        }

        ensure(buf, 4)?;
        let payload_len = buf.get_u32_le() as usize;
        ensure(buf, payload_len)?;
        let payload = Bytes::copy_from_slice(&buf[..payload_len]);
        buf.advance(payload_len);

        entries.push(KeyedEntry { key, payload });
    }
    Ok(entries)
}

fn ensure(buf: &[u8], needed: usize) -> Result<(), WireError> {
    if buf.len() < needed {
        Err(WireError::Truncated {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}
