use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::WireError;
use crate::delta::{Delta, DeltaMask};
use crate::quant::{
    QuantizationConfig, dequantize_rotation, dequantize_vec3, quantize_rotation, quantize_vec3,
};
use crate::snapshot::{EntityId, Snapshot};
use crate::zone::Zone;

/// owner (8) + sequence (4) + mask (1) + zone (1)
pub const RECORD_HEADER_LEN: usize = 14;

const VEC3_LEN: usize = 6;
const ROTATION_LEN: usize = 4;
const INT_LEN: usize = 4;

/// Encoded size of one record with the given mask.
pub fn record_len(mask: DeltaMask) -> usize {
    let mut len = RECORD_HEADER_LEN;
    if mask.contains(DeltaMask::POSITION) {
        len += VEC3_LEN;
    }
    if mask.contains(DeltaMask::ROTATION) {
        len += ROTATION_LEN;
    }
    if mask.contains(DeltaMask::VELOCITY) {
        len += VEC3_LEN;
    }
    if mask.contains(DeltaMask::HEALTH) {
        len += INT_LEN;
    }
    if mask.contains(DeltaMask::FLAGS) {
        len += INT_LEN;
    }
    len
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaRecord {
    pub id: EntityId,
    pub zone: Zone,
    pub delta: Delta,
}

/// Appends delta records back to back. There is no count prefix.
#[derive(Debug)]
pub struct DeltaBatchWriter {
    buf: BytesMut,
    quantization: QuantizationConfig,
    records: usize,
}

impl DeltaBatchWriter {
    pub fn new(quantization: QuantizationConfig) -> Self {
        Self::with_capacity(quantization, 4096)
    }

    pub fn with_capacity(quantization: QuantizationConfig, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            quantization,
            records: 0,
        }
    }

    pub fn push(&mut self, id: EntityId, zone: Zone, delta: &Delta) {
        let mask = delta.mask;
        let state = &delta.state;
        self.buf.reserve(record_len(mask));

        self.buf.put_i64_le(id.owner);
        self.buf.put_u32_le(id.sequence);
        self.buf.put_u8(mask.bits());
        self.buf.put_u8(zone as u8);

        if mask.contains(DeltaMask::POSITION) {
            for axis in quantize_vec3(state.position, self.quantization.position_step) {
                self.buf.put_i16_le(axis);
            }
        }
        if mask.contains(DeltaMask::ROTATION) {
            self.buf.put_slice(&quantize_rotation(state.rotation));
        }
        if mask.contains(DeltaMask::VELOCITY) {
            for axis in quantize_vec3(state.velocity, self.quantization.velocity_step) {
                self.buf.put_i16_le(axis);
            }
        }
        if mask.contains(DeltaMask::HEALTH) {
            self.buf.put_i32_le(state.health);
        }
        if mask.contains(DeltaMask::FLAGS) {
            self.buf.put_u32_le(state.flags);
        }

        self.records += 1;
    }

    /// Number of records written since the last `take`/`clear`.
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    /// Hands out the encoded batch and leaves the writer empty for reuse.
    pub fn take(&mut self) -> Bytes {
        self.records = 0;
        self.buf.split().freeze()
    }

    pub fn clear(&mut self) {
        self.records = 0;
        self.buf.clear();
    }
}

/// Iterates the records of a batch.
///
/// Iteration ends quietly when fewer than [`RECORD_HEADER_LEN`] bytes remain.
/// A record whose header is invalid or whose fields do not fit yields one
/// `Err` and ends iteration; records before it stay valid.
#[derive(Debug)]
pub struct DeltaBatchReader<'a> {
    buf: &'a [u8],
    quantization: QuantizationConfig,
    failed: bool,
}

impl<'a> DeltaBatchReader<'a> {
    pub fn new(buf: &'a [u8], quantization: QuantizationConfig) -> Self {
        Self {
            buf,
            quantization,
            failed: false,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn read_record(&mut self) -> Result<DeltaRecord, WireError> {
        let owner = self.buf.get_i64_le();
        let sequence = self.buf.get_u32_le();
        let mask_byte = self.buf.get_u8();
        let zone_byte = self.buf.get_u8();

        let mask = DeltaMask::from_bits(mask_byte).ok_or(WireError::UnknownMaskBits(mask_byte))?;
        let zone = Zone::from_wire(zone_byte).ok_or(WireError::InvalidZone(zone_byte))?;

        let needed = record_len(mask) - RECORD_HEADER_LEN;
        if self.buf.remaining() < needed {
            return Err(WireError::Truncated {
                needed,
                available: self.buf.remaining(),
            });
        }

        let mut state = Snapshot::default();
        if mask.contains(DeltaMask::POSITION) {
            state.position = dequantize_vec3(read_axes(&mut self.buf), self.quantization.position_step);
        }
        if mask.contains(DeltaMask::ROTATION) {
            let mut bytes = [0u8; 4];
            self.buf.copy_to_slice(&mut bytes);
            state.rotation = dequantize_rotation(bytes);
        }
        if mask.contains(DeltaMask::VELOCITY) {
            state.velocity = dequantize_vec3(read_axes(&mut self.buf), self.quantization.velocity_step);
        }
        if mask.contains(DeltaMask::HEALTH) {
            state.health = self.buf.get_i32_le();
        }
        if mask.contains(DeltaMask::FLAGS) {
            state.flags = self.buf.get_u32_le();
        }

        Ok(DeltaRecord {
            id: EntityId::new(owner, sequence),
            zone,
            delta: Delta { mask, state },
        })
    }
}

impl Iterator for DeltaBatchReader<'_> {
    type Item = Result<DeltaRecord, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.remaining() < RECORD_HEADER_LEN {
            return None;
        }
        match self.read_record() {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn read_axes(buf: &mut &[u8]) -> [i16; 3] {
    let x = buf.get_i16_le();
    let y = buf.get_i16_le();
    let z = buf.get_i16_le();
    [x, y, z]
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn full_delta() -> Delta {
        Delta::full(
            Snapshot::new(Vec3::new(1.25, -2.5, 100.0), Quat::from_rotation_y(0.7))
                .with_velocity(Vec3::new(3.0, 0.0, -0.5))
                .with_health(87)
                .with_flags(0xDEAD_BEEF),
        )
    }

    #[test]
    fn header_layout_is_little_endian() {
        let mut writer = DeltaBatchWriter::new(QuantizationConfig::default());
        let delta = Delta {
            mask: DeltaMask::HEALTH,
            state: Snapshot::default().with_health(0x0102_0304),
        };
        writer.push(EntityId::new(0x0A0B, 7), Zone::Mid, &delta);
        let bytes = writer.take();

        assert_eq!(
            &bytes[..],
            &[
                0x0B, 0x0A, 0, 0, 0, 0, 0, 0, // owner
                7, 0, 0, 0, // sequence
                0b1000, 1, // mask, zone
                0x04, 0x03, 0x02, 0x01, // health
            ]
        );
        assert!(writer.is_empty());
    }

    #[test]
    fn record_sizes() {
        assert_eq!(record_len(DeltaMask::empty()), 14);
        assert_eq!(record_len(DeltaMask::POSITION), 20);
        assert_eq!(record_len(DeltaMask::all()), 38);
    }

    #[test]
    fn batch_roundtrip() {
        let quant = QuantizationConfig::default();
        let mut writer = DeltaBatchWriter::new(quant);
        let full = full_delta();
        let partial = Delta {
            mask: DeltaMask::POSITION | DeltaMask::FLAGS,
            state: Snapshot::new(Vec3::new(-4.0, 0.0, 0.01), Quat::IDENTITY).with_flags(3),
        };
        writer.push(EntityId::new(1, 1), Zone::Near, &full);
        writer.push(EntityId::new(-9, u32::MAX), Zone::Far, &partial);
        assert_eq!(writer.len(), 2);
        assert_eq!(writer.byte_len(), 38 + 24);

        let bytes = writer.take();
        let records: Vec<_> = DeltaBatchReader::new(&bytes, quant)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);

        let a = &records[0];
        assert_eq!(a.id, EntityId::new(1, 1));
        assert_eq!(a.zone, Zone::Near);
        assert_eq!(a.delta.mask, DeltaMask::all());
        assert!((a.delta.state.position - full.state.position).abs().max_element() <= 0.005);
        assert!(a.delta.state.rotation.dot(full.state.rotation).abs() > 0.999);
        assert!((a.delta.state.velocity - full.state.velocity).abs().max_element() <= 0.005);
        assert_eq!(a.delta.state.health, 87);
        assert_eq!(a.delta.state.flags, 0xDEAD_BEEF);

        let b = &records[1];
        assert_eq!(b.id, EntityId::new(-9, u32::MAX));
        assert_eq!(b.zone, Zone::Far);
        assert_eq!(b.delta.mask, DeltaMask::POSITION | DeltaMask::FLAGS);
        assert_eq!(b.delta.state.flags, 3);
    }

    #[test]
    fn short_trailing_garbage_is_ignored() {
        let quant = QuantizationConfig::default();
        let mut writer = DeltaBatchWriter::new(quant);
        writer.push(EntityId::new(5, 5), Zone::Near, &full_delta());
        let mut bytes = writer.take().to_vec();
        bytes.extend_from_slice(&[0xFF; 13]);

        let mut reader = DeltaBatchReader::new(&bytes, quant);
        assert!(matches!(reader.next(), Some(Ok(_))));
        assert!(reader.next().is_none());
        assert_eq!(reader.remaining(), 13);
    }

    #[test]
    fn truncated_record_stops_after_valid_prefix() {
        let quant = QuantizationConfig::default();
        let mut writer = DeltaBatchWriter::new(quant);
        writer.push(EntityId::new(1, 1), Zone::Near, &full_delta());
        writer.push(EntityId::new(1, 2), Zone::Near, &full_delta());
        let bytes = writer.take();
        let cut = &bytes[..bytes.len() - 5];

        let mut reader = DeltaBatchReader::new(cut, quant);
        assert!(matches!(reader.next(), Some(Ok(r)) if r.id == EntityId::new(1, 1)));
        assert_eq!(
            reader.next(),
            Some(Err(WireError::Truncated {
                needed: 24,
                available: 19
            }))
        );
        assert!(reader.next().is_none());
    }

    #[test]
    fn corrupted_mask_stops_reading() {
        let quant = QuantizationConfig::default();
        let mut writer = DeltaBatchWriter::new(quant);
        writer.push(EntityId::new(1, 1), Zone::Near, &full_delta());
        let mut bytes = writer.take().to_vec();
        bytes[12] = 0xE1;

        let mut reader = DeltaBatchReader::new(&bytes, quant);
        assert_eq!(reader.next(), Some(Err(WireError::UnknownMaskBits(0xE1))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn invalid_zone_stops_reading() {
        let quant = QuantizationConfig::default();
        let mut writer = DeltaBatchWriter::new(quant);
        writer.push(EntityId::new(1, 1), Zone::Near, &full_delta());
        let mut bytes = writer.take().to_vec();
        bytes[13] = 9;

        let mut reader = DeltaBatchReader::new(&bytes, quant);
        assert_eq!(reader.next(), Some(Err(WireError::InvalidZone(9))));
    }
}
