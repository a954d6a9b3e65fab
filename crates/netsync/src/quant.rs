//! Lossy fixed-size encodings for vectors and rotations.
//!
//! Positions and velocities are stored per axis as `round(value / step)` in an
//! `i16`. Values outside `±i16::MAX * step` saturate at the range limit.
//! Rotations are stored as four affine-mapped bytes and renormalized on decode.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STEP: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationConfig {
    pub position_step: f32,
    pub velocity_step: f32,
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            position_step: DEFAULT_STEP,
            velocity_step: DEFAULT_STEP,
        }
    }
}

impl QuantizationConfig {
    /// Largest absolute coordinate representable without saturating.
    pub fn position_range(&self) -> f32 {
        i16::MAX as f32 * self.position_step
    }

    pub fn velocity_range(&self) -> f32 {
        i16::MAX as f32 * self.velocity_step
    }
}

#[inline]
pub fn quantize_axis(value: f32, step: f32) -> i16 {
    (value / step)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[inline]
pub fn dequantize_axis(value: i16, step: f32) -> f32 {
    value as f32 * step
}

pub fn quantize_vec3(v: Vec3, step: f32) -> [i16; 3] {
    [
        quantize_axis(v.x, step),
        quantize_axis(v.y, step),
        quantize_axis(v.z, step),
    ]
}

pub fn dequantize_vec3(q: [i16; 3], step: f32) -> Vec3 {
    Vec3::new(
        dequantize_axis(q[0], step),
        dequantize_axis(q[1], step),
        dequantize_axis(q[2], step),
    )
}

#[inline]
fn quantize_unit(v: f32) -> u8 {
    ((v.clamp(-1.0, 1.0) * 0.5 + 0.5) * 255.0).round() as u8
}

#[inline]
fn dequantize_unit(b: u8) -> f32 {
    b as f32 / 255.0 * 2.0 - 1.0
}

pub fn quantize_rotation(q: Quat) -> [u8; 4] {
    [
        quantize_unit(q.x),
        quantize_unit(q.y),
        quantize_unit(q.z),
        quantize_unit(q.w),
    ]
}

/// Decodes four affine bytes back into a unit quaternion.
///
/// Byte quantization does not preserve unit length, so the result is
/// renormalized. A degenerate (near-zero) decode falls back to identity.
pub fn dequantize_rotation(b: [u8; 4]) -> Quat {
    let q = Quat::from_xyzw(
        dequantize_unit(b[0]),
        dequantize_unit(b[1]),
        dequantize_unit(b[2]),
        dequantize_unit(b[3]),
    );
    if q.length_squared() < 1e-6 {
        Quat::IDENTITY
    } else {
        q.normalize()
    }
}
