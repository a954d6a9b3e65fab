use glam::{Quat, Vec3};

use super::config::ClientConfig;
use super::history::HistoryBuffer;
use crate::host::Transform;
use crate::zone::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    Interpolated,
    Extrapolated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub target: Transform,
    pub mode: SampleMode,
    pub zone: Zone,
}

/// Where the entity should be at `target_time`, or `None` if nothing has
/// been received for it.
pub fn sample(history: &HistoryBuffer, target_time: f64, config: &ClientConfig) -> Option<Sample> {
    if let Some((a, b)) = history.try_get_bracket(target_time) {
        let span = b.timestamp - a.timestamp;
        let t = if span > 0.0 {
            ((target_time - a.timestamp) / span) as f32
        } else {
            1.0
        };
        let t = t.clamp(0.0, 1.0);
        return Some(Sample {
            target: Transform::new(
                a.state.position.lerp(b.state.position, t),
                slerp_shortest(a.state.rotation, b.state.rotation, t),
            ),
            mode: SampleMode::Interpolated,
            zone: b.zone,
        });
    }

    let last = history.try_get_last()?;
    let elapsed = (target_time - last.timestamp).clamp(0.0, config.max_extrapolation) as f32;
    Some(Sample {
        target: Transform::new(
            last.state.position + last.state.velocity * elapsed,
            last.state.rotation,
        ),
        mode: SampleMode::Extrapolated,
        zone: last.zone,
    })
}

/// Moves `current` part of the way toward the sample, never past it.
pub fn blend(current: Transform, sample: &Sample, dt: f32, config: &ClientConfig) -> Transform {
    let base = config.smoothing.get(sample.zone) * dt * config.smoothing_rate;
    let (position_factor, rotation_factor) = match sample.mode {
        SampleMode::Interpolated => (base, base),
        SampleMode::Extrapolated => {
            let factor = base * config.extrapolation_confidence;
            (factor, factor * config.rotation_damping)
        }
    };

    Transform::new(
        lerp_toward(current.position, sample.target.position, position_factor),
        slerp_shortest(
            current.rotation,
            sample.target.rotation,
            rotation_factor.clamp(0.0, 1.0),
        ),
    )
}

fn lerp_toward(from: Vec3, to: Vec3, factor: f32) -> Vec3 {
    from.lerp(to, factor.clamp(0.0, 1.0))
}

fn slerp_shortest(from: Quat, to: Quat, t: f32) -> Quat {
    let from = from.normalize();
    let to = to.normalize();
    if from.dot(to) < 0.0 {
        from.slerp(-to, t)
    } else {
        from.slerp(to, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::history::StatePoint;
    use crate::snapshot::Snapshot;

    fn history(points: &[(f64, Vec3, Vec3)]) -> HistoryBuffer {
        let mut buffer = HistoryBuffer::new(16);
        for &(timestamp, position, velocity) in points {
            buffer.push(StatePoint {
                timestamp,
                state: Snapshot::new(position, Quat::IDENTITY).with_velocity(velocity),
                zone: Zone::Near,
            });
        }
        buffer
    }

    #[test]
    fn interpolates_between_bracket() {
        let h = history(&[(0.0, Vec3::ZERO, Vec3::ZERO), (1.0, Vec3::X * 10.0, Vec3::ZERO)]);
        let s = sample(&h, 0.25, &ClientConfig::default()).unwrap();
        assert_eq!(s.mode, SampleMode::Interpolated);
        assert!((s.target.position.x - 2.5).abs() < 1e-5);
    }

    #[test]
    fn extrapolates_from_last_with_cap() {
        let config = ClientConfig::default();
        let h = history(&[(1.0, Vec3::ZERO, Vec3::X * 2.0)]);

        let s = sample(&h, 1.25, &config).unwrap();
        assert_eq!(s.mode, SampleMode::Extrapolated);
        assert!((s.target.position.x - 0.5).abs() < 1e-5);

        let far = sample(&h, 100.0, &config).unwrap();
        assert!((far.target.position.x - 2.0 * config.max_extrapolation as f32).abs() < 1e-5);

        let before = sample(&h, 0.5, &config).unwrap();
        assert_eq!(before.target.position, Vec3::ZERO);
    }

    #[test]
    fn empty_history_gives_nothing() {
        assert!(sample(&HistoryBuffer::new(4), 1.0, &ClientConfig::default()).is_none());
    }

    #[test]
    fn blend_moves_partially() {
        let config = ClientConfig::default();
        let s = Sample {
            target: Transform::new(Vec3::X * 10.0, Quat::IDENTITY),
            mode: SampleMode::Interpolated,
            zone: Zone::Mid,
        };
        // 0.5 * 0.1 * 10 = 0.5
        let out = blend(Transform::default(), &s, 0.1, &config);
        assert!((out.position.x - 5.0).abs() < 1e-4);

        let out = blend(Transform::default(), &s, 10.0, &config);
        assert!((out.position.x - 10.0).abs() < 1e-4);
    }

    #[test]
    fn extrapolation_blends_less() {
        let config = ClientConfig::default();
        let mut s = Sample {
            target: Transform::new(Vec3::X, Quat::from_rotation_y(1.0)),
            mode: SampleMode::Interpolated,
            zone: Zone::Near,
        };
        let interpolated = blend(Transform::default(), &s, 0.05, &config);
        s.mode = SampleMode::Extrapolated;
        let extrapolated = blend(Transform::default(), &s, 0.05, &config);
        assert!(extrapolated.position.x < interpolated.position.x);
        assert!(extrapolated.rotation.angle_between(Quat::IDENTITY)
            < interpolated.rotation.angle_between(Quat::IDENTITY));
    }

    #[test]
    fn shortest_path_slerp() {
        let q = Quat::from_rotation_y(0.2);
        let r = slerp_shortest(q, -q, 0.5);
        assert!(r.dot(q).abs() > 0.9999);
    }
}
