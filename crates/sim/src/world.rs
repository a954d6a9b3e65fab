use glam::{Quat, Vec3};

use netsync::{EntityId, EntitySource, Snapshot};

/// xorshift64*, enough for reproducible synthetic motion.
#[derive(Debug, Clone)]
pub struct SimRng(u64);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }

    pub fn chance(&mut self, percent: f32) -> bool {
        self.next_f32() * 100.0 < percent
    }
}

#[derive(Debug, Clone)]
struct Mover {
    id: EntityId,
    radius: f32,
    angle: f32,
    angular_speed: f32,
    height: f32,
    health: i32,
    flags: u32,
}

impl Mover {
    fn snapshot(&self) -> Snapshot {
        let position = Vec3::new(
            self.radius * self.angle.cos(),
            self.height,
            self.radius * self.angle.sin(),
        );
        let speed = self.radius * self.angular_speed;
        let velocity = Vec3::new(-self.angle.sin(), 0.0, self.angle.cos()) * speed;
        let heading = Quat::from_rotation_y(-self.angle);
        Snapshot::new(position, heading)
            .with_velocity(velocity)
            .with_health(self.health)
            .with_flags(self.flags)
    }
}

/// Entities circling the origin at assorted radii, some outside every
/// observer's interest.
#[derive(Debug)]
pub struct SyntheticWorld {
    movers: Vec<Mover>,
    snapshots: Vec<(EntityId, Snapshot)>,
    rng: SimRng,
}

impl SyntheticWorld {
    pub fn new(entities: usize, max_radius: f32, seed: u64) -> Self {
        let mut rng = SimRng::new(seed);
        let movers = (0..entities)
            .map(|i| Mover {
                id: EntityId::new(1 + (i as i64 % 4), i as u32),
                radius: rng.range(5.0, max_radius),
                angle: rng.range(0.0, std::f32::consts::TAU),
                angular_speed: rng.range(-0.3, 0.3),
                height: rng.range(0.0, 3.0),
                health: 100,
                flags: 0,
            })
            .collect();

        let mut world = Self {
            movers,
            snapshots: Vec::with_capacity(entities),
            rng,
        };
        world.refresh();
        world
    }

    pub fn len(&self) -> usize {
        self.movers.len()
    }

    pub fn step(&mut self, dt: f32) {
        for mover in &mut self.movers {
            mover.angle = (mover.angle + mover.angular_speed * dt) % std::f32::consts::TAU;
            if self.rng.chance(0.2) {
                mover.health = (mover.health - 1).max(0);
            }
            if self.rng.chance(0.05) {
                mover.flags ^= 1 << (self.rng.next_u64() % 4);
            }
        }
        self.refresh();
    }

    pub fn position(&self, id: EntityId) -> Option<Vec3> {
        self.snapshots
            .iter()
            .find(|(e, _)| *e == id)
            .map(|(_, s)| s.position)
    }

    fn refresh(&mut self) {
        self.snapshots.clear();
        self.snapshots
            .extend(self.movers.iter().map(|m| (m.id, m.snapshot())));
    }
}

impl EntitySource for SyntheticWorld {
    fn capture(&self, out: &mut Vec<(EntityId, Snapshot)>) {
        out.extend_from_slice(&self.snapshots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_is_reproducible() {
        let mut a = SimRng::new(7);
        let mut b = SimRng::new(7);
        for _ in 0..10 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        let x = a.next_f32();
        assert!((0.0..1.0).contains(&x));
    }

    #[test]
    fn world_moves_entities() {
        let mut world = SyntheticWorld::new(8, 100.0, 3);
        let mut before = Vec::new();
        world.capture(&mut before);
        world.step(1.0);
        let mut after = Vec::new();
        world.capture(&mut after);

        assert_eq!(before.len(), 8);
        assert!(before.iter().zip(&after).any(|(a, b)| a.1.position != b.1.position));
        assert!(world.position(before[0].0).is_some());
    }
}
