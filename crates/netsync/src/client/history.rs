use crate::snapshot::Snapshot;
use crate::zone::Zone;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatePoint {
    /// Local receive time in seconds.
    pub timestamp: f64,
    pub state: Snapshot,
    pub zone: Zone,
}

/// Fixed-capacity ring of received states for one entity. The oldest point
/// is overwritten once full.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    points: Vec<Option<StatePoint>>,
    head: usize,
    len: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.points.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, point: StatePoint) {
        let capacity = self.capacity();
        self.points[self.head] = Some(point);
        self.head = (self.head + 1) % capacity;
        self.len = (self.len + 1).min(capacity);
    }

    pub fn try_get_last(&self) -> Option<&StatePoint> {
        if self.len == 0 {
            return None;
        }
        let capacity = self.capacity();
        self.points[(self.head + capacity - 1) % capacity].as_ref()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &StatePoint> {
        let capacity = self.capacity();
        let start = (self.head + capacity - self.len) % capacity;
        (0..self.len).filter_map(move |i| self.points[(start + i) % capacity].as_ref())
    }

    /// First adjacent pair with `a.timestamp <= target <= b.timestamp`.
    pub fn try_get_bracket(&self, target: f64) -> Option<(&StatePoint, &StatePoint)> {
        let mut points = self.iter();
        let mut prev = points.next()?;
        for next in points {
            if prev.timestamp <= target && target <= next.timestamp {
                return Some((prev, next));
            }
            prev = next;
        }
        None
    }

    pub fn clear(&mut self) {
        for slot in &mut self.points {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }

    /// Rebuilds the ring at a new capacity keeping the newest points.
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.capacity() {
            return;
        }
        let keep: Vec<StatePoint> = {
            let skip = self.len.saturating_sub(capacity);
            self.iter().skip(skip).copied().collect()
        };
        *self = Self::new(capacity);
        for point in keep {
            self.push(point);
        }
    }
}
