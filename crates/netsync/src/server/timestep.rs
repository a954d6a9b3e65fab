/// Fixed-interval accumulator with a bounded number of ticks per frame.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    dt: f32,
    accumulator: f32,
    max_catch_up: u32,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32, max_catch_up: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
            max_catch_up: max_catch_up.max(1),
        }
    }

    pub fn max_catch_up(&self) -> u32 {
        self.max_catch_up
    }

    /// Changes the interval without losing accumulated time.
    pub fn set_tick_rate(&mut self, tick_rate: u32) {
        let tick_rate = tick_rate.max(1);
        if tick_rate != self.tick_rate {
            self.tick_rate = tick_rate;
            self.dt = 1.0 / tick_rate as f32;
        }
    }

    pub fn accumulate(&mut self, delta: f32) {
        if delta.is_finite() && delta > 0.0 {
            self.accumulator += delta;
        }
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    /// Discards whole intervals left over after the catch-up budget ran out.
    /// Returns how many were dropped; the sub-interval remainder is kept.
    pub fn drop_backlog(&mut self) -> u32 {
        if self.accumulator < self.dt {
            return 0;
        }
        let dropped = (self.accumulator / self.dt).floor();
        self.accumulator -= dropped * self.dt;
        if self.accumulator >= self.dt {
            self.accumulator = 0.0;
        }
        dropped as u32
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}
