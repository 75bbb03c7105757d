use std::time::{Duration, Instant};

/// Turns wall-clock time into a frame count at a nominal rate.
pub struct Pacer {
    sample_rate: f64,
    last: Instant,
    carry: f64,
}

impl Pacer {
    pub fn new(sample_rate: u32) -> Pacer {
        Pacer {
            sample_rate: f64::from(sample_rate),
            last: Instant::now(),
            carry: 0.0,
        }
    }

    /// Forgets time elapsed so far, e.g. while paused.
    pub fn reset(&mut self) {
        self.last = Instant::now();
        self.carry = 0.0;
    }

    /// Frames that became due since the last call.
    pub fn due(&mut self) -> usize {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        self.advance(elapsed)
    }

    fn advance(&mut self, elapsed: Duration) -> usize {
        self.carry += elapsed.as_secs_f64() * self.sample_rate;
        let frames = self.carry.floor();
        self.carry -= frames;
        frames as usize
    }
}

/// How often a stream thread wakes up: twice per buffer, at least once a millisecond.
pub fn period(buffer_frames: usize, sample_rate: u32) -> Duration {
    let buffer = buffer_frames as f64 / f64::from(sample_rate);
    Duration::from_secs_f64(buffer / 2.0).max(Duration::from_millis(1))
}
