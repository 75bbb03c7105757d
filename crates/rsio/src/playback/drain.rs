use std::time::Instant;

/// Samples of silence still needed to push the last real sample through `latency` seconds of
/// buffering, `elapsed` seconds after the latency was measured. Never negative.
pub fn silence_samples(
    sample_rate: u32,
    channel_count: usize,
    latency: f64,
    elapsed: f64,
    already_sent: usize,
) -> usize {
    let corrected = (latency - elapsed).max(0.0);
    let total = (f64::from(sample_rate) * channel_count as f64 * corrected).round() as usize;
    total.saturating_sub(already_sent)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Idle,
    Armed {
        already_sent: usize,
        latency: f64,
        since: Instant,
    },
    Draining {
        remaining: usize,
    },
}

/// Silence appended after the source ends so the tail of the audio plays out before the stream
/// is paused.
///
/// `Idle -> Armed` when the source runs out, `Armed -> Draining` before the next region, where the
/// time spent in between is subtracted from the measured latency.
#[derive(Debug, Clone)]
pub struct SilenceDrain {
    sample_rate: u32,
    channel_count: usize,
    state: State,
}

impl SilenceDrain {
    pub fn new(sample_rate: u32, channel_count: usize) -> SilenceDrain {
        SilenceDrain {
            sample_rate,
            channel_count,
            state: State::Idle,
        }
    }

    /// Arms the drain. `already_sent` counts silent samples written in the region where the
    /// source ended; `latency` is the stream latency right after that region was committed.
    pub fn arm(&mut self, already_sent: usize, latency: f64, now: Instant) {
        if self.state == State::Idle {
            self.state = State::Armed {
                already_sent,
                latency,
                since: now,
            };
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, State::Armed { .. })
    }

    /// Turns an armed drain into a silence count, correcting for the time since arming.
    pub fn start(&mut self, now: Instant) {
        if let State::Armed {
            already_sent,
            latency,
            since,
        } = self.state
        {
            let elapsed = now.saturating_duration_since(since).as_secs_f64();
            let remaining = silence_samples(
                self.sample_rate,
                self.channel_count,
                latency,
                elapsed,
                already_sent,
            );

            tracing::trace!(remaining, latency, elapsed, "draining");
            self.state = State::Draining { remaining };
        }
    }

    /// Silent samples still to write, once draining.
    pub fn remaining(&self) -> Option<usize> {
        match self.state {
            State::Draining { remaining } => Some(remaining),
            _ => None,
        }
    }

    /// Frames to request for the next silent region, at most `max`.
    pub fn frames(&self, max: usize) -> usize {
        let remaining = self.remaining().unwrap_or(0);
        remaining.div_ceil(self.channel_count.max(1)).min(max)
    }

    /// Counts `samples` silent samples as written.
    pub fn consume(&mut self, samples: usize) {
        if let State::Draining { remaining } = &mut self.state {
            *remaining = remaining.saturating_sub(samples);
        }
    }

    pub fn is_drained(&self) -> bool {
        self.state == State::Draining { remaining: 0 }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn silence_arithmetic() {
        assert_eq!(silence_samples(48000, 2, 0.05, 0.0, 0), 4800);
        assert_eq!(silence_samples(48000, 2, 0.05, 0.01, 200), 3640);
        assert_eq!(silence_samples(48000, 2, 0.05, 0.2, 0), 0);
        assert_eq!(silence_samples(48000, 2, 0.01, 0.0, 5000), 0);
        assert_eq!(silence_samples(44100, 1, 0.0, 0.0, 0), 0);
    }

    #[test]
    fn drain_lifecycle() {
        let start = Instant::now();
        let mut drain = SilenceDrain::new(48000, 2);
        assert!(drain.is_idle());
        assert_eq!(drain.remaining(), None);

        drain.arm(200, 0.05, start);
        assert!(drain.is_armed());

        // Re-arming keeps the first measurement.
        drain.arm(0, 1.0, start);

        drain.start(start + Duration::from_millis(10));
        assert_eq!(drain.remaining(), Some(3640));
        assert_eq!(drain.frames(10_000), 1820);
        assert_eq!(drain.frames(100), 100);

        drain.consume(3000);
        assert_eq!(drain.remaining(), Some(640));
        assert!(!drain.is_drained());

        drain.consume(1000);
        assert!(drain.is_drained());
        assert_eq!(drain.frames(100), 0);
    }

    #[test]
    fn odd_sample_count_rounds_up_to_frames() {
        let mut drain = SilenceDrain::new(10, 2);
        let now = Instant::now();
        drain.arm(1, 0.5, now);
        drain.start(now);
        assert_eq!(drain.remaining(), Some(9));
        assert_eq!(drain.frames(100), 5);
    }
}
