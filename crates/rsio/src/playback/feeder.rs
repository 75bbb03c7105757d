use rsio_core::sync::ring::Producer;
use rsio_core::Result;

use super::source::SampleSource;

/// Moves samples from a [`SampleSource`] into the playback ring on the host thread.
///
/// Only whole frames are written. When the source ends (or fails) the producer is closed, which
/// the write callback observes once it has read everything.
pub struct Feeder {
    source: Box<dyn SampleSource>,
    producer: Producer<f32>,
    channel_count: usize,
    scratch: Vec<f32>,
    samples_fed: usize,
    finished: bool,
}

impl Feeder {
    pub fn new(source: Box<dyn SampleSource>, producer: Producer<f32>) -> Feeder {
        let channel_count = source.channel_count().max(1);
        let scratch = vec![0.0; producer.capacity()];

        Feeder {
            source,
            producer,
            channel_count,
            scratch,
            samples_fed: 0,
            finished: false,
        }
    }

    /// Tops up the ring. Returns `true` once the source is exhausted.
    pub fn fill(&mut self) -> Result<bool> {
        let mut budget = self.producer.capacity();

        while !self.finished && budget > 0 {
            let free = self.producer.free_count().min(budget);
            let wanted = free - free % self.channel_count;
            if wanted == 0 {
                break;
            }

            let read = match self.source.read(&mut self.scratch[..wanted]) {
                Ok(read) => read,
                Err(e) => {
                    self.finish();
                    return Err(e);
                }
            };

            // Complete a trailing partial frame with silence.
            let padded = read.next_multiple_of(self.channel_count);
            self.scratch[read..padded].fill(0.0);

            let written = self.producer.write_slice(&self.scratch[..padded]);
            debug_assert_eq!(written, padded);
            self.samples_fed += written;
            budget -= wanted;

            if read < wanted {
                self.finish();
            }
        }

        Ok(self.finished)
    }

    fn finish(&mut self) {
        if !self.finished {
            tracing::debug!(samples = self.samples_fed, "sample source exhausted");
            self.finished = true;
            self.producer.close();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Samples written into the ring so far, including padding.
    pub fn samples_fed(&self) -> usize {
        self.samples_fed
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }
}

#[cfg(test)]
mod tests {
    use rsio_core::sync::ring;
    use rsio_core::Error;

    use super::*;
    use crate::playback::source::VecSource;

    struct FailingSource;

    impl SampleSource for FailingSource {
        fn channel_count(&self) -> usize {
            1
        }

        fn sample_rate(&self) -> u32 {
            8000
        }

        fn read(&mut self, _buf: &mut [f32]) -> Result<usize> {
            Err(Error::new_source("disk on fire"))
        }
    }

    #[test]
    fn fills_whole_frames_and_closes() {
        let (producer, mut consumer) = ring::buffer(8);
        let source = VecSource::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0], 2, 8000);
        let mut feeder = Feeder::new(Box::new(source), producer);

        assert!(!feeder.fill().unwrap());
        assert_eq!(feeder.samples_fed(), 8);
        assert!(!consumer.is_finished());

        let mut out = [0.0; 8];
        assert_eq!(consumer.read_slice(&mut out), 8);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

        assert!(feeder.fill().unwrap());
        assert!(feeder.is_finished());
        assert_eq!(feeder.samples_fed(), 10);

        let mut out = [0.0; 8];
        assert_eq!(consumer.read_slice(&mut out), 2);
        assert_eq!(out[..2], [9.0, 0.0]);
        assert!(consumer.is_finished());
    }

    #[test]
    fn odd_capacity_leaves_room() {
        let (producer, mut consumer) = ring::buffer(8);
        let source = VecSource::new(vec![0.5; 30], 3, 8000);
        let mut feeder = Feeder::new(Box::new(source), producer);

        assert!(!feeder.fill().unwrap());
        assert_eq!(consumer.fill_count(), 6);
        assert!(!consumer.is_finished());
    }

    #[test]
    fn source_error_closes_the_ring() {
        let (producer, mut consumer) = ring::buffer(8);
        let mut feeder = Feeder::new(Box::new(FailingSource), producer);

        assert!(matches!(feeder.fill(), Err(Error::Source { .. })));
        assert!(feeder.is_finished());
        assert!(consumer.is_finished());
        assert!(feeder.fill().unwrap());
    }
}
