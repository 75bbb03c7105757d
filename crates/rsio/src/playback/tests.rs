use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rsio_core::area::ChannelAreas;
use rsio_core::backend::WriteContext;
use rsio_core::format::SampleFormat;
use rsio_core::layout::ChannelLayout;
use rsio_core::sync::ring::{self, Producer};
use rsio_core::{Error, Result};
use rsio_dummy::{DummyBackend, DummyConfig};

use super::*;
use crate::Context;

#[derive(Clone)]
struct TestClock {
    base: Instant,
    micros: Arc<AtomicU64>,
}

impl TestClock {
    fn new() -> TestClock {
        TestClock {
            base: Instant::now(),
            micros: Arc::new(AtomicU64::new(0)),
        }
    }

    fn advance(&self, duration: Duration) {
        self.micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    fn now(&self) -> Instant {
        self.base + Duration::from_micros(self.micros.load(Ordering::Relaxed))
    }
}

/// Records everything the callback does to its stream.
struct MockContext {
    channel_count: usize,
    max_frames_per_write: usize,
    buffer: Vec<u8>,
    pending: Option<usize>,
    commits: Vec<usize>,
    written: Vec<f32>,
    end_results: VecDeque<Result<()>>,
    latency: Result<f64>,
    /// Advanced on every latency query.
    latency_cost: Option<(TestClock, Duration)>,
    pauses: Vec<bool>,
}

impl MockContext {
    fn new(channel_count: usize, max_frames_per_write: usize, latency: Result<f64>) -> MockContext {
        MockContext {
            channel_count,
            max_frames_per_write,
            buffer: Vec::new(),
            pending: None,
            commits: Vec::new(),
            written: Vec::new(),
            end_results: VecDeque::new(),
            latency,
            latency_cost: None,
            pauses: Vec::new(),
        }
    }

    fn bytes_per_frame(&self) -> usize {
        4 * self.channel_count
    }

    fn frames_written(&self) -> usize {
        self.commits.iter().sum()
    }
}

impl WriteContext for MockContext {
    fn begin_write(&mut self, frame_count: usize) -> Result<ChannelAreas<'_>> {
        assert!(self.pending.is_none(), "begin_write twice");

        let frames = frame_count.min(self.max_frames_per_write);
        let bytes = frames * self.bytes_per_frame();
        self.buffer.clear();
        self.buffer.resize(bytes, 0xAA);
        self.pending = Some(frames);

        Ok(ChannelAreas::new(
            &mut self.buffer,
            SampleFormat::F32NE,
            self.channel_count,
        ))
    }

    fn end_write(&mut self) -> Result<()> {
        let frames = self.pending.take().expect("end_write without begin_write");
        self.commits.push(frames);
        self.written.extend(
            self.buffer
                .chunks_exact(4)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]])),
        );
        self.end_results.pop_front().unwrap_or(Ok(()))
    }

    fn latency(&mut self) -> Result<f64> {
        if let Some((clock, cost)) = &self.latency_cost {
            clock.advance(*cost);
        }
        self.latency.clone()
    }

    fn pause(&mut self, pause: bool) -> Result<()> {
        self.pauses.push(pause);
        Ok(())
    }
}

struct Harness {
    callback: PlaybackCallback,
    status: Arc<PlaybackStatus>,
    producer: Producer<f32>,
    clock: TestClock,
}

fn harness(channel_count: usize, samples: &[f32], close: bool) -> Harness {
    let negotiated = Negotiated {
        format: SampleFormat::F32NE,
        layout: ChannelLayout::default_for(channel_count).unwrap(),
        layout_error: None,
        sample_rate: 48000,
        software_latency: 0.05,
    };

    let (mut producer, consumer) = ring::buffer(1 << 14);
    assert_eq!(producer.write_slice(samples), samples.len());
    if close {
        producer.close();
    }

    let status = Arc::new(PlaybackStatus::new(None));
    let clock = TestClock::new();
    let callback = PlaybackCallback::new(consumer, status.clone(), &negotiated).with_clock({
        let clock = clock.clone();
        move || clock.now()
    });

    Harness {
        callback,
        status,
        producer,
        clock,
    }
}

#[test]
fn drain_completes_exactly_once() {
    let mut h = harness(2, &[], true);
    let mut ctx = MockContext::new(2, 1000, Ok(0.05));

    for _ in 0..6 {
        h.callback.write(&mut ctx, 0, 1000);
    }

    // round(48000 * 2 * 0.05) samples of silence.
    assert_eq!(ctx.commits, [1000, 1000, 400]);
    assert_eq!(ctx.written.len(), 4800);
    assert!(ctx.written.iter().all(|&s| s == 0.0));
    assert_eq!(ctx.pauses, [true]);
    assert!(h.status.is_done());
    assert_eq!(h.status.take_error(), None);
}

#[test]
fn silence_accounts_for_elapsed_time() {
    let mut h = harness(2, &[0.5; 100], true);
    let mut ctx = MockContext::new(2, 1000, Ok(0.05));

    // The source ends 50 frames into a 150 frame region: 200 silent samples already sent.
    h.callback.write(&mut ctx, 150, 150);
    assert_eq!(ctx.commits, [150]);
    assert!(ctx.pauses.is_empty());

    h.clock.advance(Duration::from_millis(10));
    h.callback.write(&mut ctx, 0, 10_000);

    // round(96000 * (0.05 - 0.01)) - 200 = 3640 samples.
    assert_eq!(ctx.commits, [150, 1000, 820]);
    assert!(ctx.written[..100].iter().all(|&s| s == 0.5));
    assert!(ctx.written[100..].iter().all(|&s| s == 0.0));
    assert_eq!(ctx.pauses, [true]);
    assert!(h.status.is_done());
}

#[test]
fn silence_follows_source_in_same_write() {
    let mut h = harness(2, &[0.5; 100], true);
    let mut ctx = MockContext::new(2, 1000, Ok(0.05));

    // 1900 silent samples pad the first region, 4800 - 1900 more are still needed.
    h.callback.write(&mut ctx, 0, 10_000);

    assert_eq!(ctx.commits, [1000, 1000, 450]);
    assert_eq!(ctx.written.len(), 4900);
    assert!(ctx.written[..100].iter().all(|&s| s == 0.5));
    assert!(ctx.written[100..].iter().all(|&s| s == 0.0));
    assert_eq!(ctx.pauses, [true]);
    assert!(h.status.is_done());
}

#[test]
fn elapsed_time_starts_after_latency_query() {
    let mut h = harness(2, &[0.5; 100], true);
    let mut ctx = MockContext::new(2, 1000, Ok(0.05));
    ctx.latency_cost = Some((h.clock.clone(), Duration::from_millis(10)));

    h.callback.write(&mut ctx, 150, 150);
    h.callback.write(&mut ctx, 0, 10_000);

    // The 10ms spent querying the latency is not subtracted: 4800 - 200 samples.
    assert_eq!(ctx.commits, [150, 1000, 1000, 300]);
    assert!(h.status.is_done());
}

#[test]
fn late_drain_is_clamped() {
    let mut h = harness(2, &[0.25; 10], true);
    let mut ctx = MockContext::new(2, 1000, Ok(0.01));

    h.callback.write(&mut ctx, 0, 100);
    h.clock.advance(Duration::from_millis(500));
    h.callback.write(&mut ctx, 0, 100);
    h.callback.write(&mut ctx, 0, 100);

    assert_eq!(ctx.commits, [100]);
    assert_eq!(ctx.pauses, [true]);
    assert!(h.status.is_done());
}

#[test]
fn missing_latency_falls_back_to_negotiated() {
    let mut h = harness(1, &[], true);
    let mut ctx = MockContext::new(1, usize::MAX, Err(Error::Streaming));

    h.callback.write(&mut ctx, 0, 100_000);

    assert_eq!(ctx.frames_written(), 2400);
    assert_eq!(ctx.pauses, [true]);
    assert_eq!(h.status.take_error(), None);
}

#[test]
fn underflow_is_not_fatal() {
    let mut h = harness(2, &[0.1; 1000], false);
    let mut ctx = MockContext::new(2, 1000, Ok(0.05));
    ctx.end_results.push_back(Err(Error::Underflow));

    h.callback.write(&mut ctx, 0, 100);
    assert_eq!(ctx.commits, [100]);
    assert!(!h.status.is_done());
    assert_eq!(h.status.underflows(), 1);
    assert!(ctx.pauses.is_empty());

    h.callback.write(&mut ctx, 0, 100);
    assert_eq!(ctx.commits, [100, 100]);
    assert!(ctx.written.iter().all(|&s| s == 0.1));
    assert!(!h.status.is_done());
}

#[test]
fn fatal_error_finishes_once() {
    let mut h = harness(2, &[0.1; 1000], false);
    let mut ctx = MockContext::new(2, 10, Ok(0.05));
    ctx.end_results.extend([Ok(()), Ok(()), Err(Error::Streaming), Err(Error::Interrupted)]);

    h.callback.write(&mut ctx, 0, 100);
    assert_eq!(ctx.commits.len(), 3);
    assert!(h.status.is_done());

    h.callback.write(&mut ctx, 0, 100);
    assert_eq!(ctx.commits.len(), 3);

    assert_eq!(h.status.take_error(), Some(Error::Streaming));
    assert_eq!(h.status.take_error(), None);
    assert!(ctx.pauses.is_empty());
}

#[test]
fn starved_ring_plays_silence() {
    let samples: Vec<f32> = (1..=20).map(|i| i as f32).collect();
    let mut h = harness(2, &samples, false);
    let mut ctx = MockContext::new(2, 1000, Ok(0.05));

    h.callback.write(&mut ctx, 0, 50);
    assert_eq!(ctx.commits, [50]);
    assert_eq!(ctx.written[..20], samples[..]);
    assert!(ctx.written[20..].iter().all(|&s| s == 0.0));
    assert!(!h.status.is_done());

    // Playback resumes once the feeder catches up.
    h.producer.write_slice(&[0.5; 8]);
    h.callback.write(&mut ctx, 0, 4);
    assert_eq!(ctx.commits, [50, 4]);
    assert!(ctx.written[100..].iter().all(|&s| s == 0.5));
    assert!(ctx.pauses.is_empty());
}

#[test]
fn plays_through_dummy_backend() {
    let mut context = Context::with_backend(Box::new(DummyBackend::new(DummyConfig::default())))
        .unwrap();
    let device = context.default_output_device().unwrap();

    // 0.1s of mono audio at 8 kHz, played on a stereo layout.
    let source = VecSource::new(vec![0.25; 800], 1, 8000);
    let config = PlaybackConfig {
        software_latency: 0.05,
        poll_interval: Duration::from_millis(10),
        drain_grace: Duration::from_millis(10),
        ..PlaybackConfig::default()
    };

    let player = Player::open(&context, &device, Box::new(source), config).unwrap();
    assert_eq!(player.negotiated().sample_rate, 8000);
    assert_eq!(player.negotiated().channel_count(), 1);

    let report = player.run(&mut context).unwrap();
    assert_eq!(report.samples_fed, 800);
    assert!(report.elapsed < Duration::from_secs(5));
}

#[test]
fn disconnect_stops_playback() {
    let backend = DummyBackend::new(DummyConfig::default());
    let control = backend.control();
    let mut context = Context::with_backend(Box::new(backend)).unwrap();
    let device = context.default_output_device().unwrap();

    // Long enough that the disconnect lands mid-playback.
    let source = VecSource::new(vec![0.0; 8000 * 10], 1, 8000);
    let config = PlaybackConfig {
        poll_interval: Duration::from_millis(10),
        ..PlaybackConfig::default()
    };
    let player = Player::open(&context, &device, Box::new(source), config).unwrap();

    let thread = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        control.disconnect();
    });

    assert_eq!(player.run(&mut context), Err(Error::BackendDisconnected));
    thread.join().unwrap();
}
