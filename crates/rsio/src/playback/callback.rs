use std::sync::Arc;
use std::time::Instant;

use rsio_core::area::ChannelAreas;
use rsio_core::backend::WriteContext;
use rsio_core::sync::ring::Consumer;
use rsio_core::Error;

use super::drain::SilenceDrain;
use super::status::PlaybackStatus;
use crate::negotiate::Negotiated;

/// Write callback of a playback stream.
///
/// Plays samples from the ring until the feeder closes it, then appends enough silence to flush
/// the stream latency, pauses the stream and marks playback done. Runs on the realtime thread:
/// it never blocks and never allocates.
pub struct PlaybackCallback {
    consumer: Consumer<f32>,
    status: Arc<PlaybackStatus>,
    drain: SilenceDrain,
    channel_count: usize,
    software_latency: f64,
    clock: Box<dyn FnMut() -> Instant + Send>,
}

impl PlaybackCallback {
    pub fn new(
        consumer: Consumer<f32>,
        status: Arc<PlaybackStatus>,
        negotiated: &Negotiated,
    ) -> PlaybackCallback {
        let channel_count = negotiated.channel_count();

        PlaybackCallback {
            consumer,
            status,
            drain: SilenceDrain::new(negotiated.sample_rate, channel_count),
            channel_count,
            software_latency: negotiated.software_latency,
            clock: Box::new(Instant::now),
        }
    }

    /// Replaces the wall clock used to measure time spent between arming and draining.
    pub fn with_clock(mut self, clock: impl FnMut() -> Instant + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn write(
        &mut self,
        ctx: &mut dyn WriteContext,
        _frame_count_min: usize,
        frame_count_max: usize,
    ) {
        if self.status.is_done() {
            return;
        }

        let mut frames_left = frame_count_max;

        while frames_left > 0 {
            if self.drain.is_idle() && self.consumer.is_finished() {
                self.arm(ctx, 0);
            }

            if self.drain.is_armed() {
                let now = (self.clock)();
                self.drain.start(now);
            }

            let draining = self.drain.remaining().is_some();
            let request = if draining {
                self.drain.frames(frames_left)
            } else {
                frames_left
            };

            if draining && request == 0 {
                self.complete(ctx);
                return;
            }

            let mut areas = match ctx.begin_write(request) {
                Ok(areas) => areas,
                Err(e) => {
                    self.fail(e);
                    return;
                }
            };

            let granted = areas.frame_count();
            if granted == 0 {
                break;
            }

            let samples = areas.sample_count();
            let mut source_ended = None;
            let mut underrun = false;

            if draining {
                areas.fill_silence(0);
                self.drain.consume(samples);
            } else {
                let copied = self.copy_from_ring(&mut areas);
                if copied < samples {
                    areas.fill_silence(copied);
                    if self.consumer.is_finished() {
                        source_ended = Some(samples - copied);
                    } else {
                        underrun = true;
                    }
                }
            }

            drop(areas);
            let result = ctx.end_write();
            frames_left = frames_left.saturating_sub(granted);

            // Frames are committed even when an underflow is reported.
            if let Some(already_sent) = source_ended {
                self.arm(ctx, already_sent);
            }

            match result {
                Ok(()) => {}
                Err(Error::Underflow) => {
                    self.status.record_underflow();
                    return;
                }
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }

            if underrun {
                tracing::trace!(missing = samples, "feeder fell behind");
                return;
            }

            if self.drain.is_drained() {
                self.complete(ctx);
                return;
            }
        }
    }

    /// Copies whole frames from the ring into `areas`. Returns the number of samples copied.
    fn copy_from_ring(&mut self, areas: &mut ChannelAreas<'_>) -> usize {
        let available = self.consumer.fill_count();
        let wanted = areas
            .sample_count()
            .min(available - available % self.channel_count);

        let mut copied = 0;
        while copied < wanted {
            let region = self.consumer.readable_region();
            let len = region.len().min(wanted - copied);
            if len == 0 {
                break;
            }

            areas.copy_from_f32(copied, &region[..len]);
            self.consumer.advance_read(len);
            copied += len;
        }

        copied
    }

    /// Arms the drain with the latency measured now. Time is counted from after the query.
    fn arm(&mut self, ctx: &mut dyn WriteContext, already_sent: usize) {
        let latency = self.latency(ctx);
        let now = (self.clock)();
        tracing::trace!(already_sent, latency, "source ended");
        self.drain.arm(already_sent, latency, now);
    }

    fn latency(&self, ctx: &mut dyn WriteContext) -> f64 {
        match ctx.latency() {
            Ok(latency) => latency,
            Err(e) => {
                tracing::trace!(error = %e, "latency unavailable, using software latency");
                self.software_latency
            }
        }
    }

    fn complete(&mut self, ctx: &mut dyn WriteContext) {
        if let Err(e) = ctx.pause(true) {
            self.fail(e);
            return;
        }

        if self.status.finish() {
            tracing::trace!("playback drained");
        }
    }

    fn fail(&mut self, error: Error) {
        tracing::trace!(%error, "playback failed");
        self.status.fail(error);
    }
}
