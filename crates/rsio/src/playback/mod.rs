//! Plays a finite [`SampleSource`] on an output device.
//!
//! The host thread reads the source into a lock-free ring ([`Feeder`]), the backend's realtime
//! thread copies it out ([`PlaybackCallback`]) and appends a silence tail once the ring is
//! closed. [`Player::run()`] drives the whole thing from the host side.

mod callback;
mod drain;
mod feeder;
mod source;
mod status;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rsio_core::backend::{Event, WriteContext};
use rsio_core::device::Device;
use rsio_core::sync::ring;
use rsio_core::Result;

pub use self::callback::PlaybackCallback;
pub use self::drain::{silence_samples, SilenceDrain};
pub use self::feeder::Feeder;
pub use self::source::{remix, Remix, SampleSource, VecSource};
pub use self::status::PlaybackStatus;
use crate::{Context, Negotiated, OutStream};

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub stream_name: String,
    /// Seconds. `0.0` keeps the device's current latency.
    pub software_latency: f64,
    /// Seconds of audio the ring between feeder and callback holds.
    pub buffer_duration: f64,
    /// How often the host refills the ring and checks for events.
    pub poll_interval: Duration,
    /// Time given to the device to play out its buffers before the stream is closed.
    pub drain_grace: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> PlaybackConfig {
        PlaybackConfig {
            stream_name: "rsio-play".into(),
            software_latency: 0.0,
            buffer_duration: 0.5,
            poll_interval: Duration::from_millis(100),
            drain_grace: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub negotiated: Negotiated,
    /// Samples handed to the stream, silence padding of a trailing partial frame included.
    pub samples_fed: usize,
    pub underflows: usize,
    /// Errors recorded after the error queue filled up.
    pub dropped_errors: usize,
    pub elapsed: Duration,
}

/// An opened, not yet started, playback stream.
pub struct Player {
    stream: OutStream,
    feeder: Feeder,
    status: Arc<PlaybackStatus>,
    negotiated: Negotiated,
    config: PlaybackConfig,
}

impl Player {
    /// Negotiates a stream for `source` on `device` and opens it. The source is remixed if the
    /// device lacks a layout with its channel count.
    pub fn open(
        context: &Context,
        device: &Device,
        source: Box<dyn SampleSource>,
        config: PlaybackConfig,
    ) -> Result<Player> {
        let mut stream = context.out_stream(device)?;
        stream.set_name(config.stream_name.clone());
        stream.set_channel_count(source.channel_count());
        stream.set_sample_rate(source.sample_rate());
        stream.set_software_latency(config.software_latency);

        let negotiated = stream.negotiate()?;
        let channel_count = negotiated.channel_count();
        let source = remix(source, channel_count);

        let ring_frames = (config.buffer_duration * f64::from(negotiated.sample_rate)).ceil();
        let (producer, consumer) =
            ring::buffer_at_least((ring_frames as usize).max(1) * channel_count);

        let mut feeder = Feeder::new(source, producer);
        feeder.fill()?;

        let status = Arc::new(PlaybackStatus::new(Some(context.waker())));

        let mut callback = PlaybackCallback::new(consumer, status.clone(), &negotiated);
        stream.set_write_callback(move |ctx: &mut dyn WriteContext, min, max| {
            callback.write(ctx, min, max)
        });

        let errors = status.clone();
        stream.set_error_callback(move |error| errors.fail(error));

        stream.open()?;

        tracing::info!(
            device = %device.id(),
            format = %negotiated.format,
            layout = %negotiated.layout,
            sample_rate = negotiated.sample_rate,
            latency = negotiated.software_latency,
            "opened playback stream"
        );

        Ok(Player {
            stream,
            feeder,
            status,
            negotiated,
            config,
        })
    }

    pub fn negotiated(&self) -> &Negotiated {
        &self.negotiated
    }

    pub fn stream(&self) -> &OutStream {
        &self.stream
    }

    /// Starts the stream and keeps the ring filled until the drain completes, then closes the
    /// stream. Returns the first error raised on either thread.
    pub fn run(mut self, context: &mut Context) -> Result<PlaybackReport> {
        let started = Instant::now();
        self.stream.start()?;

        while !self.status.is_done() {
            if let Err(e) = self.feeder.fill() {
                self.status.fail(e);
                break;
            }

            for event in context.wait_events_timeout(self.config.poll_interval) {
                if let Event::BackendDisconnected(e) = event {
                    self.status.fail(e);
                }
            }
        }

        let error = self.status.take_error();
        if error.is_none() {
            std::thread::sleep(self.config.drain_grace);
        }

        self.stream.close()?;

        if let Some(error) = error {
            while let Some(other) = self.status.take_error() {
                tracing::warn!(error = %other, "further playback error");
            }
            let dropped = self.status.dropped_errors();
            if dropped > 0 {
                tracing::warn!(dropped, "playback errors lost to a full queue");
            }
            tracing::error!(%error, "playback failed");
            return Err(error);
        }

        let report = PlaybackReport {
            negotiated: self.negotiated.clone(),
            samples_fed: self.feeder.samples_fed(),
            underflows: self.status.underflows(),
            dropped_errors: self.status.dropped_errors(),
            elapsed: started.elapsed(),
        };

        tracing::info!(
            samples = report.samples_fed,
            underflows = report.underflows,
            elapsed = ?report.elapsed,
            "playback finished"
        );

        Ok(report)
    }
}
