use std::fmt;
use std::sync::Arc;

use rsio_core::backend::{
    Backend, ErrorCallback, OutStreamDesc, RawOutStream, WriteCallback, WriteContext,
    XrunCallback,
};
use rsio_core::device::{Device, DeviceAim};
use rsio_core::format::SampleFormat;
use rsio_core::layout::ChannelLayout;
use rsio_core::{Error, Result};

use crate::negotiate::{self, Negotiated, StreamParams};

/// Host-side view of a stream's lifecycle.
///
/// `Created -> Opened -> Started <-> Paused`, and any of them `-> Closed`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum StreamState {
    Created,
    Opened,
    Started,
    Paused,
    Closed,
}

/// Output stream on one device.
///
/// Parameters and callbacks are set first, then [`OutStream::open()`] negotiates them with the
/// device. Dropping the stream closes it.
pub struct OutStream {
    backend: Arc<dyn Backend>,
    device: Device,
    params: StreamParams,
    write_callback: Option<WriteCallback>,
    underflow_callback: Option<XrunCallback>,
    error_callback: Option<ErrorCallback>,
    state: StreamState,
    negotiated: Option<Negotiated>,
    raw: Option<Box<dyn RawOutStream>>,
}

impl OutStream {
    pub(crate) fn new(backend: Arc<dyn Backend>, device: Device) -> OutStream {
        OutStream {
            backend,
            device,
            params: StreamParams::default(),
            write_callback: None,
            underflow_callback: None,
            error_callback: None,
            state: StreamState::Created,
            negotiated: None,
            raw: None,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.params.name = name.into();
    }

    /// Requests an exact sample format. By default the best supported one is picked.
    pub fn set_format(&mut self, format: SampleFormat) {
        self.params.format = Some(format);
    }

    /// Requests an exact layout. Overrides [`Self::set_channel_count()`].
    pub fn set_layout(&mut self, layout: ChannelLayout) {
        self.params.layout = Some(layout);
    }

    pub fn set_channel_count(&mut self, channel_count: usize) {
        self.params.channel_count = Some(channel_count);
    }

    /// `0` picks the supported rate nearest to 48 kHz.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.params.sample_rate = sample_rate;
    }

    /// Seconds. `0.0` keeps the device's current latency.
    pub fn set_software_latency(&mut self, latency: f64) {
        self.params.software_latency = latency;
    }

    /// Called on the backend's realtime thread with `(frame_count_min, frame_count_max)`.
    pub fn set_write_callback(
        &mut self,
        callback: impl FnMut(&mut dyn WriteContext, usize, usize) + Send + 'static,
    ) {
        self.write_callback = Some(Box::new(callback));
    }

    pub fn set_underflow_callback(&mut self, callback: impl FnMut() + Send + 'static) {
        self.underflow_callback = Some(Box::new(callback));
    }

    pub fn set_error_callback(&mut self, callback: impl FnMut(Error) + Send + 'static) {
        self.error_callback = Some(Box::new(callback));
    }

    /// Previews what [`Self::open()`] would settle on, without opening anything.
    pub fn negotiate(&self) -> Result<Negotiated> {
        negotiate::negotiate(&self.device, &self.params)
    }

    /// Negotiates the parameters and opens the stream on the backend.
    ///
    /// On failure the stream stays [`StreamState::Created`] with its callbacks in place, so it can
    /// be opened again.
    pub fn open(&mut self) -> Result<()> {
        if self.state != StreamState::Created {
            return Err(Error::invalid("stream is already open"));
        }

        if self.device.aim() != DeviceAim::Output {
            return Err(Error::invalid("not an output device"));
        }

        if self.write_callback.is_none() {
            return Err(Error::invalid("write callback not set"));
        }

        let negotiated = self.negotiate()?;

        let Some(write_callback) = self.write_callback.take() else {
            return Err(Error::invalid("write callback not set"));
        };

        let desc = OutStreamDesc {
            name: self.params.name.clone(),
            format: negotiated.format,
            layout: negotiated.layout.clone(),
            sample_rate: negotiated.sample_rate,
            software_latency: negotiated.software_latency,
            write_callback,
            underflow_callback: self.underflow_callback.take(),
            error_callback: self.error_callback.take(),
        };

        let raw = match self.backend.open_out_stream(&self.device, desc) {
            Ok(raw) => raw,
            Err(refused) => {
                let desc = refused.desc;
                self.write_callback = Some(desc.write_callback);
                self.underflow_callback = desc.underflow_callback;
                self.error_callback = desc.error_callback;
                return Err(refused.error);
            }
        };

        tracing::debug!(
            device = %self.device.id(),
            format = %negotiated.format,
            layout = %negotiated.layout,
            sample_rate = negotiated.sample_rate,
            latency = negotiated.software_latency,
            "opened output stream"
        );

        self.raw = Some(raw);
        self.negotiated = Some(negotiated);
        self.state = StreamState::Opened;
        Ok(())
    }

    /// Starts callbacks on an opened stream. A paused stream is resumed instead.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            StreamState::Opened => {
                self.raw()?.start()?;
                self.state = StreamState::Started;
                Ok(())
            }
            StreamState::Paused => self.pause(false),
            StreamState::Started => Err(Error::invalid("stream already started")),
            StreamState::Created | StreamState::Closed => {
                Err(Error::invalid("stream is not open"))
            }
        }
    }

    pub fn pause(&mut self, pause: bool) -> Result<()> {
        if !matches!(self.state, StreamState::Started | StreamState::Paused) {
            return Err(Error::invalid("stream is not started"));
        }

        self.raw()?.pause(pause)?;
        self.state = if pause {
            StreamState::Paused
        } else {
            StreamState::Started
        };
        Ok(())
    }

    /// Destroys the backend stream. No callback runs after this returns. Closing twice is a
    /// no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == StreamState::Closed {
            return Ok(());
        }

        if self.raw.take().is_some() {
            tracing::debug!(device = %self.device.id(), "closed output stream");
        }

        self.state = StreamState::Closed;
        Ok(())
    }

    pub fn clear_buffer(&mut self) -> Result<()> {
        self.raw()?.clear_buffer()
    }

    /// Seconds until a frame written now becomes audible.
    pub fn latency(&mut self) -> Result<f64> {
        self.raw()?.latency()
    }

    fn raw(&mut self) -> Result<&mut Box<dyn RawOutStream>> {
        self.raw.as_mut().ok_or(Error::invalid("stream is not open"))
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    /// Parameters the stream was opened with.
    pub fn negotiated(&self) -> Option<&Negotiated> {
        self.negotiated.as_ref()
    }

    pub fn layout_error(&self) -> Option<&Error> {
        self.negotiated.as_ref()?.layout_error.as_ref()
    }

    pub fn bytes_per_frame(&self) -> Option<usize> {
        self.negotiated.as_ref().map(Negotiated::bytes_per_frame)
    }

    pub fn bytes_per_sample(&self) -> Option<usize> {
        self.negotiated.as_ref().map(Negotiated::bytes_per_sample)
    }

    pub fn software_latency(&self) -> Option<f64> {
        self.negotiated.as_ref().map(|n| n.software_latency)
    }
}

impl Drop for OutStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for OutStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutStream")
            .field("device", &self.device)
            .field("state", &self.state)
            .field("negotiated", &self.negotiated)
            .finish_non_exhaustive()
    }
}
