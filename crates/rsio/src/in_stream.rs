use std::fmt;
use std::sync::Arc;

use rsio_core::backend::{
    Backend, ErrorCallback, InStreamDesc, RawInStream, ReadCallback, ReadContext, XrunCallback,
};
use rsio_core::device::{Device, DeviceAim};
use rsio_core::format::SampleFormat;
use rsio_core::layout::ChannelLayout;
use rsio_core::{Error, Result};

use crate::negotiate::{self, Negotiated, StreamParams};
use crate::out_stream::StreamState;

/// Input stream on one device. Same lifecycle as [`crate::OutStream`].
pub struct InStream {
    backend: Arc<dyn Backend>,
    device: Device,
    params: StreamParams,
    read_callback: Option<ReadCallback>,
    overflow_callback: Option<XrunCallback>,
    error_callback: Option<ErrorCallback>,
    state: StreamState,
    negotiated: Option<Negotiated>,
    raw: Option<Box<dyn RawInStream>>,
}

impl InStream {
    pub(crate) fn new(backend: Arc<dyn Backend>, device: Device) -> InStream {
        InStream {
            backend,
            device,
            params: StreamParams::default(),
            read_callback: None,
            overflow_callback: None,
            error_callback: None,
            state: StreamState::Created,
            negotiated: None,
            raw: None,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.params.name = name.into();
    }

    pub fn set_format(&mut self, format: SampleFormat) {
        self.params.format = Some(format);
    }

    pub fn set_layout(&mut self, layout: ChannelLayout) {
        self.params.layout = Some(layout);
    }

    pub fn set_channel_count(&mut self, channel_count: usize) {
        self.params.channel_count = Some(channel_count);
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.params.sample_rate = sample_rate;
    }

    pub fn set_software_latency(&mut self, latency: f64) {
        self.params.software_latency = latency;
    }

    /// Called on the backend's realtime thread with `(frame_count_min, frame_count_max)`.
    pub fn set_read_callback(
        &mut self,
        callback: impl FnMut(&mut dyn ReadContext, usize, usize) + Send + 'static,
    ) {
        self.read_callback = Some(Box::new(callback));
    }

    pub fn set_overflow_callback(&mut self, callback: impl FnMut() + Send + 'static) {
        self.overflow_callback = Some(Box::new(callback));
    }

    pub fn set_error_callback(&mut self, callback: impl FnMut(Error) + Send + 'static) {
        self.error_callback = Some(Box::new(callback));
    }

    pub fn negotiate(&self) -> Result<Negotiated> {
        negotiate::negotiate(&self.device, &self.params)
    }

    pub fn open(&mut self) -> Result<()> {
        if self.state != StreamState::Created {
            return Err(Error::invalid("stream is already open"));
        }

        if self.device.aim() != DeviceAim::Input {
            return Err(Error::invalid("not an input device"));
        }

        if self.read_callback.is_none() {
            return Err(Error::invalid("read callback not set"));
        }

        let negotiated = self.negotiate()?;

        let Some(read_callback) = self.read_callback.take() else {
            return Err(Error::invalid("read callback not set"));
        };

        let desc = InStreamDesc {
            name: self.params.name.clone(),
            format: negotiated.format,
            layout: negotiated.layout.clone(),
            sample_rate: negotiated.sample_rate,
            software_latency: negotiated.software_latency,
            read_callback,
            overflow_callback: self.overflow_callback.take(),
            error_callback: self.error_callback.take(),
        };

        let raw = match self.backend.open_in_stream(&self.device, desc) {
            Ok(raw) => raw,
            Err(refused) => {
                let desc = refused.desc;
                self.read_callback = Some(desc.read_callback);
                self.overflow_callback = desc.overflow_callback;
                self.error_callback = desc.error_callback;
                return Err(refused.error);
            }
        };
        self.raw = Some(raw);

        tracing::debug!(
            device = %self.device.id(),
            format = %negotiated.format,
            layout = %negotiated.layout,
            sample_rate = negotiated.sample_rate,
            "opened input stream"
        );

        self.negotiated = Some(negotiated);
        self.state = StreamState::Opened;
        Ok(())
    }

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

    pub fn close(&mut self) -> Result<()> {
        if self.state != StreamState::Closed {
            self.raw = None;
            self.state = StreamState::Closed;
        }
        Ok(())
    }

    pub fn latency(&mut self) -> Result<f64> {
        self.raw()?.latency()
    }

    fn raw(&mut self) -> Result<&mut Box<dyn RawInStream>> {
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

    pub fn negotiated(&self) -> Option<&Negotiated> {
        self.negotiated.as_ref()
    }

    pub fn layout_error(&self) -> Option<&Error> {
        self.negotiated.as_ref()?.layout_error.as_ref()
    }

    pub fn bytes_per_frame(&self) -> Option<usize> {
        self.negotiated.as_ref().map(Negotiated::bytes_per_frame)
    }
}

impl Drop for InStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for InStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InStream")
            .field("device", &self.device)
            .field("state", &self.state)
            .field("negotiated", &self.negotiated)
            .finish_non_exhaustive()
    }
}
