use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use crossbeam_utils::sync::Unparker;

use crate::area::{ChannelAreas, ReadAreas};
use crate::device::Device;
use crate::format::SampleFormat;
use crate::layout::ChannelLayout;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum BackendKind {
    Jack,
    PulseAudio,
    Alsa,
    CoreAudio,
    Wasapi,
    Dummy,
}

impl BackendKind {
    /// In the order automatic connection tries them.
    pub const ALL: [BackendKind; 6] = [
        BackendKind::Jack,
        BackendKind::PulseAudio,
        BackendKind::Alsa,
        BackendKind::CoreAudio,
        BackendKind::Wasapi,
        BackendKind::Dummy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Jack => "JACK",
            BackendKind::PulseAudio => "PulseAudio",
            BackendKind::Alsa => "ALSA",
            BackendKind::CoreAudio => "CoreAudio",
            BackendKind::Wasapi => "WASAPI",
            BackendKind::Dummy => "Dummy",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or(Error::invalid("unknown backend"))
    }
}

/// Notification posted by a backend, delivered by `Context::flush_events`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Event {
    DevicesChanged,
    /// The connection is gone. Streams opened through it are dead.
    BackendDisconnected(Error),
}

struct EventSinkInner {
    queue: SegQueue<Event>,
    unparker: Unparker,
}

/// Where backends post events from their own threads. Posting never blocks.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<EventSinkInner>,
}

impl EventSink {
    /// Events are announced by unparking the waiting host thread.
    pub fn new(unparker: Unparker) -> EventSink {
        EventSink {
            inner: Arc::new(EventSinkInner {
                queue: SegQueue::new(),
                unparker,
            }),
        }
    }

    pub fn post(&self, event: Event) {
        self.inner.queue.push(event);
        self.inner.unparker.unpark();
    }

    pub fn pop(&self) -> Option<Event> {
        self.inner.queue.pop()
    }

    pub fn wakeup(&self) {
        self.inner.unparker.unpark();
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("pending", &self.inner.queue.len())
            .finish()
    }
}

/// Snapshot of a backend's devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceList {
    pub outputs: Vec<Device>,
    pub inputs: Vec<Device>,
    pub default_output: Option<usize>,
    pub default_input: Option<usize>,
}

impl DeviceList {
    pub fn default_output(&self) -> Option<&Device> {
        self.default_output.and_then(|idx| self.outputs.get(idx))
    }

    pub fn default_input(&self) -> Option<&Device> {
        self.default_input.and_then(|idx| self.inputs.get(idx))
    }
}

/// A platform audio subsystem.
pub trait Backend: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    /// Establishes the connection. Events are posted to `events` until [`Self::disconnect()`].
    fn connect(&self, events: EventSink) -> Result<()>;

    fn disconnect(&self);

    /// Enumerates and probes every device.
    fn scan_devices(&self) -> Result<DeviceList>;

    /// Opens an output stream. A refused stream hands `desc` back with the error.
    fn open_out_stream(
        &self,
        device: &Device,
        desc: OutStreamDesc,
    ) -> Result<Box<dyn RawOutStream>, Refused<OutStreamDesc>>;

    /// Opens an input stream. A refused stream hands `desc` back with the error.
    fn open_in_stream(
        &self,
        device: &Device,
        desc: InStreamDesc,
    ) -> Result<Box<dyn RawInStream>, Refused<InStreamDesc>>;
}

/// A stream the backend would not open, along with the descriptor it was given.
pub struct Refused<D> {
    pub error: Error,
    pub desc: D,
}

impl<D> Refused<D> {
    #[cold]
    pub fn new(error: Error, desc: D) -> Refused<D> {
        Refused { error, desc }
    }
}

impl<D> fmt::Debug for Refused<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refused")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Realtime write callback, invoked with `(context, frame_count_min, frame_count_max)`.
pub type WriteCallback = Box<dyn FnMut(&mut dyn WriteContext, usize, usize) + Send + 'static>;

/// Realtime read callback, invoked with `(context, frame_count_min, frame_count_max)`.
pub type ReadCallback = Box<dyn FnMut(&mut dyn ReadContext, usize, usize) + Send + 'static>;

/// Underflow (output) or overflow (input) notification, called from the realtime thread.
pub type XrunCallback = Box<dyn FnMut() + Send + 'static>;

pub type ErrorCallback = Box<dyn FnMut(Error) + Send + 'static>;

/// Negotiated parameters of an output stream.
pub struct OutStreamDesc {
    pub name: String,
    pub format: SampleFormat,
    pub layout: ChannelLayout,
    pub sample_rate: u32,
    /// Seconds.
    pub software_latency: f64,
    pub write_callback: WriteCallback,
    pub underflow_callback: Option<XrunCallback>,
    pub error_callback: Option<ErrorCallback>,
}

/// Negotiated parameters of an input stream.
pub struct InStreamDesc {
    pub name: String,
    pub format: SampleFormat,
    pub layout: ChannelLayout,
    pub sample_rate: u32,
    pub software_latency: f64,
    pub read_callback: ReadCallback,
    pub overflow_callback: Option<XrunCallback>,
    pub error_callback: Option<ErrorCallback>,
}

/// Backend side of an opened output stream. Dropping it destroys the stream; no callback runs
/// after drop returns.
pub trait RawOutStream: Send {
    fn start(&mut self) -> Result<()>;

    fn pause(&mut self, pause: bool) -> Result<()>;

    /// Discards queued frames, if the backend supports it.
    fn clear_buffer(&mut self) -> Result<()>;

    /// Seconds until a frame written now becomes audible.
    fn latency(&mut self) -> Result<f64>;
}

pub trait RawInStream: Send {
    fn start(&mut self) -> Result<()>;

    fn pause(&mut self, pause: bool) -> Result<()>;

    fn latency(&mut self) -> Result<f64>;
}

/// What the write callback may do with its stream.
pub trait WriteContext {
    /// Requests a region of at most `frame_count` frames. The backend may grant fewer; an empty
    /// region means nothing more can be written in this invocation.
    fn begin_write(&mut self, frame_count: usize) -> Result<ChannelAreas<'_>>;

    /// Commits the region from the last [`Self::begin_write()`]. Returns [`Error::Underflow`]
    /// if the device ran dry since the previous commit; the frames are committed regardless.
    fn end_write(&mut self) -> Result<()>;

    fn latency(&mut self) -> Result<f64>;

    fn pause(&mut self, pause: bool) -> Result<()>;
}

pub trait ReadContext {
    fn begin_read(&mut self, frame_count: usize) -> Result<ReadAreas<'_>>;

    fn end_read(&mut self) -> Result<()>;

    fn latency(&mut self) -> Result<f64>;

    fn pause(&mut self, pause: bool) -> Result<()>;
}
