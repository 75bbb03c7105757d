//! Null audio backend.
//!
//! Every stream runs on its own thread that consumes (or produces) frames in real time at the
//! nominal sample rate, so callbacks are paced like they would be by real hardware.

mod capture;
mod config;
mod handle;
mod pacer;
mod playback;

use std::sync::{Arc, Mutex, MutexGuard};

use rsio_core::backend::{
    Backend, BackendKind, DeviceList, Event, EventSink, InStreamDesc, OutStreamDesc, RawInStream,
    RawOutStream, Refused,
};
use rsio_core::device::{Device, DeviceAim, DeviceInfo};
use rsio_core::format::SampleFormat;
use rsio_core::layout::ChannelLayout;
use rsio_core::{Error, Result};
use slotmap::SlotMap;

pub use crate::capture::DummyInStream;
pub use crate::config::{dummy_device, DummyConfig};
use crate::handle::{Handle, Message};
pub use crate::playback::DummyOutStream;

slotmap::new_key_type! {
    pub(crate) struct StreamId;
}

pub(crate) struct Shared {
    config: Mutex<DummyConfig>,
    events: Mutex<Option<EventSink>>,
    streams: Mutex<SlotMap<StreamId, Handle>>,
}

impl Shared {
    fn config(&self) -> MutexGuard<'_, DummyConfig> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn events(&self) -> MutexGuard<'_, Option<EventSink>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn streams(&self) -> MutexGuard<'_, SlotMap<StreamId, Handle>> {
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn register_stream(&self, handle: Handle) -> StreamId {
        self.streams().insert(handle)
    }

    pub(crate) fn unregister_stream(&self, id: StreamId) {
        self.streams().remove(id);
    }

    fn post(&self, event: Event) {
        if let Some(events) = &*self.events() {
            events.post(event);
        }
    }

    fn disconnect_streams(&self) {
        for handle in self.streams().values() {
            let _ = handle.send(Message::Disconnect);
        }
    }
}

pub struct DummyBackend {
    shared: Arc<Shared>,
}

impl DummyBackend {
    pub fn new(config: DummyConfig) -> DummyBackend {
        DummyBackend {
            shared: Arc::new(Shared {
                config: Mutex::new(config),
                events: Mutex::new(None),
                streams: Mutex::new(SlotMap::with_key()),
            }),
        }
    }

    /// Remote control for simulating device changes and connection loss.
    pub fn control(&self) -> DummyControl {
        DummyControl {
            shared: self.shared.clone(),
        }
    }

    fn find_device(&self, device: &Device) -> Result<DeviceInfo> {
        let config = self.shared.config();
        let devices = match device.aim() {
            DeviceAim::Output => &config.outputs,
            DeviceAim::Input => &config.inputs,
        };

        devices
            .iter()
            .find(|info| info.id == device.id() && info.is_raw == device.is_raw())
            .cloned()
            .ok_or(Error::NoSuchDevice)
    }
}

impl Default for DummyBackend {
    fn default() -> DummyBackend {
        DummyBackend::new(DummyConfig::default())
    }
}

impl Backend for DummyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dummy
    }

    fn connect(&self, events: EventSink) -> Result<()> {
        if let Some(error) = &self.shared.config().connect_error {
            return Err(error.clone());
        }

        *self.shared.events() = Some(events);
        tracing::debug!("dummy backend connected");
        Ok(())
    }

    fn disconnect(&self) {
        self.shared.events().take();
        self.shared.disconnect_streams();
        tracing::debug!("dummy backend disconnected");
    }

    fn scan_devices(&self) -> Result<DeviceList> {
        let config = self.shared.config();

        Ok(DeviceList {
            outputs: config.outputs.iter().cloned().map(Device::new).collect(),
            inputs: config.inputs.iter().cloned().map(Device::new).collect(),
            default_output: config.default_output,
            default_input: config.default_input,
        })
    }

    fn open_out_stream(
        &self,
        device: &Device,
        desc: OutStreamDesc,
    ) -> Result<Box<dyn RawOutStream>, Refused<OutStreamDesc>> {
        let checked = self.find_device(device).and_then(|info| {
            check_params(
                &info,
                DeviceAim::Output,
                desc.format,
                &desc.layout,
                desc.sample_rate,
                desc.software_latency,
            )
        });
        if let Err(error) = checked {
            return Err(Refused::new(error, desc));
        }

        let max_frames = self.shared.config().max_frames_per_write;
        let stream = DummyOutStream::spawn(self.shared.clone(), desc, max_frames)?;
        Ok(Box::new(stream))
    }

    fn open_in_stream(
        &self,
        device: &Device,
        desc: InStreamDesc,
    ) -> Result<Box<dyn RawInStream>, Refused<InStreamDesc>> {
        let checked = self.find_device(device).and_then(|info| {
            check_params(
                &info,
                DeviceAim::Input,
                desc.format,
                &desc.layout,
                desc.sample_rate,
                desc.software_latency,
            )
        });
        if let Err(error) = checked {
            return Err(Refused::new(error, desc));
        }

        let max_frames = self.shared.config().max_frames_per_write;
        let stream = DummyInStream::spawn(self.shared.clone(), desc, max_frames)?;
        Ok(Box::new(stream))
    }
}

fn check_params(
    info: &DeviceInfo,
    aim: DeviceAim,
    format: SampleFormat,
    layout: &ChannelLayout,
    sample_rate: u32,
    software_latency: f64,
) -> Result<()> {
    if info.aim != aim {
        return Err(Error::invalid("device direction does not match the stream"));
    }

    if let Some(error) = &info.probe_error {
        return Err(Error::new_opening_device(error));
    }

    if !info.formats.contains(&format)
        || !info.layouts.contains(layout)
        || !info.sample_rates.iter().any(|range| range.contains(sample_rate))
    {
        return Err(Error::IncompatibleDevice);
    }

    if !(software_latency > 0.0) {
        return Err(Error::invalid("software latency must be positive"));
    }

    Ok(())
}

/// Simulates what a real sound server does behind the application's back.
#[derive(Clone)]
pub struct DummyControl {
    shared: Arc<Shared>,
}

impl DummyControl {
    /// Replaces the advertised devices and announces the change.
    pub fn set_devices(&self, outputs: Vec<DeviceInfo>, inputs: Vec<DeviceInfo>) {
        {
            let mut config = self.shared.config();
            config.default_output = if outputs.is_empty() { None } else { Some(0) };
            config.default_input = if inputs.is_empty() { None } else { Some(0) };
            config.outputs = outputs;
            config.inputs = inputs;
        }

        self.trigger_devices_changed();
    }

    pub fn trigger_devices_changed(&self) {
        self.shared.post(Event::DevicesChanged);
    }

    /// Drops the connection: every open stream reports [`Error::BackendDisconnected`] through its
    /// error callback and the host receives [`Event::BackendDisconnected`].
    pub fn disconnect(&self) {
        tracing::debug!("simulating dummy backend disconnect");
        self.shared.disconnect_streams();
        self.shared.post(Event::BackendDisconnected(Error::BackendDisconnected));
    }
}
