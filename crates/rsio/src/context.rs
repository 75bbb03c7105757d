use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::sync::Parker;
use rsio_core::backend::{Backend, BackendKind, DeviceList, Event, EventSink};
use rsio_core::device::Device;
use rsio_core::{Error, Result};
use rsio_dummy::DummyBackend;

use crate::in_stream::InStream;
use crate::out_stream::OutStream;

/// Connection to one audio backend.
///
/// Backends post notifications from their own threads; they are only acted upon when the host
/// calls [`Context::flush_events()`] (or one of the `wait_events` variants).
pub struct Context {
    backend: Option<Arc<dyn Backend>>,
    events: EventSink,
    parker: Parker,
    devices: DeviceList,
}

impl Context {
    pub fn new() -> Context {
        let parker = Parker::new();
        let events = EventSink::new(parker.unparker().clone());

        Context {
            backend: None,
            events,
            parker,
            devices: DeviceList::default(),
        }
    }

    /// Connects a custom backend.
    pub fn with_backend(backend: Box<dyn Backend>) -> Result<Context> {
        let mut context = Context::new();
        context.attach(Arc::from(backend))?;
        Ok(context)
    }

    /// Whether `kind` is built into this library.
    pub fn have_backend(kind: BackendKind) -> bool {
        matches!(kind, BackendKind::Dummy)
    }

    /// Built-in backends, in the order [`Self::connect()`] tries them.
    pub fn available_backends() -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|&kind| Context::have_backend(kind))
            .collect()
    }

    /// Tries every backend in turn and keeps the first that connects.
    pub fn connect(&mut self) -> Result<()> {
        let mut last_error = Error::NoDeviceAvailable;

        for kind in BackendKind::ALL {
            match self.connect_backend(kind) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(backend = %kind, error = %e, "backend unavailable");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    pub fn connect_backend(&mut self, kind: BackendKind) -> Result<()> {
        let backend: Arc<dyn Backend> = match kind {
            BackendKind::Dummy => Arc::new(DummyBackend::default()),
            other => return Err(Error::BackendCompiledOut(other)),
        };

        self.attach(backend)
    }

    fn attach(&mut self, backend: Arc<dyn Backend>) -> Result<()> {
        if self.backend.is_some() {
            return Err(Error::invalid("already connected"));
        }

        backend.connect(self.events.clone())?;

        let devices = match backend.scan_devices() {
            Ok(devices) => devices,
            Err(e) => {
                backend.disconnect();
                return Err(e);
            }
        };

        tracing::info!(
            backend = %backend.kind(),
            outputs = devices.outputs.len(),
            inputs = devices.inputs.len(),
            "connected"
        );

        self.devices = devices;
        self.backend = Some(backend);
        Ok(())
    }

    /// Drops the connection. Streams opened through it stop delivering callbacks.
    pub fn disconnect(&mut self) {
        if let Some(backend) = self.backend.take() {
            backend.disconnect();
            tracing::info!(backend = %backend.kind(), "disconnected");
        }

        self.devices = DeviceList::default();
        while self.events.pop().is_some() {}
    }

    pub fn current_backend(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(|backend| backend.kind())
    }

    /// Handles and returns every pending event without blocking.
    ///
    /// A device change refreshes the device list; a disconnect drops the connection.
    pub fn flush_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();

        while let Some(event) = self.events.pop() {
            match &event {
                Event::DevicesChanged => {
                    if let Err(e) = self.force_device_scan() {
                        tracing::warn!(error = %e, "device rescan failed");
                    }
                }
                Event::BackendDisconnected(e) => {
                    tracing::warn!(error = %e, "backend disconnected");
                    self.disconnect_lost();
                }
            }

            events.push(event);
        }

        events
    }

    fn disconnect_lost(&mut self) {
        if let Some(backend) = self.backend.take() {
            backend.disconnect();
        }
        self.devices = DeviceList::default();
    }

    /// Blocks until an event arrives or [`Waker::wakeup()`] is called, then flushes.
    pub fn wait_events(&mut self) -> Vec<Event> {
        self.parker.park();
        self.flush_events()
    }

    /// Like [`Self::wait_events()`], but gives up after `timeout`.
    pub fn wait_events_timeout(&mut self, timeout: Duration) -> Vec<Event> {
        self.parker.park_timeout(timeout);
        self.flush_events()
    }

    pub fn waker(&self) -> Waker {
        Waker {
            events: self.events.clone(),
        }
    }

    pub fn force_device_scan(&mut self) -> Result<()> {
        let backend = self.backend()?;
        self.devices = backend.scan_devices()?;
        tracing::debug!(
            outputs = self.devices.outputs.len(),
            inputs = self.devices.inputs.len(),
            "rescanned devices"
        );
        Ok(())
    }

    fn backend(&self) -> Result<Arc<dyn Backend>> {
        self.backend
            .clone()
            .ok_or(Error::invalid("not connected to a backend"))
    }

    /// Output devices followed by input devices. The iterator can be cloned to start over.
    pub fn devices(&self) -> impl Iterator<Item = &Device> + Clone + '_ {
        self.devices.outputs.iter().chain(&self.devices.inputs)
    }

    pub fn output_devices(&self) -> &[Device] {
        &self.devices.outputs
    }

    pub fn input_devices(&self) -> &[Device] {
        &self.devices.inputs
    }

    pub fn default_output_device(&self) -> Result<Device> {
        self.devices
            .default_output()
            .cloned()
            .ok_or(Error::NoDeviceAvailable)
    }

    pub fn default_input_device(&self) -> Result<Device> {
        self.devices
            .default_input()
            .cloned()
            .ok_or(Error::NoDeviceAvailable)
    }

    pub fn find_output_device(&self, id: &str, raw: bool) -> Result<Device> {
        self.devices
            .outputs
            .iter()
            .find(|device| device.id() == id && device.is_raw() == raw)
            .cloned()
            .ok_or(Error::NoSuchDevice)
    }

    pub fn find_input_device(&self, id: &str, raw: bool) -> Result<Device> {
        self.devices
            .inputs
            .iter()
            .find(|device| device.id() == id && device.is_raw() == raw)
            .cloned()
            .ok_or(Error::NoSuchDevice)
    }

    /// Creates an output stream on `device`. Nothing is negotiated until it is opened.
    pub fn out_stream(&self, device: &Device) -> Result<OutStream> {
        Ok(OutStream::new(self.backend()?, device.clone()))
    }

    pub fn in_stream(&self, device: &Device) -> Result<InStream> {
        Ok(InStream::new(self.backend()?, device.clone()))
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.take() {
            backend.disconnect();
        }
    }
}

/// Interrupts a `wait_events` call from any thread.
#[derive(Debug, Clone)]
pub struct Waker {
    events: EventSink,
}

impl Waker {
    pub fn wakeup(&self) {
        self.events.wakeup();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use rsio_core::device::DeviceAim;
    use rsio_dummy::{dummy_device, DummyConfig, DummyControl};

    use super::*;

    fn dummy_context(config: DummyConfig) -> (Context, DummyControl) {
        let backend = DummyBackend::new(config);
        let control = backend.control();
        (Context::with_backend(Box::new(backend)).unwrap(), control)
    }

    #[test]
    fn auto_connect_falls_through_to_dummy() {
        let mut context = Context::new();
        context.connect().unwrap();
        assert_eq!(context.current_backend(), Some(BackendKind::Dummy));
        assert_eq!(Context::available_backends(), [BackendKind::Dummy]);
    }

    #[test]
    fn compiled_out_backends_fail() {
        let mut context = Context::new();
        assert_eq!(
            context.connect_backend(BackendKind::Alsa),
            Err(Error::BackendCompiledOut(BackendKind::Alsa))
        );
        assert_eq!(context.current_backend(), None);
        assert!(context.default_output_device().is_err());
    }

    #[test]
    fn double_connect_is_rejected() {
        let mut context = Context::new();
        context.connect_backend(BackendKind::Dummy).unwrap();
        assert!(context.connect_backend(BackendKind::Dummy).is_err());

        context.disconnect();
        assert_eq!(context.current_backend(), None);
        context.connect_backend(BackendKind::Dummy).unwrap();
    }

    #[test]
    fn enumeration_is_restartable() {
        let (context, _) = dummy_context(DummyConfig::default());

        let devices = context.devices();
        let first: Vec<_> = devices.clone().map(|d| d.id().to_owned()).collect();
        let second: Vec<_> = devices.map(|d| d.id().to_owned()).collect();

        assert_eq!(first, ["dummy-out", "dummy-in"]);
        assert_eq!(first, second);
    }

    #[test]
    fn default_devices_add_references() {
        let (context, _) = dummy_context(DummyConfig::default());

        let device = context.default_output_device().unwrap();
        assert_eq!(device.ref_count(), 2);
        assert_eq!(device.aim(), DeviceAim::Output);

        let again = device.clone();
        assert_eq!(device.ref_count(), 3);
        drop(again);
        assert_eq!(device.ref_count(), 2);

        assert_eq!(context.default_input_device().unwrap().aim(), DeviceAim::Input);
    }

    #[test]
    fn missing_default_device() {
        let (context, _) = dummy_context(DummyConfig {
            outputs: Vec::new(),
            default_output: None,
            ..DummyConfig::default()
        });

        assert_eq!(
            context.default_output_device().err(),
            Some(Error::NoDeviceAvailable)
        );
    }

    #[test]
    fn finds_devices_by_id_and_rawness() {
        let mut raw = dummy_device("dummy-out", "Raw Output", DeviceAim::Output);
        raw.is_raw = true;

        let mut config = DummyConfig::default();
        config.outputs.push(raw);
        let (context, _) = dummy_context(config);

        assert_eq!(
            context.find_output_device("dummy-out", true).unwrap().name(),
            "Raw Output"
        );
        assert!(!context.find_output_device("dummy-out", false).unwrap().is_raw());
        assert_eq!(
            context.find_output_device("nope", false).err(),
            Some(Error::NoSuchDevice)
        );
    }

    #[test]
    fn device_changes_refresh_the_list() {
        let (mut context, control) = dummy_context(DummyConfig::default());
        assert!(context.flush_events().is_empty());

        let replacement = dummy_device("usb", "USB Speakers", DeviceAim::Output);
        control.set_devices(vec![replacement], Vec::new());

        // Nothing changes until the host flushes.
        assert_eq!(context.output_devices()[0].id(), "dummy-out");

        assert_eq!(context.flush_events(), [Event::DevicesChanged]);
        assert_eq!(context.output_devices()[0].id(), "usb");
        assert!(context.input_devices().is_empty());
    }

    #[test]
    fn disconnect_event_drops_connection() {
        let (mut context, control) = dummy_context(DummyConfig::default());

        control.disconnect();

        let events = context.wait_events_timeout(Duration::from_secs(1));
        assert_eq!(
            events,
            [Event::BackendDisconnected(Error::BackendDisconnected)]
        );
        assert_eq!(context.current_backend(), None);
        assert!(context.output_devices().is_empty());
    }

    #[test]
    fn waker_interrupts_wait() {
        let mut context = Context::new();
        let waker = context.waker();

        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            waker.wakeup();
        });

        let start = Instant::now();
        assert!(context.wait_events_timeout(Duration::from_secs(10)).is_empty());
        assert!(start.elapsed() < Duration::from_secs(5));

        thread.join().unwrap();
    }

    #[test]
    fn custom_backend_connect_failure() {
        let backend = DummyBackend::new(DummyConfig {
            connect_error: Some(Error::InitBackend {
                backend: BackendKind::Dummy,
            }),
            ..DummyConfig::default()
        });

        assert!(matches!(
            Context::with_backend(Box::new(backend)),
            Err(Error::InitBackend { .. })
        ));
    }
}
