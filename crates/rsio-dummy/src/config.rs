use rsio_core::device::{DeviceAim, DeviceInfo, SampleRateRange};
use rsio_core::format::SampleFormat;
use rsio_core::layout::{self, BuiltinLayout, ChannelLayout};
use rsio_core::Error;

/// Devices and behavior of a [`DummyBackend`](crate::DummyBackend).
#[derive(Debug, Clone)]
pub struct DummyConfig {
    pub outputs: Vec<DeviceInfo>,
    pub inputs: Vec<DeviceInfo>,
    /// Index into `outputs`.
    pub default_output: Option<usize>,
    /// Index into `inputs`.
    pub default_input: Option<usize>,
    /// Upper bound on the frames granted by one `begin_write` or `begin_read`.
    pub max_frames_per_write: usize,
    /// When set, `connect` fails with this error.
    pub connect_error: Option<Error>,
}

impl Default for DummyConfig {
    fn default() -> DummyConfig {
        DummyConfig {
            outputs: vec![dummy_device(
                "dummy-out",
                "Dummy Output Device",
                DeviceAim::Output,
            )],
            inputs: vec![dummy_device(
                "dummy-in",
                "Dummy Input Device",
                DeviceAim::Input,
            )],
            default_output: Some(0),
            default_input: Some(0),
            max_frames_per_write: 4096,
            connect_error: None,
        }
    }
}

/// A device that accepts every built-in layout, every format and a wide range of rates.
pub fn dummy_device(id: &str, name: &str, aim: DeviceAim) -> DeviceInfo {
    let mut layouts: Vec<ChannelLayout> = ChannelLayout::builtin().collect();
    layout::sort_layouts(&mut layouts);

    let mut info = DeviceInfo::new(id, name, aim);
    info.layouts = layouts;
    info.current_layout = Some(BuiltinLayout::Stereo.layout());
    info.formats = SampleFormat::ALL.to_vec();
    info.current_format = Some(SampleFormat::F32NE);
    info.sample_rates = vec![SampleRateRange::new(8000, 5_644_800)];
    info.sample_rate_current = 48000;
    info.software_latency_min = 0.01;
    info.software_latency_max = 4.0;
    info.software_latency_current = 0.1;
    info
}
