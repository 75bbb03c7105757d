use std::fmt;
use std::sync::Arc;

use crate::format::SampleFormat;
use crate::layout::{self, ChannelLayout};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DeviceAim {
    Input,
    Output,
}

/// Inclusive range of supported sample rates.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SampleRateRange {
    pub min: u32,
    pub max: u32,
}

impl SampleRateRange {
    pub fn new(min: u32, max: u32) -> SampleRateRange {
        SampleRateRange { min, max }
    }

    pub fn single(rate: u32) -> SampleRateRange {
        SampleRateRange {
            min: rate,
            max: rate,
        }
    }

    pub fn contains(&self, rate: u32) -> bool {
        (self.min..=self.max).contains(&rate)
    }
}

/// Everything a backend reports about one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub aim: DeviceAim,
    /// Raw devices bypass the sound server and talk to the hardware directly.
    pub is_raw: bool,

    pub layouts: Vec<ChannelLayout>,
    pub current_layout: Option<ChannelLayout>,

    pub formats: Vec<SampleFormat>,
    pub current_format: Option<SampleFormat>,

    pub sample_rates: Vec<SampleRateRange>,
    pub sample_rate_current: u32,

    /// Seconds.
    pub software_latency_min: f64,
    pub software_latency_max: f64,
    pub software_latency_current: f64,

    /// Set when the backend could not query the device's capabilities.
    pub probe_error: Option<Error>,
}

impl DeviceInfo {
    /// Creates a device that supports nothing yet.
    pub fn new(id: impl Into<String>, name: impl Into<String>, aim: DeviceAim) -> DeviceInfo {
        DeviceInfo {
            id: id.into(),
            name: name.into(),
            aim,
            is_raw: false,
            layouts: Vec::new(),
            current_layout: None,
            formats: Vec::new(),
            current_format: None,
            sample_rates: Vec::new(),
            sample_rate_current: 0,
            software_latency_min: 0.0,
            software_latency_max: 0.0,
            software_latency_current: 0.0,
            probe_error: None,
        }
    }
}

/// Shared handle to a device.
///
/// Cloning adds a reference and dropping releases it; the description is freed with the last
/// handle. Handles compare equal when they refer to the same endpoint, i.e. id, aim and rawness
/// match.
#[derive(Clone)]
pub struct Device {
    info: Arc<DeviceInfo>,
}

impl Device {
    pub fn new(info: DeviceInfo) -> Device {
        Device {
            info: Arc::new(info),
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn aim(&self) -> DeviceAim {
        self.info.aim
    }

    pub fn is_raw(&self) -> bool {
        self.info.is_raw
    }

    pub fn layouts(&self) -> &[ChannelLayout] {
        &self.info.layouts
    }

    pub fn current_layout(&self) -> Option<&ChannelLayout> {
        self.info.current_layout.as_ref()
    }

    pub fn formats(&self) -> &[SampleFormat] {
        &self.info.formats
    }

    pub fn current_format(&self) -> Option<SampleFormat> {
        self.info.current_format
    }

    pub fn sample_rates(&self) -> &[SampleRateRange] {
        &self.info.sample_rates
    }

    pub fn sample_rate_current(&self) -> u32 {
        self.info.sample_rate_current
    }

    pub fn software_latency_min(&self) -> f64 {
        self.info.software_latency_min
    }

    pub fn software_latency_max(&self) -> f64 {
        self.info.software_latency_max
    }

    pub fn software_latency_current(&self) -> f64 {
        self.info.software_latency_current
    }

    /// `Ok` if the device was probed successfully.
    pub fn probe_result(&self) -> Result<()> {
        match &self.info.probe_error {
            None => Ok(()),
            Some(e) => Err(Error::ProbeFailed(Box::new(e.clone()))),
        }
    }

    /// Number of live handles to this device.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.info)
    }

    pub fn supports_format(&self, format: SampleFormat) -> bool {
        self.info.formats.contains(&format)
    }

    pub fn supports_layout(&self, layout: &ChannelLayout) -> bool {
        self.info.layouts.contains(layout)
    }

    pub fn supports_sample_rate(&self, rate: u32) -> bool {
        self.info.sample_rates.iter().any(|range| range.contains(rate))
    }

    /// `rate` itself if supported, otherwise the closest supported rate above it, otherwise the
    /// highest supported rate.
    pub fn nearest_sample_rate(&self, rate: u32) -> Option<u32> {
        if self.supports_sample_rate(rate) {
            return Some(rate);
        }

        let above = self
            .info
            .sample_rates
            .iter()
            .map(|range| range.min)
            .filter(|&min| min > rate)
            .min();

        above.or_else(|| self.info.sample_rates.iter().map(|range| range.max).max())
    }

    /// Sorts the layouts of this handle, widest first.
    ///
    /// Other handles to the same device keep their order.
    pub fn sort_layouts(&mut self) {
        layout::sort_layouts(&mut Arc::make_mut(&mut self.info).layouts);
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.info.id == other.info.id
            && self.info.aim == other.info.aim
            && self.info.is_raw == other.info.is_raw
    }
}

impl Eq for Device {}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.info.id)
            .field("name", &self.info.name)
            .field("aim", &self.info.aim)
            .field("is_raw", &self.info.is_raw)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.info.name)
    }
}
