use rsio_core::device::Device;
use rsio_core::format::{self, SampleFormat};
use rsio_core::layout::{self, ChannelLayout};
use rsio_core::{Error, Result};

/// Sample rate picked when the caller doesn't ask for one.
const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Channel count picked when neither a layout nor a count is requested and the device has no
/// current layout.
const DEFAULT_CHANNEL_COUNT: usize = 2;

/// What the caller asked for. Zero / `None` means "let the device decide".
#[derive(Debug, Clone, Default)]
pub(crate) struct StreamParams {
    pub name: String,
    pub format: Option<SampleFormat>,
    pub layout: Option<ChannelLayout>,
    pub channel_count: Option<usize>,
    pub sample_rate: u32,
    pub software_latency: f64,
}

/// Parameters a stream settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiated {
    pub format: SampleFormat,
    pub layout: ChannelLayout,
    /// Set when the device has no layout with the requested channel count and another one was
    /// chosen instead.
    pub layout_error: Option<Error>,
    pub sample_rate: u32,
    /// Seconds.
    pub software_latency: f64,
}

impl Negotiated {
    pub fn channel_count(&self) -> usize {
        self.layout.channel_count()
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.format.bytes_per_sample()
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channel_count()
    }
}

/// Matches `params` against what `device` supports. Pure: nothing is committed anywhere.
pub(crate) fn negotiate(device: &Device, params: &StreamParams) -> Result<Negotiated> {
    device.probe_result()?;

    let format = match params.format {
        Some(format) if device.supports_format(format) => format,
        Some(_) => return Err(Error::IncompatibleDevice),
        None => format::select_format(device.formats())?,
    };

    let (layout, layout_error) = match &params.layout {
        Some(layout) if device.supports_layout(layout) => (layout.clone(), None),
        Some(_) => return Err(Error::IncompatibleDevice),
        None => {
            let channel_count = params
                .channel_count
                .or_else(|| device.current_layout().map(ChannelLayout::channel_count))
                .unwrap_or(DEFAULT_CHANNEL_COUNT);

            let choice = layout::select_layout(device.layouts(), channel_count)?;
            if choice.native {
                (choice.layout, None)
            } else {
                tracing::warn!(
                    device = %device.id(),
                    requested = channel_count,
                    fallback = %choice.layout,
                    "no native layout, requires remixing"
                );
                (choice.layout, Some(Error::IncompatibleDevice))
            }
        }
    };

    let sample_rate = match params.sample_rate {
        0 => device
            .nearest_sample_rate(DEFAULT_SAMPLE_RATE)
            .ok_or(Error::IncompatibleDevice)?,
        rate if device.supports_sample_rate(rate) => rate,
        _ => return Err(Error::IncompatibleDevice),
    };

    let software_latency = if params.software_latency > 0.0 {
        params
            .software_latency
            .max(device.software_latency_min())
            .min(device.software_latency_max())
    } else {
        device.software_latency_current()
    };

    Ok(Negotiated {
        format,
        layout,
        layout_error,
        sample_rate,
        software_latency,
    })
}
