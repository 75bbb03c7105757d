use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use rsio::playback::SampleSource;
use rsio::{Error, Result};

/// Streams samples out of a WAV file, converted to `f32`.
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    channel_count: usize,
    sample_rate: u32,
    /// Full scale of integer samples.
    scale: f32,
    total: usize,
    position: usize,
}

impl WavSource {
    pub fn open(path: &Path) -> Result<WavSource, hound::Error> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();

        let scale = match spec.sample_format {
            SampleFormat::Float => 1.0,
            SampleFormat::Int => (1u64 << (spec.bits_per_sample - 1)) as f32,
        };

        Ok(WavSource {
            channel_count: usize::from(spec.channels),
            sample_rate: spec.sample_rate,
            scale,
            total: reader.len() as usize,
            position: 0,
            reader,
        })
    }

    /// Number of frames in the file.
    pub fn frame_count(&self) -> usize {
        self.total / self.channel_count.max(1)
    }
}

impl SampleSource for WavSource {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
        let mut count = 0;

        if self.reader.spec().sample_format == SampleFormat::Float {
            for (out, sample) in buf.iter_mut().zip(self.reader.samples::<f32>()) {
                *out = sample.map_err(Error::new_source)?;
                count += 1;
            }
        } else {
            for (out, sample) in buf.iter_mut().zip(self.reader.samples::<i32>()) {
                *out = sample.map_err(Error::new_source)? as f32 / self.scale;
                count += 1;
            }
        }

        self.position += count;
        Ok(count)
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.total - self.position)
    }
}
