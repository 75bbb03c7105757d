use crate::format::SampleFormat;

/// Writable view over a region of interleaved samples, as handed out by `begin_write`.
///
/// Sample offsets count individual samples (`frame * channel_count + channel`), not frames.
pub struct ChannelAreas<'a> {
    bytes: &'a mut [u8],
    format: SampleFormat,
    channel_count: usize,
}

impl<'a> ChannelAreas<'a> {
    /// Trailing bytes that don't form a whole frame are not part of the view.
    pub fn new(bytes: &'a mut [u8], format: SampleFormat, channel_count: usize) -> ChannelAreas<'a> {
        assert!(channel_count > 0, "channel areas without channels");

        let bytes_per_frame = format.bytes_per_sample() * channel_count;
        let len = bytes.len() / bytes_per_frame * bytes_per_frame;

        ChannelAreas {
            bytes: &mut bytes[..len],
            format,
            channel_count,
        }
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn frame_count(&self) -> usize {
        self.bytes.len() / self.bytes_per_frame()
    }

    pub fn sample_count(&self) -> usize {
        self.frame_count() * self.channel_count
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channel_count
    }

    pub fn write_f32(&mut self, frame: usize, channel: usize, sample: f32) {
        assert!(channel < self.channel_count);
        self.write_sample(frame * self.channel_count + channel, sample);
    }

    fn write_sample(&mut self, index: usize, sample: f32) {
        let width = self.format.bytes_per_sample();
        let start = index * width;
        self.format
            .encode_f32(sample, &mut self.bytes[start..start + width]);
    }

    /// Encodes interleaved `samples` starting at sample `offset`. Returns how many fit.
    pub fn copy_from_f32(&mut self, offset: usize, samples: &[f32]) -> usize {
        let count = samples.len().min(self.sample_count().saturating_sub(offset));
        if count == 0 {
            return 0;
        }

        if self.format == SampleFormat::F32NE {
            let start = offset * 4;
            for (chunk, &sample) in self.bytes[start..start + count * 4]
                .chunks_exact_mut(4)
                .zip(samples)
            {
                chunk.copy_from_slice(&sample.to_ne_bytes());
            }
        } else {
            for (i, &sample) in samples[..count].iter().enumerate() {
                self.write_sample(offset + i, sample);
            }
        }

        count
    }

    /// Writes silence from sample `offset` to the end of the region.
    pub fn fill_silence(&mut self, offset: usize) {
        let width = self.format.bytes_per_sample();
        let start = (offset * width).min(self.bytes.len());

        if self.format.is_float() || self.format.is_signed() {
            self.bytes[start..].fill(0);
            return;
        }

        let mut silence = [0; 8];
        self.format.encode_f32(0.0, &mut silence[..width]);
        for chunk in self.bytes[start..].chunks_exact_mut(width) {
            chunk.copy_from_slice(&silence[..width]);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }
}

/// Read-only view over a region of interleaved samples, as handed out by `begin_read`.
pub struct ReadAreas<'a> {
    bytes: &'a [u8],
    format: SampleFormat,
    channel_count: usize,
}

impl<'a> ReadAreas<'a> {
    pub fn new(bytes: &'a [u8], format: SampleFormat, channel_count: usize) -> ReadAreas<'a> {
        assert!(channel_count > 0, "channel areas without channels");

        let bytes_per_frame = format.bytes_per_sample() * channel_count;
        let len = bytes.len() / bytes_per_frame * bytes_per_frame;

        ReadAreas {
            bytes: &bytes[..len],
            format,
            channel_count,
        }
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn frame_count(&self) -> usize {
        self.bytes.len() / (self.format.bytes_per_sample() * self.channel_count)
    }

    pub fn read_f32(&self, frame: usize, channel: usize) -> f32 {
        assert!(channel < self.channel_count);
        let width = self.format.bytes_per_sample();
        let start = (frame * self.channel_count + channel) * width;
        self.format.decode_f32(&self.bytes[start..start + width])
    }

    /// Decodes interleaved samples into `out`. Returns how many were decoded.
    pub fn copy_to_f32(&self, out: &mut [f32]) -> usize {
        let width = self.format.bytes_per_sample();
        let mut count = 0;

        for (slot, chunk) in out.iter_mut().zip(self.bytes.chunks_exact(width)) {
            *slot = self.format.decode_f32(chunk);
            count += 1;
        }

        count
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }
}
