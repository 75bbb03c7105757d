use rsio_core::Result;

/// Finite stream of interleaved `f32` samples.
pub trait SampleSource: Send {
    fn channel_count(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// Fills `buf` from the current position and returns how many samples were written. Anything
    /// short of `buf.len()` means the source has ended.
    fn read(&mut self, buf: &mut [f32]) -> Result<usize>;

    /// Samples left, if the source knows.
    fn remaining(&self) -> Option<usize> {
        None
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
        (**self).read(buf)
    }

    fn remaining(&self) -> Option<usize> {
        (**self).remaining()
    }
}

/// Samples held in memory.
#[derive(Debug, Clone)]
pub struct VecSource {
    samples: Vec<f32>,
    position: usize,
    channel_count: usize,
    sample_rate: u32,
}

impl VecSource {
    pub fn new(samples: Vec<f32>, channel_count: usize, sample_rate: u32) -> VecSource {
        VecSource {
            samples,
            position: 0,
            channel_count,
            sample_rate,
        }
    }
}

impl SampleSource for VecSource {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
        let rest = &self.samples[self.position..];
        let len = rest.len().min(buf.len());
        buf[..len].copy_from_slice(&rest[..len]);
        self.position += len;
        Ok(len)
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.samples.len() - self.position)
    }
}

/// Adapts `source` to `channel_count` channels. Returns it unchanged if it already matches.
pub fn remix(source: Box<dyn SampleSource>, channel_count: usize) -> Box<dyn SampleSource> {
    if source.channel_count() == channel_count || channel_count == 0 {
        return source;
    }

    tracing::debug!(
        from = source.channel_count(),
        to = channel_count,
        "remixing sample source"
    );

    Box::new(Remix {
        inner: source,
        channel_count,
        scratch: Vec::new(),
    })
}

/// Channel count adapter.
///
/// Mono is duplicated into every output channel and everything is averaged down to mono.
/// Otherwise channels are copied by index and missing ones are silent.
pub struct Remix<S> {
    inner: S,
    channel_count: usize,
    scratch: Vec<f32>,
}

impl<S: SampleSource> Remix<S> {
    pub fn new(inner: S, channel_count: usize) -> Remix<S> {
        Remix {
            inner,
            channel_count,
            scratch: Vec::new(),
        }
    }

    fn map_frame(&self, input: &[f32], output: &mut [f32]) {
        match (input.len(), output.len()) {
            (1, _) => output.fill(input[0]),
            (_, 1) => output[0] = input.iter().sum::<f32>() / input.len() as f32,
            _ => {
                for (i, out) in output.iter_mut().enumerate() {
                    *out = input.get(i).copied().unwrap_or(0.0);
                }
            }
        }
    }
}

impl<S: SampleSource> SampleSource for Remix<S> {
    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn read(&mut self, buf: &mut [f32]) -> Result<usize> {
        let in_channels = self.inner.channel_count().max(1);
        let frames = buf.len() / self.channel_count;

        self.scratch.resize(frames * in_channels, 0.0);
        let read = self.inner.read(&mut self.scratch)?;

        // A trailing partial frame is completed with silence.
        let in_frames = read.div_ceil(in_channels);
        self.scratch[read..in_frames * in_channels].fill(0.0);

        let scratch = std::mem::take(&mut self.scratch);
        for (input, output) in scratch
            .chunks_exact(in_channels)
            .zip(buf.chunks_exact_mut(self.channel_count))
            .take(in_frames)
        {
            self.map_frame(input, output);
        }
        self.scratch = scratch;

        Ok(in_frames * self.channel_count)
    }

    fn remaining(&self) -> Option<usize> {
        let in_channels = self.inner.channel_count().max(1);
        let frames = self.inner.remaining()?.div_ceil(in_channels);
        Some(frames * self.channel_count)
    }
}
