use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use rsio_core::area::ChannelAreas;
use rsio_core::backend::{
    ErrorCallback, OutStreamDesc, RawOutStream, Refused, WriteCallback, WriteContext,
    XrunCallback,
};
use rsio_core::format::SampleFormat;
use rsio_core::sync::ring::{self, Consumer, Producer};
use rsio_core::{Error, Result};

use crate::handle::{self, Handle, Message};
use crate::pacer::{self, Pacer};
use crate::{Shared, StreamId};

pub struct DummyOutStream {
    id: StreamId,
    handle: Handle,
    thread: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl DummyOutStream {
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        desc: OutStreamDesc,
        max_frames_per_write: usize,
    ) -> Result<DummyOutStream, Refused<OutStreamDesc>> {
        let (handle, receiver) = Handle::new();
        let (desc_sender, desc_receiver) = oneshot::channel::<OutStreamDesc>();

        // The descriptor is only sent once the thread exists, so a failed spawn can return it.
        let spawned = std::thread::Builder::new()
            .name("dummy-playback".into())
            .spawn(move || {
                if let Ok(desc) = desc_receiver.recv() {
                    PlaybackThread::new(desc, max_frames_per_write).run(receiver);
                }
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => return Err(Refused::new(Error::new_system(e), desc)),
        };

        if let Err(e) = desc_sender.send(desc) {
            let _ = thread.join();
            return Err(Refused::new(
                Error::new_system("stream thread exited early"),
                e.into_inner(),
            ));
        }

        let id = shared.register_stream(handle.clone());

        Ok(DummyOutStream {
            id,
            handle,
            thread: Some(thread),
            shared,
        })
    }
}

impl RawOutStream for DummyOutStream {
    fn start(&mut self) -> Result<()> {
        self.handle.start()
    }

    fn pause(&mut self, pause: bool) -> Result<()> {
        self.handle.pause(pause)
    }

    fn clear_buffer(&mut self) -> Result<()> {
        self.handle.clear_buffer()
    }

    fn latency(&mut self) -> Result<f64> {
        self.handle.latency()
    }
}

impl Drop for DummyOutStream {
    fn drop(&mut self) {
        self.shared.unregister_stream(self.id);
        handle::terminate(&self.handle, self.thread.take());
    }
}

struct PlaybackThread {
    write_callback: WriteCallback,
    underflow_callback: Option<XrunCallback>,
    error_callback: Option<ErrorCallback>,

    format: SampleFormat,
    channel_count: usize,
    bytes_per_frame: usize,
    sample_rate: u32,
    max_frames_per_write: usize,

    /// Writes come from the callback, the simulated device drains the consumer.
    producer: Producer<u8>,
    consumer: Consumer<u8>,
    scratch: Vec<u8>,

    pacer: Pacer,
    period: Duration,
    playing: bool,
    /// Set once the first callback after `start` has filled the buffer.
    primed: bool,
    underflowed: bool,
    disconnected: bool,
}

impl PlaybackThread {
    fn new(desc: OutStreamDesc, max_frames_per_write: usize) -> PlaybackThread {
        let channel_count = desc.layout.channel_count();
        let bytes_per_frame = desc.format.bytes_per_sample() * channel_count;
        let buffer_frames = (desc.software_latency * f64::from(desc.sample_rate)).ceil() as usize;
        let (producer, consumer) = ring::buffer_at_least(buffer_frames.max(1) * bytes_per_frame);
        let scratch = vec![0; producer.capacity()];

        tracing::debug!(
            name = %desc.name,
            format = %desc.format,
            channels = channel_count,
            sample_rate = desc.sample_rate,
            buffer_frames,
            "opened dummy output stream"
        );

        PlaybackThread {
            write_callback: desc.write_callback,
            underflow_callback: desc.underflow_callback,
            error_callback: desc.error_callback,
            format: desc.format,
            channel_count,
            bytes_per_frame,
            sample_rate: desc.sample_rate,
            max_frames_per_write: max_frames_per_write.max(1),
            period: pacer::period(buffer_frames.max(1), desc.sample_rate),
            producer,
            consumer,
            scratch,
            pacer: Pacer::new(desc.sample_rate),
            playing: false,
            primed: false,
            underflowed: false,
            disconnected: false,
        }
    }

    fn run(mut self, receiver: Receiver<Message>) {
        loop {
            match receiver.recv_timeout(self.period) {
                Ok(Message::Terminate) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(message) => self.handle_message(message),
                Err(RecvTimeoutError::Timeout) => {}
            }

            if self.playing {
                self.tick();
            }
        }

        tracing::debug!("dummy output stream closed");
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Start { sender } => {
                let _ = sender.send(self.start());
            }
            Message::Pause { sender, pause } => {
                let _ = sender.send(self.pause(pause));
            }
            Message::ClearBuffer { sender } => {
                self.consumer.clear();
                let _ = sender.send(Ok(()));
            }
            Message::Latency { sender } => {
                let _ = sender.send(Ok(self.latency()));
            }
            Message::Disconnect => self.disconnect(),
            Message::Terminate => {}
        }
    }

    fn start(&mut self) -> Result<()> {
        if self.disconnected {
            return Err(Error::BackendDisconnected);
        }

        self.playing = true;
        self.primed = false;
        self.underflowed = false;
        self.pacer.reset();
        Ok(())
    }

    fn pause(&mut self, pause: bool) -> Result<()> {
        if self.disconnected {
            return Err(Error::BackendDisconnected);
        }

        if self.playing == pause {
            self.playing = !pause;
            self.pacer.reset();
        }

        Ok(())
    }

    fn disconnect(&mut self) {
        if self.disconnected {
            return;
        }

        self.disconnected = true;
        self.playing = false;

        if let Some(callback) = &mut self.error_callback {
            callback(Error::BackendDisconnected);
        }
    }

    fn latency(&self) -> f64 {
        let frames = self.consumer.fill_count() / self.bytes_per_frame;
        frames as f64 / f64::from(self.sample_rate)
    }

    fn tick(&mut self) {
        let due = self.pacer.due();
        let available = self.consumer.fill_count() / self.bytes_per_frame;
        self.discard(due.min(available) * self.bytes_per_frame);

        if self.primed && due > available {
            self.underflowed = true;
            tracing::trace!(missing = due - available, "dummy output underflow");
            if let Some(callback) = &mut self.underflow_callback {
                callback();
            }
        }

        let free = self.producer.free_count() / self.bytes_per_frame;
        if free == 0 {
            return;
        }

        let frame_count_min = if self.primed { 0 } else { free };
        let mut pause_request = None;

        let mut writer = Writer {
            producer: &mut self.producer,
            scratch: &mut self.scratch,
            format: self.format,
            channel_count: self.channel_count,
            bytes_per_frame: self.bytes_per_frame,
            sample_rate: self.sample_rate,
            max_frames_per_write: self.max_frames_per_write,
            pending: None,
            underflowed: &mut self.underflowed,
            pause_request: &mut pause_request,
        };

        (self.write_callback)(&mut writer, frame_count_min, free);
        self.primed = true;

        if let Some(pause) = pause_request {
            if self.playing == pause {
                self.playing = !pause;
                self.pacer.reset();
            }
        }
    }

    /// Plays out `bytes` bytes.
    fn discard(&mut self, mut bytes: usize) {
        while bytes > 0 {
            let len = self.consumer.readable_region().len().min(bytes);
            if len == 0 {
                break;
            }
            self.consumer.advance_read(len);
            bytes -= len;
        }
    }
}

struct Writer<'a> {
    producer: &'a mut Producer<u8>,
    scratch: &'a mut [u8],
    format: SampleFormat,
    channel_count: usize,
    bytes_per_frame: usize,
    sample_rate: u32,
    max_frames_per_write: usize,
    pending: Option<usize>,
    underflowed: &'a mut bool,
    pause_request: &'a mut Option<bool>,
}

impl WriteContext for Writer<'_> {
    fn begin_write(&mut self, frame_count: usize) -> Result<ChannelAreas<'_>> {
        if self.pending.is_some() {
            return Err(Error::invalid("begin_write called twice"));
        }

        let free = self.producer.free_count() / self.bytes_per_frame;
        let frames = frame_count.min(free).min(self.max_frames_per_write);
        self.pending = Some(frames);

        let bytes = &mut self.scratch[..frames * self.bytes_per_frame];
        Ok(ChannelAreas::new(bytes, self.format, self.channel_count))
    }

    fn end_write(&mut self) -> Result<()> {
        let frames = self
            .pending
            .take()
            .ok_or(Error::invalid("end_write without begin_write"))?;

        let bytes = frames * self.bytes_per_frame;
        let written = self.producer.write_slice(&self.scratch[..bytes]);
        debug_assert_eq!(written, bytes);

        if std::mem::take(self.underflowed) {
            return Err(Error::Underflow);
        }

        Ok(())
    }

    fn latency(&mut self) -> Result<f64> {
        let frames = self.producer.fill_count() / self.bytes_per_frame;
        Ok(frames as f64 / f64::from(self.sample_rate))
    }

    fn pause(&mut self, pause: bool) -> Result<()> {
        *self.pause_request = Some(pause);
        Ok(())
    }
}
