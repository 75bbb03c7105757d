use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use rsio_core::area::ReadAreas;
use rsio_core::backend::{
    ErrorCallback, InStreamDesc, RawInStream, Refused, ReadCallback, ReadContext, XrunCallback,
};
use rsio_core::format::SampleFormat;
use rsio_core::sync::ring::{self, Consumer, Producer};
use rsio_core::{Error, Result};

use crate::handle::{self, Handle, Message};
use crate::pacer::{self, Pacer};
use crate::{Shared, StreamId};

pub struct DummyInStream {
    id: StreamId,
    handle: Handle,
    thread: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl DummyInStream {
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        desc: InStreamDesc,
        max_frames_per_read: usize,
    ) -> Result<DummyInStream, Refused<InStreamDesc>> {
        let (handle, receiver) = Handle::new();
        let (desc_sender, desc_receiver) = oneshot::channel::<InStreamDesc>();

        // The descriptor is only sent once the thread exists, so a failed spawn can return it.
        let spawned = std::thread::Builder::new()
            .name("dummy-capture".into())
            .spawn(move || {
                if let Ok(desc) = desc_receiver.recv() {
                    CaptureThread::new(desc, max_frames_per_read).run(receiver);
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

        Ok(DummyInStream {
            id,
            handle,
            thread: Some(thread),
            shared,
        })
    }
}

impl RawInStream for DummyInStream {
    fn start(&mut self) -> Result<()> {
        self.handle.start()
    }

    fn pause(&mut self, pause: bool) -> Result<()> {
        self.handle.pause(pause)
    }

    fn latency(&mut self) -> Result<f64> {
        self.handle.latency()
    }
}

impl Drop for DummyInStream {
    fn drop(&mut self) {
        self.shared.unregister_stream(self.id);
        handle::terminate(&self.handle, self.thread.take());
    }
}

struct CaptureThread {
    read_callback: ReadCallback,
    overflow_callback: Option<XrunCallback>,
    error_callback: Option<ErrorCallback>,

    format: SampleFormat,
    channel_count: usize,
    bytes_per_frame: usize,
    sample_rate: u32,
    max_frames_per_read: usize,

    /// The simulated device fills the producer, the callback drains the consumer.
    producer: Producer<u8>,
    consumer: Consumer<u8>,
    /// Encoded silence, as many bytes as the ring holds.
    silence: Vec<u8>,
    scratch: Vec<u8>,

    pacer: Pacer,
    period: Duration,
    recording: bool,
    disconnected: bool,
}

impl CaptureThread {
    fn new(desc: InStreamDesc, max_frames_per_read: usize) -> CaptureThread {
        let channel_count = desc.layout.channel_count();
        let bytes_per_sample = desc.format.bytes_per_sample();
        let bytes_per_frame = bytes_per_sample * channel_count;
        let buffer_frames = (desc.software_latency * f64::from(desc.sample_rate)).ceil() as usize;
        let (producer, consumer) = ring::buffer_at_least(buffer_frames.max(1) * bytes_per_frame);

        let mut silence = vec![0; producer.capacity()];
        let mut sample = [0; 8];
        desc.format.encode_f32(0.0, &mut sample[..bytes_per_sample]);
        for chunk in silence.chunks_exact_mut(bytes_per_sample) {
            chunk.copy_from_slice(&sample[..bytes_per_sample]);
        }

        tracing::debug!(
            name = %desc.name,
            format = %desc.format,
            channels = channel_count,
            sample_rate = desc.sample_rate,
            buffer_frames,
            "opened dummy input stream"
        );

        CaptureThread {
            read_callback: desc.read_callback,
            overflow_callback: desc.overflow_callback,
            error_callback: desc.error_callback,
            format: desc.format,
            channel_count,
            bytes_per_frame,
            sample_rate: desc.sample_rate,
            max_frames_per_read: max_frames_per_read.max(1),
            period: pacer::period(buffer_frames.max(1), desc.sample_rate),
            scratch: vec![0; producer.capacity()],
            silence,
            producer,
            consumer,
            pacer: Pacer::new(desc.sample_rate),
            recording: false,
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

            if self.recording {
                self.tick();
            }
        }

        tracing::debug!("dummy input stream closed");
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Start { sender } => {
                let result = if self.disconnected {
                    Err(Error::BackendDisconnected)
                } else {
                    self.recording = true;
                    self.pacer.reset();
                    Ok(())
                };
                let _ = sender.send(result);
            }
            Message::Pause { sender, pause } => {
                let result = if self.disconnected {
                    Err(Error::BackendDisconnected)
                } else {
                    self.set_recording(!pause);
                    Ok(())
                };
                let _ = sender.send(result);
            }
            Message::ClearBuffer { sender } => {
                self.consumer.clear();
                let _ = sender.send(Ok(()));
            }
            Message::Latency { sender } => {
                let frames = self.consumer.fill_count() / self.bytes_per_frame;
                let _ = sender.send(Ok(frames as f64 / f64::from(self.sample_rate)));
            }
            Message::Disconnect => {
                if !self.disconnected {
                    self.disconnected = true;
                    self.recording = false;
                    if let Some(callback) = &mut self.error_callback {
                        callback(Error::BackendDisconnected);
                    }
                }
            }
            Message::Terminate => {}
        }
    }

    fn set_recording(&mut self, recording: bool) {
        if self.recording != recording {
            self.recording = recording;
            self.pacer.reset();
        }
    }

    fn tick(&mut self) {
        let due = self.pacer.due();
        let free = self.producer.free_count() / self.bytes_per_frame;
        let frames = due.min(free);
        self.producer
            .write_slice(&self.silence[..frames * self.bytes_per_frame]);

        if due > free {
            tracing::trace!(lost = due - free, "dummy input overflow");
            if let Some(callback) = &mut self.overflow_callback {
                callback();
            }
        }

        let available = self.consumer.fill_count() / self.bytes_per_frame;
        if available == 0 {
            return;
        }

        let mut pause_request = None;
        let mut reader = Reader {
            consumer: &mut self.consumer,
            scratch: &mut self.scratch,
            format: self.format,
            channel_count: self.channel_count,
            bytes_per_frame: self.bytes_per_frame,
            sample_rate: self.sample_rate,
            max_frames_per_read: self.max_frames_per_read,
            pending: None,
            pause_request: &mut pause_request,
        };

        (self.read_callback)(&mut reader, 0, available);

        if let Some(pause) = pause_request {
            self.set_recording(!pause);
        }
    }
}

struct Reader<'a> {
    consumer: &'a mut Consumer<u8>,
    scratch: &'a mut [u8],
    format: SampleFormat,
    channel_count: usize,
    bytes_per_frame: usize,
    sample_rate: u32,
    max_frames_per_read: usize,
    pending: Option<usize>,
    pause_request: &'a mut Option<bool>,
}

impl ReadContext for Reader<'_> {
    fn begin_read(&mut self, frame_count: usize) -> Result<ReadAreas<'_>> {
        if self.pending.is_some() {
            return Err(Error::invalid("begin_read called twice"));
        }

        let available = self.consumer.fill_count() / self.bytes_per_frame;
        let frames = frame_count.min(available).min(self.max_frames_per_read);
        let bytes = &mut self.scratch[..frames * self.bytes_per_frame];
        let copied = self.consumer.peek_slice(bytes);
        debug_assert_eq!(copied, bytes.len());
        self.pending = Some(frames);

        Ok(ReadAreas::new(
            &self.scratch[..frames * self.bytes_per_frame],
            self.format,
            self.channel_count,
        ))
    }

    fn end_read(&mut self) -> Result<()> {
        let frames = self
            .pending
            .take()
            .ok_or(Error::invalid("end_read without begin_read"))?;
        self.consumer.advance_read(frames * self.bytes_per_frame);
        Ok(())
    }

    fn latency(&mut self) -> Result<f64> {
        let frames = self.consumer.fill_count() / self.bytes_per_frame;
        Ok(frames as f64 / f64::from(self.sample_rate))
    }

    fn pause(&mut self, pause: bool) -> Result<()> {
        *self.pause_request = Some(pause);
        Ok(())
    }
}
