use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use rsio_core::{Error, Result};

pub enum Message {
    Start {
        sender: oneshot::Sender<Result<()>>,
    },
    Pause {
        sender: oneshot::Sender<Result<()>>,
        pause: bool,
    },
    ClearBuffer {
        sender: oneshot::Sender<Result<()>>,
    },
    Latency {
        sender: oneshot::Sender<Result<f64>>,
    },
    Disconnect,
    Terminate,
}

/// Host side of a stream thread.
#[derive(Clone)]
pub struct Handle {
    sender: Sender<Message>,
}

impl Handle {
    pub fn new() -> (Handle, Receiver<Message>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Handle { sender }, receiver)
    }

    pub fn send(&self, message: Message) -> Result<()> {
        self.sender.send(message).map_err(|_| Error::Streaming)
    }

    fn send_recv<T>(&self, recv: oneshot::Receiver<Result<T>>, message: Message) -> Result<T> {
        self.send(message)?;
        recv.recv().map_err(|_| Error::Streaming)?
    }

    pub fn start(&self) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::Start { sender })
    }

    pub fn pause(&self, pause: bool) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::Pause { sender, pause })
    }

    pub fn clear_buffer(&self) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::ClearBuffer { sender })
    }

    pub fn latency(&self) -> Result<f64> {
        let (sender, receiver) = oneshot::channel();
        self.send_recv(receiver, Message::Latency { sender })
    }
}

/// Stops the thread and waits for it, so no callback runs once this returns.
pub fn terminate(handle: &Handle, thread: Option<JoinHandle<()>>) {
    let _ = handle.send(Message::Terminate);

    if let Some(thread) = thread {
        if thread.join().is_err() {
            tracing::error!("dummy stream thread panicked");
        }
    }
}
