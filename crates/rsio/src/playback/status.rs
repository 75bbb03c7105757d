use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;
use rsio_core::Error;

use crate::Waker;

/// Errors kept until the host collects them. Later ones are counted and dropped.
const ERROR_CAPACITY: usize = 8;

/// State shared between the realtime callback and the host loop.
///
/// Every operation is lock-free; the callback side never allocates.
#[derive(Debug)]
pub struct PlaybackStatus {
    done: AtomicBool,
    errors: ArrayQueue<Error>,
    underflows: AtomicUsize,
    dropped_errors: AtomicUsize,
    waker: Option<Waker>,
}

impl PlaybackStatus {
    /// `waker` interrupts the host's event wait once playback finishes.
    pub fn new(waker: Option<Waker>) -> PlaybackStatus {
        PlaybackStatus {
            done: AtomicBool::new(false),
            errors: ArrayQueue::new(ERROR_CAPACITY),
            underflows: AtomicUsize::new(0),
            dropped_errors: AtomicUsize::new(0),
            waker,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Marks playback complete. Returns `true` only for the call that did it.
    pub fn finish(&self) -> bool {
        let first = !self.done.swap(true, Ordering::AcqRel);
        if first {
            if let Some(waker) = &self.waker {
                waker.wakeup();
            }
        }
        first
    }

    /// Records a fatal error and finishes.
    pub fn fail(&self, error: Error) {
        if let Err(error) = self.errors.push(error) {
            self.dropped_errors.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(%error, "error queue full");
        }
        self.finish();
    }

    /// Oldest recorded error, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.errors.pop()
    }

    pub fn record_underflow(&self) {
        self.underflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn underflows(&self) -> usize {
        self.underflows.load(Ordering::Relaxed)
    }

    /// Errors that did not fit in the queue.
    pub fn dropped_errors(&self) -> usize {
        self.dropped_errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finishes_once() {
        let status = PlaybackStatus::new(None);
        assert!(!status.is_done());
        assert!(status.finish());
        assert!(!status.finish());
        assert!(status.is_done());
    }

    #[test]
    fn errors_are_queued_in_order() {
        let status = PlaybackStatus::new(None);
        status.fail(Error::Streaming);
        status.fail(Error::BackendDisconnected);

        assert!(status.is_done());
        assert_eq!(status.take_error(), Some(Error::Streaming));
        assert_eq!(status.take_error(), Some(Error::BackendDisconnected));
        assert_eq!(status.take_error(), None);
    }

    #[test]
    fn overflowing_errors_are_counted() {
        let status = PlaybackStatus::new(None);
        for _ in 0..ERROR_CAPACITY + 3 {
            status.fail(Error::Interrupted);
        }

        let mut count = 0;
        while status.take_error().is_some() {
            count += 1;
        }
        assert_eq!(count, ERROR_CAPACITY);
        assert_eq!(status.dropped_errors(), 3);
    }
}
