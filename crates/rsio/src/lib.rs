//! Audio I/O streams on top of interchangeable backends.
//!
//! A [`Context`] connects to one backend and lists its devices. Streams are negotiated against a
//! device and then driven by a realtime callback on the backend's thread. The [`playback`]
//! module builds a complete file-player pipeline on top of that.

mod context;
mod in_stream;
mod negotiate;
mod out_stream;
pub mod playback;

pub use rsio_core::{area, backend, device, format, layout, sync, Error, Result};

pub use crate::context::{Context, Waker};
pub use crate::in_stream::InStream;
pub use crate::negotiate::Negotiated;
pub use crate::out_stream::{OutStream, StreamState};
