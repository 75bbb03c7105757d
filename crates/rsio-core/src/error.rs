use std::fmt::Display;

use crate::backend::BackendKind;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("out of memory")]
    NoMem,
    #[error("unable to initialize audio backend: {backend}")]
    InitBackend { backend: BackendKind },
    #[error("system resource not available: {message}")]
    SystemResources { message: String },
    #[error("unable to open device: {message}")]
    OpeningDevice { message: String },
    #[error("no such device")]
    NoSuchDevice,
    #[error("invalid value: {message}")]
    Invalid { message: &'static str },
    #[error("backend not compiled in: {0}")]
    BackendCompiledOut(BackendKind),
    #[error("unrecoverable streaming failure")]
    Streaming,
    #[error("incompatible device")]
    IncompatibleDevice,
    #[error("incompatible backend")]
    IncompatibleBackend,
    #[error("backend disconnected")]
    BackendDisconnected,
    #[error("interrupted; try again")]
    Interrupted,
    #[error("buffer underflow")]
    Underflow,
    #[error("unable to convert to or from UTF-8 to the native string format")]
    EncodingString,

    #[error("device advertises no channel layout")]
    NoCompatibleLayout,
    #[error("device supports none of the preferred sample formats")]
    NoCompatibleFormat,
    #[error("no device available")]
    NoDeviceAvailable,
    #[error("device probe failed: {0}")]
    ProbeFailed(Box<Error>),
    #[error("too many channels")]
    TooManyChannels,

    #[error("sample source error: {message}")]
    Source { message: String },
}

impl Error {
    #[cold]
    pub fn new_system<E: Display>(error: E) -> Error {
        Error::SystemResources {
            message: error.to_string(),
        }
    }

    #[cold]
    pub fn new_opening_device<E: Display>(error: E) -> Error {
        Error::OpeningDevice {
            message: error.to_string(),
        }
    }

    #[cold]
    pub fn new_source<E: Display>(error: E) -> Error {
        Error::Source {
            message: error.to_string(),
        }
    }

    #[cold]
    pub fn invalid(message: &'static str) -> Error {
        Error::Invalid { message }
    }

    /// `true` for conditions the backend retries on its own.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Underflow | Error::Interrupted)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
