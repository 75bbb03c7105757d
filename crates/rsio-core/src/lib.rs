pub mod area;
pub mod backend;
pub mod device;
mod error;
pub mod format;
pub mod layout;
pub mod sync;

pub use self::error::{Error, Result};
