//! Common foundation for the conveyor crates: the error type and the
//! `Result` alias used across the public API surface.

pub mod error;
pub mod result;

pub use error::{Error, ErrorKind};
pub use result::Result;
