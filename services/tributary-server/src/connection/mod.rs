//! Connection module
//!
//! One client session: the shared send handle, the receive loop's reader,
//! the single outbound writer, and the envelope protocol spoken over it.

pub mod handle;
pub mod protocol;
pub mod reader;
pub mod writer;
