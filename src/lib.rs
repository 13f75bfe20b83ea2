//! Wire codec for the 9P2000 file protocol and its 9P2000.u Unix extension.
//!
//! [`Codec`] turns [`TaggedFcall`] values into message bodies and back,
//! [`Framer`] adds the length prefix and moves frames over a byte stream,
//! and [`Conn`] ties a framer to one transport.

pub mod codec;
pub mod error;
pub mod fcall;
pub mod transport;
pub mod wire;

pub use codec::Codec;
pub use error::{Error, Result};
pub use fcall::*;
pub use transport::{Config, Conn, Framer, Transport, DEFAULT_MAX_MESSAGE_SIZE};
