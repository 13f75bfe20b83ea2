//! Codec and framing errors.

use crate::fcall::MsgType;
use thiserror::Error;

/// Errors produced while encoding, decoding or framing 9P messages.
///
/// Any of these on a shared transport leaves the stream at an unknown
/// offset; the session should be torn down (see [`crate::transport::Conn`]).
#[derive(Debug, Error)]
pub enum Error {
    /// A value cannot be represented in its field, or the field is not
    /// valid for the codec's dialect.
    #[error("format error in {field}: {detail}")]
    Format { field: &'static str, detail: String },

    /// Fewer bytes remained than a fixed or declared width requires.
    #[error("truncated input reading {field}: needed {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    /// The type byte does not name a registered message kind.
    #[error("unknown message kind {0}")]
    UnknownMessageKind(u8),

    /// A frame length prefix outside `[4, max]`.
    #[error("bad frame size {size}, expected 4..={max}")]
    BadFrameSize { size: u64, max: u32 },

    /// The payload decoded cleanly but bytes were left over.
    #[error("{extra} trailing bytes after {kind:?} payload")]
    TrailingBytes { kind: MsgType, extra: usize },

    /// The peer closed the transport mid-frame, or the session was
    /// already closed after a fatal error.
    #[error("connection closed")]
    ConnectionClosed,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Io(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn format(field: &'static str, detail: impl Into<String>) -> Error {
        Error::Format {
            field,
            detail: detail.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            _ => Error::Io(err),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;

        match err {
            Error::Io(err) => err,
            Error::ConnectionClosed => std::io::Error::new(ErrorKind::UnexpectedEof, err),
            err => std::io::Error::new(ErrorKind::InvalidData, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_is_connection_closed() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(err, Error::ConnectionClosed));

        let err: Error = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn codec_errors_become_invalid_data() {
        let err: std::io::Error = Error::UnknownMessageKind(255).into();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert_eq!(err.to_string(), "unknown message kind 255");
    }

    #[test]
    fn trailing_bytes_names_the_kind() {
        let err = Error::TrailingBytes {
            kind: MsgType::Tclunk,
            extra: 1,
        };
        assert_eq!(err.to_string(), "1 trailing bytes after Tclunk payload");
    }

    #[test]
    fn diagnostics_name_field_and_sizes() {
        let err = Error::Truncated {
            field: "qid.path",
            needed: 8,
            available: 7,
        };
        assert_eq!(
            err.to_string(),
            "truncated input reading qid.path: needed 8 bytes, 7 available"
        );
    }
}
