//! Length-prefixed framing over byte streams.
//!
//! A frame is `size[4] type[1] tag[2] payload`, where `size` counts every
//! byte of the frame including itself.

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::fcall::{Dialect, MsgType, Rversion, TaggedFcall, MIN_FRAME_SIZE};
use crate::wire::{encode_raw, encode_u16, encode_u8};
use log::{debug, trace};
use std::io::{Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Largest frame accepted unless configured otherwise (1 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 1_048_576;

/// Per-session wire settings.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub dialect: Dialect,
    /// Upper bound on a frame's declared size, in both directions.
    pub max_message_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dialect: Dialect::Baseline,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl Config {
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: u32) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Settings agreed by a version exchange.
    pub fn from_rversion(rversion: &Rversion) -> Result<Config> {
        let dialect = Dialect::from_version(&rversion.version).ok_or_else(|| {
            Error::format(
                "version",
                format!("unsupported protocol version {:?}", rversion.version),
            )
        })?;
        if rversion.msize < MIN_FRAME_SIZE {
            return Err(Error::format(
                "msize",
                format!("{} is smaller than the frame header", rversion.msize),
            ));
        }
        Ok(Config {
            dialect,
            max_message_size: rversion.msize,
        })
    }
}

/// Frames messages onto a transport, reusing one buffer.
///
/// The buffer is locked for the whole of each `send`/`recv`, so callers
/// sharing a `Framer` are serialized. Independent sessions should each use
/// their own.
pub struct Framer {
    codec: Codec,
    max_message_size: u32,
    buf: Mutex<Vec<u8>>,
}

impl Framer {
    pub fn new(config: Config) -> Framer {
        Framer {
            codec: Codec::new(config.dialect),
            max_message_size: config.max_message_size,
            buf: Mutex::new(Vec::new()),
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn max_message_size(&self) -> u32 {
        self.max_message_size
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        // Cleared before every use, so a poisoned buffer is still usable.
        self.buf.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fill in the size prefix of a complete frame.
    fn seal(&self, frame: &mut [u8]) -> Result<()> {
        let size = frame.len() as u64;
        if size > self.max_message_size as u64 {
            return Err(Error::BadFrameSize {
                size,
                max: self.max_message_size,
            });
        }
        frame[..4].copy_from_slice(&(size as u32).to_le_bytes());
        Ok(())
    }

    /// Encode `msg` and write it as a single frame.
    ///
    /// Nothing is written if encoding fails or the frame would exceed the
    /// configured maximum.
    pub fn send<W: Write>(&self, w: &mut W, msg: &TaggedFcall) -> Result<()> {
        let mut buf = self.lock();
        buf.clear();
        buf.extend_from_slice(&[0; 4]);
        self.codec.encode(&mut buf, msg)?;
        self.seal(&mut buf)?;
        trace!("-> {:?}", msg);
        w.write_all(&buf)?;
        Ok(())
    }

    /// Write an already-encoded payload under `typ` and `tag`.
    ///
    /// The type byte must name a registered kind; the payload itself is
    /// passed through unchecked.
    pub fn send_frame<W: Write>(
        &self,
        w: &mut W,
        typ: u8,
        tag: u16,
        payload: &[u8],
    ) -> Result<()> {
        let msg_type = MsgType::from_byte(typ)?;
        let mut buf = self.lock();
        buf.clear();
        buf.extend_from_slice(&[0; 4]);
        encode_u8(&mut buf, typ);
        encode_u16(&mut buf, tag);
        encode_raw(&mut buf, payload);
        self.seal(&mut buf)?;
        trace!(
            "-> {:?} tag {} ({} payload bytes)",
            msg_type,
            tag,
            payload.len()
        );
        w.write_all(&buf)?;
        Ok(())
    }

    /// Read and decode exactly one frame.
    ///
    /// A transport that ends before the frame is complete yields
    /// `Error::ConnectionClosed`.
    pub fn recv<R: Read>(&self, r: &mut R) -> Result<TaggedFcall> {
        let mut buf = self.lock();
        let mut prefix = [0u8; 4];
        r.read_exact(&mut prefix)?;
        let size = u32::from_le_bytes(prefix);
        if size < MIN_FRAME_SIZE || size > self.max_message_size {
            return Err(Error::BadFrameSize {
                size: size as u64,
                max: self.max_message_size,
            });
        }
        buf.clear();
        buf.resize(size as usize - 4, 0);
        r.read_exact(&mut buf[..])?;
        let msg = self.codec.decode_msg(&buf)?;
        trace!("<- {:?}", msg);
        Ok(msg)
    }
}

pub trait Transport: Read + Write + Send + Sync {
    fn set_read_timeout(&mut self, dur: Option<Duration>) -> std::io::Result<()>;

    fn read_timeout(&self) -> std::io::Result<Option<Duration>>;

    fn shutdown(&self) -> std::io::Result<()>;
}

impl Transport for TcpStream {
    fn set_read_timeout(&mut self, d: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, d)
    }

    fn read_timeout(&self) -> std::io::Result<Option<Duration>> {
        TcpStream::read_timeout(self)
    }

    fn shutdown(&self) -> std::io::Result<()> {
        TcpStream::shutdown(self, std::net::Shutdown::Both)
    }
}

#[cfg(unix)]
impl Transport for UnixStream {
    fn set_read_timeout(&mut self, d: Option<Duration>) -> std::io::Result<()> {
        UnixStream::set_read_timeout(self, d)
    }

    fn read_timeout(&self) -> std::io::Result<Option<Duration>> {
        UnixStream::read_timeout(self)
    }

    fn shutdown(&self) -> std::io::Result<()> {
        UnixStream::shutdown(self, std::net::Shutdown::Both)
    }
}

/// One session: a transport and its framer.
///
/// Any error leaves the stream at an unknown offset, so the first failure
/// shuts the transport down and every later call fails with
/// `Error::ConnectionClosed`.
pub struct Conn<T: Transport> {
    transport: T,
    framer: Framer,
    closed: bool,
}

impl<T: Transport> Conn<T> {
    pub fn new(transport: T, config: Config) -> Conn<T> {
        Conn {
            transport,
            framer: Framer::new(config),
            closed: false,
        }
    }

    pub fn framer(&self) -> &Framer {
        &self.framer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Switch to the settings agreed by a version exchange.
    pub fn reconfigure(&mut self, config: Config) {
        self.framer = Framer::new(config);
    }

    pub fn set_read_timeout(&mut self, dur: Option<Duration>) -> Result<()> {
        self.transport.set_read_timeout(dur)?;
        Ok(())
    }

    pub fn send(&mut self, msg: &TaggedFcall) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        let result = self.framer.send(&mut self.transport, msg);
        result.map_err(|err| self.fail(err))
    }

    pub fn send_frame(&mut self, typ: u8, tag: u16, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        let result = self.framer.send_frame(&mut self.transport, typ, tag, payload);
        result.map_err(|err| self.fail(err))
    }

    pub fn recv(&mut self) -> Result<TaggedFcall> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        let result = self.framer.recv(&mut self.transport);
        result.map_err(|err| self.fail(err))
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn fail(&mut self, err: Error) -> Error {
        debug!("closing 9p session: {}", err);
        if let Err(err) = self.transport.shutdown() {
            debug!("shutdown failed: {}", err);
        }
        self.closed = true;
        err
    }
}
