//! 9P protocol data types and constants.
//!
//! # Protocol
//! 9P2000 and the 9P2000.u Unix extension.

use bitflags::bitflags;
use enum_primitive::*;

/// 9P2000 version string
pub const P92000: &str = "9P2000";

/// 9P2000.u version string
pub const P92000U: &str = "9P2000.u";

/*
 * 9P magic numbers
 */
/// Special tag which `Tversion`/`Rversion` must use as `tag`
///
/// The codec never inspects tags; allocating them (and honouring `NOTAG`)
/// is up to the caller.
pub const NOTAG: u16 = !0;

/// Special value which `Tattach` with no auth must use as `afid`
pub const NOFID: u32 = !0;

/// Special uid which `Tauth`/`Tattach` use as `n_uname` to indicate no uid is specified
pub const NONUNAME: u32 = !0;

/// Maximum number of names in a single `Twalk`, by convention.
///
/// Not enforced by the codec.
pub const MAXWELEM: usize = 16;

/// Ample room for `Twrite`/`Rread` header
///
/// size[4] Tread/Twrite[1] tag[2] fid[4] offset[8] count[4]
pub const IOHDRSZ: u32 = 24;

/// Smallest possible frame: the size field itself.
pub const MIN_FRAME_SIZE: u32 = 4;

/*
 * Open modes, `Topen.mode` and `Tcreate.mode`
 */
/// Open for read
pub const OREAD: u8 = 0;
/// Open for write
pub const OWRITE: u8 = 1;
/// Open for read and write
pub const ORDWR: u8 = 2;
/// Execute, read but check execute permission
pub const OEXEC: u8 = 3;
/// Truncate file first
pub const OTRUNC: u8 = 0x10;
/// Remove on close
pub const ORCLOSE: u8 = 0x40;

bitflags! {
    /// Bits in Qid.typ
    ///
    /// Every bit of the byte is assigned, so decoding never drops bits.
    ///
    /// # Protocol
    /// 9P2000/9P2000.u
    #[derive(Default)]
    pub struct QidType: u8 {
        #[doc = "Type bit for directories"]
        const DIR       = 0x80;
        #[doc = "Type bit for append only files"]
        const APPEND    = 0x40;
        #[doc = "Type bit for exclusive use files"]
        const EXCL      = 0x20;
        #[doc = "Type bit for mounted channel"]
        const MOUNT     = 0x10;
        #[doc = "Type bit for authentication file"]
        const AUTH      = 0x08;
        #[doc = "Type bit for not-backed-up file"]
        const TMP       = 0x04;
        #[doc = "Type bits for symbolic links (9P2000.u)"]
        const SYMLINK   = 0x02;
        #[doc = "Type bits for hard-link (9P2000.u)"]
        const LINK      = 0x01;
        #[doc = "Plain file"]
        const FILE      = 0x00;
    }
}

bitflags! {
    /// High bits of `Stat.mode` and `Tcreate.perm`.
    ///
    /// The low nine bits carry ordinary rwx permissions and are kept in the
    /// raw `u32`; use `DirMode::from_bits_truncate(stat.mode)` to inspect
    /// the type bits.
    pub struct DirMode: u32 {
        const DIR       = 0x8000_0000;
        const APPEND    = 0x4000_0000;
        const EXCL      = 0x2000_0000;
        const MOUNT     = 0x1000_0000;
        const AUTH      = 0x0800_0000;
        const TMP       = 0x0400_0000;
        #[doc = "9P2000.u"]
        const SYMLINK   = 0x0200_0000;
        #[doc = "9P2000.u"]
        const DEVICE    = 0x0080_0000;
        #[doc = "9P2000.u"]
        const NAMEDPIPE = 0x0020_0000;
        #[doc = "9P2000.u"]
        const SOCKET    = 0x0010_0000;
        #[doc = "9P2000.u"]
        const SETUID    = 0x0008_0000;
        #[doc = "9P2000.u"]
        const SETGID    = 0x0004_0000;
    }
}

impl From<DirMode> for QidType {
    fn from(mode: DirMode) -> Self {
        // Qid type bits are the top byte of the mode.
        QidType::from_bits_truncate((mode.bits() >> 24) as u8)
    }
}

/// Wire variant, negotiated once per connection by `Tversion`/`Rversion`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// Plain 9P2000.
    #[default]
    Baseline,
    /// 9P2000.u: numeric ids, extension strings and errno values.
    Unix,
}

impl Dialect {
    /// Version string announced in `Tversion` for this dialect.
    pub fn version(self) -> &'static str {
        match self {
            Dialect::Baseline => P92000,
            Dialect::Unix => P92000U,
        }
    }

    pub fn from_version(version: &str) -> Option<Dialect> {
        match version {
            P92000 => Some(Dialect::Baseline),
            P92000U => Some(Dialect::Unix),
            _ => None,
        }
    }

    pub fn is_unix(self) -> bool {
        self == Dialect::Unix
    }
}

enum_from_primitive! {
    #[doc = "Message type, 9P operations"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub enum MsgType {
        Tversion        = 100,
        Rversion,
        Tauth           = 102,
        Rauth,
        Tattach         = 104,
        Rattach,
        //Terror          = 106,  // Illegal, never used
        Rerror          = 107,
        Tflush          = 108,
        Rflush,
        Twalk           = 110,
        Rwalk,
        Topen           = 112,
        Ropen,
        Tcreate         = 114,
        Rcreate,
        Tread           = 116,
        Rread,
        Twrite          = 118,
        Rwrite,
        Tclunk          = 120,
        Rclunk,
        Tremove         = 122,
        Rremove,
        Tstat           = 124,
        Rstat,
        Twstat          = 126,
        Rwstat,
    }
}

impl MsgType {
    /// Look up a type byte, failing for anything unregistered.
    pub fn from_byte(typ: u8) -> crate::Result<MsgType> {
        MsgType::from_u8(typ).ok_or(crate::Error::UnknownMessageKind(typ))
    }

    /// True for requests (T-messages).
    pub fn is_request(self) -> bool {
        (self as u8) % 2 == 0
    }
}

/// Unique, versioned server-side file identifier. Always 13 bytes on the wire.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Qid {
    pub typ: QidType,
    pub version: u32,
    pub path: u64,
}

/// 9P2000.u additions to a directory entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnixStat {
    pub extension: String,
    pub n_uid: u32,
    pub n_gid: u32,
    pub n_muid: u32,
}

/// Directory entry, as carried by `Rstat`/`Twstat`.
///
/// Names and ids are UTF-8; a record holding any other bytes fails to
/// decode with `Error::Format`.
///
/// `unix` is `Some` exactly when the entry travels over a 9P2000.u
/// connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    pub typ: u16,
    pub dev: u32,
    pub qid: Qid,
    pub mode: u32,
    pub atime: u32,
    pub mtime: u32,
    pub length: u64,
    pub name: String,
    pub uid: String,
    pub gid: String,
    pub muid: String,
    pub unix: Option<UnixStat>,
}

impl Stat {
    /// Value of the record's own size field: every byte after it.
    pub fn size(&self) -> usize {
        // type[2] dev[4] qid[13] mode[4] atime[4] mtime[4] length[8]
        // and four 2-byte string prefixes.
        let mut sz = 2 + 4 + 13 + 4 + 4 + 4 + 8 + 4 * 2;
        sz += self.name.len() + self.uid.len() + self.gid.len() + self.muid.len();
        if let Some(ref unix) = self.unix {
            sz += 2 + unix.extension.len() + 4 + 4 + 4;
        }
        sz
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tversion {
    pub msize: u32,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rversion {
    pub msize: u32,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tauth {
    pub afid: u32,
    pub uname: String,
    pub aname: String,
    /// 9P2000.u only
    pub n_uname: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rauth {
    pub aqid: Qid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rerror {
    pub ename: String,
    /// 9P2000.u only
    pub errno: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tflush {
    pub oldtag: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rflush {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tattach {
    pub fid: u32,
    pub afid: u32,
    pub uname: String,
    pub aname: String,
    /// 9P2000.u only
    pub n_uname: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rattach {
    pub qid: Qid,
}

/// Path elements must be UTF-8, as with every string field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Twalk {
    pub fid: u32,
    pub newfid: u32,
    pub wnames: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rwalk {
    pub wqids: Vec<Qid>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topen {
    pub fid: u32,
    pub mode: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ropen {
    pub qid: Qid,
    pub iounit: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tcreate {
    pub fid: u32,
    pub name: String,
    pub perm: u32,
    pub mode: u8,
    /// 9P2000.u only: symlink target, device spec and so on.
    pub extension: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rcreate {
    pub qid: Qid,
    pub iounit: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tread {
    pub fid: u32,
    pub offset: u64,
    pub count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rread {
    pub data: Vec<u8>,
}

/// The wire `count` is always `data.len()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Twrite {
    pub fid: u32,
    pub offset: u64,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rwrite {
    pub count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tclunk {
    pub fid: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rclunk {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tremove {
    pub fid: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rremove {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tstat {
    pub fid: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rstat {
    pub stat: Vec<Stat>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Twstat {
    pub fid: u32,
    pub stat: Vec<Stat>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rwstat {}

/// Errno used when an `io::Error` carries no OS error code.
const EIO: u32 = 5;

impl Rerror {
    /// Build an error response for `dialect` from a local failure.
    pub fn from_io_error(err: &std::io::Error, dialect: Dialect) -> Rerror {
        let errno = match dialect {
            Dialect::Baseline => None,
            Dialect::Unix => Some(err.raw_os_error().map(|e| e as u32).unwrap_or(EIO)),
        };
        Rerror {
            ename: err.to_string(),
            errno,
        }
    }
}

impl From<Rerror> for std::io::Error {
    fn from(err: Rerror) -> Self {
        match err.errno {
            Some(errno) if errno != 0 => std::io::Error::from_raw_os_error(errno as i32),
            _ => std::io::Error::new(std::io::ErrorKind::Other, err.ename),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fcall {
    Tversion(Tversion),
    Rversion(Rversion),
    Tauth(Tauth),
    Rauth(Rauth),
    Tattach(Tattach),
    Rattach(Rattach),
    Rerror(Rerror),
    Tflush(Tflush),
    Rflush(Rflush),
    Twalk(Twalk),
    Rwalk(Rwalk),
    Topen(Topen),
    Ropen(Ropen),
    Tcreate(Tcreate),
    Rcreate(Rcreate),
    Tread(Tread),
    Rread(Rread),
    Twrite(Twrite),
    Rwrite(Rwrite),
    Tclunk(Tclunk),
    Rclunk(Rclunk),
    Tremove(Tremove),
    Rremove(Rremove),
    Tstat(Tstat),
    Rstat(Rstat),
    Twstat(Twstat),
    Rwstat(Rwstat),
}

impl<'a> From<&'a Fcall> for MsgType {
    fn from(fcall: &'a Fcall) -> MsgType {
        match *fcall {
            Fcall::Tversion(_) => MsgType::Tversion,
            Fcall::Rversion(_) => MsgType::Rversion,
            Fcall::Tauth(_) => MsgType::Tauth,
            Fcall::Rauth(_) => MsgType::Rauth,
            Fcall::Tattach(_) => MsgType::Tattach,
            Fcall::Rattach(_) => MsgType::Rattach,
            Fcall::Rerror(_) => MsgType::Rerror,
            Fcall::Tflush(_) => MsgType::Tflush,
            Fcall::Rflush(_) => MsgType::Rflush,
            Fcall::Twalk(_) => MsgType::Twalk,
            Fcall::Rwalk(_) => MsgType::Rwalk,
            Fcall::Topen(_) => MsgType::Topen,
            Fcall::Ropen(_) => MsgType::Ropen,
            Fcall::Tcreate(_) => MsgType::Tcreate,
            Fcall::Rcreate(_) => MsgType::Rcreate,
            Fcall::Tread(_) => MsgType::Tread,
            Fcall::Rread(_) => MsgType::Rread,
            Fcall::Twrite(_) => MsgType::Twrite,
            Fcall::Rwrite(_) => MsgType::Rwrite,
            Fcall::Tclunk(_) => MsgType::Tclunk,
            Fcall::Rclunk(_) => MsgType::Rclunk,
            Fcall::Tremove(_) => MsgType::Tremove,
            Fcall::Rremove(_) => MsgType::Rremove,
            Fcall::Tstat(_) => MsgType::Tstat,
            Fcall::Rstat(_) => MsgType::Rstat,
            Fcall::Twstat(_) => MsgType::Twstat,
            Fcall::Rwstat(_) => MsgType::Rwstat,
        }
    }
}

macro_rules! fcall_from {
    ($($name:ident),* $(,)?) => {
        $(
            impl From<$name> for Fcall {
                fn from(v: $name) -> Fcall {
                    Fcall::$name(v)
                }
            }
        )*
    };
}

fcall_from!(
    Tversion, Rversion, Tauth, Rauth, Tattach, Rattach, Rerror, Tflush, Rflush, Twalk, Rwalk,
    Topen, Ropen, Tcreate, Rcreate, Tread, Rread, Twrite, Rwrite, Tclunk, Rclunk, Tremove,
    Rremove, Tstat, Rstat, Twstat, Rwstat,
);

impl Fcall {
    pub fn msg_type(&self) -> MsgType {
        MsgType::from(self)
    }
}

/// A message together with the tag correlating it with its request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedFcall {
    pub tag: u16,
    pub fcall: Fcall,
}

impl TaggedFcall {
    pub fn new<F: Into<Fcall>>(tag: u16, fcall: F) -> TaggedFcall {
        TaggedFcall {
            tag,
            fcall: fcall.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_registry() {
        assert_eq!(MsgType::from_byte(100).unwrap(), MsgType::Tversion);
        assert_eq!(MsgType::from_byte(107).unwrap(), MsgType::Rerror);
        assert_eq!(MsgType::from_byte(127).unwrap(), MsgType::Rwstat);
        for typ in [0u8, 99, 106, 128, 255] {
            assert!(matches!(
                MsgType::from_byte(typ),
                Err(crate::Error::UnknownMessageKind(t)) if t == typ
            ));
        }
        let registered = (0..=255u8).filter(|t| MsgType::from_u8(*t).is_some()).count();
        assert_eq!(registered, 27);
    }

    #[test]
    fn requests_are_even() {
        assert!(MsgType::Twalk.is_request());
        assert!(!MsgType::Rwalk.is_request());
        assert!(!MsgType::Rerror.is_request());
    }

    #[test]
    fn dialect_versions() {
        assert_eq!(Dialect::from_version("9P2000"), Some(Dialect::Baseline));
        assert_eq!(Dialect::from_version("9P2000.u"), Some(Dialect::Unix));
        assert_eq!(Dialect::from_version("9P2000.L"), None);
        assert_eq!(Dialect::Unix.version(), P92000U);
        assert_eq!(Dialect::default(), Dialect::Baseline);
    }

    #[test]
    fn stat_size() {
        let mut st = Stat {
            name: "bin".into(),
            uid: "glenda".into(),
            ..Default::default()
        };
        assert_eq!(st.size(), 47 + 3 + 6);
        st.unix = Some(UnixStat {
            extension: "x".into(),
            ..Default::default()
        });
        assert_eq!(st.size(), 47 + 3 + 6 + 2 + 1 + 12);
    }

    #[test]
    fn dirmode_to_qidtype() {
        let mode = DirMode::DIR | DirMode::APPEND;
        assert_eq!(QidType::from(mode), QidType::DIR | QidType::APPEND);
    }

    #[test]
    fn rerror_to_io_error() {
        let err: std::io::Error = Rerror {
            ename: "file not found".into(),
            errno: Some(2),
        }
        .into();
        assert_eq!(err.raw_os_error(), Some(2));

        let err: std::io::Error = Rerror {
            ename: "file not found".into(),
            errno: None,
        }
        .into();
        assert_eq!(err.to_string(), "file not found");

        let local = std::io::Error::from_raw_os_error(13);
        assert_eq!(Rerror::from_io_error(&local, Dialect::Unix).errno, Some(13));
        assert_eq!(Rerror::from_io_error(&local, Dialect::Baseline).errno, None);
    }
}
