//! Per-message layouts for 9P2000 and 9P2000.u.
//!
//! A [`Codec`] is built for one [`Dialect`] and keeps no other state, so it
//! is freely shared. Framing lives in [`crate::transport`].

use crate::error::{Error, Result};
use crate::fcall::*;
use crate::wire::*;
use log::debug;

/// Encoder/decoder for message bodies (type, tag and payload).
#[derive(Copy, Clone, Debug, Default)]
pub struct Codec {
    dialect: Dialect,
}

impl Codec {
    pub fn new(dialect: Dialect) -> Codec {
        Codec { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append `type[1] tag[2] payload` for `msg` to `buf`.
    ///
    /// On error `buf` is left as it was.
    pub fn encode(&self, buf: &mut Vec<u8>, msg: &TaggedFcall) -> Result<()> {
        let start = buf.len();
        let result = self.encode_fcall(buf, msg);
        if result.is_err() {
            buf.truncate(start);
        }
        result
    }

    pub fn encode_to_vec(&self, msg: &TaggedFcall) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf, msg)?;
        Ok(buf)
    }

    /// Decode the payload of a message whose type and tag were already read.
    ///
    /// The payload must be consumed exactly.
    pub fn decode(&self, typ: u8, tag: u16, payload: &[u8]) -> Result<TaggedFcall> {
        let msg_type = MsgType::from_byte(typ)?;
        let mut d = Decoder::new(payload);
        let fcall = self.decode_fcall(msg_type, &mut d)?;
        d.finish(msg_type)?;
        Ok(TaggedFcall { tag, fcall })
    }

    /// Decode `type[1] tag[2] payload`, i.e. a frame without its size.
    pub fn decode_msg(&self, buf: &[u8]) -> Result<TaggedFcall> {
        let mut d = Decoder::new(buf);
        let typ = d.decode_u8("type")?;
        let tag = d.decode_u16("tag")?;
        let payload = d.decode_raw("payload", d.remaining())?;
        self.decode(typ, tag, payload)
    }

    /// Check that an optional 9P2000.u field is present exactly when the
    /// dialect calls for it.
    fn unix_field<'a, T>(&self, field: &'static str, v: &'a Option<T>) -> Result<Option<&'a T>> {
        match (self.dialect, v) {
            (Dialect::Unix, Some(v)) => Ok(Some(v)),
            (Dialect::Baseline, None) => Ok(None),
            (Dialect::Unix, None) => Err(Error::format(field, "required by 9P2000.u")),
            (Dialect::Baseline, Some(_)) => {
                Err(Error::format(field, "not representable in 9P2000"))
            }
        }
    }

    fn encode_qid(&self, buf: &mut Vec<u8>, v: &Qid) {
        encode_u8(buf, v.typ.bits());
        encode_u32(buf, v.version);
        encode_u64(buf, v.path);
    }

    fn encode_stat(&self, buf: &mut Vec<u8>, v: &Stat) -> Result<()> {
        let unix = self.unix_field("stat.unix", &v.unix)?;
        let size = v.size();
        check_range("stat.size", size as u64, u16::MAX as u64)?;
        encode_u16(buf, size as u16);
        encode_u16(buf, v.typ);
        encode_u32(buf, v.dev);
        self.encode_qid(buf, &v.qid);
        encode_u32(buf, v.mode);
        encode_u32(buf, v.atime);
        encode_u32(buf, v.mtime);
        encode_u64(buf, v.length);
        encode_str(buf, "stat.name", &v.name)?;
        encode_str(buf, "stat.uid", &v.uid)?;
        encode_str(buf, "stat.gid", &v.gid)?;
        encode_str(buf, "stat.muid", &v.muid)?;
        if let Some(unix) = unix {
            encode_str(buf, "stat.extension", &unix.extension)?;
            encode_u32(buf, unix.n_uid);
            encode_u32(buf, unix.n_gid);
            encode_u32(buf, unix.n_muid);
        }
        Ok(())
    }

    /// Stat records under their 2-byte envelope. The envelope counts every
    /// record byte including each record's own size field.
    fn encode_stats(&self, buf: &mut Vec<u8>, v: &[Stat]) -> Result<()> {
        let total: usize = v.iter().map(|st| 2 + st.size()).sum();
        check_range("stat", total as u64, u16::MAX as u64)?;
        encode_u16(buf, total as u16);
        for st in v.iter() {
            self.encode_stat(buf, st)?;
        }
        Ok(())
    }

    fn encode_fcall(&self, buf: &mut Vec<u8>, msg: &TaggedFcall) -> Result<()> {
        encode_u8(buf, MsgType::from(&msg.fcall) as u8);
        encode_u16(buf, msg.tag);
        match msg.fcall {
            Fcall::Tversion(ref v) => {
                encode_u32(buf, v.msize);
                encode_str(buf, "version", &v.version)?;
            }
            Fcall::Rversion(ref v) => {
                encode_u32(buf, v.msize);
                encode_str(buf, "version", &v.version)?;
            }
            Fcall::Tauth(ref v) => {
                let n_uname = self.unix_field("n_uname", &v.n_uname)?;
                encode_u32(buf, v.afid);
                encode_str(buf, "uname", &v.uname)?;
                encode_str(buf, "aname", &v.aname)?;
                if let Some(n_uname) = n_uname {
                    encode_u32(buf, *n_uname);
                }
            }
            Fcall::Rauth(ref v) => self.encode_qid(buf, &v.aqid),
            Fcall::Tattach(ref v) => {
                let n_uname = self.unix_field("n_uname", &v.n_uname)?;
                encode_u32(buf, v.fid);
                encode_u32(buf, v.afid);
                encode_str(buf, "uname", &v.uname)?;
                encode_str(buf, "aname", &v.aname)?;
                if let Some(n_uname) = n_uname {
                    encode_u32(buf, *n_uname);
                }
            }
            Fcall::Rattach(ref v) => self.encode_qid(buf, &v.qid),
            Fcall::Rerror(ref v) => {
                let errno = self.unix_field("errno", &v.errno)?;
                encode_str(buf, "ename", &v.ename)?;
                if let Some(errno) = errno {
                    encode_u32(buf, *errno);
                }
            }
            Fcall::Tflush(ref v) => encode_u16(buf, v.oldtag),
            Fcall::Twalk(ref v) => {
                encode_u32(buf, v.fid);
                encode_u32(buf, v.newfid);
                check_range("wnames", v.wnames.len() as u64, u16::MAX as u64)?;
                encode_u16(buf, v.wnames.len() as u16);
                for name in v.wnames.iter() {
                    encode_str(buf, "wname", name)?;
                }
            }
            Fcall::Rwalk(ref v) => {
                check_range("wqids", v.wqids.len() as u64, u16::MAX as u64)?;
                encode_u16(buf, v.wqids.len() as u16);
                for qid in v.wqids.iter() {
                    self.encode_qid(buf, qid);
                }
            }
            Fcall::Topen(ref v) => {
                encode_u32(buf, v.fid);
                encode_u8(buf, v.mode);
            }
            Fcall::Ropen(ref v) => {
                self.encode_qid(buf, &v.qid);
                encode_u32(buf, v.iounit);
            }
            Fcall::Tcreate(ref v) => {
                let extension = self.unix_field("extension", &v.extension)?;
                encode_u32(buf, v.fid);
                encode_str(buf, "name", &v.name)?;
                encode_u32(buf, v.perm);
                encode_u8(buf, v.mode);
                if let Some(extension) = extension {
                    encode_str(buf, "extension", extension)?;
                }
            }
            Fcall::Rcreate(ref v) => {
                self.encode_qid(buf, &v.qid);
                encode_u32(buf, v.iounit);
            }
            Fcall::Tread(ref v) => {
                encode_u32(buf, v.fid);
                encode_u64(buf, v.offset);
                encode_u32(buf, v.count);
            }
            Fcall::Rread(ref v) => encode_data(buf, "data", &v.data)?,
            Fcall::Twrite(ref v) => {
                encode_u32(buf, v.fid);
                encode_u64(buf, v.offset);
                // count is a sibling field; the data itself is not re-prefixed.
                check_range("count", v.data.len() as u64, u32::MAX as u64)?;
                encode_u32(buf, v.data.len() as u32);
                encode_raw(buf, &v.data);
            }
            Fcall::Rwrite(ref v) => encode_u32(buf, v.count),
            Fcall::Tclunk(ref v) => encode_u32(buf, v.fid),
            Fcall::Tremove(ref v) => encode_u32(buf, v.fid),
            Fcall::Tstat(ref v) => encode_u32(buf, v.fid),
            Fcall::Rstat(ref v) => self.encode_stats(buf, &v.stat)?,
            Fcall::Twstat(ref v) => {
                encode_u32(buf, v.fid);
                self.encode_stats(buf, &v.stat)?;
            }
            Fcall::Rflush(_) | Fcall::Rclunk(_) | Fcall::Rremove(_) | Fcall::Rwstat(_) => (),
        }
        Ok(())
    }

    fn decode_qid(&self, d: &mut Decoder<'_>) -> Result<Qid> {
        Ok(Qid {
            typ: QidType::from_bits_truncate(d.decode_u8("qid.type")?),
            version: d.decode_u32("qid.version")?,
            path: d.decode_u64("qid.path")?,
        })
    }

    /// The record's size field is read but not trusted; the fields
    /// themselves determine how much is consumed.
    fn decode_stat(&self, d: &mut Decoder<'_>) -> Result<Stat> {
        let size = d.decode_u16("stat.size")? as usize;
        let start = d.position();
        let mut st = Stat {
            typ: d.decode_u16("stat.type")?,
            dev: d.decode_u32("stat.dev")?,
            qid: self.decode_qid(d)?,
            mode: d.decode_u32("stat.mode")?,
            atime: d.decode_u32("stat.atime")?,
            mtime: d.decode_u32("stat.mtime")?,
            length: d.decode_u64("stat.length")?,
            name: d.decode_str("stat.name")?,
            uid: d.decode_str("stat.uid")?,
            gid: d.decode_str("stat.gid")?,
            muid: d.decode_str("stat.muid")?,
            unix: None,
        };
        if self.dialect.is_unix() {
            st.unix = Some(UnixStat {
                extension: d.decode_str("stat.extension")?,
                n_uid: d.decode_u32("stat.n_uid")?,
                n_gid: d.decode_u32("stat.n_gid")?,
                n_muid: d.decode_u32("stat.n_muid")?,
            });
        }
        let consumed = d.position() - start;
        if consumed != size {
            debug!(
                "stat record for {:?} declares {} bytes, decoded {}",
                st.name, size, consumed
            );
        }
        Ok(st)
    }

    /// Records are consumed until the payload is exhausted.
    fn decode_stats(&self, d: &mut Decoder<'_>) -> Result<Vec<Stat>> {
        let envelope = d.decode_u16("stat")? as usize;
        if envelope != d.remaining() {
            debug!(
                "stat envelope declares {} bytes, {} remain in payload",
                envelope,
                d.remaining()
            );
        }
        let mut stats = Vec::new();
        while !d.is_empty() {
            stats.push(self.decode_stat(d)?);
        }
        Ok(stats)
    }

    fn decode_n_uname(&self, d: &mut Decoder<'_>) -> Result<Option<u32>> {
        if self.dialect.is_unix() {
            Ok(Some(d.decode_u32("n_uname")?))
        } else {
            Ok(None)
        }
    }

    fn decode_fcall(&self, msg_type: MsgType, d: &mut Decoder<'_>) -> Result<Fcall> {
        let fcall = match msg_type {
            MsgType::Tversion => Fcall::Tversion(Tversion {
                msize: d.decode_u32("msize")?,
                version: d.decode_str("version")?,
            }),
            MsgType::Rversion => Fcall::Rversion(Rversion {
                msize: d.decode_u32("msize")?,
                version: d.decode_str("version")?,
            }),
            MsgType::Tauth => Fcall::Tauth(Tauth {
                afid: d.decode_u32("afid")?,
                uname: d.decode_str("uname")?,
                aname: d.decode_str("aname")?,
                n_uname: self.decode_n_uname(d)?,
            }),
            MsgType::Rauth => Fcall::Rauth(Rauth {
                aqid: self.decode_qid(d)?,
            }),
            MsgType::Tattach => Fcall::Tattach(Tattach {
                fid: d.decode_u32("fid")?,
                afid: d.decode_u32("afid")?,
                uname: d.decode_str("uname")?,
                aname: d.decode_str("aname")?,
                n_uname: self.decode_n_uname(d)?,
            }),
            MsgType::Rattach => Fcall::Rattach(Rattach {
                qid: self.decode_qid(d)?,
            }),
            MsgType::Rerror => Fcall::Rerror(Rerror {
                ename: d.decode_str("ename")?,
                errno: if self.dialect.is_unix() {
                    Some(d.decode_u32("errno")?)
                } else {
                    None
                },
            }),
            MsgType::Tflush => Fcall::Tflush(Tflush {
                oldtag: d.decode_u16("oldtag")?,
            }),
            MsgType::Rflush => Fcall::Rflush(Rflush {}),
            MsgType::Twalk => {
                let fid = d.decode_u32("fid")?;
                let newfid = d.decode_u32("newfid")?;
                let count = d.decode_u16("nwname")? as usize;
                let mut wnames = Vec::with_capacity(count.min(MAXWELEM));
                for _ in 0..count {
                    wnames.push(d.decode_str("wname")?);
                }
                Fcall::Twalk(Twalk {
                    fid,
                    newfid,
                    wnames,
                })
            }
            MsgType::Rwalk => {
                let count = d.decode_u16("nwqid")? as usize;
                let mut wqids = Vec::with_capacity(count.min(MAXWELEM));
                for _ in 0..count {
                    wqids.push(self.decode_qid(d)?);
                }
                Fcall::Rwalk(Rwalk { wqids })
            }
            MsgType::Topen => Fcall::Topen(Topen {
                fid: d.decode_u32("fid")?,
                mode: d.decode_u8("mode")?,
            }),
            MsgType::Ropen => Fcall::Ropen(Ropen {
                qid: self.decode_qid(d)?,
                iounit: d.decode_u32("iounit")?,
            }),
            MsgType::Tcreate => Fcall::Tcreate(Tcreate {
                fid: d.decode_u32("fid")?,
                name: d.decode_str("name")?,
                perm: d.decode_u32("perm")?,
                mode: d.decode_u8("mode")?,
                extension: if self.dialect.is_unix() {
                    Some(d.decode_str("extension")?)
                } else {
                    None
                },
            }),
            MsgType::Rcreate => Fcall::Rcreate(Rcreate {
                qid: self.decode_qid(d)?,
                iounit: d.decode_u32("iounit")?,
            }),
            MsgType::Tread => Fcall::Tread(Tread {
                fid: d.decode_u32("fid")?,
                offset: d.decode_u64("offset")?,
                count: d.decode_u32("count")?,
            }),
            MsgType::Rread => Fcall::Rread(Rread {
                data: d.decode_data("data")?.to_vec(),
            }),
            MsgType::Twrite => {
                let fid = d.decode_u32("fid")?;
                let offset = d.decode_u64("offset")?;
                let count = d.decode_u32("count")? as usize;
                let data = d.decode_raw("data", count)?.to_vec();
                Fcall::Twrite(Twrite { fid, offset, data })
            }
            MsgType::Rwrite => Fcall::Rwrite(Rwrite {
                count: d.decode_u32("count")?,
            }),
            MsgType::Tclunk => Fcall::Tclunk(Tclunk {
                fid: d.decode_u32("fid")?,
            }),
            MsgType::Rclunk => Fcall::Rclunk(Rclunk {}),
            MsgType::Tremove => Fcall::Tremove(Tremove {
                fid: d.decode_u32("fid")?,
            }),
            MsgType::Rremove => Fcall::Rremove(Rremove {}),
            MsgType::Tstat => Fcall::Tstat(Tstat {
                fid: d.decode_u32("fid")?,
            }),
            MsgType::Rstat => Fcall::Rstat(Rstat {
                stat: self.decode_stats(d)?,
            }),
            MsgType::Twstat => Fcall::Twstat(Twstat {
                fid: d.decode_u32("fid")?,
                stat: self.decode_stats(d)?,
            }),
            MsgType::Rwstat => Fcall::Rwstat(Rwstat {}),
        };
        Ok(fcall)
    }
}
