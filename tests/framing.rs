#![cfg(unix)]

use ninep_codec::*;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pair(config: Config) -> (Conn<UnixStream>, Conn<UnixStream>) {
    let (a, b) = UnixStream::pair().unwrap();
    (Conn::new(a, config), Conn::new(b, config))
}

#[test]
fn version_exchange_switches_dialect() {
    init_logging();
    let (mut client, mut server) = pair(Config::default());

    client
        .send(&TaggedFcall::new(
            NOTAG,
            Tversion {
                msize: 8192,
                version: P92000U.into(),
            },
        ))
        .unwrap();
    let msize = match server.recv().unwrap().fcall {
        Fcall::Tversion(Tversion { msize, version }) => {
            assert_eq!(version, P92000U);
            msize
        }
        fcall => panic!("unexpected {:?}", fcall),
    };
    let rversion = Rversion {
        msize,
        version: P92000U.into(),
    };
    server.send(&TaggedFcall::new(NOTAG, rversion.clone())).unwrap();
    server.reconfigure(Config::from_rversion(&rversion).unwrap());

    let rversion = match client.recv().unwrap().fcall {
        Fcall::Rversion(rversion) => rversion,
        fcall => panic!("unexpected {:?}", fcall),
    };
    client.reconfigure(Config::from_rversion(&rversion).unwrap());
    assert_eq!(client.framer().codec().dialect(), Dialect::Unix);
    assert_eq!(client.framer().max_message_size(), 8192);

    let attach = TaggedFcall::new(
        1,
        Tattach {
            fid: 0,
            afid: NOFID,
            uname: "glenda".into(),
            aname: "".into(),
            n_uname: Some(1000),
        },
    );
    client.send(&attach).unwrap();
    assert_eq!(server.recv().unwrap(), attach);

    let err = std::io::Error::from_raw_os_error(2);
    let reply = TaggedFcall::new(1, Rerror::from_io_error(&err, Dialect::Unix));
    server.send(&reply).unwrap();
    match client.recv().unwrap().fcall {
        Fcall::Rerror(rerror) => {
            assert_eq!(rerror.errno, Some(2));
            let err: std::io::Error = rerror.into();
            assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
        }
        fcall => panic!("unexpected {:?}", fcall),
    }
}

#[test]
fn bad_frame_closes_session() {
    init_logging();
    let (a, mut peer) = UnixStream::pair().unwrap();
    let mut conn = Conn::new(a, Config::default());

    peer.write_all(&[3, 0, 0, 0]).unwrap();
    assert!(matches!(
        conn.recv(),
        Err(Error::BadFrameSize { size: 3, .. })
    ));
    assert!(conn.is_closed());
    assert!(matches!(conn.recv(), Err(Error::ConnectionClosed)));
    assert!(matches!(
        conn.send(&TaggedFcall::new(1, Tclunk { fid: 1 })),
        Err(Error::ConnectionClosed)
    ));

    // The transport itself was shut down.
    let mut rest = Vec::new();
    peer.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}

#[test]
fn peer_gone_mid_frame() {
    init_logging();
    let (a, mut peer) = UnixStream::pair().unwrap();
    let mut conn = Conn::new(a, Config::default());

    peer.write_all(&[11, 0, 0, 0, 120, 7]).unwrap();
    drop(peer);
    assert!(matches!(conn.recv(), Err(Error::ConnectionClosed)));
    assert!(conn.is_closed());
}

#[test]
fn read_timeout_is_fatal() {
    init_logging();
    let (a, _peer) = UnixStream::pair().unwrap();
    let mut conn = Conn::new(a, Config::default());
    conn.set_read_timeout(Some(Duration::from_millis(20))).unwrap();

    match conn.recv() {
        Err(Error::Io(err)) => assert!(matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        )),
        r => panic!("unexpected {:?}", r),
    }
    assert!(conn.is_closed());
}

#[test]
fn pass_through_frames() {
    init_logging();
    let (mut proxy, mut server) = pair(Config::default());

    let encoded = Codec::new(Dialect::Baseline)
        .encode_to_vec(&TaggedFcall::new(3, Rwrite { count: 512 }))
        .unwrap();
    proxy.send_frame(encoded[0], 3, &encoded[3..]).unwrap();
    assert_eq!(
        server.recv().unwrap(),
        TaggedFcall::new(3, Rwrite { count: 512 })
    );

    assert!(matches!(
        proxy.send_frame(255, 4, &[]),
        Err(Error::UnknownMessageKind(255))
    ));
    assert!(proxy.is_closed());
}

fn walk(tag: u16, depth: usize) -> TaggedFcall {
    TaggedFcall::new(
        tag,
        Twalk {
            fid: tag as u32,
            newfid: tag as u32 + 1,
            wnames: (0..depth).map(|i| format!("d{}-{}", tag, i)).collect(),
        },
    )
}

#[test]
fn independent_sessions_run_concurrently() {
    init_logging();
    let handles: Vec<_> = (0..8u16)
        .map(|session| {
            thread::spawn(move || {
                let (mut client, mut server) = pair(Config::default());
                let echo = thread::spawn(move || {
                    for _ in 0..50 {
                        let msg = server.recv().unwrap();
                        server.send(&msg).unwrap();
                    }
                });
                for i in 0..50u16 {
                    let msg = walk(session * 100 + i, (i % 4) as usize);
                    client.send(&msg).unwrap();
                    assert_eq!(client.recv().unwrap(), msg);
                }
                echo.join().unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn shared_framer_serializes_callers() {
    init_logging();
    let framer = Arc::new(Framer::new(Config::default()));
    let handles: Vec<_> = (0..4u16)
        .map(|t| {
            let framer = framer.clone();
            thread::spawn(move || {
                let mut out = Vec::new();
                for i in 0..100u16 {
                    framer.send(&mut out, &walk(t * 1000 + i, 3)).unwrap();
                }
                out
            })
        })
        .collect();

    for (t, h) in handles.into_iter().enumerate() {
        let out = h.join().unwrap();
        let mut r: &[u8] = &out;
        for i in 0..100u16 {
            assert_eq!(framer.recv(&mut r).unwrap(), walk(t as u16 * 1000 + i, 3));
        }
        assert!(r.is_empty());
    }
}

#[test]
fn stream_of_frames_in_memory() {
    init_logging();
    let framer = Framer::new(Config::default().with_dialect(Dialect::Unix));
    let stat = Stat {
        name: "lib".into(),
        uid: "glenda".into(),
        gid: "sys".into(),
        mode: DirMode::DIR.bits() | 0o775,
        qid: Qid {
            typ: QidType::DIR,
            version: 0,
            path: 11,
        },
        unix: Some(UnixStat {
            extension: "".into(),
            n_uid: 1000,
            n_gid: 1000,
            n_muid: NONUNAME,
        }),
        ..Default::default()
    };
    let msgs = vec![
        TaggedFcall::new(1, Tstat { fid: 4 }),
        TaggedFcall::new(
            1,
            Rstat {
                stat: vec![stat.clone(), stat],
            },
        ),
        TaggedFcall::new(
            2,
            Twrite {
                fid: 4,
                offset: 0,
                data: b"hello".to_vec(),
            },
        ),
        TaggedFcall::new(2, Rwrite { count: 5 }),
    ];

    let mut cursor = std::io::Cursor::new(Vec::new());
    for msg in msgs.iter() {
        framer.send(&mut cursor, msg).unwrap();
    }
    cursor.set_position(0);
    for msg in msgs.iter() {
        assert_eq!(&framer.recv(&mut cursor).unwrap(), msg);
    }
    assert!(matches!(
        framer.recv(&mut cursor),
        Err(Error::ConnectionClosed)
    ));
}
