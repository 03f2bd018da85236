use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

use super::*;
use crate::allocator::{Allocator, Selection};
use crate::config::SwarmConfig;
use crate::metainfo::{InfoHash, Metainfo};
use crate::storage::TorrentStorage;
use crate::testutil::{remote_handshake, run_seeder, two_file_torrent};

#[test]
fn test_peer_id_generate() {
    let id1 = PeerId::generate();
    let id2 = PeerId::generate();
    assert_ne!(id1, id2);
    assert_eq!(id1.client_id(), Some("RS0001"));
    assert!(PeerId::from_bytes(&[0u8; 19]).is_none());
}

#[test]
fn test_bitfield() {
    let mut bf = Bitfield::new(10);
    assert!(bf.is_empty());
    assert!(bf.set(0));
    assert!(!bf.set(0));
    assert!(bf.set(9));
    assert!(!bf.set(10));

    assert_eq!(bf.as_bytes(), &[0b1000_0000, 0b0100_0000]);
    assert_eq!(bf.ones().collect::<Vec<_>>(), vec![0, 9]);
    assert_eq!(bf.count(), 2);
    assert!(!bf.is_complete());
    assert!(Bitfield::full(10).is_complete());
}

#[test]
fn test_bitfield_from_bytes() {
    let bf = Bitfield::from_bytes(&[0xFF, 0xFF], 10).unwrap();
    assert_eq!(bf.as_bytes(), &[0xFF, 0b1100_0000]);
    assert_eq!(bf.count(), 10);

    assert!(Bitfield::from_bytes(&[0xFF], 10).is_none());
    assert!(Bitfield::from_bytes(&[0xFF, 0xFF, 0xFF], 10).is_none());
}

#[test]
fn test_handshake_encode_decode() {
    let handshake = Handshake::new(InfoHash([7u8; 20]), PeerId::generate());
    let encoded = handshake.encode();

    assert_eq!(encoded.len(), 68);
    assert_eq!(encoded[0], 19);
    assert_eq!(&encoded[1..20], b"BitTorrent protocol");
    assert_eq!(&encoded[20..28], &[0u8; 8]);
    assert_eq!(Handshake::decode(&encoded).unwrap(), handshake);
}

#[test]
fn test_handshake_rejects_wrong_protocol() {
    let mut encoded = Handshake::new(InfoHash([7u8; 20]), PeerId::generate())
        .encode()
        .to_vec();
    encoded[5] = b'x';
    assert!(matches!(
        Handshake::decode(&encoded),
        Err(PeerError::InvalidHandshake)
    ));
}

#[test]
fn test_message_encoding() {
    assert_eq!(&Message::KeepAlive.encode()[..], &[0, 0, 0, 0]);
    assert_eq!(&Message::Interested.encode()[..], &[0, 0, 0, 1, 2]);
    assert_eq!(
        &Message::Have { piece: 258 }.encode()[..],
        &[0, 0, 0, 5, 4, 0, 0, 1, 2]
    );
    assert_eq!(
        &Message::Request {
            index: 1,
            begin: 16384,
            length: 16384
        }
        .encode()[..],
        &[0, 0, 0, 13, 6, 0, 0, 0, 1, 0, 0, 0x40, 0, 0, 0, 0x40, 0]
    );
}

#[test]
fn test_message_decode() {
    assert_eq!(Message::decode(Bytes::new()).unwrap(), Message::KeepAlive);
    assert_eq!(
        Message::decode(Bytes::from_static(&[1])).unwrap(),
        Message::Unchoke
    );
    assert_eq!(
        Message::decode(Bytes::from_static(&[7, 0, 0, 0, 3, 0, 0, 0, 0, 0xAA, 0xBB])).unwrap(),
        Message::Piece {
            index: 3,
            begin: 0,
            data: Bytes::from_static(&[0xAA, 0xBB]),
        }
    );
    assert_eq!(
        Message::decode(Bytes::from_static(&[20, 1, 2])).unwrap(),
        Message::Unknown {
            id: 20,
            payload: Bytes::from_static(&[1, 2]),
        }
    );
}

#[test]
fn test_message_decode_wrong_length() {
    let err = Message::decode(Bytes::from_static(&[4, 0, 0])).unwrap_err();
    assert!(err.is_recoverable());

    let err = Message::decode(Bytes::from_static(&[0, 1])).unwrap_err();
    assert!(matches!(err, PeerError::InvalidMessage(_)));

    let err = Message::decode(Bytes::from_static(&[7, 0, 0, 0])).unwrap_err();
    assert!(matches!(err, PeerError::InvalidMessage(_)));
}

struct Fixture {
    _temp: TempDir,
    allocator: Arc<Allocator>,
    data: Vec<u8>,
    shutdown: watch::Sender<bool>,
}

impl Fixture {
    async fn new() -> Self {
        let (meta, data) = two_file_torrent();
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(TorrentStorage::new(temp.path(), &meta.info).unwrap());
        storage.ensure_layout().await.unwrap();
        let allocator = Arc::new(Allocator::new(Arc::new(meta), storage));
        let (shutdown, _) = watch::channel(false);

        Self {
            _temp: temp,
            allocator,
            data,
            shutdown,
        }
    }

    fn metainfo(&self) -> &Metainfo {
        self.allocator.metainfo()
    }

    fn session(&self, addr: SocketAddr, config: SwarmConfig) -> PeerSession {
        PeerSession::new(
            addr,
            self.allocator.clone(),
            Arc::new(config),
            self.shutdown.subscribe(),
        )
    }

    fn piece(&self, index: u32) -> Bytes {
        let (start, end) = self.metainfo().info.piece_range(index);
        Bytes::copy_from_slice(&self.data[start as usize..end as usize])
    }
}

#[tokio::test]
async fn test_session_downloads_everything() {
    let fixture = Fixture::new().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let seeder = tokio::spawn(run_seeder(
        listener,
        fixture.metainfo().info_hash,
        &[0b1100_0000],
        fixture.data.clone(),
        16 * 1024,
        false,
    ));

    let outcome = fixture.session(addr, SwarmConfig::default()).connect().await;
    assert_eq!(outcome.addr, addr);
    assert_eq!(outcome.result.unwrap(), CloseReason::NoTarget);
    assert_eq!(outcome.saved_pieces, 2);
    assert_eq!(seeder.await.unwrap(), 2);

    let alloc = &fixture.allocator;
    assert_eq!(alloc.bytes_left(), 0);
    assert!(alloc.is_complete());
    assert_eq!(alloc.peer_count(), 0);

    let root = alloc.storage().base_path().join("pair");
    assert_eq!(
        std::fs::read(root.join("a.bin")).unwrap(),
        &fixture.data[..12 * 1024]
    );
    assert_eq!(
        std::fs::read(root.join("sub").join("b.bin")).unwrap(),
        &fixture.data[12 * 1024..]
    );
}

#[tokio::test]
async fn test_session_discards_bad_piece() {
    let fixture = Fixture::new().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let seeder = tokio::spawn(run_seeder(
        listener,
        fixture.metainfo().info_hash,
        &[0b1000_0000],
        fixture.data.clone(),
        16 * 1024,
        true,
    ));

    let outcome = fixture.session(addr, SwarmConfig::default()).connect().await;
    assert_eq!(outcome.saved_pieces, 0);
    assert!(matches!(outcome.result, Err(PeerError::ConnectionClosed)));

    // The corrupt piece was released and requested a second time.
    assert_eq!(seeder.await.unwrap(), 2);

    let alloc = &fixture.allocator;
    assert!(!alloc.is_verified(0));
    assert_eq!(alloc.bytes_left(), 20 * 1024);
    assert!(alloc.our_bitfield().is_none());

    let (peer, _rx) = alloc.register_peer();
    alloc.register_bitfield(peer, &[0b1000_0000]).unwrap();
    assert!(matches!(
        alloc.select_target(peer).unwrap(),
        Selection::Assigned(t) if t.index == 0
    ));
}

#[tokio::test]
async fn test_session_rejects_wrong_info_hash() {
    let fixture = Fixture::new().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _halves = remote_handshake(stream, InfoHash([0xEE; 20])).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let outcome = fixture.session(addr, SwarmConfig::default()).connect().await;
    assert!(matches!(outcome.result, Err(PeerError::InfoHashMismatch)));
    assert_eq!(fixture.allocator.peer_count(), 0);
}

#[tokio::test]
async fn test_session_bitfield_timeout() {
    let fixture = Fixture::new().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info_hash = fixture.metainfo().info_hash;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, _writer) = remote_handshake(stream, info_hash).await;
        while reader.receive().await.is_ok() {}
    });

    let mut config = SwarmConfig::default();
    config.bitfield_timeout = Duration::from_millis(100);

    let outcome = fixture.session(addr, config).connect().await;
    assert_eq!(outcome.result.unwrap(), CloseReason::BitfieldTimeout);
    assert_eq!(fixture.allocator.peer_count(), 0);
}

#[tokio::test]
async fn test_session_stops_on_shutdown() {
    let fixture = Fixture::new().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info_hash = fixture.metainfo().info_hash;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = remote_handshake(stream, info_hash).await;
        // Has nothing useful, so the session waits.
        writer
            .send(&Message::Bitfield(Bytes::from_static(&[0])))
            .await
            .unwrap();
        while reader.receive().await.is_ok() {}
    });

    let session = tokio::spawn(fixture.session(addr, SwarmConfig::default()).connect());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fixture.allocator.peer_count(), 1);

    fixture.shutdown.send_replace(true);
    let outcome = session.await.unwrap();
    assert_eq!(outcome.result.unwrap(), CloseReason::Cancelled);
    assert_eq!(fixture.allocator.peer_count(), 0);
}

#[tokio::test]
async fn test_keepalive_only_after_quiet_period() {
    let fixture = Fixture::new().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = SwarmConfig::default();
    config.keepalive_interval = Duration::from_millis(300);
    let session = tokio::spawn(fixture.session(addr, config).connect());

    let (stream, _) = listener.accept().await.unwrap();
    let (mut reader, mut writer) = remote_handshake(stream, fixture.metainfo().info_hash).await;
    assert_eq!(reader.receive().await.unwrap(), Message::Unchoke);
    assert_eq!(reader.receive().await.unwrap(), Message::Interested);
    writer
        .send(&Message::Bitfield(Bytes::from_static(&[0])))
        .await
        .unwrap();

    // Steady traffic from us keeps the session from sending keep-alives.
    for _ in 0..6 {
        writer.send(&Message::KeepAlive).await.unwrap();
        assert!(timeout(Duration::from_millis(100), reader.receive())
            .await
            .is_err());
    }

    // Once we go quiet, one arrives.
    let next = timeout(Duration::from_secs(2), reader.receive()).await.unwrap();
    assert_eq!(next.unwrap(), Message::KeepAlive);
    assert_eq!(reader.receive().await.unwrap(), Message::Interested);

    fixture.shutdown.send_replace(true);
    let outcome = session.await.unwrap();
    assert_eq!(outcome.result.unwrap(), CloseReason::Cancelled);
}

#[tokio::test]
async fn test_session_gives_up_stalled_piece() {
    let fixture = Fixture::new().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info_hash = fixture.metainfo().info_hash;

    // Advertises piece 0, then chokes us forever while staying chatty.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (_reader, mut writer) = remote_handshake(stream, info_hash).await;
        writer
            .send(&Message::Bitfield(Bytes::from_static(&[0b1000_0000])))
            .await
            .unwrap();
        while writer.send(&Message::KeepAlive).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    let mut config = SwarmConfig::default();
    config.request_timeout = Duration::from_millis(200);

    let outcome = timeout(Duration::from_secs(5), fixture.session(addr, config).connect())
        .await
        .unwrap();
    assert_eq!(outcome.result.unwrap(), CloseReason::Stalled);

    let alloc = &fixture.allocator;
    assert_eq!(alloc.peer_count(), 0);
    let (peer, _rx) = alloc.register_peer();
    alloc.register_bitfield(peer, &[0b1000_0000]).unwrap();
    assert!(matches!(
        alloc.select_target(peer).unwrap(),
        Selection::Assigned(t) if t.index == 0
    ));
}

#[tokio::test]
async fn test_inbound_session_serves_verified_piece() {
    let fixture = Fixture::new().await;
    let alloc = &fixture.allocator;

    let (local, _rx) = alloc.register_peer();
    alloc.register_bitfield(local, &[0b1000_0000]).unwrap();
    alloc.select_target(local).unwrap();
    assert!(alloc.save_piece(0, fixture.piece(0), local).await.unwrap());
    alloc.remove_peer(local);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info_hash = fixture.metainfo().info_hash;

    let client = tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut reader, mut writer) = split(stream);
        writer
            .send_handshake(&Handshake::new(info_hash, PeerId::generate()))
            .await
            .unwrap();
        let theirs = reader.receive_handshake().await.unwrap();
        assert_eq!(theirs.info_hash, info_hash);

        assert_eq!(
            reader.receive().await.unwrap(),
            Message::Bitfield(Bytes::from_static(&[0b1000_0000]))
        );
        assert_eq!(reader.receive().await.unwrap(), Message::Unchoke);
        assert_eq!(reader.receive().await.unwrap(), Message::Interested);

        writer
            .send(&Message::Bitfield(Bytes::from_static(&[0])))
            .await
            .unwrap();
        // Oversized requests are ignored; the next one is answered.
        writer
            .send(&Message::Request {
                index: 0,
                begin: 0,
                length: 1 << 20,
            })
            .await
            .unwrap();
        writer
            .send(&Message::Request {
                index: 0,
                begin: 1024,
                length: 4096,
            })
            .await
            .unwrap();
        reader.receive().await.unwrap()
    });

    let (stream, remote) = listener.accept().await.unwrap();
    let session = tokio::spawn(fixture.session(remote, SwarmConfig::default()).accept(stream));

    let reply = client.await.unwrap();
    assert_eq!(
        reply,
        Message::Piece {
            index: 0,
            begin: 1024,
            data: fixture.piece(0).slice(1024..5120),
        }
    );

    let outcome = session.await.unwrap();
    assert!(matches!(outcome.result, Err(PeerError::ConnectionClosed)));
    assert_eq!(alloc.bytes_uploaded(), 4096);
}
