//! Torrent fixtures shared by the unit tests.

use crate::bencode::{encode, Value};
use crate::metainfo::{InfoHash, Metainfo};
use crate::peer::{split, Handshake, Message, PeerId, PeerReader, PeerWriter};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;

pub const ANNOUNCE: &str = "http://tracker.test/announce";

/// Two compact peer records.
pub const PEERS: [u8; 12] = [
    192, 168, 1, 1, 0x1A, 0xE1, // 192.168.1.1:6881
    10, 0, 0, 1, 0x1A, 0xE2, // 10.0.0.1:6882
];

/// Deterministic payload bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

/// Concatenated SHA-1 digests of `data` split into `piece_length` pieces.
pub fn piece_hashes(data: &[u8], piece_length: usize) -> Vec<u8> {
    data.chunks(piece_length)
        .flat_map(|chunk| <[u8; 20]>::from(Sha1::digest(chunk)))
        .collect()
}

/// Encodes a torrent whose files, in order, hold `data`.
///
/// A single entry with no slash in its name produces a single-file torrent;
/// anything else produces a multi-file torrent rooted at `name`.
pub fn torrent_bytes(name: &str, files: &[(&str, u64)], piece_length: u64, data: &[u8]) -> Vec<u8> {
    let mut info = vec![
        ("name", Value::string(name)),
        ("piece length", Value::Integer(piece_length as i64)),
        (
            "pieces",
            Value::Bytes(Bytes::from(piece_hashes(data, piece_length as usize))),
        ),
    ];

    if files.len() == 1 && !files[0].0.contains('/') && files[0].0 == name {
        info.push(("length", Value::Integer(files[0].1 as i64)));
    } else {
        let list = files
            .iter()
            .map(|(path, length)| {
                Value::dict([
                    ("length", Value::Integer(*length as i64)),
                    (
                        "path",
                        Value::List(path.split('/').map(Value::string).collect()),
                    ),
                ])
            })
            .collect();
        info.push(("files", Value::List(list)));
    }

    let root = Value::dict([
        ("announce", Value::string(ANNOUNCE)),
        ("info", Value::dict(info)),
    ]);
    encode(&root).unwrap()
}

/// The two-file, two-piece torrent used by storage, allocator and session
/// tests: 16 KiB pieces over 12 KiB + 8 KiB files.
pub fn two_file_torrent() -> (Metainfo, Vec<u8>) {
    let data = payload(20 * 1024);
    let bytes = torrent_bytes(
        "pair",
        &[("a.bin", 12 * 1024), ("sub/b.bin", 8 * 1024)],
        16 * 1024,
        &data,
    );
    (Metainfo::from_bytes(&bytes).unwrap(), data)
}

/// Handshakes as a remote peer that accepted our connection.
pub async fn remote_handshake(stream: TcpStream, info_hash: InfoHash) -> (PeerReader, PeerWriter) {
    let (mut reader, mut writer) = split(stream);
    reader.receive_handshake().await.unwrap();
    writer
        .send_handshake(&Handshake::new(info_hash, PeerId::generate()))
        .await
        .unwrap();
    (reader, writer)
}

/// A seeder that has every piece and answers requests from `data`,
/// corrupting the first response to piece 0 when asked to.
pub async fn run_seeder(
    listener: TcpListener,
    info_hash: InfoHash,
    bits: &'static [u8],
    data: Vec<u8>,
    piece_length: usize,
    corrupt_first: bool,
) -> usize {
    let (stream, _) = listener.accept().await.unwrap();
    let (mut reader, mut writer) = remote_handshake(stream, info_hash).await;
    writer
        .send(&Message::Bitfield(Bytes::from_static(bits)))
        .await
        .unwrap();
    writer.send(&Message::Unchoke).await.unwrap();

    let mut requests = 0;
    loop {
        match reader.receive().await {
            Ok(Message::Request {
                index,
                begin,
                length,
            }) => {
                requests += 1;
                if corrupt_first && requests > 1 {
                    return requests;
                }
                let start = index as usize * piece_length + begin as usize;
                let mut block = data[start..start + length as usize].to_vec();
                if corrupt_first {
                    block[0] ^= 0xFF;
                }
                writer
                    .send(&Message::Piece {
                        index,
                        begin,
                        data: Bytes::from(block),
                    })
                    .await
                    .unwrap();
            }
            Ok(_) => {}
            Err(_) => return requests,
        }
    }
}

async fn serve_udp(
    socket: UdpSocket,
    peers: Vec<u8>,
    garble_first: bool,
    events: mpsc::UnboundedSender<(u32, i32)>,
) {
    let mut buf = [0u8; 1024];
    let mut garble = garble_first;
    loop {
        let Ok((n, from)) = socket.recv_from(&mut buf).await else {
            return;
        };
        let packet = &buf[..n];
        let action = u32::from_be_bytes(packet[8..12].try_into().unwrap());
        let mut tid: [u8; 4] = packet[12..16].try_into().unwrap();

        let mut reply = Vec::new();
        if n == 16 && action == 0 {
            assert_eq!(&packet[..8], &0x41727101980u64.to_be_bytes());
            if garble {
                garble = false;
                tid[0] ^= 0xFF;
            }
            reply.extend_from_slice(&0u32.to_be_bytes());
            reply.extend_from_slice(&tid);
            reply.extend_from_slice(&42u64.to_be_bytes());
        } else if n == 98 && action == 1 {
            assert_eq!(&packet[..8], &42u64.to_be_bytes());
            let event = u32::from_be_bytes(packet[80..84].try_into().unwrap());
            let numwant = i32::from_be_bytes(packet[92..96].try_into().unwrap());
            let _ = events.send((event, numwant));

            reply.extend_from_slice(&1u32.to_be_bytes());
            reply.extend_from_slice(&tid);
            reply.extend_from_slice(&1800u32.to_be_bytes());
            reply.extend_from_slice(&2u32.to_be_bytes());
            reply.extend_from_slice(&3u32.to_be_bytes());
            reply.extend_from_slice(&peers);
        } else {
            continue;
        }
        socket.send_to(&reply, from).await.unwrap();
    }
}

/// Starts a UDP tracker on loopback that answers every connect and
/// announce with `peers` and reports each announce's `(event, numwant)`.
/// When `garble_first` is set the first connect reply carries the wrong
/// transaction id.
pub async fn fake_udp_tracker(
    peers: Vec<u8>,
    garble_first: bool,
) -> (String, mpsc::UnboundedReceiver<(u32, i32)>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let url = format!("udp://{}/announce", socket.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(serve_udp(socket, peers, garble_first, tx));
    (url, rx)
}
