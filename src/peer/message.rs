use super::error::PeerError;
use super::peer_id::PeerId;
use crate::constants::{HANDSHAKE_LEN, PROTOCOL_STRING};
use crate::metainfo::InfoHash;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Message tags of the base protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            other => Err(other),
        }
    }
}

/// The 68-byte greeting both sides send first.
///
/// We advertise no extensions, so the reserved bytes are all zero; the
/// remote's reserved bytes are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
}

impl Handshake {
    pub fn new(info_hash: InfoHash, peer_id: PeerId) -> Self {
        Self { info_hash, peer_id }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL_STRING.len() as u8);
        buf.put_slice(PROTOCOL_STRING);
        buf.put_slice(&[0u8; 8]);
        buf.put_slice(self.info_hash.as_bytes());
        buf.put_slice(self.peer_id.as_bytes());
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        if data.len() < HANDSHAKE_LEN
            || data[0] as usize != PROTOCOL_STRING.len()
            || &data[1..20] != PROTOCOL_STRING
        {
            return Err(PeerError::InvalidHandshake);
        }

        let info_hash = InfoHash::from_bytes(&data[28..48]).ok_or(PeerError::InvalidHandshake)?;
        let peer_id = PeerId::from_bytes(&data[48..68]).ok_or(PeerError::InvalidHandshake)?;

        Ok(Self { info_hash, peer_id })
    }
}

/// A framed peer wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece: u32 },
    Bitfield(Bytes),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, data: Bytes },
    Cancel { index: u32, begin: u32, length: u32 },
    /// A tag outside the base protocol. Logged and dropped by the session.
    Unknown { id: u8, payload: Bytes },
}

impl Message {
    /// Encodes the message with its 4-byte length prefix.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            Message::KeepAlive => {
                buf.put_u32(0);
            }
            Message::Choke => put_bare(&mut buf, MessageId::Choke),
            Message::Unchoke => put_bare(&mut buf, MessageId::Unchoke),
            Message::Interested => put_bare(&mut buf, MessageId::Interested),
            Message::NotInterested => put_bare(&mut buf, MessageId::NotInterested),
            Message::Have { piece } => {
                buf.put_u32(5);
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(*piece);
            }
            Message::Bitfield(bits) => {
                buf.put_u32(1 + bits.len() as u32);
                buf.put_u8(MessageId::Bitfield as u8);
                buf.put_slice(bits);
            }
            Message::Request {
                index,
                begin,
                length,
            } => put_block(&mut buf, MessageId::Request, *index, *begin, *length),
            Message::Piece { index, begin, data } => {
                buf.put_u32(9 + data.len() as u32);
                buf.put_u8(MessageId::Piece as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(data);
            }
            Message::Cancel {
                index,
                begin,
                length,
            } => put_block(&mut buf, MessageId::Cancel, *index, *begin, *length),
            Message::Unknown { id, payload } => {
                buf.put_u32(1 + payload.len() as u32);
                buf.put_u8(*id);
                buf.put_slice(payload);
            }
        }

        buf.freeze()
    }

    /// Decodes a frame body (everything after the length prefix).
    ///
    /// An empty body is a keep-alive. Fixed-size messages must have exactly
    /// their declared size; anything else is [`PeerError::InvalidMessage`].
    pub fn decode(mut body: Bytes) -> Result<Self, PeerError> {
        if body.is_empty() {
            return Ok(Message::KeepAlive);
        }

        let tag = body.get_u8();
        let id = match MessageId::try_from(tag) {
            Ok(id) => id,
            Err(id) => return Ok(Message::Unknown { id, payload: body }),
        };

        match id {
            MessageId::Choke => expect_len(&body, 0, "choke").map(|_| Message::Choke),
            MessageId::Unchoke => expect_len(&body, 0, "unchoke").map(|_| Message::Unchoke),
            MessageId::Interested => expect_len(&body, 0, "interested").map(|_| Message::Interested),
            MessageId::NotInterested => {
                expect_len(&body, 0, "not interested").map(|_| Message::NotInterested)
            }
            MessageId::Have => {
                expect_len(&body, 4, "have")?;
                Ok(Message::Have {
                    piece: body.get_u32(),
                })
            }
            MessageId::Bitfield => Ok(Message::Bitfield(body)),
            MessageId::Request => {
                expect_len(&body, 12, "request")?;
                Ok(Message::Request {
                    index: body.get_u32(),
                    begin: body.get_u32(),
                    length: body.get_u32(),
                })
            }
            MessageId::Piece => {
                if body.remaining() < 8 {
                    return Err(PeerError::InvalidMessage("piece too short".into()));
                }
                let index = body.get_u32();
                let begin = body.get_u32();
                Ok(Message::Piece {
                    index,
                    begin,
                    data: body,
                })
            }
            MessageId::Cancel => {
                expect_len(&body, 12, "cancel")?;
                Ok(Message::Cancel {
                    index: body.get_u32(),
                    begin: body.get_u32(),
                    length: body.get_u32(),
                })
            }
        }
    }
}

fn expect_len(body: &Bytes, len: usize, name: &str) -> Result<(), PeerError> {
    if body.len() == len {
        Ok(())
    } else {
        Err(PeerError::InvalidMessage(format!(
            "{} payload is {} bytes, expected {}",
            name,
            body.len(),
            len
        )))
    }
}

fn put_bare(buf: &mut BytesMut, id: MessageId) {
    buf.put_u32(1);
    buf.put_u8(id as u8);
}

fn put_block(buf: &mut BytesMut, id: MessageId, index: u32, begin: u32, length: u32) {
    buf.put_u32(13);
    buf.put_u8(id as u8);
    buf.put_u32(index);
    buf.put_u32(begin);
    buf.put_u32(length);
}
