use super::error::PeerError;
use super::message::{Handshake, Message};
use crate::constants::{HANDSHAKE_LEN, MAX_MESSAGE_SIZE, PEER_WRITE_TIMEOUT, READ_BUFFER_SIZE};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Splits a connected stream into its framed halves.
pub fn split(stream: TcpStream) -> (PeerReader, PeerWriter) {
    let (read, write) = stream.into_split();
    (PeerReader::new(read), PeerWriter::new(write))
}

/// Receiving half of a peer connection.
///
/// Bytes read but not yet framed stay in `read_buf`, so dropping a pending
/// [`receive`](Self::receive) future (e.g. from a `select!`) loses nothing.
pub struct PeerReader {
    stream: OwnedReadHalf,
    read_buf: BytesMut,
}

impl PeerReader {
    pub fn new(stream: OwnedReadHalf) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
        }
    }

    async fn fill(&mut self, wanted: usize) -> Result<(), PeerError> {
        while self.read_buf.len() < wanted {
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(PeerError::ConnectionClosed);
            }
        }
        Ok(())
    }

    pub async fn receive_handshake(&mut self) -> Result<Handshake, PeerError> {
        self.fill(HANDSHAKE_LEN).await?;
        let data = self.read_buf.split_to(HANDSHAKE_LEN);
        Handshake::decode(&data)
    }

    /// Reads the next frame.
    ///
    /// A frame longer than [`MAX_MESSAGE_SIZE`] is fatal; a malformed body
    /// is reported as a recoverable [`PeerError::InvalidMessage`] with the
    /// frame already consumed.
    pub async fn receive(&mut self) -> Result<Message, PeerError> {
        self.fill(4).await?;

        let length = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(PeerError::MessageTooLarge(length));
        }

        self.fill(4 + length).await?;
        self.read_buf.advance(4);
        let body = self.read_buf.split_to(length).freeze();
        Message::decode(body)
    }
}

/// Sending half of a peer connection.
pub struct PeerWriter {
    stream: OwnedWriteHalf,
}

impl PeerWriter {
    pub fn new(stream: OwnedWriteHalf) -> Self {
        Self { stream }
    }

    pub async fn send_handshake(&mut self, handshake: &Handshake) -> Result<(), PeerError> {
        self.write(&handshake.encode()).await
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), PeerError> {
        self.write(&message.encode()).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), PeerError> {
        timeout(PEER_WRITE_TIMEOUT, self.stream.write_all(data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }
}
