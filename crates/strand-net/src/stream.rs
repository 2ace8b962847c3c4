//! Protocol streams.
//!
//! A [`Stream`] is one QUIC bidirectional stream after its security upgrade
//! and protocol negotiation. It is bound to a single
//! `(local node, remote node, protocol)` triple and ends with exactly one
//! terminal action: [`Stream::close`] or [`Stream::reset`]. Dropping a
//! stream that was neither closed nor reset resets it.
//!
//! With Noise security every write is split into messages of at most
//! [`MAX_PLAINTEXT_SIZE`] bytes, each sent as `u16 BE length || ciphertext`.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use quinn::{ReadError, RecvStream, SendStream, VarInt, WriteError};
use snow::TransportState;
use strand_core::encoding::peek_uvarint;
use strand_core::NodeId;
use strand_proto::negotiation::{decode_message, NegotiationError};
use strand_proto::ProtocolId;
use thiserror::Error;

use crate::noise::{self, MAX_MESSAGE_SIZE, MAX_PLAINTEXT_SIZE};

/// Application error code sent with a stream reset.
pub const RESET_CODE: u32 = 1;

const READ_CHUNK: usize = 16 * 1024;

/// Stream errors. These never affect other streams.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The remote end reset or stopped the stream
    #[error("Stream reset by peer")]
    Reset,

    /// Transport failure
    #[error("IO error: {0}")]
    Io(String),

    /// Decryption or encryption failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] noise::NoiseError),

    /// Malformed negotiation traffic
    #[error("Negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Peer announced a frame beyond the size limit
    #[error("Frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    /// The local write side was already finished
    #[error("Stream already closed")]
    Closed,
}

impl From<ReadError> for StreamError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Reset(_) => StreamError::Reset,
            ReadError::ClosedStream => StreamError::Closed,
            other => StreamError::Io(other.to_string()),
        }
    }
}

impl From<WriteError> for StreamError {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::Stopped(_) => StreamError::Reset,
            WriteError::ClosedStream => StreamError::Closed,
            other => StreamError::Io(other.to_string()),
        }
    }
}

/// Byte channel over one QUIC stream, optionally Noise-encrypted.
pub(crate) struct Channel {
    send: SendStream,
    recv: RecvStream,
    cipher: Option<Box<TransportState>>,
    /// Bytes received from the wire, not yet decrypted or consumed
    raw_buf: BytesMut,
    /// Plaintext ready for the reader
    read_buf: BytesMut,
    write_finished: bool,
    terminated: bool,
}

impl Channel {
    pub(crate) fn new(send: SendStream, recv: RecvStream) -> Self {
        Self {
            send,
            recv,
            cipher: None,
            raw_buf: BytesMut::new(),
            read_buf: BytesMut::new(),
            write_finished: false,
            terminated: false,
        }
    }

    /// Switches the channel to Noise transport messages.
    pub(crate) fn install_cipher(&mut self, cipher: TransportState) {
        self.return_unread();
        self.cipher = Some(Box::new(cipher));
    }

    /// Before encryption starts, moves unread bytes back in front of the
    /// raw buffer so they can be parsed as frames.
    fn return_unread(&mut self) {
        if self.cipher.is_none() && !self.read_buf.is_empty() {
            let mut rest = self.read_buf.split();
            rest.unsplit(self.raw_buf.split());
            self.raw_buf = rest;
        }
    }

    async fn fill_raw(&mut self) -> Result<bool, StreamError> {
        match self.recv.read_chunk(READ_CHUNK, true).await? {
            Some(chunk) => {
                self.raw_buf.extend_from_slice(&chunk.bytes);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reads exactly `n` raw bytes; `None` on a clean end of stream.
    async fn read_raw_exact(&mut self, n: usize) -> Result<Option<Bytes>, StreamError> {
        while self.raw_buf.len() < n {
            if !self.fill_raw().await? {
                if self.raw_buf.is_empty() {
                    return Ok(None);
                }
                return Err(StreamError::Io("stream ended mid-frame".to_string()));
            }
        }
        Ok(Some(self.raw_buf.split_to(n).freeze()))
    }

    /// Pulls more plaintext into `read_buf`; false on end of stream.
    async fn fill(&mut self) -> Result<bool, StreamError> {
        if self.cipher.is_none() {
            if self.raw_buf.is_empty() && !self.fill_raw().await? {
                return Ok(false);
            }
            self.read_buf.unsplit(self.raw_buf.split());
            return Ok(true);
        }

        let Some(ciphertext) = self.read_frame().await? else {
            return Ok(false);
        };
        let cipher = self.cipher.as_mut().ok_or(StreamError::Closed)?;
        let plaintext = noise::decrypt(cipher, &ciphertext)?;
        self.read_buf.put_slice(&plaintext);
        Ok(true)
    }

    /// Writes one `u16 BE length || body` frame without encryption.
    pub(crate) async fn write_frame(&mut self, body: &[u8]) -> Result<(), StreamError> {
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(StreamError::FrameTooLarge(body.len()));
        }
        let mut buf = BytesMut::with_capacity(2 + body.len());
        buf.put_u16(body.len() as u16);
        buf.put_slice(body);
        self.send.write_all(&buf).await?;
        Ok(())
    }

    /// Reads one `u16 BE length || body` frame; `None` on end of stream.
    pub(crate) async fn read_frame(&mut self) -> Result<Option<Bytes>, StreamError> {
        self.return_unread();
        let Some(mut len) = self.read_raw_exact(2).await? else {
            return Ok(None);
        };
        let len = len.get_u16() as usize;
        match self.read_raw_exact(len).await? {
            Some(body) => Ok(Some(body)),
            None => Err(StreamError::Io("stream ended mid-frame".to_string())),
        }
    }

    pub(crate) async fn write_all(&mut self, data: &[u8]) -> Result<(), StreamError> {
        if self.write_finished {
            return Err(StreamError::Closed);
        }
        let Some(cipher) = self.cipher.as_mut() else {
            self.send.write_all(data).await?;
            return Ok(());
        };
        let mut buf = BytesMut::new();
        for chunk in data.chunks(MAX_PLAINTEXT_SIZE) {
            let ciphertext = noise::encrypt(cipher, chunk)?;
            buf.put_u16(ciphertext.len() as u16);
            buf.put_slice(&ciphertext);
        }
        self.send.write_all(&buf).await?;
        Ok(())
    }

    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.read_buf.is_empty() {
            if !self.fill().await? {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.read_buf.len());
        self.read_buf.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }

    /// Reads one negotiation message.
    pub(crate) async fn read_message(&mut self) -> Result<String, StreamError> {
        loop {
            if let Some(message) = decode_message(&mut self.read_buf)? {
                return Ok(message);
            }
            if !self.fill().await? {
                return Err(StreamError::Io("stream ended during negotiation".to_string()));
            }
        }
    }

    /// Reads one uvarint length-prefixed field of at most `limit` bytes.
    pub(crate) async fn read_length_prefixed(&mut self, limit: usize) -> Result<Bytes, StreamError> {
        loop {
            if let Some((len, used)) = peek_uvarint(&self.read_buf).map_err(NegotiationError::from)? {
                let len = len as usize;
                if len > limit {
                    return Err(StreamError::FrameTooLarge(len));
                }
                if self.read_buf.len() >= used + len {
                    self.read_buf.advance(used);
                    return Ok(self.read_buf.split_to(len).freeze());
                }
            }
            if !self.fill().await? {
                return Err(StreamError::Io("stream ended mid-field".to_string()));
            }
        }
    }

    pub(crate) fn finish(&mut self) -> Result<(), StreamError> {
        if self.write_finished {
            return Ok(());
        }
        self.send.finish().map_err(|_| StreamError::Closed)?;
        self.write_finished = true;
        Ok(())
    }

    /// Finishes the write side and waits for the peer to acknowledge it.
    /// On failure the channel stays unterminated, so dropping it resets.
    pub(crate) async fn close(&mut self) -> Result<(), StreamError> {
        self.finish()?;
        self.send
            .stopped()
            .await
            .map_err(|e| StreamError::Io(e.to_string()))?;
        self.terminated = true;
        Ok(())
    }

    pub(crate) fn reset(&mut self) {
        self.terminated = true;
        let code = VarInt::from_u32(RESET_CODE);
        let _ = self.send.reset(code);
        let _ = self.recv.stop(code);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if !self.terminated {
            self.reset();
        }
    }
}

/// An upgraded, protocol-tagged stream to a remote node.
pub struct Stream {
    channel: Channel,
    local: NodeId,
    remote: NodeId,
    protocol: ProtocolId,
}

impl Stream {
    pub(crate) fn new(channel: Channel, local: NodeId, remote: NodeId, protocol: ProtocolId) -> Self {
        Self {
            channel,
            local,
            remote,
            protocol,
        }
    }

    /// Returns the local node id.
    pub fn local_node_id(&self) -> NodeId {
        self.local
    }

    /// Returns the remote node id.
    pub fn remote_node_id(&self) -> NodeId {
        self.remote
    }

    /// Returns the negotiated protocol.
    pub fn protocol(&self) -> &ProtocolId {
        &self.protocol
    }

    /// Returns true if the stream is Noise-encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.channel.cipher.is_some()
    }

    /// Writes all of `data`.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.channel.write_all(data).await
    }

    /// Reads into `buf`, returning 0 at end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        self.channel.read(buf).await
    }

    /// Fills `buf` completely, or fails with `Io` if the stream ends first.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), StreamError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.channel.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(StreamError::Io(format!(
                    "stream ended after {} of {} bytes",
                    filled,
                    buf.len()
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Reads until end of stream, failing if more than `limit` bytes arrive.
    pub async fn read_to_end(&mut self, limit: usize) -> Result<Vec<u8>, StreamError> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = self.channel.read(&mut chunk).await?;
            if n == 0 {
                return Ok(out);
            }
            if out.len() + n > limit {
                return Err(StreamError::FrameTooLarge(out.len() + n));
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    /// Finishes the write side; the peer reads end of stream.
    pub fn close_write(&mut self) -> Result<(), StreamError> {
        self.channel.finish()
    }

    /// Closes gracefully, waiting until the peer has received everything.
    pub async fn close(mut self) -> Result<(), StreamError> {
        self.channel.close().await
    }

    /// Aborts both directions.
    pub fn reset(mut self) {
        self.channel.reset();
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("protocol", &self.protocol)
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quic::{bind_endpoint, SERVER_NAME};
    use crate::transport::HostConfig;
    use quinn::{Connection, Endpoint};

    struct Pair {
        _endpoints: (Endpoint, Endpoint),
        dialer: (Connection, Channel),
        acceptor: (Connection, Channel),
    }

    async fn pair() -> Pair {
        let a = bind_endpoint(&HostConfig::local()).unwrap();
        let b = bind_endpoint(&HostConfig::local()).unwrap();
        let b_addr = b.local_addr().unwrap();

        let acceptor = b.clone();
        let accepted = tokio::spawn(async move {
            let conn = acceptor.accept().await.unwrap().await.unwrap();
            let (send, recv) = conn.accept_bi().await.unwrap();
            (conn, Channel::new(send, recv))
        });

        let conn = a.connect(b_addr, SERVER_NAME).unwrap().await.unwrap();
        let (send, recv) = conn.open_bi().await.unwrap();
        let mut channel = Channel::new(send, recv);
        // The peer only sees the stream once data arrives.
        channel.write_all(b"hi").await.unwrap();

        Pair {
            _endpoints: (a, b),
            dialer: (conn, channel),
            acceptor: accepted.await.unwrap(),
        }
    }

    #[tokio::test]
    async fn test_close_terminates_after_ack() {
        let Pair {
            _endpoints,
            dialer: (_local_conn, mut local),
            acceptor: (_remote_conn, mut remote),
        } = pair().await;

        let mut buf = [0u8; 8];
        let n = remote.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hi");

        let (closed, eof) = tokio::join!(local.close(), remote.read(&mut buf));
        closed.unwrap();
        assert_eq!(eof.unwrap(), 0);
        assert!(local.terminated);
    }

    #[tokio::test]
    async fn test_failed_close_leaves_reset_to_drop() {
        let pair = pair().await;
        let (remote_conn, _remote) = pair.acceptor;
        let (local_conn, mut local) = pair.dialer;

        remote_conn.close(VarInt::from_u32(0), b"gone");
        local_conn.closed().await;

        assert!(local.close().await.is_err());
        assert!(!local.terminated);
        drop(local);
    }
}
