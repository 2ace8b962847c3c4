//! Stream negotiation messages.
//!
//! Each QUIC stream is upgraded in two negotiation rounds (security, then
//! application protocol). A round is a multistream-select exchange:
//!
//! ```text
//! initiator -> /multistream/1.0.0, <protocol>
//! responder -> /multistream/1.0.0, <protocol> | na
//! ```
//!
//! Every message is framed as `uvarint(len) || utf8 || '\n'`, where `len`
//! counts the trailing newline and never exceeds [`MAX_MESSAGE_LEN`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use strand_core::encoding::{peek_uvarint, put_uvarint, DecodeError};
use thiserror::Error;

/// Header opening every negotiation round.
pub const MULTISTREAM_HEADER: &str = "/multistream/1.0.0";

/// Answer for a protocol the responder does not speak.
pub const NOT_AVAILABLE: &str = "na";

/// Security protocol for Noise-encrypted streams.
pub const NOISE_PROTOCOL: &str = "/noise";

/// Security protocol for unencrypted streams.
pub const PLAINTEXT_PROTOCOL: &str = "/plaintext/2.0.0";

/// Largest framed message, newline included.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Negotiation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Length prefix could not be decoded
    #[error("Invalid length prefix: {0}")]
    Decode(#[from] DecodeError),

    /// Message exceeds the size limit
    #[error("Message length {0} exceeds {MAX_MESSAGE_LEN}")]
    TooLong(usize),

    /// Message does not end with a newline
    #[error("Message is not newline terminated")]
    MissingNewline,

    /// Message is not UTF-8
    #[error("Message is not valid UTF-8")]
    InvalidUtf8,

    /// Message body itself contains a newline
    #[error("Message contains an embedded newline")]
    EmbeddedNewline,

    /// Peer sent something other than what the round requires
    #[error("Expected {expected:?}, got {got:?}")]
    Unexpected {
        /// What the protocol required
        expected: String,
        /// What arrived
        got: String,
    },
}

/// Outcome of a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Responder echoed the proposed protocol
    Accepted,
    /// Responder answered `na`
    NotAvailable,
}

/// Appends one framed message.
pub fn encode_message(buf: &mut BytesMut, message: &str) -> Result<(), NegotiationError> {
    if message.contains('\n') {
        return Err(NegotiationError::EmbeddedNewline);
    }
    let len = message.len() + 1;
    if len > MAX_MESSAGE_LEN {
        return Err(NegotiationError::TooLong(len));
    }
    put_uvarint(buf, len as u64);
    buf.put_slice(message.as_bytes());
    buf.put_u8(b'\n');
    Ok(())
}

/// Frames the header followed by `protocol`, as sent by an initiator.
pub fn encode_proposal(protocol: &str) -> Result<Bytes, NegotiationError> {
    let mut buf = BytesMut::new();
    encode_message(&mut buf, MULTISTREAM_HEADER)?;
    encode_message(&mut buf, protocol)?;
    Ok(buf.freeze())
}

/// Frames the responder's reply to a proposal.
pub fn encode_reply(protocol: &str, accept: bool) -> Result<Bytes, NegotiationError> {
    let mut buf = BytesMut::new();
    encode_message(&mut buf, MULTISTREAM_HEADER)?;
    encode_message(&mut buf, if accept { protocol } else { NOT_AVAILABLE })?;
    Ok(buf.freeze())
}

/// Decodes one message from the front of `buf`.
///
/// Returns `Ok(None)` and leaves `buf` untouched if the message is incomplete.
pub fn decode_message(buf: &mut BytesMut) -> Result<Option<String>, NegotiationError> {
    let Some((len, prefix)) = peek_uvarint(&buf[..])? else {
        return Ok(None);
    };
    let len = len as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(NegotiationError::TooLong(len));
    }
    if buf.len() < prefix + len {
        return Ok(None);
    }
    buf.advance(prefix);
    let frame = buf.split_to(len);
    let Some((&b'\n', body)) = frame.split_last() else {
        return Err(NegotiationError::MissingNewline);
    };
    let text = std::str::from_utf8(body).map_err(|_| NegotiationError::InvalidUtf8)?;
    if text.contains('\n') {
        return Err(NegotiationError::EmbeddedNewline);
    }
    Ok(Some(text.to_string()))
}

/// Checks that `message` is the multistream header.
pub fn expect_header(message: &str) -> Result<(), NegotiationError> {
    if message != MULTISTREAM_HEADER {
        return Err(NegotiationError::Unexpected {
            expected: MULTISTREAM_HEADER.to_string(),
            got: message.to_string(),
        });
    }
    Ok(())
}

/// Interprets the responder's answer to `proposed`.
pub fn classify_answer(proposed: &str, answer: &str) -> Result<Answer, NegotiationError> {
    if answer == proposed {
        Ok(Answer::Accepted)
    } else if answer == NOT_AVAILABLE {
        Ok(Answer::NotAvailable)
    } else {
        Err(NegotiationError::Unexpected {
            expected: proposed.to_string(),
            got: answer.to_string(),
        })
    }
}
