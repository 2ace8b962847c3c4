//! `/echo/1.0.0`: the responder echoes one newline-terminated line back and
//! closes; the initiator sends a line and reads until end of stream.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::handler::{HostIdentity, ProtocolHandler};
use crate::stream::{Stream, StreamError};

/// Default cap on a single echoed line.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Echo errors.
#[derive(Debug, Error)]
pub enum EchoError {
    /// Stream ended before a line terminator arrived
    #[error("Stream ended before line terminator")]
    IncompleteMessage,

    /// No terminator within the size limit
    #[error("Message exceeds {limit} bytes")]
    MessageTooLarge {
        /// Configured limit
        limit: usize,
    },

    /// Underlying stream failure
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Echo configuration.
#[derive(Debug, Clone)]
pub struct EchoConfig {
    /// Largest line, terminator included, the responder accepts. Also bounds
    /// the reply the initiator accepts.
    pub max_message_size: usize,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Responder side of the echo protocol.
#[derive(Debug, Clone, Default)]
pub struct EchoHandler {
    config: EchoConfig,
}

impl EchoHandler {
    /// Creates a handler with `config`.
    pub fn new(config: EchoConfig) -> Self {
        Self { config }
    }

    async fn echo_line(&self, stream: &mut Stream) -> Result<usize, EchoError> {
        let line = read_line(stream, self.config.max_message_size).await?;
        stream.write_all(&line).await?;
        Ok(line.len())
    }
}

#[async_trait]
impl ProtocolHandler for EchoHandler {
    async fn handle(&self, mut stream: Stream, _host: Arc<HostIdentity>) {
        let peer = stream.remote_node_id();
        let echoed = self.echo_line(&mut stream).await;
        match echoed {
            Ok(len) => {
                if let Err(e) = stream.close().await {
                    warn!(peer = %peer, error = %e, "Echo close failed");
                    return;
                }
                debug!(peer = %peer, bytes = len, "Echoed line");
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "Echo failed, resetting stream");
                stream.reset();
            }
        }
    }
}

/// Reads up to and including the first `\n`. Bytes after it are ignored.
async fn read_line(stream: &mut Stream, limit: usize) -> Result<Vec<u8>, EchoError> {
    let mut line = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(EchoError::IncompleteMessage);
        }
        let data = &chunk[..n];
        let (take, done) = match data.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (n, false),
        };
        if line.len() + take > limit {
            return Err(EchoError::MessageTooLarge { limit });
        }
        line.extend_from_slice(&data[..take]);
        if done {
            return Ok(line);
        }
    }
}

/// Runs the initiator side: writes `message`, half-closes, and returns every
/// byte the responder sent before ending the stream. An empty reply is valid.
pub async fn initiate(stream: Stream, message: &[u8]) -> Result<Vec<u8>, EchoError> {
    initiate_with(stream, message, &EchoConfig::default()).await
}

/// [`initiate`] with an explicit reply size limit.
pub async fn initiate_with(
    mut stream: Stream,
    message: &[u8],
    config: &EchoConfig,
) -> Result<Vec<u8>, EchoError> {
    let exchange = async {
        stream.write_all(message).await?;
        stream.close_write()?;
        stream.read_to_end(config.max_message_size).await
    };
    let result = exchange.await;
    match result {
        Ok(reply) => {
            stream.close().await?;
            Ok(reply)
        }
        Err(StreamError::FrameTooLarge(_)) => {
            stream.reset();
            Err(EchoError::MessageTooLarge {
                limit: config.max_message_size,
            })
        }
        Err(e) => {
            stream.reset();
            Err(e.into())
        }
    }
}
