//! Framed message streams over the halves of a TCP connection.

use bincode::{Decode, Encode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::ProtocolError;
use crate::wire::{decode_frame, encode_frame, MAX_MESSAGE_SIZE};

/// Split a connected stream into a framed sender/receiver pair.
#[must_use]
pub fn split(stream: TcpStream) -> (MessageSender, MessageReceiver) {
    let (read, write) = stream.into_split();
    (MessageSender { stream: write }, MessageReceiver { stream: read })
}

/// Sends length-prefixed bincode messages over the write half.
pub struct MessageSender {
    stream: OwnedWriteHalf,
}

impl MessageSender {
    /// Send one message as a single frame.
    pub async fn send<T: Encode>(&mut self, msg: &T) -> Result<(), ProtocolError> {
        let frame = encode_frame(msg)?;
        self.stream.write_all(&frame).await?;
        trace!(len = frame.len() - 4, "sent frame");
        Ok(())
    }

    /// Flush and shut down the write direction.
    pub async fn finish(mut self) -> Result<(), ProtocolError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Receives length-prefixed bincode messages from the read half.
pub struct MessageReceiver {
    stream: OwnedReadHalf,
}

impl MessageReceiver {
    /// Receive and decode one message.
    ///
    /// Returns `None` when the peer closed the stream cleanly between
    /// frames. EOF in the middle of a frame is an error.
    pub async fn recv<T: Decode<()>>(&mut self) -> Result<Option<T>, ProtocolError> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf);
        if len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::Deserialization(format!(
                "message size {len} exceeds maximum {MAX_MESSAGE_SIZE}"
            )));
        }

        let mut payload = vec![0u8; len as usize];
        match self.stream.read_exact(&mut payload).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::StreamClosed);
            }
            Err(e) => return Err(e.into()),
        }

        trace!(len, "received frame");
        decode_frame(&payload).map(Some)
    }
}
