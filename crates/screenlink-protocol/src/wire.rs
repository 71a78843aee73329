//! Wire format: length-prefixed bincode frames.
//!
//! Each message on the wire is:
//!   [4 bytes big-endian length][bincode payload]

use bincode::{Decode, Encode};

use crate::error::ProtocolError;

/// Maximum message size (1 MiB). Prevents allocation bombs.
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Encode a message to a length-prefixed byte vector.
pub fn encode_frame<T: Encode>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let config = bincode::config::standard();
    let payload = bincode::encode_to_vec(msg, config)
        .map_err(|e| ProtocolError::Serialization(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::Serialization("message too large".to_string()))?;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Serialization(format!(
            "message size {len} exceeds maximum {MAX_MESSAGE_SIZE}"
        )));
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a message from a frame payload (without the length prefix).
pub fn decode_frame<T: Decode<()>>(payload: &[u8]) -> Result<T, ProtocolError> {
    let config = bincode::config::standard();
    let (msg, _) = bincode::decode_from_slice(payload, config)
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenlink_types::{Message, APP_NAME, PROTOCOL_VERSION};

    #[test]
    fn frame_roundtrip() {
        let msg = Message::Hello {
            name: APP_NAME.to_string(),
            version: PROTOCOL_VERSION.to_string(),
        };

        let bytes = encode_frame(&msg).unwrap();
        let len = u32::from_be_bytes(bytes[..4].try_into().unwrap());
        assert_eq!(len as usize, bytes.len() - 4);

        let decoded: Message = decode_frame(&bytes[4..]).unwrap();
        match decoded {
            Message::Hello { name, version } => {
                assert_eq!(name, APP_NAME);
                assert_eq!(version, PROTOCOL_VERSION);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let msg = Message::MouseWheel {
            x: 1.0,
            y: -2.5,
            timestamp: 9,
        };
        let bytes = encode_frame(&msg).unwrap();
        let result: Result<Message, _> = decode_frame(&bytes[4..bytes.len() - 1]);
        assert!(result.is_err());
    }
}
