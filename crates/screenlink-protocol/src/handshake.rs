//! Connection handshake.
//!
//! The connecting side opens with `Hello { name, version }` followed by
//! `ScreenInfo` describing its display. The accepting side validates the
//! pair and answers nothing; a mismatch drops the connection.

use screenlink_types::{Message, VirtualScreenInfo, APP_NAME, COMPATIBLE_VERSIONS, PROTOCOL_VERSION};
use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::stream::{MessageReceiver, MessageSender};

/// Client side: send `Hello` then our screen description.
pub async fn connect_handshake(
    tx: &mut MessageSender,
    info: VirtualScreenInfo,
) -> Result<(), ProtocolError> {
    tx.send(&Message::Hello {
        name: APP_NAME.to_string(),
        version: PROTOCOL_VERSION.to_string(),
    })
    .await?;
    tx.send(&Message::ScreenInfo(info)).await?;
    debug!("sent Hello and screen info");
    Ok(())
}

/// Server side: expect `Hello` then `ScreenInfo`; return the peer's screen.
pub async fn accept_handshake(
    rx: &mut MessageReceiver,
) -> Result<VirtualScreenInfo, ProtocolError> {
    let hello: Message = rx
        .recv()
        .await?
        .ok_or(ProtocolError::StreamClosed)?;
    let (name, version) = match hello {
        Message::Hello { name, version } => (name, version),
        other => {
            return Err(ProtocolError::Handshake(format!(
                "expected Hello, got {:?}",
                other.message_type()
            )));
        }
    };
    if name != APP_NAME {
        warn!(name = %name, "rejecting unknown application");
        return Err(ProtocolError::Handshake(format!("unknown application {name}")));
    }
    if !COMPATIBLE_VERSIONS.contains(&version.as_str()) {
        return Err(ProtocolError::VersionMismatch {
            remote: version,
            local: PROTOCOL_VERSION.to_string(),
        });
    }

    let screen: Message = rx
        .recv()
        .await?
        .ok_or(ProtocolError::StreamClosed)?;
    match screen {
        Message::ScreenInfo(info) => {
            debug!(screen = %info.name, "handshake complete");
            Ok(info)
        }
        other => Err(ProtocolError::Handshake(format!(
            "expected ScreenInfo, got {:?}",
            other.message_type()
        ))),
    }
}
