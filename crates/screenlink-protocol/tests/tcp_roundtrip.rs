//! Loopback TCP tests for framing and the connection handshake.

use screenlink_protocol::{accept_handshake, connect, connect_handshake, Listener, ProtocolError};
use screenlink_types::{Message, VirtualScreenInfo, APP_NAME};

fn screen(name: &str) -> VirtualScreenInfo {
    VirtualScreenInfo {
        name: name.to_string(),
        screen_id: 1,
        width: 1920,
        height: 1080,
        timestamp: 1,
    }
}

#[tokio::test]
async fn handshake_and_message_exchange() {
    let listener = Listener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = tokio::spawn(async move {
        let (mut tx, mut rx) = connect(addr).await.unwrap();
        connect_handshake(&mut tx, screen("laptop")).await.unwrap();
        // First forwarded event from the server.
        let msg: Message = rx.recv().await.unwrap().unwrap();
        match msg {
            Message::MouseMotionAbsolute { x, y, is_absolute, .. } => {
                assert_eq!((x, y), (0, 500));
                assert!(is_absolute);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    });

    let (mut tx, mut rx, remote) = listener.accept().await.unwrap();
    assert_eq!(remote.ip().to_string(), "127.0.0.1");
    let info = accept_handshake(&mut rx).await.unwrap();
    assert_eq!(info.name, "laptop");

    tx.send(&Message::MouseMotionAbsolute {
        x: 0,
        y: 500,
        is_absolute: true,
        timestamp: 12,
    })
    .await
    .unwrap();

    client.await.unwrap();
}

#[tokio::test]
async fn version_mismatch_closes_the_connection() {
    let listener = Listener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = tokio::spawn(async move {
        let (mut tx, mut rx) = connect(addr).await.unwrap();
        tx.send(&Message::Hello {
            name: APP_NAME.to_string(),
            version: "0.0.0".to_string(),
        })
        .await
        .unwrap();
        // The server drops us without replying; the stream just ends.
        let next: Option<Message> = rx.recv().await.unwrap_or(None);
        assert!(next.is_none());
    });

    let (tx, mut rx, _remote) = listener.accept().await.unwrap();
    let err = accept_handshake(&mut rx).await.unwrap_err();
    match err {
        ProtocolError::VersionMismatch { remote, .. } => assert_eq!(remote, "0.0.0"),
        other => panic!("unexpected error: {other}"),
    }
    drop(tx);
    drop(rx);

    client.await.unwrap();
}

#[tokio::test]
async fn clean_eof_yields_none() {
    let listener = Listener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = tokio::spawn(async move {
        let (tx, _rx) = connect(addr).await.unwrap();
        tx.finish().await.unwrap();
    });

    let (_tx, mut rx, _remote) = listener.accept().await.unwrap();
    let msg: Option<Message> = rx.recv().await.unwrap();
    assert!(msg.is_none());

    client.await.unwrap();
}
