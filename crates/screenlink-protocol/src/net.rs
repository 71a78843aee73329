//! Endpoint setup: bind, accept, and connect.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::ProtocolError;
use crate::stream::{split, MessageReceiver, MessageSender};

/// Listening endpoint for the server side.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ProtocolError> {
        let inner = TcpListener::bind(addr).await?;
        info!(addr = %inner.local_addr()?, "listening");
        Ok(Self { inner })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.inner.local_addr()?)
    }

    /// Accept one connection and split it into framed streams.
    pub async fn accept(&self) -> Result<(MessageSender, MessageReceiver, SocketAddr), ProtocolError> {
        let (stream, remote) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        debug!(remote = %remote, "accepted connection");
        let (tx, rx) = split(stream);
        Ok((tx, rx, remote))
    }
}

/// Connect to a remote server and split the connection into framed streams.
pub async fn connect(addr: SocketAddr) -> Result<(MessageSender, MessageReceiver), ProtocolError> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    debug!(remote = %addr, "connected to server");
    Ok(split(stream))
}
