//! Transport node: TCP endpoints, per-peer tasks, and forwarding.
//!
//! As a server it accepts connections, runs the handshake, and spawns one
//! receive task per peer; inbound traffic enters the bus wrapped in
//! `ClientMessage` with the peer's address as origin. As a client it holds
//! exactly one connection to the server and pushes received messages onto
//! the bus unwrapped, with `"self"` as origin.
//!
//! Outbound, the node consumes the event types in its forwarded set and
//! sends them to the current peer, the owner of the focused screen,
//! tracked from `FocusScreenChanged`. With no current peer the event is
//! dropped silently.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use screenlink_protocol::{
    accept_handshake, connect, connect_handshake, Listener, MessageReceiver, MessageSender,
};
use screenlink_types::{
    AppMode, AppStatus, Message, MessageType, ServiceOp, VirtualScreenInfo,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{Event, EventQueue};
use crate::error::CoreError;
use crate::node::{Consumer, Node};

pub const NODE_NAME: &str = "transport";

/// Peer id of the local endpoint.
pub const SELF_PEER: &str = "self";

struct PeerHandle {
    sender: MessageSender,
    token: CancellationToken,
}

type PeerTable = Arc<tokio::sync::Mutex<HashMap<String, PeerHandle>>>;

struct ServerEndpoint {
    token: CancellationToken,
    accept_task: JoinHandle<()>,
    peers: PeerTable,
}

struct ClientEndpoint {
    token: CancellationToken,
    recv_task: JoinHandle<()>,
    sender: MessageSender,
}

/// The transport component.
pub struct TransportNode {
    self_info: VirtualScreenInfo,
    /// Event types forwarded to the current peer.
    forwarded: HashSet<MessageType>,
    current_peer: Option<String>,
    server: Option<ServerEndpoint>,
    client: Option<ClientEndpoint>,
}

impl TransportNode {
    #[must_use]
    pub fn new(self_info: VirtualScreenInfo) -> Self {
        Self {
            self_info,
            forwarded: HashSet::new(),
            current_peer: None,
            server: None,
            client: None,
        }
    }

    async fn start_server(
        &mut self,
        address: &str,
        port: u16,
        bus: &EventQueue,
    ) -> Result<(), CoreError> {
        if self.client.is_some() {
            return Err(CoreError::Config(
                "cannot start server while client is running".to_string(),
            ));
        }
        if self.server.is_some() {
            return Err(CoreError::Config("server already running".to_string()));
        }

        let addr: SocketAddr = format!("{address}:{port}")
            .parse()
            .map_err(|e| CoreError::Config(format!("invalid listen address: {e}")))?;
        let listener = Listener::bind(addr).await.map_err(CoreError::Protocol)?;

        let token = CancellationToken::new();
        let peers: PeerTable = Arc::default();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&peers),
            bus.clone(),
            token.clone(),
        ));
        self.server = Some(ServerEndpoint {
            token,
            accept_task,
            peers,
        });

        bus.push(Event::new(
            NODE_NAME,
            Message::AppStatusChanged {
                status: AppStatus::Started,
                mode: AppMode::Server,
            },
        ))
        .await?;
        Ok(())
    }

    async fn stop_server(&mut self, bus: Option<&EventQueue>) -> Result<(), CoreError> {
        let Some(server) = self.server.take() else {
            return Ok(());
        };
        server.token.cancel();
        let _ = server.accept_task.await;
        server.peers.lock().await.clear();
        self.current_peer = None;
        info!("server stopped");
        if let Some(bus) = bus {
            bus.push(Event::new(
                NODE_NAME,
                Message::AppStatusChanged {
                    status: AppStatus::Stopped,
                    mode: AppMode::Server,
                },
            ))
            .await?;
        }
        Ok(())
    }

    async fn start_client(
        &mut self,
        address: &str,
        port: u16,
        bus: &EventQueue,
    ) -> Result<(), CoreError> {
        if self.server.is_some() {
            return Err(CoreError::Config(
                "cannot start client while server is running".to_string(),
            ));
        }
        if self.client.is_some() {
            // Reconnect: tear the old connection down first, quietly.
            self.stop_client(None).await?;
        }

        let addr: SocketAddr = format!("{address}:{port}")
            .parse()
            .map_err(|e| CoreError::Config(format!("invalid server address: {e}")))?;
        let (mut tx, rx) = connect(addr).await.map_err(CoreError::Protocol)?;
        connect_handshake(&mut tx, self.self_info.clone())
            .await
            .map_err(CoreError::Protocol)?;

        let token = CancellationToken::new();
        let recv_task = tokio::spawn(client_recv_loop(
            rx,
            bus.clone(),
            token.clone(),
            address.to_string(),
            port,
        ));
        self.client = Some(ClientEndpoint {
            token,
            recv_task,
            sender: tx,
        });
        info!(server = %addr, "connected to server");

        bus.push(Event::new(
            NODE_NAME,
            Message::AppStatusChanged {
                status: AppStatus::Started,
                mode: AppMode::Client,
            },
        ))
        .await?;
        Ok(())
    }

    async fn stop_client(&mut self, bus: Option<&EventQueue>) -> Result<(), CoreError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        client.token.cancel();
        let _ = client.recv_task.await;
        drop(client.sender);
        info!("client stopped");
        if let Some(bus) = bus {
            bus.push(Event::new(
                NODE_NAME,
                Message::AppStatusChanged {
                    status: AppStatus::Stopped,
                    mode: AppMode::Client,
                },
            ))
            .await?;
        }
        Ok(())
    }

    /// Send a subscribed event to the current peer's connection.
    async fn forward(&mut self, msg: &Message, bus: &EventQueue) -> Result<(), CoreError> {
        let Some(peer_id) = self.current_peer.clone() else {
            return Ok(());
        };
        let Some(server) = &self.server else {
            return Ok(());
        };
        let peers = Arc::clone(&server.peers);

        let mut table = peers.lock().await;
        let Some(handle) = table.get_mut(&peer_id) else {
            debug!(peer = %peer_id, "current peer has no connection; dropping event");
            return Ok(());
        };
        if let Err(e) = handle.sender.send(msg).await {
            warn!(peer = %peer_id, error = %e, "send failed; dropping peer");
            if let Some(handle) = table.remove(&peer_id) {
                handle.token.cancel();
            }
            drop(table);
            self.current_peer = None;
            bus.push(Event::new(
                NODE_NAME,
                Message::ClientDisconnected {
                    peer: peer_id,
                    reason: e.to_string(),
                },
            ))
            .await?;
        }
        Ok(())
    }

    /// Explicit send for control paths.
    pub async fn send(&mut self, msg: &Message, peer_id: &str) -> Result<(), CoreError> {
        if let Some(server) = &self.server {
            let peers = Arc::clone(&server.peers);
            let mut table = peers.lock().await;
            let handle = table
                .get_mut(peer_id)
                .ok_or_else(|| CoreError::Config(format!("peer {peer_id} not connected")))?;
            handle.sender.send(msg).await.map_err(CoreError::Protocol)
        } else if let Some(client) = &mut self.client {
            client.sender.send(msg).await.map_err(CoreError::Protocol)
        } else {
            Err(CoreError::Config("transport not running".to_string()))
        }
    }
}

#[async_trait]
impl Node for TransportNode {
    fn name(&self) -> &str {
        NODE_NAME
    }

    async fn setup(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), CoreError> {
        self.stop_server(None).await?;
        self.stop_client(None).await?;
        self.forwarded.clear();
        Ok(())
    }

    fn consumer(&mut self) -> Option<&mut dyn Consumer> {
        Some(self)
    }
}

#[async_trait]
impl Consumer for TransportNode {
    fn subscriptions(&self) -> Vec<MessageType> {
        let mut types = vec![
            MessageType::ServerControl,
            MessageType::ClientControl,
            MessageType::SendSubscribe,
            MessageType::SendUnsubscribe,
            MessageType::FocusScreenChanged,
            MessageType::ClientDisconnected,
        ];
        types.extend(Message::forwarded_types());
        types
    }

    async fn handle_event(&mut self, event: &Event, bus: &EventQueue) -> Result<(), CoreError> {
        match &event.message {
            Message::ServerControl { op, address, port } => match op {
                ServiceOp::Start => self.start_server(address, *port, bus).await,
                ServiceOp::Stop => self.stop_server(Some(bus)).await,
                ServiceOp::Restart => {
                    self.stop_server(Some(bus)).await?;
                    self.start_server(address, *port, bus).await
                }
            },
            Message::ClientControl { op, address, port } => match op {
                ServiceOp::Start => self.start_client(address, *port, bus).await,
                ServiceOp::Stop => self.stop_client(Some(bus)).await,
                ServiceOp::Restart => {
                    self.stop_client(Some(bus)).await?;
                    self.start_client(address, *port, bus).await
                }
            },
            Message::SendSubscribe(types) => {
                self.forwarded.extend(types.iter().copied());
                Ok(())
            }
            Message::SendUnsubscribe(types) => {
                for ty in types {
                    self.forwarded.remove(ty);
                }
                Ok(())
            }
            Message::FocusScreenChanged { peer, .. } => {
                self.current_peer = (peer != SELF_PEER).then(|| peer.clone());
                debug!(peer = %peer, "current peer updated");
                Ok(())
            }
            Message::ClientDisconnected { peer, .. } => {
                if self.current_peer.as_deref() == Some(peer.as_str()) {
                    self.current_peer = None;
                }
                if let Some(server) = &self.server {
                    let peers = Arc::clone(&server.peers);
                    let removed = peers.lock().await.remove(peer);
                    if let Some(handle) = removed {
                        handle.token.cancel();
                    }
                }
                Ok(())
            }
            msg if self.forwarded.contains(&msg.message_type()) => self.forward(msg, bus).await,
            _ => Ok(()),
        }
    }
}

/// Push unless the task was cancelled; cancellation wins so teardown never
/// waits on a full queue.
async fn push_or_cancelled(queue: &EventQueue, token: &CancellationToken, event: Event) -> bool {
    tokio::select! {
        () = token.cancelled() => false,
        result = queue.push(event) => result.is_ok(),
    }
}

/// Accept connections and spawn one task per peer.
async fn accept_loop(
    listener: Listener,
    peers: PeerTable,
    queue: EventQueue,
    token: CancellationToken,
) {
    loop {
        let (tx, rx, remote) = tokio::select! {
            () = token.cancelled() => break,
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        };
        let peer_id = remote.to_string();
        tokio::spawn(run_peer(
            tx,
            rx,
            peer_id,
            Arc::clone(&peers),
            queue.clone(),
            token.child_token(),
        ));
    }
    debug!("accept loop exited");
}

enum PeerExit {
    Cancelled,
    Gone(String),
}

/// Handshake, register, then pump inbound messages onto the bus.
///
/// `ClientDisconnected` is emitted exactly once per peer: whoever removes
/// the peer from the table (this task, or the send path) reports it.
async fn run_peer(
    tx: MessageSender,
    mut rx: MessageReceiver,
    peer_id: String,
    peers: PeerTable,
    queue: EventQueue,
    token: CancellationToken,
) {
    let info = tokio::select! {
        () = token.cancelled() => return,
        result = accept_handshake(&mut rx) => match result {
            Ok(info) => info,
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "handshake failed; dropping connection");
                return;
            }
        }
    };

    peers.lock().await.insert(
        peer_id.clone(),
        PeerHandle {
            sender: tx,
            token: token.clone(),
        },
    );
    info!(peer = %peer_id, screen = %info.name, "client connected");
    let announced = push_or_cancelled(
        &queue,
        &token,
        Event::new(
            peer_id.clone(),
            Message::ClientConnected {
                peer: peer_id.clone(),
                info,
            },
        ),
    )
    .await;
    if !announced {
        peers.lock().await.remove(&peer_id);
        return;
    }

    let exit = loop {
        let result = tokio::select! {
            () = token.cancelled() => break PeerExit::Cancelled,
            result = rx.recv::<Message>() => result,
        };
        match result {
            Ok(Some(msg)) => {
                let wrapped = Message::ClientMessage {
                    peer: peer_id.clone(),
                    msg: Box::new(msg),
                };
                if !push_or_cancelled(&queue, &token, Event::new(peer_id.clone(), wrapped)).await {
                    break PeerExit::Cancelled;
                }
            }
            Ok(None) => break PeerExit::Gone("connection closed".to_string()),
            Err(e) => break PeerExit::Gone(e.to_string()),
        }
    };

    let removed = peers.lock().await.remove(&peer_id).is_some();
    if removed {
        if let PeerExit::Gone(reason) = exit {
            info!(peer = %peer_id, reason = %reason, "client disconnected");
            let _ = queue
                .push(Event::new(
                    peer_id.clone(),
                    Message::ClientDisconnected {
                        peer: peer_id.clone(),
                        reason,
                    },
                ))
                .await;
        }
    }
}

/// Client side: push raw server messages onto the bus; on failure request a
/// reconnect and leave the retry policy to the shell.
async fn client_recv_loop(
    mut rx: MessageReceiver,
    queue: EventQueue,
    token: CancellationToken,
    address: String,
    port: u16,
) {
    loop {
        let result = tokio::select! {
            () = token.cancelled() => return,
            result = rx.recv::<Message>() => result,
        };
        match result {
            Ok(Some(msg)) => {
                if !push_or_cancelled(&queue, &token, Event::new(SELF_PEER, msg)).await {
                    return;
                }
            }
            Ok(None) | Err(_) => {
                warn!("server connection lost; requesting reconnect");
                let _ = push_or_cancelled(
                    &queue,
                    &token,
                    Event::new(
                        SELF_PEER,
                        Message::ClientControl {
                            op: ServiceOp::Start,
                            address,
                            port,
                        },
                    ),
                )
                .await;
                return;
            }
        }
    }
}
