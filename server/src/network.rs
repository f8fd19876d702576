//! Server network layer handling WebSocket connections and event dispatch

use crate::board::BoardConfig;
use crate::broadcast::BroadcastDispatcher;
use crate::registry::{AppearanceRequest, SessionRegistry};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientEvent, MAX_MESSAGE_BYTES};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

/// Messages sent from connection tasks to the main dispatch loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        conn_id: u32,
        sender: mpsc::UnboundedSender<Message>,
    },
    EventReceived {
        conn_id: u32,
        event: ClientEvent,
    },
    Disconnected {
        conn_id: u32,
    },
}

/// Main server coordinating the transport and session state
///
/// All mutable state (session registry, board configuration, channel
/// table) is owned by the dispatch loop and mutated only there. Each
/// inbound event is handled to completion, including its broadcast,
/// before the next one is taken off the queue, so no locking is needed
/// and no client ever observes a half-applied mutation.
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    registry: SessionRegistry,
    board: BoardConfig,
    dispatcher: BroadcastDispatcher,
    max_connections: usize,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        max_connections: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            registry: SessionRegistry::with_default_catalog(),
            board: BoardConfig::new(),
            dispatcher: BroadcastDispatcher::new(),
            max_connections,
            server_tx,
            server_rx,
        })
    }

    /// Actual bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the task that accepts connections and hands each one its
    /// own reader/writer task pair.
    fn spawn_accept_loop(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut next_conn_id: u32 = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let conn_id = next_conn_id;
                        next_conn_id += 1;

                        debug!("Connection {} inbound from {}", conn_id, addr);
                        tokio::spawn(handle_connection(stream, addr, conn_id, server_tx.clone()));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Main dispatch loop coordinating all operations
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_accept_loop();

        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::Connected { conn_id, sender } => {
                    self.handle_connected(conn_id, sender);
                }
                ServerMessage::EventReceived { conn_id, event } => {
                    self.handle_event(conn_id, event);
                }
                ServerMessage::Disconnected { conn_id } => {
                    self.handle_disconnected(conn_id);
                }
            }
        }

        info!("Server shutting down");
        Ok(())
    }

    fn handle_connected(&mut self, conn_id: u32, sender: mpsc::UnboundedSender<Message>) {
        if self.dispatcher.connection_count() >= self.max_connections {
            warn!(
                "Connection {} refused: server full ({} connections)",
                conn_id, self.max_connections
            );
            // Dropping the sender tears the connection down after the close frame
            let _ = sender.send(Message::Close(None));
            return;
        }

        info!("Connection {} established", conn_id);
        self.dispatcher.register(conn_id, sender);
        self.dispatcher.send_welcome(
            conn_id,
            self.registry.emoji_catalog(),
            self.board.grid(),
            self.board.background(),
        );
    }

    fn handle_disconnected(&mut self, conn_id: u32) {
        if self.dispatcher.unregister(conn_id) {
            info!("Connection {} closed", conn_id);
        }
        if self.registry.leave(conn_id) {
            self.dispatcher.broadcast_participants(&self.registry.snapshot());
        }
    }

    /// Processes one inbound event and triggers the resulting broadcast
    fn handle_event(&mut self, conn_id: u32, event: ClientEvent) {
        match event {
            ClientEvent::PickUser { name, emoji, image } => {
                let request = AppearanceRequest { emoji, image };
                match self.registry.join(conn_id, &name, request) {
                    Ok(_) => {
                        self.dispatcher.broadcast_participants(&self.registry.snapshot());
                    }
                    Err(e) => {
                        debug!("Connection {} join rejected: {}", conn_id, e);
                        self.dispatcher.send_emoji_error(conn_id, &e.to_string());
                    }
                }
            }

            ClientEvent::JoinAsGuest => {
                self.registry.join_as_guest(conn_id);
                self.dispatcher.broadcast_participants(&self.registry.snapshot());
            }

            ClientEvent::ChatMessage(text) => {
                // Only joined participants (including guests) may chat
                if let Some(participant) = self.registry.get(conn_id) {
                    let line = format!("{}: {}", participant.name, text);
                    self.dispatcher.broadcast_chat(&line);
                }
            }

            ClientEvent::Move(position) => {
                let outcome =
                    self.registry
                        .move_self(conn_id, position, self.board.grid(), Instant::now());
                if outcome.changed() {
                    self.dispatcher.broadcast_participants(&self.registry.snapshot());
                } else {
                    debug!(
                        "Connection {} move to ({}, {}) dropped: {:?}",
                        conn_id, position.x, position.y, outcome
                    );
                }
            }

            ClientEvent::DmMove { user_id, position } => {
                let outcome = self
                    .registry
                    .move_by_operator(user_id, position, self.board.grid());
                if outcome.changed() {
                    self.dispatcher.broadcast_participants(&self.registry.snapshot());
                } else {
                    debug!(
                        "Connection {} dm-move of {} to ({}, {}) dropped: {:?}",
                        conn_id, user_id, position.x, position.y, outcome
                    );
                }
            }

            ClientEvent::UpdateGridSize(grid) => {
                if self.board.set_dimensions(grid.width, grid.height) {
                    self.dispatcher.broadcast_grid(self.board.grid());
                }
            }

            ClientEvent::ChangeBackgroundImage(reference) => {
                if self.board.set_background(reference) {
                    self.dispatcher.broadcast_background(self.board.background());
                }
            }
        }
    }
}

/// Performs the WebSocket handshake, then pumps frames between the socket
/// and the dispatch loop until either side goes away.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: u32,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_MESSAGE_BYTES);

    let websocket = match tokio_tungstenite::accept_async_with_config(stream, Some(config)).await {
        Ok(websocket) => websocket,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut sink, mut source) = websocket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    if server_tx
        .send(ServerMessage::Connected { conn_id, sender: out_tx })
        .is_err()
    {
        return;
    }

    // Writer task: forwards queued outbound messages to the socket. Ends
    // when the dispatch loop drops the sender or the socket fails.
    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader loop: parse inbound frames into typed events
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    if server_tx
                        .send(ServerMessage::EventReceived { conn_id, event })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Ignoring malformed event from connection {}: {}", conn_id, e);
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(other) => {
                debug!(
                    "Ignoring unexpected frame from connection {}: {:?}",
                    conn_id, other
                );
            }
            Err(e) => {
                debug!("Connection {} read error: {}", conn_id, e);
                break;
            }
        }
    }

    let _ = server_tx.send(ServerMessage::Disconnected { conn_id });
}
