//! WebSocket connection handler.
//!
//! Manages individual WebSocket connections: registration, channel
//! subscriptions, and forwarding of community updates to the client.

use std::collections::{HashMap, HashSet};

use agora_core::{Channel, Error, Subscription};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{ClientSender, RelayState};

/// Longest accepted username.
const MAX_USERNAME_LENGTH: usize = 64;

/// Per-connection subscription tasks, keyed by channel.
type Subscriptions = HashMap<Channel, JoinHandle<()>>;

/// Handle a single WebSocket connection.
///
/// This function runs for the lifetime of the connection:
/// 1. Waits for a `Register` message to associate the connection with a username
/// 2. Spawns a sender task to forward outbound messages
/// 3. Processes incoming messages until the connection closes
/// 4. Aborts every subscription task, which drops the bus subscriptions
pub async fn handle_websocket(socket: WebSocket, state: RelayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create the outbound channel for this client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // ── Step 1: Wait for Registration ─────────────────────────────────────

    let username = loop {
        let reply = match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Register { username }) => {
                    let username = username.trim().to_string();
                    if username.is_empty() || username.chars().count() > MAX_USERNAME_LENGTH {
                        ServerMessage::protocol_error("Invalid username")
                    } else {
                        let ack = ServerMessage::Registered {
                            username: username.clone(),
                        };
                        if send_direct(&mut ws_sender, &ack).await.is_err() {
                            return; // Connection closed
                        }
                        break username;
                    }
                }
                Ok(ClientMessage::Ping) => ServerMessage::Pong,
                Ok(_) => ServerMessage::protocol_error("Must register before sending other messages"),
                Err(e) => {
                    tracing::warn!("Failed to parse client message: {}", e);
                    ServerMessage::protocol_error(format!("Invalid message format: {}", e))
                }
            },
            Some(Ok(Message::Ping(data))) => {
                let _ = ws_sender.send(Message::Pong(data)).await;
                continue;
            }
            Some(Ok(Message::Close(_))) | None => {
                return; // Connection closed before registration
            }
            _ => continue,
        };
        let _ = send_direct(&mut ws_sender, &reply).await;
    };

    // ── Step 2: Register Client ───────────────────────────────────────────

    state.register_client(&username, tx.clone());
    tracing::info!(username = username.as_str(), "WebSocket registered");

    // ── Step 3: Spawn Sender Task ─────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if send_direct(&mut ws_sender, &msg).await.is_err() {
                break; // Connection closed
            }
        }
    });

    // ── Step 4: Process Messages ──────────────────────────────────────────

    let mut subscriptions = Subscriptions::new();

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    let reply =
                        handle_client_message(&state, &username, &tx, &mut subscriptions, client_msg);
                    let _ = tx.send(reply);
                }
                Err(e) => {
                    tracing::warn!(
                        username = username.as_str(),
                        error = %e,
                        "Failed to parse client message"
                    );
                    let _ = tx.send(ServerMessage::protocol_error(format!(
                        "Invalid message format: {}",
                        e
                    )));
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(username = username.as_str(), "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(
                    username = username.as_str(),
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            _ => {} // Binary, Ping, Pong: axum answers pings itself
        }
    }

    // ── Step 5: Cleanup ───────────────────────────────────────────────────

    for (_, task) in subscriptions.drain() {
        task.abort();
    }
    state.unregister_client(&username, &tx);
    sender_task.abort();
    tracing::info!(username = username.as_str(), "WebSocket disconnected");
}

/// Handle a parsed client message and build the direct reply.
fn handle_client_message(
    state: &RelayState,
    username: &str,
    tx: &ClientSender,
    subscriptions: &mut Subscriptions,
    msg: ClientMessage,
) -> ServerMessage {
    match msg {
        ClientMessage::Register { .. } => ServerMessage::protocol_error("Already registered"),

        ClientMessage::Subscribe { channel } => {
            match handle_subscribe(state, username, tx, subscriptions, &channel) {
                Ok(()) => ServerMessage::Subscribed { channel },
                Err(reply) => reply,
            }
        }

        ClientMessage::Unsubscribe { channel } => {
            let Some(parsed) = Channel::parse(&channel) else {
                return ServerMessage::protocol_error(format!("Unknown channel: {}", channel));
            };
            if let Some(task) = subscriptions.remove(&parsed) {
                task.abort();
                tracing::debug!(username, channel = channel.as_str(), "Unsubscribed");
            }
            ServerMessage::Unsubscribed { channel }
        }

        ClientMessage::Ping => ServerMessage::Pong,
    }
}

/// Subscribe the connection to `channel_name`, spawning a forwarder task.
///
/// The bus subscription is taken before the acknowledgement is sent, so
/// every commit after the `subscribed` reply reaches the client.
fn handle_subscribe(
    state: &RelayState,
    username: &str,
    tx: &ClientSender,
    subscriptions: &mut Subscriptions,
    channel_name: &str,
) -> Result<(), ServerMessage> {
    let channel = Channel::parse(channel_name).ok_or_else(|| {
        ServerMessage::protocol_error(format!("Unknown channel: {}", channel_name))
    })?;

    let mut visible = HashSet::new();
    if let Channel::Community(id) = &channel {
        let community = state
            .engine
            .get_community(id)
            .map_err(|e| ServerMessage::from_error(&e))?;
        if !community.is_visible_to(Some(username)) {
            return Err(ServerMessage::from_error(&Error::CommunityNotFound));
        }
        visible.insert(id.clone());
    }

    // A forwarder that ended after losing visibility may be replaced
    if subscriptions
        .get(&channel)
        .is_some_and(|task| !task.is_finished())
    {
        return Ok(());
    }

    let subscription = state.engine.subscribe(&channel);
    let task = tokio::spawn(forward_updates(
        subscription,
        username.to_string(),
        tx.clone(),
        visible,
    ));
    subscriptions.insert(channel, task);

    tracing::debug!(username, channel = channel_name, "Subscribed");
    Ok(())
}

/// Forward payloads from one bus subscription to the client until the
/// socket or the channel closes.
///
/// `visible` holds the communities the user could see at subscribe time.
/// Private communities stay hidden from outsiders, except for the one
/// update that takes a viewer out: it is still delivered so the client's
/// copy converges. On a community channel the forwarder then stops.
async fn forward_updates(
    mut subscription: Subscription,
    username: String,
    tx: ClientSender,
    mut visible: HashSet<String>,
) {
    let channel = subscription.channel().clone();
    let channel_name = channel.name();
    while let Some(payload) = subscription.recv().await {
        let community = payload.community();
        let lost_visibility = if community.is_visible_to(Some(&username)) {
            visible.insert(community.id.clone());
            false
        } else if visible.remove(&community.id) {
            true
        } else {
            continue;
        };

        let msg = ServerMessage::Update {
            channel: channel_name.clone(),
            payload,
        };
        if tx.send(msg).is_err() {
            break;
        }
        if lost_visibility && matches!(channel, Channel::Community(_)) {
            tracing::debug!(
                username = username.as_str(),
                channel = channel_name.as_str(),
                "Subscriber lost access, forwarder stopped"
            );
            break;
        }
    }
}

/// Serialize and write one message straight to the socket.
async fn send_direct<S>(ws_sender: &mut S, msg: &ServerMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            return Ok(());
        }
    };
    ws_sender.send(Message::Text(json)).await.map_err(|_| ())
}
