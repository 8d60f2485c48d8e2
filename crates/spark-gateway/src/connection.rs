use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use spark_types::events::{GatewayCommand, GatewayEvent};
use spark_types::models::{ConversationId, UserId};

use crate::dispatcher::Dispatcher;
use crate::tokens::verify_token;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Decides whether a user may subscribe to a conversation's messages.
#[async_trait]
pub trait ConversationAccess: Send + Sync + 'static {
    async fn is_member(&self, user_id: &UserId, conversation_id: &ConversationId) -> bool;
}

type Subscriptions = Arc<std::sync::RwLock<HashSet<ConversationId>>>;

/// Handle a single WebSocket connection: `Identify` handshake, `Ready`, then
/// relay dispatcher events filtered by the connection's subscriptions.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    jwt_secret: String,
    access: Arc<dyn ConversationAccess>,
) {
    let (mut sender, mut receiver) = socket.split();

    let Some(user_id) = wait_for_identify(&mut receiver, &jwt_secret).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    info!("{} connected to gateway", user_id);

    let ready = GatewayEvent::Ready {
        user_id: user_id.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    // Subscribe before reading commands so nothing published after Ready is missed.
    let mut broadcast_rx = dispatcher.subscribe();

    let subscriptions: Subscriptions = Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();
    let send_user = user_id.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver for {} lagged by {} events", send_user, n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    let forward = match send_subscriptions.read() {
                        Ok(subs) => should_forward(&event, &send_user, &subs),
                        Err(_) => false,
                    };
                    if forward && send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_user = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&recv_user, cmd, &subscriptions, access.as_ref()).await
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            recv_user,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} disconnected from gateway", user_id);
}

/// Pure routing decision for one event on one connection.
pub fn should_forward(
    event: &GatewayEvent,
    user_id: &UserId,
    subscriptions: &HashSet<ConversationId>,
) -> bool {
    if !event.is_visible_to(user_id) {
        return false;
    }
    match event.conversation_id() {
        Some(conversation_id) => subscriptions.contains(conversation_id),
        None => true,
    }
}

async fn handle_command(
    user_id: &UserId,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
    access: &dyn ConversationAccess,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { conversation_ids } => {
            let mut allowed = Vec::with_capacity(conversation_ids.len());
            for id in conversation_ids {
                if access.is_member(user_id, &id).await {
                    allowed.push(id);
                } else {
                    warn!("{} denied subscription to {}", user_id, id);
                }
            }

            info!("{} subscribing to {} conversations", user_id, allowed.len());
            if let Ok(mut subs) = subscriptions.write() {
                subs.extend(allowed);
            }
        }

        GatewayCommand::Unsubscribe { conversation_ids } => {
            if let Ok(mut subs) = subscriptions.write() {
                for id in &conversation_ids {
                    subs.remove(id);
                }
            }
        }
    }
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|e| {
        warn!("Failed to encode gateway event: {}", e);
    })?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<UserId> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return verify_token(jwt_secret, &token).map(|claims| claims.sub);
                }
            }
        }
        None
    };

    tokio::time::timeout(IDENTIFY_TIMEOUT, identify)
        .await
        .ok()
        .flatten()
}
