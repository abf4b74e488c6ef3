use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use greenlight_db::Database;
use greenlight_types::events::{RealtimeCommand, RealtimeEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

type Subscriptions = Arc<RwLock<HashSet<Uuid>>>;

/// Handle a WebSocket whose token was already validated at the HTTP upgrade.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = RealtimeEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, db, user_id, username).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    username: String,
) {
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;
    let mut broadcast_rx = dispatcher.subscribe();

    // Lights this socket follows (shared between send and recv tasks).
    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

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
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if !wants_broadcast(&send_subscriptions, user_id, &event) {
                        continue;
                    }
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                    drop_revoked(&send_subscriptions, user_id, &event);
                }
                result = user_rx.recv() => {
                    let Some(event) = result else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                    drop_revoked(&send_subscriptions, user_id, &event);
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
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

    let username_recv = username.clone();
    let recv_subscriptions = subscriptions.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RealtimeCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&db, user_id, &username_recv, cmd, &recv_subscriptions).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
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

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_user_channel(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn handle_command(
    db: &Arc<Database>,
    user_id: Uuid,
    username: &str,
    cmd: RealtimeCommand,
    subscriptions: &Subscriptions,
) {
    match cmd {
        RealtimeCommand::Subscribe { light_ids } => {
            let requested = light_ids.len();
            let db = db.clone();
            let visible = tokio::task::spawn_blocking(move || {
                let uid = user_id.to_string();
                light_ids
                    .into_iter()
                    .filter(|id| match db.can_view_light(&id.to_string(), &uid) {
                        Ok(ok) => ok,
                        Err(e) => {
                            warn!("Visibility check for light {} failed: {}", id, e);
                            false
                        }
                    })
                    .collect::<HashSet<Uuid>>()
            })
            .await
            .unwrap_or_else(|e| {
                warn!("Subscribe task failed: {}", e);
                HashSet::new()
            });

            info!(
                "{} ({}) subscribing to {} of {} lights",
                username,
                user_id,
                visible.len(),
                requested
            );
            *subscriptions.write().unwrap_or_else(|e| e.into_inner()) = visible;
        }
    }
}

/// Whether a broadcast event should be forwarded to this socket.
fn wants_broadcast(subscriptions: &Subscriptions, user_id: Uuid, event: &RealtimeEvent) -> bool {
    let Some(light_id) = event.light_id() else {
        return false;
    };
    // The invitee already gets their own RSVP change on the targeted channel.
    if let RealtimeEvent::InvitationUpdate { user_id: invitee, .. } = event {
        if *invitee == user_id {
            return false;
        }
    }
    subscriptions
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .contains(&light_id)
}

/// Stop following a light once this user loses access to it: their own
/// invitation was removed, or the light was cancelled.
fn drop_revoked(subscriptions: &Subscriptions, user_id: Uuid, event: &RealtimeEvent) {
    let light_id = match event {
        RealtimeEvent::InvitationUpdate {
            light_id,
            user_id: invitee,
            status: None,
            ..
        } if *invitee == user_id => *light_id,
        RealtimeEvent::LightCancelled { light_id } => *light_id,
        _ => return,
    };
    if subscriptions
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&light_id)
    {
        debug!("{} unsubscribed from revoked light {}", user_id, light_id);
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &RealtimeEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            debug!("Dropping unserialisable event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
