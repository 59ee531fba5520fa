use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use redress_db::Database;
use redress_policy::access::{self, Action, ComplaintAccess};
use redress_types::events::{GatewayCommand, GatewayEvent};
use redress_types::models::{Actor, Claims, Role};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection: Identify handshake, Ready, then
/// the event loop. Tearing the connection down never loses data — the
/// durable log is the source of truth and a reconnecting client re-fetches.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let (user_id, full_name) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", full_name, user_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        user_id,
        full_name: full_name.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // Register per-user channel for targeted notification events
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;

    // Subscribe to broadcasts and relay to this client
    let mut broadcast_rx = dispatcher.subscribe();

    // Per-connection complaint subscriptions (shared between send and recv tasks).
    let subscribed: Arc<std::sync::RwLock<HashSet<Uuid>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscribed.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Spawn task to forward broadcasts + targeted events -> client, with heartbeat
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
                            // At-least-once: the client recovers skipped
                            // events by re-fetching the durable log.
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(complaint_id) = event.complaint_id() {
                        let subs = send_subscriptions.read()
                            .expect("subscription lock poisoned");
                        if !subs.contains(&complaint_id) {
                            continue;
                        }
                    }

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
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

    // Read commands from client
    let name_recv = full_name.clone();
    let recv_db = db.clone();
    let recv_subscriptions = subscribed.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            recv_db.clone(),
                            user_id,
                            &name_recv,
                            cmd,
                            &recv_subscriptions,
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            name_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
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

    dispatcher.unregister_user_channel(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", full_name, user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.name));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    db: Arc<Database>,
    user_id: Uuid,
    full_name: &str,
    cmd: GatewayCommand,
    subscriptions: &Arc<std::sync::RwLock<HashSet<Uuid>>>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { complaint_ids } => {
            let requested = complaint_ids.len();
            let allowed = authorize_subscriptions(db, user_id, complaint_ids).await;
            info!(
                "{} ({}) subscribed to {}/{} complaints",
                full_name,
                user_id,
                allowed.len(),
                requested
            );
            let mut subs = subscriptions.write().expect("subscription lock poisoned");
            subs.extend(allowed);
        }

        GatewayCommand::Unsubscribe { complaint_ids } => {
            let mut subs = subscriptions.write().expect("subscription lock poisoned");
            for id in complaint_ids {
                subs.remove(&id);
            }
        }
    }
}

/// Authorize each requested complaint against the access matrix. Ids that do
/// not resolve or are not viewable are dropped silently — a subscriber
/// learns nothing about complaints it may not see. Roles are read fresh on
/// every Subscribe, so a role change applies without reconnecting.
async fn authorize_subscriptions(
    db: Arc<Database>,
    user_id: Uuid,
    complaint_ids: Vec<Uuid>,
) -> Vec<Uuid> {
    let result = tokio::task::spawn_blocking(move || {
        let roles: Vec<Role> = db
            .roles_of(&user_id.to_string())?
            .into_iter()
            .filter_map(|r| Role::parse(&r.role))
            .collect();
        let actor = Actor::new(user_id, roles);

        let mut allowed = Vec::new();
        for id in complaint_ids {
            let Some(row) = db.get_complaint(&id.to_string())? else {
                continue;
            };
            let Ok(owner) = row.user_id.parse::<Uuid>() else {
                continue;
            };
            let target = ComplaintAccess {
                owner,
                is_anonymous: row.is_anonymous,
            };
            if access::authorize(&actor, Action::View, Some(&target)).is_allow() {
                allowed.push(id);
            }
        }
        anyhow::Ok(allowed)
    })
    .await;

    match result {
        Ok(Ok(allowed)) => allowed,
        Ok(Err(e)) => {
            warn!("subscription authorization failed: {}", e);
            Vec::new()
        }
        Err(e) => {
            warn!("spawn_blocking join error: {}", e);
            Vec::new()
        }
    }
}
