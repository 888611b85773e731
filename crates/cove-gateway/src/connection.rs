use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use cove_types::events::{AckResult, CommandFrame, ServerEvent};

use crate::handlers::{self, Ctx};
use crate::state::GatewayState;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a WebSocket connection whose JWT was already validated at the HTTP
/// upgrade layer, so the loop starts straight at Ready.
pub async fn handle_connection_authenticated(
    socket: WebSocket,
    state: GatewayState,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let (session_id, mut session_rx) = state.registry.register_session(user_id).await;

    let ready = ServerEvent::Ready {
        user_id,
        username: username.clone(),
    };
    let Ok(text) = serde_json::to_string(&ready) else {
        state.registry.remove_session(session_id).await;
        return;
    };
    if sender.send(Message::Text(text.into())).await.is_err() {
        state.registry.remove_session(session_id).await;
        return;
    }

    // Replay who is already online so this client starts with a full roster.
    for online_id in state.presence.online_users().await {
        if online_id == user_id {
            continue;
        }
        let db = state.db.clone();
        let looked_up = tokio::task::spawn_blocking(move || db.get_username(online_id)).await;
        let Ok(Ok(Some(online_name))) = looked_up else {
            continue;
        };
        let event = ServerEvent::UserOnline {
            user_id: online_id,
            username: online_name,
        };
        let Ok(text) = serde_json::to_string(&event) else {
            continue;
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
            state.registry.remove_session(session_id).await;
            return;
        }
    }

    // Now mark ourselves online (first session broadcasts to everyone else).
    if state.presence.add_session(user_id, session_id).await {
        state
            .registry
            .broadcast_all(ServerEvent::UserOnline {
                user_id,
                username: username.clone(),
            })
            .await;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward session events -> client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = session_rx.recv() => {
                    let Some(event) = result else { break };
                    let Ok(text) = serde_json::to_string(&event) else { continue };
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

    // Read commands from client.
    let recv_state = state.clone();
    let ctx = Ctx {
        session: session_id,
        user_id,
        username: username.clone(),
    };
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    match serde_json::from_str::<CommandFrame>(&text) {
                        Ok(frame) => {
                            handlers::handle_frame(&recv_state, &ctx, frame).await;
                        }
                        Err(e) => {
                            warn!(
                                "{} ({}) bad command: {} -- raw: {}",
                                ctx.username,
                                ctx.user_id,
                                e,
                                clip_for_log(&text)
                            );
                            // Best-effort correlation for the reject.
                            let seq = serde_json::from_str::<serde_json::Value>(&text)
                                .ok()
                                .and_then(|v| v.get("seq").and_then(|s| s.as_u64()));
                            recv_state
                                .registry
                                .emit_to_session(
                                    ctx.session,
                                    ServerEvent::Ack {
                                        seq,
                                        result: AckResult::err("Invalid command payload."),
                                    },
                                )
                                .await;
                        }
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.registry.remove_session(session_id).await;
    if state.presence.remove_session(user_id, session_id).await {
        state
            .registry
            .broadcast_all(ServerEvent::UserOffline { user_id })
            .await;
    }

    info!("{} ({}) disconnected from gateway", username, user_id);
}

/// Clip an untrusted frame for logging without splitting a UTF-8 sequence.
fn clip_for_log(text: &str) -> &str {
    let mut end = text.len().min(200);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_clipping_respects_char_boundaries() {
        assert_eq!(clip_for_log("hello"), "hello");

        // An emoji straddling the clip point is dropped whole.
        let mut long = "a".to_owned();
        for _ in 0..60 {
            long.push('\u{1F44D}');
        }
        // Byte 200 falls inside the 50th emoji; the clip walks back to 197.
        let clipped = clip_for_log(&long);
        assert_eq!(clipped.len(), 197);
        assert_eq!(clipped.chars().count(), 50);
    }
}
