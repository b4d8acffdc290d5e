use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::{ChangeFilter, FilterColumn, RealtimeClientMessage, RealtimeServerMessage};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::auth::verify_token;
use crate::{
    error::AppError,
    realtime::{Subscription, FILES_TABLE},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RealtimeParams {
    pub token: Option<String>,
}

/// Upgrade to a realtime socket; the token comes from `?token=`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<RealtimeParams>,
) -> Result<impl IntoResponse, AppError> {
    let token = params
        .token
        .ok_or_else(|| AppError::AuthError("Missing token".to_string()))?;
    let claims = verify_token(&token, &state.config.auth.jwt_secret)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims.sub)))
}

/// Inbox filters are private to their owner; session filters are open
fn may_subscribe(filter: &ChangeFilter, user_id: &str) -> bool {
    match filter.column {
        FilterColumn::SessionId => true,
        FilterColumn::ReceiverId => filter.value == user_id,
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = Uuid::new_v4();

    // Bounded queue; the hub drops changes rather than wait on a slow client
    let (tx, mut rx) = mpsc::channel::<RealtimeServerMessage>(state.config.realtime.channel_capacity);
    state.realtime.register(connection_id, tx);

    // Task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode realtime message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    tracing::info!("Realtime client connected: {} (user {})", connection_id, user_id);

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = match serde_json::from_str::<RealtimeClientMessage>(&text) {
            Ok(RealtimeClientMessage::Subscribe {
                channel,
                table,
                event,
                filter,
            }) => {
                if table != FILES_TABLE {
                    RealtimeServerMessage::error(format!("Unknown table: {}", table))
                } else if !may_subscribe(&filter, &user_id) {
                    tracing::warn!("{} denied subscription to {}", user_id, filter);
                    RealtimeServerMessage::error(format!("Not allowed to subscribe to {}", filter))
                } else {
                    state.realtime.subscribe(Subscription {
                        connection_id,
                        channel: channel.clone(),
                        event,
                        filter,
                    });
                    tracing::debug!("{} active subscriptions", state.realtime.subscription_count());
                    RealtimeServerMessage::Subscribed { channel }
                }
            }
            Ok(RealtimeClientMessage::Unsubscribe { channel }) => {
                state.realtime.unsubscribe(connection_id, &channel);
                RealtimeServerMessage::Unsubscribed { channel }
            }
            Ok(RealtimeClientMessage::Heartbeat) => RealtimeServerMessage::Heartbeat,
            Err(e) => {
                tracing::warn!("Failed to parse realtime message: {}", e);
                RealtimeServerMessage::error(format!("Invalid message: {}", e))
            }
        };

        state.realtime.send_to(&connection_id, reply).await;
    }

    // Cleanup
    state.realtime.unregister(&connection_id);
    send_task.abort();
    tracing::info!("Realtime client disconnected: {}", connection_id);
}
