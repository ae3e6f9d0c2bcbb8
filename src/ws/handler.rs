//! The WebSocket gateway. Thin by design: authenticate once, translate
//! client events into engine calls, and pump room broadcasts back out.
//! Errors go only to the socket that caused them.

use crate::auth::{JwtManager, SocketIdentity};
use crate::engine::{EngineError, LeaveOutcome, TableEngine, TableEvent};
use crate::game::betting::PlayerAction;
use crate::game::error::GameError;
use crate::ws::messages::{ActionKind, ClientMessage, ServerMessage};
use crate::ws::rooms::RoomBus;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct GatewayState {
    pub engine: Arc<TableEngine>,
    pub rooms: Arc<RoomBus>,
    pub jwt_manager: Arc<JwtManager>,
}

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    let identity = match state.jwt_manager.identify(&query.token) {
        Ok(identity) => identity,
        Err(_) => {
            return (axum::http::StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

async fn handle_socket(socket: WebSocket, identity: SocketIdentity, state: Arc<GatewayState>) {
    let SocketIdentity { user_id, username } = identity;
    tracing::info!("Socket connected: {} ({})", username, user_id);
    let (mut sender, mut receiver) = socket.split();

    // The private room exists for the whole connection; hole cards arrive
    // here and nowhere else.
    let mut user_rx = state.rooms.subscribe_user(&user_id);
    let mut current_table_id: Option<String> = None;
    let mut table_rx: Option<broadcast::Receiver<ServerMessage>> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => msg,
                            Err(e) => {
                                tracing::debug!("Unparseable frame from {}: {}", user_id, e);
                                continue;
                            }
                        };

                        let replies = handle_client_message(
                            client_msg,
                            &user_id,
                            &state,
                            &mut current_table_id,
                            &mut table_rx,
                        )
                        .await;

                        for reply in replies {
                            if let Ok(text) = serde_json::to_string(&reply) {
                                let _ = sender.send(Message::Text(text)).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    _ => {}
                }
            }

            broadcast_msg = async {
                match &mut table_rx {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match broadcast_msg {
                    Ok(msg) => {
                        if let Ok(text) = serde_json::to_string(&msg) {
                            let _ = sender.send(Message::Text(text)).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Socket {} lagged {} table events", user_id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        table_rx = None;
                    }
                }
            }

            private_msg = user_rx.recv() => {
                match private_msg {
                    Ok(msg) => {
                        if let Ok(text) = serde_json::to_string(&msg) {
                            let _ = sender.send(Message::Text(text)).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Socket {} lagged {} private events", user_id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::info!("Socket disconnected: {} ({})", username, user_id);
    disconnect_cleanup(&state, &user_id, current_table_id.as_deref()).await;
}

/// One active table per player: a dropped socket is cashed out of every
/// table except the one its room was following (the away policy owns that
/// seat).
async fn disconnect_cleanup(state: &Arc<GatewayState>, user_id: &str, current_table: Option<&str>) {
    let seats = match crate::db::tables::seats_for_user(state.engine.pool(), user_id).await {
        Ok(seats) => seats,
        Err(e) => {
            tracing::warn!("Disconnect cleanup query failed for {}: {}", user_id, e);
            return;
        }
    };
    for seat in seats {
        if Some(seat.table_id.as_str()) == current_table {
            continue;
        }
        match state.engine.leave(&seat.table_id, user_id).await {
            Ok(outcome) => {
                tracing::info!(
                    "Disconnect: user {} removed from table {} ({:?})",
                    user_id,
                    seat.table_id,
                    outcome
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Disconnect cleanup failed for {} on table {}: {}",
                    user_id,
                    seat.table_id,
                    e
                );
            }
        }
    }
}

fn error_event(e: EngineError) -> ServerMessage {
    ServerMessage::Event(TableEvent::Error {
        code: e.code().to_string(),
        message: e.to_string(),
    })
}

async fn handle_client_message(
    msg: ClientMessage,
    user_id: &str,
    state: &Arc<GatewayState>,
    current_table_id: &mut Option<String>,
    table_rx: &mut Option<broadcast::Receiver<ServerMessage>>,
) -> Vec<ServerMessage> {
    match msg {
        ClientMessage::Join { table_id } => {
            match state.engine.join_view(&table_id, user_id).await {
                Ok((snapshot, private)) => {
                    // Subscribe before replying so no broadcast can slip
                    // between the snapshot and the first room event.
                    *table_rx = Some(state.rooms.subscribe_table(&table_id));
                    *current_table_id = Some(table_id);

                    let mut replies = vec![ServerMessage::State(snapshot)];
                    if let Some(cards) = private {
                        replies.push(ServerMessage::PrivateCards(cards));
                    }
                    replies
                }
                Err(e) => vec![error_event(e)],
            }
        }

        ClientMessage::Sit {
            table_id,
            seat_no,
            buy_in_amount,
        } => match state.engine.sit(&table_id, user_id, seat_no, buy_in_amount).await {
            Ok(()) => vec![],
            Err(e) => vec![error_event(e)],
        },

        ClientMessage::Leave { table_id } => match state.engine.leave(&table_id, user_id).await {
            Ok(LeaveOutcome::CashedOut(_)) => {
                if current_table_id.as_deref() == Some(table_id.as_str()) {
                    *current_table_id = None;
                    *table_rx = None;
                }
                vec![]
            }
            Ok(LeaveOutcome::Pending) => vec![ServerMessage::Event(TableEvent::LeavePending {
                table_id,
            })],
            Err(e) => vec![error_event(e)],
        },

        ClientMessage::Rebuy { table_id, amount } => {
            match state.engine.rebuy(&table_id, user_id, amount).await {
                Ok(_) => vec![],
                Err(e) => vec![error_event(e)],
            }
        }

        ClientMessage::SitOut { table_id } => {
            match state.engine.sit_out(&table_id, user_id).await {
                Ok(()) => vec![],
                Err(e) => vec![error_event(e)],
            }
        }

        ClientMessage::SitIn { table_id } => {
            match state.engine.sit_in(&table_id, user_id).await {
                Ok(()) => vec![],
                Err(e) => vec![error_event(e)],
            }
        }

        ClientMessage::Action {
            table_id,
            action,
            amount,
        } => {
            let action = match action {
                ActionKind::Fold => PlayerAction::Fold,
                ActionKind::Check => PlayerAction::Check,
                ActionKind::Call => PlayerAction::Call,
                ActionKind::Raise => match amount {
                    Some(amount) if amount > 0 => PlayerAction::Raise(amount),
                    _ => {
                        return vec![error_event(EngineError::Game(GameError::InvalidAmount))];
                    }
                },
            };
            match state.engine.handle_action(&table_id, user_id, action).await {
                Ok(()) => vec![],
                Err(e) => vec![error_event(e)],
            }
        }
    }
}
