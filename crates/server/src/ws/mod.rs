// Board WebSocket endpoint.
//
// `GET /ws?token=<access token>` upgrades, authenticates, then speaks the
// envelope protocol from `corkboard_common::protocol::ws`. Credential
// failures close the socket with a policy violation before any `connected`
// acknowledgement; the client treats that close code as "refresh your
// token" rather than a network fault.

pub mod broadcast;
pub mod handlers;
pub mod registry;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::sync::mpsc;

use corkboard_common::{
    protocol::ws::{
        decode_client_message, encode_server_message, ConnectedPayload, Decoded, ServerMessage,
        CLOSE_CODE_POLICY_VIOLATION,
    },
    types::UserPublic,
};

use crate::{
    auth::tokens::{TokenError, TokenService},
    embedding::Embeddings,
    error::{request_id_from_headers_or_generate, with_request_id_scope},
    store::Store,
};

use broadcast::BroadcastPlanner;
use registry::ConnectionRegistry;

#[derive(Clone)]
pub struct WsState {
    store: Store,
    tokens: TokenService,
    registry: ConnectionRegistry,
    planner: BroadcastPlanner,
    embeddings: Embeddings,
}

pub fn router(store: Store, tokens: TokenService, embeddings: Embeddings) -> Router {
    let registry = ConnectionRegistry::new();
    let planner = BroadcastPlanner::new(registry.clone(), store.clone());
    let state = WsState { store, tokens, registry, planner, embeddings };

    Router::new().route("/ws", get(ws_upgrade)).with_state(state)
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_upgrade(
    State(state): State<WsState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let request_id = request_id_from_headers_or_generate(&headers);

    ws.on_upgrade(move |socket| async move {
        with_request_id_scope(request_id, handle_socket(state, query.token, socket)).await;
    })
}

/// Resolves the access token to a live user. The claims alone are not
/// trusted: the user is re-resolved so tokens for deleted accounts die here.
async fn authenticate(
    tokens: &TokenService,
    store: &Store,
    token: Option<&str>,
) -> Result<UserPublic, &'static str> {
    let Some(token) = token else {
        return Err("authentication required");
    };

    let claims = tokens.verify_access(token).map_err(|error| match error {
        TokenError::ExpiredCredential => "token expired",
        TokenError::WrongCredentialType => "wrong token type",
        _ => "invalid token",
    })?;

    match store.user_public_by_id(claims.user.id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err("user not found"),
        Err(error) => {
            tracing::error!(error = %error, "user lookup failed during websocket handshake");
            Err("authentication unavailable")
        }
    }
}

async fn handle_socket(state: WsState, token: Option<String>, mut socket: WebSocket) {
    let user = match authenticate(&state.tokens, &state.store, token.as_deref()).await {
        Ok(user) => user,
        Err(reason) => {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_CODE_POLICY_VIOLATION,
                    reason: reason.into(),
                })))
                .await;
            return;
        }
    };

    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
    let connection_id =
        state.registry.insert(user.id, &user.display_name, outbound_sender).await;

    let connected =
        ServerMessage::Connected(ConnectedPayload { connection_id, user: user.clone() });
    if send_server_message(&mut socket, &connected).await.is_err() {
        state.registry.remove(connection_id).await;
        return;
    }
    tracing::info!(connection_id = %connection_id, user_id = user.id, "websocket connected");

    loop {
        tokio::select! {
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(encoded) => {
                        if socket.send(Message::Text(encoded.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw_message)) => {
                        let inbound = match decode_client_message(&raw_message) {
                            Ok(Decoded::Message(message)) => message,
                            Ok(Decoded::Unknown { message_type }) => {
                                tracing::warn!(
                                    connection_id = %connection_id,
                                    message_type = %message_type,
                                    "ignoring unknown message type",
                                );
                                continue;
                            }
                            Err(error) => {
                                let reply = ServerMessage::Error { message: error.to_string() };
                                if send_server_message(&mut socket, &reply).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };

                        let reply = match handlers::handle_message(
                            &state.store,
                            &state.embeddings,
                            &state.planner,
                            &user,
                            inbound,
                        )
                        .await
                        {
                            Ok(Some(reply)) => reply,
                            Ok(None) => continue,
                            Err(error) => error.envelope(),
                        };

                        if send_server_message(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    state.registry.remove(connection_id).await;
    tracing::info!(connection_id = %connection_id, user_id = user.id, "websocket disconnected");
}

async fn send_server_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), ()> {
    let encoded = encode_server_message(message).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}
