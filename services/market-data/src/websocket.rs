//! WebSocket client transport
//!
//! Each connection gets a [`ClientHandle`] from the hub. A writer task
//! drains the handle's queue into the socket; the reader applies
//! subscribe/unsubscribe requests. When either side stops (socket closed,
//! write error, backpressure disconnect) the client is removed from every
//! channel.
//!
//! Protocol:
//!
//! ```text
//! → {"type":"subscribe","product_ids":["BTC-USD"],"channels":["ticker",{"name":"level2","product_ids":["ETH-USD"]}]}
//! ← {"type":"subscriptions","channels":[{"name":"ticker","product_ids":["BTC-USD"]},...]}
//! ← {"type":"error","message":"unknown feed: candles"}
//! ```

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use types::ids::{ProductId, UserId};

use crate::client::{ClientHandle, OutboundMessage};
use crate::error::HubError;
use crate::feeds::FeedType;
use crate::hub::BroadcastHub;
use crate::router::AppState;

/// Session token claims, as issued to the order gateway's callers.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub exp: usize,
}

/// A channel named on its own, or with its own product list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelSpec {
    Name(String),
    WithProducts {
        name: String,
        product_ids: Vec<ProductId>,
    },
}

/// Requests a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe {
        #[serde(default)]
        product_ids: Vec<ProductId>,
        channels: Vec<ChannelSpec>,
    },
    Unsubscribe {
        #[serde(default)]
        product_ids: Vec<ProductId>,
        channels: Vec<ChannelSpec>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSubscription {
    pub name: FeedType,
    pub product_ids: Vec<ProductId>,
}

/// Replies sent on the client's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Subscriptions { channels: Vec<ChannelSubscription> },
    Error { message: String },
}

/// Resolve channel specs into (feed, products) pairs before touching any state.
fn resolve(
    product_ids: &[ProductId],
    channels: &[ChannelSpec],
) -> Result<Vec<(FeedType, Vec<ProductId>)>, HubError> {
    channels
        .iter()
        .map(|spec| -> Result<(FeedType, Vec<ProductId>), HubError> {
            let (name, products) = match spec {
                ChannelSpec::Name(name) => (name, product_ids),
                ChannelSpec::WithProducts { name, product_ids } => (name, product_ids.as_slice()),
            };
            Ok((name.parse::<FeedType>()?, products.to_vec()))
        })
        .collect()
}

/// Apply one request and describe the client's subscriptions afterwards.
pub fn apply(
    hub: &BroadcastHub,
    client: &ClientHandle,
    message: ClientMessage,
) -> Result<ServerMessage, HubError> {
    match message {
        ClientMessage::Subscribe {
            product_ids,
            channels,
        } => {
            hub.subscribe_all_or_none(client, &resolve(&product_ids, &channels)?)?;
        }
        ClientMessage::Unsubscribe {
            product_ids,
            channels,
        } => {
            for (feed, products) in resolve(&product_ids, &channels)? {
                hub.unsubscribe(client.id(), feed, &products);
            }
        }
    }

    let channels = hub
        .subscriptions(client.id())
        .into_iter()
        .map(|(name, product_ids)| ChannelSubscription { name, product_ids })
        .collect();
    Ok(ServerMessage::Subscriptions { channels })
}

/// Parse and apply a text frame. Failures become an `error` reply.
pub fn handle_text(hub: &BroadcastHub, client: &ClientHandle, text: &str) -> ServerMessage {
    let result = serde_json::from_str::<ClientMessage>(text)
        .map_err(|e| HubError::Decode(e.to_string()))
        .and_then(|message| apply(hub, client, message));

    match result {
        Ok(reply) => reply,
        Err(err) => {
            debug!(client_id = client.id(), error = %err, "Rejected client request");
            ServerMessage::Error {
                message: err.to_string(),
            }
        }
    }
}

/// Extract the user from an optional bearer token.
///
/// No header means an anonymous client; a header that does not verify is
/// an error.
pub fn authenticate(headers: &HeaderMap, key: &DecodingKey) -> Result<Option<UserId>, String> {
    let Some(value) = headers.get("Authorization") else {
        return Ok(None);
    };
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| "Expected bearer token".to_string())?;

    decode::<Claims>(token, key, &Validation::default())
        .map(|data| Some(data.claims.sub))
        .map_err(|e| format!("Invalid token: {}", e))
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let user_id = match authenticate(&headers, &state.decoding_key) {
        Ok(user_id) => user_id,
        Err(reason) => return (StatusCode::UNAUTHORIZED, reason).into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, user_id))
}

async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>, user_id: Option<UserId>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client, mut outbound) = hub.connect(user_id);
    let client_id = client.id();
    info!(client_id, authenticated = user_id.is_some(), "Websocket client connected");

    // Writer: queue → socket
    let writer = client.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = writer.disconnect_requested() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }

                message = outbound.recv() => {
                    let Some(message) = message else { break };
                    if ws_tx
                        .send(Message::Text(message.payload.to_string().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    });

    // Reader: requests → hub
    loop {
        tokio::select! {
            _ = &mut send_task => break,

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text(&hub, &client, text.as_str());
                        match serde_json::to_string(&reply) {
                            Ok(json) => {
                                if let Err(err) = client.try_deliver(OutboundMessage::control(json)) {
                                    debug!(client_id, error = %err, "Reply not queued");
                                }
                            }
                            Err(e) => warn!(client_id, error = %e, "Failed to encode reply"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(client_id, error = %e, "Websocket read failed");
                        break;
                    }
                }
            }
        }
    }

    hub.disconnect(client_id);
    send_task.abort();
    info!(client_id, "Websocket client disconnected");
}
