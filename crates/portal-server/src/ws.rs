//! WebSocket handler for live notifications.
//!
//! A client opens `/ws` and sends `{"type":"subscribe","token":"…"}` with its
//! session token. From then on every notification created for that member
//! is pushed to the socket as it happens.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::auth;
use crate::models::Notification;
use crate::AppState;

/// WebSocket messages.
///
/// All messages use snake_case tag names for JSON serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Client authenticates the socket with a session token.
    Subscribe {
        /// Session token from `/api/auth/verify`.
        token: String,
    },
    /// Client stops receiving notifications.
    Unsubscribe,
    /// The subscription was accepted.
    Subscribed {
        /// The member the socket now follows.
        member_id: String,
    },
    /// A notification was created.
    Notification {
        /// Recipient of the notification.
        member_id: String,
        notification: Notification,
    },
    /// A client message was rejected.
    Error {
        message: String,
    },
}

/// Broadcast channel sender for WebSocket messages.
pub type WsBroadcast = broadcast::Sender<WsMessage>;

/// Creates a new broadcast channel for WebSocket messages.
///
/// Returns the sender half of the channel. The channel has a capacity of 100
/// messages before older messages are dropped.
pub fn create_broadcast() -> WsBroadcast {
    let (tx, _) = broadcast::channel(100);
    tx
}

/// Publish a notification to any socket subscribed for its recipient.
pub fn publish(broadcast: &WsBroadcast, notification: &Notification) {
    // No receivers just means nobody is connected
    let _ = broadcast.send(WsMessage::Notification {
        member_id: notification.member_id.clone(),
        notification: notification.clone(),
    });
}

/// Axum handler for WebSocket upgrade requests.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handles an established WebSocket connection.
///
/// Broadcast events are forwarded only while the socket is subscribed, and
/// only those addressed to the subscribed member. Replies to the client's own
/// messages go through a local channel so a single task owns the sink.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_broadcast.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<WsMessage>(8);

    let subscription = Arc::new(RwLock::new(None::<String>));
    let sub_clone = subscription.clone();

    let send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
                event = rx.recv() => match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WebSocket client lagged behind");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            if let WsMessage::Notification { member_id, .. } = &msg {
                if sub_clone.read().await.as_deref() != Some(member_id.as_str()) {
                    continue;
                }
            }

            let Ok(json) = serde_json::to_string(&msg) else {
                continue;
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let reply = match serde_json::from_str::<WsMessage>(&text) {
            Ok(WsMessage::Subscribe { token }) => match auth::resolve(&state.db, &token) {
                Ok(Some(current)) => {
                    let member_id = current.member.id;
                    *subscription.write().await = Some(member_id.clone());
                    tracing::debug!(%member_id, "WebSocket subscribed");
                    WsMessage::Subscribed { member_id }
                }
                Ok(None) => WsMessage::Error {
                    message: "invalid or expired session".to_string(),
                },
                Err(err) => {
                    tracing::error!(error = %err, "Failed to resolve WebSocket session");
                    WsMessage::Error {
                        message: "internal error".to_string(),
                    }
                }
            },
            Ok(WsMessage::Unsubscribe) => {
                *subscription.write().await = None;
                continue;
            }
            // Server-to-client messages are ignored when sent by a client
            Ok(_) => continue,
            Err(_) => WsMessage::Error {
                message: "unrecognized message".to_string(),
            },
        };
        if reply_tx.send(reply).await.is_err() {
            break;
        }
    }

    send_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(member_id: &str) -> Notification {
        Notification {
            id: "n1".to_string(),
            member_id: member_id.to_string(),
            kind: "consultation_started".to_string(),
            title: "Your visit has started".to_string(),
            body: "Join now".to_string(),
            link: Some("https://video.example.com/r".to_string()),
            read_at: None,
            created_at: "2025-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_subscribe_deserialization() {
        let json = r#"{"type":"subscribe","token":"abc-123"}"#;
        match serde_json::from_str::<WsMessage>(json).unwrap() {
            WsMessage::Subscribe { token } => assert_eq!(token, "abc-123"),
            other => panic!("Expected Subscribe message, got {:?}", other),
        }
    }

    #[test]
    fn test_unsubscribe_deserialization() {
        let msg: WsMessage = serde_json::from_str(r#"{"type":"unsubscribe"}"#).unwrap();
        assert!(matches!(msg, WsMessage::Unsubscribe));
    }

    #[test]
    fn test_notification_serialization() {
        let msg = WsMessage::Notification {
            member_id: "m1".to_string(),
            notification: notification("m1"),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"notification\""));
        assert!(json.contains("\"member_id\":\"m1\""));
        assert!(json.contains("\"kind\":\"consultation_started\""));
    }

    #[test]
    fn test_error_serialization() {
        let msg = WsMessage::Error {
            message: "nope".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"nope"}"#);
    }

    #[tokio::test]
    async fn test_publish_reaches_receivers() {
        let tx = create_broadcast();
        let mut rx = tx.subscribe();

        publish(&tx, &notification("m7"));

        match rx.recv().await.unwrap() {
            WsMessage::Notification { member_id, notification } => {
                assert_eq!(member_id, "m7");
                assert_eq!(notification.id, "n1");
            }
            other => panic!("Expected Notification, got {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_receivers() {
        let tx = create_broadcast();
        publish(&tx, &notification("m1"));
    }
}
