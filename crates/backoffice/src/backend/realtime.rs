//! Realtime change feed over Phoenix channels.
//!
//! Each subscription opens its own socket, joins one `postgres_changes`
//! channel and forwards matching row changes until it is dropped. The feed
//! task sends a heartbeat every 30 seconds and leaves the channel on
//! cancellation.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{
    BackendError, ChangeFeed, ChangeFilter, ChangeNotification, ChangeSubscription,
    PhoenixMessage, PostgresChangesPayload, directory_url,
};
use crate::config::BackendConfig;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const SERIALIZER_VERSION: &str = "1.0.0";
const NOTIFICATION_BUFFER: usize = 32;
const SCHEMA: &str = "public";

/// Client for the hosted realtime service.
#[derive(Clone)]
pub struct RealtimeClient {
    socket_url: Url,
    anon_key: SecretString,
    heartbeat: Duration,
}

impl RealtimeClient {
    /// Create a realtime client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket URL cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut socket_url = directory_url(&config.url, "realtime/v1/websocket")?;
        let scheme = if socket_url.scheme() == "https" { "wss" } else { "ws" };
        socket_url
            .set_scheme(scheme)
            .map_err(|()| BackendError::Realtime(format!("cannot use scheme {scheme}")))?;
        socket_url
            .query_pairs_mut()
            .append_pair("apikey", config.anon_key.expose_secret())
            .append_pair("vsn", SERIALIZER_VERSION);

        Ok(Self {
            socket_url,
            anon_key: config.anon_key.clone(),
            heartbeat: HEARTBEAT_INTERVAL,
        })
    }
}

#[async_trait]
impl ChangeFeed for RealtimeClient {
    async fn subscribe(
        &self,
        table: &str,
        filter: ChangeFilter,
        access_token: Option<&SecretString>,
    ) -> Result<ChangeSubscription, BackendError> {
        let (socket, _response) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| BackendError::Realtime(format!("connect failed: {e}")))?;
        let (mut sink, stream) = socket.split();

        let topic = format!("realtime:{table}_changes");
        let token = access_token.unwrap_or(&self.anon_key);
        let join = join_message(&topic, table, filter, token);

        sink.send(Message::Text(serde_json::to_string(&join)?))
            .await
            .map_err(|e| BackendError::Realtime(format!("join failed: {e}")))?;

        tracing::info!(topic = %topic, event = filter.event_name(), "Joined realtime channel");

        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let cancel = CancellationToken::new();

        tokio::spawn(run_channel(
            ChannelTask {
                topic,
                table: table.to_string(),
                filter,
                heartbeat: self.heartbeat,
            },
            sink,
            stream,
            tx,
            cancel.clone(),
        ));

        Ok(ChangeSubscription::new(rx, cancel))
    }
}

struct ChannelTask {
    topic: String,
    table: String,
    filter: ChangeFilter,
    heartbeat: Duration,
}

/// Build the `phx_join` frame for a `postgres_changes` channel.
fn join_message(
    topic: &str,
    table: &str,
    filter: ChangeFilter,
    access_token: &SecretString,
) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": filter.event_name(), "schema": SCHEMA, "table": table }
                ]
            },
            "access_token": access_token.expose_secret(),
        }),
        msg_ref: Some("1".to_string()),
        join_ref: Some("1".to_string()),
    }
}

fn control_message(topic: &str, event: &str, msg_ref: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: event.to_string(),
        payload: json!({}),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: None,
    }
}

/// Outcome of one incoming frame.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Change(ChangeNotification),
    JoinRejected(String),
    Closed,
    Ignored,
}

/// Interpret a text frame received on `task`'s socket.
fn parse_frame(text: &str, task: &ChannelTask) -> Frame {
    let message: PhoenixMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse realtime frame");
            return Frame::Ignored;
        }
    };

    if message.topic != task.topic {
        return Frame::Ignored;
    }

    match message.event.as_str() {
        "postgres_changes" => {
            match serde_json::from_value::<PostgresChangesPayload>(message.payload) {
                Ok(payload)
                    if payload.data.table == task.table && task.filter.matches(payload.data.kind) =>
                {
                    Frame::Change(ChangeNotification {
                        table: payload.data.table,
                        kind: payload.data.kind,
                    })
                }
                Ok(_) => Frame::Ignored,
                Err(e) => {
                    tracing::warn!(error = %e, "Unrecognized postgres_changes payload");
                    Frame::Ignored
                }
            }
        }
        "phx_reply" => {
            let status = message.payload.get("status").and_then(|s| s.as_str());
            if status == Some("error") && message.msg_ref.as_deref() == Some("1") {
                Frame::JoinRejected(message.payload.to_string())
            } else {
                Frame::Ignored
            }
        }
        "phx_close" | "phx_error" => Frame::Closed,
        _ => Frame::Ignored,
    }
}

/// Drive one channel until cancelled or the socket closes.
async fn run_channel<Si, St>(
    task: ChannelTask,
    mut sink: Si,
    mut stream: St,
    tx: mpsc::Sender<ChangeNotification>,
    cancel: CancellationToken,
) where
    Si: futures::Sink<Message> + Unpin + Send,
    Si::Error: std::fmt::Display,
    St: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin
        + Send,
{
    let mut heartbeat = tokio::time::interval(task.heartbeat);
    // First tick completes immediately
    heartbeat.tick().await;
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let leave = control_message(&task.topic, "phx_leave", next_ref);
                if let Ok(text) = serde_json::to_string(&leave) {
                    let _ = sink.send(Message::Text(text)).await;
                }
                let _ = sink.close().await;
                tracing::info!(topic = %task.topic, "Left realtime channel");
                break;
            }
            _ = heartbeat.tick() => {
                let beat = control_message("phoenix", "heartbeat", next_ref);
                next_ref += 1;
                let Ok(text) = serde_json::to_string(&beat) else { continue };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!(topic = %task.topic, error = %e, "Realtime heartbeat failed");
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match parse_frame(&text, &task) {
                    Frame::Change(notification) => {
                        tracing::debug!(table = %notification.table, kind = ?notification.kind, "Row change");
                        if tx.send(notification).await.is_err() {
                            break;
                        }
                    }
                    Frame::JoinRejected(reason) => {
                        tracing::error!(topic = %task.topic, reason = %reason, "Realtime join rejected");
                        break;
                    }
                    Frame::Closed => {
                        tracing::warn!(topic = %task.topic, "Realtime channel closed by server");
                        break;
                    }
                    Frame::Ignored => {}
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(topic = %task.topic, ?frame, "Realtime socket closed");
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by tungstenite
                }
                Some(Err(e)) => {
                    tracing::error!(topic = %task.topic, error = %e, "Realtime receive error");
                    break;
                }
                None => break,
            }
        }
    }
}
