use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;

use hedgedesk_core::progress::{LogLevel, ProgressSink, TracingProgress};

use crate::AppState;

const LOG_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

/// Fans progress out to every `/ws/logs` subscriber, and to tracing.
#[derive(Debug, Clone)]
pub struct LogHub {
    tx: broadcast::Sender<LogEvent>,
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new(LOG_CHANNEL_CAPACITY)
    }
}

impl LogHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.tx.subscribe()
    }
}

impl ProgressSink for LogHub {
    fn log(&self, level: LogLevel, message: &str) {
        TracingProgress.log(level, message);
        // No subscribers is fine.
        let _ = self.tx.send(LogEvent {
            level,
            message: message.to_string(),
        });
    }
}

pub async fn ws_logs(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.logs.subscribe();
    ws.on_upgrade(move |socket| stream_logs(socket, rx))
}

async fn stream_logs(socket: WebSocket, mut rx: broadcast::Receiver<LogEvent>) {
    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "log subscriber lagging; events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Client messages are ignored; reading only notices the close.
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }
}
