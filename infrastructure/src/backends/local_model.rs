//! Local model backend.
//!
//! Keeps one persistent WebSocket connection to a local inference service.
//! Requests are JSON frames carrying an echoed `reply` context; the service
//! pushes results asynchronously, so a background reader task owns the read
//! half for the life of the connection and feeds the correlation queue.
//!
//! The service signals end-of-stream with a textual sentinel rather than a
//! flag; it is translated into a terminal fragment, never delivered as
//! answer content.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use vigil_application::{ChatBackend, RelaySender};
use vigil_domain::{
    ActionId, AnswerFragment, BackendDescriptor, ChannelId, CorrelationTag, ModelKey,
    PromptRequest, RelayItem,
};

/// Backend key of the local model adapter.
pub const LOCAL_MODEL_KEY: &str = "LOCALMODEL";

/// End-of-stream sentinel the inference service appends to each answer.
const END_SENTINEL: &str = "\n\n<end>";

/// Models the local service may have installed.
const MODELS: &[(&str, &str)] = &[
    ("alpaca.7B", "Alpaca model, 7 billion parameters"),
    ("llama.7B", "LLaMA model, 7 billion parameters"),
    ("llama.13B", "LLaMA model, 13 billion parameters"),
    ("llama.30B", "LLaMA model, 30 billion parameters"),
];

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

pub struct LocalModelBackend {
    descriptor: BackendDescriptor,
    url: String,
    relay: RelaySender,
    connected: Arc<AtomicBool>,
    writer: tokio::sync::Mutex<Option<WsWriter>>,
}

impl LocalModelBackend {
    pub fn new(relay: RelaySender, url: impl Into<String>) -> Self {
        Self {
            descriptor: BackendDescriptor {
                key: LOCAL_MODEL_KEY.into(),
                display_name: "Local model serving service".to_string(),
                passthrough: false,
                private_key_required: false,
            },
            url: url.into(),
            relay,
            connected: Arc::new(AtomicBool::new(false)),
            writer: tokio::sync::Mutex::new(None),
        }
    }

    async fn send_request(&self, request: &ServiceRequest<'_>) -> bool {
        let text = match serde_json::to_string(request) {
            Ok(text) => text,
            Err(e) => {
                warn!("local model: could not encode request: {e}");
                return false;
            }
        };
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            warn!("local model: no open connection");
            return false;
        };
        if let Err(e) = writer.send(Message::Text(text)).await {
            warn!("local model: send failed: {e}");
            return false;
        }
        true
    }
}

#[async_trait]
impl ChatBackend for LocalModelBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn model_title(&self, model: &ModelKey) -> Option<String> {
        Some(
            MODELS
                .iter()
                .find(|(key, _)| *key == model.as_str())
                .map_or_else(|| model.to_string(), |(_, title)| (*title).to_string()),
        )
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) {
        if self.is_connected() {
            warn!("local model: already connected");
            return;
        }
        let (stream, _) = match connect_async(self.url.as_str()).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!("local model: connection to {} failed: {e}", self.url);
                return;
            }
        };
        let (mut write, mut read) = stream.split();

        // Handshake: the service acknowledges by keeping the socket open.
        let hello = ServiceRequest {
            method: "hello",
            model: None,
            prompt: None,
            reply: None,
        };
        if let Ok(text) = serde_json::to_string(&hello)
            && let Err(e) = write.send(Message::Text(text)).await
        {
            warn!("local model: handshake failed: {e}");
            return;
        }

        *self.writer.lock().await = Some(write);
        self.connected.store(true, Ordering::SeqCst);
        info!("local model: connected to {}", self.url);

        // The reader task owns the read half until the connection closes.
        let connected = Arc::clone(&self.connected);
        let relay = self.relay.clone();
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(item) = translate_event(text.as_str())
                            && relay.send(item).is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("local model: read error: {e}");
                        break;
                    }
                }
            }
            connected.store(false, Ordering::SeqCst);
            info!("local model: connection closed");
        });
    }

    async fn disconnect(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.send(Message::Close(None)).await;
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn request_available_models(&self) {
        if !self.is_connected() {
            warn!("local model: cannot list models, not connected");
            return;
        }
        let request = ServiceRequest {
            method: "installed",
            model: None,
            prompt: None,
            reply: Some(ReplyContext::Models),
        };
        self.send_request(&request).await;
    }

    async fn send_prompt(&self, request: PromptRequest) {
        if !self.is_connected() {
            warn!("local model: cannot process prompt, not connected");
            return;
        }
        let frame = ServiceRequest {
            method: "generate",
            model: Some(request.model.as_str()),
            prompt: Some(&request.prompt),
            reply: Some(ReplyContext::answer(&request)),
        };
        if !self.send_request(&frame).await {
            // The request never reached the service; close the turn so the
            // caller is not left waiting.
            let _ = self.relay.send(RelayItem::Answer(AnswerFragment::terminal(
                request.tag,
                LOCAL_MODEL_KEY,
                request.model,
            )));
        }
    }
}

// -- Wire types ----------------------------------------------------------------

#[derive(Serialize)]
struct ServiceRequest<'a> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplyContext>,
}

/// Correlation context echoed back by the service with every result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ReplyContext {
    Models,
    Answer {
        action_id: ActionId,
        channel: ChannelId,
        question_idx: usize,
        conversation_id: String,
        model: ModelKey,
    },
}

impl ReplyContext {
    fn answer(request: &PromptRequest) -> Self {
        Self::Answer {
            action_id: request.tag.action_id.clone(),
            channel: request.tag.channel.clone(),
            question_idx: request.tag.question_idx,
            conversation_id: request.tag.conversation_id.clone(),
            model: request.model.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ServiceEvent {
    response: Option<String>,
    reply: Option<ReplyContext>,
}

/// Translate one pushed service event into a queue item.
///
/// Returns `None` for frames that carry nothing to relay; malformed frames
/// are logged and skipped, they never tear the connection down.
fn translate_event(text: &str) -> Option<RelayItem> {
    let event: ServiceEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("local model: undecodable event: {e}");
            return None;
        }
    };
    let Some(response) = event.response else {
        warn!("local model: event without response");
        return None;
    };
    match event.reply {
        Some(ReplyContext::Models) => {
            if response == END_SENTINEL {
                return None;
            }
            Some(RelayItem::Discovery {
                backend: LOCAL_MODEL_KEY.into(),
                model: response.into(),
            })
        }
        Some(ReplyContext::Answer {
            action_id,
            channel,
            question_idx,
            conversation_id,
            model,
        }) => {
            let tag = CorrelationTag {
                action_id,
                channel,
                question_idx,
                conversation_id,
            };
            if response == END_SENTINEL {
                debug!("local model: end of stream for {}", tag.action_id);
                Some(RelayItem::Answer(AnswerFragment::terminal(
                    tag,
                    LOCAL_MODEL_KEY,
                    model,
                )))
            } else {
                Some(RelayItem::Answer(AnswerFragment::delta(
                    tag,
                    LOCAL_MODEL_KEY,
                    model,
                    response,
                )))
            }
        }
        None => {
            warn!("local model: event without reply context");
            None
        }
    }
}
