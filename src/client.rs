//! Chat client: sends a prompt to the relay and folds the streamed reply
//! into a [`ChatStore`].

use serde::Serialize;
use tracing::{debug, error, info};

use crate::delta::DeltaShape;
use crate::error::ClientError;
use crate::events::SplitEvent;
use crate::gateway::HistoryEntry;
use crate::splitter::StreamSplitter;
use crate::sse::{SseDecoder, SseLine};
use crate::store::{ChatStore, Message, MessagePatch, MessageRole, Widget};

/// Shown in place of the reply when the exchange fails.
pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequestBody<'a> {
    message: &'a str,
    conversation_history: &'a [HistoryEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_system_prompt: Option<&'a str>,
    session_id: &'a str,
}

pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    store: ChatStore,
    custom_system_prompt: Option<String>,
    session_id: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, store: ChatStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            custom_system_prompt: None,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_system_prompt = Some(prompt.into());
        self
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Run one exchange: record the prompt, stream the reply into a new
    /// assistant message and return that message's id.
    ///
    /// Failures never propagate. The assistant message gets
    /// [`FALLBACK_REPLY`] as its content instead.
    pub async fn send(&self, prompt: &str) -> String {
        let history = self.store.history();
        self.store.append(Message::new(MessageRole::User, prompt));

        let reply = Message::new(MessageRole::Assistant, "");
        let id = reply.id.clone();
        self.store.append(reply);

        if let Err(e) = self.stream_reply(&id, prompt, &history).await {
            error!("Chat stream failed: {}", e);
            self.store.patch(&id, MessagePatch::content(FALLBACK_REPLY));
        }
        id
    }

    /// Stream the relay's answer to `prompt` into the message `id`.
    pub async fn stream_reply(
        &self,
        id: &str,
        prompt: &str,
        history: &[HistoryEntry],
    ) -> Result<(), ClientError> {
        let body = ChatRequestBody {
            message: prompt,
            conversation_history: history,
            custom_system_prompt: self.custom_system_prompt.as_deref(),
            session_id: &self.session_id,
        };
        let mut response = self
            .http
            .post(self.endpoint("/api/rovo-chat"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let mut decoder = SseDecoder::new();
        let mut splitter = StreamSplitter::new();

        while let Some(chunk) = response.chunk().await? {
            for line in decoder.push_chunk(&chunk) {
                self.consume(id, &mut splitter, line);
            }
            if decoder.is_done() {
                break;
            }
        }
        for line in decoder.finish() {
            self.consume(id, &mut splitter, line);
        }

        if let Some(event) = splitter.finish() {
            apply_event(&self.store, id, event);
        }
        debug!("Reply {} complete, phase {:?}", id, splitter.phase());
        Ok(())
    }

    fn consume(&self, id: &str, splitter: &mut StreamSplitter, line: SseLine) {
        let SseLine::Data(payload) = line else {
            return;
        };
        let Some(delta) = DeltaShape::Simple.extract(&payload) else {
            return;
        };
        for event in splitter.push(&delta) {
            apply_event(&self.store, id, event);
        }
    }

    /// Ask the relay to stop this client's running stream. Returns false
    /// when nothing was running.
    pub async fn stop(&self) -> Result<bool, ClientError> {
        let response = self
            .http
            .post(self.endpoint("/api/stop"))
            .json(&serde_json::json!({ "session_id": self.session_id }))
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => {
                info!("Stop request accepted for {}", self.session_id);
                Ok(true)
            }
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(ClientError::Status {
                status: s.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Reflect one splitter event on the message `id`.
pub fn apply_event(store: &ChatStore, id: &str, event: SplitEvent) {
    let patch = match event {
        SplitEvent::TextUpdated { text, .. } => MessagePatch::content(text),
        SplitEvent::WidgetLoading { widget_type } => MessagePatch::default()
            .with_loading(true)
            .with_widget(Some(Widget::placeholder(widget_type))),
        SplitEvent::WidgetDetected { text, widget_type } => {
            let patch = MessagePatch::content(text).with_loading(true);
            match widget_type {
                Some(widget_type) => patch.with_widget(Some(Widget::placeholder(widget_type))),
                // keep whatever the loading signal put there
                None => patch,
            }
        }
        SplitEvent::WidgetTypeKnown { widget_type } => {
            MessagePatch::default().with_widget(Some(Widget::placeholder(widget_type)))
        }
        SplitEvent::WidgetResolved {
            text,
            widget_type,
            data,
        } => MessagePatch::content(text)
            .with_loading(false)
            .with_widget(Some(Widget::from_payload(
                widget_type.unwrap_or_default(),
                data,
            ))),
        SplitEvent::WidgetFailed { .. } => MessagePatch::default()
            .with_loading(false)
            .with_widget(None),
    };
    if !store.patch(id, patch) {
        debug!("Dropping update for unknown message {}", id);
    }
}
