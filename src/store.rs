use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

use crate::gateway::HistoryEntry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

static NULL: Value = Value::Null;

/// A widget as the model wrote it: `type` plus the rest of the payload's
/// fields at the same level, so a consumer reads `widget.data.items`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    #[serde(rename = "type")]
    pub widget_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Widget {
    /// Shown while the payload is still streaming: `{"type": .., "data": null}`.
    pub fn placeholder(widget_type: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("data".to_string(), Value::Null);
        Self {
            widget_type: widget_type.into(),
            fields,
        }
    }

    /// Widget from a parsed payload. `widget_type` wins over the payload's
    /// own `type`; a non-object payload lands under `data`.
    pub fn from_payload(widget_type: impl Into<String>, payload: Value) -> Self {
        let mut fields = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        fields.remove("type");
        Self {
            widget_type: widget_type.into(),
            fields,
        }
    }

    pub fn data(&self) -> &Value {
        self.fields.get("data").unwrap_or(&NULL)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<Widget>,
    #[serde(default)]
    pub widget_loading: bool,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            widget: None,
            widget_loading: false,
        }
    }
}

/// Field-level update for one message. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub widget: Option<Option<Widget>>,
    pub widget_loading: Option<bool>,
}

impl MessagePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_widget(mut self, widget: Option<Widget>) -> Self {
        self.widget = Some(widget);
        self
    }

    pub fn with_loading(mut self, loading: bool) -> Self {
        self.widget_loading = Some(loading);
        self
    }

    fn apply(&self, message: &mut Message) {
        if let Some(content) = &self.content {
            message.content = content.clone();
        }
        if let Some(widget) = &self.widget {
            message.widget = widget.clone();
        }
        if let Some(loading) = self.widget_loading {
            message.widget_loading = loading;
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StoreOp {
    Append(Message),
    Patch { id: String, patch: MessagePatch },
    Clear,
}

/// Shared chat transcript. Cloning gives another handle to the same list.
#[derive(Clone)]
pub struct ChatStore {
    messages: Arc<RwLock<Vec<Message>>>,
    updates: broadcast::Sender<StoreOp>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
            updates,
        }
    }

    /// Receive every op applied from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreOp> {
        self.updates.subscribe()
    }

    /// Apply one op. Returns false when a patch names an unknown id.
    pub fn apply(&self, op: StoreOp) -> bool {
        let applied = {
            let mut messages = self.messages.write().unwrap_or_else(PoisonError::into_inner);
            match &op {
                StoreOp::Append(message) => {
                    messages.push(message.clone());
                    true
                }
                StoreOp::Patch { id, patch } => match messages.iter_mut().find(|m| &m.id == id) {
                    Some(message) => {
                        patch.apply(message);
                        true
                    }
                    None => false,
                },
                StoreOp::Clear => {
                    messages.clear();
                    true
                }
            }
        };
        if applied {
            // no subscribers is fine
            let _ = self.updates.send(op);
        }
        applied
    }

    pub fn append(&self, message: Message) {
        self.apply(StoreOp::Append(message));
    }

    pub fn patch(&self, id: &str, patch: MessagePatch) -> bool {
        self.apply(StoreOp::Patch {
            id: id.to_string(),
            patch,
        })
    }

    pub fn clear(&self) {
        self.apply(StoreOp::Clear);
    }

    pub fn get(&self, id: &str) -> Option<Message> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The transcript in the shape the relay expects as conversation history.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }
}
