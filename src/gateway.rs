//! Upstream AI gateway: request payload and the streaming call.

use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::error::RelayError;
use crate::state::AppState;
use crate::store::MessageRole;

/// One earlier turn, as sent by the chat client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct GatewayPayload {
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<GatewayMessage>,
}

#[derive(Debug, Serialize)]
pub struct GatewayMessage {
    pub role: &'static str,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

pub fn build_payload(
    chat: &ChatConfig,
    message: &str,
    history: &[HistoryEntry],
    custom_system_prompt: Option<&str>,
) -> GatewayPayload {
    GatewayPayload {
        anthropic_version: chat.anthropic_version.clone(),
        max_tokens: chat.max_tokens,
        system: system_prompt(&chat.system_prompt, custom_system_prompt),
        messages: vec![GatewayMessage {
            role: "user",
            content: vec![ContentBlock {
                kind: "text",
                text: user_message(message, history),
            }],
        }],
    }
}

fn system_prompt(base: &str, custom: Option<&str>) -> String {
    match custom.map(str::trim).filter(|c| !c.is_empty()) {
        Some(custom) => format!("{base}\n\n**CUSTOM INSTRUCTIONS:**\n{custom}"),
        None => base.to_string(),
    }
}

fn user_message(message: &str, history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return message.to_string();
    }
    let context = history
        .iter()
        .map(|entry| format!("{}: {}", entry.role.label(), entry.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Previous conversation context:\n{context}\n\nCurrent question: {message}")
}

/// The gateway's streaming variant of an `/invoke` URL.
pub fn streaming_url(url: &str) -> String {
    url.replacen("/invoke", "/invoke-with-response-stream", 1)
}

/// Send `payload` upstream and return the response once its status is known
/// to be successful. The body is left unread for the caller to stream.
pub async fn open_stream(
    state: &AppState,
    payload: &GatewayPayload,
) -> Result<reqwest::Response, RelayError> {
    let gateway = &state.config.gateway;
    let url = gateway.url.as_deref().ok_or_else(|| {
        tracing::error!("Missing required environment variable: AI_GATEWAY_URL");
        RelayError::MissingGatewayUrl
    })?;

    let token = state.tokens.token().inspect_err(|e| {
        tracing::error!("Token generation error: {}", e);
    })?;

    let url = streaming_url(url);
    tracing::debug!("Calling AI gateway at {}", url);

    let mut request = state
        .http
        .post(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .header(reqwest::header::AUTHORIZATION, format!("bearer {token}"))
        .json(payload);
    for (name, value) in [
        ("X-Atlassian-UseCaseId", &gateway.use_case_id),
        ("X-Atlassian-CloudId", &gateway.cloud_id),
        ("X-Atlassian-UserId", &gateway.user_id),
    ] {
        if let Some(value) = value {
            request = request.header(name, value);
        }
    }

    let response = request.send().await.inspect_err(|e| {
        tracing::error!("Failed to reach AI gateway: {}", e);
    })?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(500).collect();
        tracing::error!("AI Gateway error: {} {}", status, snippet);
        return Err(RelayError::UpstreamStatus { status, body });
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_url_rewrites_first_invoke() {
        assert_eq!(
            streaming_url("https://gw.example/v1/model/invoke"),
            "https://gw.example/v1/model/invoke-with-response-stream"
        );
        assert_eq!(streaming_url("https://gw.example/chat"), "https://gw.example/chat");
    }

    #[test]
    fn payload_without_history_is_the_bare_message() {
        let chat = ChatConfig::default();
        let payload = build_payload(&chat, "What are my tasks?", &[], None);
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(v["max_tokens"], 2000);
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"][0]["type"], "text");
        assert_eq!(v["messages"][0]["content"][0]["text"], "What are my tasks?");
        assert_eq!(v["system"], chat.system_prompt);
    }

    #[test]
    fn history_is_folded_into_user_text() {
        let history = vec![
            HistoryEntry {
                role: MessageRole::User,
                content: "hi".into(),
            },
            HistoryEntry {
                role: MessageRole::Assistant,
                content: "hello!".into(),
            },
        ];
        let text = user_message("and now?", &history);
        assert_eq!(
            text,
            "Previous conversation context:\nUser: hi\nAssistant: hello!\n\nCurrent question: and now?"
        );
    }

    #[test]
    fn custom_instructions_are_appended() {
        assert_eq!(system_prompt("base", Some("be brief")), "base\n\n**CUSTOM INSTRUCTIONS:**\nbe brief");
        assert_eq!(system_prompt("base", Some("  ")), "base");
        assert_eq!(system_prompt("base", None), "base");
    }

    #[test]
    fn history_entries_read_client_messages() {
        let entry: HistoryEntry = serde_json::from_str(
            r#"{"id":"1","type":"assistant","content":"x","widgetLoading":false}"#,
        )
        .unwrap();
        assert_eq!(entry.role, MessageRole::Assistant);
    }
}
