//! Server side of the chat stream.
//!
//! Reads the gateway's event stream, pulls text deltas out of its envelope
//! and re-emits them to the browser as `data: {"text": ...}` frames. In
//! widget mode the widget JSON is never streamed piecemeal: it goes out as
//! one final frame just before `[DONE]`, for the client to parse.

use crate::delta::DeltaShape;
use crate::error::RelayError;
use crate::events::SplitEvent;
use crate::gateway::{self, HistoryEntry};
use crate::splitter::{LOADING_SENTINEL, StreamSplitter, partial_sentinel_len};
use crate::sse::{DONE_MARKER, SseDecoder, SseLine};
use crate::state::AppState;
use crate::stop::{self, StopGuard};
use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse, Sse,
        sse::{Event, KeepAlive},
    },
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{error, info};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub conversation_history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    pub custom_system_prompt: Option<String>,
    #[serde(default, alias = "session_id")]
    pub session_id: Option<String>,
}

#[derive(Deserialize)]
pub struct StreamRequest {
    #[serde(default)]
    pub message: String,
}

/// Widget-aware relay used by the chat panel.
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, RelayError> {
    if req.message.is_empty() {
        return Err(RelayError::MissingMessage);
    }
    info!("Received chat request ({} chars)", req.message.len());

    let history = req.conversation_history.unwrap_or_default();
    let payload = gateway::build_payload(
        &state.config.chat_config,
        &req.message,
        &history,
        req.custom_system_prompt.as_deref(),
    );
    let response = gateway::open_stream(&state, &payload).await?;

    let guard = req.session_id.as_deref().map(|id| state.streams.register(id));
    let forwarder = Forwarder::Widget(WidgetRelay::new(
        state.config.chat_config.forward_loading_signal,
    ));
    Ok(sse_response(
        state.config.chat_config.keep_alive_secs,
        relay_stream(response.bytes_stream(), guard, forwarder),
    ))
}

/// Plain relay without widget detection, for embedded chat components.
pub async fn gateway_stream_handler(
    State(state): State<AppState>,
    Json(req): Json<StreamRequest>,
) -> Result<impl IntoResponse, RelayError> {
    if req.message.is_empty() {
        return Err(RelayError::MissingMessage);
    }
    info!("Gateway stream endpoint called");

    let payload = gateway::build_payload(&state.config.chat_config, &req.message, &[], None);
    let response = gateway::open_stream(&state, &payload).await?;
    Ok(sse_response(
        state.config.chat_config.keep_alive_secs,
        relay_stream(response.bytes_stream(), None, Forwarder::Passthrough),
    ))
}

fn sse_response<S>(keep_alive_secs: u64, stream: S) -> impl IntoResponse
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    let interval = Duration::from_secs(keep_alive_secs);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(interval))
}

pub fn text_event(text: &str) -> Event {
    Event::default().data(serde_json::json!({ "text": text }).to_string())
}

pub fn done_event() -> Event {
    Event::default().data(DONE_MARKER)
}

/// Decide what text leaves the server for each gateway delta.
pub enum Forwarder {
    Widget(WidgetRelay),
    Passthrough,
}

impl Forwarder {
    fn push(&mut self, delta: String) -> Vec<String> {
        match self {
            Self::Widget(relay) => relay.push(&delta),
            Self::Passthrough => vec![delta],
        }
    }

    fn finish(&mut self) -> Vec<String> {
        match self {
            Self::Widget(relay) => relay.finish(),
            Self::Passthrough => Vec::new(),
        }
    }
}

/// Forwards text as soon as it is known to precede any widget, and keeps
/// everything from `WIDGET_DATA:` on for a single closing frame.
pub struct WidgetRelay {
    splitter: StreamSplitter,
    // bytes of `full_text` already sent
    forwarded: usize,
    forward_loading: bool,
}

impl WidgetRelay {
    pub fn new(forward_loading: bool) -> Self {
        Self {
            splitter: StreamSplitter::new(),
            forwarded: 0,
            forward_loading,
        }
    }

    pub fn push(&mut self, delta: &str) -> Vec<String> {
        let mut out = Vec::new();
        for event in self.splitter.push(delta) {
            if let SplitEvent::WidgetLoading { widget_type } = event
                && self.forward_loading
            {
                out.push(format!("{LOADING_SENTINEL}{widget_type}"));
            }
        }

        let full = self.splitter.full_text();
        // A trailing "WIDGET_DA" may be the start of the marker; hold it.
        let safe_end = match self.splitter.sentinel_offset() {
            Some(pos) => pos,
            None => full.len() - partial_sentinel_len(full),
        };
        if safe_end > self.forwarded {
            out.push(full[self.forwarded..safe_end].to_string());
            self.forwarded = safe_end;
        }
        out
    }

    pub fn finish(&mut self) -> Vec<String> {
        let full = self.splitter.full_text();
        let tail = match self.splitter.widget_buffer() {
            Some(buffer) => {
                info!("Flushing buffered widget data ({} bytes)", buffer.len());
                buffer
            }
            None => &full[self.forwarded.min(full.len())..],
        };
        let out = if tail.is_empty() {
            Vec::new()
        } else {
            vec![tail.to_string()]
        };
        self.forwarded = full.len();
        out
    }
}

/// Turn the gateway byte stream into outbound events, ending with `[DONE]`.
///
/// A transport failure mid-stream is reported as an `error` event; a stop
/// request ends the read early. Either way buffered widget data is still
/// flushed before the terminator.
pub fn relay_stream<S, B>(
    bytes: S,
    mut guard: Option<StopGuard>,
    mut forwarder: Forwarder,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    async_stream::stream! {
        let mut bytes = std::pin::pin!(bytes);
        let mut decoder = SseDecoder::new();

        loop {
            let next = tokio::select! {
                chunk = bytes.next() => chunk,
                _ = stop::stopped(&mut guard) => {
                    info!("Relay stream stopped by user");
                    None
                }
            };
            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    error!("Stream error: {}", e);
                    yield Ok(Event::default().event("error").data(format!("Stream error: {e}")));
                    break;
                }
                None => break,
            };

            for line in decoder.push_chunk(chunk.as_ref()) {
                if let SseLine::Data(payload) = line
                    && let Some(delta) = DeltaShape::Gateway.extract(&payload)
                {
                    for text in forwarder.push(delta) {
                        yield Ok(text_event(&text));
                    }
                }
            }
            if decoder.is_done() {
                break;
            }
        }

        for line in decoder.finish() {
            if let SseLine::Data(payload) = line
                && let Some(delta) = DeltaShape::Gateway.extract(&payload)
            {
                for text in forwarder.push(delta) {
                    yield Ok(text_event(&text));
                }
            }
        }
        for text in forwarder.finish() {
            yield Ok(text_event(&text));
        }
        info!("Relay stream finished");
        yield Ok(done_event());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_all(deltas: &[&str]) -> Vec<String> {
        let mut relay = WidgetRelay::new(false);
        let mut out = Vec::new();
        for d in deltas {
            out.extend(relay.push(d));
        }
        out.extend(relay.finish());
        out
    }

    #[test]
    fn plain_text_is_forwarded_per_delta() {
        assert_eq!(relay_all(&["Hello", " there"]), vec!["Hello", " there"]);
    }

    #[test]
    fn widget_goes_out_as_one_final_frame() {
        let out = relay_all(&[
            "Here are your items.\n",
            "WIDGET_DATA:",
            "{\"type\":\"work-items\",",
            "\"items\":[]}",
        ]);
        assert_eq!(
            out,
            vec![
                "Here are your items.\n",
                "WIDGET_DATA:{\"type\":\"work-items\",\"items\":[]}",
            ]
        );
    }

    #[test]
    fn text_sharing_a_delta_with_the_marker_is_not_lost() {
        let out = relay_all(&["Sure. WIDGET_DATA:{\"type\":\"t\"}"]);
        assert_eq!(out, vec!["Sure. ", "WIDGET_DATA:{\"type\":\"t\"}"]);
    }

    #[test]
    fn partial_marker_is_held_until_resolved() {
        let out = relay_all(&["Look WIDG", "ET_DATA:{}"]);
        assert_eq!(out, vec!["Look ", "WIDGET_DATA:{}"]);

        // a false alarm is released once it stops looking like the marker
        let out = relay_all(&["NEW", "S today"]);
        assert_eq!(out, vec!["NE", "WS today"]);

        // and flushed at the end if the stream stops there
        let out = relay_all(&["ends with W"]);
        assert_eq!(out, vec!["ends with ", "W"]);
    }

    #[test]
    fn loading_signal_is_dropped_unless_enabled() {
        assert_eq!(relay_all(&["WIDGET_LOADING:hotels", "ok"]), vec!["ok"]);

        let mut relay = WidgetRelay::new(true);
        assert_eq!(relay.push("WIDGET_LOADING:hotels"), vec!["WIDGET_LOADING:hotels"]);
    }

    #[test]
    fn passthrough_forwards_the_marker_verbatim() {
        let mut forwarder = Forwarder::Passthrough;
        assert_eq!(forwarder.push("WIDGET_DA".into()), vec!["WIDGET_DA"]);
        assert!(forwarder.finish().is_empty());
    }
}
