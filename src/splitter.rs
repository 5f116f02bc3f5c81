//! Splits a model's token stream into display text and an inline widget.
//!
//! The model may write `WIDGET_DATA:{...}` somewhere in its answer. Text
//! before the marker is shown as it streams; everything from the marker on
//! is held back and parsed as JSON once the stream ends. A delta carrying
//! `WIDGET_LOADING:<type>` is a hint that a widget is on its way and never
//! becomes part of the text.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::events::SplitEvent;

pub const DATA_SENTINEL: &str = "WIDGET_DATA:";
pub const LOADING_SENTINEL: &str = "WIDGET_LOADING:";

static LOADING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"WIDGET_LOADING:([A-Za-z0-9_]+)").expect("static loading pattern")
});

const TYPE_KEY: &str = "\"type\":\"";

static TYPE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""type":"([^"]+)""#).expect("static type pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetPhase {
    #[default]
    None,
    Loading,
    Buffering,
    Resolved,
    Failed,
}

/// Per-request splitting state. One instance per in-flight stream.
#[derive(Debug, Default)]
pub struct StreamSplitter {
    // every non-loading delta, in order
    full_text: String,
    // what callers get to show
    text: String,
    phase: WidgetPhase,
    widget_type: Option<String>,
    loading_type: Option<String>,
    // byte offset of the first data sentinel in `full_text`
    sentinel_at: Option<usize>,
    // where the next search for the widget type starts
    type_scan_from: usize,
    data: Option<Value>,
    finished: bool,
}

impl StreamSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitized text: never contains the data sentinel or anything after it.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Raw concatenation of every non-loading delta.
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn phase(&self) -> WidgetPhase {
        self.phase
    }

    /// Type read from the buffered widget JSON. Set at most once.
    pub fn widget_type(&self) -> Option<&str> {
        self.widget_type.as_deref()
    }

    /// Type announced by the loading signal, if any.
    pub fn loading_type(&self) -> Option<&str> {
        self.loading_type.as_deref()
    }

    pub fn sentinel_offset(&self) -> Option<usize> {
        self.sentinel_at
    }

    /// Everything from the data sentinel onward, while buffering.
    pub fn widget_buffer(&self) -> Option<&str> {
        self.sentinel_at.map(|pos| &self.full_text[pos..])
    }

    pub fn widget_data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Feed one text delta.
    pub fn push(&mut self, delta: &str) -> Vec<SplitEvent> {
        if delta.is_empty() || self.finished {
            return Vec::new();
        }

        if delta.contains(LOADING_SENTINEL) {
            return self.loading_signal(delta).into_iter().collect();
        }

        let scanned = self.full_text.len();
        self.full_text.push_str(delta);

        if self.sentinel_at.is_some() {
            // The buffer is re-derived from `full_text`, so only the type
            // needs another look.
            return self
                .detect_type()
                .map(|widget_type| SplitEvent::WidgetTypeKnown { widget_type })
                .into_iter()
                .collect();
        }

        // Earlier text was already searched; only a marker reaching into
        // this delta can be new.
        let from = floor_char_boundary(
            &self.full_text,
            scanned.saturating_sub(DATA_SENTINEL.len() - 1),
        );
        match self.full_text[from..].find(DATA_SENTINEL) {
            Some(offset) => vec![self.start_buffering(from + offset)],
            None => {
                self.text.push_str(delta);
                vec![SplitEvent::TextUpdated {
                    text: self.text.clone(),
                    delta: delta.to_string(),
                }]
            }
        }
    }

    /// End of stream. Resolves or abandons a pending widget.
    ///
    /// Returns `None` when no widget was ever signalled, or when called a
    /// second time.
    pub fn finish(&mut self) -> Option<SplitEvent> {
        if self.finished {
            return None;
        }
        self.finished = true;

        if !matches!(self.phase, WidgetPhase::Loading | WidgetPhase::Buffering) {
            return None;
        }

        let span = self
            .sentinel_at
            .and_then(|pos| payload_span(&self.full_text, pos).map(|json| (pos, json)));

        let event = match span {
            None => {
                tracing::warn!("Widget signalled but no data object arrived");
                self.fail()
            }
            Some((pos, json)) => match serde_json::from_str::<Value>(&self.full_text[json.clone()]) {
                Ok(data) => self.resolve(pos, json, data),
                Err(e) => {
                    tracing::warn!("Failed to parse widget data: {}", e);
                    self.fail()
                }
            },
        };

        self.sentinel_at = None;
        Some(event)
    }

    fn loading_signal(&mut self, delta: &str) -> Option<SplitEvent> {
        let caps = LOADING_PATTERN.captures(delta)?;
        let widget_type = caps[1].to_string();
        tracing::debug!("Widget loading signal: {}", widget_type);

        if self.phase == WidgetPhase::None {
            self.phase = WidgetPhase::Loading;
        }
        if self.loading_type.is_none() {
            self.loading_type = Some(widget_type.clone());
        }
        Some(SplitEvent::WidgetLoading { widget_type })
    }

    fn start_buffering(&mut self, pos: usize) -> SplitEvent {
        tracing::debug!("Widget data detected at byte {}", pos);
        self.sentinel_at = Some(pos);
        self.phase = WidgetPhase::Buffering;
        // Deltas shown before the marker was complete may have carried part
        // of it; the prefix is authoritative from here on.
        self.text = self.full_text[..pos].trim().to_string();
        SplitEvent::WidgetDetected {
            text: self.text.clone(),
            widget_type: self.detect_type(),
        }
    }

    /// Returns the type only the first time it is found.
    fn detect_type(&mut self) -> Option<String> {
        if self.widget_type.is_some() {
            return None;
        }
        let from = self.type_scan_from.max(self.sentinel_at?);
        let region = &self.full_text[from..];
        let Some(caps) = TYPE_PATTERN.captures(region) else {
            // A later match starts either at an unclosed `"type":"` or in the
            // last few bytes, where the key itself may still be arriving.
            let open = region
                .rfind(TYPE_KEY)
                .filter(|&i| !region[i + TYPE_KEY.len()..].contains('"'));
            self.type_scan_from = match open {
                Some(i) => from + i,
                None => floor_char_boundary(
                    &self.full_text,
                    self.full_text.len().saturating_sub(TYPE_KEY.len() - 1),
                )
                .max(from),
            };
            return None;
        };
        let found = caps[1].to_string();
        self.widget_type = Some(found.clone());
        Some(found)
    }

    fn resolve(&mut self, pos: usize, json: Range<usize>, data: Value) -> SplitEvent {
        let mut text = self.full_text[..pos].to_string();
        text.push_str(&self.full_text[json.end..]);
        self.text = text.trim().to_string();

        if self.widget_type.is_none() {
            self.widget_type = data.get("type").and_then(Value::as_str).map(ToOwned::to_owned);
        }
        self.phase = WidgetPhase::Resolved;
        self.data = Some(data.clone());

        SplitEvent::WidgetResolved {
            text: self.text.clone(),
            widget_type: self.widget_type.clone().or_else(|| self.loading_type.clone()),
            data,
        }
    }

    fn fail(&mut self) -> SplitEvent {
        self.phase = WidgetPhase::Failed;
        SplitEvent::WidgetFailed {
            text: self.text.clone(),
        }
    }
}

/// Byte range of the JSON object after the sentinel at `pos`: from the
/// opening brace to the last closing brace in the text.
fn payload_span(full_text: &str, pos: usize) -> Option<Range<usize>> {
    let after = pos + DATA_SENTINEL.len();
    let rest = &full_text[after..];
    let start = after + (rest.len() - rest.trim_start().len());
    if !full_text[start..].starts_with('{') {
        return None;
    }
    let end = start + full_text[start..].rfind('}')?;
    Some(start..end + 1)
}

/// Largest char boundary in `text` at or below `index`.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Length of the longest suffix of `text` that is a proper prefix of the
/// data sentinel.
pub fn partial_sentinel_len(text: &str) -> usize {
    (1..DATA_SENTINEL.len())
        .rev()
        .find(|&n| text.ends_with(&DATA_SENTINEL[..n]))
        .unwrap_or(0)
}
