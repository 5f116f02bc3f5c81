use serde_json::Value;

/// Where the text fragment sits inside one event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaShape {
    /// `{"text": "..."}`, as written by the relay.
    Simple,
    /// Bedrock/Anthropic streaming envelope, fragment at `delta.text`.
    Gateway,
}

impl DeltaShape {
    /// Pull the text fragment out of a raw `data:` payload.
    ///
    /// Returns `None` for payloads that are not JSON, lack the field, or
    /// carry an empty fragment. None of these are errors: the event simply
    /// contributes no text.
    pub fn extract(self, payload: &str) -> Option<String> {
        let value: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Skipping malformed event payload: {}", e);
                return None;
            }
        };
        let text = match self {
            Self::Simple => value.get("text"),
            Self::Gateway => value.get("delta").and_then(|d| d.get("text")),
        };
        text.and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(ToOwned::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_shape_reads_text() {
        assert_eq!(
            DeltaShape::Simple.extract(r#"{"text":"Hi"}"#),
            Some("Hi".to_string())
        );
    }

    #[test]
    fn gateway_shape_reads_nested_delta() {
        let payload = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
        assert_eq!(DeltaShape::Gateway.extract(payload), Some("Hi".to_string()));
        // the simple reader does not look inside the envelope
        assert_eq!(DeltaShape::Simple.extract(payload), None);
    }

    #[test]
    fn events_without_text_are_skipped() {
        assert_eq!(
            DeltaShape::Gateway.extract(r#"{"type":"message_start","message":{}}"#),
            None
        );
        assert_eq!(DeltaShape::Simple.extract(r#"{"text":""}"#), None);
        assert_eq!(DeltaShape::Simple.extract(r#"{"text":42}"#), None);
    }

    #[test]
    fn malformed_payload_is_skipped() {
        assert_eq!(DeltaShape::Simple.extract("{not json"), None);
        assert_eq!(DeltaShape::Gateway.extract("[DONE"), None);
    }
}
