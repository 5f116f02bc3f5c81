use serde::{Deserialize, Serialize};

/// Side effects produced by [`StreamSplitter`](crate::splitter::StreamSplitter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SplitEvent {
    // Plain text
    TextUpdated {
        text: String,
        delta: String,
    },

    // Loading signal, before any widget data
    WidgetLoading {
        widget_type: String,
    },

    // Data sentinel seen; `text` is the reconciled pre-widget text
    WidgetDetected {
        text: String,
        widget_type: Option<String>,
    },

    WidgetTypeKnown {
        widget_type: String,
    },

    // Terminal widget events
    WidgetResolved {
        text: String,
        widget_type: Option<String>,
        data: serde_json::Value,
    },

    WidgetFailed {
        text: String,
    },
}
