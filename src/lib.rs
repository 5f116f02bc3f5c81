//! Streaming chat relay that splits assistant text from inline widget data.
//!
//! The upstream model writes prose and, optionally, a `WIDGET_DATA:{...}`
//! object in the same text stream. [`relay`] forwards the prose as it
//! arrives and holds the widget back; [`client`] consumes the relayed
//! stream and turns it into message updates in a [`store::ChatStore`].
//! Both run the same [`splitter::StreamSplitter`].

pub mod app;
pub mod client;
pub mod config;
pub mod delta;
pub mod error;
pub mod events;
pub mod gateway;
pub mod health;
pub mod relay;
pub mod splitter;
pub mod sse;
pub mod state;
pub mod stop;
pub mod store;
pub mod token;
