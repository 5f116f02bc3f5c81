use crate::config::AppConfig;
use crate::stop::StopRegistry;
use crate::token::{AsapSigner, TokenSource};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub http: reqwest::Client,
    pub tokens: Arc<dyn TokenSource>,
    pub streams: StopRegistry,
}

impl AppState {
    /// State that signs ASAP tokens from the configured key.
    pub fn new(config: AppConfig) -> Self {
        let signer = AsapSigner::new(config.asap.clone());
        Self::with_token_source(config, Arc::new(signer))
    }

    pub fn with_token_source(config: AppConfig, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            config: Arc::new(config),
            // one connection pool for all upstream calls
            http: reqwest::Client::new(),
            tokens,
            streams: StopRegistry::default(),
        }
    }
}
