use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

use crate::error::ConfigError;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Rovo, an AI teammate with access to your organization's work, people, and context.

You can show an interactive work items widget when the user asks about their tasks, work items, priorities, or what is assigned to them.

To show the widget, write one or two sentences of introduction, then on the next line output the widget data with no extra commentary in between:
WIDGET_DATA:{\"type\":\"work-items\",\"data\":{\"assignedTo\":\"<name>\",\"items\":[{\"key\":\"PROJ-123\",\"summary\":\"<summary>\",\"status\":\"In Progress|To Do|In Review|Blocked\",\"dueDate\":\"<date>\",\"priority\":\"High|Medium|Low\"}]}}

Only show the widget when the user is asking about their work items. For anything else, answer in plain text. Use earlier messages in the conversation for context.";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub debug: bool,
    pub gateway: GatewayConfig,
    pub asap: AsapConfig,
    pub chat_config: ChatConfig,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub url: Option<String>,
    pub use_case_id: Option<String>,
    pub cloud_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AsapConfig {
    pub issuer: Option<String>,
    pub kid: Option<String>,
    #[serde(skip_serializing)] // Never echo the key
    pub private_key: Option<String>,
    pub expiry_secs: i64,
}

impl Default for AsapConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            kid: None,
            private_key: None,
            expiry_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub keep_alive_secs: u64,
    /// Relay `WIDGET_LOADING:<type>` to the client instead of dropping it.
    pub forward_loading_signal: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            anthropic_version: "bedrock-2023-05-31".to_string(),
            max_tokens: 2000,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            keep_alive_secs: 15,
            forward_loading_signal: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            debug: false,
            gateway: GatewayConfig::default(),
            asap: AsapConfig::default(),
            chat_config: ChatConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `.env.local` then `.env` if present, then read the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenvy::from_filename(".env.local").is_ok() {
            tracing::info!(".env.local loaded");
        }
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(v) = var("PORT") {
            config.port = parse(&v, "PORT")?;
        }
        config.debug = var("DEBUG").is_some_and(|v| v == "true");

        config.gateway = GatewayConfig {
            url: var("AI_GATEWAY_URL"),
            use_case_id: var("AI_GATEWAY_USE_CASE_ID"),
            cloud_id: var("AI_GATEWAY_CLOUD_ID"),
            user_id: var("AI_GATEWAY_USER_ID"),
        };

        config.asap.issuer = var("ASAP_ISSUER").or_else(|| var("AI_GATEWAY_USE_CASE_ID"));
        config.asap.kid = var("ASAP_KID");
        config.asap.private_key = var("ASAP_PRIVATE_KEY");
        if let Some(v) = var("ASAP_EXPIRY_SECS") {
            config.asap.expiry_secs = parse(&v, "ASAP_EXPIRY_SECS")?;
        }

        let chat = &mut config.chat_config;
        if let Some(v) = var("ANTHROPIC_VERSION") {
            chat.anthropic_version = v;
        }
        if let Some(v) = var("MAX_TOKENS") {
            chat.max_tokens = parse(&v, "MAX_TOKENS")?;
        }
        if let Some(v) = var("SYSTEM_PROMPT") {
            chat.system_prompt = v;
        }
        if let Some(v) = var("KEEP_ALIVE_SECS") {
            chat.keep_alive_secs = parse(&v, "KEEP_ALIVE_SECS")?;
        }
        if let Some(v) = var("FORWARD_LOADING_SIGNAL") {
            chat.forward_loading_signal = v.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
