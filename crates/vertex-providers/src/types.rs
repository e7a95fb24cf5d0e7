//! Provider configuration and chat types.

use serde::{Deserialize, Serialize};

use crate::formats::ApiFormat;

/// One entry of the provider connection document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Header carrying the credential, e.g. `Authorization` or `x-api-key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,
    /// Prepended to the key with a space, e.g. `Bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Inline key for runtime-registered providers. Used when the env var is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_value: Option<String>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_format: Option<ApiFormat>,
}

impl ProviderConfig {
    /// Explicit format, else detected from the base URL.
    pub fn format(&self) -> ApiFormat {
        self.api_format
            .unwrap_or_else(|| ApiFormat::detect(&self.base_url))
    }
}

/// Public view of a provider, without credentials.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub base_url: String,
    pub models: Vec<String>,
    pub api_format: ApiFormat,
    pub has_credentials: bool,
    /// Whether a client is currently hydrated.
    pub live: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}
