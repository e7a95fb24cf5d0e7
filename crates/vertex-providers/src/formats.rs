//! Provider wire formats.
//!
//! Each format is a pair of pure functions: `render` builds the request for a
//! conversation, `extract` pulls the completion text out of the response.
//! The table is fixed at compile time and selected by `ApiFormat`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::ChatMessage;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    #[serde(alias = "openai-compatible")]
    OpenAi,
    Anthropic,
    Google,
}

impl ApiFormat {
    /// Infer the format from a provider base URL. OpenAI-compatible otherwise.
    pub fn detect(base_url: &str) -> Self {
        if base_url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else if base_url.contains("generativelanguage.googleapis.com") {
            ApiFormat::Google
        } else {
            ApiFormat::OpenAi
        }
    }

    pub fn strategy(self) -> &'static FormatStrategy {
        match self {
            ApiFormat::OpenAi => &OPENAI,
            ApiFormat::Anthropic => &ANTHROPIC,
            ApiFormat::Google => &GOOGLE,
        }
    }
}

/// A request ready to post relative to the provider's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRequest {
    pub path: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

impl RenderedRequest {
    /// Canonical wire text of the request body.
    pub fn canonical_text(&self) -> String {
        self.body.to_string()
    }
}

pub struct FormatStrategy {
    pub render: fn(&[ChatMessage], &str) -> RenderedRequest,
    pub extract: fn(&Value) -> Option<String>,
}

static OPENAI: FormatStrategy = FormatStrategy {
    render: render_openai,
    extract: extract_openai,
};

static ANTHROPIC: FormatStrategy = FormatStrategy {
    render: render_anthropic,
    extract: extract_anthropic,
};

static GOOGLE: FormatStrategy = FormatStrategy {
    render: render_google,
    extract: extract_google,
};

fn plain(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect()
}

fn render_openai(messages: &[ChatMessage], model: &str) -> RenderedRequest {
    RenderedRequest {
        path: "/chat/completions".into(),
        headers: Vec::new(),
        body: json!({"model": model, "messages": plain(messages)}),
    }
}

fn extract_openai(response: &Value) -> Option<String> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
}

/// System messages move to the top-level `system` field.
fn render_anthropic(messages: &[ChatMessage], model: &str) -> RenderedRequest {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .collect();
    let conversation: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role != "system")
        .cloned()
        .collect();

    let mut body = json!({
        "model": model,
        "messages": plain(&conversation),
        "max_tokens": ANTHROPIC_MAX_TOKENS,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n"));
    }

    RenderedRequest {
        path: "/messages".into(),
        headers: vec![("anthropic-version", ANTHROPIC_VERSION.to_string())],
        body,
    }
}

fn extract_anthropic(response: &Value) -> Option<String> {
    response["content"]
        .as_array()?
        .iter()
        .find(|block| block["type"].as_str().unwrap_or("text") == "text")
        .and_then(|block| block["text"].as_str())
        .map(str::to_string)
}

/// Gemini has no system role; system turns are sent as user turns.
fn render_google(messages: &[ChatMessage], model: &str) -> RenderedRequest {
    let contents: Vec<Value> = messages
        .iter()
        .map(|m| {
            let role = if m.role == "assistant" || m.role == "model" {
                "model"
            } else {
                "user"
            };
            json!({"role": role, "parts": [{"text": m.content}]})
        })
        .collect();

    RenderedRequest {
        path: format!("/{}:generateContent", model),
        headers: Vec::new(),
        body: json!({"contents": contents}),
    }
}

fn extract_google(response: &Value) -> Option<String> {
    response["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::new("system", "Be terse."),
            ChatMessage::new("user", "Hello"),
            ChatMessage::new("assistant", "Hi"),
            ChatMessage::new("user", "Status?"),
        ]
    }

    #[test]
    fn test_detect() {
        assert_eq!(ApiFormat::detect("https://api.anthropic.com/v1"), ApiFormat::Anthropic);
        assert_eq!(
            ApiFormat::detect("https://generativelanguage.googleapis.com/v1beta/models"),
            ApiFormat::Google
        );
        assert_eq!(ApiFormat::detect("https://api.x.ai/v1"), ApiFormat::OpenAi);
        assert_eq!(ApiFormat::detect("http://localhost:11434/v1"), ApiFormat::OpenAi);
    }

    #[test]
    fn test_openai_pair() {
        let strategy = ApiFormat::OpenAi.strategy();
        let request = (strategy.render)(&conversation(), "gpt-4o-mini");
        assert_eq!(request.path, "/chat/completions");
        assert_eq!(request.body["messages"].as_array().unwrap().len(), 4);
        assert_eq!(request.body["messages"][0]["role"], "system");

        let response = json!({"choices": [{"message": {"role": "assistant", "content": "ok"}}]});
        assert_eq!((strategy.extract)(&response).as_deref(), Some("ok"));
        assert_eq!((strategy.extract)(&json!({"error": "x"})), None);
    }

    #[test]
    fn test_anthropic_pair() {
        let strategy = ApiFormat::Anthropic.strategy();
        let request = (strategy.render)(&conversation(), "claude-3-5-haiku");
        assert_eq!(request.path, "/messages");
        assert_eq!(request.body["system"], "Be terse.");
        assert_eq!(request.body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(request.body["max_tokens"], 4096);
        assert!(request.headers.iter().any(|(k, _)| *k == "anthropic-version"));

        let response = json!({"content": [{"type": "text", "text": "fine"}]});
        assert_eq!((strategy.extract)(&response).as_deref(), Some("fine"));
    }

    #[test]
    fn test_google_pair() {
        let strategy = ApiFormat::Google.strategy();
        let request = (strategy.render)(&conversation(), "gemini-1.5-flash");
        assert_eq!(request.path, "/gemini-1.5-flash:generateContent");
        let roles: Vec<&str> = request.body["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "user", "model", "user"]);

        let response = json!({"candidates": [{"content": {"parts": [{"text": "up"}]}}]});
        assert_eq!((strategy.extract)(&response).as_deref(), Some("up"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let strategy = ApiFormat::Anthropic.strategy();
        let a = (strategy.render)(&conversation(), "m");
        let b = (strategy.render)(&conversation(), "m");
        assert_eq!(a.canonical_text(), b.canonical_text());
    }

    #[test]
    fn test_format_serde() {
        let f: ApiFormat = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(f, ApiFormat::Anthropic);
        assert_eq!(serde_json::to_string(&ApiFormat::OpenAi).unwrap(), "\"openai\"");
    }
}
