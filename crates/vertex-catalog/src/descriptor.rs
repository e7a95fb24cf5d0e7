//! Registry descriptor parsing.
//!
//! Parameter count and context length are best-effort estimates read from
//! tags and the model id, with per-family defaults. They are not
//! authoritative.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use vertex_store::ModelRecord;

/// `7b`, `1.5B`, `350m` as a standalone token.
static PARAMS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9.])(\d+(?:\.\d+)?)([bm])(?:$|[^a-z0-9])").expect("params regex")
});

/// `8k`, `32k` as a standalone token.
static CONTEXT_K_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9.])(\d+)k(?:$|[^a-z0-9])").expect("context regex")
});

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)(k)?").expect("number regex"));

/// Libraries whose weights can be served by the local runtime.
const LOCAL_LIBRARIES: &[&str] = &["transformers", "sentence-transformers", "diffusers"];

const FAMILY_PARAMS: &[(&str, u64)] = &[
    ("gpt2", 124),
    ("mistral", 7000),
    ("llama", 7000),
    ("phi", 3800),
    ("gemma", 2000),
    ("qwen", 7000),
];

const FAMILY_CONTEXT: &[(&str, u64)] = &[("mistral", 8192), ("llama", 4096), ("gpt", 4096)];
const DEFAULT_CONTEXT: u64 = 2048;

/// Number of tags folded into the embedding text.
const EMBED_TAGS: usize = 5;

/// Parse a raw registry descriptor into a record without an embedding.
///
/// `requested_id` is used when the descriptor carries no id of its own.
pub fn parse_descriptor(requested_id: &str, data: &Value, now: i64) -> ModelRecord {
    let model_id = str_field(data, "modelId")
        .or_else(|| str_field(data, "id"))
        .unwrap_or(requested_id)
        .to_string();

    let model_name = model_id.rsplit('/').next().unwrap_or(&model_id).to_string();
    let author = str_field(data, "author")
        .map(str::to_string)
        .unwrap_or_else(|| match model_id.split_once('/') {
            Some((owner, _)) => owner.to_string(),
            None => String::new(),
        });

    let tags: Vec<String> = data
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let capability_tag = str_field(data, "pipeline_tag")
        .or_else(|| str_field(data, "capability_tag"))
        .unwrap_or("text-generation")
        .to_string();
    let library_name = str_field(data, "library_name")
        .unwrap_or("transformers")
        .to_string();

    let description = data
        .get("cardData")
        .and_then(|c| c.get("description"))
        .and_then(Value::as_str)
        .or_else(|| str_field(data, "description"))
        .filter(|d| !d.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} model by {}", capability_tag, author));

    ModelRecord {
        params_millions: estimate_params(&model_id, &tags),
        context_length: estimate_context(&model_id, &tags),
        cost_per_1k_tokens: declared_cost(data),
        is_local: LOCAL_LIBRARIES.contains(&library_name.as_str()),
        downloads: data.get("downloads").and_then(Value::as_u64).unwrap_or(0),
        likes: data.get("likes").and_then(Value::as_u64).unwrap_or(0),
        embedding: Vec::new(),
        last_updated: now,
        added_timestamp: now,
        model_id,
        model_name,
        author,
        description,
        tags,
        capability_tag,
        library_name,
    }
}

/// Text embedded for a record: name, description, and the first few tags.
pub fn embedding_text(record: &ModelRecord) -> String {
    let tags: Vec<&str> = record
        .tags
        .iter()
        .take(EMBED_TAGS)
        .map(String::as_str)
        .collect();
    format!("{} {} {}", record.model_name, record.description, tags.join(" "))
        .trim()
        .to_string()
}

fn str_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

/// Cost is zero unless the descriptor explicitly declares a paid tier.
fn declared_cost(data: &Value) -> f64 {
    data.get("cost_per_1k_tokens")
        .or_else(|| data.get("pricing").and_then(|p| p.get("cost_per_1k_tokens")))
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite() && *c > 0.0)
        .unwrap_or(0.0)
}

fn params_in(text: &str) -> Option<u64> {
    let caps = PARAMS_RE.captures(text)?;
    let number: f64 = caps.get(1)?.as_str().parse().ok()?;
    let millions = match caps.get(2)?.as_str() {
        "b" | "B" => number * 1000.0,
        _ => number,
    };
    Some(millions.round() as u64)
}

fn estimate_params(model_id: &str, tags: &[String]) -> u64 {
    tags.iter()
        .find_map(|t| params_in(t))
        .or_else(|| params_in(model_id))
        .unwrap_or_else(|| family_default(model_id, FAMILY_PARAMS, 0))
}

fn estimate_context(model_id: &str, tags: &[String]) -> u64 {
    let from_tag = tags
        .iter()
        .filter(|t| {
            let lower = t.to_lowercase();
            lower.contains("context") || lower.contains("ctx")
        })
        .find_map(|t| {
            let caps = NUMBER_RE.captures(t)?;
            let n: u64 = caps.get(1)?.as_str().parse().ok()?;
            Some(if caps.get(2).is_some() { n * 1024 } else { n })
        });

    from_tag
        .or_else(|| {
            CONTEXT_K_RE
                .captures(model_id)
                .and_then(|c| c.get(1)?.as_str().parse::<u64>().ok())
                .map(|k| k * 1024)
        })
        .unwrap_or_else(|| family_default(model_id, FAMILY_CONTEXT, DEFAULT_CONTEXT))
}

fn family_default(model_id: &str, table: &[(&str, u64)], fallback: u64) -> u64 {
    let lower = model_id.to_lowercase();
    table
        .iter()
        .find(|(family, _)| lower.contains(family))
        .map(|(_, v)| *v)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_descriptor() {
        let data = json!({
            "modelId": "mistralai/Mistral-7B-Instruct-v0.2",
            "author": "mistralai",
            "tags": ["transformers", "safetensors", "mistral", "text-generation", "conversational", "en"],
            "pipeline_tag": "text-generation",
            "library_name": "transformers",
            "downloads": 1_500_000,
            "likes": 2100,
            "cardData": {"description": "Instruction tuned Mistral"}
        });
        let record = parse_descriptor("ignored", &data, 100);
        assert_eq!(record.model_id, "mistralai/Mistral-7B-Instruct-v0.2");
        assert_eq!(record.model_name, "Mistral-7B-Instruct-v0.2");
        assert_eq!(record.author, "mistralai");
        assert_eq!(record.params_millions, 7000);
        assert_eq!(record.context_length, 8192);
        assert_eq!(record.cost_per_1k_tokens, 0.0);
        assert!(record.is_local);
        assert_eq!(record.downloads, 1_500_000);
        assert_eq!(record.description, "Instruction tuned Mistral");
        assert_eq!(record.last_updated, 100);
    }

    #[test]
    fn test_defaults_for_sparse_descriptor() {
        let record = parse_descriptor("acme/tiny-model", &json!({}), 0);
        assert_eq!(record.model_id, "acme/tiny-model");
        assert_eq!(record.author, "acme");
        assert_eq!(record.capability_tag, "text-generation");
        assert_eq!(record.library_name, "transformers");
        assert_eq!(record.description, "text-generation model by acme");
        assert_eq!(record.params_millions, 0);
        assert_eq!(record.context_length, 2048);
    }

    #[test]
    fn test_param_heuristics() {
        assert_eq!(estimate_params("Qwen/Qwen2-1.5B-Instruct", &[]), 1500);
        assert_eq!(estimate_params("facebook/opt-350m", &[]), 350);
        assert_eq!(estimate_params("meta-llama/Llama-2-13b-chat-hf", &[]), 13000);
        assert_eq!(estimate_params("Qwen/Qwen2.5-7B", &[]), 7000);
        assert_eq!(estimate_params("x/model", &["size:3b".to_string()]), 3000);
        // Family defaults when nothing parses.
        assert_eq!(estimate_params("openai-community/gpt2", &[]), 124);
        assert_eq!(estimate_params("microsoft/phi-2", &[]), 3800);
        assert_eq!(estimate_params("google/gemma-it", &[]), 2000);
        assert_eq!(estimate_params("bert-base-uncased", &[]), 0);
    }

    #[test]
    fn test_context_heuristics() {
        assert_eq!(estimate_context("x/model", &["context:32768".to_string()]), 32768);
        assert_eq!(estimate_context("x/model", &["ctx-8k".to_string()]), 8192);
        assert_eq!(estimate_context("mosaicml/mpt-7b-8k", &[]), 8192);
        assert_eq!(estimate_context("meta-llama/Llama-2-7b", &[]), 4096);
        assert_eq!(estimate_context("openai-community/gpt2", &[]), 4096);
        assert_eq!(estimate_context("bigscience/bloom", &[]), 2048);
    }

    #[test]
    fn test_declared_cost() {
        assert_eq!(declared_cost(&json!({"cost_per_1k_tokens": 0.002})), 0.002);
        assert_eq!(
            declared_cost(&json!({"pricing": {"cost_per_1k_tokens": 0.01}})),
            0.01
        );
        assert_eq!(declared_cost(&json!({"cost_per_1k_tokens": -1.0})), 0.0);
        assert_eq!(declared_cost(&json!({})), 0.0);
    }

    #[test]
    fn test_library_locality() {
        let remote = parse_descriptor("a/b", &json!({"library_name": "gguf"}), 0);
        assert!(!remote.is_local);
    }

    #[test]
    fn test_embedding_text_uses_first_five_tags() {
        let mut record = parse_descriptor("a/coder", &json!({"cardData": {"description": "writes code"}}), 0);
        record.tags = (1..=7).map(|i| format!("t{}", i)).collect();
        assert_eq!(embedding_text(&record), "coder writes code t1 t2 t3 t4 t5");
    }
}
