//! Catalog schema SQL.

/// One row per model id. `embedding` is a little-endian f32 blob of length D×4.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS models (
    model_id TEXT PRIMARY KEY,
    model_name TEXT NOT NULL,
    author TEXT,
    description TEXT,
    embedding BLOB NOT NULL,
    downloads INTEGER NOT NULL DEFAULT 0,
    likes INTEGER NOT NULL DEFAULT 0,
    tags_json TEXT,
    capability_tag TEXT NOT NULL,
    library_name TEXT,
    is_local INTEGER NOT NULL DEFAULT 0,
    cost_per_1k_tokens REAL NOT NULL DEFAULT 0.0,
    params_millions INTEGER NOT NULL DEFAULT 0,
    context_length INTEGER NOT NULL DEFAULT 0,
    last_updated INTEGER NOT NULL,
    added_timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_models_id ON models(model_id);
CREATE INDEX IF NOT EXISTS idx_models_capability ON models(capability_tag);
CREATE INDEX IF NOT EXISTS idx_models_cost ON models(cost_per_1k_tokens);
CREATE INDEX IF NOT EXISTS idx_models_params ON models(params_millions);

-- Requested ids the registry answered under a different canonical id.
CREATE TABLE IF NOT EXISTS model_aliases (
    alias TEXT PRIMARY KEY,
    model_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS catalog_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
