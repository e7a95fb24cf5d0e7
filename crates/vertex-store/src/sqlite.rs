//! SQLite-backed model catalog with brute-force cosine search.
//!
//! Filtering happens in SQL against the indexed scalar columns; ranking happens
//! in memory over the surviving rows. One connection, one lock, shared by the
//! search and upsert paths.

use std::path::{Path, PathBuf};

use ndarray::Array1;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::embedding::{cosine_similarity, decode_f32_le, encode_f32_le};
use crate::schema::SCHEMA_SQL;
use crate::types::*;
use vertex_core::{Error, Result};

/// `catalog_meta` key holding the name of the engine that produced every stored embedding.
const EMBEDDER_KEY: &str = "embedder";

/// SQLite integers are signed; larger values saturate instead of wrapping.
fn sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

const SELECT_COLUMNS: &str = "model_id, model_name, author, description, embedding, \
     downloads, likes, tags_json, capability_tag, library_name, is_local, \
     cost_per_1k_tokens, params_millions, context_length, last_updated, added_timestamp";

/// Durable catalog of model records keyed by model id.
pub struct CatalogStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    embedding_dim: usize,
}

impl CatalogStore {
    /// Open or create the catalog.
    ///
    /// `db_dir` is the directory (e.g., `data/catalog/`). The file will be `db_dir/catalog.db`.
    pub fn open(db_dir: impl AsRef<Path>, embedding_dim: usize) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("catalog.db");

        let conn = Connection::open(&db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            embedding_dim,
        };

        info!(
            "CatalogStore initialized: {} models, dim={}, path={}",
            store.count()?,
            embedding_dim,
            store.db_path.display()
        );
        Ok(store)
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Insert or replace a record by id. `added_timestamp` of an existing row is kept.
    pub fn upsert(&self, record: &ModelRecord) -> Result<()> {
        if record.embedding.len() != self.embedding_dim {
            return Err(Error::Storage(format!(
                "embedding for {} has length {}, expected {}",
                record.model_id,
                record.embedding.len(),
                self.embedding_dim
            )));
        }
        let blob = encode_f32_le(&Array1::from_vec(record.embedding.clone()));
        let tags_json = serde_json::to_string(&record.tags)?;

        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO models (model_id, model_name, author, description, embedding, \
             downloads, likes, tags_json, capability_tag, library_name, is_local, \
             cost_per_1k_tokens, params_millions, context_length, last_updated, added_timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16) \
             ON CONFLICT(model_id) DO UPDATE SET \
               model_name = excluded.model_name, author = excluded.author, \
               description = excluded.description, embedding = excluded.embedding, \
               downloads = excluded.downloads, likes = excluded.likes, \
               tags_json = excluded.tags_json, capability_tag = excluded.capability_tag, \
               library_name = excluded.library_name, is_local = excluded.is_local, \
               cost_per_1k_tokens = excluded.cost_per_1k_tokens, \
               params_millions = excluded.params_millions, \
               context_length = excluded.context_length, last_updated = excluded.last_updated",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            record.model_id,
            record.model_name,
            record.author,
            record.description,
            blob,
            sql_int(record.downloads),
            sql_int(record.likes),
            tags_json,
            record.capability_tag,
            record.library_name,
            record.is_local,
            record.cost_per_1k_tokens.max(0.0),
            sql_int(record.params_millions),
            sql_int(record.context_length),
            record.last_updated,
            record.added_timestamp,
        ])
        .map_err(|e| Error::Database(e.to_string()))?;

        debug!("Upserted model {}", record.model_id);
        Ok(())
    }

    /// True when `model_id` is stored, directly or through an alias.
    pub fn exists(&self, model_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .prepare_cached(
                "SELECT 1 FROM models WHERE model_id = ?1 \
                 UNION ALL \
                 SELECT 1 FROM model_aliases a JOIN models m ON m.model_id = a.model_id \
                 WHERE a.alias = ?1 \
                 LIMIT 1",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![model_id], |_| Ok(()))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(found.is_some())
    }

    /// Local lookup only; never fetches. Aliases resolve to their canonical record.
    pub fn get(&self, model_id: &str) -> Result<Option<ModelRecord>> {
        let sql = format!(
            "SELECT {} FROM models \
             WHERE model_id = ?1 \
                OR model_id = (SELECT model_id FROM model_aliases WHERE alias = ?1) \
             ORDER BY model_id = ?1 DESC LIMIT 1",
            SELECT_COLUMNS
        );
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached(&sql)
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![model_id], RawRow::read)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);
        row.map(|r| r.into_record(self.embedding_dim)).transpose()
    }

    /// Record that lookups of `alias` are answered by the `model_id` row.
    pub fn add_alias(&self, alias: &str, model_id: &str) -> Result<()> {
        if alias == model_id {
            return Ok(());
        }
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO model_aliases (alias, model_id) VALUES (?1, ?2) \
             ON CONFLICT(alias) DO UPDATE SET model_id = excluded.model_id",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![alias, model_id])
        .map_err(|e| Error::Database(e.to_string()))?;
        debug!("Alias {} -> {}", alias, model_id);
        Ok(())
    }

    /// Pin the embedding engine on first use and return the pinned name.
    ///
    /// The first caller's `engine` is stored; later callers get the stored
    /// name back whatever they pass.
    pub fn pin_embedder(&self, engine: &str) -> Result<String> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO catalog_meta (key, value) VALUES (?1, ?2)",
            params![EMBEDDER_KEY, engine],
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        conn.query_row(
            "SELECT value FROM catalog_meta WHERE key = ?1",
            params![EMBEDDER_KEY],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// Filter by `filters`, rank by `(similarity desc, downloads desc)`, keep `limit`.
    pub fn search(
        &self,
        query_embedding: &Array1<f32>,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<ScoredModel>> {
        let mut sql = format!(
            "SELECT {} FROM models WHERE cost_per_1k_tokens <= ?",
            SELECT_COLUMNS
        );
        let mut values: Vec<Value> = vec![Value::Real(filters.max_cost)];
        if let Some(tag) = &filters.capability_tag {
            sql.push_str(" AND capability_tag = ?");
            values.push(Value::Text(tag.clone()));
        }
        if let Some(max_params) = filters.max_params {
            sql.push_str(" AND params_millions <= ?");
            values.push(Value::Integer(sql_int(max_params)));
        }

        let rows: Vec<RawRow> = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached(&sql)
                .map_err(|e| Error::Database(e.to_string()))?;
            let mapped = stmt
                .query_map(params_from_iter(values), RawRow::read)
                .map_err(|e| Error::Database(e.to_string()))?;
            mapped
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::Database(e.to_string()))?
        };

        let mut scored = Vec::with_capacity(rows.len());
        for raw in rows {
            let record = raw.into_record(self.embedding_dim)?;
            let embedding = Array1::from_vec(record.embedding.clone());
            let similarity = cosine_similarity(query_embedding, &embedding);
            scored.push(ScoredModel { record, similarity });
        }

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.record.downloads.cmp(&a.record.downloads))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// Records ordered by downloads, most popular first.
    pub fn list(&self, limit: usize) -> Result<Vec<ModelRecord>> {
        let sql = format!(
            "SELECT {} FROM models ORDER BY downloads DESC, model_id ASC LIMIT ?1",
            SELECT_COLUMNS
        );
        let rows: Vec<RawRow> = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached(&sql)
                .map_err(|e| Error::Database(e.to_string()))?;
            let mapped = stmt
                .query_map(params![sql_int(limit as u64)], RawRow::read)
                .map_err(|e| Error::Database(e.to_string()))?;
            mapped
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::Database(e.to_string()))?
        };
        rows.into_iter()
            .map(|r| r.into_record(self.embedding_dim))
            .collect()
    }

    pub fn count(&self) -> Result<i64> {
        self.count_where("1 = 1")
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        let db_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(CatalogStats {
            models: self.count()?,
            free_models: self.count_where("cost_per_1k_tokens = 0")?,
            local_models: self.count_where("is_local = 1")?,
            embedding_dimension: self.embedding_dim,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
        })
    }

    fn count_where(&self, predicate: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT COUNT(*) FROM models WHERE {}", predicate),
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(e.to_string()))
    }
}

/// Row as read from SQLite, before the embedding blob is validated.
struct RawRow {
    model_id: String,
    model_name: String,
    author: Option<String>,
    description: Option<String>,
    embedding: Vec<u8>,
    downloads: i64,
    likes: i64,
    tags_json: Option<String>,
    capability_tag: String,
    library_name: Option<String>,
    is_local: bool,
    cost_per_1k_tokens: f64,
    params_millions: i64,
    context_length: i64,
    last_updated: i64,
    added_timestamp: i64,
}

impl RawRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            model_id: row.get(0)?,
            model_name: row.get(1)?,
            author: row.get(2)?,
            description: row.get(3)?,
            embedding: row.get(4)?,
            downloads: row.get(5)?,
            likes: row.get(6)?,
            tags_json: row.get(7)?,
            capability_tag: row.get(8)?,
            library_name: row.get(9)?,
            is_local: row.get(10)?,
            cost_per_1k_tokens: row.get(11)?,
            params_millions: row.get(12)?,
            context_length: row.get(13)?,
            last_updated: row.get(14)?,
            added_timestamp: row.get(15)?,
        })
    }

    fn into_record(self, dim: usize) -> Result<ModelRecord> {
        let embedding = decode_f32_le(&self.embedding, dim)?.to_vec();
        let tags = self
            .tags_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        Ok(ModelRecord {
            model_id: self.model_id,
            model_name: self.model_name,
            author: self.author.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            embedding,
            downloads: self.downloads.max(0) as u64,
            likes: self.likes.max(0) as u64,
            tags,
            capability_tag: self.capability_tag,
            library_name: self.library_name.unwrap_or_default(),
            is_local: self.is_local,
            cost_per_1k_tokens: self.cost_per_1k_tokens,
            params_millions: self.params_millions.max(0) as u64,
            context_length: self.context_length.max(0) as u64,
            last_updated: self.last_updated,
            added_timestamp: self.added_timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn test_store() -> (CatalogStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::open(dir.path(), DIM).unwrap();
        (store, dir)
    }

    fn unit(axis: usize, tilt: f32) -> Vec<f32> {
        let mut v = vec![0.0; DIM];
        v[axis] = 1.0;
        v[(axis + 1) % DIM] = tilt;
        v
    }

    fn record(id: &str, embedding: Vec<f32>, cost: f64, params: u64, downloads: u64) -> ModelRecord {
        ModelRecord {
            model_id: id.into(),
            model_name: id.rsplit('/').next().unwrap().into(),
            author: "test".into(),
            description: format!("{} description", id),
            embedding,
            downloads,
            likes: 0,
            tags: vec!["text-generation".into()],
            capability_tag: "text-generation".into(),
            library_name: "transformers".into(),
            is_local: true,
            cost_per_1k_tokens: cost,
            params_millions: params,
            context_length: 4096,
            last_updated: 1_700_000_000,
            added_timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_upsert_get_exists() {
        let (store, _dir) = test_store();
        assert!(!store.exists("org/alpha").unwrap());

        let rec = record("org/alpha", unit(0, 0.0), 0.0, 3000, 10);
        store.upsert(&rec).unwrap();

        assert!(store.exists("org/alpha").unwrap());
        let got = store.get("org/alpha").unwrap().unwrap();
        assert_eq!(got, rec);
        assert_eq!(got.embedding.len(), DIM);
        assert!(store.get("org/missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_but_keeps_added_timestamp() {
        let (store, _dir) = test_store();
        store
            .upsert(&record("org/alpha", unit(0, 0.0), 0.0, 3000, 10))
            .unwrap();

        let mut updated = record("org/alpha", unit(1, 0.0), 0.0, 3000, 99);
        updated.added_timestamp = 1_800_000_000;
        updated.last_updated = 1_800_000_000;
        store.upsert(&updated).unwrap();

        let got = store.get("org/alpha").unwrap().unwrap();
        assert_eq!(got.downloads, 99);
        assert_eq!(got.last_updated, 1_800_000_000);
        assert_eq!(got.added_timestamp, 1_700_000_000);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_rejects_wrong_dimension() {
        let (store, _dir) = test_store();
        let rec = record("org/short", vec![1.0; DIM - 1], 0.0, 0, 0);
        assert!(matches!(store.upsert(&rec), Err(Error::Storage(_))));
        assert!(!store.exists("org/short").unwrap());
    }

    #[test]
    fn test_search_respects_max_cost() {
        let (store, _dir) = test_store();
        store.upsert(&record("a", unit(0, 0.1), 0.0, 3000, 5)).unwrap();
        store.upsert(&record("b", unit(0, 0.2), 0.002, 3000, 5)).unwrap();
        store.upsert(&record("c", unit(0, 0.0), 0.01, 3000, 5)).unwrap();
        let query = Array1::from_vec(unit(0, 0.0));

        for max_cost in [0.0, 0.002, 0.005, 1.0] {
            let hits = store
                .search(&query, &SearchFilters::default().with_max_cost(max_cost), 10)
                .unwrap();
            assert!(hits.iter().all(|h| h.record.cost_per_1k_tokens <= max_cost));
        }
        let free = store.search(&query, &SearchFilters::free_only(), 10).unwrap();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].record.model_id, "a");
    }

    #[test]
    fn test_search_filters_capability_and_params() {
        let (store, _dir) = test_store();
        let mut embedder_model = record("emb", unit(0, 0.0), 0.0, 100, 5);
        embedder_model.capability_tag = "feature-extraction".into();
        store.upsert(&embedder_model).unwrap();
        store.upsert(&record("small", unit(0, 0.0), 0.0, 3000, 5)).unwrap();
        store.upsert(&record("huge", unit(0, 0.0), 0.0, 70_000, 5)).unwrap();
        let query = Array1::from_vec(unit(0, 0.0));

        let hits = store
            .search(
                &query,
                &SearchFilters::free_only()
                    .with_capability("text-generation")
                    .with_max_params(7000),
                10,
            )
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.record.model_id.as_str()).collect();
        assert_eq!(ids, vec!["small"]);
    }

    #[test]
    fn test_search_orders_by_similarity_then_downloads() {
        let (store, _dir) = test_store();
        store.upsert(&record("far", unit(3, 0.0), 0.0, 0, 1_000_000)).unwrap();
        store.upsert(&record("near-popular", unit(0, 0.0), 0.0, 0, 500)).unwrap();
        store.upsert(&record("near-obscure", unit(0, 0.0), 0.0, 0, 5)).unwrap();
        store.upsert(&record("close", unit(0, 0.5), 0.0, 0, 9_999)).unwrap();
        let query = Array1::from_vec(unit(0, 0.0));

        let hits = store.search(&query, &SearchFilters::free_only(), 3).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.record.model_id.as_str()).collect();
        assert_eq!(ids, vec!["near-popular", "near-obscure", "close"]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = CatalogStore::open(dir.path(), DIM).unwrap();
            store.upsert(&record("persist/me", unit(2, 0.3), 0.0, 1, 1)).unwrap();
        }
        let reopened = CatalogStore::open(dir.path(), DIM).unwrap();
        let got = reopened.get("persist/me").unwrap().unwrap();
        assert_eq!(got.embedding, unit(2, 0.3));
    }

    #[test]
    fn test_alias_resolves_to_canonical_record() {
        let (store, _dir) = test_store();
        store
            .upsert(&record("community/gpt2", unit(0, 0.0), 0.0, 124, 10))
            .unwrap();
        assert!(!store.exists("gpt2").unwrap());

        store.add_alias("gpt2", "community/gpt2").unwrap();
        assert!(store.exists("gpt2").unwrap());
        assert_eq!(store.get("gpt2").unwrap().unwrap().model_id, "community/gpt2");
        assert_eq!(store.count().unwrap(), 1);

        // A real row under the alias's name wins over the alias.
        store.upsert(&record("gpt2", unit(1, 0.0), 0.0, 1, 1)).unwrap();
        assert_eq!(store.get("gpt2").unwrap().unwrap().model_id, "gpt2");
    }

    #[test]
    fn test_pin_embedder_keeps_first_engine() {
        let dir = TempDir::new().unwrap();
        {
            let store = CatalogStore::open(dir.path(), DIM).unwrap();
            assert_eq!(store.pin_embedder("engine-a").unwrap(), "engine-a");
            assert_eq!(store.pin_embedder("engine-b").unwrap(), "engine-a");
        }
        let reopened = CatalogStore::open(dir.path(), DIM).unwrap();
        assert_eq!(reopened.pin_embedder("engine-b").unwrap(), "engine-a");
    }

    #[test]
    fn test_huge_params_ceiling_saturates() {
        let (store, _dir) = test_store();
        store.upsert(&record("big", unit(0, 0.0), 0.0, u64::MAX, 1)).unwrap();
        let query = Array1::from_vec(unit(0, 0.0));

        let hits = store
            .search(&query, &SearchFilters::free_only().with_max_params(u64::MAX), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.params_millions, i64::MAX as u64);
    }

    #[test]
    fn test_stats_and_list() {
        let (store, _dir) = test_store();
        store.upsert(&record("a", unit(0, 0.0), 0.0, 1, 10)).unwrap();
        let mut remote = record("b", unit(1, 0.0), 0.003, 1, 20);
        remote.is_local = false;
        store.upsert(&remote).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.models, 2);
        assert_eq!(stats.free_models, 1);
        assert_eq!(stats.local_models, 1);
        assert_eq!(stats.embedding_dimension, DIM);

        let listed = store.list(10).unwrap();
        assert_eq!(listed[0].model_id, "b");
        assert_eq!(listed.len(), 2);
    }
}
