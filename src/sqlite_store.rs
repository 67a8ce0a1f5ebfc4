//! SQLite-backed [`VectorIndex`] and [`DocumentStore`].
//!
//! Vectors live as little-endian `f32` BLOBs in `chunk_vectors`. A query
//! fetches only the requesting user's rows (SQL `WHERE user_id = ?`), scores
//! them by cosine similarity, then sorts and truncates to `k`. The index
//! dimensionality is written to `index_meta` by the first upsert and
//! checked on every later write and query.
//!
//! Every operation runs under the configured timeout. Vector index failures
//! surface as [`RagError::IndexUnavailable`], provenance failures as
//! [`RagError::Persistence`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::future::Future;
use std::time::Duration;

use conecta_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use conecta_core::models::{Document, RecordMetadata, VectorRecord};
use conecta_core::store::{
    ensure_dims, rank, validate_k, DocumentStore, ScoredRecord, UserFilter, VectorIndex,
};
use conecta_core::{RagError, Result};

const DIMS_KEY: &str = "dims";

pub struct SqliteStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn bounded<T, F>(
        &self,
        operation: &str,
        fut: F,
        on_timeout: fn(String) -> RagError,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(format!(
                "{} timed out after {:?}",
                operation, self.timeout
            ))),
        }
    }

    /// Dimensionality recorded by the first write, if any.
    async fn stored_dims(&self) -> Result<Option<usize>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(DIMS_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(index_err)?;
        value.map(|v| parse_dims(&v)).transpose()
    }

    async fn upsert_records(&self, records: &[VectorRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(index_err)?;

        sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?) ON CONFLICT(key) DO NOTHING")
            .bind(DIMS_KEY)
            .bind(records[0].vector.len().to_string())
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;

        let stored: String = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
            .bind(DIMS_KEY)
            .fetch_one(&mut *tx)
            .await
            .map_err(index_err)?;
        let vectors: Vec<&[f32]> = records.iter().map(|r| r.vector.as_slice()).collect();
        // Dropping the transaction on mismatch rolls back the meta row too.
        ensure_dims(parse_dims(&stored)?, &vectors)?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (id, document_id, user_id, source_label, page,
                                           chunk_index, text, hash, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&record.id)
            .bind(&record.metadata.document_id)
            .bind(&record.metadata.user_id)
            .bind(&record.metadata.source_label)
            .bind(record.metadata.page as i64)
            .bind(record.metadata.chunk_index)
            .bind(&record.text)
            .bind(&record.hash)
            .bind(record.vector.len() as i64)
            .bind(vec_to_blob(&record.vector))
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        }

        tx.commit().await.map_err(index_err)
    }

    async fn query_records(
        &self,
        vector: &[f32],
        filter: &UserFilter,
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let Some(dims) = self.stored_dims().await? else {
            return Ok(Vec::new());
        };
        ensure_dims(dims, &[vector])?;

        let rows = sqlx::query(
            r#"
            SELECT id, document_id, user_id, source_label, page, chunk_index,
                   text, hash, embedding
            FROM chunk_vectors
            WHERE user_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(&filter.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(index_err)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = row_to_record(row).map_err(index_err)?;
            let score = cosine_similarity(vector, &record.vector);
            hits.push(ScoredRecord { record, score });
        }
        Ok(rank(hits, k))
    }
}

fn index_err(e: sqlx::Error) -> RagError {
    RagError::index_unavailable(e.to_string())
}

fn persistence_err(e: sqlx::Error) -> RagError {
    RagError::persistence(e.to_string())
}

fn parse_dims(value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| RagError::index_unavailable(format!("corrupt index dimensionality: {}", value)))
}

fn row_to_record(row: &SqliteRow) -> std::result::Result<VectorRecord, sqlx::Error> {
    let blob: Vec<u8> = row.try_get("embedding")?;
    let page: i64 = row.try_get("page")?;
    Ok(VectorRecord {
        id: row.try_get("id")?,
        vector: blob_to_vec(&blob),
        text: row.try_get("text")?,
        hash: row.try_get("hash")?,
        metadata: RecordMetadata {
            user_id: row.try_get("user_id")?,
            source_label: row.try_get("source_label")?,
            document_id: row.try_get("document_id")?,
            page: page as usize,
            chunk_index: row.try_get("chunk_index")?,
        },
    })
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let millis: i64 = row.try_get("created_at").map_err(persistence_err)?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| RagError::persistence(format!("invalid created_at: {}", millis)))?;
    document_fields(row, created_at).map_err(persistence_err)
}

fn document_fields(
    row: &SqliteRow,
    created_at: DateTime<Utc>,
) -> std::result::Result<Document, sqlx::Error> {
    let page_count: i64 = row.try_get("page_count")?;
    let chunk_count: i64 = row.try_get("chunk_count")?;
    Ok(Document {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        file_ref: row.try_get("file_ref")?,
        source_label: row.try_get("source_label")?,
        page_count: page_count as usize,
        chunk_count: chunk_count as usize,
        created_at,
    })
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.bounded("vector upsert", self.upsert_records(records), RagError::IndexUnavailable)
            .await
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &UserFilter,
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        validate_k(k)?;
        self.bounded(
            "vector query",
            self.query_records(vector, filter, k),
            RagError::IndexUnavailable,
        )
        .await
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let insert = async {
            sqlx::query(
                r#"
                INSERT INTO documents (id, user_id, file_ref, source_label, page_count,
                                       chunk_count, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.user_id)
            .bind(&doc.file_ref)
            .bind(&doc.source_label)
            .bind(doc.page_count as i64)
            .bind(doc.chunk_count as i64)
            .bind(doc.created_at.timestamp_millis())
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(persistence_err)
        };
        self.bounded("document insert", insert, RagError::Persistence).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let fetch = async {
            let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(persistence_err)?;
            row.as_ref().map(row_to_document).transpose()
        };
        self.bounded("document lookup", fetch, RagError::Persistence).await
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>> {
        let fetch = async {
            let rows = sqlx::query(
                "SELECT * FROM documents WHERE user_id = ? ORDER BY created_at ASC, rowid ASC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(persistence_err)?;
            rows.iter().map(row_to_document).collect()
        };
        self.bounded("document listing", fetch, RagError::Persistence).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::{db, migrate};
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn open_store(tmp: &TempDir) -> SqliteStore {
        let config = parse_config(&format!(
            "[db]\npath = \"{}\"\n",
            tmp.path().join("data").join("conecta.sqlite").display()
        ))
        .unwrap();
        let pool = db::connect(&config).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        SqliteStore::new(pool, Duration::from_secs(5))
    }

    fn record(id: &str, user: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            text: format!("text of {}", id),
            hash: format!("hash-{}", id),
            metadata: RecordMetadata {
                user_id: user.to_string(),
                source_label: format!("{}.pdf", user),
                document_id: format!("doc-{}", user),
                page: 1,
                chunk_index: 0,
            },
        }
    }

    fn document(id: &str, user: &str, millis: i64) -> Document {
        Document {
            id: id.to_string(),
            user_id: user.to_string(),
            file_ref: format!("/tmp/{}.pdf", id),
            source_label: format!("{}.pdf", id),
            page_count: 2,
            chunk_count: 5,
            created_at: DateTime::from_timestamp_millis(millis).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_query_only_returns_own_records() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store
            .upsert(&[
                record("a", "u1", vec![1.0, 0.0]),
                record("b", "u2", vec![1.0, 0.0]),
                record("c", "u1", vec![0.6, 0.8]),
            ])
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], &UserFilter::new("u1"), 5).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].record.metadata.source_label, "u1.pdf");

        let none = store.query(&[1.0, 0.0], &UserFilter::new("u3"), 5).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let rec = record("a", "u1", vec![1.0, 0.0]);
        store.upsert(&[rec.clone()]).await.unwrap();
        store.upsert(&[rec.clone()]).await.unwrap();

        let hits = store.query(&[1.0, 0.0], &UserFilter::new("u1"), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record, rec);
    }

    #[tokio::test]
    async fn test_k_truncates() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let records: Vec<VectorRecord> = (0..6)
            .map(|i| record(&format!("r{}", i), "u1", vec![1.0, i as f32]))
            .collect();
        store.upsert(&records).await.unwrap();

        let hits = store.query(&[1.0, 0.0], &UserFilter::new("u1"), 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].record.id, "r0");

        let err = store.query(&[1.0, 0.0], &UserFilter::new("u1"), 0).await.unwrap_err();
        assert_eq!(err.code(), "input_error");
    }

    #[tokio::test]
    async fn test_dimension_enforced_on_write_and_query() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.upsert(&[record("a", "u1", vec![1.0, 0.0])]).await.unwrap();

        let err = store.upsert(&[record("b", "u1", vec![1.0, 0.0, 0.0])]).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 3 }));

        let err = store.query(&[1.0], &UserFilter::new("u1"), 3).await.unwrap_err();
        assert_eq!(err.code(), "dimension_mismatch");
    }

    #[tokio::test]
    async fn test_mixed_batch_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let err = store
            .upsert(&[record("a", "u1", vec![1.0, 0.0]), record("b", "u1", vec![1.0])])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "dimension_mismatch");

        assert_eq!(store.stored_dims().await.unwrap(), None);
        let hits = store.query(&[1.0, 0.0, 0.0], &UserFilter::new("u1"), 3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_closed_pool_is_index_unavailable() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.upsert(&[record("a", "u1", vec![1.0, 0.0])]).await.unwrap();
        store.pool().close().await;

        let err = store.query(&[1.0, 0.0], &UserFilter::new("u1"), 3).await.unwrap_err();
        assert_eq!(err.code(), "index_unavailable");
        let err = store.list_documents("u1").await.unwrap_err();
        assert_eq!(err.code(), "persistence_failure");
    }

    #[tokio::test]
    async fn test_stalled_pool_times_out() {
        let tmp = TempDir::new().unwrap();
        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite:{}",
            tmp.path().join("stalled.sqlite").display()
        ))
        .unwrap()
        .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        let store = SqliteStore::new(pool.clone(), Duration::from_millis(200));

        // The only connection stays checked out, so every operation waits.
        let _held = pool.acquire().await.unwrap();

        let started = std::time::Instant::now();
        let err = store.query(&[1.0, 0.0], &UserFilter::new("u1"), 3).await.unwrap_err();
        assert_eq!(err.code(), "index_unavailable");
        assert!(err.to_string().contains("timed out"));
        let err = store.upsert(&[record("a", "u1", vec![1.0, 0.0])]).await.unwrap_err();
        assert_eq!(err.code(), "index_unavailable");
        let err = store.list_documents("u1").await.unwrap_err();
        assert_eq!(err.code(), "persistence_failure");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_documents_roundtrip_and_listing() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.insert_document(&document("d2", "u1", 2_000)).await.unwrap();
        store.insert_document(&document("d1", "u1", 1_000)).await.unwrap();
        store.insert_document(&document("d3", "u2", 3_000)).await.unwrap();

        let listed = store.list_documents("u1").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);

        let fetched = store.get_document("d3").await.unwrap().unwrap();
        assert_eq!(fetched, document("d3", "u2", 3_000));
        assert!(store.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_document_is_persistence_failure() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.insert_document(&document("d1", "u1", 1_000)).await.unwrap();
        let err = store.insert_document(&document("d1", "u1", 1_000)).await.unwrap_err();
        assert_eq!(err.code(), "persistence_failure");
    }
}
