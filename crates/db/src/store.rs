//! Versioned document storage.
//!
//! Every document carries a version assigned by the store: 1 on insert, and
//! one more on each successful write. Writes are conditional, so two writers
//! racing on the same document cannot both succeed.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbError;
use crate::models::{datetime_to_timestamp, Document, DocumentRow};

pub const AIRLINES: &str = "airlines";
pub const PLANS: &str = "plans";
pub const SIMULATION: &str = "simulation";
pub const FEEDBACK: &str = "feedback";

/// Precondition of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// Insert only; fails with `AlreadyExists` if the key is taken.
    Absent,
    /// Replace only if the stored version still equals the given one.
    Version(u64),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, DbError>;

    /// All documents of a collection, ordered by key.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, DbError>;

    /// Conditional write. Returns the new version.
    async fn put(
        &self,
        collection: &str,
        key: &str,
        body: &Value,
        condition: WriteCondition,
    ) -> Result<u64, DbError>;

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, DbError>;

    /// Removes a whole collection. Returns the number of deleted documents.
    async fn delete_collection(&self, collection: &str) -> Result<u64, DbError>;
}

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, collection: &str, key: &str) -> Result<Option<u64>, DbError> {
        let version: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM documents WHERE collection = ? AND key = ?")
                .bind(collection)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(version.map(|(v,)| v.max(0) as u64))
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, DbError> {
        let row: Option<DocumentRow> = sqlx::query_as(
            r#"
            SELECT collection, key, version, body, updated_at
            FROM documents
            WHERE collection = ? AND key = ?
            "#,
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DocumentRow::into_document).transpose()
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, DbError> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT collection, key, version, body, updated_at
            FROM documents
            WHERE collection = ?
            ORDER BY key ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        body: &Value,
        condition: WriteCondition,
    ) -> Result<u64, DbError> {
        let body = serde_json::to_string(body)?;
        let now = datetime_to_timestamp(Utc::now());

        match condition {
            WriteCondition::Absent => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO documents (collection, key, version, body, updated_at)
                    VALUES (?, ?, 1, ?, ?)
                    ON CONFLICT(collection, key) DO NOTHING
                    "#,
                )
                .bind(collection)
                .bind(key)
                .bind(&body)
                .bind(now)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(DbError::AlreadyExists {
                        collection: collection.to_string(),
                        key: key.to_string(),
                    });
                }
                debug!(collection, key, "Document inserted");
                Ok(1)
            }
            WriteCondition::Version(expected) => {
                let result = sqlx::query(
                    r#"
                    UPDATE documents
                    SET version = version + 1, body = ?, updated_at = ?
                    WHERE collection = ? AND key = ? AND version = ?
                    "#,
                )
                .bind(&body)
                .bind(now)
                .bind(collection)
                .bind(key)
                .bind(expected as i64)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 0 {
                    let actual = self.current_version(collection, key).await?;
                    return Err(DbError::VersionConflict {
                        collection: collection.to_string(),
                        key: key.to_string(),
                        expected,
                        actual,
                    });
                }
                debug!(collection, key, version = expected + 1, "Document updated");
                Ok(expected + 1)
            }
        }
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_collection(&self, collection: &str) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ?")
            .bind(collection)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
