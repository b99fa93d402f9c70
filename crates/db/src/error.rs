use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A version-checked write found a different version than expected.
    #[error("Version conflict on {collection}/{key}: expected {expected}, found {actual:?}")]
    VersionConflict {
        collection: String,
        key: String,
        expected: u64,
        actual: Option<u64>,
    },

    #[error("Document already exists: {collection}/{key}")]
    AlreadyExists { collection: String, key: String },
}

impl DbError {
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
