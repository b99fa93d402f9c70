use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRow {
    pub collection: String,
    pub key: String,
    pub version: i64,
    pub body: String,
    pub updated_at: i64,
}

/// A stored JSON document together with its store-assigned version.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub collection: String,
    pub key: String,
    pub version: u64,
    pub body: Value,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRow {
    pub fn into_document(self) -> Result<Document, DbError> {
        Ok(Document {
            collection: self.collection,
            key: self.key,
            version: self.version.max(0) as u64,
            body: serde_json::from_str(&self.body)?,
            updated_at: timestamp_to_datetime(self.updated_at),
        })
    }
}

impl Document {
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, DbError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts).single().unwrap_or_default()
}

pub(crate) fn datetime_to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}
