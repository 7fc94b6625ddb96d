//! In-memory audit source for tests and local development.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use postgres::types::TableName;
use tokio::sync::Mutex;

use crate::error::AuditResult;
use crate::source::base::AuditSource;
use crate::types::{Fingerprint, Key, KeyBounds, KeyRange, RowDigest};

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, BTreeMap<Key, String>>,
    max_updated_at: HashMap<String, f64>,
}

/// An [`AuditSource`] backed by in-process maps.
///
/// Rows are stored as their textual rendering keyed by the partitioning key,
/// which is all the audit operations ever look at. Cloning shares the
/// underlying state, so a clone handed to a worker observes later mutations,
/// which is how tests simulate replication lag.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSource {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAuditSource {
    pub fn new() -> MemoryAuditSource {
        MemoryAuditSource::default()
    }

    /// Inserts or replaces a row.
    pub async fn upsert_row(&self, table: &TableName, key: Key, row: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(key, row.into());
    }

    /// Inserts or replaces many rows at once.
    pub async fn upsert_rows(
        &self,
        table: &TableName,
        rows: impl IntoIterator<Item = (Key, String)>,
    ) {
        let mut inner = self.inner.lock().await;
        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Deletes a row if present.
    pub async fn delete_row(&self, table: &TableName, key: Key) {
        let mut inner = self.inner.lock().await;
        if let Some(rows) = inner.tables.get_mut(&table.to_string()) {
            rows.remove(&key);
        }
    }

    /// Sets the value reported by the lag probe for this table.
    pub async fn set_max_updated_at(&self, table: &TableName, epoch_seconds: f64) {
        let mut inner = self.inner.lock().await;
        inner.max_updated_at.insert(table.to_string(), epoch_seconds);
    }

    /// Returns the number of rows currently stored for the table.
    pub async fn table_rows(&self, table: &TableName) -> u64 {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(&table.to_string())
            .map(|rows| rows.len() as u64)
            .unwrap_or(0)
    }
}

impl AuditSource for MemoryAuditSource {
    async fn key_bounds(
        &self,
        table: &TableName,
        _key_column: &str,
    ) -> AuditResult<Option<KeyBounds>> {
        let inner = self.inner.lock().await;
        let Some(rows) = inner.tables.get(&table.to_string()) else {
            return Ok(None);
        };

        let (Some((&min, _)), Some((&max, _))) =
            (rows.first_key_value(), rows.last_key_value())
        else {
            return Ok(None);
        };

        Ok(Some(KeyBounds {
            min,
            max,
            rows: rows.len() as u64,
        }))
    }

    async fn count_rows(
        &self,
        table: &TableName,
        _key_column: &str,
        range: KeyRange,
    ) -> AuditResult<u64> {
        let Some((low, high)) = range.effective_bounds() else {
            return Ok(0);
        };

        let inner = self.inner.lock().await;
        let count = inner
            .tables
            .get(&table.to_string())
            .map(|rows| rows.range(low..=high).count() as u64)
            .unwrap_or(0);

        Ok(count)
    }

    async fn range_fingerprint(
        &self,
        table: &TableName,
        _key_column: &str,
        range: KeyRange,
    ) -> AuditResult<Fingerprint> {
        let Some((low, high)) = range.effective_bounds() else {
            return Ok(Fingerprint::default());
        };

        let inner = self.inner.lock().await;
        let mut fingerprint = Fingerprint::default();
        if let Some(rows) = inner.tables.get(&table.to_string()) {
            for (_, row) in rows.range(low..=high) {
                fingerprint.combine(RowDigest::of_text(row));
            }
        }

        Ok(fingerprint)
    }

    async fn fetch_row(
        &self,
        table: &TableName,
        _key_column: &str,
        key: Key,
    ) -> AuditResult<Option<String>> {
        let inner = self.inner.lock().await;
        let row = inner
            .tables
            .get(&table.to_string())
            .and_then(|rows| rows.get(&key).cloned());

        Ok(row)
    }

    async fn max_updated_at(&self, table: &TableName) -> AuditResult<Option<f64>> {
        let inner = self.inner.lock().await;

        Ok(inner.max_updated_at.get(&table.to_string()).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableName {
        TableName::new("public".to_string(), "users".to_string())
    }

    #[tokio::test]
    async fn empty_table_has_no_bounds() {
        let source = MemoryAuditSource::new();

        let bounds = source.key_bounds(&users(), "id").await.unwrap();
        assert_eq!(bounds, None);
    }

    #[tokio::test]
    async fn bounds_track_min_max_and_count() {
        let source = MemoryAuditSource::new();
        source.upsert_row(&users(), 5, "(5,a)").await;
        source.upsert_row(&users(), -3, "(-3,b)").await;
        source.upsert_row(&users(), 12, "(12,c)").await;

        let bounds = source.key_bounds(&users(), "id").await.unwrap().unwrap();
        assert_eq!(bounds.min, -3);
        assert_eq!(bounds.max, 12);
        assert_eq!(bounds.rows, 3);
    }

    #[tokio::test]
    async fn fingerprint_respects_range_bounds() {
        let source = MemoryAuditSource::new();
        for key in 0..10 {
            source.upsert_row(&users(), key, format!("({key},x)")).await;
        }

        let inside = source
            .range_fingerprint(&users(), "id", KeyRange::inclusive(0, 4))
            .await
            .unwrap();
        let all = source
            .range_fingerprint(&users(), "id", KeyRange::inclusive(0, 9))
            .await
            .unwrap();

        assert_eq!(inside.rows, 5);
        assert_eq!(all.rows, 10);
        assert_ne!(inside, all);
    }

    #[tokio::test]
    async fn identical_tables_fingerprint_identically() {
        let a = MemoryAuditSource::new();
        let b = MemoryAuditSource::new();
        for key in 0..100 {
            a.upsert_row(&users(), key, format!("({key},x)")).await;
            b.upsert_row(&users(), key, format!("({key},x)")).await;
        }

        let range = KeyRange::inclusive(0, 99);
        let fa = a.range_fingerprint(&users(), "id", range).await.unwrap();
        let fb = b.range_fingerprint(&users(), "id", range).await.unwrap();

        assert_eq!(fa, fb);
    }

    #[tokio::test]
    async fn fetch_row_distinguishes_absent_from_present() {
        let source = MemoryAuditSource::new();
        source.upsert_row(&users(), 1, "(1,alice)").await;

        let present = source.fetch_row(&users(), "id", 1).await.unwrap();
        let absent = source.fetch_row(&users(), "id", 2).await.unwrap();

        assert_eq!(present.as_deref(), Some("(1,alice)"));
        assert_eq!(absent, None);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let source = MemoryAuditSource::new();
        let clone = source.clone();

        source.upsert_row(&users(), 1, "(1,alice)").await;

        assert_eq!(clone.table_rows(&users()).await, 1);
    }
}
