use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use sqlx::{Connection, PgConnection};

use crate::error::HealthError;

/// Source of row counts for a table.
///
/// The poller only needs the current count; implementations decide how to
/// reach the database, or return scripted values for testing.
pub trait RecordCounter: Send + Sync {
    fn count<'a>(
        &'a self,
        table: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64, HealthError>> + Send + 'a>>;
}

/// Counts rows over the PostgreSQL wire protocol (CockroachDB included).
///
/// A fresh connection is opened for every count, so a database that is still
/// starting up simply fails that poll.
pub struct PgRecordCounter {
    url: String,
}

impl PgRecordCounter {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl RecordCounter for PgRecordCounter {
    fn count<'a>(
        &'a self,
        table: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64, HealthError>> + Send + 'a>> {
        Box::pin(async move {
            validate_table(table)?;
            let mut conn = PgConnection::connect(&self.url).await?;
            let sql = format!("select count(*) from {table}");
            let count: i64 = sqlx::query_scalar(&sql).fetch_one(&mut conn).await?;
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "Closing health connection failed");
            }
            Ok(count)
        })
    }
}

/// Accept `table` or `schema.table` made of ASCII alphanumerics and `_`.
///
/// The name is spliced into SQL, so anything else is rejected.
pub fn validate_table(table: &str) -> Result<(), HealthError> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && !part.starts_with(|c: char| c.is_ascii_digit())
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|p| valid_part(p)) {
        Ok(())
    } else {
        Err(HealthError::InvalidTable(table.to_string()))
    }
}

/// Stub counter replaying a fixed script of results, repeating the last one.
pub struct ScriptedCounter {
    script: Vec<Result<i64, String>>,
    calls: Mutex<usize>,
}

impl ScriptedCounter {
    pub fn new(script: Vec<Result<i64, String>>) -> Self {
        Self {
            script,
            calls: Mutex::new(0),
        }
    }

    /// Counter reporting the given counts in order.
    pub fn counts(counts: &[i64]) -> Self {
        Self::new(counts.iter().copied().map(Ok).collect())
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RecordCounter for ScriptedCounter {
    fn count<'a>(
        &'a self,
        _table: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64, HealthError>> + Send + 'a>> {
        Box::pin(async move {
            let idx = {
                let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
                let idx = *calls;
                *calls += 1;
                idx
            };
            match self.script.get(idx).or(self.script.last()) {
                Some(Ok(n)) => Ok(*n),
                Some(Err(e)) => Err(HealthError::Database(e.clone())),
                None => Ok(0),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_validated() {
        assert!(validate_table("nodes").is_ok());
        assert!(validate_table("public.nodes").is_ok());
        assert!(validate_table("node_stats2").is_ok());
        for bad in ["", "nodes; drop table nodes", "a.b.c", "1nodes", "nodes.", "no-des"] {
            assert!(
                matches!(validate_table(bad), Err(HealthError::InvalidTable(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn scripted_counter_repeats_last_entry() {
        let counter = ScriptedCounter::new(vec![Ok(1), Err("down".into()), Ok(4)]);
        assert_eq!(counter.count("nodes").await.unwrap(), 1);
        assert!(counter.count("nodes").await.is_err());
        assert_eq!(counter.count("nodes").await.unwrap(), 4);
        assert_eq!(counter.count("nodes").await.unwrap(), 4);
        assert_eq!(counter.calls(), 4);
    }

    #[tokio::test]
    async fn pg_counter_rejects_bad_table_before_connecting() {
        let counter = PgRecordCounter::new("postgres://invalid:1/none");
        assert!(matches!(
            counter.count("x; --").await,
            Err(HealthError::InvalidTable(_))
        ));
    }

    #[tokio::test]
    async fn pg_counter_reports_unreachable_database() {
        let counter = PgRecordCounter::new("not a url");
        assert!(matches!(
            counter.count("nodes").await,
            Err(HealthError::Database(_))
        ));
    }
}
