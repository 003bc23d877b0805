use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rusqlite::OptionalExtension;
use tokio::sync::Mutex;

use crate::batch::DeviceReport;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Stores finished device reports between runs.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<DeviceReport>>> + Send;

    fn set(
        &self,
        key: &str,
        report: &DeviceReport,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;
}

pub fn cache_key(device_name: &str) -> String {
    format!("dhcp_validation:{device_name}")
}

/// Always misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl ResultCache for NoCache {
    async fn get(&self, _key: &str) -> Result<Option<DeviceReport>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _report: &DeviceReport, _ttl: Duration) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteCache {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteCache {
    pub fn new(conn: Arc<Mutex<rusqlite::Connection>>) -> Self {
        Self { conn }
    }

    /// Drops every expired entry, returning how many went.
    pub async fn purge_expired(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM validation_cache WHERE expires_at <= ?1",
            [Utc::now().timestamp()],
        )?;
        Ok(removed)
    }
}

impl ResultCache for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<DeviceReport>> {
        let conn = self.conn.lock().await;
        let report: Option<String> = conn
            .query_row(
                "SELECT report FROM validation_cache WHERE cache_key = ?1 AND expires_at > ?2",
                rusqlite::params![key, Utc::now().timestamp()],
                |row| row.get(0),
            )
            .optional()?;

        match report {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, report: &DeviceReport, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(report)?;
        let ttl = chrono::Duration::from_std(ttl)?;
        let expires_at = (Utc::now() + ttl).timestamp();

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO validation_cache (cache_key, device_name, report, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(cache_key) DO UPDATE SET
                report = excluded.report,
                expires_at = excluded.expires_at,
                updated_at = CURRENT_TIMESTAMP",
            rusqlite::params![key, report.device_name, json, expires_at],
        )?;
        Ok(())
    }
}
