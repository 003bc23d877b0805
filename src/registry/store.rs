use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

use crate::registry::{DhcpRegistry, DhcpScopeRecord, Dhcpv6PrefixRecord, RegistryError, Result};

/// DHCP registry backed by a SQLite snapshot of the scope tables.
///
/// Workers share one connection; each query checks it out for its duration.
#[derive(Clone)]
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
    timeout: Duration,
}

impl SqliteRegistry {
    pub fn new(conn: Arc<Mutex<Connection>>, timeout: Duration) -> Self {
        Self { conn, timeout }
    }

    async fn checkout(&self) -> Result<MutexGuard<'_, Connection>> {
        tokio::time::timeout(self.timeout, self.conn.lock())
            .await
            .map_err(|_| RegistryError::Timeout(self.timeout))
    }
}

impl DhcpRegistry for SqliteRegistry {
    async fn scopes_by_primary(&self, primary_scope: &str) -> Result<Vec<DhcpScopeRecord>> {
        let conn = self.checkout().await?;
        let mut stmt = conn.prepare(
            "SELECT scope, primscope, class, disabled, total, freeleases, leases
             FROM scopesnew WHERE primscope = ?1 ORDER BY scope",
        )?;

        let scopes = stmt
            .query_map([primary_scope], |row| {
                Ok(DhcpScopeRecord {
                    scope: row.get(0)?,
                    primary_scope: row.get(1)?,
                    class: row.get(2)?,
                    disabled: row.get::<_, Option<bool>>(3)?.unwrap_or(false),
                    total: row.get(4)?,
                    free_leases: row.get(5)?,
                    leases: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        log::debug!("Found {} DHCP scopes for primary subnet {primary_scope}", scopes.len());
        Ok(scopes)
    }

    async fn ipv6_prefixes_by_hostname(&self, hostname: &str) -> Result<Vec<Dhcpv6PrefixRecord>> {
        let conn = self.checkout().await?;
        let mut stmt = conn.prepare(
            "SELECT prefixname, hostname, leased, dynamic
             FROM ipv6scopesnew WHERE hostname = ?1 ORDER BY prefixname",
        )?;

        let prefixes = stmt
            .query_map([hostname], |row| {
                Ok(Dhcpv6PrefixRecord {
                    prefix_name: row.get(0)?,
                    hostname: row.get(1)?,
                    leased: row.get(2)?,
                    dynamic: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        log::debug!("Found {} DHCPv6 prefixes for hostname {hostname}", prefixes.len());
        Ok(prefixes)
    }
}
