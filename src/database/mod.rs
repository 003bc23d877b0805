use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags};

const LATEST_VERSION: i32 = 1;
const MIGRATIONS: [&str; LATEST_VERSION as usize] = [include_str!("migrations/1.sql")];

/// Tables every DHCP registry snapshot must carry.
const REGISTRY_TABLES: [&str; 2] = ["scopesnew", "ipv6scopesnew"];

/// Opens (creating if needed) the local result cache database.
pub fn open<T: AsRef<Path>>(path: T) -> Result<Connection> {
    let conn = rusqlite::Connection::open(path)?;
    let current_version = get_or_init_current_migration(&conn)?;
    perform_migrations(&conn, current_version)?;
    Ok(conn)
}

/// Opens the DHCP registry read-only. Queries wait at most `timeout` on a
/// locked database before failing.
pub fn open_registry<T: AsRef<Path>>(path: T, timeout: Duration) -> Result<Connection> {
    let path = path.as_ref();
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Couldn't open DHCP registry {}", path.display()))?;
    conn.busy_timeout(timeout)?;

    for table in REGISTRY_TABLES {
        if !conn.table_exists(None, table)? {
            bail!("{} is not a DHCP registry: missing table {table}", path.display());
        }
    }

    log::info!("Opened DHCP registry {}", path.display());
    Ok(conn)
}

fn get_or_init_current_migration(conn: &Connection) -> Result<i32> {
    log::debug!("Checking for migrations");

    if conn.table_exists(None, "migrations")? {
        let version = conn.query_one("SELECT version FROM migrations", [], |r| r.get(0))?;
        Ok(version)
    } else {
        conn.execute_batch(
            "CREATE TABLE migrations (version INTEGER);
                  INSERT INTO migrations (version) VALUES (0)",
        )?;
        Ok(0)
    }
}

fn perform_migrations(conn: &Connection, current_version: i32) -> Result<()> {
    let mut version = current_version;
    while version < LATEST_VERSION {
        version += 1;
        perform_migration(conn, version)?;
    }

    Ok(())
}

fn perform_migration(conn: &Connection, version: i32) -> Result<()> {
    if let Err(e) = conn.execute_batch(MIGRATIONS[version as usize - 1]) {
        log::error!("Couldn't update database. {e}");
        return Err(e.into());
    }

    conn.execute("UPDATE migrations SET version = ?1 ", [version])?;

    Ok(())
}

#[cfg(test)]
pub mod fixtures {
    use rusqlite::Connection;

    pub const REGISTRY_SCHEMA: &str = include_str!("registry.sql");

    pub fn registry() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(REGISTRY_SCHEMA).unwrap();
        conn
    }

    pub fn insert_scope(conn: &Connection, scope: &str, primary_scope: &str) {
        conn.execute(
            "INSERT INTO scopesnew (scope, primscope, class, disabled, total, freeleases, leases) VALUES (?1, ?2, 'cm', 0, 254, 200, 54)",
            [scope, primary_scope],
        )
        .unwrap();
    }

    pub fn insert_ipv6_prefix(conn: &Connection, prefix_name: &str, hostname: &str) {
        conn.execute(
            "INSERT INTO ipv6scopesnew (prefixname, hostname, leased, dynamic) VALUES (?1, ?2, 10, 1)",
            [prefix_name, hostname],
        )
        .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_runs_migrations() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("cache.db");

        let conn = open(&db_path).unwrap();
        assert!(conn.table_exists(None, "validation_cache").unwrap());
        drop(conn);

        // Reopening an up to date database is a no-op.
        let conn = open(&db_path).unwrap();
        let version: i32 = conn
            .query_one("SELECT version FROM migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, LATEST_VERSION);
    }

    #[test]
    fn test_open_registry_read_only() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("dhcp.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(fixtures::REGISTRY_SCHEMA).unwrap();
            fixtures::insert_scope(&conn, "192.0.2.0/24", "192.0.2.0/24");
        }

        let conn = open_registry(&db_path, Duration::from_secs(1)).unwrap();
        let count: i64 = conn
            .query_one("SELECT COUNT(*) FROM scopesnew", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert!(conn.execute("DELETE FROM scopesnew", []).is_err());
    }

    #[test]
    fn test_open_registry_rejects_other_databases() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("cache.db");
        drop(open(&db_path).unwrap());

        assert!(open_registry(&db_path, Duration::from_secs(1)).is_err());
        assert!(open_registry(temp_dir.path().join("missing.db"), Duration::from_secs(1)).is_err());
    }
}
