//! SQLite implementation of the [`Catalog`] contract.

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, params_from_iter, Connection};
use tracing::info;

use quay_types::plugin::{PluginProtocol, PluginStatus};
use quay_types::{JsonMap, NewPlugin, PluginRecord, QuayError};

use crate::{Catalog, PluginFilter};

const COLUMNS: &str = "id, name, version, plugin_type, description, status, binary_path, \
                       download_url, protocol, protocol_version, checksum, config, metadata, \
                       created_at, updated_at, last_used_at";

/// SQLite-backed plugin catalog.
///
/// The connection is guarded by a mutex; every operation is a single short
/// statement (or insert + read-back), so contention is negligible next to the
/// subprocess and network work around it.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open (or create) the catalog at the given path.
    ///
    /// Enables WAL mode and creates the `plugins` table and indices if they
    /// do not exist. The unique index on `(name, version)` enforces plugin
    /// identity uniqueness.
    pub fn open(path: &Path) -> Result<Self, QuayError> {
        let conn = Connection::open(path)
            .map_err(|e| QuayError::Catalog(format!("failed to open database: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| QuayError::Catalog(format!("failed to set WAL mode: {e}")))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory catalog (tests).
    pub fn open_in_memory() -> Result<Self, QuayError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| QuayError::Catalog(format!("failed to open database: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, QuayError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS plugins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                plugin_type TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                binary_path TEXT NOT NULL,
                download_url TEXT,
                protocol TEXT NOT NULL DEFAULT 'grpc',
                protocol_version INTEGER NOT NULL DEFAULT 1,
                checksum TEXT,
                config TEXT NOT NULL DEFAULT '{}',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_used_at INTEGER,
                UNIQUE (name, version)
            );
            CREATE INDEX IF NOT EXISTS idx_plugins_status ON plugins(status);
            CREATE INDEX IF NOT EXISTS idx_plugins_type ON plugins(plugin_type);",
        )
        .map_err(|e| QuayError::Catalog(format!("failed to create schema: {e}")))?;

        info!("plugin catalog opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn get_by_id(conn: &Connection, id: i64) -> Result<Option<PluginRecord>, QuayError> {
        let mut stmt = conn
            .prepare(&format!("SELECT {COLUMNS} FROM plugins WHERE id = ?1"))
            .map_err(|e| QuayError::Catalog(format!("failed to prepare query: {e}")))?;
        let mut rows = stmt
            .query_map(params![id], row_to_record)
            .map_err(|e| QuayError::Catalog(format!("failed to query plugin {id}: {e}")))?;
        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(QuayError::Catalog(format!("failed to read plugin {id}: {e}"))),
            None => Ok(None),
        }
    }
}

impl Catalog for SqliteCatalog {
    fn create(&self, plugin: NewPlugin) -> Result<PluginRecord, QuayError> {
        let now = chrono::Utc::now().timestamp();
        let config = serde_json::to_string(&plugin.config)
            .map_err(|e| QuayError::Catalog(format!("failed to encode config: {e}")))?;
        let metadata = serde_json::to_string(&plugin.metadata)
            .map_err(|e| QuayError::Catalog(format!("failed to encode metadata: {e}")))?;

        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO plugins (name, version, plugin_type, description, status, binary_path, \
             download_url, protocol, protocol_version, checksum, config, metadata, created_at, \
             updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                plugin.name,
                plugin.version,
                plugin.plugin_type,
                plugin.description,
                plugin.status.as_str(),
                plugin.binary_path,
                plugin.download_url,
                plugin.protocol.as_str(),
                plugin.protocol_version,
                plugin.checksum,
                config,
                metadata,
                now,
                now,
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(QuayError::AlreadyExists {
                    name: plugin.name,
                    version: plugin.version,
                });
            }
            Err(e) => {
                return Err(QuayError::Catalog(format!(
                    "failed to insert plugin {}: {e}",
                    plugin.name
                )));
            }
        }

        let id = conn.last_insert_rowid();
        Self::get_by_id(&conn, id)?
            .ok_or_else(|| QuayError::Catalog(format!("plugin {id} vanished after insert")))
    }

    fn find_by_id(&self, id: i64) -> Result<Option<PluginRecord>, QuayError> {
        let conn = self.conn.lock().unwrap();
        Self::get_by_id(&conn, id)
    }

    fn find_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<PluginRecord>, QuayError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM plugins WHERE name = ?1 AND version = ?2"
            ))
            .map_err(|e| QuayError::Catalog(format!("failed to prepare query: {e}")))?;
        let mut rows = stmt
            .query_map(params![name, version], row_to_record)
            .map_err(|e| QuayError::Catalog(format!("failed to query plugin {name}: {e}")))?;
        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(QuayError::Catalog(format!(
                "failed to read plugin {name}: {e}"
            ))),
            None => Ok(None),
        }
    }

    fn find_all(&self, filter: &PluginFilter) -> Result<Vec<PluginRecord>, QuayError> {
        let mut sql = format!("SELECT {COLUMNS} FROM plugins");
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            args.push(status.as_str().to_string());
        }
        if let Some(plugin_type) = &filter.plugin_type {
            clauses.push("plugin_type = ?");
            args.push(plugin_type.clone());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| QuayError::Catalog(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), row_to_record)
            .map_err(|e| QuayError::Catalog(format!("failed to query plugins: {e}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| QuayError::Catalog(format!("failed to read plugins: {e}")))
    }

    fn update_status(&self, id: i64, status: PluginStatus) -> Result<(), QuayError> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute(
                "UPDATE plugins SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, id],
            )
            .map_err(|e| QuayError::Catalog(format!("failed to update plugin {id}: {e}")))?;
        if affected == 0 {
            return Err(QuayError::NotFound(id));
        }
        Ok(())
    }

    fn update_last_used_at(&self, id: i64, ts: i64) -> Result<(), QuayError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute(
                "UPDATE plugins SET last_used_at = ?1 WHERE id = ?2",
                params![ts, id],
            )
            .map_err(|e| QuayError::Catalog(format!("failed to update plugin {id}: {e}")))?;
        if affected == 0 {
            return Err(QuayError::NotFound(id));
        }
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<(), QuayError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute("DELETE FROM plugins WHERE id = ?1", params![id])
            .map_err(|e| QuayError::Catalog(format!("failed to delete plugin {id}: {e}")))?;
        if affected == 0 {
            return Err(QuayError::NotFound(id));
        }
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PluginRecord> {
    let status: String = row.get(5)?;
    let status = PluginStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let protocol: String = row.get(8)?;
    let protocol = PluginProtocol::from_str(&protocol).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let config: String = row.get(11)?;
    let config: JsonMap = serde_json::from_str(&config).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let metadata: String = row.get(12)?;
    let metadata: JsonMap = serde_json::from_str(&metadata).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(PluginRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        plugin_type: row.get(3)?,
        description: row.get(4)?,
        status,
        binary_path: row.get(6)?,
        download_url: row.get(7)?,
        protocol,
        protocol_version: row.get(9)?,
        checksum: row.get(10)?,
        config,
        metadata,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        last_used_at: row.get(15)?,
    })
}
