//! Settings key-value repository.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::models::Config;

/// Repository for the `config` table.
pub struct ConfigRepo;

impl ConfigRepo {
    /// Get a value.
    pub fn get(conn: &Connection, key: &str) -> Result<Option<Config>> {
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT key, value FROM config WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(key, value)| Config {
            value: decode(&key, &value),
            key,
        }))
    }

    /// Set a value (insert or update).
    pub fn set(conn: &Connection, key: &str, value: &Value) -> Result<()> {
        let value_json = serde_json::to_string(value)?;

        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value_json],
        )?;

        Ok(())
    }

    /// Delete a value.
    pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM config WHERE key = ?1", [key])?;
        Ok(deleted > 0)
    }

    /// Get all values, ordered by key.
    pub fn get_all(conn: &Connection) -> Result<Vec<Config>> {
        let mut stmt = conn.prepare("SELECT key, value FROM config ORDER BY key")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(key, value)| Config {
                value: decode(&key, &value),
                key,
            })
            .collect())
    }
}

/// Unparseable values read as null; settings then fall back to defaults.
fn decode(key: &str, raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(key, error = %e, "Stored value is not valid JSON");
        Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use serde_json::json;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_set_and_get() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "proxy_mode", &json!("smart")).unwrap();
        let config = ConfigRepo::get(&conn, "proxy_mode").unwrap().unwrap();

        assert_eq!(config.key, "proxy_mode");
        assert_eq!(config.value, json!("smart"));
    }

    #[test]
    fn test_update_existing() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "auto_reconnect", &json!(true)).unwrap();
        ConfigRepo::set(&conn, "auto_reconnect", &json!(false)).unwrap();

        let config = ConfigRepo::get(&conn, "auto_reconnect").unwrap().unwrap();
        assert_eq!(config.value, json!(false));
        assert_eq!(ConfigRepo::get_all(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let conn = setup_db();
        assert!(ConfigRepo::get(&conn, "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "to_delete", &json!("value")).unwrap();
        assert!(ConfigRepo::delete(&conn, "to_delete").unwrap());
        assert!(ConfigRepo::get(&conn, "to_delete").unwrap().is_none());
        assert!(!ConfigRepo::delete(&conn, "to_delete").unwrap());
    }

    #[test]
    fn test_get_all_sorted() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "c", &json!(3)).unwrap();
        ConfigRepo::set(&conn, "a", &json!(1)).unwrap();
        ConfigRepo::set(&conn, "b", &json!(2)).unwrap();

        let keys: Vec<String> = ConfigRepo::get_all(&conn)
            .unwrap()
            .into_iter()
            .map(|c| c.key)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_corrupt_value_reads_as_null() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO config (key, value) VALUES ('reconnect_interval_minutes', 'not json')",
            [],
        )
        .unwrap();

        let config = ConfigRepo::get(&conn, "reconnect_interval_minutes")
            .unwrap()
            .unwrap();
        assert_eq!(config.value, Value::Null);
    }
}
