use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use std::path::Path;

use super::{check_write, Document, DocumentStore};
use crate::db::{migrate, Db};
use crate::error::{ComicdeskError, Result};

/// Document store kept in a local SQLite file.
///
/// Same layout as Firestore: one row per (collection path, document id), the
/// document body stored as JSON text.
pub struct SqliteDocumentStore {
    db: Db,
}

impl SqliteDocumentStore {
    /// Open the store and apply pending migrations
    pub async fn open<P: AsRef<Path>, M: AsRef<Path>>(db_path: P, migrations_dir: M) -> Result<Self> {
        let db = Db::new(db_path);
        let migrations_dir = migrations_dir.as_ref().to_path_buf();
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await?;
        log::info!("SQLite document store ready at {}", db.path().display());
        Ok(Self { db })
    }
}

fn parse_row(id: String, data_json: String) -> Result<Document> {
    let data: Value = serde_json::from_str(&data_json)?;
    Ok(Document { id, data })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let collection = collection.to_string();
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT doc_id, data_json FROM documents WHERE collection = ?1 ORDER BY doc_id",
                )?;
                let rows = stmt.query_map(params![collection], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;

                let mut docs = Vec::new();
                for row in rows {
                    let (id, data_json) = row?;
                    docs.push(parse_row(id, data_json)?);
                }
                Ok::<Vec<Document>, ComicdeskError>(docs)
            })
            .await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.db
            .with_connection(move |conn| {
                let data_json: Option<String> = conn
                    .query_row(
                        "SELECT data_json FROM documents WHERE collection = ?1 AND doc_id = ?2",
                        params![collection, id],
                        |row| row.get(0),
                    )
                    .optional()?;
                data_json.map(|json| parse_row(id, json)).transpose()
            })
            .await
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        check_write(collection, id, &data)?;

        let collection = collection.to_string();
        let id = id.to_string();
        let data_json = serde_json::to_string(&data)?;
        let updated_at = Utc::now().to_rfc3339();

        self.db
            .with_connection(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO documents (collection, doc_id, data_json, updated_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(collection, doc_id) DO UPDATE SET
                        data_json = excluded.data_json,
                        updated_at = excluded.updated_at
                    "#,
                    params![collection, id, data_json, updated_at],
                )?;
                Ok::<(), ComicdeskError>(())
            })
            .await
    }

    /// Fold the write-ahead log back into the database file
    async fn close(&self) -> Result<()> {
        let (busy, frames) = self
            .db
            .with_connection(|conn| {
                let counts = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?;
                Ok::<(i64, i64), ComicdeskError>(counts)
            })
            .await?;
        if busy != 0 {
            log::warn!("WAL checkpoint of {} was blocked by another connection", self.db.path().display());
        } else {
            log::info!("Checkpointed {} ({} WAL frames)", self.db.path().display(), frames.max(0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_store(temp_dir: &TempDir) -> SqliteDocumentStore {
        SqliteDocumentStore::open(temp_dir.path().join("catalog.db"), "migrations")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_get_list() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        store.set("comics/foo/episodes", "episode02", json!({"number": 2})).await.unwrap();
        store.set("comics/foo/episodes", "episode01", json!({"number": 1})).await.unwrap();
        store.set("comics", "foo", json!({"title": "Foo"})).await.unwrap();

        let units = store.list("comics/foo/episodes").await.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].id, "episode01");
        assert_eq!(units[1].data, json!({"number": 2}));

        let title = store.get("comics", "foo").await.unwrap().unwrap();
        assert_eq!(title.data["title"], "Foo");
        assert!(store.get("comics", "bar").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_is_full_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;

        store.set("comics", "foo", json!({"author": "A", "isNew": true})).await.unwrap();
        store.set("comics", "foo", json!({"author": "B"})).await.unwrap();

        let doc = store.get("comics", "foo").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"author": "B"}));
        assert_eq!(store.list("comics").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_keeps_documents() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = open_store(&temp_dir).await;
            store.set("comics", "foo", json!({"title": "Foo"})).await.unwrap();
        }
        let store = open_store(&temp_dir).await;
        assert_eq!(store.list("comics").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_close_leaves_empty_wal() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir).await;
        for n in 0..20 {
            store.set("comics", &format!("t{}", n), json!({"n": n})).await.unwrap();
        }

        store.close().await.unwrap();

        let wal = temp_dir.path().join("catalog.db-wal");
        assert!(!wal.exists() || std::fs::metadata(&wal).unwrap().len() == 0);
        assert_eq!(store.list("comics").await.unwrap().len(), 20);
    }
}
