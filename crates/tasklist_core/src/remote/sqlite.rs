//! SQLite-backed document collection.
//!
//! # Responsibility
//! - Emulate a remote document collection in a local database file.
//! - Keep SQL details inside this backend.
//!
//! # Invariants
//! - Each instance only sees rows of its own `collection`.
//! - `tags` is stored as a JSON array of strings.
//! - Rows are listed in creation order.

use super::{DocumentCollection, RemoteError, RemoteResult};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::document::{StoredDocument, TodoDocument};
use crate::model::task::RemoteId;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Document collection persisted in the `documents` table.
pub struct SqliteCollection {
    conn: Mutex<Connection>,
    collection: String,
}

impl SqliteCollection {
    /// Opens (and migrates) the database at `path`.
    pub fn open(path: impl AsRef<Path>, collection: &str) -> RemoteResult<Self> {
        let conn = open_db(path)?;
        Ok(Self::from_connection(conn, collection))
    }

    pub fn open_in_memory(collection: &str) -> RemoteResult<Self> {
        let conn = open_db_in_memory()?;
        Ok(Self::from_connection(conn, collection))
    }

    fn from_connection(conn: Connection, collection: &str) -> Self {
        Self {
            conn: Mutex::new(conn),
            collection: collection.trim().to_string(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn lock(&self) -> RemoteResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RemoteError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

impl DocumentCollection for SqliteCollection {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn list_documents(&self) -> RemoteResult<Vec<StoredDocument>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, done, tags
             FROM documents
             WHERE collection = ?1
             ORDER BY created_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([self.collection.as_str()])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(parse_document_row(row)?);
        }
        Ok(documents)
    }

    fn create_document(&self, document: &TodoDocument) -> RemoteResult<RemoteId> {
        let id = Uuid::new_v4().simple().to_string();
        let tags = encode_tags(&document.tags)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (id, collection, title, done, tags)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                id.as_str(),
                self.collection.as_str(),
                document.title.as_str(),
                document.done,
                tags,
            ],
        )?;
        Ok(id)
    }

    fn update_document(&self, id: &str, document: &TodoDocument) -> RemoteResult<()> {
        let tags = encode_tags(&document.tags)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE documents
             SET
                title = ?1,
                done = ?2,
                tags = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?4 AND collection = ?5;",
            params![
                document.title.as_str(),
                document.done,
                tags,
                id,
                self.collection.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete_document(&self, id: &str) -> RemoteResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM documents WHERE id = ?1 AND collection = ?2;",
            params![id, self.collection.as_str()],
        )?;
        if changed == 0 {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

impl From<DbError> for RemoteError {
    fn from(value: DbError) -> Self {
        Self::Unavailable(value.to_string())
    }
}

impl From<rusqlite::Error> for RemoteError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Unavailable(value.to_string())
    }
}

fn parse_document_row(row: &Row<'_>) -> RemoteResult<StoredDocument> {
    let id: String = row.get("id")?;
    let tags_text: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_text).map_err(|err| {
        RemoteError::InvalidData(format!("invalid tags value in documents.tags for {id}: {err}"))
    })?;

    Ok(StoredDocument {
        document: TodoDocument {
            title: row.get("title")?,
            done: row.get("done")?,
            tags,
        },
        id,
    })
}

fn encode_tags(tags: &[String]) -> RemoteResult<String> {
    serde_json::to_string(tags)
        .map_err(|err| RemoteError::InvalidData(format!("failed to encode tags: {err}")))
}
