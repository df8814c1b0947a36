use crate::api::models::Conversation;
use directories::ProjectDirs;
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no data directory available")]
    NoDataDir,
    #[error("cache directory could not be created: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("participants column is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "example", "FirechatGtk")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

fn open_at(path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(Connection::open(path)?)
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT NOT NULL,
            owner TEXT NOT NULL,
            participants TEXT NOT NULL,
            name TEXT,
            photo_url TEXT,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (id, owner)
        );
        "#,
    )?;
    Ok(())
}

// Cached membership snapshots so the conversation list has something to show
// before the first query answers.
pub fn init() -> Result<(), StorageError> {
    let path = db_path().ok_or(StorageError::NoDataDir)?;
    let conn = open_at(&path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    migrate(&conn)
}

fn upsert(conn: &Connection, owner: &str, conv: &Conversation, updated_at: i64) -> Result<(), StorageError> {
    conn.execute(
        r#"
        INSERT INTO conversations (id, owner, participants, name, photo_url, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(id, owner) DO UPDATE SET
            participants=excluded.participants,
            name=excluded.name,
            photo_url=excluded.photo_url,
            updated_at=excluded.updated_at
        "#,
        params![
            conv.id,
            owner,
            serde_json::to_string(&conv.participants)?,
            conv.name,
            conv.photo_url,
            updated_at
        ],
    )?;
    Ok(())
}

/// Replace everything cached for `owner` with a fresh query result.
fn replace_in(conn: &mut Connection, owner: &str, convs: &[Conversation]) -> Result<(), StorageError> {
    let stamp = now();
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM conversations WHERE owner = ?1", params![owner])?;
    for c in convs {
        upsert(&tx, owner, c, stamp)?;
    }
    tx.commit()?;
    Ok(())
}

fn load_in(conn: &Connection, owner: &str, limit: usize) -> Result<Vec<Conversation>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT id, participants, name, photo_url FROM conversations
         WHERE owner = ?1 ORDER BY updated_at DESC, id ASC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![owner, limit as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for r in rows {
        let (id, participants, name, photo_url) = r?;
        out.push(Conversation {
            id,
            participants: serde_json::from_str(&participants)?,
            name,
            photo_url,
        });
    }
    Ok(out)
}

/// Handle on a cache database file. Cheap to clone and `Send`, so it can be
/// moved into blocking tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cache {
    path: PathBuf,
}

impl Cache {
    /// The per-user cache under the platform data directory.
    pub fn user() -> Result<Self, StorageError> {
        db_path().map(Self::at).ok_or(StorageError::NoDataDir)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open(&self) -> Result<Connection, StorageError> {
        let conn = open_at(&self.path)?;
        migrate(&conn)?;
        Ok(conn)
    }

    pub fn replace_conversations(&self, owner: &str, convs: &[Conversation]) -> Result<(), StorageError> {
        let mut conn = self.open()?;
        replace_in(&mut conn, owner, convs)
    }

    pub fn upsert_conversation(&self, owner: &str, conv: &Conversation) -> Result<(), StorageError> {
        let conn = self.open()?;
        upsert(&conn, owner, conv, now())
    }

    pub fn conversations_for(&self, owner: &str, limit: Option<usize>) -> Result<Vec<Conversation>, StorageError> {
        let conn = self.open()?;
        load_in(&conn, owner, limit.unwrap_or(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(id: &str, users: &[&str]) -> Conversation {
        Conversation {
            id: id.into(),
            participants: users.iter().map(|u| u.to_string()).collect(),
            name: None,
            photo_url: None,
        }
    }

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn replace_drops_stale_rows_for_owner_only() {
        let mut conn = memory();
        replace_in(&mut conn, "me@x.com", &[conv("a", &["me@x.com", "a@b.com"]), conv("b", &["me@x.com", "b@b.com"])]).unwrap();
        replace_in(&mut conn, "other@x.com", &[conv("c", &["other@x.com", "a@b.com"])]).unwrap();
        replace_in(&mut conn, "me@x.com", &[conv("b", &["me@x.com", "b@b.com"])]).unwrap();

        let mine = load_in(&conn, "me@x.com", 10).unwrap();
        assert_eq!(mine, vec![conv("b", &["me@x.com", "b@b.com"])]);
        assert_eq!(load_in(&conn, "other@x.com", 10).unwrap().len(), 1);
    }

    #[test]
    fn upsert_keeps_group_fields() {
        let conn = memory();
        let mut group = conv("g", &["me@x.com", "a@b.com", "c@d.com"]);
        group.name = Some("Climbing".into());
        upsert(&conn, "me@x.com", &group, 1).unwrap();
        upsert(&conn, "me@x.com", &group, 2).unwrap();
        assert_eq!(load_in(&conn, "me@x.com", 10).unwrap(), vec![group]);
    }

    #[test]
    fn file_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::at(dir.path().join("nested").join("cache.sqlite"));
        let chat = conv("a", &["me@x.com", "a@b.com"]);
        cache.upsert_conversation("me@x.com", &chat).unwrap();

        let reopened = Cache::at(dir.path().join("nested").join("cache.sqlite"));
        assert_eq!(reopened.conversations_for("me@x.com", None).unwrap(), vec![chat]);
        assert!(reopened.conversations_for("nobody@x.com", None).unwrap().is_empty());
    }
}
