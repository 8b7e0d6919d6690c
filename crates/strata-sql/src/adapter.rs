use std::fmt;
use std::sync::RwLock;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Params, TransactionBehavior};
use strata_codec::{decode, encode};
use strata_model::{Commit, ContentObject, GenerationToken, GlobalState, KeyList, ReferenceRecord};
use strata_store::{
    Adapter, Capabilities, CasOutcome, Missing, ReferenceUpdate, StoreError, StoreResult,
};
use strata_types::{ContentId, Hash};

use crate::config::SqliteConfig;
use crate::schema;

type Conn = PooledConnection<SqliteConnectionManager>;

/// SQLite implementation of [`Adapter`]. Transactional.
pub struct SqliteAdapter {
    pool: RwLock<Option<Pool<SqliteConnectionManager>>>,
    config: SqliteConfig,
}

impl SqliteAdapter {
    /// Open (creating if needed) the database at `config.path` and set up
    /// the schema. Fails with `Connection` if the file cannot be opened.
    pub fn open(config: SqliteConfig) -> StoreResult<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let busy_timeout = config.busy_timeout();
        let manager = SqliteConnectionManager::file(&config.path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .connection_timeout(config.connect_timeout())
            .build(manager)
            .map_err(|e| {
                StoreError::Connection(format!("cannot open {}: {e}", config.path.display()))
            })?;

        let adapter = Self {
            pool: RwLock::new(Some(pool)),
            config,
        };
        let conn = adapter.conn()?;
        schema::setup(&conn).map_err(adapter.fail("setup schema"))?;
        drop(conn);

        tracing::info!(path = %adapter.config.path.display(), "opened sqlite store");
        Ok(adapter)
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Borrow a pooled connection; it returns to the pool when dropped.
    fn conn(&self) -> StoreResult<Conn> {
        let guard = self
            .pool
            .read()
            .map_err(|e| StoreError::Connection(format!("lock poisoned: {e}")))?;
        let pool = guard
            .as_ref()
            .ok_or_else(|| StoreError::Connection("adapter is closed".into()))?;
        pool.get().map_err(|e| {
            tracing::warn!(error = %e, "connection pool exhausted");
            StoreError::Timeout {
                operation: "acquire connection".into(),
                after: self.config.connect_timeout(),
            }
        })
    }

    /// Map a SQLite error for `operation` onto the store taxonomy. A busy or
    /// locked database becomes a timeout; anything else a connection error.
    fn fail(&self, operation: &'static str) -> impl Fn(rusqlite::Error) -> StoreError + '_ {
        move |e| match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StoreError::Timeout {
                operation: operation.into(),
                after: self.config.busy_timeout(),
            },
            _ => StoreError::Connection(format!("{operation}: {e}")),
        }
    }

    fn read_reference(&self, conn: &Connection, name: &str) -> StoreResult<Option<ReferenceRecord>> {
        let data: Option<Vec<u8>> = conn
            .query_row("SELECT data FROM refs WHERE name = ?1", [name], |row| row.get(0))
            .optional()
            .map_err(self.fail("read reference"))?;
        data.map(|bytes| decode::<ReferenceRecord>(&bytes).map_err(StoreError::from))
            .transpose()
    }

    fn fetch_blob<P: Params>(&self, conn: &Connection, sql: &str, key: P) -> StoreResult<Option<Vec<u8>>> {
        conn.query_row(sql, key, |row| row.get(0))
            .optional()
            .map_err(self.fail("read"))
    }
}

impl Adapter for SqliteAdapter {
    fn name(&self) -> &'static str {
        crate::BACKEND
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactional: true,
        }
    }

    fn get_commit(&self, hash: &Hash) -> StoreResult<Commit> {
        let conn = self.conn()?;
        let bytes = self
            .fetch_blob(&conn, "SELECT data FROM commits WHERE hash = ?1", [&hash.as_bytes()[..]])?
            .ok_or_else(|| StoreError::commit_not_found(*hash))?;
        Ok(decode(&bytes)?)
    }

    fn get_commits(&self, hashes: &[Hash]) -> StoreResult<Vec<Commit>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached("SELECT data FROM commits WHERE hash = ?1")
            .map_err(self.fail("get_commits"))?;
        hashes
            .iter()
            .map(|hash| -> StoreResult<Commit> {
                let bytes: Vec<u8> = stmt
                    .query_row([&hash.as_bytes()[..]], |row| row.get(0))
                    .optional()
                    .map_err(self.fail("get_commits"))?
                    .ok_or_else(|| StoreError::commit_not_found(*hash))?;
                Ok(decode(&bytes)?)
            })
            .collect()
    }

    fn put_commits(&self, commits: &[Commit]) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(self.fail("put_commits"))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO commits (hash, parent_hashes, seq, data)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(self.fail("put_commits"))?;
            for commit in commits {
                let parents: Vec<u8> = commit
                    .parents()
                    .iter()
                    .flat_map(|p| p.as_bytes().iter().copied())
                    .collect();
                stmt.execute(params![
                    &commit.hash().as_bytes()[..],
                    parents,
                    commit.seq() as i64,
                    encode(commit)?,
                ])
                .map_err(self.fail("put_commits"))?;
            }
        }
        tx.commit().map_err(self.fail("put_commits"))
    }

    fn get_content(&self, content_id: &ContentId, version: &Hash) -> StoreResult<ContentObject> {
        let conn = self.conn()?;
        let data: Option<Vec<u8>> = conn
            .query_row(
                "SELECT data FROM contents WHERE content_id = ?1 AND version = ?2",
                params![content_id.as_str(), &version.as_bytes()[..]],
                |row| row.get(0),
            )
            .optional()
            .map_err(self.fail("get_content"))?;
        let bytes = data.ok_or_else(|| {
            StoreError::NotFound(Missing::Content {
                content_id: content_id.clone(),
                version: *version,
            })
        })?;
        Ok(decode(&bytes)?)
    }

    fn put_content(&self, contents: &[ContentObject]) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(self.fail("put_content"))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO contents (content_id, version, data) VALUES (?1, ?2, ?3)",
                )
                .map_err(self.fail("put_content"))?;
            for content in contents {
                let version = content.version()?;
                stmt.execute(params![
                    content.content_id.as_str(),
                    &version.as_bytes()[..],
                    encode(content)?,
                ])
                .map_err(self.fail("put_content"))?;
            }
        }
        tx.commit().map_err(self.fail("put_content"))
    }

    fn get_reference(&self, name: &str) -> StoreResult<ReferenceRecord> {
        let conn = self.conn()?;
        self.read_reference(&conn, name)?
            .ok_or_else(|| StoreError::reference_not_found(name))
    }

    fn add_reference(&self, record: &ReferenceRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO refs (name, hash, generation, data) VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.name,
                    &record.hash.as_bytes()[..],
                    record.generation.0 as i64,
                    encode(record)?,
                ],
            )
            .map_err(self.fail("add_reference"))?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(record.name.clone()));
        }
        Ok(())
    }

    fn cas_reference(&self, update: &ReferenceUpdate) -> StoreResult<CasOutcome> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(self.fail("cas_reference"))?;

        let current = self
            .read_reference(&tx, &update.name)?
            .ok_or_else(|| StoreError::reference_not_found(&update.name))?;
        if current.generation != update.expected {
            return Ok(CasOutcome::ConflictRejected { current });
        }

        let next = update.applied_to(&current);
        let updated = tx
            .execute(
                "UPDATE refs SET hash = ?1, generation = ?2, data = ?3
                 WHERE name = ?4 AND generation = ?5",
                params![
                    &next.hash.as_bytes()[..],
                    next.generation.0 as i64,
                    encode(&next)?,
                    update.name,
                    update.expected.0 as i64,
                ],
            )
            .map_err(self.fail("cas_reference"))?;
        if updated != 1 {
            return Ok(CasOutcome::ConflictRejected { current });
        }

        for state in &update.global_state {
            tx.execute(
                "INSERT INTO global_state (content_id, data) VALUES (?1, ?2)
                 ON CONFLICT(content_id) DO UPDATE SET data = excluded.data",
                params![state.content_id.as_str(), encode(state)?],
            )
            .map_err(self.fail("cas_reference"))?;
        }
        tx.commit().map_err(self.fail("cas_reference"))?;
        Ok(CasOutcome::Success)
    }

    fn delete_reference(&self, name: &str, expected: GenerationToken) -> StoreResult<CasOutcome> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(self.fail("delete_reference"))?;
        let current = self
            .read_reference(&tx, name)?
            .ok_or_else(|| StoreError::reference_not_found(name))?;
        if current.generation != expected {
            return Ok(CasOutcome::ConflictRejected { current });
        }
        tx.execute(
            "DELETE FROM refs WHERE name = ?1 AND generation = ?2",
            params![name, expected.0 as i64],
        )
        .map_err(self.fail("delete_reference"))?;
        tx.commit().map_err(self.fail("delete_reference"))?;
        Ok(CasOutcome::Success)
    }

    fn list_references(&self, prefix: &str) -> StoreResult<Vec<ReferenceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT data FROM refs WHERE substr(name, 1, length(?1)) = ?1 ORDER BY name",
            )
            .map_err(self.fail("list_references"))?;
        let rows = stmt
            .query_map([prefix], |row| row.get::<_, Vec<u8>>(0))
            .map_err(self.fail("list_references"))?;
        rows.map(|row| -> StoreResult<ReferenceRecord> {
            let bytes = row.map_err(self.fail("list_references"))?;
            Ok(decode(&bytes)?)
        })
        .collect()
    }

    fn get_key_list(&self, commit: &Hash) -> StoreResult<Option<KeyList>> {
        let conn = self.conn()?;
        self.fetch_blob(&conn, "SELECT data FROM key_lists WHERE commit_hash = ?1", [&commit.as_bytes()[..]])?
            .map(|bytes| decode::<KeyList>(&bytes).map_err(StoreError::from))
            .transpose()
    }

    fn put_key_list(&self, list: &KeyList) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO key_lists (commit_hash, data) VALUES (?1, ?2)",
            params![&list.commit.as_bytes()[..], encode(list)?],
        )
        .map_err(self.fail("put_key_list"))?;
        Ok(())
    }

    fn get_global_state(&self, content_id: &ContentId) -> StoreResult<GlobalState> {
        let conn = self.conn()?;
        let bytes = self
            .fetch_blob(
                &conn,
                "SELECT data FROM global_state WHERE content_id = ?1",
                [content_id.as_str()],
            )?
            .ok_or_else(|| StoreError::NotFound(Missing::GlobalState(content_id.clone())))?;
        Ok(decode(&bytes)?)
    }

    fn erase(&self) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(self.fail("erase"))?;
        for table in schema::TABLES {
            tx.execute(&format!("DELETE FROM {table}"), [])
                .map_err(self.fail("erase"))?;
        }
        tx.commit().map_err(self.fail("erase"))?;
        tracing::info!(path = %self.config.path.display(), "erased sqlite store");
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut guard = self
            .pool
            .write()
            .map_err(|e| StoreError::Connection(format!("lock poisoned: {e}")))?;
        if guard.take().is_some() {
            tracing::debug!(path = %self.config.path.display(), "closed sqlite store");
        }
        Ok(())
    }
}

impl fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("path", &self.config.path)
            .finish()
    }
}
