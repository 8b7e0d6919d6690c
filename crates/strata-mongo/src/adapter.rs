use std::fmt;
use std::sync::RwLock;

use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{doc, Binary, Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, FindOptions, InsertManyOptions, ReplaceOptions, ServerAddress};
use mongodb::sync::{Client, Collection, Database};
use strata_codec::{decode, encode};
use strata_model::{Commit, ContentObject, GenerationToken, GlobalState, KeyList, ReferenceRecord};
use strata_store::{
    Adapter, Capabilities, CasOutcome, Missing, ReferenceUpdate, StoreError, StoreResult,
};
use strata_types::{ContentId, Hash};

use crate::config::MongoConfig;

const COMMITS: &str = "commits";
const CONTENTS: &str = "contents";
const REFS: &str = "refs";
const KEY_LISTS: &str = "key_lists";
const GLOBAL_STATE: &str = "global_state";

const COLLECTIONS: [&str; 5] = [COMMITS, CONTENTS, REFS, KEY_LISTS, GLOBAL_STATE];

const DUPLICATE_KEY: i32 = 11000;

fn binary(bytes: impl Into<Vec<u8>>) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes: bytes.into(),
    })
}

fn frame_of(doc: &Document) -> StoreResult<&[u8]> {
    doc.get_binary_generic("data")
        .map(Vec::as_slice)
        .map_err(|e| StoreError::corrupt("document", e))
}

fn generation(token: GenerationToken) -> StoreResult<i64> {
    i64::try_from(token.0)
        .map_err(|_| StoreError::InvalidArgument(format!("generation {token} out of range")))
}

fn content_id_doc(content_id: &ContentId, version: &Hash) -> Document {
    doc! { "content_id": content_id.as_str(), "version": binary(version.as_bytes().to_vec()) }
}

/// True when every error of a failed insert is a duplicate key, which for
/// immutable objects means the write already happened.
fn only_duplicates(e: &MongoError) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(w)) => w.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(failure) => {
            failure.write_concern_error.is_none()
                && failure
                    .write_errors
                    .as_ref()
                    .is_some_and(|errors| errors.iter().all(|w| w.code == DUPLICATE_KEY))
        }
        _ => false,
    }
}

/// MongoDB implementation of [`Adapter`]. Not transactional.
pub struct MongoAdapter {
    db: RwLock<Option<Database>>,
    config: MongoConfig,
}

impl MongoAdapter {
    /// Connect and ping the server. Fails with `Connection` when no server is
    /// reachable within the server-selection timeout.
    pub fn open(config: MongoConfig) -> StoreResult<Self> {
        let hosts = config
            .hosts
            .iter()
            .map(|h| {
                ServerAddress::parse(h)
                    .map_err(|e| StoreError::InvalidArgument(format!("invalid host {h:?}: {e}")))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        if hosts.is_empty() {
            return Err(StoreError::InvalidArgument("no mongodb hosts configured".into()));
        }
        let options = ClientOptions::builder()
            .hosts(hosts)
            .app_name(config.app_name.clone())
            .server_selection_timeout(config.server_selection_timeout())
            .connect_timeout(config.connect_timeout())
            .build();
        let client = Client::with_options(options)
            .map_err(|e| StoreError::Connection(format!("cannot create client: {e}")))?;
        let db = client.database(&config.database);
        db.run_command(doc! { "ping": 1 }, None)
            .map_err(|e| StoreError::Connection(format!("cannot reach mongodb: {e}")))?;

        tracing::info!(hosts = ?config.hosts, database = %config.database, "opened mongodb store");
        Ok(Self {
            db: RwLock::new(Some(db)),
            config,
        })
    }

    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    fn collection(&self, name: &str) -> StoreResult<Collection<Document>> {
        let guard = self
            .db
            .read()
            .map_err(|e| StoreError::Connection(format!("lock poisoned: {e}")))?;
        let db = guard
            .as_ref()
            .ok_or_else(|| StoreError::Connection("adapter is closed".into()))?;
        Ok(db.collection(name))
    }

    /// Map a driver error for `operation` onto the store taxonomy.
    fn fail(&self, operation: &'static str) -> impl Fn(MongoError) -> StoreError + '_ {
        move |e| match e.kind.as_ref() {
            ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => StoreError::Timeout {
                operation: operation.into(),
                after: self.config.connect_timeout(),
            },
            ErrorKind::ServerSelection { .. } => StoreError::Timeout {
                operation: operation.into(),
                after: self.config.server_selection_timeout(),
            },
            _ => StoreError::Connection(format!("{operation}: {e}")),
        }
    }

    fn find_frame(&self, collection: &str, id: impl Into<Bson>) -> StoreResult<Option<Vec<u8>>> {
        let id: Bson = id.into();
        let found = self
            .collection(collection)?
            .find_one(doc! { "_id": id }, None)
            .map_err(self.fail("find"))?;
        found.map(|doc| frame_of(&doc).map(<[u8]>::to_vec)).transpose()
    }

    /// Insert immutable documents, ignoring ones that already exist.
    fn insert_frames(&self, collection: &str, docs: Vec<Document>) -> StoreResult<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let options = InsertManyOptions::builder().ordered(false).build();
        match self.collection(collection)?.insert_many(docs, options) {
            Ok(_) => Ok(()),
            Err(e) if only_duplicates(&e) => Ok(()),
            Err(e) => Err(self.fail("insert")(e)),
        }
    }

    fn read_reference(&self, name: &str) -> StoreResult<Option<ReferenceRecord>> {
        self.find_frame(REFS, name)?
            .map(|frame| decode::<ReferenceRecord>(&frame).map_err(StoreError::from))
            .transpose()
    }

    fn reference_doc(record: &ReferenceRecord) -> StoreResult<Document> {
        Ok(doc! {
            "_id": record.name.as_str(),
            "hash": binary(record.hash.as_bytes().to_vec()),
            "generation": generation(record.generation)?,
            "data": binary(encode(record)?),
        })
    }

    /// Report why a filtered write on `name` matched nothing.
    fn rejected(&self, name: &str) -> StoreResult<CasOutcome> {
        match self.read_reference(name)? {
            Some(current) => Ok(CasOutcome::ConflictRejected { current }),
            None => Err(StoreError::reference_not_found(name)),
        }
    }
}

impl Adapter for MongoAdapter {
    fn name(&self) -> &'static str {
        crate::BACKEND
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactional: false,
        }
    }

    fn get_commit(&self, hash: &Hash) -> StoreResult<Commit> {
        let frame = self
            .find_frame(COMMITS, binary(hash.as_bytes().to_vec()))?
            .ok_or_else(|| StoreError::commit_not_found(*hash))?;
        Ok(decode(&frame)?)
    }

    fn put_commits(&self, commits: &[Commit]) -> StoreResult<()> {
        let docs = commits
            .iter()
            .map(|c| -> StoreResult<_> {
                let parents: Vec<Bson> = c
                    .parents()
                    .iter()
                    .map(|p| binary(p.as_bytes().to_vec()))
                    .collect();
                Ok(doc! {
                    "_id": binary(c.hash().as_bytes().to_vec()),
                    "parents": parents,
                    "seq": i64::try_from(c.seq()).unwrap_or(i64::MAX),
                    "data": binary(encode(c)?),
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        self.insert_frames(COMMITS, docs)
    }

    fn get_content(&self, content_id: &ContentId, version: &Hash) -> StoreResult<ContentObject> {
        let frame = self
            .find_frame(CONTENTS, content_id_doc(content_id, version))?
            .ok_or_else(|| {
                StoreError::NotFound(Missing::Content {
                    content_id: content_id.clone(),
                    version: *version,
                })
            })?;
        Ok(decode(&frame)?)
    }

    fn put_content(&self, contents: &[ContentObject]) -> StoreResult<()> {
        let docs = contents
            .iter()
            .map(|c| -> StoreResult<_> {
                Ok(doc! {
                    "_id": content_id_doc(&c.content_id, &c.version()?),
                    "data": binary(encode(c)?),
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        self.insert_frames(CONTENTS, docs)
    }

    fn get_reference(&self, name: &str) -> StoreResult<ReferenceRecord> {
        self.read_reference(name)?
            .ok_or_else(|| StoreError::reference_not_found(name))
    }

    fn add_reference(&self, record: &ReferenceRecord) -> StoreResult<()> {
        match self.collection(REFS)?.insert_one(Self::reference_doc(record)?, None) {
            Ok(_) => Ok(()),
            Err(e) if only_duplicates(&e) => Err(StoreError::AlreadyExists(record.name.clone())),
            Err(e) => Err(self.fail("add reference")(e)),
        }
    }

    fn cas_reference(&self, update: &ReferenceUpdate) -> StoreResult<CasOutcome> {
        let current = self
            .read_reference(&update.name)?
            .ok_or_else(|| StoreError::reference_not_found(&update.name))?;
        if current.generation != update.expected {
            return Ok(CasOutcome::ConflictRejected { current });
        }

        let replacement = Self::reference_doc(&update.applied_to(&current))?;
        let result = self
            .collection(REFS)?
            .replace_one(
                doc! { "_id": update.name.as_str(), "generation": generation(update.expected)? },
                replacement,
                None,
            )
            .map_err(self.fail("cas reference"))?;
        if result.matched_count == 0 {
            return self.rejected(&update.name);
        }

        let upsert = ReplaceOptions::builder().upsert(true).build();
        let states = self.collection(GLOBAL_STATE)?;
        for state in &update.global_state {
            states
                .replace_one(
                    doc! { "_id": state.content_id.as_str() },
                    doc! { "_id": state.content_id.as_str(), "data": binary(encode(state)?) },
                    upsert.clone(),
                )
                .map_err(self.fail("write global state"))?;
        }
        Ok(CasOutcome::Success)
    }

    fn delete_reference(&self, name: &str, expected: GenerationToken) -> StoreResult<CasOutcome> {
        let result = self
            .collection(REFS)?
            .delete_one(doc! { "_id": name, "generation": generation(expected)? }, None)
            .map_err(self.fail("delete reference"))?;
        if result.deleted_count == 0 {
            return self.rejected(name);
        }
        Ok(CasOutcome::Success)
    }

    fn list_references(&self, prefix: &str) -> StoreResult<Vec<ReferenceRecord>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self
            .collection(REFS)?
            .find(doc! { "_id": { "$gte": prefix } }, options)
            .map_err(self.fail("list references"))?;
        let mut records = Vec::new();
        for doc in cursor {
            let doc = doc.map_err(self.fail("list references"))?;
            let record: ReferenceRecord = decode(frame_of(&doc)?)?;
            if !record.name.starts_with(prefix) {
                break;
            }
            records.push(record);
        }
        Ok(records)
    }

    fn get_key_list(&self, commit: &Hash) -> StoreResult<Option<KeyList>> {
        self.find_frame(KEY_LISTS, binary(commit.as_bytes().to_vec()))?
            .map(|frame| decode::<KeyList>(&frame).map_err(StoreError::from))
            .transpose()
    }

    fn put_key_list(&self, list: &KeyList) -> StoreResult<()> {
        let doc = doc! {
            "_id": binary(list.commit.as_bytes().to_vec()),
            "data": binary(encode(list)?),
        };
        self.insert_frames(KEY_LISTS, vec![doc])
    }

    fn get_global_state(&self, content_id: &ContentId) -> StoreResult<GlobalState> {
        let frame = self
            .find_frame(GLOBAL_STATE, content_id.as_str())?
            .ok_or_else(|| StoreError::NotFound(Missing::GlobalState(content_id.clone())))?;
        Ok(decode(&frame)?)
    }

    fn erase(&self) -> StoreResult<()> {
        for name in COLLECTIONS {
            self.collection(name)?
                .delete_many(doc! {}, None)
                .map_err(self.fail("erase"))?;
        }
        tracing::info!(database = %self.config.database, "erased mongodb store");
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut guard = self
            .db
            .write()
            .map_err(|e| StoreError::Connection(format!("lock poisoned: {e}")))?;
        if guard.take().is_some() {
            tracing::debug!(database = %self.config.database, "closed mongodb store");
        }
        Ok(())
    }
}

impl fmt::Debug for MongoAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoAdapter")
            .field("hosts", &self.config.hosts)
            .field("database", &self.config.database)
            .finish()
    }
}
