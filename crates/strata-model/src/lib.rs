//! Commit object model for Strata.
//!
//! Pure data: no I/O. Every persisted type implements
//! [`strata_codec::Canonical`], so encoding and hashing go through one codec.
//!
//! # Object Types
//!
//! - [`Commit`] -- immutable DAG node: parents, sequence number, metadata and
//!   the key delta against its first parent
//! - [`Operation`] -- one entry of a commit delta (`Put` or `Delete`)
//! - [`ContentObject`] -- a version of a logical object; its version hash is
//!   the hash of its encoding
//! - [`ReferenceRecord`] -- a named branch or tag plus its generation token
//! - [`KeyList`] -- full key-space snapshot attached to a commit
//! - [`GlobalState`] -- per-content-id record kept outside the DAG
//!
//! # Design Rules
//!
//! 1. Values are immutable once built; commits only come out of [`CommitBuilder`].
//! 2. Collections are held in canonical order, so equal values encode identically.
//! 3. A commit's delta touches each key at most once.
//! 4. A commit's hash is never trusted from storage; it is recomputed on decode.

pub mod commit;
pub mod content;
pub mod error;
pub mod global;
pub mod key_list;
pub mod names;
pub mod reference;

pub use commit::{Commit, CommitBuilder, Operation};
pub use content::ContentObject;
pub use error::{ModelError, ModelResult};
pub use global::GlobalState;
pub use key_list::{KeyEntry, KeyList};
pub use names::validate_reference_name;
pub use reference::{GenerationToken, ReferenceKind, ReferenceRecord};

pub use strata_types::{CommitMeta, ContentId, ContentKey, ContentType, Hash};
