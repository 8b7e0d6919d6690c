//! Foundation types for Strata.
//!
//! This crate provides the identifiers and value types shared by every other
//! Strata crate. It performs no I/O and knows nothing about encoding; hashing
//! of objects lives in `strata-codec`.
//!
//! # Key Types
//!
//! - [`Hash`] — 32-byte content-addressed commit/content identifier
//! - [`ContentKey`] — ordered path segments naming a logical object
//! - [`ContentId`] — identity of a logical object, stable across edits
//! - [`ContentType`] — one-byte content-type discriminant
//! - [`CommitMeta`] — author, time, message and headers of a commit

pub mod content;
pub mod error;
pub mod hash;
pub mod key;
pub mod meta;

pub use content::{ContentId, ContentType};
pub use error::TypeError;
pub use hash::Hash;
pub use key::ContentKey;
pub use meta::CommitMeta;
