//! Canonical encoding and hashing for Strata.
//!
//! Every persisted object is encoded as a small frame:
//!
//! ```text
//! [2 bytes magic "ST"][1 byte format version][1 byte kind tag][bincode payload]
//! ```
//!
//! The payload uses fixed-width little-endian integers and rejects trailing
//! bytes, so the mapping between values and bytes is one-to-one. Types that
//! contain collections keep them in canonical order (sorted by key) and
//! declare it through [`Canonical::validate`]; decoding a frame whose payload
//! breaks that order fails instead of silently reordering.
//!
//! Object identifiers are `blake3(domain ":" frame)`, with one domain tag per
//! object kind (see [`ContentHasher`]).

pub mod codec;
pub mod error;
pub mod hasher;

pub use codec::{decode, encode, hash, peek_kind, Canonical, ObjectKind, FORMAT_VERSION, MAGIC};
pub use error::{CodecError, CodecResult};
pub use hasher::ContentHasher;
