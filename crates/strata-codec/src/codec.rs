use std::fmt;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_types::Hash;

use crate::error::{CodecError, CodecResult};
use crate::hasher::ContentHasher;

/// Frame magic.
pub const MAGIC: [u8; 2] = *b"ST";
/// Current frame format version.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 4;
const MAX_PAYLOAD: u64 = 256 * 1024 * 1024;

/// Kind tag carried in every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectKind {
    Commit = 1,
    Content = 2,
    Reference = 3,
    KeyList = 4,
    GlobalState = 5,
}

impl ObjectKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Commit),
            2 => Some(Self::Content),
            3 => Some(Self::Reference),
            4 => Some(Self::KeyList),
            5 => Some(Self::GlobalState),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Content => "content",
            Self::Reference => "reference",
            Self::KeyList => "key list",
            Self::GlobalState => "global state",
        }
    }

    /// Domain-separated hasher for objects of this kind.
    pub fn hasher(self) -> ContentHasher {
        match self {
            Self::Commit => ContentHasher::COMMIT,
            Self::Content => ContentHasher::CONTENT,
            Self::Reference => ContentHasher::REFERENCE,
            Self::KeyList => ContentHasher::KEY_LIST,
            Self::GlobalState => ContentHasher::GLOBAL_STATE,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value with a canonical byte encoding.
///
/// Implementors must keep every collection in a canonical order so that
/// logically equal values serialize to identical bytes, and report any
/// violation of that order from [`validate`](Canonical::validate).
pub trait Canonical: Serialize + DeserializeOwned {
    /// Tag written into the frame header.
    const KIND: ObjectKind;

    /// Check canonical form. Called before encoding and after decoding.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Recompute fields that are not part of the encoding (such as an
    /// object's own hash) from the frame the value was decoded from.
    fn restore_derived(&mut self, _frame: &[u8]) {}
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_PAYLOAD)
        .reject_trailing_bytes()
}

/// Encode a value into a framed, canonical byte string.
pub fn encode<T: Canonical>(value: &T) -> CodecResult<Vec<u8>> {
    value.validate().map_err(|reason| {
        CodecError::Serialization(format!("{} is not in canonical form: {reason}", T::KIND))
    })?;
    let payload = options()
        .serialize(value)
        .map_err(|e| CodecError::Serialization(e.to_string()))?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&MAGIC);
    buf.push(FORMAT_VERSION);
    buf.push(T::KIND.tag());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a frame produced by [`encode`].
///
/// Fails with [`CodecError::CorruptData`] on truncated input, a foreign or
/// mismatched kind tag, a malformed payload, or a payload out of canonical
/// order.
pub fn decode<T: Canonical>(bytes: &[u8]) -> CodecResult<T> {
    let corrupt = |reason: String| CodecError::CorruptData {
        what: T::KIND.name(),
        reason,
    };
    let kind = peek_kind(bytes)?;
    if kind != T::KIND {
        return Err(corrupt(format!("expected {} frame, found {kind}", T::KIND)));
    }
    let mut value: T = options()
        .deserialize(&bytes[HEADER_LEN..])
        .map_err(|e| corrupt(e.to_string()))?;
    value.validate().map_err(corrupt)?;
    value.restore_derived(bytes);
    Ok(value)
}

/// Content-addressed identifier: the kind's domain hash of the encoding.
pub fn hash<T: Canonical>(value: &T) -> CodecResult<Hash> {
    Ok(T::KIND.hasher().hash(&encode(value)?))
}

/// Validate a frame header and return the kind it declares.
pub fn peek_kind(bytes: &[u8]) -> CodecResult<ObjectKind> {
    let corrupt = |reason: String| CodecError::CorruptData {
        what: "frame",
        reason,
    };
    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!(
            "too short: have {} bytes, need at least {HEADER_LEN}",
            bytes.len()
        )));
    }
    if bytes[..2] != MAGIC {
        return Err(corrupt("bad magic".into()));
    }
    if bytes[2] != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {}", bytes[2])));
    }
    ObjectKind::from_tag(bytes[3]).ok_or_else(|| corrupt(format!("unknown kind tag {}", bytes[3])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        items: Vec<u32>,
        #[serde(skip, default = "placeholder_hash")]
        id: Hash,
    }

    fn placeholder_hash() -> Hash {
        Hash::NO_ANCESTOR
    }

    impl Canonical for Sample {
        const KIND: ObjectKind = ObjectKind::Content;

        fn validate(&self) -> Result<(), String> {
            if self.items.windows(2).all(|w| w[0] < w[1]) {
                Ok(())
            } else {
                Err("items must be strictly ascending".into())
            }
        }

        fn restore_derived(&mut self, frame: &[u8]) {
            self.id = Self::KIND.hasher().hash(frame);
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Other(u64);

    impl Canonical for Other {
        const KIND: ObjectKind = ObjectKind::GlobalState;
    }

    fn sample() -> Sample {
        Sample {
            name: "orders".into(),
            items: vec![1, 5, 9],
            id: Hash::NO_ANCESTOR,
        }
    }

    // -----------------------------------------------------------------------
    // Framing
    // -----------------------------------------------------------------------

    #[test]
    fn frame_header_layout() {
        let bytes = encode(&sample()).unwrap();
        assert_eq!(&bytes[..2], b"ST");
        assert_eq!(bytes[2], FORMAT_VERSION);
        assert_eq!(bytes[3], ObjectKind::Content.tag());
        assert_eq!(peek_kind(&bytes).unwrap(), ObjectKind::Content);
    }

    #[test]
    fn decode_restores_derived_fields() {
        let bytes = encode(&sample()).unwrap();
        let decoded: Sample = decode(&bytes).unwrap();
        assert_eq!(decoded.id, hash(&sample()).unwrap());
        assert_eq!(decoded.items, vec![1, 5, 9]);
    }

    #[test]
    fn truncated_input_is_corrupt() {
        let bytes = encode(&sample()).unwrap();
        for len in [0, 3, bytes.len() - 1] {
            let err = decode::<Sample>(&bytes[..len]).unwrap_err();
            assert!(matches!(err, CodecError::CorruptData { .. }), "len {len}: {err}");
        }
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode::<Sample>(&bytes),
            Err(CodecError::CorruptData { what: "content", .. })
        ));
    }

    #[test]
    fn mistyped_frame_is_corrupt() {
        let bytes = encode(&Other(7)).unwrap();
        let err = decode::<Sample>(&bytes).unwrap_err();
        assert_eq!(
            err,
            CodecError::CorruptData {
                what: "content",
                reason: "expected content frame, found global state".into(),
            }
        );
    }

    #[test]
    fn bad_header_is_corrupt() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(peek_kind(&bytes), Err(CodecError::CorruptData { what: "frame", .. })));

        let mut bytes = encode(&sample()).unwrap();
        bytes[2] = 99;
        assert!(peek_kind(&bytes).is_err());

        let mut bytes = encode(&sample()).unwrap();
        bytes[3] = 200;
        assert!(peek_kind(&bytes).is_err());
    }

    #[test]
    fn non_canonical_payload_is_rejected_both_ways() {
        let unsorted = Sample {
            items: vec![9, 1],
            ..sample()
        };
        assert!(matches!(encode(&unsorted), Err(CodecError::Serialization(_))));

        // Hand-build a frame around a non-canonical payload.
        let mut frame = vec![b'S', b'T', FORMAT_VERSION, ObjectKind::Content.tag()];
        frame.extend(options().serialize(&unsorted).unwrap());
        assert!(matches!(
            decode::<Sample>(&frame),
            Err(CodecError::CorruptData { what: "content", .. })
        ));
    }

    #[test]
    fn hash_depends_on_kind_domain() {
        let bytes = encode(&sample()).unwrap();
        assert_eq!(hash(&sample()).unwrap(), ContentHasher::CONTENT.hash(&bytes));
        assert_ne!(hash(&sample()).unwrap(), ContentHasher::COMMIT.hash(&bytes));
    }

    proptest! {
        #[test]
        fn roundtrip(name in ".{0,16}", items in prop::collection::btree_set(any::<u32>(), 0..16)) {
            let value = Sample { name, items: items.into_iter().collect(), id: Hash::NO_ANCESTOR };
            let bytes = encode(&value).unwrap();
            let decoded: Sample = decode(&bytes).unwrap();
            prop_assert_eq!(&decoded.name, &value.name);
            prop_assert_eq!(&decoded.items, &value.items);
            prop_assert_eq!(encode(&decoded).unwrap(), bytes);
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode::<Sample>(&bytes);
        }
    }
}
