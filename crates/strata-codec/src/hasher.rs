use strata_types::Hash;

/// BLAKE3 hasher bound to one object kind.
///
/// The kind's tag is prepended to the bytes, so a commit and a content object
/// with identical bytes still hash differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    pub const COMMIT: Self = Self {
        domain: "strata-commit-v1",
    };
    pub const CONTENT: Self = Self {
        domain: "strata-content-v1",
    };
    pub const REFERENCE: Self = Self {
        domain: "strata-reference-v1",
    };
    pub const KEY_LIST: Self = Self {
        domain: "strata-keylist-v1",
    };
    pub const GLOBAL_STATE: Self = Self {
        domain: "strata-global-v1",
    };

    /// Hash an encoded frame.
    pub fn hash(&self, data: &[u8]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Hash::from_hash(*hasher.finalize().as_bytes())
    }
}
