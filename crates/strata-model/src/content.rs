use serde::{Deserialize, Serialize};
use strata_codec::{Canonical, ObjectKind};
use strata_types::{ContentId, ContentKey, ContentType, Hash};

use crate::commit::Operation;
use crate::error::ModelResult;

/// One immutable version of a logical object.
///
/// The body is opaque to the core. The pair `(content_id, version())`
/// identifies this version; `version()` is the content hash of the encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentObject {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub body: Vec<u8>,
}

impl ContentObject {
    pub fn new(content_id: ContentId, content_type: ContentType, body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_id,
            content_type,
            body: body.into(),
        }
    }

    /// Version hash of this object.
    pub fn version(&self) -> ModelResult<Hash> {
        Ok(strata_codec::hash(self)?)
    }

    /// A `Put` binding `key` to this version.
    pub fn put_operation(&self, key: ContentKey) -> ModelResult<Operation> {
        Ok(Operation::put(
            key,
            self.content_id.clone(),
            self.content_type,
            self.version()?,
        ))
    }
}

impl Canonical for ContentObject {
    const KIND: ObjectKind = ObjectKind::Content;
}
