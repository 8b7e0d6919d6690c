use serde::{Deserialize, Serialize};
use strata_codec::{Canonical, ObjectKind};
use strata_types::{ContentId, ContentType};

/// Cross-branch record for one content id, kept outside the commit DAG.
///
/// Used by content types that need a single source of truth shared by every
/// branch, such as a monotonically assigned identifier. It is written only
/// together with a successful reference update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub state: Vec<u8>,
}

impl GlobalState {
    pub fn new(content_id: ContentId, content_type: ContentType, state: impl Into<Vec<u8>>) -> Self {
        Self {
            content_id,
            content_type,
            state: state.into(),
        }
    }
}

impl Canonical for GlobalState {
    const KIND: ObjectKind = ObjectKind::GlobalState;
}
