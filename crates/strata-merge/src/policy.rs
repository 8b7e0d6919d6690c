//! Per-content-type handling of key collisions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use strata_model::Operation;
use strata_types::{ContentKey, ContentType};

/// What to do with one key changed on both sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Report the key as conflicting.
    Conflict,
    /// Apply the proposed operation on top of the existing change.
    KeepProposed,
    /// Drop the proposed operation; the existing change stands.
    KeepExisting,
}

/// Strategy for collisions on keys of one content type.
///
/// `existing` is the most recent change to `key` on the side being merged
/// onto; `proposed` is the incoming operation.
pub trait MergePolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn decide(&self, key: &ContentKey, existing: &Operation, proposed: &Operation) -> PolicyDecision;
}

/// Every collision is a conflict.
#[derive(Clone, Copy, Debug, Default)]
pub struct RejectOnCollision;

impl MergePolicy for RejectOnCollision {
    fn name(&self) -> &'static str {
        "reject-on-collision"
    }

    fn decide(&self, _: &ContentKey, _: &Operation, _: &Operation) -> PolicyDecision {
        PolicyDecision::Conflict
    }
}

/// Last writer wins: the proposed operation overrides.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreferProposed;

impl MergePolicy for PreferProposed {
    fn name(&self) -> &'static str {
        "prefer-proposed"
    }

    fn decide(&self, _: &ContentKey, _: &Operation, _: &Operation) -> PolicyDecision {
        PolicyDecision::KeepProposed
    }
}

/// First writer wins: the proposed operation is dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreferExisting;

impl MergePolicy for PreferExisting {
    fn name(&self) -> &'static str {
        "prefer-existing"
    }

    fn decide(&self, _: &ContentKey, _: &Operation, _: &Operation) -> PolicyDecision {
        PolicyDecision::KeepExisting
    }
}

/// Registry of merge policies keyed by content type.
///
/// Types without an entry use the fallback, which is
/// [`RejectOnCollision`] unless replaced.
#[derive(Clone, Debug)]
pub struct MergePolicies {
    by_type: BTreeMap<ContentType, Arc<dyn MergePolicy>>,
    fallback: Arc<dyn MergePolicy>,
}

impl Default for MergePolicies {
    fn default() -> Self {
        Self {
            by_type: BTreeMap::new(),
            fallback: Arc::new(RejectOnCollision),
        }
    }
}

impl MergePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, content_type: ContentType, policy: impl MergePolicy + 'static) -> Self {
        self.by_type.insert(content_type, Arc::new(policy));
        self
    }

    pub fn with_fallback(mut self, policy: impl MergePolicy + 'static) -> Self {
        self.fallback = Arc::new(policy);
        self
    }

    pub fn policy_for(&self, content_type: ContentType) -> &dyn MergePolicy {
        self.by_type
            .get(&content_type)
            .map_or(self.fallback.as_ref(), |p| p.as_ref())
    }

    /// Decide a collision. The content type comes from whichever operation
    /// is a put, preferring the proposed one; two deletes count as generic.
    pub fn decide(&self, key: &ContentKey, existing: &Operation, proposed: &Operation) -> PolicyDecision {
        let content_type = proposed
            .content_type()
            .or_else(|| existing.content_type())
            .unwrap_or(ContentType::GENERIC);
        let policy = self.policy_for(content_type);
        let decision = policy.decide(key, existing, proposed);
        tracing::debug!(
            key = %key,
            content_type = %content_type,
            policy = policy.name(),
            ?decision,
            "key collision"
        );
        decision
    }
}
