use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Commit metadata. Opaque to the storage core but part of the commit hash.
///
/// Headers are multi-valued and kept in a `BTreeMap`, so two metadata values
/// built with the same headers in a different order encode identically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMeta {
    pub author: String,
    pub committer: Option<String>,
    /// Microseconds since the Unix epoch.
    pub commit_time: i64,
    pub message: String,
    pub headers: BTreeMap<String, Vec<String>>,
}

impl CommitMeta {
    /// Metadata stamped with the current time.
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            committer: None,
            commit_time: Utc::now().timestamp_micros(),
            message: message.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.commit_time = time.timestamp_micros();
        self
    }

    pub fn with_committer(mut self, committer: impl Into<String>) -> Self {
        self.committer = Some(committer.into());
        self
    }

    /// Append a header value. Repeated names accumulate values in insertion order.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn commit_time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.commit_time).unwrap_or_default()
    }

    /// First value of a header, if any.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn builder_sets_fields() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let meta = CommitMeta::new("alice", "initial")
            .with_time(time)
            .with_committer("bot")
            .with_header("ticket", "T-1")
            .with_header("ticket", "T-2");
        assert_eq!(meta.author, "alice");
        assert_eq!(meta.committer.as_deref(), Some("bot"));
        assert_eq!(meta.commit_time(), time);
        assert_eq!(meta.header("ticket"), Some("T-1"));
        assert_eq!(meta.headers["ticket"], vec!["T-1", "T-2"]);
    }

    #[test]
    fn header_order_does_not_matter() {
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let a = CommitMeta::new("a", "m")
            .with_time(time)
            .with_header("x", "1")
            .with_header("y", "2");
        let b = CommitMeta::new("a", "m")
            .with_time(time)
            .with_header("y", "2")
            .with_header("x", "1");
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
