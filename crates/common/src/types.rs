use serde::{Deserialize, Serialize};

/// A serialized notification record as it lives in the work queue.
///
/// The record is opaque to the delivery worker — only the codec inspects its
/// structure. Ownership transfers from the queue to the worker for the
/// duration of one delivery attempt cycle; on terminal transient failure the
/// same record is pushed back to the queue tail unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notification(String);

impl Notification {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Notification {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for Notification {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
