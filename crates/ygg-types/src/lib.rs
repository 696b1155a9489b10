use std::fmt;

pub type PartitionId = u32;
/// Leader-election ranking of a replica; higher wins, never below 1.
pub type Priority = u32;

/// Opaque identifier of a cluster member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        MemberId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        MemberId(id.to_string())
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        MemberId(id)
    }
}

impl From<u64> for MemberId {
    fn from(id: u64) -> Self {
        MemberId(id.to_string())
    }
}

/// Failure of a topology management request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TopologyError {
    /// Another change is in progress, or the stored topology moved under us.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The topology is not initialized yet.
    #[error("operation not allowed: {0}")]
    OperationNotAllowed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl TopologyError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        TopologyError::InvalidRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        TopologyError::Internal(msg.into())
    }
}
