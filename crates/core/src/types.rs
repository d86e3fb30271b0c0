//! Identifier and record types for scatter-gather coordination.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Identifier of one logical scatter-gather operation.
///
/// Caller-supplied, opaque to the protocol. Non-empty and bounded by
/// [`crate::MAX_ID_LEN`] so every reference backend can store it as a key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Validate a caller-supplied request id.
    pub fn parse(s: impl Into<String>) -> crate::Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(crate::Error::InvalidRequestId("must not be empty".to_string()));
        }
        if s.len() > crate::MAX_ID_LEN {
            return Err(crate::Error::InvalidRequestId(format!(
                "exceeds {} bytes",
                crate::MAX_ID_LEN
            )));
        }
        Ok(Self(s))
    }

    /// Get the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one sub-operation within a request.
///
/// Unique per request, not globally; the persistent key is the
/// `(request_id, part_id)` pair.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartId(String);

impl PartId {
    /// Validate a caller-supplied part id.
    pub fn parse(s: impl Into<String>) -> crate::Result<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(crate::Error::InvalidPartId("must not be empty".to_string()));
        }
        if s.len() > crate::MAX_ID_LEN {
            return Err(crate::Error::InvalidPartId(format!(
                "exceeds {} bytes",
                crate::MAX_ID_LEN
            )));
        }
        Ok(Self(s))
    }

    /// Get the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartId({})", self.0)
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fencing token of the actor that won the completion race.
///
/// Deterministic per call site rather than random: a retried call from the
/// same site presents the same token and re-enters the completion critical
/// section; any other site observes "already locked".
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LockerId(String);

impl LockerId {
    /// Token for the end-of-scatter completion attempt.
    pub fn for_end_scatter(request_id: &RequestId) -> Self {
        Self(format!("EndScatter-{request_id}"))
    }

    /// Token for a gather completion attempt, keyed by the first gathered part.
    pub fn for_gather(part_id: &PartId) -> Self {
        Self(format!("Gather-{part_id}"))
    }

    /// Get the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LockerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockerId({})", self.0)
    }
}

impl fmt::Display for LockerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The request row persisted for one live operation.
///
/// `scatter_completed` and the locker are not carried here: a fresh insert
/// always starts with the flag unset and no locker, and both are mutated only
/// through dedicated port operations.
#[derive(Clone, Debug)]
pub struct RequestRecord {
    /// Identifier of the operation.
    pub request_id: RequestId,
    /// Opaque caller payload returned verbatim to the completion handler.
    pub context: String,
    /// Informational creation timestamp.
    pub creation_time: OffsetDateTime,
}

impl RequestRecord {
    /// Create a record stamped with the current time.
    pub fn new(request_id: RequestId, context: impl Into<String>) -> Self {
        Self {
            request_id,
            context: context.into(),
            creation_time: OffsetDateTime::now_utc(),
        }
    }
}

/// Outcome of one completion attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Parts remain outstanding, or another actor holds the critical section.
    Pending,
    /// This caller won the claim and ran the completion handler.
    Completed {
        /// The context stored by the current epoch's `begin_scatter`.
        context: String,
    },
}

impl Completion {
    /// Check whether this attempt completed the operation.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The claimed context, if this attempt completed the operation.
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Completed { context } => Some(context),
            Self::Pending => None,
        }
    }
}
