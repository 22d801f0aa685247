use serde::{Deserialize, Serialize};

/// Stable on-chain identity of a tracked object (a lock or an escrow).
///
/// Wraps the hex-encoded object id so it cannot be mixed up with
/// addresses or other string fields of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Creates an object id from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a tracked event stream, `<package>::<module>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a stream id from an arbitrary name.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the stream id for a Move module.
    pub fn for_module(package: &str, module: &str) -> Self {
        Self(format!("{package}::{module}"))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Locally assigned, monotonically increasing row id.
///
/// Assigned once when a record is first inserted and never changed, so it
/// gives a stable pagination order under concurrent writes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SurrogateId(i64);

impl SurrogateId {
    /// Creates a surrogate id from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the id that follows this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for SurrogateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SurrogateId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<SurrogateId> for i64 {
    fn from(id: SurrogateId) -> Self {
        id.0
    }
}
