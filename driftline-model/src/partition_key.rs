use std::fmt;

use crate::error::{ModelError, Result};

/// Stable identity of a file object, derived once per scan by a partition-key
/// policy. It doubles as the key of the persisted record and as the
/// deduplication key when a listing is reconciled against the state store.
///
/// This is intentionally a thin wrapper around `String` so:
/// - call sites can't accidentally pass an arbitrary string without opting in
/// - serialization remains compact and ergonomic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(ModelError::EmptyPartitionKey);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_key() {
        assert_eq!(PartitionKey::new(""), Err(ModelError::EmptyPartitionKey));
    }

    #[test]
    fn keeps_raw_value() {
        let key = PartitionKey::new("{\"uri\":\"file:///a.csv\"}").unwrap();
        assert_eq!(key.as_str(), "{\"uri\":\"file:///a.csv\"}");
        assert_eq!(key.to_string(), key.clone().into_inner());
    }
}
