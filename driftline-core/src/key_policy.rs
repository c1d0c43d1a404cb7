use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use driftline_model::{FileObjectMeta, PartitionKey};
use serde_json::Value;

use crate::error::{MonitorError, Result};

/// Deterministic mapping from file metadata to the stable identity used for
/// deduplication and as the persisted record key.
pub trait PartitionKeyPolicy: Send + Sync {
    fn to_partition_key(&self, metadata: &FileObjectMeta) -> Result<PartitionKey>;
}

/// Metadata attribute that can take part in a partition key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum KeyAttribute {
    Uri,
    Name,
    Path,
    LastModified,
    Size,
    Digest,
}

impl KeyAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAttribute::Uri => "uri",
            KeyAttribute::Name => "name",
            KeyAttribute::Path => "path",
            KeyAttribute::LastModified => "lastModified",
            KeyAttribute::Size => "size",
            KeyAttribute::Digest => "digest",
        }
    }
}

impl FromStr for KeyAttribute {
    type Err = MonitorError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "uri" => Ok(KeyAttribute::Uri),
            "name" => Ok(KeyAttribute::Name),
            "path" => Ok(KeyAttribute::Path),
            "lastmodified" | "last_modified" => Ok(KeyAttribute::LastModified),
            "size" => Ok(KeyAttribute::Size),
            "digest" | "hash" => Ok(KeyAttribute::Digest),
            other => Err(MonitorError::InvalidConfig(format!(
                "unknown partition key attribute '{other}'"
            ))),
        }
    }
}

impl fmt::Display for KeyAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds keys as the canonical JSON object of a fixed attribute set, e.g.
/// `{"lastModified":1700000000000,"name":"orders.csv"}`. Field names are
/// sorted so the same metadata always yields the same key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeKeyPolicy {
    attributes: Vec<KeyAttribute>,
}

impl Default for AttributeKeyPolicy {
    fn default() -> Self {
        Self {
            attributes: vec![KeyAttribute::Uri],
        }
    }
}

impl AttributeKeyPolicy {
    pub fn new(attributes: impl IntoIterator<Item = KeyAttribute>) -> Result<Self> {
        let mut attributes: Vec<KeyAttribute> = attributes.into_iter().collect();
        attributes.sort();
        attributes.dedup();
        if attributes.is_empty() {
            return Err(MonitorError::InvalidConfig(
                "partition key strategy needs at least one attribute".to_string(),
            ));
        }
        Ok(Self { attributes })
    }

    /// Parses a `+`-joined strategy such as `name+lastModified`.
    pub fn parse(strategy: &str) -> Result<Self> {
        let attributes = strategy
            .split('+')
            .filter(|part| !part.trim().is_empty())
            .map(KeyAttribute::from_str)
            .collect::<Result<Vec<_>>>()?;
        Self::new(attributes)
    }

    pub fn attributes(&self) -> &[KeyAttribute] {
        &self.attributes
    }

    fn attribute_value(
        &self,
        attribute: KeyAttribute,
        metadata: &FileObjectMeta,
    ) -> Result<Value> {
        let value = match attribute {
            KeyAttribute::Uri => Value::from(metadata.string_uri()),
            KeyAttribute::Name => Value::from(metadata.name.as_str()),
            KeyAttribute::Path => Value::from(metadata.path()),
            KeyAttribute::LastModified => {
                Value::from(metadata.last_modified.timestamp_millis())
            }
            KeyAttribute::Size => Value::from(metadata.size),
            KeyAttribute::Digest => match &metadata.content_digest {
                Some(digest) => Value::from(digest.as_str()),
                None => {
                    return Err(MonitorError::PartitionKey {
                        uri: metadata.string_uri().to_string(),
                        reason: "content digest is not available".to_string(),
                    });
                }
            },
        };
        Ok(value)
    }
}

impl PartitionKeyPolicy for AttributeKeyPolicy {
    fn to_partition_key(&self, metadata: &FileObjectMeta) -> Result<PartitionKey> {
        let mut fields = BTreeMap::new();
        for attribute in &self.attributes {
            fields.insert(
                attribute.as_str(),
                self.attribute_value(*attribute, metadata)?,
            );
        }
        let encoded = serde_json::to_string(&fields)?;
        Ok(PartitionKey::new(encoded)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::path::Path;

    fn meta(path: &str, size: u64, millis: i64) -> FileObjectMeta {
        FileObjectMeta::from_local_path(
            Path::new(path),
            size,
            DateTime::from_timestamp_millis(millis).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn default_policy_keys_by_uri() {
        let key = AttributeKeyPolicy::default()
            .to_partition_key(&meta("/in/a.csv", 10, 1_000))
            .unwrap();
        assert_eq!(key.as_str(), r#"{"uri":"file:///in/a.csv"}"#);
    }

    #[test]
    fn parses_compound_strategy_in_canonical_order() {
        let policy = AttributeKeyPolicy::parse("name+lastModified").unwrap();
        assert_eq!(
            policy.attributes(),
            &[KeyAttribute::Name, KeyAttribute::LastModified]
        );
        let key = policy
            .to_partition_key(&meta("/in/a.csv", 10, 1_000))
            .unwrap();
        assert_eq!(key.as_str(), r#"{"lastModified":1000,"name":"a.csv"}"#);
    }

    #[test]
    fn name_strategy_collides_across_directories() {
        let policy = AttributeKeyPolicy::parse("name").unwrap();
        let left = policy.to_partition_key(&meta("/in/x/a.csv", 1, 1)).unwrap();
        let right = policy.to_partition_key(&meta("/in/y/a.csv", 2, 2)).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn digest_strategy_requires_digest() {
        let policy = AttributeKeyPolicy::parse("digest").unwrap();
        let err = policy
            .to_partition_key(&meta("/in/a.csv", 1, 1))
            .unwrap_err();
        assert!(matches!(err, MonitorError::PartitionKey { .. }));

        let key = policy
            .to_partition_key(&meta("/in/a.csv", 1, 1).with_content_digest("abc"))
            .unwrap();
        assert_eq!(key.as_str(), r#"{"digest":"abc"}"#);
    }

    #[test]
    fn rejects_unknown_or_empty_strategy() {
        assert!(AttributeKeyPolicy::parse("inode").is_err());
        assert!(AttributeKeyPolicy::parse(" + ").is_err());
    }
}
