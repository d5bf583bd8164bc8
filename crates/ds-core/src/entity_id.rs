//! Entity ID type representing a domain.object_id pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid entity IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("domain cannot be empty")]
    EmptyDomain,

    #[error("object_id cannot be empty")]
    EmptyObjectId,

    #[error("domain contains invalid characters: {0}")]
    InvalidDomainChars(String),

    #[error("object_id contains invalid characters: {0}")]
    InvalidObjectIdChars(String),
}

/// A hub entity ID such as `binary_sensor.dvere_front`
///
/// The full string is kept as received so that prefix filtering and
/// display don't re-allocate; `dot` marks the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    raw: String,
    dot: usize,
}

impl EntityId {
    /// Build an EntityId from its two parts
    pub fn new(domain: &str, object_id: &str) -> Result<Self, EntityIdError> {
        format!("{domain}.{object_id}").parse()
    }

    /// The domain part (`binary_sensor`)
    pub fn domain(&self) -> &str {
        &self.raw[..self.dot]
    }

    /// The object_id part (`dvere_front`)
    pub fn object_id(&self) -> &str {
        &self.raw[self.dot + 1..]
    }

    /// The full `domain.object_id` string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the full entity id starts with `prefix`
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.raw.starts_with(prefix)
    }

    // lowercase alphanumerics and '_', no leading or trailing '_'
    fn valid_part(s: &str) -> bool {
        !s.starts_with('_')
            && !s.ends_with('_')
            && s.bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dot = s.find('.').ok_or(EntityIdError::InvalidFormat)?;
        let (domain, object_id) = (&s[..dot], &s[dot + 1..]);

        if object_id.contains('.') {
            return Err(EntityIdError::InvalidFormat);
        }
        if domain.is_empty() {
            return Err(EntityIdError::EmptyDomain);
        }
        if object_id.is_empty() {
            return Err(EntityIdError::EmptyObjectId);
        }
        if domain.contains("__") || !Self::valid_part(domain) {
            return Err(EntityIdError::InvalidDomainChars(domain.to_string()));
        }
        if !Self::valid_part(object_id) {
            return Err(EntityIdError::InvalidObjectIdChars(object_id.to_string()));
        }

        Ok(Self {
            raw: s.to_string(),
            dot,
        })
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.raw
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
