//! Identifier module.
//!
//! Provides `EntityId`, an interned string identifier for characters,
//! drafts and items, and `Ref`, the namespaced `module:type:value`
//! identifier used to tag polymorphic runtime entities for serialization.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Interned string identifier for characters, drafts and players.
///
/// Uses `Arc<str>` so cloning an id into event handlers is cheap.
///
/// # Examples
///
/// ```rust
/// use charsmith::EntityId;
///
/// let a = EntityId::new("hero-1");
/// let b: EntityId = "hero-1".into();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "hero-1");
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntityId(Arc<str>);

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(EntityId::from(s))
    }
}

impl EntityId {
    /// Create a new `EntityId` from a string slice.
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Get the string representation of this id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string is not a valid `module:type:value` ref.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ref '{0}': expected module:type:value")]
pub struct RefParseError(pub String);

/// Stable, namespaced type identifier for conditions, features and actions.
///
/// Serializes as its string form so persisted records stay readable.
///
/// # Examples
///
/// ```rust
/// use charsmith::Ref;
///
/// let raging = Ref::new("dnd5e", "conditions", "raging");
/// assert_eq!(raging.to_string(), "dnd5e:conditions:raging");
///
/// let parsed: Ref = "dnd5e:conditions:raging".parse().unwrap();
/// assert_eq!(parsed, raging);
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ref {
    module: Arc<str>,
    kind: Arc<str>,
    value: Arc<str>,
}

impl Ref {
    pub fn new(module: &str, kind: &str, value: &str) -> Self {
        Self {
            module: Arc::from(module),
            kind: Arc::from(kind),
            value: Arc::from(value),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// The category segment (`conditions`, `features`, `actions`, ...).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl FromStr for Ref {
    type Err = RefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [module, kind, value]
                if !module.is_empty() && !kind.is_empty() && !value.is_empty() =>
            {
                Ok(Ref::new(module, kind, value))
            }
            _ => Err(RefParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.module, self.kind, self.value)
    }
}

impl Serialize for Ref {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ref {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
