//! Validated name wrappers for collections and item ids.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A validated collection name.
///
/// Collection names double as file names in the JSON-file backend, so they
/// are restricted to prevent path traversal and keep every backend's storage
/// unit addressable:
/// - 1-64 characters
/// - alphanumeric, underscores, hyphens only
/// - must start with a letter or underscore
///
/// Names are case-sensitive: `Tools` and `tools` are distinct collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionName(String);

impl CollectionName {
    /// create a new CollectionName, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if name.len() > 64 {
            return Err(InvalidNameError::TooLong(name.len()));
        }

        let first_char = name.chars().next().unwrap();
        if !first_char.is_ascii_alphabetic() && first_char != '_' {
            return Err(InvalidNameError::InvalidStart(first_char));
        }

        for (i, c) in name.chars().enumerate() {
            if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated item id.
///
/// Ids are typically auto-generated (lowercase ULIDs) but callers may supply
/// their own; either way the same character restrictions apply so an id is
/// always safe to embed in paths and log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidNameError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    fn validate(id: &str) -> Result<(), InvalidNameError> {
        if id.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if id.len() > 128 {
            return Err(InvalidNameError::TooLong(id.len()));
        }

        for (i, c) in id.chars().enumerate() {
            if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }

    /// Generate a new ULID-based item id.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// error type for invalid names (collections, item ids)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidStart(char),
    InvalidCharacter { char: char, position: usize },
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidStart(c) => write!(f, "name cannot start with '{}'", c),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
        }
    }
}

impl std::error::Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_valid() {
        assert!(CollectionName::new("tools").is_ok());
        assert!(CollectionName::new("user_accounts").is_ok());
        assert!(CollectionName::new("Tools").is_ok());
        assert!(CollectionName::new("_private").is_ok());
        assert!(CollectionName::new("my-collection").is_ok());
    }

    #[test]
    fn test_collection_name_invalid() {
        assert!(CollectionName::new("").is_err());
        assert!(CollectionName::new("123tools").is_err()); // starts with number
        assert!(CollectionName::new("tools/admin").is_err()); // contains slash
        assert!(CollectionName::new("../escape").is_err()); // path traversal
        assert!(CollectionName::new("a".repeat(65)).is_err()); // too long
    }

    #[test]
    fn test_collection_name_case_sensitive() {
        let lower = CollectionName::new("tools").unwrap();
        let upper = CollectionName::new("Tools").unwrap();
        assert_ne!(lower, upper);
    }

    #[test]
    fn test_item_id_valid() {
        assert!(ItemId::new("abc123").is_ok());
        assert!(ItemId::new("01arz3ndektsv4rrffq69g5fav").is_ok()); // ULID
        assert!(ItemId::new("simple_key").is_ok());
    }

    #[test]
    fn test_item_id_invalid() {
        assert!(ItemId::new("").is_err());
        assert!(ItemId::new("has space").is_err());
        assert!(ItemId::new("a".repeat(129)).is_err());
    }

    #[test]
    fn test_item_id_generate() {
        let id1 = ItemId::generate();
        let id2 = ItemId::generate();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 26); // ULID length
        assert_eq!(id1.as_str(), id1.as_str().to_lowercase());
    }
}
