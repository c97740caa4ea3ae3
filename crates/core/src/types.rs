//! Identity and classification types shared by every component.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Globally unique, stable identifier of an asset.
///
/// Ids are opaque high-entropy tokens. Reference discovery relies on them
/// never appearing in a document by accident.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse an id, rejecting values that could match unrelated text.
    pub fn parse(id: &str) -> Result<Self, CoreError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation("Asset id must not be empty".into()));
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c == '"') {
            return Err(CoreError::Validation(format!(
                "Asset id '{trimmed}' contains whitespace or quotes"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// AssetPath
// ---------------------------------------------------------------------------

/// Store-relative location of an asset. Used for lookup only; it may change
/// while the id stays put.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetPath(String);

impl AssetPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final extension, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let file_name = self.0.rsplit('/').next()?;
        let (stem, ext) = file_name.rsplit_once('.')?;
        (!stem.is_empty()).then_some(ext)
    }

    /// File name without directories and without the final extension.
    pub fn stem(&self) -> &str {
        let file_name = self.0.rsplit('/').next().unwrap_or(&self.0);
        match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => file_name,
        }
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

// ---------------------------------------------------------------------------
// AssetKind
// ---------------------------------------------------------------------------

/// What an asset is, which decides how its references get cleaned up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetKind {
    /// A class/behavior definition. Components declare it as their type.
    Type { class_name: String },
    /// A data or template object that other documents point at.
    Instance,
    /// A container of many live objects.
    Composite,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Type { .. } => "type",
            Self::Instance => "instance",
            Self::Composite => "composite",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { class_name } => write!(f, "type ({class_name})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A resolved asset: everything the engine needs to know about a deletion
/// target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub id: AssetId,
    pub path: AssetPath,
    pub kind: AssetKind,
}

// ---------------------------------------------------------------------------
// DocumentCategory
// ---------------------------------------------------------------------------

/// The three document categories the corpus is searched by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Template,
    Record,
    Composite,
}

impl DocumentCategory {
    /// Search order used when only a yes/no answer is needed.
    pub const SCAN_ORDER: [DocumentCategory; 3] = [Self::Template, Self::Composite, Self::Record];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Record => "record",
            Self::Composite => "composite",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "template" => Ok(Self::Template),
            "record" => Ok(Self::Record),
            "composite" => Ok(Self::Composite),
            _ => Err(CoreError::Validation(format!(
                "Invalid document category: '{s}'. Must be one of: template, record, composite"
            ))),
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
