use std::fmt;

use serde::{Deserialize, Serialize};

/// Label used for tabs that have not been classified yet.
pub const UNCATEGORIZED: &str = "Uncategorized";
/// Fallback label for tabs whose classification failed or was degenerate.
pub const OTHER: &str = "Other";

/// A short topical label. Never empty; compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Category(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyCategory;

impl fmt::Display for EmptyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "category label must not be empty")
    }
}

impl std::error::Error for EmptyCategory {}

impl Category {
    /// Builds a category from a label, rejecting blank input.
    ///
    /// Surrounding whitespace is trimmed; inner whitespace is kept as-is.
    pub fn new(label: impl AsRef<str>) -> Result<Self, EmptyCategory> {
        let trimmed = label.as_ref().trim();
        if trimmed.is_empty() {
            return Err(EmptyCategory);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Extracts a category from raw generated text: the first line, trimmed.
    pub fn from_generation(text: &str) -> Option<Self> {
        let first_line = text.trim_start().lines().next()?;
        Self::new(first_line).ok()
    }

    pub fn uncategorized() -> Self {
        Self(UNCATEGORIZED.to_string())
    }

    pub fn other() -> Self {
        Self(OTHER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_uncategorized(&self) -> bool {
        self.0 == UNCATEGORIZED
    }

    /// True when this category labels the given group title.
    pub fn matches_title(&self, title: &str) -> bool {
        self.0 == title
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Category {
    type Error = EmptyCategory;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Category {
    type Error = EmptyCategory;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.0
    }
}
