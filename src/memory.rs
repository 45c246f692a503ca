//! Long-term [`Memory`]: a textual record whose content hash is a pure
//! function of its content, and whose ID is stable for its lifetime.

use crate::element::ElementMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A long-term textual record with hash and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub name: String,
    pub content: String,
    pub content_hash: String,
    pub metadata: ElementMetadata,
    pub date_created: DateTime<Utc>,
}

impl Memory {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        let name = name.into();
        let content = content.into();
        let content_hash = hash_content(&content);
        let metadata = ElementMetadata::new(id.clone(), name.clone(), crate::element::ElementType::Memory);
        Self {
            id,
            name,
            content,
            content_hash,
            metadata,
            date_created: Utc::now(),
        }
    }

    /// Replaces the content and recomputes the hash, preserving the invariant
    /// that `content_hash` is a pure function of `content`.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.content_hash = hash_content(&self.content);
        self.metadata.updated_at = Utc::now();
    }
}

/// Pure function from content bytes to a stable hash string.
#[must_use]
pub fn hash_content(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_pure_function_of_content() {
        let m1 = Memory::new("a", "A", "hello world");
        let m2 = Memory::new("b", "B", "hello world");
        assert_eq!(m1.content_hash, m2.content_hash);
    }

    #[test]
    fn set_content_recomputes_hash() {
        let mut m = Memory::new("a", "A", "hello");
        let original_hash = m.content_hash.clone();
        m.set_content("goodbye");
        assert_ne!(original_hash, m.content_hash);
        assert_eq!(m.content_hash, hash_content("goodbye"));
    }
}
