//! Polymorphic catalog element: the capability set the core dispatches on,
//! and the closed enumeration of concrete variants.
//!
//! Type-specific handling is confined to four sites (searched content for
//! inference, direct-relationship extraction for recommendation, the
//! type-heuristic recommendation table, and pattern inference) rather than
//! scattered `match`es — see `recommendation.rs` and `relationship/inference.rs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Fixed-dimension embedding vector.
pub type Vector = Vec<f32>;

/// The kind of a catalog element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Memory,
    Persona,
    Skill,
    Agent,
    Template,
}

impl ElementType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Memory => "memory",
            ElementType::Persona => "persona",
            ElementType::Skill => "skill",
            ElementType::Agent => "agent",
            ElementType::Template => "template",
        }
    }
}

/// Common metadata carried by every element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub element_type: ElementType,
    pub version: String,
    pub author: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Free-form key/value bag, including the `related_to` comma-separated
    /// list whose parsed form is authoritative for relationship edges
    /// originating from a `Memory`.
    pub extra: std::collections::BTreeMap<String, String>,
}

impl ElementMetadata {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, element_type: ElementType) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            element_type,
            version: "1.0.0".to_string(),
            author: String::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            extra: std::collections::BTreeMap::new(),
        }
    }

    /// Parses `related_to` (comma-separated element IDs) into a list.
    #[must_use]
    pub fn related_to(&self) -> Vec<String> {
        self.extra
            .get("related_to")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn tag_set(&self) -> HashSet<&str> {
        self.tags.iter().map(String::as_str).collect()
    }
}

/// Capability set the core dispatches on, independent of concrete variant.
pub trait ElementLike {
    fn id(&self) -> &str;
    fn element_type(&self) -> ElementType;
    fn metadata(&self) -> &ElementMetadata;
    fn metadata_mut(&mut self) -> &mut ElementMetadata;
    /// Text content used to build an embedding / searchable document.
    fn searchable_text(&self) -> String;
}

/// Closed enumeration of catalog element variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Element {
    Memory(crate::memory::Memory),
    Persona(CatalogItem),
    Skill(CatalogItem),
    Agent(CatalogItem),
    Template(CatalogItem),
}

/// Generic catalog entry for the non-memory variants: personas, skills,
/// agents and templates carry the same shape in this core (their richer
/// type-specific fields live in the excluded front-end/catalog layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub metadata: ElementMetadata,
    pub body: String,
}

impl ElementLike for Element {
    fn id(&self) -> &str {
        self.metadata().id.as_str()
    }

    fn element_type(&self) -> ElementType {
        self.metadata().element_type
    }

    fn metadata(&self) -> &ElementMetadata {
        match self {
            Element::Memory(m) => &m.metadata,
            Element::Persona(c) | Element::Skill(c) | Element::Agent(c) | Element::Template(c) => {
                &c.metadata
            }
        }
    }

    fn metadata_mut(&mut self) -> &mut ElementMetadata {
        match self {
            Element::Memory(m) => &mut m.metadata,
            Element::Persona(c) | Element::Skill(c) | Element::Agent(c) | Element::Template(c) => {
                &mut c.metadata
            }
        }
    }

    fn searchable_text(&self) -> String {
        match self {
            Element::Memory(m) => m.content.clone(),
            Element::Persona(c) | Element::Skill(c) | Element::Agent(c) | Element::Template(c) => {
                format!("{}\n{}\n{}", c.metadata.name, c.metadata.description, c.body)
            }
        }
    }
}

/// Jaccard similarity `|A∩B| / |A∪B|` over two tag sets.
#[must_use]
pub fn tag_jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn related_to_parses_comma_separated_list() {
        let mut meta = ElementMetadata::new("m1", "Memory One", ElementType::Memory);
        meta.extra
            .insert("related_to".to_string(), "persona-001, skill-001".to_string());
        assert_eq!(meta.related_to(), vec!["persona-001", "skill-001"]);
    }

    #[test]
    fn related_to_defaults_empty() {
        let meta = ElementMetadata::new("m1", "Memory One", ElementType::Memory);
        assert!(meta.related_to().is_empty());
    }

    #[test]
    fn jaccard_of_identical_sets_is_one() {
        let a: HashSet<&str> = ["x", "y"].into_iter().collect();
        let b: HashSet<&str> = ["x", "y"].into_iter().collect();
        assert!((tag_jaccard(&a, &b) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let a: HashSet<&str> = ["x"].into_iter().collect();
        let b: HashSet<&str> = ["y"].into_iter().collect();
        assert_eq!(tag_jaccard(&a, &b), 0.0);
    }
}
