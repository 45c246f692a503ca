//! The persistent-element-storage collaborator. Real durability is out of
//! scope for this core (see spec §1); this module defines the trait the
//! engine depends on plus an in-memory implementation used by tests and as
//! the default collaborator.

use crate::element::{Element, ElementLike, ElementType};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Optional filter for [`ElementRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub element_type: Option<ElementType>,
    pub element_types: Option<Vec<ElementType>>,
}

/// Repository collaborator: `Create/GetByID/Update/Delete/Exists/List`.
#[async_trait]
pub trait ElementRepository: Send + Sync {
    async fn create(&self, elem: Element) -> Result<()>;
    async fn get_by_id(&self, id: &str) -> Result<Element>;
    async fn update(&self, elem: Element) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn exists(&self, id: &str) -> Result<bool>;
    async fn list(&self, filter: ListFilter) -> Result<Vec<Element>>;
}

/// Default, in-memory collaborator. Not a durability layer — a stand-in so
/// the rest of the engine (and its tests) has a concrete repository to run
/// against, mirroring how the teacher's test suites use storage fakes.
#[derive(Default)]
pub struct InMemoryElementRepository {
    items: RwLock<HashMap<String, Element>>,
}

impl InMemoryElementRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ElementRepository for InMemoryElementRepository {
    async fn create(&self, elem: Element) -> Result<()> {
        let id = elem.id().to_string();
        let mut items = self.items.write().expect("repository lock poisoned");
        if items.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        items.insert(id, elem);
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Element> {
        let items = self.items.read().expect("repository lock poisoned");
        items
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn update(&self, elem: Element) -> Result<()> {
        let id = elem.id().to_string();
        let mut items = self.items.write().expect("repository lock poisoned");
        if !items.contains_key(&id) {
            return Err(Error::NotFound(id));
        }
        items.insert(id, elem);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut items = self.items.write().expect("repository lock poisoned");
        items
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let items = self.items.read().expect("repository lock poisoned");
        Ok(items.contains_key(id))
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Element>> {
        let items = self.items.read().expect("repository lock poisoned");
        Ok(items
            .values()
            .filter(|e| {
                filter
                    .element_type
                    .map_or(true, |t| e.element_type() == t)
                    && filter
                        .element_types
                        .as_ref()
                        .map_or(true, |types| types.contains(&e.element_type()))
            })
            .cloned()
            .collect())
    }
}
