//! Bidirectional relationship graph: a forward adjacency map plus its mirror
//! reverse map, kept in lock-step so "what points at X" is as cheap as "what
//! does X point at". A small TTL cache backs [`RelationshipIndex::expand_relationships`]
//! since multi-hop traversals are the expensive path.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::RelationshipConfig;
use crate::element::{ElementLike, ElementType};
use crate::error::Result;
use crate::repository::{ElementRepository, ListFilter};

/// A single directed edge between two element ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    pub relation_type: String,
    pub weight: f32,
}

/// Options controlling [`RelationshipIndex::expand_relationships`].
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    pub max_depth: usize,
    pub follow_both_ways: bool,
    pub stop_at_types: Vec<ElementType>,
    pub exclude_visited: bool,
}

impl ExpandOptions {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            follow_both_ways: false,
            stop_at_types: Vec::new(),
            exclude_visited: true,
        }
    }
}

/// One node of the tree returned by [`RelationshipIndex::expand_relationships`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionNode {
    pub id: String,
    pub depth: usize,
    /// `None` only for the root node.
    pub via_relation_type: Option<String>,
    pub children: Vec<ExpansionNode>,
}

#[derive(Debug, Clone, Copy)]
pub struct RelationshipStats {
    pub forward_entries: usize,
    pub reverse_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_size: usize,
}

struct CachedExpansion {
    tree: ExpansionNode,
    expires_at: Instant,
}

/// Forward/reverse relationship graph with cached multi-hop expansion.
pub struct RelationshipIndex {
    forward: RwLock<HashMap<String, Vec<Relationship>>>,
    reverse: RwLock<HashMap<String, Vec<Relationship>>>,
    cache: RwLock<HashMap<String, CachedExpansion>>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    config: RelationshipConfig,
}

impl RelationshipIndex {
    #[must_use]
    pub fn new(config: RelationshipConfig) -> Self {
        Self {
            forward: RwLock::new(HashMap::new()),
            reverse: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            config,
        }
    }

    /// Appends a single unstructured edge, used by inference and anything
    /// that discovers one relationship at a time. Does not touch any other
    /// edge already recorded for `from`. See [`Self::add`] for the
    /// overwrite-semantics bulk operation memories use.
    pub fn link(&self, from: impl Into<String>, to: impl Into<String>, relation_type: impl Into<String>, weight: f32) {
        let from = from.into();
        let to = to.into();
        let relation_type = relation_type.into();
        let edge = Relationship {
            from: from.clone(),
            to: to.clone(),
            relation_type,
            weight,
        };
        self.forward.write().entry(from.clone()).or_default().push(edge.clone());
        self.reverse.write().entry(to.clone()).or_default().push(edge);
        self.invalidate_containing(&from);
        self.invalidate_containing(&to);
    }

    /// `Add(memoryID, relatedIDs[])`: overwrites `memory_id`'s entire forward
    /// list with one edge per `related_ids` entry, and removes `memory_id`
    /// from every reverse list it used to appear in before inserting its new
    /// reverse edges.
    pub fn add(&self, memory_id: &str, related_ids: &[String]) {
        let mut forward = self.forward.write();
        let mut reverse = self.reverse.write();

        if let Some(old_edges) = forward.remove(memory_id) {
            for old in &old_edges {
                if let Some(edges) = reverse.get_mut(&old.to) {
                    edges.retain(|e| e.from != memory_id);
                }
            }
        }

        let new_edges: Vec<Relationship> = related_ids
            .iter()
            .map(|to| Relationship {
                from: memory_id.to_string(),
                to: to.clone(),
                relation_type: "related_to".to_string(),
                weight: 1.0,
            })
            .collect();

        for edge in &new_edges {
            reverse.entry(edge.to.clone()).or_default().push(edge.clone());
        }
        if !new_edges.is_empty() {
            forward.insert(memory_id.to_string(), new_edges);
        }

        drop(forward);
        drop(reverse);
        self.invalidate_containing(memory_id);
    }

    /// `Remove(memoryID)`: clears `memory_id`'s forward list and removes it
    /// from every reverse list it appears in.
    pub fn remove(&self, memory_id: &str) {
        let removed = self.forward.write().remove(memory_id);
        if let Some(edges) = removed {
            let mut reverse = self.reverse.write();
            for edge in &edges {
                if let Some(list) = reverse.get_mut(&edge.to) {
                    list.retain(|e| e.from != memory_id);
                }
            }
        }
        self.invalidate_containing(memory_id);
    }

    /// Direct forward neighbors of `id`. Defensive copy.
    #[must_use]
    pub fn related_elements(&self, id: &str) -> Vec<Relationship> {
        self.forward.read().get(id).cloned().unwrap_or_default()
    }

    /// Direct incoming edges into `id`. Defensive copy.
    #[must_use]
    pub fn related_memories(&self, id: &str) -> Vec<Relationship> {
        self.reverse.read().get(id).cloned().unwrap_or_default()
    }

    /// Clears all state, lists every element from `repository`, parses each
    /// one's `related_to` metadata, and reconstructs both maps. Holds the
    /// write locks for the whole operation so it's safe to call concurrently
    /// with reads.
    pub async fn rebuild(&self, repository: &dyn ElementRepository) -> Result<()> {
        let elements = repository.list(ListFilter::default()).await?;

        let mut forward = self.forward.write();
        let mut reverse = self.reverse.write();
        forward.clear();
        reverse.clear();

        for element in &elements {
            let from = element.id().to_string();
            let related_ids = element.metadata().related_to();
            if related_ids.is_empty() {
                continue;
            }
            let edges: Vec<Relationship> = related_ids
                .into_iter()
                .map(|to| Relationship {
                    from: from.clone(),
                    to,
                    relation_type: "related_to".to_string(),
                    weight: 1.0,
                })
                .collect();
            for edge in &edges {
                reverse.entry(edge.to.clone()).or_default().push(edge.clone());
            }
            forward.insert(from, edges);
        }

        drop(forward);
        drop(reverse);
        self.cache.write().clear();
        Ok(())
    }

    /// Recursive tree walk from `root_id` to `opts.max_depth` hops. Follows
    /// both forward and reverse edges when `opts.follow_both_ways`; stops
    /// descending past a node whose element type is in `opts.stop_at_types`;
    /// skips already-visited ids when `opts.exclude_visited`. Cached by a
    /// key over `root_id` plus every option that affects the result.
    pub async fn expand_relationships(
        &self,
        root_id: &str,
        repository: &dyn ElementRepository,
        opts: &ExpandOptions,
    ) -> Result<ExpansionNode> {
        let key = format!(
            "{root_id}:{}:{}:{}:{:?}",
            opts.max_depth, opts.follow_both_ways, opts.exclude_visited, opts.stop_at_types
        );
        if let Some(cached) = self.cache.read().get(&key) {
            if cached.expires_at > Instant::now() {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(cached.tree.clone());
            }
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let mut visited = HashSet::new();
        visited.insert(root_id.to_string());
        let tree = Box::pin(self.expand_node(root_id, 0, None, repository, opts, &mut visited)).await?;

        self.cache.write().insert(
            key,
            CachedExpansion {
                tree: tree.clone(),
                expires_at: Instant::now() + self.config.cache_ttl,
            },
        );
        Ok(tree)
    }

    async fn expand_node(
        &self,
        id: &str,
        depth: usize,
        via_relation_type: Option<String>,
        repository: &dyn ElementRepository,
        opts: &ExpandOptions,
        visited: &mut HashSet<String>,
    ) -> Result<ExpansionNode> {
        let mut node = ExpansionNode {
            id: id.to_string(),
            depth,
            via_relation_type,
            children: Vec::new(),
        };

        if depth >= opts.max_depth {
            return Ok(node);
        }

        if !opts.stop_at_types.is_empty() {
            if let Ok(element) = repository.get_by_id(id).await {
                if opts.stop_at_types.contains(&element.element_type()) {
                    return Ok(node);
                }
            }
        }

        let mut edges = self.related_elements(id);
        if opts.follow_both_ways {
            edges.extend(self.related_memories(id).into_iter().map(|e| Relationship {
                from: e.to.clone(),
                to: e.from.clone(),
                relation_type: e.relation_type.clone(),
                weight: e.weight,
            }));
        }

        for edge in edges {
            if opts.exclude_visited && !visited.insert(edge.to.clone()) {
                continue;
            }
            let child = Box::pin(self.expand_node(
                &edge.to,
                depth + 1,
                Some(edge.relation_type.clone()),
                repository,
                opts,
                visited,
            ))
            .await?;
            node.children.push(child);
        }

        Ok(node)
    }

    #[must_use]
    pub fn stats(&self) -> RelationshipStats {
        let forward = self.forward.read();
        let reverse = self.reverse.read();
        RelationshipStats {
            forward_entries: forward.values().map(Vec::len).sum(),
            reverse_entries: reverse.values().map(Vec::len).sum(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_size: self.cache.read().len(),
        }
    }

    /// Drops every cache entry whose key mentions `id` — coarse but cheap,
    /// and correct since any cached expansion that passed through `id`
    /// necessarily has `id` contribute to one of its cache keys or values.
    fn invalidate_containing(&self, id: &str) {
        self.cache.write().retain(|key, _| !key.contains(id));
    }
}

impl Default for RelationshipIndex {
    fn default() -> Self {
        Self::new(RelationshipConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::memory::Memory;
    use crate::repository::InMemoryElementRepository;

    fn config() -> RelationshipConfig {
        RelationshipConfig {
            cache_ttl: Duration::from_secs(60),
            max_depth: 3,
        }
    }

    #[test]
    fn link_then_related_elements_returns_forward_edge() {
        let index = RelationshipIndex::new(config());
        index.link("a", "b", "related_to", 1.0);
        let related = index.related_elements("a");
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].to, "b");
    }

    #[test]
    fn related_memories_returns_reverse_edge() {
        let index = RelationshipIndex::new(config());
        index.link("a", "b", "related_to", 1.0);
        let related = index.related_memories("b");
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].from, "a");
    }

    #[test]
    fn add_overwrites_prior_forward_list_and_clears_stale_reverse_edges() {
        let index = RelationshipIndex::new(config());
        index.add("a", &["b".to_string(), "c".to_string()]);
        assert_eq!(index.related_memories("b").len(), 1);

        index.add("a", &["c".to_string()]);
        assert!(index.related_memories("b").is_empty());
        let related = index.related_elements("a");
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].to, "c");
    }

    #[test]
    fn remove_drops_edge_from_both_maps() {
        let index = RelationshipIndex::new(config());
        index.link("a", "b", "related_to", 1.0);
        index.remove("a");
        assert!(index.related_elements("a").is_empty());
        assert!(index.related_memories("b").is_empty());
    }

    #[tokio::test]
    async fn rebuild_reads_related_to_from_repository() {
        let index = RelationshipIndex::new(config());
        index.link("a", "stale", "related_to", 1.0);

        let repo = InMemoryElementRepository::new();
        let mut m = Memory::new("x", "X", "content");
        m.metadata.extra.insert("related_to".to_string(), "y".to_string());
        repo.create(Element::Memory(m)).await.unwrap();
        repo.create(Element::Memory(Memory::new("y", "Y", "content"))).await.unwrap();

        index.rebuild(&repo).await.unwrap();

        assert!(index.related_elements("a").is_empty());
        let related = index.related_elements("x");
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].to, "y");
    }

    #[tokio::test]
    async fn expand_relationships_traverses_multiple_hops_as_a_tree() {
        let index = RelationshipIndex::new(config());
        index.link("a", "b", "related_to", 1.0);
        index.link("b", "c", "related_to", 1.0);
        let repo = InMemoryElementRepository::new();

        let tree = index
            .expand_relationships("a", &repo, &ExpandOptions::new(2))
            .await
            .unwrap();
        assert_eq!(tree.id, "a");
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].id, "b");
        assert_eq!(tree.children[0].children[0].id, "c");
    }

    #[tokio::test]
    async fn expand_relationships_follows_both_ways_when_enabled() {
        let index = RelationshipIndex::new(config());
        index.link("a", "b", "related_to", 1.0);
        let repo = InMemoryElementRepository::new();

        let mut opts = ExpandOptions::new(1);
        opts.follow_both_ways = true;
        let tree = index.expand_relationships("b", &repo, &opts).await.unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].id, "a");
    }

    #[tokio::test]
    async fn expand_relationships_stops_descending_at_configured_types() {
        let index = RelationshipIndex::new(config());
        index.link("a", "b", "related_to", 1.0);
        index.link("b", "c", "related_to", 1.0);

        let repo = InMemoryElementRepository::new();
        repo.create(Element::Memory(Memory::new("b", "B", "content"))).await.unwrap();

        let mut opts = ExpandOptions::new(3);
        opts.stop_at_types = vec![ElementType::Memory];
        let tree = index.expand_relationships("a", &repo, &opts).await.unwrap();
        assert_eq!(tree.children.len(), 1);
        assert!(tree.children[0].children.is_empty());
    }

    #[tokio::test]
    async fn expand_relationships_excludes_cycles_when_configured() {
        let index = RelationshipIndex::new(config());
        index.link("a", "b", "related_to", 1.0);
        index.link("b", "a", "related_to", 1.0);
        let repo = InMemoryElementRepository::new();

        let tree = index
            .expand_relationships("a", &repo, &ExpandOptions::new(5))
            .await
            .unwrap();
        assert_eq!(tree.children.len(), 1);
        assert!(tree.children[0].children.is_empty());
    }
}
