//! Hierarchical Navigable Small World graph: approximate nearest-neighbor
//! index over `(id, vector)` pairs, with persistent binary snapshots.
//!
//! Standard HNSW: greedy descent from the entry point down to layer 0, then
//! a best-first beam search of width `ef_search` at layer 0. Neighbor
//! selection at insert keeps the closest `M` candidates that don't already
//! have a closer selected neighbor (the standard "heuristic" variant).

use crate::element::Vector;
use crate::embeddings::cosine_similarity;
use crate::error::{Error, Result};
use rand::Rng;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::io::{Read, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"HNSW";
const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone)]
struct HnswNode {
    id: String,
    vector: Vector,
    /// Top level this node participates in (layers 0..=level).
    level: u8,
    /// `neighbors[layer]` is an ordered (closest-first) list of `(node_index, distance)`.
    neighbors: Vec<Vec<(usize, f32)>>,
}

/// A scored hit returned from `search`/`search_knn`.
#[derive(Debug, Clone, PartialEq)]
pub struct HnswHit {
    pub id: String,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    // Min-heap by distance: reverse the natural float ordering.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug, Clone, Copy)]
struct MaxCandidate(Candidate);
impl PartialEq for MaxCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.0.distance == other.0.distance
    }
}
impl Eq for MaxCandidate {}
impl PartialOrd for MaxCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for MaxCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .distance
            .partial_cmp(&other.0.distance)
            .unwrap_or(Ordering::Equal)
    }
}

/// Connectivity parameters, fixed for the index's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    pub dimensions: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

/// Multi-layer proximity graph over vectors.
pub struct HnswGraph {
    params: HnswParams,
    nodes: Vec<Option<HnswNode>>,
    id_to_index: HashMap<String, usize>,
    entry_point: Option<usize>,
    top_level: u8,
    inv_log_m: f64,
    rng: rand_chacha::ChaCha8Rng,
}

impl HnswGraph {
    #[must_use]
    pub fn new(params: HnswParams) -> Self {
        use rand::SeedableRng;
        Self {
            inv_log_m: 1.0 / (params.m.max(2) as f64).ln(),
            params,
            nodes: Vec::new(),
            id_to_index: HashMap::new(),
            entry_point: None,
            top_level: 0,
            rng: rand_chacha::ChaCha8Rng::from_os_rng(),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.id_to_index.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.id_to_index.clear();
        self.entry_point = None;
        self.top_level = 0;
    }

    fn random_level(&mut self) -> u8 {
        let uniform: f64 = self.rng.random_range(f64::EPSILON..1.0);
        let level = (-uniform.ln() * self.inv_log_m).floor() as u8;
        level.min(32)
    }

    fn distance(&self, query: &[f32], index: usize) -> f32 {
        let node = self.nodes[index].as_ref().expect("tombstoned index used");
        1.0 - cosine_similarity(query, &node.vector)
    }

    /// Inserts a new vector. Fails with `DimensionMismatch` or `DuplicateId`.
    pub fn insert(&mut self, id: impl Into<String>, vector: Vector) -> Result<()> {
        let id = id.into();
        if vector.len() != self.params.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.params.dimensions,
                got: vector.len(),
            });
        }
        if self.id_to_index.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }

        let level = self.random_level();
        let new_index = self.nodes.len();
        self.nodes.push(Some(HnswNode {
            id: id.clone(),
            vector: vector.clone(),
            level,
            neighbors: vec![Vec::new(); level as usize + 1],
        }));
        self.id_to_index.insert(id, new_index);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(new_index);
            self.top_level = level;
            return Ok(());
        };

        // Greedy descent from the top layer down to `level + 1`.
        let mut nearest = entry;
        for layer in ((level + 1)..=self.top_level).rev() {
            nearest = self.greedy_closest(&vector, nearest, layer);
        }

        // From `level` down to 0: beam search + heuristic neighbor selection.
        let mut candidates_entry = nearest;
        for layer in (0..=level).rev() {
            let candidates = self.search_layer(&vector, candidates_entry, self.params.ef_construction, layer);
            let selected = self.select_neighbors(&vector, candidates, self.params.m);
            for &(neighbor_index, dist) in &selected {
                self.link(new_index, neighbor_index, dist, layer);
            }
            if let Some(&(best, _)) = selected.first() {
                candidates_entry = best;
            }
        }

        if level > self.top_level {
            self.top_level = level;
            self.entry_point = Some(new_index);
        }

        Ok(())
    }

    fn link(&mut self, a: usize, b: usize, distance: f32, layer: usize) {
        self.add_neighbor(a, b, distance, layer);
        self.add_neighbor(b, a, distance, layer);
    }

    fn add_neighbor(&mut self, node_index: usize, neighbor_index: usize, distance: f32, layer: usize) {
        let node = self.nodes[node_index].as_mut().expect("tombstoned index used");
        if layer >= node.neighbors.len() {
            return;
        }
        if node.neighbors[layer].iter().any(|&(n, _)| n == neighbor_index) {
            return;
        }
        node.neighbors[layer].push((neighbor_index, distance));
        node.neighbors[layer].sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        let max_links = if layer == 0 { self.params.m * 2 } else { self.params.m };
        node.neighbors[layer].truncate(max_links);
    }

    fn greedy_closest(&self, query: &[f32], from: usize, layer: u8) -> usize {
        let mut current = from;
        let mut current_dist = self.distance(query, current);
        loop {
            let mut improved = false;
            let neighbors = self.nodes[current]
                .as_ref()
                .map(|n| n.neighbors.get(layer as usize).cloned().unwrap_or_default())
                .unwrap_or_default();
            for (neighbor_index, _) in neighbors {
                if self.nodes[neighbor_index].is_none() {
                    continue;
                }
                let d = self.distance(query, neighbor_index);
                if d < current_dist {
                    current_dist = d;
                    current = neighbor_index;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first beam search of width `ef` at `layer`, returning candidates
    /// sorted by ascending distance.
    fn search_layer(&self, query: &[f32], entry: usize, ef: usize, layer: u8) -> Vec<(usize, f32)> {
        if self.nodes[entry].is_none() {
            return self.linear_scan_layer0(query, ef);
        }
        let mut visited = std::collections::HashSet::new();
        visited.insert(entry);
        let entry_dist = self.distance(query, entry);
        let mut candidates = BinaryHeap::new();
        candidates.push(Candidate {
            index: entry,
            distance: entry_dist,
        });
        let mut found = BinaryHeap::new();
        found.push(MaxCandidate(Candidate {
            index: entry,
            distance: entry_dist,
        }));

        while let Some(Candidate { index: c, distance: c_dist }) = candidates.pop() {
            let worst = found.peek().map(|m| m.0.distance).unwrap_or(f32::INFINITY);
            if c_dist > worst && found.len() >= ef {
                break;
            }
            let neighbors = self.nodes[c]
                .as_ref()
                .map(|n| n.neighbors.get(layer as usize).cloned().unwrap_or_default())
                .unwrap_or_default();
            for (neighbor_index, _) in neighbors {
                if self.nodes[neighbor_index].is_none() || !visited.insert(neighbor_index) {
                    continue;
                }
                let d = self.distance(query, neighbor_index);
                let worst = found.peek().map(|m| m.0.distance).unwrap_or(f32::INFINITY);
                if found.len() < ef || d < worst {
                    candidates.push(Candidate {
                        index: neighbor_index,
                        distance: d,
                    });
                    found.push(MaxCandidate(Candidate {
                        index: neighbor_index,
                        distance: d,
                    }));
                    if found.len() > ef {
                        found.pop();
                    }
                }
            }
        }

        let mut result: Vec<(usize, f32)> = found.into_sorted_vec().into_iter().map(|m| (m.0.index, m.0.distance)).collect();
        result.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        result
    }

    /// Keeps the closest `m` candidates that don't already have a closer
    /// selected neighbor (standard HNSW neighbor-selection heuristic).
    fn select_neighbors(&self, query: &[f32], candidates: Vec<(usize, f32)>, m: usize) -> Vec<(usize, f32)> {
        let mut selected: Vec<(usize, f32)> = Vec::new();
        for (candidate_index, candidate_dist) in candidates {
            if selected.len() >= m {
                break;
            }
            let dominated = selected.iter().any(|&(sel_index, _)| {
                let d = self.distance(
                    self.nodes[candidate_index]
                        .as_ref()
                        .map(|n| n.vector.as_slice())
                        .unwrap_or(query),
                    sel_index,
                );
                d < candidate_dist
            });
            if !dominated {
                selected.push((candidate_index, candidate_dist));
            }
        }
        selected
    }

    /// Fallback when the stored entry point has been removed: linear scan of
    /// all surviving nodes at layer 0.
    fn linear_scan_layer0(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut all: Vec<(usize, f32)> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|_| (i, self.distance(query, i))))
            .collect();
        all.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        all.truncate(k);
        all
    }

    /// Removes the node and unlinks it from neighbor lists at every level.
    /// Neighbors are NOT replaced; local recall may degrade until `rebuild`.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let index = self
            .id_to_index
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let removed = self.nodes[index].take().expect("index must be present");

        for layer in 0..=removed.level as usize {
            for &(neighbor_index, _) in removed.neighbors.get(layer).into_iter().flatten() {
                if let Some(neighbor) = self.nodes[neighbor_index].as_mut() {
                    if let Some(list) = neighbor.neighbors.get_mut(layer) {
                        list.retain(|&(n, _)| n != index);
                    }
                }
            }
        }

        if self.entry_point == Some(index) {
            self.entry_point = self
                .nodes
                .iter()
                .enumerate()
                .filter_map(|(i, n)| n.as_ref().map(|node| (i, node.level)))
                .max_by_key(|&(_, level)| level)
                .map(|(i, level)| {
                    self.top_level = level;
                    i
                });
            if self.entry_point.is_none() {
                self.top_level = 0;
            }
        }
        Ok(())
    }

    /// Top-`k` nearest neighbors using the default `ef_search`.
    #[must_use]
    pub fn search_knn(&self, query: &[f32], k: usize) -> Vec<HnswHit> {
        self.search(query, k, self.params.ef_search.max(k))
    }

    /// Top-`k` nearest neighbors with a caller-chosen `ef_search`.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<HnswHit> {
        let ef = ef_search.max(k);
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        if self.nodes[entry].is_none() {
            return self
                .linear_scan_layer0(query, k)
                .into_iter()
                .map(|(i, d)| HnswHit {
                    id: self.nodes[i].as_ref().expect("just filtered").id.clone(),
                    distance: d,
                })
                .collect();
        }

        let mut nearest = entry;
        for layer in (1..=self.top_level).rev() {
            nearest = self.greedy_closest(query, nearest, layer);
        }
        let mut results = self.search_layer(query, nearest, ef, 0);
        results.truncate(k);
        results
            .into_iter()
            .map(|(i, d)| HnswHit {
                id: self.nodes[i].as_ref().expect("alive by construction").id.clone(),
                distance: d,
            })
            .collect()
    }

    #[must_use]
    pub fn statistics(&self) -> HnswStatistics {
        HnswStatistics {
            node_count: self.size(),
            max_level: self.top_level,
        }
    }

    /// Binary snapshot: header then per-node records, per spec §6.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.params.dimensions as u16).to_le_bytes());
        buf.extend_from_slice(&(self.params.m as u16).to_le_bytes());
        buf.extend_from_slice(&(self.params.ef_construction as u16).to_le_bytes());

        let alive: Vec<(usize, &HnswNode)> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|node| (i, node)))
            .collect();
        buf.extend_from_slice(&(alive.len() as u64).to_le_bytes());

        // Map old sparse index -> dense position in `alive` for the on-disk
        // neighbor references.
        let dense_of: HashMap<usize, u16> = alive
            .iter()
            .enumerate()
            .map(|(dense, (sparse, _))| (*sparse, dense as u16))
            .collect();

        for (_, node) in &alive {
            let id_bytes = node.id.as_bytes();
            buf.extend_from_slice(&(id_bytes.len() as u16).to_le_bytes());
            buf.extend_from_slice(id_bytes);
            buf.push(node.level);
            for v in &node.vector {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            for layer_neighbors in &node.neighbors {
                let refs: Vec<u16> = layer_neighbors
                    .iter()
                    .filter_map(|(idx, _)| dense_of.get(idx).copied())
                    .collect();
                buf.extend_from_slice(&(refs.len() as u16).to_le_bytes());
                for r in refs {
                    buf.extend_from_slice(&r.to_le_bytes());
                }
            }
        }

        let mut file = std::fs::File::create(path)?;
        file.write_all(&buf)?;
        Ok(())
    }

    /// Loads a binary snapshot, replacing this graph's contents on success.
    /// On any I/O or format error the in-memory graph is left untouched.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = std::fs::File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        let loaded = Self::parse(&buf)?;
        *self = loaded;
        Ok(())
    }

    fn parse(buf: &[u8]) -> Result<Self> {
        let mut cursor = 0usize;
        let take = |cursor: &mut usize, n: usize| -> Result<&[u8]> {
            if *cursor + n > buf.len() {
                return Err(Error::CorruptedSnapshot("unexpected end of file".to_string()));
            }
            let slice = &buf[*cursor..*cursor + n];
            *cursor += n;
            Ok(slice)
        };

        let magic = take(&mut cursor, 4)?;
        if magic != MAGIC {
            return Err(Error::CorruptedSnapshot("bad magic".to_string()));
        }
        let version = u16::from_le_bytes(take(&mut cursor, 2)?.try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(Error::CorruptedSnapshot(format!("unsupported version {version}")));
        }
        let dimensions = u16::from_le_bytes(take(&mut cursor, 2)?.try_into().unwrap()) as usize;
        let m = u16::from_le_bytes(take(&mut cursor, 2)?.try_into().unwrap()) as usize;
        let ef_construction = u16::from_le_bytes(take(&mut cursor, 2)?.try_into().unwrap()) as usize;
        let node_count = u64::from_le_bytes(take(&mut cursor, 8)?.try_into().unwrap()) as usize;

        let params = HnswParams {
            dimensions,
            m,
            ef_construction,
            ef_search: ef_construction.max(1),
        };
        let mut graph = Self::new(params);

        struct Raw {
            id: String,
            level: u8,
            vector: Vector,
            neighbor_refs: Vec<Vec<u16>>,
        }
        let mut raws = Vec::with_capacity(node_count);

        for _ in 0..node_count {
            let id_len = u16::from_le_bytes(take(&mut cursor, 2)?.try_into().unwrap()) as usize;
            let id_bytes = take(&mut cursor, id_len)?;
            let id = String::from_utf8(id_bytes.to_vec())
                .map_err(|e| Error::CorruptedSnapshot(e.to_string()))?;
            let level = take(&mut cursor, 1)?[0];
            let mut vector = Vec::with_capacity(dimensions);
            for _ in 0..dimensions {
                let v = f32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap());
                vector.push(v);
            }
            let mut neighbor_refs = Vec::with_capacity(level as usize + 1);
            for _ in 0..=level {
                let count = u16::from_le_bytes(take(&mut cursor, 2)?.try_into().unwrap()) as usize;
                let mut refs = Vec::with_capacity(count);
                for _ in 0..count {
                    refs.push(u16::from_le_bytes(take(&mut cursor, 2)?.try_into().unwrap()));
                }
                neighbor_refs.push(refs);
            }
            raws.push(Raw {
                id,
                level,
                vector,
                neighbor_refs,
            });
        }

        graph.nodes = raws
            .iter()
            .map(|r| {
                Some(HnswNode {
                    id: r.id.clone(),
                    vector: r.vector.clone(),
                    level: r.level,
                    neighbors: vec![Vec::new(); r.level as usize + 1],
                })
            })
            .collect();
        graph.id_to_index = raws
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        for (i, raw) in raws.iter().enumerate() {
            for (layer, refs) in raw.neighbor_refs.iter().enumerate() {
                for &r in refs {
                    let neighbor_index = r as usize;
                    if neighbor_index >= graph.nodes.len() {
                        continue;
                    }
                    let dist = graph.distance(&raw.vector, neighbor_index);
                    if let Some(node) = graph.nodes[i].as_mut() {
                        node.neighbors[layer].push((neighbor_index, dist));
                    }
                }
            }
        }

        graph.entry_point = (0..graph.nodes.len())
            .max_by_key(|&i| graph.nodes[i].as_ref().map(|n| n.level).unwrap_or(0));
        graph.top_level = graph
            .entry_point
            .and_then(|e| graph.nodes[e].as_ref())
            .map(|n| n.level)
            .unwrap_or(0);

        Ok(graph)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HnswStatistics {
    pub node_count: usize,
    pub max_level: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(d: usize) -> HnswParams {
        HnswParams {
            dimensions: d,
            m: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }

    fn unit_vec(seed: u32, d: usize) -> Vector {
        let mut v = vec![0.0; d];
        v[(seed as usize) % d] = 1.0;
        v[((seed as usize) + 1) % d] = 0.3;
        v
    }

    #[test]
    fn self_retrieval_returns_exact_match_with_zero_distance() {
        let mut graph = HnswGraph::new(params(8));
        for i in 0..50u32 {
            graph.insert(format!("id-{i}"), unit_vec(i, 8)).unwrap();
        }
        let target = unit_vec(17, 8);
        let hits = graph.search_knn(&target, 1);
        assert_eq!(hits[0].id, "id-17");
        assert!(hits[0].distance.abs() < 1e-4);
    }

    #[test]
    fn insert_then_delete_returns_size_to_prior_value() {
        let mut graph = HnswGraph::new(params(4));
        graph.insert("a", vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(graph.size(), 1);
        graph.insert("b", vec![0.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(graph.size(), 2);
        graph.delete("b").unwrap();
        assert_eq!(graph.size(), 1);
        assert!(graph.delete("b").is_err());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut graph = HnswGraph::new(params(4));
        let err = graph.insert("a", vec![1.0, 0.0]);
        assert!(matches!(err, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut graph = HnswGraph::new(params(4));
        graph.insert("a", vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        let err = graph.insert("a", vec![0.0, 1.0, 0.0, 0.0]);
        assert!(matches!(err, Err(Error::DuplicateId(_))));
    }

    #[test]
    fn snapshot_round_trip_preserves_top1_results() {
        let mut graph = HnswGraph::new(params(8));
        for i in 0..40u32 {
            graph.insert(format!("id-{i}"), unit_vec(i, 8)).unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.bin");
        graph.save(&path).unwrap();

        let mut loaded = HnswGraph::new(params(8));
        loaded.load(&path).unwrap();

        for i in [0u32, 5, 13, 27, 39] {
            let query = unit_vec(i, 8);
            let expected = graph.search_knn(&query, 1);
            let got = loaded.search_knn(&query, 1);
            assert_eq!(expected[0].id, got[0].id);
        }
    }

    #[test]
    fn load_with_bad_magic_fails_and_leaves_graph_intact() {
        let mut graph = HnswGraph::new(params(4));
        graph.insert("a", vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, b"NOPE").unwrap();
        let err = graph.load(&path);
        assert!(err.is_err());
        assert_eq!(graph.size(), 1);
    }
}
