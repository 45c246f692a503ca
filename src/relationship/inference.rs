//! Heuristic relationship discovery: four independent signal sources whose
//! hits are merged per-pair before a confidence/evidence gate decides what
//! gets handed to [`super::index::RelationshipIndex`].

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::InferenceConfig;
use crate::element::tag_jaccard;
use crate::embeddings::cosine_similarity;

/// One candidate relationship, with the evidence that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferredRelationship {
    pub from: String,
    pub to: String,
    pub relation_type: String,
    pub confidence: f32,
    pub evidence: Vec<String>,
}

/// Minimal view of an element this module needs to reason about.
pub struct InferenceCandidate<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub content: &'a str,
    pub tags: &'a [String],
    pub embedding: Option<&'a [f32]>,
}

fn pattern_regexes() -> &'static [(Regex, &'static str)] {
    static RE: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RE.get_or_init(|| {
        vec![
            (Regex::new(r"(?i)see also ([A-Za-z0-9 _-]+)").unwrap(), "see_also"),
            (Regex::new(r"(?i)related to ([A-Za-z0-9 _-]+)").unwrap(), "related_to"),
            (Regex::new(r"(?i)based on ([A-Za-z0-9 _-]+)").unwrap(), "based_on"),
            (Regex::new(r"(?i)depends on ([A-Za-z0-9 _-]+)").unwrap(), "depends_on"),
        ]
    })
}

/// Stateless inference over pairs of candidates; holds only the thresholds.
pub struct RelationshipInference {
    config: InferenceConfig,
}

impl RelationshipInference {
    #[must_use]
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    /// `a`'s content literally names `b`'s name.
    #[must_use]
    pub fn infer_mentions(&self, a: &InferenceCandidate, b: &InferenceCandidate) -> Option<InferredRelationship> {
        if b.name.len() < 3 {
            return None;
        }
        if a.content.to_lowercase().contains(&b.name.to_lowercase()) {
            Some(InferredRelationship {
                from: a.id.to_string(),
                to: b.id.to_string(),
                relation_type: "mentions".to_string(),
                confidence: 0.9,
                evidence: vec![format!("content mentions '{}'", b.name)],
            })
        } else {
            None
        }
    }

    /// Tag-set overlap (Jaccard) above `keyword_jaccard_min`.
    #[must_use]
    pub fn infer_keyword_overlap(&self, a: &InferenceCandidate, b: &InferenceCandidate) -> Option<InferredRelationship> {
        let tags_a: HashSet<&str> = a.tags.iter().map(String::as_str).collect();
        let tags_b: HashSet<&str> = b.tags.iter().map(String::as_str).collect();
        let score = tag_jaccard(&tags_a, &tags_b);
        if score >= self.config.keyword_jaccard_min {
            Some(InferredRelationship {
                from: a.id.to_string(),
                to: b.id.to_string(),
                relation_type: "shared_topic".to_string(),
                confidence: score,
                evidence: vec![format!("tag overlap {score:.2}")],
            })
        } else {
            None
        }
    }

    /// Embedding cosine similarity above `semantic_similarity_min`.
    #[must_use]
    pub fn infer_semantic(&self, a: &InferenceCandidate, b: &InferenceCandidate) -> Option<InferredRelationship> {
        let (Some(va), Some(vb)) = (a.embedding, b.embedding) else {
            return None;
        };
        let score = cosine_similarity(va, vb);
        if score >= self.config.semantic_similarity_min {
            Some(InferredRelationship {
                from: a.id.to_string(),
                to: b.id.to_string(),
                relation_type: "semantically_similar".to_string(),
                confidence: score,
                evidence: vec![format!("cosine similarity {score:.2}")],
            })
        } else {
            None
        }
    }

    /// Textual patterns like "see also X" / "depends on Y" in `a`'s content.
    #[must_use]
    pub fn infer_patterns(&self, a: &InferenceCandidate, candidates: &[InferenceCandidate]) -> Vec<InferredRelationship> {
        let mut found = Vec::new();
        for (regex, relation_type) in pattern_regexes() {
            for captures in regex.captures_iter(a.content) {
                let Some(mention) = captures.get(1) else { continue };
                let mention = mention.as_str().trim().to_lowercase();
                for other in candidates {
                    if other.id == a.id {
                        continue;
                    }
                    if mention.contains(&other.name.to_lowercase()) && !other.name.is_empty() {
                        found.push(InferredRelationship {
                            from: a.id.to_string(),
                            to: other.id.to_string(),
                            relation_type: relation_type.to_string(),
                            confidence: 0.75,
                            evidence: vec![format!("pattern '{relation_type}' referencing '{}'", other.name)],
                        });
                    }
                }
            }
        }
        found
    }

    /// Runs every signal over all ordered pairs, merges evidence for
    /// duplicate `(from, to, relation_type)` triples, and keeps only the
    /// pairs clearing both `min_confidence` and `require_evidence`.
    #[must_use]
    pub fn infer_all(&self, candidates: &[InferenceCandidate]) -> Vec<InferredRelationship> {
        let mut merged: HashMap<(String, String, String), InferredRelationship> = HashMap::new();

        let mut upsert = |rel: InferredRelationship| {
            let key = (rel.from.clone(), rel.to.clone(), rel.relation_type.clone());
            merged
                .entry(key)
                .and_modify(|existing| {
                    existing.confidence = existing.confidence.max(rel.confidence);
                    existing.evidence.extend(rel.evidence.clone());
                })
                .or_insert(rel);
        };

        for a in candidates {
            for b in candidates {
                if a.id == b.id {
                    continue;
                }
                if let Some(rel) = self.infer_mentions(a, b) {
                    upsert(rel);
                }
                if let Some(rel) = self.infer_keyword_overlap(a, b) {
                    upsert(rel);
                }
                if let Some(rel) = self.infer_semantic(a, b) {
                    upsert(rel);
                }
            }
            for rel in self.infer_patterns(a, candidates) {
                upsert(rel);
            }
        }

        merged
            .into_values()
            .filter(|r| r.confidence >= self.config.min_confidence)
            .filter(|r| r.evidence.len() >= self.config.require_evidence || self.config.require_evidence == 0)
            .collect()
    }

    /// Deduplicates evidence strings in place (distinct signal sources can
    /// independently produce the same wording, e.g. two identical tag sets).
    pub fn dedupe_evidence(relationships: &mut [InferredRelationship]) {
        for rel in relationships {
            let unique: HashSet<String> = rel.evidence.drain(..).collect();
            rel.evidence = unique.into_iter().collect();
        }
    }
}
