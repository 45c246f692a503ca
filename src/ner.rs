//! The ONNX-backed NER/sentiment/topic collaborator (out of scope per spec
//! §1): this module defines the trait and a regex/heuristic fallback that
//! always reports available, serving as both "the rule-based fallback" §7
//! requires and the default collaborator since no ONNX runtime is wired in.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// An entity extracted from text, with a confidence and coarse type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedEntity {
    pub text: String,
    pub entity_type: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[async_trait]
pub trait NerProvider: Send + Sync {
    async fn extract_entities(&self, text: &str) -> Vec<EnhancedEntity>;
    async fn extract_entities_batch(&self, texts: &[String]) -> Vec<Vec<EnhancedEntity>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.extract_entities(t).await);
        }
        out
    }
    async fn analyze_sentiment(&self, text: &str) -> Sentiment;
    async fn extract_topics(&self, text: &str) -> Vec<String>;
    fn is_available(&self) -> bool;
}

/// Rule-based fallback: capitalized multi-word runs as entities, simple
/// keyword sentiment scoring, most-frequent non-stopword tokens as topics.
#[derive(Default)]
pub struct RuleBasedNerProvider;

fn capitalized_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Z][a-zA-Z0-9]*(?:\s+[A-Z][a-zA-Z0-9]*)*)\b").unwrap())
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap())
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "to", "of", "in", "on",
    "for", "with", "this", "that", "it", "as", "by", "at",
];

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "success", "successful", "excellent", "improved", "fixed", "works",
    "passed", "happy", "win",
];
const NEGATIVE_WORDS: &[&str] = &[
    "bad", "fail", "failed", "failure", "broken", "error", "crash", "regression", "bug", "worse",
    "lost",
];

#[async_trait]
impl NerProvider for RuleBasedNerProvider {
    async fn extract_entities(&self, text: &str) -> Vec<EnhancedEntity> {
        let mut entities = Vec::new();
        for m in capitalized_run_regex().find_iter(text) {
            let word = m.as_str();
            if word.split_whitespace().count() >= 1 && word.len() > 1 {
                entities.push(EnhancedEntity {
                    text: word.to_string(),
                    entity_type: "proper_noun".to_string(),
                    confidence: 0.6,
                });
            }
        }
        for m in number_regex().find_iter(text) {
            entities.push(EnhancedEntity {
                text: m.as_str().to_string(),
                entity_type: "number".to_string(),
                confidence: 0.9,
            });
        }
        entities
    }

    async fn analyze_sentiment(&self, text: &str) -> Sentiment {
        let lower = text.to_lowercase();
        let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
        let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
        match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        }
    }

    async fn extract_topics(&self, text: &str) -> Vec<String> {
        use std::collections::HashMap;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for word in text.split_whitespace() {
            let cleaned: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if cleaned.len() < 3 || STOPWORDS.contains(&cleaned.as_str()) {
                continue;
            }
            *counts.entry(cleaned).or_insert(0) += 1;
        }
        let mut topics: Vec<(String, usize)> = counts.into_iter().collect();
        topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        topics.into_iter().take(5).map(|(w, _)| w).collect()
    }

    fn is_available(&self) -> bool {
        true
    }
}
