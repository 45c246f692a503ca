//! Lightweight knowledge-graph extraction used by consolidation reports:
//! entities, concepts and a summary built from whatever the NER
//! collaborator (rule-based fallback, absent a real NER provider) returns.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ner::{EnhancedEntity, NerProvider};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub entities: Vec<EnhancedEntity>,
    pub concepts: Vec<String>,
    pub keywords: Vec<String>,
    pub summary: String,
}

/// Builds a knowledge graph over a batch of content strings: entities and
/// topics are pooled and deduplicated; the summary is the leading sentence
/// of each content, joined, then hard-truncated.
pub async fn build_knowledge_graph(ner: &dyn NerProvider, contents: &[String]) -> KnowledgeGraph {
    let mut entities: Vec<EnhancedEntity> = Vec::new();
    let mut seen_entities = HashSet::new();
    let mut keywords: Vec<String> = Vec::new();
    let mut seen_keywords = HashSet::new();
    let mut lead_sentences = Vec::new();

    for content in contents {
        for entity in ner.extract_entities(content).await {
            if seen_entities.insert(entity.text.clone()) {
                entities.push(entity);
            }
        }
        for topic in ner.extract_topics(content).await {
            if seen_keywords.insert(topic.clone()) {
                keywords.push(topic);
            }
        }
        if let Some(sentence) = content.split(['.', '\n']).find(|s| !s.trim().is_empty()) {
            lead_sentences.push(sentence.trim().to_string());
        }
    }

    let concepts = keywords.iter().take(10).cloned().collect();
    let mut summary = lead_sentences.join(". ");
    const MAX_SUMMARY_LEN: usize = 500;
    if summary.len() > MAX_SUMMARY_LEN {
        summary.truncate(MAX_SUMMARY_LEN);
        summary.push('\u{2026}');
    }

    KnowledgeGraph {
        entities,
        concepts,
        keywords,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ner::RuleBasedNerProvider;

    #[tokio::test]
    async fn pools_entities_and_keywords_across_contents() {
        let ner = RuleBasedNerProvider;
        let contents = vec![
            "Alice shipped the Rust compiler update".to_string(),
            "Bob reviewed the Rust compiler update".to_string(),
        ];
        let graph = build_knowledge_graph(&ner, &contents).await;
        assert!(graph.entities.iter().any(|e| e.text == "Alice"));
        assert!(graph.entities.iter().any(|e| e.text == "Bob"));
        assert!(!graph.summary.is_empty());
    }

    #[tokio::test]
    async fn empty_input_produces_empty_graph() {
        let ner = RuleBasedNerProvider;
        let graph = build_knowledge_graph(&ner, &[]).await;
        assert!(graph.entities.is_empty());
        assert!(graph.summary.is_empty());
    }
}
