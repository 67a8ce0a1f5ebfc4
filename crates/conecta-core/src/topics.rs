//! Topic extraction for conversation summaries.
//!
//! One generation call over the rendered transcript, then the topic
//! [`Sanitizer`], then comma splitting and order-preserving dedup. Empty,
//! too-short or refusing model output yields no topics, which callers
//! present as "no topics found".
//!
//! [`TopicGraph`] is the shape handed to graph renderers: a fixed root node
//! with one edge to every topic.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::generate::{GenerationParams, Generator};
use crate::models::ConversationMessage;
use crate::prompt::build_topic_prompt;
use crate::sanitize::Sanitizer;

pub const DEFAULT_MIN_CHARS: usize = 3;

pub const ROOT_NODE_ID: &str = "Conversa Principal";
pub const ROOT_NODE_LABEL: &str = "Conversa";
pub const EDGE_LABEL: &str = "contém";

/// Matched case-insensitively anywhere in the sanitized output.
const REFUSAL_PHRASES: &[&str] = &[
    "não consigo",
    "não posso",
    "não foi possível",
    "não sou capaz",
    "incapaz de",
    "não é possível",
    "i cannot",
    "i can't",
    "i am unable",
    "it is not possible",
];

pub struct TopicExtractor {
    generator: Arc<dyn Generator>,
    sanitizer: Sanitizer,
    params: GenerationParams,
    min_chars: usize,
}

impl TopicExtractor {
    pub fn new(generator: Arc<dyn Generator>, params: GenerationParams) -> Self {
        Self {
            generator,
            sanitizer: Sanitizer::for_topics(),
            params,
            min_chars: DEFAULT_MIN_CHARS,
        }
    }

    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    /// Ordered, deduplicated topic labels for a transcript.
    ///
    /// Generator failures propagate; degenerate output is `Ok(vec![])`.
    pub async fn extract_topics(&self, messages: &[ConversationMessage]) -> Result<Vec<String>> {
        if messages.iter().all(|m| m.content.trim().is_empty()) {
            return Ok(Vec::new());
        }

        let prompt = build_topic_prompt(messages);
        debug!(messages = messages.len(), prompt_chars = prompt.len(), "extracting topics");

        let raw = self.generator.generate(&prompt, &self.params).await?;
        let cleaned = self.sanitizer.sanitize(&raw);

        if cleaned.chars().count() < self.min_chars {
            warn!(output = %cleaned, "topic output too short");
            return Ok(Vec::new());
        }
        if is_refusal(&cleaned) {
            warn!(output = %cleaned, "model refused topic extraction");
            return Ok(Vec::new());
        }

        Ok(split_topics(&cleaned))
    }
}

pub fn is_refusal(text: &str) -> bool {
    let lower = text.to_lowercase();
    REFUSAL_PHRASES.iter().any(|p| lower.contains(p))
}

/// Split a comma-separated list into unique labels, first mention first.
///
/// Candidates are trimmed of whitespace and trailing periods; empty and
/// single-character candidates are dropped, as is the graph root id.
/// Comparison is case-sensitive.
pub fn split_topics(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(',')
        .map(|c| c.trim().trim_end_matches('.').trim())
        .filter(|c| c.chars().count() > 1 && *c != ROOT_NODE_ID)
        .filter(|c| seen.insert(c.to_string()))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub label: String,
}

/// Star graph: the conversation root linked to each topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl TopicGraph {
    /// `None` when there are no topics to draw.
    pub fn from_topics(topics: &[String]) -> Option<Self> {
        let topics: Vec<&String> = topics.iter().filter(|t| t.as_str() != ROOT_NODE_ID).collect();
        if topics.is_empty() {
            return None;
        }

        let mut nodes = vec![GraphNode {
            id: ROOT_NODE_ID.to_string(),
            label: ROOT_NODE_LABEL.to_string(),
        }];
        let mut edges = Vec::with_capacity(topics.len());
        for topic in topics {
            nodes.push(GraphNode {
                id: topic.clone(),
                label: topic.clone(),
            });
            edges.push(GraphEdge {
                source: ROOT_NODE_ID.to_string(),
                target: topic.clone(),
                label: EDGE_LABEL.to_string(),
            });
        }
        Some(Self { nodes, edges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_topics_dedup_and_trim() {
        let topics = split_topics("frete, pagamento , frete., a, , Pagamento");
        assert_eq!(topics, vec!["frete", "pagamento", "Pagamento"]);
    }

    #[test]
    fn test_root_id_is_not_a_topic() {
        let topics = split_topics("frete, Conversa Principal, pagamento");
        assert_eq!(topics, vec!["frete", "pagamento"]);
        let graph = TopicGraph::from_topics(&topics).unwrap();
        assert_eq!(graph.edges.len(), topics.len());
        assert_eq!(graph.nodes.len(), topics.len() + 1);
    }

    #[test]
    fn test_refusal_detection() {
        assert!(is_refusal("Não consigo identificar tópicos."));
        assert!(is_refusal("I CANNOT do that"));
        assert!(!is_refusal("frete, pagamento"));
    }

    #[test]
    fn test_graph_shape() {
        let graph = TopicGraph::from_topics(&["frete".to_string(), "pagamento".to_string()]).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.nodes[0].id, ROOT_NODE_ID);
        assert_eq!(graph.nodes[0].label, ROOT_NODE_LABEL);
        assert_eq!(graph.edges.len(), 2);
        assert!(graph.edges.iter().all(|e| e.source == ROOT_NODE_ID && e.label == EDGE_LABEL));
        assert_eq!(graph.edges[1].target, "pagamento");
    }

    #[test]
    fn test_graph_empty() {
        assert!(TopicGraph::from_topics(&[]).is_none());
    }
}
