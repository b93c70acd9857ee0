// src/orchestrator/artifact.rs
// Artifact types and the knowledge-graph / bibliography merge rules (C6).
//
// A media-type-tagged content model, paired with the MCP `ContentPart`
// tagged sum in `src/mcp/protocol.rs`. `indexmap::IndexMap` gives the
// order-preserving, hash-keyed set semantics the merge invariants call for
// (node-id / edge-triple / pmid uniqueness with first-wins metadata)
// without hand-rolling a Vec+HashMap pair for each entity.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A finished, client-facing artifact. `position` is assigned by the
/// accumulator in insertion order and is contiguous from 0 in the final
/// response (§8 invariant 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub content: String,
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "sourceArtifactId")]
    pub source_artifact_id: Option<Uuid>,
}

/// Canonical media types the core understands. Anything else passes
/// through as an opaque `text/plain`-ish blob (§4.6.1 and §9 "Artifact
/// types").
pub mod media_type {
    pub const KNOWLEDGE_GRAPH: &str = "application/vnd.knowledge-graph";
    pub const BIBLIOGRAPHY: &str = "application/vnd.bibliography";
    pub const CODE: &str = "application/vnd.code";
    pub const MARKDOWN: &str = "text/markdown";
    pub const IMAGE_PREFIX: &str = "image/";
}

/// Normalizes legacy media-type aliases observed in the source to the one
/// canonical spelling (§9 "two separate conventions... normalize to one").
pub fn normalize_media_type(raw: &str) -> String {
    match raw {
        "application/vnd.ant.knowledge-graph"
        | "application/knowledge-graph"
        | "application/json+knowledge-graph"
        | "text/knowledge-graph" => media_type::KNOWLEDGE_GRAPH.to_string(),
        "code" => media_type::CODE.to_string(),
        other if other.starts_with("application/vnd.code.") => other.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub label: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// A mergeable knowledge graph. Nodes are keyed by `id`, edges by the
/// triple `(source, target, label)`. Merge is idempotent: merging a graph
/// with itself reproduces the same node and edge sets, with `evidence`
/// unioned order-preservingly rather than concatenated (§8 invariant 5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub nodes: IndexMap<String, Node>,
    pub edges: IndexMap<EdgeKey, Edge>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut graph = Self::new();
        if let Some(nodes) = value.get("nodes").and_then(|v| v.as_array()) {
            for node in nodes {
                if let Some(node) = parse_node(node) {
                    graph.nodes.entry(node.id.clone()).or_insert(node);
                }
            }
        }
        if let Some(edges) = value.get("edges").and_then(|v| v.as_array()) {
            for edge in edges {
                if let Some(edge) = parse_edge(edge) {
                    graph.merge_edge(edge);
                }
            }
        }
        graph
    }

    /// True when a JSON payload has the node/edge array shape this type
    /// expects, regardless of the media type a tool declared (structural
    /// sniffing per the Open Question resolution in DESIGN.md).
    pub fn looks_like_graph(value: &serde_json::Value) -> bool {
        value.get("nodes").and_then(|v| v.as_array()).is_some()
            && value.get("edges").and_then(|v| v.as_array()).is_some()
    }

    fn merge_edge(&mut self, edge: Edge) {
        let key = EdgeKey { source: edge.source.clone(), target: edge.target.clone(), label: edge.label.clone() };
        match self.edges.get_mut(&key) {
            Some(existing) => {
                for item in edge.evidence {
                    if !existing.evidence.contains(&item) {
                        existing.evidence.push(item);
                    }
                }
            }
            None => {
                self.edges.insert(key, edge);
            }
        }
    }

    /// Merges `other` into `self`. Node metadata is first-wins: a node
    /// already present keeps its original attributes. Edge `evidence`
    /// lists are order-preserving unions.
    pub fn merge(&mut self, other: KnowledgeGraph) {
        for (id, node) in other.nodes {
            self.nodes.entry(id).or_insert(node);
        }
        for (_, edge) in other.edges {
            self.merge_edge(edge);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn to_artifact_content(&self) -> String {
        let nodes: Vec<&Node> = self.nodes.values().collect();
        let edges: Vec<&Edge> = self.edges.values().collect();
        serde_json::json!({ "nodes": nodes, "edges": edges }).to_string()
    }
}

fn parse_node(value: &serde_json::Value) -> Option<Node> {
    let id = value.get("id")?.as_str()?.to_string();
    let mut attributes = value.as_object().cloned().unwrap_or_default();
    attributes.remove("id");
    Some(Node { id, attributes })
}

fn parse_edge(value: &serde_json::Value) -> Option<Edge> {
    let source = value.get("source")?.as_str()?.to_string();
    let target = value.get("target")?.as_str()?.to_string();
    let label = value.get("label").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let evidence = value
        .get("evidence")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|i| i.as_str().map(String::from)).collect())
        .unwrap_or_default();
    Some(Edge { source, target, label, evidence })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BibliographyEntry {
    pub pmid: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// A mergeable bibliography. Entries are keyed and deduplicated by `pmid`;
/// on a collision the first-seen entry's metadata wins (§8 invariant 6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bibliography {
    pub entries: IndexMap<String, BibliographyEntry>,
}

impl Bibliography {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut bib = Self::new();
        let items = value
            .get("entries")
            .and_then(|v| v.as_array())
            .or_else(|| value.as_array())
            .cloned()
            .unwrap_or_default();
        for item in items {
            if let Some(entry) = parse_bib_entry(&item) {
                bib.entries.entry(entry.pmid.clone()).or_insert(entry);
            }
        }
        bib
    }

    pub fn looks_like_bibliography(value: &serde_json::Value) -> bool {
        let candidates = value
            .get("entries")
            .and_then(|v| v.as_array())
            .cloned()
            .or_else(|| value.as_array().cloned());
        matches!(candidates, Some(items) if !items.is_empty() && items.iter().all(|i| i.get("pmid").is_some()))
    }

    pub fn merge(&mut self, other: Bibliography) {
        for (pmid, entry) in other.entries {
            self.entries.entry(pmid).or_insert(entry);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_artifact_content(&self) -> String {
        let entries: Vec<&BibliographyEntry> = self.entries.values().collect();
        serde_json::json!({ "entries": entries }).to_string()
    }
}

fn parse_bib_entry(value: &serde_json::Value) -> Option<BibliographyEntry> {
    let pmid = value.get("pmid")?.as_str()?.to_string();
    let mut fields = value.as_object().cloned().unwrap_or_default();
    fields.remove("pmid");
    Some(BibliographyEntry { pmid, fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_legacy_knowledge_graph_alias() {
        assert_eq!(normalize_media_type("application/vnd.ant.knowledge-graph"), media_type::KNOWLEDGE_GRAPH);
        assert_eq!(normalize_media_type("application/vnd.knowledge-graph"), media_type::KNOWLEDGE_GRAPH);
    }

    #[test]
    fn test_kg_merge_is_idempotent() {
        let payload = json!({
            "nodes": [{"id": "X"}, {"id": "Y"}],
            "edges": [{"source": "X", "target": "Y", "label": "related", "evidence": ["PMID:1"]}]
        });
        let mut a = KnowledgeGraph::from_json(&payload);
        let b = KnowledgeGraph::from_json(&payload);
        a.merge(b);
        assert_eq!(a.nodes.len(), 2);
        assert_eq!(a.edges.len(), 1);
        let edge = a.edges.values().next().unwrap();
        assert_eq!(edge.evidence, vec!["PMID:1".to_string()]);
    }

    #[test]
    fn test_kg_merge_unions_evidence_and_nodes() {
        let a = KnowledgeGraph::from_json(&json!({
            "nodes": [{"id": "X"}, {"id": "Y"}],
            "edges": [{"source": "X", "target": "Y", "label": "related"}]
        }));
        let b = KnowledgeGraph::from_json(&json!({
            "nodes": [{"id": "Y"}, {"id": "Z"}],
            "edges": [
                {"source": "X", "target": "Y", "label": "related", "evidence": ["PMID:1"]},
                {"source": "Y", "target": "Z", "label": "binds"}
            ]
        }));
        let mut merged = a;
        merged.merge(b);
        assert_eq!(merged.nodes.len(), 3);
        assert_eq!(merged.edges.len(), 2);
        let related = merged
            .edges
            .get(&EdgeKey { source: "X".into(), target: "Y".into(), label: "related".into() })
            .unwrap();
        assert_eq!(related.evidence, vec!["PMID:1".to_string()]);
    }

    #[test]
    fn test_bibliography_merge_is_pmid_unique_first_wins() {
        let mut a = Bibliography::from_json(&json!({"entries": [{"pmid": "1", "title": "first"}]}));
        let b = Bibliography::from_json(&json!({"entries": [{"pmid": "1", "title": "second"}, {"pmid": "2", "title": "third"}]}));
        a.merge(b);
        assert_eq!(a.entries.len(), 2);
        assert_eq!(a.entries["1"].fields["title"], "first");
    }

    #[test]
    fn test_structural_sniff_detects_graph_without_declared_type() {
        let payload = json!({"nodes": [{"id": "a"}], "edges": []});
        assert!(KnowledgeGraph::looks_like_graph(&payload));
        assert!(!Bibliography::looks_like_bibliography(&payload));
    }
}
