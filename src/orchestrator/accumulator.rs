// src/orchestrator/accumulator.rs
// Artifact Accumulator (C6): owned by exactly one chat request, no locking
// needed (§5 "Shared-resource policy"). Ingests `ContentPart`s as tool
// calls complete, classifies and merges them, and produces the final
// ordered, deduplicated artifact list at response time (§4.6).

use uuid::Uuid;

use crate::mcp::protocol::ContentPart;

use super::artifact::{normalize_media_type, media_type, Artifact, Bibliography, KnowledgeGraph};

struct PendingArtifact {
    sequence: usize,
    id: Uuid,
    kind: String,
    title: String,
    content: String,
    language: Option<String>,
    source_artifact_id: Option<Uuid>,
}

pub struct ArtifactAccumulator {
    others: Vec<PendingArtifact>,
    knowledge_graph: KnowledgeGraph,
    kg_sequence: Option<usize>,
    bibliography: Bibliography,
    next_sequence: usize,
    /// Selects the emission policy for this request (§4.6, SPEC_FULL.md
    /// "graph mode" decision): in graph mode a pinned knowledge graph is a
    /// mandatory merge seed and the bibliography is placed right after the
    /// knowledge-graph artifact instead of last.
    graph_mode: bool,
    /// Last image artifact id ingested in the current tool result batch,
    /// used to pair a following source-code part via `sourceArtifactId`
    /// (§4.6.1 item 2).
    last_image_id: Option<Uuid>,
}

impl ArtifactAccumulator {
    /// `pinned` artifacts seed the merge. In graph mode, a pinned knowledge
    /// graph is the mandatory starting point the first in-response graph
    /// merges into (§4.6 "Knowledge-graph merge"); outside graph mode,
    /// pinned artifacts are not replayed into the response — the client
    /// already has them. Other pinned artifact kinds are never replayed
    /// regardless of mode.
    pub fn new(pinned: &[Artifact], graph_mode: bool) -> Self {
        let mut knowledge_graph = KnowledgeGraph::new();
        if graph_mode {
            for artifact in pinned {
                if normalize_media_type(&artifact.kind) == media_type::KNOWLEDGE_GRAPH {
                    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&artifact.content) {
                        knowledge_graph.merge(KnowledgeGraph::from_json(&value));
                    }
                }
            }
        }
        Self {
            others: Vec::new(),
            knowledge_graph,
            kg_sequence: None,
            bibliography: Bibliography::new(),
            next_sequence: 0,
            graph_mode,
            last_image_id: None,
        }
    }

    fn take_sequence(&mut self) -> usize {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    /// Ingests the content parts of one tool call's result. Returns the
    /// text parts, which the caller folds back into the LLM-visible tool
    /// result / conversation narration — text parts never become artifacts
    /// on their own (§4.6.1 item 1).
    pub fn ingest(&mut self, tool_name: &str, content: &[ContentPart]) -> Vec<String> {
        let mut texts = Vec::new();
        self.last_image_id = None;

        for part in content {
            match part {
                ContentPart::Text { text } => {
                    if let Some(value) = sniff_structured_json(text) {
                        self.ingest_structured(tool_name, None, &value);
                    } else {
                        texts.push(text.clone());
                    }
                }
                ContentPart::Image { data, mime_type } => {
                    let id = Uuid::new_v4();
                    let sequence = self.take_sequence();
                    self.others.push(PendingArtifact {
                        sequence,
                        id,
                        kind: mime_type.clone(),
                        title: format!("{tool_name} image"),
                        content: data.clone(),
                        language: None,
                        source_artifact_id: None,
                    });
                    self.last_image_id = Some(id);
                }
                ContentPart::Resource { resource } => {
                    let declared = resource.mime_type.clone();
                    if let Some(text) = &resource.text {
                        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
                            self.ingest_structured(tool_name, declared.as_deref(), &value);
                            continue;
                        }
                    }
                    self.ingest_opaque_resource(tool_name, resource);
                }
                ContentPart::Binary => {
                    texts.push(format!("[{tool_name} returned a binary part the host does not decode]"));
                }
            }
        }

        texts
    }

    fn ingest_opaque_resource(&mut self, _tool_name: &str, resource: &crate::mcp::protocol::ResourceContents) {
        let kind = resource
            .mime_type
            .as_deref()
            .map(normalize_media_type)
            .unwrap_or_else(|| "text/plain".to_string());
        let content = resource.text.clone().or_else(|| resource.blob.clone()).unwrap_or_default();
        let language = kind.strip_prefix("application/vnd.code.").map(String::from).or_else(|| {
            resource.uri.rsplit_once('.').map(|(_, ext)| ext.to_string())
        });

        let is_image = kind.starts_with(media_type::IMAGE_PREFIX);
        let source_artifact_id = if !is_image { self.last_image_id.take() } else { None };

        let sequence = self.take_sequence();
        self.others.push(PendingArtifact {
            sequence,
            id: Uuid::new_v4(),
            kind,
            title: resource.uri.clone(),
            content,
            language,
            source_artifact_id,
        });
    }

    fn ingest_structured(&mut self, tool_name: &str, declared_type: Option<&str>, value: &serde_json::Value) {
        let declared = declared_type
            .map(normalize_media_type)
            .or_else(|| value.get("type").and_then(|v| v.as_str()).map(normalize_media_type));

        let is_kg = declared.as_deref() == Some(media_type::KNOWLEDGE_GRAPH) || KnowledgeGraph::looks_like_graph(value);
        let is_bib = declared.as_deref() == Some(media_type::BIBLIOGRAPHY) || Bibliography::looks_like_bibliography(value);

        if is_kg {
            if self.kg_sequence.is_none() {
                self.kg_sequence = Some(self.take_sequence());
            }
            self.knowledge_graph.merge(KnowledgeGraph::from_json(value));
            return;
        }

        if is_bib {
            self.bibliography.merge(Bibliography::from_json(value));
            return;
        }

        let kind = declared.unwrap_or_else(|| "text/plain".to_string());
        let content = value
            .get("content")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| value.to_string());
        let title = value.get("title").and_then(|v| v.as_str()).map(String::from).unwrap_or_else(|| tool_name.to_string());
        let language = value.get("language").and_then(|v| v.as_str()).map(String::from);

        let sequence = self.take_sequence();
        self.others.push(PendingArtifact {
            sequence,
            id: Uuid::new_v4(),
            kind,
            title,
            content,
            language,
            source_artifact_id: None,
        });
    }

    /// Ingests artifacts the LLM declared directly in its `response_formatter`
    /// call (§4.6.1 item 3, "LLM explicitly declares type") — the one path
    /// by which a structured artifact part reaches the accumulator without
    /// having come through an MCP tool result.
    pub fn ingest_declared(&mut self, artifacts: Vec<super::formatter::DeclaredArtifact>) {
        for declared in artifacts {
            let value = serde_json::json!({
                "type": declared.kind,
                "title": declared.title,
                "content": declared.content,
                "language": declared.language,
            });
            self.ingest_structured("response_formatter", Some(&declared.kind), &value);
        }
    }

    /// Produces the final, ordered, position-contiguous artifact list and
    /// synthesizes inline reference markers for any artifact the
    /// conversation text doesn't already reference (§4.6 "Button
    /// materialization"). Returns `(artifacts, conversation_with_markers)`.
    pub fn finalize(self, conversation: String) -> (Vec<Artifact>, String) {
        let mut entries: Vec<(usize, Artifact)> = self
            .others
            .into_iter()
            .map(|p| {
                (
                    p.sequence,
                    Artifact {
                        id: p.id,
                        kind: p.kind,
                        title: p.title,
                        content: p.content,
                        position: 0,
                        language: p.language,
                        source_artifact_id: p.source_artifact_id,
                    },
                )
            })
            .collect();

        if !self.knowledge_graph.is_empty() {
            let sequence = self.kg_sequence.unwrap_or(usize::MAX);
            entries.push((
                sequence,
                Artifact {
                    id: Uuid::new_v4(),
                    kind: media_type::KNOWLEDGE_GRAPH.to_string(),
                    title: "Knowledge graph".to_string(),
                    content: self.knowledge_graph.to_artifact_content(),
                    position: 0,
                    language: None,
                    source_artifact_id: None,
                },
            ));
        }

        entries.sort_by_key(|(sequence, _)| *sequence);

        let mut artifacts: Vec<Artifact> = entries
            .into_iter()
            .enumerate()
            .map(|(position, (_, mut artifact))| {
                artifact.position = position;
                artifact
            })
            .collect();

        // Outside graph mode the bibliography is appended last, after every
        // other artifact, regardless of when its source tool calls ran
        // (§4.6 "Bibliography merge"). In graph mode it shifts to sit
        // immediately after the knowledge-graph artifact instead, so the
        // graph and its supporting citations stay adjacent (SPEC_FULL.md
        // "graph mode" decision).
        if !self.bibliography.is_empty() {
            let bibliography = Artifact {
                id: Uuid::new_v4(),
                kind: media_type::BIBLIOGRAPHY.to_string(),
                title: "Bibliography".to_string(),
                content: self.bibliography.to_artifact_content(),
                position: 0,
                language: None,
                source_artifact_id: None,
            };

            let insert_at = if self.graph_mode {
                artifacts
                    .iter()
                    .position(|a| a.kind == media_type::KNOWLEDGE_GRAPH)
                    .map(|i| i + 1)
                    .unwrap_or(0)
            } else {
                artifacts.len()
            };
            artifacts.insert(insert_at, bibliography);

            for (position, artifact) in artifacts.iter_mut().enumerate() {
                artifact.position = position;
            }
        }

        let conversation = append_missing_reference_markers(conversation, &artifacts);
        (artifacts, conversation)
    }
}

fn sniff_structured_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    if KnowledgeGraph::looks_like_graph(&value) || Bibliography::looks_like_bibliography(&value) {
        Some(value)
    } else {
        None
    }
}

fn append_missing_reference_markers(mut conversation: String, artifacts: &[Artifact]) -> String {
    for artifact in artifacts {
        let marker_id = artifact.id.to_string();
        if !conversation.contains(&marker_id) {
            conversation.push_str(&format!("\n\n<artifact ref=\"{marker_id}\"/>"));
        }
    }
    conversation
}
