//! Target graph: the immutable snapshot every worker analyzes.
//!
//! A target graph is a layered codegraph stored as three markdown files:
//!
//! - `00_schema.md` - `## Node Types`, `## Edge Types` and an optional
//!   `## Label Map` section, each a bullet list
//! - `01_nodes.md` - one `- type:name` bullet per node
//! - `02_edges.md` - one `- EDGE_TYPE | SRC -> DST | attrs...` bullet per edge
//!
//! The graph is loaded once, validated during the mapping phase, then shared
//! read-only (behind an `Arc`) with every worker.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use uuid::Uuid;

use crate::domain::errors::GraphError;

pub const SCHEMA_FILE: &str = "00_schema.md";
pub const NODES_FILE: &str = "01_nodes.md";
pub const EDGES_FILE: &str = "02_edges.md";

/// Reference to a pinned target snapshot, safe to hand to any worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub id: Uuid,
    pub label: String,
    /// Where the snapshot lives (codegraph directory, URI, ...).
    pub location: String,
    /// Pin of the point-in-time view (commit, block number, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
}

impl TargetRef {
    pub fn new(label: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            location: location.into(),
            pin: None,
        }
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }
}

/// Declared node and edge types, plus an optional canonical-to-actual label map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSchema {
    pub node_types: BTreeSet<String>,
    pub edge_types: BTreeSet<String>,
    #[serde(default)]
    pub label_map: BTreeMap<String, String>,
}

impl GraphSchema {
    /// Resolve a canonical label to the label this graph actually uses.
    pub fn resolve<'a>(&'a self, canonical: &'a str) -> &'a str {
        self.label_map
            .get(canonical)
            .map(String::as_str)
            .unwrap_or(canonical)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub edge_type: String,
    pub src: String,
    pub dst: String,
    pub line_no: usize,
}

/// The loaded snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetGraph {
    pub reference: TargetRef,
    pub schema: GraphSchema,
    /// Node token (`type:name`) to node type.
    pub nodes: BTreeMap<String, String>,
    pub edges: Vec<GraphEdge>,
}

impl TargetGraph {
    /// An empty graph for targets that are not described by a codegraph.
    pub fn empty(reference: TargetRef) -> Self {
        Self {
            reference,
            schema: GraphSchema::default(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    /// Load a codegraph directory.
    pub fn load(dir: impl AsRef<Path>, reference: TargetRef) -> Result<Self, GraphError> {
        let dir = dir.as_ref();
        let schema = read_file(&dir.join(SCHEMA_FILE))?;
        let nodes = read_file(&dir.join(NODES_FILE))?;
        let edges = read_file(&dir.join(EDGES_FILE))?;
        Ok(Self::from_sources(reference, &schema, &nodes, &edges))
    }

    /// Build a graph from the three document bodies.
    pub fn from_sources(reference: TargetRef, schema: &str, nodes: &str, edges: &str) -> Self {
        Self {
            reference,
            schema: parse_schema(schema),
            nodes: parse_nodes(nodes),
            edges: parse_edges(edges),
        }
    }

    pub fn node_type(&self, node: &str) -> Option<&str> {
        self.nodes.get(node).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Check the graph against its own schema.
    ///
    /// Returns every problem found; an empty list means the graph is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (node, node_type) in &self.nodes {
            if !self.schema.node_types.contains(node_type) {
                errors.push(format!("node type not in schema: {node_type} ({node})"));
            }
        }

        for edge in &self.edges {
            if !self.schema.edge_types.contains(&edge.edge_type) {
                errors.push(format!(
                    "{EDGES_FILE}:{}: edge type not in schema: {}",
                    edge.line_no, edge.edge_type
                ));
            }
            if !self.nodes.contains_key(&edge.src) {
                errors.push(format!("{EDGES_FILE}:{}: missing src node: {}", edge.line_no, edge.src));
            }
            if !self.nodes.contains_key(&edge.dst) {
                errors.push(format!("{EDGES_FILE}:{}: missing dst node: {}", edge.line_no, edge.dst));
            }
        }

        errors
    }
}

fn read_file(path: &Path) -> Result<String, GraphError> {
    std::fs::read_to_string(path).map_err(|e| GraphError::Unavailable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Strip a leading `- ` bullet, returning the trimmed token.
fn bullet(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('-')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SchemaSection {
    Nodes,
    Edges,
    LabelMap,
    Other,
}

fn parse_schema(body: &str) -> GraphSchema {
    let mut schema = GraphSchema::default();
    let mut section = SchemaSection::Other;

    for line in body.lines() {
        let stripped = line.trim();
        if let Some(header) = stripped.strip_prefix("## ") {
            section = match header.trim().to_lowercase().as_str() {
                "node types" => SchemaSection::Nodes,
                "edge types" => SchemaSection::Edges,
                h if h.starts_with("label map") || h.starts_with("label-map") => {
                    SchemaSection::LabelMap
                }
                _ => SchemaSection::Other,
            };
            continue;
        }

        let Some(token) = bullet(line) else {
            continue;
        };

        match section {
            SchemaSection::Nodes => {
                schema.node_types.insert(token.to_string());
            }
            SchemaSection::Edges => {
                schema.edge_types.insert(token.to_string());
            }
            SchemaSection::LabelMap => {
                for sep in ["->", "=", ":"] {
                    if let Some((src, dst)) = token.split_once(sep) {
                        let (src, dst) = (src.trim(), dst.trim());
                        if !src.is_empty() && !dst.is_empty() {
                            schema.label_map.insert(src.to_string(), dst.to_string());
                        }
                        break;
                    }
                }
            }
            SchemaSection::Other => {}
        }
    }

    schema
}

fn parse_nodes(body: &str) -> BTreeMap<String, String> {
    body.lines()
        .filter_map(bullet)
        .filter(|token| !token.starts_with("http://") && !token.starts_with("https://"))
        .filter_map(|token| {
            let (node_type, _) = token.split_once(':')?;
            Some((token.to_string(), node_type.to_string()))
        })
        .collect()
}

fn parse_edges(body: &str) -> Vec<GraphEdge> {
    let mut edges = Vec::new();
    for (idx, line) in body.lines().enumerate() {
        let Some(token) = bullet(line) else {
            continue;
        };
        let parts: Vec<&str> = token.split('|').map(str::trim).collect();
        if parts.len() < 2 {
            continue;
        }
        let Some((src, dst)) = parts[1].split_once("->") else {
            continue;
        };
        let (src, dst) = (src.trim(), dst.trim());
        if src.is_empty() || dst.is_empty() {
            continue;
        }
        edges.push(GraphEdge {
            edge_type: parts[0].to_string(),
            src: src.to_string(),
            dst: dst.to_string(),
            line_no: idx + 1,
        });
    }
    edges
}
