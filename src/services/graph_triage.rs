//! Entrypoint triage over a target graph.
//!
//! Ranks function nodes by how much value they touch and how privileged they
//! are, so broad analysis can start from the most promising entrypoints.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::models::TargetGraph;

/// Canonical labels used by triage; resolved through the graph's label map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageOptions {
    pub limit: usize,
    pub permissionless_only: bool,
    pub func_type: String,
    pub asset_type: String,
    pub value_edges: Vec<String>,
    pub call_edges: Vec<String>,
    pub reads_edge: String,
    pub writes_edge: String,
    pub role_edge: String,
    /// Ignore the graph's label map and use the labels as given.
    pub ignore_label_map: bool,
}

impl Default for TriageOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            permissionless_only: false,
            func_type: "FUNC".to_string(),
            asset_type: "ASSET".to_string(),
            value_edges: ["TRANSFERS", "MINTS", "BURNS", "COLLECTS_FEE"]
                .map(String::from)
                .to_vec(),
            call_edges: ["EXT_CALLS", "DELEGATECALLS", "STATICCALLS"]
                .map(String::from)
                .to_vec(),
            reads_edge: "READS".to_string(),
            writes_edge: "WRITES".to_string(),
            role_edge: "REQUIRES_ROLE".to_string(),
            ignore_label_map: false,
        }
    }
}

/// Signals collected for one function node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrypointScore {
    pub func: String,
    pub value_edges: usize,
    pub assets: BTreeSet<String>,
    pub call_edges: usize,
    pub writes: usize,
    pub reads: usize,
    pub roles: BTreeSet<String>,
}

impl EntrypointScore {
    pub fn is_permissionless(&self) -> bool {
        self.roles.is_empty()
    }

    /// One-line rendering: `func | value_edges=.. assets=.. calls=.. ...`.
    pub fn summary_line(&self) -> String {
        fn list(set: &BTreeSet<String>) -> String {
            if set.is_empty() {
                "none".to_string()
            } else {
                set.iter().cloned().collect::<Vec<_>>().join(",")
            }
        }
        format!(
            "{} | value_edges={} assets={} calls={} writes={} reads={} roles={}",
            self.func,
            self.value_edges,
            list(&self.assets),
            self.call_edges,
            self.writes,
            self.reads,
            list(&self.roles)
        )
    }

    fn sort_key(&self) -> (usize, usize, usize, usize, usize, &str) {
        (
            self.value_edges,
            self.assets.len(),
            self.call_edges,
            self.writes,
            self.reads,
            self.func.as_str(),
        )
    }
}

/// Rank function nodes, highest first.
pub fn triage(graph: &TargetGraph, options: &TriageOptions) -> Vec<EntrypointScore> {
    let resolve = |label: &str| -> String {
        if options.ignore_label_map {
            label.to_string()
        } else {
            graph.schema.resolve(label).to_string()
        }
    };

    let func_type = resolve(&options.func_type);
    let asset_type = resolve(&options.asset_type);
    let value_edges: BTreeSet<String> = options.value_edges.iter().map(|l| resolve(l)).collect();
    let call_edges: BTreeSet<String> = options.call_edges.iter().map(|l| resolve(l)).collect();
    let reads_edge = resolve(&options.reads_edge);
    let writes_edge = resolve(&options.writes_edge);
    let role_edge = resolve(&options.role_edge);

    let mut by_func: BTreeMap<&str, EntrypointScore> = graph
        .nodes
        .iter()
        .filter(|(_, node_type)| **node_type == func_type)
        .map(|(node, _)| {
            (
                node.as_str(),
                EntrypointScore {
                    func: node.clone(),
                    ..Default::default()
                },
            )
        })
        .collect();

    for edge in &graph.edges {
        let Some(stats) = by_func.get_mut(edge.src.as_str()) else {
            continue;
        };
        if value_edges.contains(&edge.edge_type) {
            stats.value_edges += 1;
            if graph.node_type(&edge.dst) == Some(asset_type.as_str()) {
                stats.assets.insert(edge.dst.clone());
            }
        } else if call_edges.contains(&edge.edge_type) {
            stats.call_edges += 1;
        } else if edge.edge_type == reads_edge {
            stats.reads += 1;
        } else if edge.edge_type == writes_edge {
            stats.writes += 1;
        } else if edge.edge_type == role_edge {
            stats.roles.insert(edge.dst.clone());
        }
    }

    let mut ranked: Vec<EntrypointScore> = by_func
        .into_values()
        .filter(|s| !options.permissionless_only || s.is_permissionless())
        .collect();
    ranked.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    ranked.truncate(options.limit);
    ranked
}
