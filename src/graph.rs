//! Directed call graph keyed by contract address.
//!
//! Nodes carry optional opaque data and metadata; edges aggregate repeated
//! calls between the same pair into a count, with the last-seen call kind as
//! the edge's data tag. The graph always contains its designated root node,
//! created before any edge is added, and never prunes anything itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use alloy::primitives::Address;

use crate::error::{Result, SupplyError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInfo {
    pub data: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeInfo {
    pub data: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallGraph {
    root: Address,
    nodes: BTreeMap<Address, NodeInfo>,
    edges: BTreeMap<(Address, Address), EdgeInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    id: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

fn default_count() -> u64 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
struct EdgeRecord {
    source: Address,
    target: Address,
    #[serde(default)]
    data: Option<String>,
    #[serde(default = "default_count")]
    count: u64,
}

/// Node-link serialization of a [`CallGraph`]. Importing an exported value
/// reconstructs an isomorphic graph.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeLinkData {
    directed: bool,
    root: Address,
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
}

impl CallGraph {
    pub fn new(root: Address) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(root, NodeInfo::default());
        Self {
            root,
            nodes,
            edges: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> Address {
        self.root
    }

    /// Upsert a node: data and metadata overwrite any existing values.
    pub fn add_node(&mut self, address: Address, data: Option<String>, metadata: Option<Value>) {
        self.nodes.insert(address, NodeInfo { data, metadata });
    }

    /// Record one call from `from` to `to`. Endpoint nodes are created
    /// implicitly; repeated calls accumulate the count and the data tag is
    /// overwritten with the latest value.
    pub fn add_edge(&mut self, from: Address, to: Address, data: Option<String>) {
        self.nodes.entry(from).or_default();
        self.nodes.entry(to).or_default();
        let edge = self.edges.entry((from, to)).or_insert(EdgeInfo {
            data: None,
            count: 0,
        });
        edge.count += 1;
        edge.data = data;
    }

    pub fn node(&self, address: Address) -> Option<&NodeInfo> {
        self.nodes.get(&address)
    }

    pub fn edge(&self, from: Address, to: Address) -> Option<&EdgeInfo> {
        self.edges.get(&(from, to))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Sum of aggregated call counts over all edges.
    pub fn total_calls(&self) -> u64 {
        self.edges.values().map(|e| e.count).sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (Address, &NodeInfo)> {
        self.nodes.iter().map(|(a, info)| (*a, info))
    }

    pub fn edges(&self) -> impl Iterator<Item = (Address, Address, &EdgeInfo)> {
        self.edges.iter().map(|((f, t), info)| (*f, *t, info))
    }

    pub fn successors(&self, address: Address) -> Vec<Address> {
        self.edges
            .keys()
            .filter(|(from, _)| *from == address)
            .map(|(_, to)| *to)
            .collect()
    }

    pub fn predecessors(&self, address: Address) -> Vec<Address> {
        self.edges
            .keys()
            .filter(|(_, to)| *to == address)
            .map(|(from, _)| *from)
            .collect()
    }

    fn node_label(&self, address: Address, info: &NodeInfo) -> String {
        let checksummed = address.to_checksum(None);
        match info
            .metadata
            .as_ref()
            .and_then(|m| m.get("label"))
            .and_then(|l| l.as_str())
        {
            Some(label) if label != checksummed => format!("{checksummed} ({label})"),
            _ => checksummed,
        }
    }

    /// Render the graph as a DOT digraph for generic visualization tooling.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph supply_chain {\n");
        for (address, info) in &self.nodes {
            let shape = if *address == self.root { "box" } else { "ellipse" };
            out.push_str(&format!(
                "    \"{:#x}\" [label=\"{}\", shape={}];\n",
                address,
                self.node_label(*address, info),
                shape
            ));
        }
        for ((from, to), edge) in &self.edges {
            let tag = edge.data.as_deref().unwrap_or("CALL");
            out.push_str(&format!(
                "    \"{from:#x}\" -> \"{to:#x}\" [label=\"{tag} x{}\"];\n",
                edge.count
            ));
        }
        out.push_str("}\n");
        out
    }

    pub fn export_dot(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_dot()).map_err(|err| {
            SupplyError::Internal(format!(
                "failed to write dot file {}: {err}",
                path.as_ref().display()
            ))
        })
    }

    pub fn to_json(&self) -> NodeLinkData {
        NodeLinkData {
            directed: true,
            root: self.root,
            nodes: self
                .nodes
                .iter()
                .map(|(address, info)| NodeRecord {
                    id: *address,
                    data: info.data.clone(),
                    metadata: info.metadata.clone(),
                })
                .collect(),
            edges: self
                .edges
                .iter()
                .map(|((from, to), edge)| EdgeRecord {
                    source: *from,
                    target: *to,
                    data: edge.data.clone(),
                    count: edge.count,
                })
                .collect(),
        }
    }

    pub fn export_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.to_json())
            .map_err(|err| SupplyError::Internal(format!("node-link serialization failed: {err}")))?;
        std::fs::write(path.as_ref(), raw).map_err(|err| {
            SupplyError::Internal(format!(
                "failed to write json file {}: {err}",
                path.as_ref().display()
            ))
        })
    }

    /// Rebuild a graph from its node-link form. Counts and data payloads are
    /// restored exactly; the designated root is recreated even if the node
    /// list omitted it.
    pub fn from_json(data: NodeLinkData) -> Self {
        let mut graph = CallGraph::new(data.root);
        for node in data.nodes {
            graph.add_node(node.id, node.data, node.metadata);
        }
        for edge in data.edges {
            graph.nodes.entry(edge.source).or_default();
            graph.nodes.entry(edge.target).or_default();
            graph.edges.insert(
                (edge.source, edge.target),
                EdgeInfo {
                    data: edge.data,
                    count: edge.count,
                },
            );
        }
        graph
    }

    pub fn import_json(raw: &str) -> Result<Self> {
        let data: NodeLinkData = serde_json::from_str(raw)
            .map_err(|err| SupplyError::Internal(format!("node-link parse failed: {err}")))?;
        Ok(Self::from_json(data))
    }
}
