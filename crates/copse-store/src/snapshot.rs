//! petgraph snapshots of the records reachable from a root

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use petgraph::algo::is_isomorphic_matching;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;

use crate::error::Result;
use crate::record::NodeRef;
use crate::store::Store;

/// A record as captured in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotNode {
    pub id: NodeRef,
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl fmt::Display for SnapshotNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fields.get("name").and_then(Value::as_str) {
            Some(name) => write!(f, "{} {} ({name})", self.type_name, self.id),
            None => write!(f, "{} {}", self.type_name, self.id),
        }
    }
}

/// Immutable graph of the records reachable from one root. Edges carry the
/// relation name; collection members are labelled `relation[index]`.
pub struct Snapshot {
    graph: DiGraph<SnapshotNode, String>,
    root: NodeIndex,
    index: HashMap<NodeRef, NodeIndex>,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("root", &self.graph[self.root].id)
            .field("node_count", &self.graph.node_count())
            .field("edge_count", &self.graph.edge_count())
            .finish()
    }
}

/// Capture the subgraph reachable from `root`.
pub fn reachable(store: &Store, root: NodeRef) -> Result<Snapshot> {
    let records = store.reachable(root)?;

    let mut graph = DiGraph::new();
    let mut index = HashMap::new();
    for record in &records {
        let idx = graph.add_node(SnapshotNode {
            id: record.id,
            type_name: record.type_name.clone(),
            fields: record.fields.clone(),
        });
        index.insert(record.id, idx);
    }
    for record in &records {
        let from = index[&record.id];
        for (label, to) in record.edges() {
            if let Some(&to) = index.get(&to) {
                graph.add_edge(from, to, label);
            }
        }
    }

    Ok(Snapshot {
        root: index[&root],
        graph,
        index,
    })
}

impl Snapshot {
    pub fn root(&self) -> &SnapshotNode {
        &self.graph[self.root]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: NodeRef) -> bool {
        self.index.contains_key(&id)
    }

    pub fn node(&self, id: NodeRef) -> Option<&SnapshotNode> {
        self.index.get(&id).map(|&idx| &self.graph[idx])
    }

    /// Captured records in breadth-first order from the root.
    pub fn nodes(&self) -> impl Iterator<Item = &SnapshotNode> {
        self.graph.node_weights()
    }

    /// Records present in both snapshots.
    pub fn shared_with(&self, other: &Snapshot) -> Vec<NodeRef> {
        let mut shared: Vec<NodeRef> = self
            .index
            .keys()
            .filter(|id| other.contains(**id))
            .copied()
            .collect();
        shared.sort();
        shared
    }

    /// Whether both snapshots have the same shape: isomorphic graphs whose
    /// matched records agree on type and fields and whose matched edges carry
    /// the same labels.
    pub fn shape_matches(&self, other: &Snapshot) -> bool {
        is_isomorphic_matching(
            &self.graph,
            &other.graph,
            |a, b| a.type_name == b.type_name && a.fields == b.fields,
            |a, b| a == b,
        )
    }

    /// Graphviz rendering.
    pub fn to_dot(&self) -> String {
        Dot::with_config(&self.graph, &[]).to_string()
    }
}
