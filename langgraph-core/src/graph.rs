//! The graph compiler (`spec.md` §4.2): turns a node/edge/router
//! declaration into a [`CompiledGraph`] with a content-derived
//! `graph_version`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::cache::CachePolicy;
use crate::error::{Result, RuntimeError};
use crate::ids::NodeId;
use crate::node::Node;
use crate::store::Store;

/// What a router decides the next frontier should be.
#[derive(Debug, Clone)]
pub enum RouterDecision {
    /// Fall back to the node's static edges.
    UseGraphEdges,
    /// Schedule exactly this set of nodes.
    Nodes(Vec<NodeId>),
    /// No further nodes; this branch of the frontier ends.
    End,
}

/// A post-commit router attached to one node (`spec.md` §3: `from →
/// (store → next)`).
#[async_trait]
pub trait Router: Send + Sync {
    async fn route(&self, store: &Store) -> Result<RouterDecision>;
}

/// One compiled node: its handler plus scheduling metadata.
pub struct GraphNode {
    pub id: NodeId,
    pub handler: Arc<dyn Node>,
    pub deferred: bool,
    pub cache_policy: Option<CachePolicy>,
}

/// The compiled, immutable graph the scheduler drives.
pub struct CompiledGraph {
    nodes: HashMap<NodeId, GraphNode>,
    static_edges: HashMap<NodeId, Vec<NodeId>>,
    routers: HashMap<NodeId, Arc<dyn Router>>,
    start_set: Vec<NodeId>,
    graph_version: String,
}

impl CompiledGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn static_edges_from(&self, id: &str) -> &[NodeId] {
        self.static_edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn router_from(&self, id: &str) -> Option<&Arc<dyn Router>> {
        self.routers.get(id)
    }

    pub fn start_set(&self) -> &[NodeId] {
        &self.start_set
    }

    /// Every declared node id, in no particular order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn graph_version(&self) -> &str {
        &self.graph_version
    }
}

/// One declared edge `from -> to`.
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
}

/// Builds a [`CompiledGraph`], performing the compile-time checks
/// `spec.md` §4.2 requires.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<GraphNode>,
    edges: Vec<Edge>,
    routers: HashMap<NodeId, Arc<dyn Router>>,
    start_set: Vec<NodeId>,
}

impl GraphBuilder {
    pub fn node(mut self, id: impl Into<String>, handler: Arc<dyn Node>) -> Self {
        self.nodes.push(GraphNode {
            id: id.into(),
            handler,
            deferred: false,
            cache_policy: None,
        });
        self
    }

    pub fn deferred_node(mut self, id: impl Into<String>, handler: Arc<dyn Node>) -> Self {
        self.nodes.push(GraphNode {
            id: id.into(),
            handler,
            deferred: true,
            cache_policy: None,
        });
        self
    }

    pub fn cached_node(mut self, id: impl Into<String>, handler: Arc<dyn Node>, cache_policy: CachePolicy) -> Self {
        self.nodes.push(GraphNode {
            id: id.into(),
            handler,
            deferred: false,
            cache_policy: Some(cache_policy),
        });
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn router(mut self, from: impl Into<String>, router: Arc<dyn Router>) -> Self {
        self.routers.insert(from.into(), router);
        self
    }

    pub fn start_at(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.start_set = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<CompiledGraph> {
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.clone()) {
                return Err(RuntimeError::GraphValidation(format!("duplicate node id {}", node.id)));
            }
        }

        for edge in &self.edges {
            if !seen.contains(&edge.from) {
                return Err(RuntimeError::GraphValidation(format!("edge from unknown node {}", edge.from)));
            }
            if !seen.contains(&edge.to) {
                return Err(RuntimeError::GraphValidation(format!("edge to unknown node {}", edge.to)));
            }
        }

        for router_node in self.routers.keys() {
            if !seen.contains(router_node) {
                return Err(RuntimeError::GraphValidation(format!(
                    "router attached to unknown node {router_node}"
                )));
            }
        }

        if self.start_set.is_empty() {
            return Err(RuntimeError::GraphValidation("start set is empty".to_string()));
        }
        for start in &self.start_set {
            if !seen.contains(start) {
                return Err(RuntimeError::GraphValidation(format!("start node {start} is not declared")));
            }
        }

        let graph_version = Self::version_hash(&seen, &self.edges, &self.routers, &self.start_set);

        let mut static_edges: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for edge in self.edges {
            static_edges.entry(edge.from).or_default().push(edge.to);
        }

        let nodes = self.nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        Ok(CompiledGraph {
            nodes,
            static_edges,
            routers: self.routers,
            start_set: self.start_set,
            graph_version,
        })
    }

    fn version_hash(
        node_ids: &BTreeSet<NodeId>,
        edges: &[Edge],
        routers: &HashMap<NodeId, Arc<dyn Router>>,
        start_set: &[NodeId],
    ) -> String {
        let mut hasher = Sha256::new();
        for id in node_ids {
            hasher.update(id.as_bytes());
            hasher.update(b"\0");
        }
        let mut sorted_edges: Vec<(&str, &str)> = edges.iter().map(|e| (e.from.as_str(), e.to.as_str())).collect();
        sorted_edges.sort();
        for (from, to) in sorted_edges {
            hasher.update(from.as_bytes());
            hasher.update(b"->");
            hasher.update(to.as_bytes());
            hasher.update(b"\0");
        }
        let mut routed: Vec<&str> = routers.keys().map(String::as_str).collect();
        routed.sort();
        for id in routed {
            hasher.update(b"router:");
            hasher.update(id.as_bytes());
            hasher.update(b"\0");
        }
        let mut starts: Vec<&str> = start_set.iter().map(String::as_str).collect();
        starts.sort();
        for id in starts {
            hasher.update(b"start:");
            hasher.update(id.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeInput, NodeOutput};
    use async_trait::async_trait;

    struct NoopNode;

    #[async_trait]
    impl Node for NoopNode {
        async fn invoke(&self, _input: NodeInput) -> Result<NodeOutput> {
            unreachable!("not invoked in these tests")
        }
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let err = GraphBuilder::default()
            .node("a", Arc::new(NoopNode))
            .node("a", Arc::new(NoopNode))
            .start_at(["a"])
            .build();
        assert!(matches!(err, Err(RuntimeError::GraphValidation(_))));
    }

    #[test]
    fn rejects_edge_to_unknown_node() {
        let err = GraphBuilder::default()
            .node("a", Arc::new(NoopNode))
            .edge("a", "ghost")
            .start_at(["a"])
            .build();
        assert!(matches!(err, Err(RuntimeError::GraphValidation(_))));
    }

    #[test]
    fn rejects_empty_start_set() {
        let err = GraphBuilder::default().node("a", Arc::new(NoopNode)).build();
        assert!(matches!(err, Err(RuntimeError::GraphValidation(_))));
    }

    #[test]
    fn graph_version_is_stable_for_identical_structure() {
        let build = || {
            GraphBuilder::default()
                .node("a", Arc::new(NoopNode))
                .node("b", Arc::new(NoopNode))
                .edge("a", "b")
                .start_at(["a"])
                .build()
                .unwrap()
        };
        assert_eq!(build().graph_version(), build().graph_version());
    }

    #[test]
    fn graph_version_changes_with_structure() {
        let g1 = GraphBuilder::default()
            .node("a", Arc::new(NoopNode))
            .start_at(["a"])
            .build()
            .unwrap();
        let g2 = GraphBuilder::default()
            .node("a", Arc::new(NoopNode))
            .node("b", Arc::new(NoopNode))
            .edge("a", "b")
            .start_at(["a"])
            .build()
            .unwrap();
        assert_ne!(g1.graph_version(), g2.graph_version());
    }
}
