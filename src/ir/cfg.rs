//! Module-level control-flow graph.
//!
//! Nodes are referenced by id and never owned by edges, so blocks can move between
//! byte intervals during layout while the graph stays valid.

use std::collections::BTreeMap;

use super::{BlockId, ProxyId};

/// A vertex of the control-flow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CfgNode {
    /// A code block of the module.
    Block(BlockId),
    /// A stand-in for a target outside the module.
    Proxy(ProxyId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Branch,
    Call,
    Fallthrough,
    Return,
}

/// A typed directed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub source: CfgNode,
    pub target: CfgNode,
    pub kind: EdgeKind,
    pub conditional: bool,
    pub direct: bool,
}

impl Edge {
    /// An unconditional, direct fallthrough between two code blocks.
    pub fn fallthrough(source: BlockId, target: BlockId) -> Self {
        Self {
            source: CfgNode::Block(source),
            target: CfgNode::Block(target),
            kind: EdgeKind::Fallthrough,
            conditional: false,
            direct: true,
        }
    }
}

/// Adjacency list of outgoing edges per node.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    out_edges: BTreeMap<CfgNode, Vec<Edge>>,
}

impl Cfg {
    pub fn add_edge(&mut self, edge: Edge) {
        self.out_edges.entry(edge.source).or_default().push(edge);
    }

    pub fn out_edges(&self, node: CfgNode) -> &[Edge] {
        self.out_edges.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.out_edges.values().flatten()
    }
}
