//! Natural loop detection
//!
//! Finds back edges by walking the immediate-dominator chain of every edge
//! source and grows each loop body backwards from the back-edge sources.
//! Back edges sharing a header are merged into one natural loop, so the
//! result has one entry per distinct header.

use crate::ir::{BlockId, Method};
use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// A raw natural-loop description: header plus body block set (header
/// included)
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    pub header: BlockId,
    pub body: HashSet<BlockId>,
}

/// Find all natural loops of a method's normal control-flow graph
///
/// Exceptional edges do not participate; a method without an entry block
/// has no loops.
pub fn find_natural_loops(method: &Method) -> Vec<NaturalLoop> {
    let entry = match method.entry() {
        Some(entry) => entry,
        None => return Vec::new(),
    };

    let mut graph: DiGraph<BlockId, ()> = DiGraph::new();
    let mut nodes: HashMap<BlockId, NodeIndex> = HashMap::new();
    for &bb in method.blocks() {
        nodes.insert(bb, graph.add_node(bb));
    }
    for &bb in method.blocks() {
        for &succ in method.block(bb).successors() {
            graph.add_edge(nodes[&bb], nodes[&succ], ());
        }
    }

    let doms = dominators::simple_fast(&graph, nodes[&entry]);

    // back edges, grouped by header in method order
    let mut headers: Vec<BlockId> = Vec::new();
    let mut sources: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for edge in graph.edge_references() {
        let source = graph[edge.source()];
        let target = graph[edge.target()];
        if dominates(&doms, edge.target(), edge.source()) {
            let bucket = sources.entry(target).or_default();
            if !bucket.contains(&source) {
                bucket.push(source);
            }
            if !headers.contains(&target) {
                headers.push(target);
            }
        }
    }
    headers.sort_by_key(|&header| method.position(header));

    headers
        .into_iter()
        .map(|header| {
            let body = loop_body(method, header, &sources[&header]);
            log::debug!(
                "natural loop: header {}, {} body blocks",
                method.block(header).name(),
                body.len()
            );
            NaturalLoop { header, body }
        })
        .collect()
}

/// Whether `dominator` dominates `node`, by walking the idom chain
fn dominates(doms: &Dominators<NodeIndex>, dominator: NodeIndex, node: NodeIndex) -> bool {
    if dominator == node {
        return true;
    }
    let mut current = node;
    while let Some(idom) = doms.immediate_dominator(current) {
        if idom == dominator {
            return true;
        }
        current = idom;
    }
    false
}

/// Grow a loop body backwards from its back-edge sources until the header
fn loop_body(method: &Method, header: BlockId, back_edge_sources: &[BlockId]) -> HashSet<BlockId> {
    let mut body = HashSet::new();
    body.insert(header);
    let mut stack: Vec<BlockId> = back_edge_sources
        .iter()
        .copied()
        .filter(|&source| source != header)
        .collect();
    while let Some(bb) = stack.pop() {
        if body.insert(bb) {
            for &pred in method.block(bb).predecessors() {
                if !body.contains(&pred) {
                    stack.push(pred);
                }
            }
        }
    }
    body
}
