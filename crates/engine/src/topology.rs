//! Topological layering, computed before a pipeline executes.
//!
//! Kahn's algorithm, one layer at a time: every node whose remaining
//! in-degree is zero forms the next layer. Connections whose endpoints are
//! not both present are ignored. Nodes never consumed sit on or behind a
//! cycle and are reported together.

use std::collections::{HashMap, HashSet};

use nodes::{Connection, Node};

use crate::EngineError;

/// Dependency layers in execution order. Nodes within a layer have no edges
/// between them.
///
/// Within a layer, nodes keep their declaration order.
///
/// # Errors
/// [`EngineError::CycleDetected`] naming every node that could not be placed.
pub fn build_layers(nodes: &[Node], connections: &[Connection]) -> Result<Vec<Vec<String>>, EngineError> {
    // Unique ids in declaration order.
    let mut seen: HashSet<&str> = HashSet::with_capacity(nodes.len());
    let order: Vec<&str> = nodes
        .iter()
        .map(|node| node.id.as_str())
        .filter(|id| seen.insert(*id))
        .collect();

    let rank: HashMap<&str, usize> = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = order.iter().map(|&id| (id, Vec::new())).collect();
    let mut in_degree: HashMap<&str, usize> = order.iter().map(|&id| (id, 0)).collect();

    for conn in connections {
        let (from, to) = (conn.from.as_str(), conn.to.as_str());
        if !seen.contains(from) || !seen.contains(to) {
            continue;
        }
        adjacency.entry(from).or_default().push(to);
        *in_degree.entry(to).or_default() += 1;
    }

    let mut layers: Vec<Vec<String>> = Vec::new();
    let mut placed = 0usize;
    let mut current: Vec<&str> = order
        .iter()
        .copied()
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    while !current.is_empty() {
        let mut next: Vec<&str> = Vec::new();
        for &id in &current {
            for &successor in adjacency.get(id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(successor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(successor);
                    }
                }
            }
        }
        next.sort_by_key(|id| rank.get(id).copied().unwrap_or(usize::MAX));
        placed += current.len();
        layers.push(current.into_iter().map(str::to_owned).collect());
        current = next;
    }

    if placed < order.len() {
        let node_ids = order
            .into_iter()
            .filter(|id| in_degree.get(id).is_some_and(|&d| d > 0))
            .map(str::to_owned)
            .collect();
        return Err(EngineError::CycleDetected { node_ids });
    }

    Ok(layers)
}

/// Layers flattened into a single execution order.
pub fn flatten(layers: &[Vec<String>]) -> Vec<String> {
    layers.iter().flatten().cloned().collect()
}

/// Reject graphs in which two nodes share an id.
pub fn check_unique_ids(nodes: &[Node]) -> Result<(), EngineError> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }
    Ok(())
}

/// Strict check used by tooling: unique ids, then layering.
pub fn validate_graph(nodes: &[Node], connections: &[Connection]) -> Result<Vec<Vec<String>>, EngineError> {
    check_unique_ids(nodes)?;
    build_layers(nodes, connections)
}
