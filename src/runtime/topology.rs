//! Topological ordering of workflow nodes
//!
//! Builds a petgraph `DiGraph` whose node indices follow the input order, then
//! runs Kahn's algorithm with a min-heap as the ready set. Among nodes that are
//! ready at the same time the one listed first in the workflow always runs
//! first, so identical input always yields an identical order.

use crate::error::{EngineError, EngineResult};
use crate::workflow::types::{Connection, ValidNode};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

/// Order `nodes` so every connection's source precedes its target
///
/// Connections that reference ids outside `nodes` are ignored. Fails with
/// `EngineError::Cycle` naming every node that could not be ordered.
pub fn sort<'a>(nodes: &'a [ValidNode], connections: &[Connection]) -> EngineResult<Vec<&'a ValidNode>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::with_capacity(nodes.len(), connections.len());
    let mut index_of: HashMap<&str, NodeIndex> = HashMap::with_capacity(nodes.len());

    for node in nodes {
        let index = graph.add_node(node.id.as_str());
        if index_of.insert(node.id.as_str(), index).is_some() {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    for connection in connections {
        match (
            index_of.get(connection.source.as_str()),
            index_of.get(connection.target.as_str()),
        ) {
            (Some(&from), Some(&to)) => {
                graph.add_edge(from, to, ());
            }
            _ => tracing::debug!(
                "⏭️ Ignoring connection '{}' ({} → {}) with an endpoint outside the run",
                connection.id,
                connection.source,
                connection.target
            ),
        }
    }

    // Parallel edges are counted once per edge, both here and when decrementing.
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|index| graph.neighbors_directed(index, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(position, _)| Reverse(position))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(position)) = ready.pop() {
        order.push(&nodes[position]);

        for successor in graph.neighbors(NodeIndex::new(position)) {
            let degree = &mut in_degree[successor.index()];
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(successor.index()));
            }
        }
    }

    if order.len() != nodes.len() {
        let remaining: Vec<String> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(position, _)| nodes[position].id.clone())
            .collect();
        tracing::error!("❌ Cycle detected among nodes: {:?}", remaining);
        return Err(EngineError::Cycle(remaining));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn node(id: &str) -> ValidNode {
        ValidNode {
            id: id.to_string(),
            node_type: "INITIAL".to_string(),
            data: Map::new(),
        }
    }

    fn nodes(ids: &[&str]) -> Vec<ValidNode> {
        ids.iter().map(|id| node(id)).collect()
    }

    fn edges(pairs: &[(&str, &str)]) -> Vec<Connection> {
        pairs.iter().map(|(from, to)| Connection::new(*from, *to)).collect()
    }

    fn ids(order: &[&ValidNode]) -> Vec<String> {
        order.iter().map(|node| node.id.clone()).collect()
    }

    fn assert_respects_connections(order: &[&ValidNode], connections: &[Connection]) {
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), i))
            .collect();
        for connection in connections {
            assert!(
                position[connection.source.as_str()] < position[connection.target.as_str()],
                "{} must come before {}",
                connection.source,
                connection.target
            );
        }
    }

    #[test]
    fn linear_chain_sorts_in_dependency_order() {
        // listed backwards on purpose
        let nodes = nodes(&["c", "b", "a"]);
        let connections = edges(&[("a", "b"), ("b", "c")]);

        let order = sort(&nodes, &connections).unwrap();
        assert_eq!(ids(&order), vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_respects_every_edge_and_breaks_ties_by_input_order() {
        //   a
        //  / \
        // c   b
        //  \ /
        //   d
        let nodes = nodes(&["a", "c", "b", "d"]);
        let connections = edges(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);

        let order = sort(&nodes, &connections).unwrap();
        assert_respects_connections(&order, &connections);
        assert_eq!(ids(&order), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn isolated_nodes_are_kept_and_sort_by_position() {
        let nodes = nodes(&["manual", "fetch", "orphan"]);
        let connections = edges(&[("fetch", "orphan")]);

        let order = sort(&nodes, &connections).unwrap();
        assert_eq!(ids(&order), vec!["manual", "fetch", "orphan"]);
    }

    #[test]
    fn fan_out_and_fan_in_with_parallel_edges() {
        let nodes = nodes(&["x", "y", "z", "sink"]);
        let connections = edges(&[
            ("x", "sink"),
            ("y", "sink"),
            ("y", "sink"),
            ("z", "sink"),
            ("x", "y"),
        ]);

        let order = sort(&nodes, &connections).unwrap();
        assert_respects_connections(&order, &connections);
        assert_eq!(order.len(), 4);
        assert_eq!(order.last().unwrap().id, "sink");
    }

    #[test]
    fn two_node_cycle_is_reported_with_both_ids() {
        let nodes = nodes(&["start", "a", "b"]);
        let connections = edges(&[("start", "a"), ("a", "b"), ("b", "a")]);

        match sort(&nodes, &connections) {
            Err(EngineError::Cycle(remaining)) => assert_eq!(remaining, vec!["a", "b"]),
            other => panic!("expected cycle error, got {:?}", other.map(|o| ids(&o))),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let nodes = nodes(&["loop"]);
        let connections = edges(&[("loop", "loop")]);
        assert!(matches!(sort(&nodes, &connections), Err(EngineError::Cycle(_))));
    }

    #[test]
    fn dangling_connections_are_ignored() {
        let nodes = nodes(&["a", "b"]);
        let connections = edges(&[("a", "b"), ("ghost", "a"), ("b", "dropped")]);

        let order = sort(&nodes, &connections).unwrap();
        assert_eq!(ids(&order), vec!["a", "b"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let nodes = nodes(&["a", "a"]);
        assert!(matches!(
            sort(&nodes, &[]),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn sorting_is_deterministic() {
        let nodes = nodes(&["n1", "n2", "n3", "n4", "n5", "n6"]);
        let connections = edges(&[("n1", "n4"), ("n2", "n4"), ("n3", "n5"), ("n4", "n6"), ("n5", "n6")]);

        let first = ids(&sort(&nodes, &connections).unwrap());
        for _ in 0..10 {
            assert_eq!(ids(&sort(&nodes, &connections).unwrap()), first);
        }
        assert_eq!(first, vec!["n1", "n2", "n3", "n4", "n5", "n6"]);
    }
}
