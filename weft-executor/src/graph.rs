//! Dependency ordering of task-driven nodes.
//!
//! Only value edges constrain ordering. The streaming subgraph may contain
//! feedback cycles and contributes zero constraints, so it never appears
//! here: callers hand this module the task-driven node ids and the value
//! edges whose endpoints are both task-driven.

use std::collections::{BTreeSet, HashMap};
use weft_core::error::{Result, WeftError};

/// Value-edge dependency graph over task-driven nodes.
#[derive(Debug)]
pub struct ValueGraph {
    /// Node ids in declaration order.
    ids: Vec<String>,
    /// Adjacency: node index -> downstream node indices.
    downstream: Vec<Vec<usize>>,
    /// In-degree per node index.
    in_degree: Vec<usize>,
}

impl ValueGraph {
    /// Build a graph from declaration-ordered node ids and `(source_node,
    /// target_node)` value-edge pairs. Edges touching unknown ids are
    /// ignored — the caller has already restricted endpoints.
    pub fn new(ids: Vec<String>, edges: &[(String, String)]) -> Self {
        let index: HashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let mut downstream = vec![Vec::new(); ids.len()];
        let mut in_degree = vec![0usize; ids.len()];
        for (from, to) in edges {
            let (Some(&f), Some(&t)) = (index.get(from.as_str()), index.get(to.as_str())) else {
                continue;
            };
            downstream[f].push(t);
            in_degree[t] += 1;
        }
        Self {
            ids,
            downstream,
            in_degree,
        }
    }

    /// Kahn ordering; in-degree ties break by declaration order.
    ///
    /// A cycle fails with the participating nodes named.
    pub fn order(&self) -> Result<Vec<String>> {
        let mut in_degree = self.in_degree.clone();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut sorted = Vec::with_capacity(self.ids.len());
        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            sorted.push(self.ids[next].clone());
            for &down in &self.downstream[next] {
                in_degree[down] -= 1;
                if in_degree[down] == 0 {
                    ready.insert(down);
                }
            }
        }

        if sorted.len() != self.ids.len() {
            let stuck: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &deg)| deg > 0)
                .map(|(i, _)| self.ids[i].clone())
                .collect();
            return Err(WeftError::Cycle { nodes: stuck });
        }
        Ok(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn edges(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn linear_chain_orders_in_sequence() {
        let graph = ValueGraph::new(ids(&["a", "b", "c"]), &edges(&[("a", "b"), ("b", "c")]));
        assert_eq!(graph.order().unwrap(), ids(&["a", "b", "c"]));
    }

    #[test]
    fn ties_break_by_declaration_order() {
        // No edges at all: ordering is pure declaration order.
        let graph = ValueGraph::new(ids(&["z", "m", "a"]), &[]);
        assert_eq!(graph.order().unwrap(), ids(&["z", "m", "a"]));

        // Diamond: b and c both become ready after a; b was declared first.
        let graph = ValueGraph::new(
            ids(&["a", "b", "c", "d"]),
            &edges(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]),
        );
        assert_eq!(graph.order().unwrap(), ids(&["a", "b", "c", "d"]));
    }

    #[test]
    fn cycle_names_participants() {
        let graph = ValueGraph::new(
            ids(&["a", "b", "c"]),
            &edges(&[("a", "b"), ("b", "a")]),
        );
        match graph.order().unwrap_err() {
            WeftError::Cycle { nodes } => {
                assert_eq!(nodes, ids(&["a", "b"]));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn edges_to_unknown_ids_are_ignored() {
        let graph = ValueGraph::new(
            ids(&["a", "b"]),
            &edges(&[("a", "b"), ("a", "streaming_only"), ("ghost", "b")]),
        );
        assert_eq!(graph.order().unwrap(), ids(&["a", "b"]));
    }

    #[test]
    fn parallel_edges_between_the_same_pair() {
        let graph = ValueGraph::new(ids(&["a", "b"]), &edges(&[("a", "b"), ("a", "b")]));
        assert_eq!(graph.order().unwrap(), ids(&["a", "b"]));
    }
}
