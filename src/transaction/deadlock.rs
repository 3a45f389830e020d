use std::collections::{BTreeMap, BTreeSet};

use crate::common::types::TxnId;

/// Waits-for graph built from the lock table: an edge `waiter -> holder`
/// for every blocked request and every granted request in the same queue.
#[derive(Default)]
pub(crate) struct WaitsForGraph {
    edges: BTreeMap<TxnId, BTreeSet<TxnId>>,
}

impl WaitsForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, waiter: TxnId, holder: TxnId) {
        self.edges.entry(waiter).or_default().insert(holder);
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge_list(&self) -> Vec<(TxnId, TxnId)> {
        self.edges
            .iter()
            .flat_map(|(waiter, holders)| holders.iter().map(|h| (*waiter, *h)))
            .collect()
    }

    /// Deterministic cycle search: roots in ascending id order, successors
    /// pushed in descending order so the youngest reachable transaction is
    /// visited last. On a cycle, the victim is the youngest (maximum id)
    /// transaction seen on the traversal.
    pub fn find_cycle_victim(&self) -> Option<TxnId> {
        for &root in self.edges.keys() {
            let mut visited = BTreeSet::new();
            let mut stack = vec![root];

            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    return visited.iter().next_back().copied();
                }
                if let Some(successors) = self.edges.get(&id) {
                    for &successor in successors.iter().rev() {
                        stack.push(successor);
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_cycle() {
        let mut graph = WaitsForGraph::new();
        graph.add_edge(1, 2);
        graph.add_edge(2, 6);
        graph.add_edge(3, 4);
        graph.add_edge(4, 6);
        assert_eq!(graph.find_cycle_victim(), None);
    }

    #[test]
    fn test_two_cycle_aborts_youngest() {
        let mut graph = WaitsForGraph::new();
        graph.add_edge(1, 2);
        graph.add_edge(2, 1);
        assert_eq!(graph.find_cycle_victim(), Some(2));
    }

    #[test]
    fn test_long_cycle_aborts_youngest() {
        let mut graph = WaitsForGraph::new();
        graph.add_edge(1, 2);
        graph.add_edge(2, 3);
        graph.add_edge(3, 4);
        graph.add_edge(4, 1);
        assert_eq!(graph.find_cycle_victim(), Some(4));
    }

    #[test]
    fn test_self_loop() {
        let mut graph = WaitsForGraph::new();
        graph.add_edge(7, 7);
        assert_eq!(graph.find_cycle_victim(), Some(7));
    }

    #[test]
    fn test_edge_list_is_sorted() {
        let mut graph = WaitsForGraph::new();
        graph.add_edge(2, 1);
        graph.add_edge(1, 3);
        graph.add_edge(1, 2);
        assert_eq!(graph.edge_list(), vec![(1, 2), (1, 3), (2, 1)]);
    }
}
