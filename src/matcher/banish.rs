//! Removing matches reachable from banished documents.
//!
//! Nodes are `(doc, window)` ids interned into an integer arena; every
//! validated match is an undirected edge. Union-find narrows the graph to
//! components holding at least one banished window, and a multi-source BFS
//! bounded at `banish_distance` hops marks the nodes to remove.

use std::collections::VecDeque;

use ahash::{AHashMap, AHashSet};
use log::{debug, info};

use crate::error::Result;
use crate::storage::MatchStore;
use crate::types::{DocId, ValidatedMatch, WindowId};

type NodeId = u32;

#[derive(Debug, Default)]
struct WindowGraph {
    ids: AHashMap<WindowId, NodeId>,
    nodes: Vec<WindowId>,
    adjacency: Vec<Vec<NodeId>>,
}

impl WindowGraph {
    fn intern(&mut self, window: WindowId) -> NodeId {
        if let Some(&id) = self.ids.get(&window) {
            return id;
        }
        let id = self.nodes.len() as NodeId;
        self.ids.insert(window, id);
        self.nodes.push(window);
        self.adjacency.push(Vec::new());
        id
    }

    fn add_edge(&mut self, x: WindowId, y: WindowId) {
        let (i, j) = (self.intern(x), self.intern(y));
        self.adjacency[i as usize].push(j);
        self.adjacency[j as usize].push(i);
    }
}

struct UnionFind {
    parent: Vec<NodeId>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self { parent: (0..size as NodeId).collect(), rank: vec![0; size] }
    }

    fn find(&mut self, mut x: NodeId) -> NodeId {
        while self.parent[x as usize] != x {
            let grandparent = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grandparent;
            x = grandparent;
        }
        x
    }

    fn union(&mut self, x: NodeId, y: NodeId) {
        let (rx, ry) = (self.find(x), self.find(y));
        if rx == ry {
            return;
        }
        match self.rank[rx as usize].cmp(&self.rank[ry as usize]) {
            std::cmp::Ordering::Less => self.parent[rx as usize] = ry,
            std::cmp::Ordering::Greater => self.parent[ry as usize] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry as usize] = rx;
                self.rank[rx as usize] += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Banisher {
    distance: usize,
}

impl Banisher {
    pub fn new(distance: usize) -> Self {
        Self { distance }
    }

    /// Windows within `distance` hops of any window of a banished document.
    pub fn removal_set(&self, matches: &[ValidatedMatch], banished: &AHashSet<DocId>) -> AHashSet<WindowId> {
        let mut graph = WindowGraph::default();
        for m in matches {
            graph.add_edge(m.pair.side_a(), m.pair.side_b());
        }

        let mut components = UnionFind::new(graph.nodes.len());
        for (i, neighbours) in graph.adjacency.iter().enumerate() {
            for &j in neighbours {
                components.union(i as NodeId, j);
            }
        }

        let origins: Vec<NodeId> = (0..graph.nodes.len() as NodeId)
            .filter(|&i| banished.contains(&graph.nodes[i as usize].doc_id))
            .collect();
        let tainted: AHashSet<NodeId> = origins.iter().map(|&o| components.find(o)).collect();
        debug!(
            "Banish graph: {} nodes, {} origin windows in {} components",
            graph.nodes.len(),
            origins.len(),
            tainted.len()
        );

        let mut depth: Vec<Option<usize>> = vec![None; graph.nodes.len()];
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for &origin in &origins {
            depth[origin as usize] = Some(0);
            queue.push_back(origin);
        }
        while let Some(node) = queue.pop_front() {
            let d = depth[node as usize].unwrap_or(0);
            if d >= self.distance {
                continue;
            }
            for &next in &graph.adjacency[node as usize] {
                if depth[next as usize].is_none() && tainted.contains(&components.find(next)) {
                    depth[next as usize] = Some(d + 1);
                    queue.push_back(next);
                }
            }
        }

        depth
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_some())
            .map(|(i, _)| graph.nodes[i])
            .collect()
    }

    /// Deletes every stored match touching a removed window. Returns the number deleted.
    pub fn apply(&self, store: &dyn MatchStore, banished: &AHashSet<DocId>) -> Result<usize> {
        if banished.is_empty() {
            return Ok(0);
        }
        let mut matches = Vec::new();
        store.stream_all_matches(&mut |m| {
            matches.push(m);
            Ok(())
        })?;

        let removal = self.removal_set(&matches, banished);
        if removal.is_empty() {
            info!("Banishing removed no matches");
            return Ok(0);
        }
        let removed = store.delete_matches(&|m: &ValidatedMatch| {
            removal.contains(&m.pair.side_a()) || removal.contains(&m.pair.side_b())
        })?;
        info!(
            "Banishing removed {} windows and {} of {} matches",
            removal.len(),
            removed,
            matches.len()
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidatePair;

    fn edge(doc_a: DocId, window_a: u32, doc_b: DocId, window_b: u32) -> ValidatedMatch {
        ValidatedMatch {
            pair: CandidatePair { doc_a, doc_b, window_a, window_b },
            similarity: 100,
        }
    }

    fn banished(docs: &[DocId]) -> AHashSet<DocId> {
        docs.iter().copied().collect()
    }

    #[test]
    fn distance_bounds_the_reach() {
        // 0.0 - 1.0 - 2.0 - 3.0 - 4.0 chain, banish doc 0
        let chain = [edge(0, 0, 1, 0), edge(1, 0, 2, 0), edge(2, 0, 3, 0), edge(3, 0, 4, 0)];
        let removal = Banisher::new(2).removal_set(&chain, &banished(&[0]));
        let docs: AHashSet<DocId> = removal.iter().map(|w| w.doc_id).collect();
        assert_eq!(docs, banished(&[0, 1, 2]));
    }

    #[test]
    fn unrelated_components_are_untouched() {
        let matches = [edge(0, 0, 1, 0), edge(5, 3, 6, 3)];
        let removal = Banisher::new(10).removal_set(&matches, &banished(&[0]));
        assert!(!removal.contains(&WindowId::new(5, 3)));
        assert!(removal.contains(&WindowId::new(1, 0)));
    }

    #[test]
    fn zero_distance_removes_only_banished_windows() {
        let matches = [edge(0, 0, 1, 0), edge(1, 0, 2, 0)];
        let removal = Banisher::new(0).removal_set(&matches, &banished(&[0]));
        assert_eq!(removal.len(), 1);
        assert!(removal.contains(&WindowId::new(0, 0)));
    }
}
