//! Node pool and open list for the corridor search
//!
//! Nodes live in a flat vector and refer to their parent by index. The pool
//! is sized once and reused across queries.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use super::PolyRef;

/// Search state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    Open,
    Closed,
}

/// Node in the pathfinding graph
#[derive(Debug, Clone)]
pub(crate) struct Node {
    /// Position the polygon is entered at
    pub pos: [f32; 3],
    /// Cost from the start to this node
    pub cost: f32,
    /// Cost plus heuristic
    pub total: f32,
    /// Index of the parent node
    pub parent: Option<usize>,
    pub state: NodeState,
    /// Polygon the node corresponds to
    pub poly: PolyRef,
}

/// Fixed-capacity node storage keyed by polygon reference
#[derive(Debug)]
pub(crate) struct NodePool {
    nodes: Vec<Node>,
    lookup: HashMap<PolyRef, usize>,
    max_nodes: usize,
}

impl NodePool {
    /// Creates a pool holding up to `max_nodes` nodes
    pub fn new(max_nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(max_nodes),
            lookup: HashMap::with_capacity(max_nodes),
            max_nodes,
        }
    }

    /// Forgets all nodes, keeping the allocations
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.lookup.clear();
    }

    /// Index of the node of `poly`, allocating it when new. Returns `None`
    /// when the pool is full.
    pub fn get_or_alloc(&mut self, poly: PolyRef) -> Option<(usize, bool)> {
        if let Some(&idx) = self.lookup.get(&poly) {
            return Some((idx, false));
        }
        if self.nodes.len() >= self.max_nodes {
            return None;
        }
        let idx = self.nodes.len();
        self.nodes.push(Node {
            pos: [0.0; 3],
            cost: 0.0,
            total: 0.0,
            parent: None,
            state: NodeState::Open,
            poly,
        });
        self.lookup.insert(poly, idx);
        Some((idx, true))
    }

    #[inline]
    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    #[inline]
    pub fn node_mut(&mut self, idx: usize) -> &mut Node {
        &mut self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Polygons from the start to node `idx`, following parent indices
    pub fn path_to(&self, idx: usize) -> Vec<PolyRef> {
        let mut path = Vec::new();
        let mut cur = Some(idx);
        while let Some(i) = cur {
            path.push(self.nodes[i].poly);
            cur = self.nodes[i].parent;
        }
        path.reverse();
        path
    }
}

/// Heap entry; ordered so the smallest total pops first
#[derive(Debug, Clone, Copy)]
struct HeapNode {
    index: usize,
    total: f32,
}

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.total == other.total
    }
}

impl Eq for HeapNode {}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other.total.total_cmp(&self.total).then_with(|| other.index.cmp(&self.index))
    }
}

/// Open list. A node whose total improves is pushed again; stale entries are
/// skipped on pop.
#[derive(Debug, Default)]
pub(crate) struct NodeQueue {
    heap: BinaryHeap<HeapNode>,
}

impl NodeQueue {
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn push(&mut self, index: usize, total: f32) {
        self.heap.push(HeapNode { index, total });
    }

    /// Pops the open node with the smallest total
    pub fn pop(&mut self, pool: &NodePool) -> Option<usize> {
        while let Some(entry) = self.heap.pop() {
            let node = pool.node(entry.index);
            if node.state == NodeState::Open && node.total == entry.total {
                return Some(entry.index);
            }
        }
        None
    }
}
