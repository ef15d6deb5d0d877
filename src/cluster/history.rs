//! Merge-tree recording and the queries built on it.
//!
//! A [`History`] over `N` inputs starts with `N` leaf nodes (`0..N`). Each clustering
//! step appends one node: a pair merge has two node parents, a beam retirement has one
//! node parent and [`Parent::Beam`]. Every node gets at most one child, so the nodes form
//! a forest. A finished run has exactly `2N` nodes.
//!
//! ```text
//! node:      0   1   2   3 | 4 = (0,1)   5 = (2,beam)   6 = (3,4)   7 = (6,beam)
//! ```
//!
//! The exclusive queries read the forest "backwards in distance": cutting at `dcut`
//! keeps the nodes that were still alive when the running maximum distance first
//! exceeded `dcut`.

use crate::error::{Error, Result};

/// A parent slot of a history node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parent {
    /// Original input: no parent.
    None,
    /// The second "parent" of a beam retirement.
    Beam,
    /// Another history node.
    Node(usize),
}

impl Parent {
    /// The node index, if this parent is a node.
    pub fn node(self) -> Option<usize> {
        match self {
            Parent::Node(n) => Some(n),
            Parent::None | Parent::Beam => None,
        }
    }
}

/// One node of the merge forest.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistoryElement {
    /// First parent (the lower node index of a pair).
    pub parent1: Parent,
    /// Second parent, or [`Parent::Beam`] for a beam retirement.
    pub parent2: Parent,
    /// The node this one was merged or retired into.
    pub child: Option<usize>,
    /// Object produced by this node (`None` for beam retirements).
    pub object: Option<usize>,
    /// Distance of the step that created this node (0 for inputs).
    pub distance: f64,
    /// Largest step distance up to and including this node.
    pub max_distance_so_far: f64,
}

/// Append-only merge forest.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct History {
    elements: Vec<HistoryElement>,
    n_inputs: usize,
}

impl History {
    /// A history holding only the `n_inputs` leaves; leaf `i` produces object `i`.
    pub fn new(n_inputs: usize) -> Self {
        let mut elements = Vec::with_capacity(2 * n_inputs);
        elements.extend((0..n_inputs).map(|i| HistoryElement {
            parent1: Parent::None,
            parent2: Parent::None,
            child: None,
            object: Some(i),
            distance: 0.0,
            max_distance_so_far: 0.0,
        }));
        Self { elements, n_inputs }
    }

    /// Number of original inputs.
    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    /// Number of nodes recorded so far (inputs included).
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the history holds no nodes at all.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Whether every input has been merged or retired (`2N` nodes).
    pub fn is_complete(&self) -> bool {
        self.elements.len() == 2 * self.n_inputs
    }

    /// All nodes in creation order.
    pub fn elements(&self) -> &[HistoryElement] {
        &self.elements
    }

    /// A single node.
    ///
    /// # Panics
    ///
    /// Panics if `node` is out of range.
    pub fn element(&self, node: usize) -> &HistoryElement {
        &self.elements[node]
    }

    fn max_so_far(&self, distance: f64) -> f64 {
        self.elements
            .last()
            .map_or(distance, |e| e.max_distance_so_far.max(distance))
    }

    fn claim(&mut self, parent: usize, child: usize) {
        assert!(parent < child, "node {parent} does not exist");
        let slot = &mut self.elements[parent].child;
        assert!(slot.is_none(), "node {parent} already has a child");
        *slot = Some(child);
    }

    /// Record the merge of `parent1` and `parent2` into `object`; returns the new node.
    ///
    /// # Panics
    ///
    /// Panics if a parent does not exist, already has a child, or both are the same.
    pub fn record_pair(&mut self, parent1: usize, parent2: usize, object: usize, distance: f64) -> usize {
        assert_ne!(parent1, parent2, "cannot merge node {parent1} with itself");
        let node = self.elements.len();
        let (lo, hi) = (parent1.min(parent2), parent1.max(parent2));
        self.claim(lo, node);
        self.claim(hi, node);
        let max_distance_so_far = self.max_so_far(distance);
        self.elements.push(HistoryElement {
            parent1: Parent::Node(lo),
            parent2: Parent::Node(hi),
            child: None,
            object: Some(object),
            distance,
            max_distance_so_far,
        });
        node
    }

    /// Record the retirement of `parent` to the beam; returns the new node.
    ///
    /// # Panics
    ///
    /// Panics if `parent` does not exist or already has a child.
    pub fn record_beam(&mut self, parent: usize, distance: f64) -> usize {
        let node = self.elements.len();
        self.claim(parent, node);
        let max_distance_so_far = self.max_so_far(distance);
        self.elements.push(HistoryElement {
            parent1: Parent::Node(parent),
            parent2: Parent::Beam,
            child: None,
            object: None,
            distance,
            max_distance_so_far,
        });
        node
    }

    /// Parents of `node`.
    pub fn parents(&self, node: usize) -> (Parent, Parent) {
        let e = &self.elements[node];
        (e.parent1, e.parent2)
    }

    /// Child of `node`, if it has been merged or retired.
    pub fn child(&self, node: usize) -> Option<usize> {
        self.elements[node].child
    }

    /// Original inputs under `node`, ascending.
    pub fn leaves(&self, node: usize) -> Vec<usize> {
        let mut leaves = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            let (p1, p2) = self.parents(n);
            if p1 == Parent::None {
                leaves.push(n);
            }
            stack.extend(p1.node());
            stack.extend(p2.node());
        }
        leaves.sort_unstable();
        leaves
    }

    /// Check the forest invariants: parents precede children and point back to them,
    /// inputs come first, and the running maximum never decreases.
    pub fn validate(&self) -> Result<()> {
        let broken = |node, message| Err(Error::InconsistentHistory { node, message });
        if self.elements.len() < self.n_inputs || self.elements.len() > 2 * self.n_inputs {
            return broken(self.elements.len(), "node count out of range");
        }
        let mut previous_max = 0.0_f64;
        for (i, e) in self.elements.iter().enumerate() {
            if i < self.n_inputs {
                if e.parent1 != Parent::None || e.parent2 != Parent::None {
                    return broken(i, "input node has parents");
                }
                if e.object != Some(i) {
                    return broken(i, "input node does not produce its own object");
                }
            } else {
                let Some(p1) = e.parent1.node() else {
                    return broken(i, "missing first parent");
                };
                let p2 = match e.parent2 {
                    Parent::Node(p) => Some(p),
                    Parent::Beam => None,
                    Parent::None => return broken(i, "missing second parent"),
                };
                if p2 == Some(p1) {
                    return broken(i, "node merged with itself");
                }
                if e.object.is_none() != p2.is_none() {
                    return broken(i, "object does not match the kind of step");
                }
                for p in std::iter::once(p1).chain(p2) {
                    if p >= i || self.elements[p].child != Some(i) {
                        return broken(i, "parent is not linked to this node");
                    }
                }
                if e.max_distance_so_far < previous_max || e.max_distance_so_far < e.distance {
                    return broken(i, "running maximum decreased");
                }
                previous_max = e.max_distance_so_far;
            }
            if let Some(c) = e.child {
                let linked = c > i
                    && c < self.elements.len()
                    && (self.elements[c].parent1 == Parent::Node(i)
                        || self.elements[c].parent2 == Parent::Node(i));
                if !linked {
                    return broken(i, "child does not list this node as a parent");
                }
            }
        }
        Ok(())
    }

    fn require_complete(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(Error::InconsistentHistory {
                node: self.elements.len(),
                message: "history is incomplete",
            })
        }
    }

    /// Nodes that were retired to the beam, most recent retirement first.
    pub fn inclusive_nodes(&self) -> Vec<usize> {
        self.elements
            .iter()
            .rev()
            .filter(|e| e.parent2 == Parent::Beam)
            .filter_map(|e| e.parent1.node())
            .collect()
    }

    /// Number of clusters left when every step with distance up to `dcut` is applied.
    pub fn n_exclusive(&self, dcut: f64) -> Result<usize> {
        if dcut.is_nan() || dcut < 0.0 {
            return Err(Error::InvalidParameter {
                name: "dcut",
                message: "must be a non-negative number",
            });
        }
        self.require_complete()?;
        let stop = self
            .elements
            .iter()
            .rposition(|e| e.max_distance_so_far <= dcut)
            .map_or(0, |i| i + 1);
        Ok(2 * self.n_inputs - stop)
    }

    /// Nodes of the exclusive clustering with `dcut`.
    pub fn exclusive_nodes_dcut(&self, dcut: f64) -> Result<Vec<usize>> {
        let njets = self.n_exclusive(dcut)?;
        self.exclusive_nodes_up_to(njets)
    }

    /// Nodes of the exclusive clustering into exactly `njets` clusters.
    pub fn exclusive_nodes(&self, njets: usize) -> Result<Vec<usize>> {
        if njets > self.n_inputs {
            return Err(Error::InvalidClusterCount {
                requested: njets,
                n_items: self.n_inputs,
            });
        }
        self.exclusive_nodes_up_to(njets)
    }

    /// Nodes of the exclusive clustering into at most `njets` clusters.
    ///
    /// Asking for more clusters than inputs returns every input.
    pub fn exclusive_nodes_up_to(&self, njets: usize) -> Result<Vec<usize>> {
        self.require_complete()?;
        let n = self.n_inputs;
        let stop = (2 * n).saturating_sub(njets).max(n);
        let mut nodes = Vec::with_capacity(njets.min(n));
        for e in &self.elements[stop..] {
            for p in [e.parent1, e.parent2] {
                if let Parent::Node(p) = p {
                    if p < stop {
                        nodes.push(p);
                    }
                }
            }
        }
        Ok(nodes)
    }

    /// Distance of the step that takes the event from `njets + 1` to `njets` clusters
    /// (0 when `njets` is at least the number of inputs).
    pub fn exclusive_dmerge(&self, njets: usize) -> Result<f64> {
        self.step_before(njets).map(|e| e.map_or(0.0, |e| e.distance))
    }

    /// As [`History::exclusive_dmerge`], but the running maximum up to that step.
    pub fn exclusive_dmerge_max(&self, njets: usize) -> Result<f64> {
        self.step_before(njets)
            .map(|e| e.map_or(0.0, |e| e.max_distance_so_far))
    }

    fn step_before(&self, njets: usize) -> Result<Option<&HistoryElement>> {
        self.require_complete()?;
        if njets >= self.n_inputs {
            return Ok(None);
        }
        Ok(Some(&self.elements[2 * self.n_inputs - njets - 1]))
    }

    /// Every node exactly once, grouped by tree.
    ///
    /// Trees are visited in order of their lowest input. Inside a tree, a node follows
    /// both its parents, and the parent holding the lower input is expanded first.
    pub fn unique_order(&self) -> Vec<usize> {
        let len = self.elements.len();
        let mut lowest: Vec<usize> = (0..len).collect();
        for i in 0..len {
            if let Some(c) = self.elements[i].child {
                lowest[c] = lowest[c].min(lowest[i]);
            }
        }

        let mut extracted = vec![false; len];
        let mut order = Vec::with_capacity(len);
        let mut stack: Vec<(usize, bool)> = Vec::new();
        for input in 0..self.n_inputs.min(len) {
            let mut position = Some(input);
            while let Some(node) = position {
                stack.push((node, false));
                while let Some((n, expanded)) = stack.pop() {
                    if extracted[n] {
                        continue;
                    }
                    if expanded {
                        extracted[n] = true;
                        order.push(n);
                        continue;
                    }
                    stack.push((n, true));
                    let (mut p1, mut p2) = (
                        self.elements[n].parent1.node(),
                        self.elements[n].parent2.node(),
                    );
                    if let (Some(a), Some(b)) = (p1, p2) {
                        if lowest[a] > lowest[b] {
                            std::mem::swap(&mut p1, &mut p2);
                        }
                    }
                    // p1 is pushed last so it is expanded first
                    stack.extend(p2.filter(|&p| !extracted[p]).map(|p| (p, false)));
                    stack.extend(p1.filter(|&p| !extracted[p]).map(|p| (p, false)));
                }
                position = self.elements[node].child;
            }
        }
        order
    }

    /// Inputs that were never merged or retired.
    pub fn unclustered(&self) -> Vec<usize> {
        (0..self.n_inputs.min(self.elements.len()))
            .filter(|&i| self.elements[i].child.is_none())
            .collect()
    }

    /// Nodes with no child that still stand for an object (beam retirements excluded).
    pub fn childless(&self) -> Vec<usize> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.child.is_none() && e.parent2 != Parent::Beam)
            .map(|(i, _)| i)
            .collect()
    }
}
