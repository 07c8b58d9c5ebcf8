//! The parent→child relationship index.
//!
//! Items form a multi-parent DAG: the "groups" view of an item is exactly the
//! set of its parents. Edges are held in a [`petgraph::Graph`] with item ids
//! as node weights and a `u16` sort key per edge, kept contiguous `[0..N)`
//! among each parent's children, so that child ordering is deterministic and
//! append semantics survive removals.
//!
//! Moving an item between parents is never an in-place edge update. It is
//! always [`RelationIndex::remove_edge`] followed by
//! [`RelationIndex::add_edge`], with the session guaranteeing no observer
//! runs between the two.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::{graph::NodeIndex, visit::EdgeRef, Direction};

use crate::{CartaError, ItemId};

#[derive(Debug, Default, Clone)]
pub struct RelationIndex {
    graph: petgraph::Graph<ItemId, u16>,
    id_to_index: BTreeMap<ItemId, NodeIndex>,
}

impl RelationIndex {
    /// Insert a parent→child edge, appending to the end of the parent's
    /// child ordering.
    ///
    /// Fails with [`CartaError::DuplicateEdge`] when the edge already exists;
    /// callers treat that as already-satisfied.
    pub fn add_edge(&mut self, parent: &ItemId, child: &ItemId) -> Result<(), CartaError> {
        let parent_idx = self.ensure_node(parent);
        let child_idx = self.ensure_node(child);
        if self.graph.find_edge(parent_idx, child_idx).is_some() {
            return Err(CartaError::DuplicateEdge {
                parent: parent.clone(),
                child: child.clone(),
            });
        }
        let sort_key = self.graph.edges_directed(parent_idx, Direction::Outgoing).count() as u16;
        self.graph.add_edge(parent_idx, child_idx, sort_key);
        Ok(())
    }

    /// Remove a parent→child edge and close the gap in the surviving
    /// children's sort keys.
    ///
    /// A no-op returning `false` when the edge is absent, since a delete may
    /// race with an already-stale view.
    pub fn remove_edge(&mut self, parent: &ItemId, child: &ItemId) -> bool {
        let (Some(&parent_idx), Some(&child_idx)) =
            (self.id_to_index.get(parent), self.id_to_index.get(child))
        else {
            return false;
        };
        let Some(edge_idx) = self.graph.find_edge(parent_idx, child_idx) else {
            return false;
        };
        self.graph.remove_edge(edge_idx);
        self.reindex_children(parent_idx);
        true
    }

    /// The ids of `parent`'s children in sort-key order. Empty for unknown
    /// ids, never an error.
    pub fn children_of(&self, parent: &ItemId) -> Vec<ItemId> {
        let Some(&parent_idx) = self.id_to_index.get(parent) else {
            return Vec::new();
        };
        let mut children: Vec<(u16, ItemId)> = self
            .graph
            .edges_directed(parent_idx, Direction::Outgoing)
            .map(|edge| (*edge.weight(), self.graph[edge.target()].clone()))
            .collect();
        children.sort_by_key(|(key, _)| *key);
        children.into_iter().map(|(_, id)| id).collect()
    }

    /// The set of `child`'s parents. Empty for unknown ids.
    pub fn parents_of(&self, child: &ItemId) -> BTreeSet<ItemId> {
        let Some(&child_idx) = self.id_to_index.get(child) else {
            return BTreeSet::new();
        };
        self.graph
            .edges_directed(child_idx, Direction::Incoming)
            .map(|edge| self.graph[edge.source()].clone())
            .collect()
    }

    pub fn has_edge(&self, parent: &ItemId, child: &ItemId) -> bool {
        match (self.id_to_index.get(parent), self.id_to_index.get(child)) {
            (Some(&parent_idx), Some(&child_idx)) => {
                self.graph.find_edge(parent_idx, child_idx).is_some()
            }
            _ => false,
        }
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn ensure_node(&mut self, id: &ItemId) -> NodeIndex {
        if let Some(&idx) = self.id_to_index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.id_to_index.insert(id.clone(), idx);
        idx
    }

    /// Rewrite the sort keys of `parent`'s surviving children to contiguous
    /// `[0..N)`, preserving their relative order.
    fn reindex_children(&mut self, parent_idx: NodeIndex) {
        let mut edges: Vec<(petgraph::graph::EdgeIndex, u16)> = self
            .graph
            .edges_directed(parent_idx, Direction::Outgoing)
            .map(|edge| (edge.id(), *edge.weight()))
            .collect();
        edges.sort_by_key(|(_, key)| *key);
        for (position, (edge_idx, _)) in edges.into_iter().enumerate() {
            self.graph[edge_idx] = position as u16;
        }
    }
}
