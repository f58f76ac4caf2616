//! Directed "is-subclass-of" / "is-subproperty-of" graph over canonical identifiers.
//!
//! Edges point from parent to child. Both endpoints of an edge are always vertices.

use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use super::value_objects::Iri;

/// Longest parent-to-child path considered when resolving ancestors.
pub const MAX_GRAPH_PATH_LENGTH: usize = 20;

#[derive(Clone, Debug, Default)]
pub struct HierarchyGraph {
    graph: DiGraph<Iri, ()>,
    vertices: HashMap<Iri, NodeIndex>,
}

impl HierarchyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex, returning the existing index when already present.
    pub fn add_vertex(&mut self, id: &Iri) -> NodeIndex {
        if let Some(index) = self.vertices.get(id) {
            return *index;
        }
        let index = self.graph.add_node(id.clone());
        self.vertices.insert(id.clone(), index);
        index
    }

    /// Adds the `parent -> child` edge along with its endpoints.
    ///
    /// Returns `false` when the edge already existed.
    pub fn add_edge(&mut self, parent: &Iri, child: &Iri) -> bool {
        let parent = self.add_vertex(parent);
        let child = self.add_vertex(child);
        if self.graph.contains_edge(parent, child) {
            return false;
        }
        self.graph.add_edge(parent, child, ());
        true
    }

    #[must_use]
    pub fn contains_vertex(&self, id: &Iri) -> bool {
        self.vertices.contains_key(id)
    }

    #[must_use]
    pub fn contains_edge(&self, parent: &Iri, child: &Iri) -> bool {
        match (self.vertices.get(parent), self.vertices.get(child)) {
            (Some(parent), Some(child)) => self.graph.contains_edge(*parent, *child),
            _ => false,
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Removes every vertex, and with them every edge.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.vertices.clear();
    }

    /// Identifiers lying on a path from `ancestor` down to `class` of at most `max_length` edges.
    ///
    /// `class` itself is excluded and `ancestor` included. The result is ordered for
    /// inheritance: farthest from `class` first, and among equidistant vertices the
    /// lexicographically smallest identifier last, so that applying members in order
    /// lets the nearest ancestor win. Empty when `ancestor` is not a proper ancestor.
    #[must_use]
    pub fn ancestor_path(&self, class: &Iri, ancestor: &Iri, max_length: usize) -> Vec<Iri> {
        if class == ancestor {
            return Vec::new();
        }
        let (Some(&start), Some(&top)) = (self.vertices.get(class), self.vertices.get(ancestor))
        else {
            return Vec::new();
        };

        let upward = self.distances(start, Direction::Incoming, max_length);
        if !upward.contains_key(&top) {
            return Vec::new();
        }
        let downward = self.distances(top, Direction::Outgoing, max_length);

        let mut hops: Vec<(usize, &Iri)> = upward
            .iter()
            .filter(|(index, _)| **index != start)
            .filter_map(|(index, up)| {
                let down = downward.get(index)?;
                (up + down <= max_length).then(|| (*up, &self.graph[*index]))
            })
            .collect();
        hops.sort_by_key(|(distance, id)| (Reverse(*distance), Reverse(*id)));
        hops.into_iter().map(|(_, id)| id.clone()).collect()
    }

    /// Breadth-first shortest distances from `from`, bounded by `max_length` edges.
    fn distances(
        &self,
        from: NodeIndex,
        direction: Direction,
        max_length: usize,
    ) -> HashMap<NodeIndex, usize> {
        let mut distances = HashMap::from([(from, 0)]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            let distance = distances[&current];
            if distance == max_length {
                continue;
            }
            for next in self.graph.neighbors_directed(current, direction) {
                if !distances.contains_key(&next) {
                    distances.insert(next, distance + 1);
                    queue.push_back(next);
                }
            }
        }
        distances
    }
}
