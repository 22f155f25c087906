//! In-memory entity graph
//!
//! The graph is validated once on load (no dangling edges, no duplicate ids,
//! no cycles) and its topology never changes afterwards. Entity state
//! (inferred properties, resources) is updated in place by the engine.

use crate::error::{Error, Result};
use crate::types::{Edge, Entity, EntityId, GraphSnapshot};
use std::collections::{BTreeMap, BTreeSet};

/// Validated DAG of entities
#[derive(Debug, Clone)]
pub struct EntityGraph {
    entities: BTreeMap<EntityId, Entity>,
    predecessors: BTreeMap<EntityId, BTreeSet<EntityId>>,
    successors: BTreeMap<EntityId, BTreeSet<EntityId>>,
}

impl EntityGraph {
    /// Build a graph from entities and edges
    ///
    /// Nothing is installed unless every check passes.
    pub fn load(entities: Vec<Entity>, edges: Vec<Edge>) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for entity in entities {
            let id = entity.id.clone();
            if by_id.insert(id.clone(), entity).is_some() {
                return Err(Error::DuplicateEntity(id));
            }
        }

        let mut predecessors: BTreeMap<EntityId, BTreeSet<EntityId>> = by_id
            .keys()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();
        let mut successors = predecessors.clone();

        for edge in edges {
            for end in [&edge.from, &edge.to] {
                if !by_id.contains_key(end) {
                    return Err(Error::DanglingEdge {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        missing: end.clone(),
                    });
                }
            }
            successors
                .entry(edge.from.clone())
                .or_default()
                .insert(edge.to.clone());
            predecessors.entry(edge.to).or_default().insert(edge.from);
        }

        if let Some(path) = find_cycle(&successors) {
            return Err(Error::CycleDetected { path });
        }

        log::debug!(
            "Loaded entity graph: {} entities, {} edges",
            by_id.len(),
            successors.values().map(BTreeSet::len).sum::<usize>()
        );

        Ok(Self {
            entities: by_id,
            predecessors,
            successors,
        })
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        Self::load(snapshot.entities, snapshot.edges)
    }

    /// Current entity state and the (deduplicated) edge set
    pub fn to_snapshot(&self) -> GraphSnapshot {
        let edges = self
            .successors
            .iter()
            .flat_map(|(from, tos)| tos.iter().map(move |to| Edge::new(from.clone(), to.clone())))
            .collect();
        GraphSnapshot {
            entities: self.entities.values().cloned().collect(),
            edges,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn entity(&self, id: &EntityId) -> Result<&Entity> {
        self.entities
            .get(id)
            .ok_or_else(|| Error::UnknownEntity(id.clone()))
    }

    pub fn entity_mut(&mut self, id: &EntityId) -> Result<&mut Entity> {
        self.entities
            .get_mut(id)
            .ok_or_else(|| Error::UnknownEntity(id.clone()))
    }

    /// All entities in ascending id order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Direct predecessors with their current state, ascending by id
    pub fn predecessors_of(&self, id: &EntityId) -> Result<Vec<&Entity>> {
        self.materialize(&self.predecessors, id)
    }

    /// Direct successors with their current state, ascending by id
    pub fn successors_of(&self, id: &EntityId) -> Result<Vec<&Entity>> {
        self.materialize(&self.successors, id)
    }

    /// Whether `to` is a direct successor of `from`
    pub fn has_edge(&self, from: &EntityId, to: &EntityId) -> bool {
        self.successors
            .get(from)
            .is_some_and(|succ| succ.contains(to))
    }

    /// Every entity reachable downstream of `id`, excluding `id`
    pub fn descendants_of(&self, id: &EntityId) -> Result<BTreeSet<EntityId>> {
        if !self.contains(id) {
            return Err(Error::UnknownEntity(id.clone()));
        }
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&EntityId> = vec![id];
        while let Some(current) = stack.pop() {
            for next in &self.successors[current] {
                if seen.insert(next.clone()) {
                    stack.push(next);
                }
            }
        }
        Ok(seen)
    }

    /// Ids in dependency order, smallest ready id first
    ///
    /// Each call starts a fresh traversal.
    pub fn topological_order(&self) -> TopologicalOrder<'_> {
        let in_degree: BTreeMap<&EntityId, usize> = self
            .predecessors
            .iter()
            .map(|(id, preds)| (id, preds.len()))
            .collect();
        let ready = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        TopologicalOrder {
            graph: self,
            in_degree,
            ready,
        }
    }

    /// Topological layers: no edge connects two ids of the same layer
    ///
    /// Each entity sits one layer below its deepest predecessor.
    pub fn layers(&self) -> Vec<Vec<EntityId>> {
        let mut depth: BTreeMap<&EntityId, usize> = BTreeMap::new();
        let mut layers: Vec<Vec<EntityId>> = Vec::new();
        for id in self.topological_order() {
            let level = self.predecessors[id]
                .iter()
                .map(|p| depth[p] + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, level);
            if layers.len() <= level {
                layers.resize_with(level + 1, Vec::new);
            }
            layers[level].push(id.clone());
        }
        for layer in &mut layers {
            layer.sort();
        }
        layers
    }

    fn materialize(
        &self,
        adjacency: &BTreeMap<EntityId, BTreeSet<EntityId>>,
        id: &EntityId,
    ) -> Result<Vec<&Entity>> {
        let ids = adjacency
            .get(id)
            .ok_or_else(|| Error::UnknownEntity(id.clone()))?;
        Ok(ids.iter().map(|i| &self.entities[i]).collect())
    }
}

/// Lazy Kahn traversal of an [`EntityGraph`]
pub struct TopologicalOrder<'a> {
    graph: &'a EntityGraph,
    in_degree: BTreeMap<&'a EntityId, usize>,
    ready: BTreeSet<&'a EntityId>,
}

impl<'a> Iterator for TopologicalOrder<'a> {
    type Item = &'a EntityId;

    fn next(&mut self) -> Option<Self::Item> {
        let graph = self.graph;
        let id = self.ready.pop_first()?;
        for succ in &graph.successors[id] {
            if let Some(degree) = self.in_degree.get_mut(succ) {
                *degree -= 1;
                if *degree == 0 {
                    self.ready.insert(succ);
                }
            }
        }
        Some(id)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first search with an explicit recursion stack
///
/// Returns the first cycle found, as a path that starts and ends on the same id.
fn find_cycle(successors: &BTreeMap<EntityId, BTreeSet<EntityId>>) -> Option<Vec<EntityId>> {
    let mut marks: BTreeMap<&EntityId, Mark> =
        successors.keys().map(|id| (id, Mark::Unvisited)).collect();

    for root in successors.keys() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        // (node, remaining successors) frames of the current DFS path
        let mut stack: Vec<(&EntityId, std::collections::btree_set::Iter<'_, EntityId>)> =
            vec![(root, successors[root].iter())];
        marks.insert(root, Mark::OnStack);

        while let Some((node, children)) = stack.last_mut() {
            let node: &EntityId = *node;
            match children.next() {
                Some(child) => match marks[child] {
                    Mark::Unvisited => {
                        marks.insert(child, Mark::OnStack);
                        stack.push((child, successors[child].iter()));
                    }
                    Mark::OnStack => {
                        let start = stack
                            .iter()
                            .position(|(id, _)| *id == child)
                            .unwrap_or(0);
                        let mut path: Vec<EntityId> =
                            stack[start..].iter().map(|(id, _)| (*id).clone()).collect();
                        path.push(child.clone());
                        return Some(path);
                    }
                    Mark::Done => {}
                },
                None => {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                }
            }
        }
    }
    None
}
