//! Dependency graph of cluster resources.
//!
//! Loaded once from a declarative definition and shared read-only by every
//! stage. Cycles are allowed; every traversal keeps a visited set.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::Path;

use rootcause_core::{DependencyEdge, DependencyKind, EdgeDirection, GraphParseError, ResourceNode};
use serde::{Deserialize, Serialize};

/// Declarative graph input: resources plus typed edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub resources: Vec<ResourceNode>,
    #[serde(default)]
    pub edges: Vec<DependencyEdge>,
}

type Adjacency = BTreeMap<String, Vec<(String, DependencyKind)>>;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, ResourceNode>,
    edges: Vec<DependencyEdge>,
    /// `id -> resources id depends on`
    outgoing: Adjacency,
    /// `id -> resources depending on id`
    incoming: Adjacency,
}

impl DependencyGraph {
    pub fn from_definition(definition: GraphDefinition) -> Result<Self, GraphParseError> {
        let mut nodes = BTreeMap::new();
        for node in definition.resources {
            if node.id.trim().is_empty() {
                return Err(GraphParseError::EmptyId);
            }
            if nodes.contains_key(&node.id) {
                return Err(GraphParseError::DuplicateNode(node.id));
            }
            nodes.insert(node.id.clone(), node);
        }

        let mut outgoing = Adjacency::new();
        let mut incoming = Adjacency::new();

        for edge in &definition.edges {
            let missing = [&edge.from, &edge.to].into_iter().find(|id| !nodes.contains_key(*id));
            if let Some(missing) = missing {
                return Err(GraphParseError::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    missing: missing.clone(),
                });
            }

            link(&mut outgoing, &mut incoming, &edge.from, &edge.to, edge.kind);
            if edge.direction == EdgeDirection::Both {
                link(&mut outgoing, &mut incoming, &edge.to, &edge.from, edge.kind);
            }
        }

        Ok(Self {
            nodes,
            edges: definition.edges,
            outgoing,
            incoming,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, GraphParseError> {
        let definition: GraphDefinition = serde_json::from_str(json)?;
        Self::from_definition(definition)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphParseError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| GraphParseError::Malformed(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    /// Definition that reloads into an equivalent graph.
    pub fn to_definition(&self) -> GraphDefinition {
        GraphDefinition {
            resources: self.nodes.values().cloned().collect(),
            edges: self.edges.clone(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_definition())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resources `resource` depends on, optionally restricted to one edge kind.
    pub fn neighbors(&self, resource: &str, kind: Option<DependencyKind>) -> Vec<&ResourceNode> {
        self.adjacent(&self.outgoing, resource, kind)
    }

    /// Resources that depend on `resource`.
    pub fn dependents(&self, resource: &str, kind: Option<DependencyKind>) -> Vec<&ResourceNode> {
        self.adjacent(&self.incoming, resource, kind)
    }

    /// Number of distinct resources depending on `resource`.
    pub fn fan_in(&self, resource: &str) -> usize {
        self.dependents(resource, None).len()
    }

    /// True when `to` is reachable from `from` along dependency edges.
    pub fn path_exists(&self, from: &str, to: &str) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }
        if from == to {
            return true;
        }

        let mut visited = BTreeSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            for (next, _) in self.outgoing.get(current).into_iter().flatten() {
                if next == to {
                    return true;
                }
                if visited.insert(next.as_str()) {
                    queue.push_back(next.as_str());
                }
            }
        }
        false
    }

    /// Path in either direction.
    pub fn are_linked(&self, a: &str, b: &str) -> bool {
        self.path_exists(a, b) || self.path_exists(b, a)
    }

    /// True when a direct edge joins `a` and `b` in either direction.
    pub fn adjacent_to(&self, a: &str, b: &str) -> bool {
        let direct = |x: &str, y: &str| {
            self.outgoing
                .get(x)
                .is_some_and(|deps| deps.iter().any(|(id, _)| id == y))
        };
        direct(a, b) || direct(b, a)
    }

    /// Dependency closure of `resource` within `max_hops`, with hop distances.
    /// The resource itself is included at distance 0.
    pub fn closure(&self, resource: &str, max_hops: usize) -> BTreeMap<String, usize> {
        let mut distances = BTreeMap::new();
        if !self.contains(resource) {
            return distances;
        }

        distances.insert(resource.to_string(), 0);
        let mut queue = VecDeque::from([(resource.to_string(), 0usize)]);
        while let Some((current, depth)) = queue.pop_front() {
            if depth == max_hops {
                continue;
            }
            for (next, _) in self.outgoing.get(&current).into_iter().flatten() {
                if !distances.contains_key(next) {
                    distances.insert(next.clone(), depth + 1);
                    queue.push_back((next.clone(), depth + 1));
                }
            }
        }
        distances
    }

    fn adjacent(&self, adjacency: &Adjacency, resource: &str, kind: Option<DependencyKind>) -> Vec<&ResourceNode> {
        let ids: BTreeSet<&str> = adjacency
            .get(resource)
            .into_iter()
            .flatten()
            .filter(|(_, k)| kind.map_or(true, |wanted| *k == wanted))
            .map(|(id, _)| id.as_str())
            .collect();
        ids.into_iter().filter_map(|id| self.nodes.get(id)).collect()
    }
}

fn link(outgoing: &mut Adjacency, incoming: &mut Adjacency, from: &str, to: &str, kind: DependencyKind) {
    outgoing.entry(from.to_string()).or_default().push((to.to_string(), kind));
    incoming.entry(to.to_string()).or_default().push((from.to_string(), kind));
}
