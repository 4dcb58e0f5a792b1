//! Template Graph: read-only view over templates and prerequisite edges.
//!
//! Edges are stored blocker -> blocked, i.e. `prerequisite -> template`, so
//! `Incoming` neighbours of a template are its prerequisites.

use super::error::{EngineError, EngineResult};
use petgraph::algo::{is_cyclic_directed, kosaraju_scc};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Lookups the engine needs from whatever stores templates.
pub trait GraphStore {
    /// Direct prerequisites of a template.
    fn prerequisites_of(&self, template_id: i64) -> BTreeSet<i64>;

    fn template_exists(&self, template_id: i64) -> bool;

    fn department_of(&self, template_id: i64) -> Option<i64>;

    /// Templates a department has flagged for automatic selection.
    fn default_templates(&self, department_id: i64) -> BTreeSet<i64>;
}

/// One template as seen by the graph: its id, owning department and default flag.
#[derive(Debug, Clone, Copy)]
pub struct TemplateNode {
    pub id: i64,
    pub department_id: i64,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateGraph {
    graph: DiGraphMap<i64, ()>,
    nodes: HashMap<i64, TemplateNode>,
}

impl TemplateGraph {
    /// Loads every template and prerequisite edge from the database.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub fn load(conn: &Connection) -> EngineResult<Self> {
        let mut stmt = conn.prepare("SELECT id, department_id, is_default FROM templates")?;
        let nodes = stmt
            .query_map([], |r| {
                Ok(TemplateNode {
                    id: r.get(0)?,
                    department_id: r.get(1)?,
                    is_default: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt =
            conn.prepare("SELECT template_id, prerequisite_id FROM template_prerequisites")?;
        let edges = stmt
            .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_parts(nodes, edges))
    }

    /// Builds a graph from nodes and `(template, prerequisite)` pairs.
    ///
    /// Edges naming an unknown template are dropped.
    pub fn from_parts(
        nodes: impl IntoIterator<Item = TemplateNode>,
        edges: impl IntoIterator<Item = (i64, i64)>,
    ) -> Self {
        let mut graph = DiGraphMap::new();
        let mut map = HashMap::new();
        for node in nodes {
            graph.add_node(node.id);
            map.insert(node.id, node);
        }
        for (template, prerequisite) in edges {
            if map.contains_key(&template) && map.contains_key(&prerequisite) {
                graph.add_edge(prerequisite, template, ());
            }
        }
        Self { graph, nodes: map }
    }

    /// Templates that directly require the given one.
    #[must_use]
    pub fn dependents_of(&self, template_id: i64) -> BTreeSet<i64> {
        if !self.graph.contains_node(template_id) {
            return BTreeSet::new();
        }
        self.graph
            .neighbors_directed(template_id, Direction::Outgoing)
            .collect()
    }

    /// All `(template, prerequisite)` pairs, sorted.
    #[must_use]
    pub fn edges(&self) -> Vec<(i64, i64)> {
        let mut edges: Vec<_> = self
            .graph
            .all_edges()
            .map(|(prerequisite, template, _)| (template, prerequisite))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Detects if making `template` require `prerequisite` would create a cycle.
    #[must_use]
    pub fn would_create_cycle(&self, template: i64, prerequisite: i64) -> bool {
        let mut test = self.graph.clone();
        test.add_edge(prerequisite, template, ());
        is_cyclic_directed(&test)
    }

    /// Checks a proposed edge and explains the cycle it would close.
    ///
    /// # Errors
    /// Returns `SelfPrerequisite` or `CycleDetected`.
    pub fn check_new_edge(&self, template: i64, prerequisite: i64) -> EngineResult<()> {
        if template == prerequisite {
            return Err(EngineError::SelfPrerequisite {
                template_id: template,
            });
        }
        if !self.would_create_cycle(template, prerequisite) {
            return Ok(());
        }
        // `template` already blocks `prerequisite` through some chain.
        let mut path = self
            .blocking_path(template, prerequisite)
            .unwrap_or_else(|| vec![template, prerequisite]);
        path.push(template);
        Err(EngineError::cycle_from_ids(&path))
    }

    /// Returns the members of some cycle in the stored edges, if one exists.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<i64>> {
        kosaraju_scc(&self.graph)
            .into_iter()
            .find(|scc| scc.len() > 1)
            .map(|mut scc| {
                scc.sort_unstable();
                scc
            })
    }

    /// Shortest chain `from -> ... -> to` following blocker -> blocked edges.
    fn blocking_path(&self, from: i64, to: i64) -> Option<Vec<i64>> {
        if !self.graph.contains_node(from) {
            return None;
        }
        let mut parent: HashMap<i64, i64> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut path = vec![to];
                let mut cur = to;
                while let Some(&p) = parent.get(&cur) {
                    path.push(p);
                    cur = p;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if next != from && !parent.contains_key(&next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        None
    }
}

impl GraphStore for TemplateGraph {
    fn prerequisites_of(&self, template_id: i64) -> BTreeSet<i64> {
        if !self.graph.contains_node(template_id) {
            return BTreeSet::new();
        }
        self.graph
            .neighbors_directed(template_id, Direction::Incoming)
            .collect()
    }

    fn template_exists(&self, template_id: i64) -> bool {
        self.nodes.contains_key(&template_id)
    }

    fn department_of(&self, template_id: i64) -> Option<i64> {
        self.nodes.get(&template_id).map(|n| n.department_id)
    }

    fn default_templates(&self, department_id: i64) -> BTreeSet<i64> {
        self.nodes
            .values()
            .filter(|n| n.department_id == department_id && n.is_default)
            .map(|n| n.id)
            .collect()
    }
}
