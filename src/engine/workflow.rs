//! Workflow Builder: groups an event's tasks into dependency components.
//!
//! Every instantiated task gets a workflow, including isolated ones, which
//! get a single-member workflow of their own.

use super::error::{EngineError, EngineResult};
use super::graph::GraphStore;
use super::instantiate::InstanceMap;
use super::repo::{TaskRepo, WorkflowRepo};
use super::types::{TaskEdge, TaskStatus, WorkflowTask};
use petgraph::graphmap::{DiGraphMap, UnGraphMap};
use petgraph::visit::Bfs;
use petgraph::Direction;
use rusqlite::Connection;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use tracing::{debug, info};

/// One connected component, ordered, before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentPlan {
    /// `(task_id, recorded prerequisite)` in topological order.
    pub order: Vec<(i64, Option<i64>)>,
    pub edges: Vec<TaskEdge>,
}

/// A persisted workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowPlan {
    pub workflow_id: i64,
    pub members: Vec<WorkflowTask>,
    pub edges: Vec<TaskEdge>,
}

/// Instance-level edges: `t -> p` whenever `template(t)` requires `template(p)`.
pub fn instance_edges<G: GraphStore>(graph: &G, instances: &InstanceMap) -> BTreeSet<TaskEdge> {
    let mut by_template: HashMap<i64, Vec<i64>> = HashMap::new();
    for (&(_, template_id), &task_id) in instances {
        by_template.entry(template_id).or_default().push(task_id);
    }

    let mut edges = BTreeSet::new();
    for (&(_, template_id), &task_id) in instances {
        for prerequisite in graph.prerequisites_of(template_id) {
            for &prerequisite_task_id in by_template.get(&prerequisite).into_iter().flatten() {
                if prerequisite_task_id != task_id {
                    edges.insert(TaskEdge {
                        task_id,
                        prerequisite_task_id,
                    });
                }
            }
        }
    }
    edges
}

/// Partitions tasks into components and orders each one.
///
/// Components are listed by their lowest task id. Within a component, ties
/// in Kahn's algorithm go to the lowest task id.
///
/// # Errors
/// Returns `CycleDetected` if some component cannot be fully ordered.
pub fn plan_components(
    tasks: &BTreeSet<i64>,
    edges: &BTreeSet<TaskEdge>,
) -> EngineResult<Vec<ComponentPlan>> {
    // blocker -> blocked
    let mut directed: DiGraphMap<i64, ()> = DiGraphMap::new();
    let mut undirected: UnGraphMap<i64, ()> = UnGraphMap::new();
    for &task in tasks {
        directed.add_node(task);
        undirected.add_node(task);
    }
    for edge in edges {
        directed.add_edge(edge.prerequisite_task_id, edge.task_id, ());
        undirected.add_edge(edge.prerequisite_task_id, edge.task_id, ());
    }

    let mut seen = HashSet::new();
    let mut plans = Vec::new();
    for &start in tasks {
        if seen.contains(&start) {
            continue;
        }
        let mut members = BTreeSet::new();
        let mut bfs = Bfs::new(&undirected, start);
        while let Some(node) = bfs.next(&undirected) {
            seen.insert(node);
            members.insert(node);
        }

        let order = topological_order(&directed, &members)?;
        let component_edges = edges
            .iter()
            .filter(|e| members.contains(&e.task_id))
            .copied()
            .collect();
        plans.push(ComponentPlan {
            order,
            edges: component_edges,
        });
    }
    Ok(plans)
}

/// Kahn peeling over one component.
fn topological_order(
    directed: &DiGraphMap<i64, ()>,
    members: &BTreeSet<i64>,
) -> EngineResult<Vec<(i64, Option<i64>)>> {
    let mut in_degree: HashMap<i64, usize> = members
        .iter()
        .map(|&n| (n, directed.neighbors_directed(n, Direction::Incoming).count()))
        .collect();

    let mut ready: BinaryHeap<Reverse<i64>> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&n, _)| Reverse(n))
        .collect();

    let mut order = Vec::with_capacity(members.len());
    while let Some(Reverse(node)) = ready.pop() {
        let recorded = directed
            .neighbors_directed(node, Direction::Incoming)
            .min();
        order.push((node, recorded));

        for next in directed.neighbors_directed(node, Direction::Outgoing) {
            if let Some(degree) = in_degree.get_mut(&next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
    }

    if order.len() < members.len() {
        let placed: HashSet<i64> = order.iter().map(|&(n, _)| n).collect();
        let stuck: Vec<i64> = members
            .iter()
            .copied()
            .filter(|n| !placed.contains(n))
            .collect();
        return Err(EngineError::cycle_from_ids(&stuck));
    }
    Ok(order)
}

pub struct WorkflowBuilder<'a, G: GraphStore> {
    conn: &'a Connection,
    graph: &'a G,
}

impl<'a, G: GraphStore> WorkflowBuilder<'a, G> {
    #[must_use]
    pub fn new(conn: &'a Connection, graph: &'a G) -> Self {
        Self { conn, graph }
    }

    /// Builds and persists the workflows of one event, setting initial statuses.
    ///
    /// Run inside the same transaction as instantiation.
    ///
    /// # Errors
    /// Returns `AlreadyBuilt`, `NotFound` for a task outside the event, or
    /// `CycleDetected`.
    pub fn build(&self, event_id: i64, instances: &InstanceMap) -> EngineResult<Vec<WorkflowPlan>> {
        let workflows = WorkflowRepo::new(self.conn);
        if workflows.count_for_event(event_id)? > 0 {
            return Err(EngineError::AlreadyBuilt { event_id });
        }

        let tasks = TaskRepo::new(self.conn);
        for &task_id in instances.values() {
            if tasks.get(task_id)?.event_id != event_id {
                return Err(EngineError::not_found("task in event", task_id));
            }
        }

        let task_ids: BTreeSet<i64> = instances.values().copied().collect();
        let edges = instance_edges(self.graph, instances);
        let components = plan_components(&task_ids, &edges)?;

        let mut plans = Vec::with_capacity(components.len());
        for component in components {
            let workflow_id = workflows.create(event_id)?;
            let mut members = Vec::with_capacity(component.order.len());

            for (order_index, &(task_id, prerequisite_task_id)) in
                component.order.iter().enumerate()
            {
                let member = WorkflowTask {
                    workflow_id,
                    task_id,
                    prerequisite_task_id,
                    order_index,
                };
                workflows.add_member(&member)?;

                let status = if prerequisite_task_id.is_some() {
                    TaskStatus::Waiting
                } else {
                    TaskStatus::Pending
                };
                tasks.update_status(task_id, status)?;
                members.push(member);
            }
            for &edge in &component.edges {
                workflows.add_edge(workflow_id, edge)?;
            }

            debug!(event_id, workflow_id, tasks = members.len(), "workflow created");
            plans.push(WorkflowPlan {
                workflow_id,
                members,
                edges: component.edges,
            });
        }

        info!(event_id, workflows = plans.len(), "workflows built");
        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::tests::{chain, node};
    use crate::engine::graph::TemplateGraph;

    fn edge(task_id: i64, prerequisite_task_id: i64) -> TaskEdge {
        TaskEdge {
            task_id,
            prerequisite_task_id,
        }
    }

    fn index_of(plan: &ComponentPlan, task: i64) -> usize {
        plan.order.iter().position(|&(t, _)| t == task).unwrap()
    }

    #[test]
    fn test_instance_edges_follow_template_edges() {
        let g = chain();
        // Tasks 100, 101, 102 stamped from templates 1, 2, 3.
        let instances = InstanceMap::from([((10, 1), 100), ((10, 2), 101), ((20, 3), 102)]);
        let edges = instance_edges(&g, &instances);
        assert_eq!(edges, BTreeSet::from([edge(101, 100), edge(102, 101)]));
    }

    #[test]
    fn test_missing_prerequisite_instance_leaves_no_edge() {
        let g = chain();
        let instances = InstanceMap::from([((20, 3), 102)]);
        assert!(instance_edges(&g, &instances).is_empty());
    }

    #[test]
    fn test_chain_is_one_ordered_component() {
        let tasks = BTreeSet::from([100, 101, 102]);
        let edges = BTreeSet::from([edge(101, 100), edge(102, 101)]);
        let plans = plan_components(&tasks, &edges).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(
            plans[0].order,
            vec![(100, None), (101, Some(100)), (102, Some(101))]
        );
    }

    #[test]
    fn test_components_and_isolated_tasks() {
        // 1 <- 2, 3 alone, 5 <- 4 (dependent has the lower id)
        let tasks = BTreeSet::from([1, 2, 3, 4, 5]);
        let edges = BTreeSet::from([edge(2, 1), edge(4, 5)]);
        let plans = plan_components(&tasks, &edges).unwrap();

        let orders: Vec<_> = plans.iter().map(|p| p.order.clone()).collect();
        assert_eq!(
            orders,
            vec![
                vec![(1, None), (2, Some(1))],
                vec![(3, None)],
                vec![(5, None), (4, Some(5))],
            ]
        );

        let mut all: Vec<i64> = plans
            .iter()
            .flat_map(|p| p.order.iter().map(|&(t, _)| t))
            .collect();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_multiple_prerequisites_record_lowest_and_order_strictly() {
        // Diamond: 4 needs 2 and 3, both need 1; 6 needs 4 and 5.
        let tasks: BTreeSet<i64> = (1..=6).collect();
        let edges = BTreeSet::from([
            edge(2, 1),
            edge(3, 1),
            edge(4, 3),
            edge(4, 2),
            edge(6, 4),
            edge(6, 5),
        ]);
        let plans = plan_components(&tasks, &edges).unwrap();
        assert_eq!(plans.len(), 1);
        let plan = &plans[0];

        for e in &edges {
            assert!(index_of(plan, e.prerequisite_task_id) < index_of(plan, e.task_id));
        }
        let recorded: HashMap<i64, Option<i64>> = plan.order.iter().copied().collect();
        assert_eq!(recorded[&4], Some(2));
        assert_eq!(recorded[&6], Some(4));
        assert_eq!(recorded[&5], None);
        assert_eq!(plan.edges.len(), 6);
    }

    #[test]
    fn test_cycle_is_reported() {
        let tasks = BTreeSet::from([1, 2, 3]);
        let edges = BTreeSet::from([edge(1, 2), edge(2, 1)]);
        let err = plan_components(&tasks, &edges).unwrap_err();
        match err {
            EngineError::CycleDetected { path } => assert_eq!(path, "1 -> 2"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_template_in_two_departments_both_wired() {
        let g = TemplateGraph::from_parts([node(1, 10), node(2, 10)], [(2, 1)]);
        let instances = InstanceMap::from([((10, 1), 50), ((10, 2), 51), ((30, 2), 52)]);
        let edges = instance_edges(&g, &instances);
        assert_eq!(edges, BTreeSet::from([edge(51, 50), edge(52, 50)]));
    }
}
