//! Prerequisite Resolver: transitive closure of a template selection.
//!
//! The visited set only grows, so stored cycles cannot make resolution loop.
//! Rejecting cycles is the job of `TemplateGraph::check_new_edge` at
//! authoring time, not of this module.

use super::error::{EngineError, EngineResult};
use super::graph::GraphStore;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};

/// Outcome of resolving a selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// The request plus every transitive prerequisite.
    pub all_templates: BTreeSet<i64>,
    /// Templates pulled in that were not requested.
    pub added_beyond_request: BTreeSet<i64>,
}

impl Resolution {
    /// True when the selection is already closed under prerequisites.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.added_beyond_request.is_empty()
    }
}

pub struct PrerequisiteResolver<'g, G: GraphStore> {
    graph: &'g G,
}

impl<'g, G: GraphStore> PrerequisiteResolver<'g, G> {
    #[must_use]
    pub fn new(graph: &'g G) -> Self {
        Self { graph }
    }

    /// Computes every template required to satisfy `requested`.
    ///
    /// # Errors
    /// Returns `NotFound` for the first unknown requested id.
    pub fn resolve(&self, requested: impl IntoIterator<Item = i64>) -> EngineResult<Resolution> {
        let requested: BTreeSet<i64> = requested.into_iter().collect();
        if let Some(&missing) = requested
            .iter()
            .find(|&&id| !self.graph.template_exists(id))
        {
            return Err(EngineError::not_found("template", missing));
        }

        let mut visited = requested.clone();
        let mut queue: VecDeque<i64> = requested.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            for prerequisite in self.graph.prerequisites_of(id) {
                if visited.insert(prerequisite) {
                    queue.push_back(prerequisite);
                }
            }
        }

        let added_beyond_request = visited.difference(&requested).copied().collect();
        Ok(Resolution {
            all_templates: visited,
            added_beyond_request,
        })
    }

    /// Resolves the defaults a department gets when it is first chosen.
    ///
    /// # Errors
    /// Propagates `resolve` errors.
    pub fn resolve_defaults(&self, department_id: i64) -> EngineResult<Resolution> {
        self.resolve(self.graph.default_templates(department_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::tests::{chain, node};
    use crate::engine::graph::{TemplateGraph, TemplateNode};

    #[test]
    fn test_chain_pulls_cross_department_prerequisites() {
        let g = chain();
        let res = PrerequisiteResolver::new(&g).resolve([3]).unwrap();
        assert_eq!(res.all_templates, BTreeSet::from([1, 2, 3]));
        assert_eq!(res.added_beyond_request, BTreeSet::from([1, 2]));
        assert!(!res.is_satisfied());
    }

    #[test]
    fn test_root_template_adds_nothing() {
        let g = chain();
        let res = PrerequisiteResolver::new(&g).resolve([1]).unwrap();
        assert_eq!(res.all_templates, BTreeSet::from([1]));
        assert!(res.is_satisfied());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let g = TemplateGraph::from_parts(
            (1..=6).map(|id| node(id, 10)),
            [(2, 1), (3, 1), (4, 2), (4, 3), (6, 5)],
        );
        let resolver = PrerequisiteResolver::new(&g);
        let first = resolver.resolve([4, 6]).unwrap();
        assert_eq!(first.all_templates, BTreeSet::from([1, 2, 3, 4, 5, 6]));

        let again = resolver.resolve(first.all_templates.clone()).unwrap();
        assert_eq!(again.all_templates, first.all_templates);
        assert!(again.added_beyond_request.is_empty());
    }

    #[test]
    fn test_closure_matches_reachability() {
        // Diamond plus an unrelated island.
        let g = TemplateGraph::from_parts(
            (1..=7).map(|id| node(id, 10)),
            [(2, 1), (3, 1), (4, 2), (4, 3), (7, 6)],
        );
        let resolver = PrerequisiteResolver::new(&g);
        for (start, expected) in [
            (4, vec![1, 2, 3, 4]),
            (3, vec![1, 3]),
            (5, vec![5]),
            (7, vec![6, 7]),
        ] {
            let res = resolver.resolve([start]).unwrap();
            assert_eq!(res.all_templates, expected.into_iter().collect());
        }
    }

    #[test]
    fn test_unknown_template_fails_whole_request() {
        let g = chain();
        let err = PrerequisiteResolver::new(&g).resolve([3, 42]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::NotFound {
                kind: "template",
                id: 42
            }
        ));
    }

    #[test]
    fn test_cyclic_data_still_terminates() {
        let g = TemplateGraph::from_parts(
            [node(1, 10), node(2, 10), node(3, 10)],
            [(1, 2), (2, 3), (3, 1)],
        );
        let res = PrerequisiteResolver::new(&g).resolve([1]).unwrap();
        assert_eq!(res.all_templates, BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn test_defaults_resolve_with_their_prerequisites() {
        let g = TemplateGraph::from_parts(
            [
                node(1, 10),
                TemplateNode {
                    id: 2,
                    department_id: 20,
                    is_default: true,
                },
            ],
            [(2, 1)],
        );
        let res = PrerequisiteResolver::new(&g).resolve_defaults(20).unwrap();
        assert_eq!(res.all_templates, BTreeSet::from([1, 2]));
        assert_eq!(res.added_beyond_request, BTreeSet::from([1]));
    }
}
