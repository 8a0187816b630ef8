//! Dependency graph analysis: cycle detection and parallel wave computation.
//!
//! Uses `petgraph` to model step dependencies as a directed graph with an edge
//! from each step to every step it depends on. A depth-first walk reports the
//! first back-edge as a concrete cycle path, and depth-based grouping produces
//! the waves a DAG-mode run would dispatch if every step took equal time.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Control, DfsEvent, depth_first_search};

use super::Plan;

/// Directed "depends on" graph over step IDs.
struct DependencyGraph<'a> {
    graph: DiGraph<&'a str, ()>,
}

impl<'a> DependencyGraph<'a> {
    /// Build from `(step_id, dependencies)` pairs. Unknown dependency IDs are
    /// ignored here; validation reports them before graph analysis runs.
    fn build(steps: &[(&'a str, &'a [String])]) -> Self {
        let mut graph = DiGraph::<&str, ()>::new();
        let nodes: HashMap<&str, NodeIndex> = steps
            .iter()
            .map(|(id, _)| (*id, graph.add_node(*id)))
            .collect();

        for (id, deps) in steps {
            let from = nodes[id];
            for dep in deps.iter() {
                if let Some(&to) = nodes.get(dep.as_str()) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self { graph }
    }

    /// Depth-first walk; the first back-edge closes a cycle.
    ///
    /// The returned path starts and ends with the same step ID, e.g.
    /// `["a", "b", "c", "a"]` when a depends on b, b on c, and c on a.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let graph = &self.graph;
        let mut stack: Vec<NodeIndex> = Vec::new();

        let control = depth_first_search(graph, graph.node_indices(), |event| match event {
            DfsEvent::Discover(node, _) => {
                stack.push(node);
                Control::Continue
            }
            DfsEvent::Finish(_, _) => {
                stack.pop();
                Control::Continue
            }
            DfsEvent::BackEdge(_, target) => {
                let start = stack.iter().position(|&n| n == target).unwrap_or(0);
                let mut cycle: Vec<String> =
                    stack[start..].iter().map(|&n| graph[n].to_string()).collect();
                cycle.push(graph[target].to_string());
                Control::Break(cycle)
            }
            _ => Control::Continue,
        });

        control.break_value()
    }
}

/// Find a dependency cycle among the given steps, if any.
pub fn find_cycle(steps: &[(&str, &[String])]) -> Option<Vec<String>> {
    DependencyGraph::build(steps).find_cycle()
}

/// Group a validated plan's steps into parallel waves.
///
/// Wave 0 holds steps without dependencies; every other step sits one wave
/// after its deepest dependency. Step order within a wave follows plan order.
pub fn execution_waves(plan: &Plan) -> Vec<Vec<&str>> {
    if plan.is_empty() {
        return vec![];
    }

    let pairs: Vec<(&str, &[String])> = plan
        .steps()
        .iter()
        .map(|s| (s.id(), s.dependencies.as_slice()))
        .collect();
    let dag = DependencyGraph::build(&pairs);

    // Edges point at dependencies, so reverse topological order visits every
    // dependency before its dependents. A validated plan is acyclic; fall back
    // to plan order if that invariant is ever broken.
    let order: Vec<&str> = match toposort(&dag.graph, None) {
        Ok(sorted) => sorted.into_iter().rev().map(|n| dag.graph[n]).collect(),
        Err(_) => plan.steps().iter().map(|s| s.id()).collect(),
    };

    let mut depths: HashMap<&str, usize> = HashMap::new();
    for id in order {
        let depth = plan
            .step(id)
            .map(|s| {
                s.dependencies
                    .iter()
                    .map(|dep| depths.get(dep.as_str()).copied().unwrap_or(0) + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        depths.insert(id, depth);
    }

    let max_depth = depths.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<&str>> = vec![vec![]; max_depth + 1];
    for step in plan.steps() {
        waves[depths[step.id()]].push(step.id());
    }

    waves
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
