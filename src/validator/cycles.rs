//! Pass C: cycle detection over `input` edges.
//!
//! Runs Kahn's algorithm over each sibling scope: the top level and every
//! control-flow container's child list, the same scopes the planner
//! schedules. When nodes remain after the queue drains, a DFS over the
//! remainder recovers one concrete cycle path for the error message.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

use crate::ast::{NodeAst, WorkflowAst};

use super::{ValidationErrorKind, ValidationIssue};

pub(super) fn run(ast: &WorkflowAst, errors: &mut Vec<ValidationIssue>) {
    for cycle in detect(ast) {
        let message = cycle.join(" -> ");
        // Report at the cycle's first node.
        let loc = cycle
            .first()
            .and_then(|id| ast.find_node(id))
            .map(|n| n.loc);
        let mut issue = ValidationIssue::new(
            ValidationErrorKind::CircularDependency,
            format!("circular dependency: {message}"),
        )
        .with_hint("Break the cycle by removing one of the `input` references.");
        if let Some(loc) = loc {
            issue = issue.at(loc);
        }
        errors.push(issue);
    }
}

/// All cycles, one representative path each, across every sibling scope.
pub(super) fn detect(ast: &WorkflowAst) -> Vec<Vec<String>> {
    let mut cycles = Vec::new();
    detect_in_scope(&ast.nodes, &mut cycles);
    cycles
}

fn detect_in_scope(nodes: &[NodeAst], cycles: &mut Vec<Vec<String>>) {
    scope_cycle(nodes, cycles);
    for node in nodes {
        let children = node.body.children();
        if !children.is_empty() {
            // Children form their own scheduling scope.
            let owned: Vec<NodeAst> = children.into_iter().cloned().collect();
            detect_in_scope(&owned, cycles);
        }
    }
}

/// Kahn over one sibling scope; remaining nodes betray a cycle.
fn scope_cycle(nodes: &[NodeAst], cycles: &mut Vec<Vec<String>>) {
    let ids: FxHashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    // edge A -> B iff B.input == A, restricted to this scope.
    let mut dependents: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
    for node in nodes {
        in_degree.entry(node.id.as_str()).or_insert(0);
        if let Some(input) = node.input.as_deref()
            && ids.contains(input)
        {
            dependents.entry(input).or_default().push(node.id.as_str());
            *in_degree.entry(node.id.as_str()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();
    let mut visited = 0;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        for dependent in dependents.get(id).into_iter().flatten() {
            let degree = in_degree.get_mut(dependent).expect("known node");
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if visited == nodes.len() {
        return;
    }

    // Recover one concrete path through the remainder by following input
    // edges until a node repeats.
    let remaining: FxHashSet<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d > 0)
        .map(|(id, _)| *id)
        .collect();
    let inputs: FxHashMap<&str, &str> = nodes
        .iter()
        .filter_map(|n| n.input.as_deref().map(|i| (n.id.as_str(), i)))
        .collect();

    let Some(start) = nodes
        .iter()
        .map(|n| n.id.as_str())
        .find(|id| remaining.contains(id))
    else {
        return;
    };

    let mut path = vec![start];
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    seen.insert(start);
    let mut cursor = start;
    while let Some(&next) = inputs.get(cursor) {
        path.push(next);
        if seen.contains(next) {
            // Trim the lead-in so the path starts and ends on the repeat.
            let first = path.iter().position(|id| *id == next).expect("repeat in path");
            let cycle: Vec<String> = path[first..].iter().map(|s| (*s).to_string()).collect();
            let mut cycle = cycle;
            cycle.reverse();
            cycles.push(cycle);
            return;
        }
        seen.insert(next);
        cursor = next;
    }
}
