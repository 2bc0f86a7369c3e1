//! Topological planning: validated AST → dependency-ordered waves.
//!
//! Only the top-level sibling structure is scheduled here; control-flow
//! containers interpret their own children at execution time. A node with
//! `input = X` depends on `X`. Kahn's algorithm groups nodes whose
//! dependencies are satisfied by earlier waves, so every wave can dispatch
//! concurrently. Ties within a wave keep source order.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ast::{NodeAst, WorkflowAst};

/// One dispatch unit: the nodes whose dependencies are satisfied by all
/// earlier waves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wave {
    pub wave_number: usize,
    pub node_ids: Vec<String>,
}

/// The executable plan for one workflow.
#[derive(Clone, Debug)]
pub struct ExecutionPlan {
    pub workflow_id: String,
    pub total_nodes: usize,
    /// Top-level nodes by id.
    pub nodes: FxHashMap<String, NodeAst>,
    pub waves: Vec<Wave>,
}

impl ExecutionPlan {
    /// The wave index a node was scheduled into.
    #[must_use]
    pub fn wave_of(&self, node_id: &str) -> Option<usize> {
        self.waves
            .iter()
            .find(|w| w.node_ids.iter().any(|id| id == node_id))
            .map(|w| w.wave_number)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum PlanError {
    /// The `input` graph still contains a cycle; validation should have
    /// rejected this document.
    #[error("cannot plan `{workflow_id}`: unresolved dependencies among {remaining:?}")]
    #[diagnostic(
        code(flowscript::planner::cycle),
        help("Run validation first; `detect_cycles` names the offending path.")
    )]
    Cyclic {
        workflow_id: String,
        remaining: Vec<String>,
    },
}

/// Plan a validated workflow into waves.
pub fn plan(ast: &WorkflowAst) -> Result<ExecutionPlan, PlanError> {
    let waves = plan_waves(&ast.nodes).map_err(|remaining| PlanError::Cyclic {
        workflow_id: ast.metadata.name.clone(),
        remaining,
    })?;
    let nodes: FxHashMap<String, NodeAst> = ast
        .nodes
        .iter()
        .map(|n| (n.id.clone(), n.clone()))
        .collect();
    Ok(ExecutionPlan {
        workflow_id: ast.metadata.name.clone(),
        total_nodes: nodes.len(),
        nodes,
        waves,
    })
}

/// Kahn level assignment over one sibling slice. `Err` carries the ids
/// left unscheduled (the cycle participants).
pub(crate) fn plan_waves(nodes: &[NodeAst]) -> Result<Vec<Wave>, Vec<String>> {
    let ids: FxHashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    // dependency edges within this scope only; an `input` naming a node
    // outside the scope is satisfied before the scope starts.
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        if let Some(dep) = node.input.as_deref().and_then(|d| ids.get(d)) {
            dependents[*dep].push(i);
            in_degree[i] += 1;
        }
    }

    let mut waves = Vec::new();
    // Source order within the frontier keeps ties deterministic.
    let mut frontier: Vec<usize> = (0..nodes.len()).filter(|i| in_degree[*i] == 0).collect();
    let mut scheduled = 0;

    while !frontier.is_empty() {
        let wave_ids: Vec<String> = frontier.iter().map(|i| nodes[*i].id.clone()).collect();
        scheduled += frontier.len();

        let mut next: Vec<usize> = Vec::new();
        for i in &frontier {
            for dependent in &dependents[*i] {
                in_degree[*dependent] -= 1;
                if in_degree[*dependent] == 0 {
                    next.push(*dependent);
                }
            }
        }
        next.sort_unstable();

        waves.push(Wave {
            wave_number: waves.len(),
            node_ids: wave_ids,
        });
        frontier = next;
    }

    if scheduled != nodes.len() {
        let remaining: Vec<String> = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, n)| n.id.clone())
            .collect();
        return Err(remaining);
    }
    Ok(waves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_workflow;

    fn ast_for(body: &str) -> WorkflowAst {
        let doc = format!("---\nname: planner-test\nversion: 1.0\n---\n{body}\n");
        parse_workflow(&doc, "t.flow.md").unwrap()
    }

    #[test]
    fn independent_nodes_share_a_wave() {
        let ast = ast_for(
            r#"<source id="a" type="http" url="x"/>
               <source id="b" type="file" path="y"/>"#,
        );
        let plan = plan(&ast).unwrap();
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.waves[0].node_ids, vec!["a", "b"]);
    }

    #[test]
    fn chain_produces_one_wave_per_node() {
        let ast = ast_for(
            r#"<source id="A" type="http" url="x"/>
               <transform id="B" type="template" input="A"><template>t</template></transform>
               <sink id="C" type="http" input="B" url="y"/>"#,
        );
        let plan = plan(&ast).unwrap();
        let waves: Vec<Vec<String>> = plan.waves.iter().map(|w| w.node_ids.clone()).collect();
        assert_eq!(waves, vec![vec!["A"], vec!["B"], vec!["C"]]);
        assert!(plan.wave_of("A").unwrap() < plan.wave_of("B").unwrap());
        assert!(plan.wave_of("B").unwrap() < plan.wave_of("C").unwrap());
    }

    #[test]
    fn diamond_joins_in_final_wave() {
        let ast = ast_for(
            r#"<source id="root" type="http" url="x"/>
               <transform id="left" type="template" input="root"><template>l</template></transform>
               <transform id="right" type="template" input="root"><template>r</template></transform>
               <sink id="join" type="file" input="left" path="out"/>"#,
        );
        let plan = plan(&ast).unwrap();
        assert_eq!(plan.waves.len(), 3);
        assert_eq!(plan.waves[1].node_ids, vec!["left", "right"]);
    }

    #[test]
    fn cycle_fails_planning() {
        let ast = ast_for(
            r#"<transform id="P" type="map" input="Q" expression="1"/>
               <transform id="Q" type="map" input="P" expression="1"/>"#,
        );
        let err = plan(&ast).unwrap_err();
        match err {
            PlanError::Cyclic { remaining, .. } => {
                assert_eq!(remaining.len(), 2);
            }
        }
    }

    #[test]
    fn every_node_appears_in_exactly_one_wave() {
        let ast = ast_for(
            r#"<source id="a" type="http" url="x"/>
               <transform id="b" type="template" input="a"><template>t</template></transform>
               <source id="c" type="file" path="z"/>"#,
        );
        let plan = plan(&ast).unwrap();
        let mut seen: Vec<&String> = plan.waves.iter().flat_map(|w| &w.node_ids).collect();
        seen.sort();
        assert_eq!(seen.len(), 3);
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }
}
