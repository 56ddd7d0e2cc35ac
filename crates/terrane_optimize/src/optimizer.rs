//! Runs the enabled passes in their fixed order with invariant rollback.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use terrane_model::{InvariantViolation, ResourceGraph};
use tracing::{debug, info, warn};

use crate::change::{OptimizationChange, PassKind};
use crate::passes::{HoistLiterals, MergeDuplicates, OptimizationPass, ReduceDependencies};

/// Reason recorded when a pass is rolled back.
pub const INVARIANT_VIOLATION: &str = "invariant violation";

/// Optimizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Enabled passes; they always run in the fixed order regardless of
    /// how they are listed
    pub passes: Vec<PassKind>,

    /// Minimum number of nodes sharing a literal before it is hoisted
    pub hoist_min_nodes: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            passes: PassKind::all(),
            hoist_min_nodes: 2,
        }
    }
}

impl OptimizerConfig {
    pub fn with_passes(mut self, passes: Vec<PassKind>) -> Self {
        self.passes = passes;
        self
    }

    pub fn with_hoist_min_nodes(mut self, min_nodes: usize) -> Self {
        self.hoist_min_nodes = min_nodes;
        self
    }

    pub fn is_enabled(&self, pass: PassKind) -> bool {
        self.passes.contains(&pass)
    }
}

/// Sequential pass runner.
pub struct Optimizer {
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(&OptimizerConfig::default())
    }
}

impl Optimizer {
    pub fn new(config: &OptimizerConfig) -> Self {
        let passes = PassKind::all()
            .into_iter()
            .filter(|pass| config.is_enabled(*pass))
            .map(|pass| -> Box<dyn OptimizationPass> {
                match pass {
                    PassKind::MergeDuplicates => Box::new(MergeDuplicates),
                    PassKind::HoistLiterals => Box::new(HoistLiterals::new(config.hoist_min_nodes)),
                    PassKind::ReduceDependencies => Box::new(ReduceDependencies),
                }
            })
            .collect();
        Self { passes }
    }

    /// Runner over an explicit pass list, in the given order.
    pub fn with_passes(passes: Vec<Box<dyn OptimizationPass>>) -> Self {
        Self { passes }
    }

    pub fn pass_kinds(&self) -> Vec<PassKind> {
        self.passes.iter().map(|p| p.kind()).collect()
    }

    /// Run every pass on a working copy. A pass that fails or leaves a
    /// violation the input did not have is discarded and reported as
    /// skipped.
    pub fn optimize(&self, mut graph: ResourceGraph) -> (ResourceGraph, Vec<OptimizationChange>) {
        let mut log = Vec::new();
        for pass in &self.passes {
            let kind = pass.kind();
            let before: BTreeSet<InvariantViolation> = graph.check_invariants().into_iter().collect();
            let mut working = graph.clone();

            match pass.run(&mut working) {
                Ok(changes) => {
                    let introduced: Vec<InvariantViolation> = working
                        .check_invariants()
                        .into_iter()
                        .filter(|v| !before.contains(v))
                        .collect();
                    if introduced.is_empty() {
                        debug!("Pass {} made {} changes", kind, changes.len());
                        log.extend(changes);
                        graph = working;
                    } else {
                        let detail: Vec<String> = introduced.iter().map(ToString::to_string).collect();
                        warn!("Pass {} rolled back: {}", kind, detail.join("; "));
                        log.push(OptimizationChange::skipped(
                            kind,
                            INVARIANT_VIOLATION,
                            format!("{} changes discarded: {}", changes.len(), detail.join("; ")),
                        ));
                    }
                }
                Err(e) => {
                    warn!("Pass {} failed: {}", kind, e);
                    log.push(OptimizationChange::skipped(kind, e.to_string(), "pass failed; graph left unchanged"));
                }
            }
        }

        info!("Optimization finished: {} changes", log.len());
        (graph, log)
    }
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer")
            .field("passes", &self.pass_kinds())
            .finish()
    }
}

/// Optimize with `passes` enabled and default settings.
pub fn optimize(graph: ResourceGraph, passes: &[PassKind]) -> (ResourceGraph, Vec<OptimizationChange>) {
    Optimizer::new(&OptimizerConfig::default().with_passes(passes.to_vec())).optimize(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeStatus;
    use crate::error::{OptimizeError, OptimizeResult};
    use terrane_model::{Dialect, EdgeKind, EdgeOrigin, ResourceNode};

    /// Adds a second containment parent to every node it can.
    struct Breaker;

    impl OptimizationPass for Breaker {
        fn kind(&self) -> PassKind {
            PassKind::ReduceDependencies
        }

        fn run(&self, graph: &mut ResourceGraph) -> OptimizeResult<Vec<OptimizationChange>> {
            graph.connect("a", "c", EdgeKind::Contains, EdgeOrigin::Ownership);
            graph.connect("b", "c", EdgeKind::Contains, EdgeOrigin::Ownership);
            Ok(vec![OptimizationChange::applied(self.kind(), "broke containment")])
        }
    }

    struct Failing;

    impl OptimizationPass for Failing {
        fn kind(&self) -> PassKind {
            PassKind::HoistLiterals
        }

        fn run(&self, graph: &mut ResourceGraph) -> OptimizeResult<Vec<OptimizationChange>> {
            graph.remove_node("a");
            Err(OptimizeError::PassFailed {
                pass: self.kind().to_string(),
                message: "gave up".into(),
            })
        }
    }

    fn graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        for id in ["a", "b", "c"] {
            graph
                .add_node(ResourceNode::new(id, "network.vpc").with_property("cidr_block", id.into()))
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_violating_pass_is_rolled_back() {
        let optimizer = Optimizer::with_passes(vec![Box::new(Breaker)]);
        let (result, log) = optimizer.optimize(graph());

        assert_eq!(result.edge_count(), 0);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, ChangeStatus::Skipped(INVARIANT_VIOLATION.to_string()));
        assert!(log[0].to_string().contains("skipped: invariant violation"));
    }

    #[test]
    fn test_failing_pass_leaves_graph_untouched() {
        let optimizer = Optimizer::with_passes(vec![Box::new(Failing)]);
        let (result, log) = optimizer.optimize(graph());
        assert!(result.contains("a"));
        assert!(!log[0].is_applied());
    }

    #[test]
    fn test_passes_run_in_fixed_order() {
        let config = OptimizerConfig::default().with_passes(vec![
            PassKind::ReduceDependencies,
            PassKind::MergeDuplicates,
        ]);
        let optimizer = Optimizer::new(&config);
        assert_eq!(
            optimizer.pass_kinds(),
            vec![PassKind::MergeDuplicates, PassKind::ReduceDependencies]
        );
    }

    #[test]
    fn test_config_from_yaml() {
        let config: OptimizerConfig = serde_yaml::from_str("passes: [hoist-literals]\nhoist_min_nodes: 3\n").unwrap();
        assert!(config.is_enabled(PassKind::HoistLiterals));
        assert!(!config.is_enabled(PassKind::MergeDuplicates));
        assert_eq!(config.hoist_min_nodes, 3);
    }

    #[test]
    fn test_existing_violations_do_not_block_passes() {
        let mut input = graph();
        input.connect("a", "missing", EdgeKind::DependsOn, EdgeOrigin::Explicit);
        input
            .add_node(ResourceNode::new("d", "network.vpc").with_property("cidr_block", "a".into()))
            .unwrap();

        let (result, log) = optimize(input, &[PassKind::MergeDuplicates]);
        assert!(log.iter().all(OptimizationChange::is_applied));
        assert!(!result.contains("d"));
        assert_eq!(result.resolve_alias("d"), "a");
    }
}
