//! Optimization passes.

pub mod hoist;
pub mod merge;
pub mod reduce;

pub use hoist::HoistLiterals;
pub use merge::MergeDuplicates;
pub use reduce::ReduceDependencies;

use terrane_model::ResourceGraph;

use crate::change::{OptimizationChange, PassKind};
use crate::error::OptimizeResult;

/// A rewrite of the graph that keeps its observable behavior.
///
/// A pass mutates the graph it is given and reports one change per rewrite.
/// Reporting nothing means the graph is untouched.
pub trait OptimizationPass: Send + Sync {
    fn kind(&self) -> PassKind;

    fn run(&self, graph: &mut ResourceGraph) -> OptimizeResult<Vec<OptimizationChange>>;
}
