//! # terrane_optimize
//!
//! Structure-preserving rewrites of a [`ResourceGraph`]:
//!
//! 1. `merge-duplicates` folds identical resources into one and records the
//!    rename in the graph's aliases
//! 2. `hoist-literals` moves repeated literals into shared definitions
//! 3. `reduce-dependencies` drops dependency edges implied by others
//!
//! Passes always run in this order. Each runs on a working copy and is
//! discarded when it would break a graph invariant.
//!
//! ## Example
//!
//! ```rust
//! use terrane_model::{Dialect, PropertyValue, ResourceGraph, ResourceNode};
//! use terrane_optimize::{optimize, PassKind};
//!
//! let mut graph = ResourceGraph::new(Dialect::Terraform);
//! for id in ["aws_sqs_queue.b", "aws_sqs_queue.a"] {
//!     graph
//!         .add_node(ResourceNode::new(id, "messaging.queue").with_property("delay_seconds", PropertyValue::Int(5)))
//!         .unwrap();
//! }
//!
//! let (graph, changes) = optimize(graph, &PassKind::all());
//! assert_eq!(graph.node_count(), 1);
//! assert_eq!(graph.resolve_alias("aws_sqs_queue.b"), "aws_sqs_queue.a");
//! assert_eq!(changes.len(), 1);
//! ```

pub mod change;
pub mod error;
pub mod optimizer;
pub mod passes;

pub use change::{ChangeStatus, OptimizationChange, PassKind};
pub use error::{OptimizeError, OptimizeResult};
pub use optimizer::{optimize, Optimizer, OptimizerConfig, INVARIANT_VIOLATION};
pub use passes::{HoistLiterals, MergeDuplicates, OptimizationPass, ReduceDependencies};
