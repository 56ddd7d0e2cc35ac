//! # terrane_model
//!
//! Canonical infrastructure resource graph for Terrane.
//!
//! Every dialect (Terraform, CloudFormation, Kubernetes manifests, Ansible
//! playbooks) is normalized into the same [`ResourceGraph`]: typed resource
//! nodes, directed dependency/containment edges, and a metadata bag that keeps
//! whatever a dialect says that the canonical model cannot.
//!
//! This crate also owns the cross-dialect type mapping tables and per-type
//! property schemas, so that normalizers and emitters read the same entries.
//!
//! ## Example
//!
//! ```rust
//! use terrane_model::{Dialect, EdgeKind, EdgeOrigin, PropertyValue, ReferenceToken, ResourceGraph, ResourceNode};
//!
//! let mut graph = ResourceGraph::new(Dialect::Terraform);
//! graph
//!     .add_node(ResourceNode::new("aws_vpc.main", "network.vpc")
//!         .with_property("cidr_block", PropertyValue::from("10.0.0.0/16")))
//!     .unwrap();
//! graph
//!     .add_node(ResourceNode::new("aws_subnet.a", "network.subnet")
//!         .with_property("vpc_id", PropertyValue::Reference(ReferenceToken::attribute("aws_vpc.main", "id"))))
//!     .unwrap();
//! graph.connect("aws_subnet.a", "aws_vpc.main", EdgeKind::DependsOn, EdgeOrigin::Reference);
//!
//! assert!(graph.check_invariants().is_empty());
//! ```

pub mod dialect;
pub mod diagnostics;
pub mod edge;
pub mod error;
pub mod graph;
pub mod inventory;
pub mod mapping;
pub mod naming;
pub mod node;
pub mod schema;
pub mod value;

pub use dialect::Dialect;
pub use diagnostics::{
    EmissionWarning, EmissionWarningKind, FindingTarget, NormalizationWarning, ParseError, Severity,
    ValidationFinding, WarningKind,
};
pub use edge::{DependencyEdge, EdgeKind, EdgeOrigin};
pub use error::{ModelError, ModelResult};
pub use graph::{GraphSummary, InvariantViolation, PassthroughBlock, ResourceGraph};
pub use mapping::{KubernetesKind, PropertyAlias, TypeMapping, PLAY_TYPE, TYPE_MAPPINGS, UNKNOWN_PREFIX};
pub use node::{AdvisoryHint, MetadataBag, ResourceNode, SourceOrigin, NATIVE_TYPE_KEY};
pub use schema::{PropertySpec, TypeSchema, ValueKind};
pub use value::{NativeExpression, PropertyMap, PropertyValue, ReferenceToken, TemplateSegment};
