//! Resource nodes and their metadata bag.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::value::{PropertyMap, PropertyValue};

/// Where a node was declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOrigin {
    /// Path relative to the source root
    pub file: String,
    pub line: Option<usize>,
}

impl SourceOrigin {
    pub fn new(file: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// Extension key holding the native type name.
pub const NATIVE_TYPE_KEY: &str = "native_type";

/// Advisory annotation attached by an external hint provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryHint {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Dialect-specific data with no canonical equivalent.
///
/// Kept verbatim so that emitting back into the origin dialect is lossless.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataBag {
    /// Dialect the metadata came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,

    /// Native properties that failed schema matching, keyed by native name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub opaque: PropertyMap,

    /// Native type name, apiVersion, module name, meta-arguments, etc.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extensions: PropertyMap,
}

impl MetadataBag {
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect: Some(dialect),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.extensions.is_empty()
    }

    pub fn extension(&self, key: &str) -> Option<&PropertyValue> {
        self.extensions.get(key)
    }

    pub fn extension_str(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).and_then(PropertyValue::as_str)
    }

    pub fn set_extension(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.extensions.insert(key.into(), value);
    }

    /// Native type name recorded by the normalizer.
    pub fn native_type(&self) -> Option<&str> {
        self.extension_str(NATIVE_TYPE_KEY)
    }

    /// True when this metadata can be re-emitted verbatim into `dialect`.
    pub fn is_from(&self, dialect: Dialect) -> bool {
        self.dialect == Some(dialect)
    }
}

/// A single infrastructure unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: String,

    /// Provider-qualified canonical type (`compute.instance`)
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default)]
    pub properties: PropertyMap,

    #[serde(default)]
    pub metadata: MetadataBag,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<AdvisoryHint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<SourceOrigin>,
}

impl ResourceNode {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            properties: PropertyMap::new(),
            metadata: MetadataBag::default(),
            hints: Vec::new(),
            origin: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataBag) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_origin(mut self, origin: SourceOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(PropertyValue::as_str)
    }

    /// `unknown.*` types carry their native block verbatim.
    pub fn is_opaque(&self) -> bool {
        self.resource_type.starts_with(crate::mapping::UNKNOWN_PREFIX)
    }

    /// Type family, the part before the first dot.
    pub fn family(&self) -> &str {
        self.resource_type
            .split('.')
            .next()
            .unwrap_or(self.resource_type.as_str())
    }

    /// Structural comparison ignoring id, origin and hints.
    pub fn same_content(&self, other: &ResourceNode) -> bool {
        self.resource_type == other.resource_type
            && self.properties == other.properties
            && self.metadata == other.metadata
    }
}

impl PartialEq for ResourceNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.same_content(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_origin_and_hints() {
        let a = ResourceNode::new("aws_vpc.main", "network.vpc")
            .with_property("cidr_block", "10.0.0.0/16".into())
            .with_origin(SourceOrigin::new("a/main.tf", Some(3)));
        let mut b = a.clone().with_origin(SourceOrigin::new("b/vpc.tf", Some(40)));
        b.hints.push(AdvisoryHint {
            text: "enable flow logs".into(),
            source: None,
        });
        assert_eq!(a, b);
    }

    #[test]
    fn test_opaque_and_family() {
        let node = ResourceNode::new("x", "unknown.aws_glue_job");
        assert!(node.is_opaque());
        assert_eq!(node.family(), "unknown");
        assert_eq!(ResourceNode::new("y", "storage.bucket").family(), "storage");
    }

    #[test]
    fn test_metadata_extensions() {
        let mut bag = MetadataBag::for_dialect(Dialect::Kubernetes);
        bag.set_extension("native_type", "Deployment".into());
        assert_eq!(bag.native_type(), Some("Deployment"));
        assert!(bag.is_from(Dialect::Kubernetes));
        assert!(!bag.is_from(Dialect::Ansible));
    }
}
