//! Metadata extension keys shared by normalizers and emitters.
//!
//! Whatever a normalizer stores under these keys, the emitter of the same
//! dialect reads back to reproduce the source construct.

use terrane_model::{PropertyMap, PropertyValue, ResourceNode};

/// Native type name (Terraform resource type, CloudFormation `Type`,
/// Kubernetes kind, Ansible module as written).
pub const NATIVE_TYPE: &str = terrane_model::NATIVE_TYPE_KEY;

/// Terraform: `count`, `for_each`, `provider` source text.
pub const META_ARGUMENTS: &str = "meta_arguments";
/// Terraform: native property names (and dotted nested paths) written as blocks.
pub const BLOCK_ATTRIBUTES: &str = "block_attributes";
/// Terraform: `lifecycle`, `dynamic`, `provisioner` and labelled nested blocks.
pub const RAW_BLOCKS: &str = "raw_blocks";

/// CloudFormation: `Condition`, `DeletionPolicy`, `Metadata`, ...
pub const RESOURCE_ATTRIBUTES: &str = "resource_attributes";
/// CloudFormation metadata key holding rename aliases.
pub const CFN_ALIASES_KEY: &str = "Terrane::Aliases";
/// CloudFormation mapping holding shared definitions.
pub const CFN_SHARED_MAPPING: &str = "SharedValues";
pub const CFN_SHARED_KEY: &str = "Default";

pub const API_VERSION: &str = "api_version";
/// Kubernetes: `metadata` keys other than name, namespace, labels and annotations.
pub const OBJECT_METADATA: &str = "object_metadata";
/// Kubernetes: top-level document keys kept outside `spec`.
pub const DOCUMENT_FIELDS: &str = "document_fields";

/// Ansible: task keywords (`name`, `when`, `notify`, ...).
pub const TASK_KEYWORDS: &str = "task_keywords";
/// Ansible: play section the task was declared in.
pub const SECTION: &str = "section";
/// Ansible: `true` when properties were split from a `k=v` string,
/// or the raw string when it could not be split.
pub const FREE_FORM: &str = "free_form";

/// String items of a list-valued extension.
pub fn string_list(node: &ResourceNode, key: &str) -> Vec<String> {
    node.metadata
        .extension(key)
        .and_then(PropertyValue::as_list)
        .map(|items| items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Map-valued extension, empty when absent.
pub fn map_extension(node: &ResourceNode, key: &str) -> PropertyMap {
    node.metadata
        .extension(key)
        .and_then(PropertyValue::as_map)
        .cloned()
        .unwrap_or_default()
}

pub fn list_value(items: impl IntoIterator<Item = String>) -> PropertyValue {
    PropertyValue::List(items.into_iter().map(PropertyValue::String).collect())
}
