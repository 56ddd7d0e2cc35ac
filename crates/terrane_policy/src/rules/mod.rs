//! Built-in validation rules.

use std::sync::Arc;

use terrane_model::{PropertyMap, PropertyValue, ResourceNode};

use crate::rule::ValidationRule;

/// Identity methods of a rule implementation.
macro_rules! rule_identity {
    ($id:expr, $category:ident, $severity:ident, $description:expr) => {
        fn id(&self) -> &'static str {
            $id
        }

        fn category(&self) -> $crate::rule::RuleCategory {
            $crate::rule::RuleCategory::$category
        }

        fn description(&self) -> &'static str {
            $description
        }

        fn default_severity(&self) -> terrane_model::Severity {
            terrane_model::Severity::$severity
        }
    };
}

pub mod interface;
pub mod practice;
pub mod security;
pub mod structural;

/// Every built-in rule.
pub fn builtin() -> Vec<Arc<dyn ValidationRule>> {
    vec![
        Arc::new(structural::DanglingReference),
        Arc::new(structural::ContainsCycle),
        Arc::new(structural::MultipleParents),
        Arc::new(structural::DependencyCycle),
        Arc::new(structural::MissingRequiredProperty),
        Arc::new(structural::OpaqueResource),
        Arc::new(security::OpenIngress),
        Arc::new(security::UnencryptedStorage),
        Arc::new(security::PublicAccess),
        Arc::new(security::PrivilegedContainer),
        Arc::new(security::SecretStringData),
        Arc::new(security::MissingAccessControl),
        Arc::new(practice::MissingTags),
        Arc::new(practice::HardcodedSecret),
        Arc::new(practice::ImageLatest),
        Arc::new(practice::ContainerLimits),
        Arc::new(practice::ContainerProbes),
        Arc::new(practice::NonIdempotentCommand),
        Arc::new(practice::ServiceSelector),
        Arc::new(practice::UnusedHandler),
        Arc::new(practice::BecomeWithoutUser),
        Arc::new(practice::UnnamedTask),
        Arc::new(practice::MissingNamespace),
        Arc::new(interface::UndocumentedInterface),
        Arc::new(interface::UnpinnedProvider),
    ]
}

/// State of a boolean property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flag {
    Absent,
    Set(bool),
    /// Computed at deploy time (reference, expression, shared value)
    Dynamic,
}

pub(crate) fn flag(node: &ResourceNode, name: &str) -> Flag {
    flag_value(node.property(name))
}

pub(crate) fn flag_value(value: Option<&PropertyValue>) -> Flag {
    match value {
        None | Some(PropertyValue::Null) => Flag::Absent,
        Some(PropertyValue::Bool(b)) => Flag::Set(*b),
        Some(PropertyValue::String(s)) => match s.to_lowercase().as_str() {
            "true" | "yes" => Flag::Set(true),
            "false" | "no" => Flag::Set(false),
            _ => Flag::Dynamic,
        },
        Some(_) => Flag::Dynamic,
    }
}

/// Property is absent, null, or an empty map or list.
pub(crate) fn is_blank(value: Option<&PropertyValue>) -> bool {
    match value {
        None | Some(PropertyValue::Null) => true,
        Some(PropertyValue::Map(map)) => map.is_empty(),
        Some(PropertyValue::List(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Container specs anywhere in a node (`containers` and `initContainers`
/// lists), in document order.
pub(crate) fn containers(node: &ResourceNode) -> Vec<&PropertyMap> {
    let mut out = Vec::new();
    for (key, value) in &node.properties {
        collect_containers(key, value, &mut out);
    }
    out
}

fn collect_containers<'a>(key: &str, value: &'a PropertyValue, out: &mut Vec<&'a PropertyMap>) {
    match value {
        PropertyValue::List(items) if key == "containers" || key == "initContainers" => {
            out.extend(items.iter().filter_map(PropertyValue::as_map));
        }
        PropertyValue::Map(map) => {
            for (inner_key, inner) in map {
                collect_containers(inner_key, inner, out);
            }
        }
        PropertyValue::List(items) => {
            for item in items {
                collect_containers(key, item, out);
            }
        }
        _ => {}
    }
}

pub(crate) fn container_name(container: &PropertyMap) -> &str {
    container.get("name").and_then(PropertyValue::as_str).unwrap_or("<unnamed>")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment() -> ResourceNode {
        let container = |name: &str| {
            let mut map = PropertyMap::new();
            map.insert("name".into(), name.into());
            PropertyValue::Map(map)
        };
        let mut spec = PropertyMap::new();
        spec.insert("initContainers".into(), PropertyValue::List(vec![container("init")]));
        spec.insert("containers".into(), PropertyValue::List(vec![container("web"), container("sidecar")]));
        let mut template = PropertyMap::new();
        template.insert("spec".into(), PropertyValue::Map(spec));
        ResourceNode::new("deployment/web", "workload.deployment").with_property("template", PropertyValue::Map(template))
    }

    #[test]
    fn test_containers_are_found_at_any_depth() {
        let node = deployment();
        let names: Vec<&str> = containers(&node).into_iter().map(container_name).collect();
        assert_eq!(names, vec!["init", "web", "sidecar"]);
    }

    #[test]
    fn test_flag_states() {
        let node = ResourceNode::new("v", "storage.volume")
            .with_property("encrypted", PropertyValue::Bool(true))
            .with_property("multi_az", "no".into())
            .with_property("public", PropertyValue::Shared("x".into()));
        assert_eq!(flag(&node, "encrypted"), Flag::Set(true));
        assert_eq!(flag(&node, "multi_az"), Flag::Set(false));
        assert_eq!(flag(&node, "public"), Flag::Dynamic);
        assert_eq!(flag(&node, "missing"), Flag::Absent);
    }

    #[test]
    fn test_builtin_ids_are_unique() {
        let mut ids: Vec<&str> = builtin().iter().map(|r| r.id()).collect();
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
    }
}
