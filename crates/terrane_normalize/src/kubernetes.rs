//! Kubernetes manifests to graph fragment, plus name resolution once every
//! object is known.

use serde_yaml::{Mapping, Value};
use terrane_dialects::metadata::{API_VERSION, DOCUMENT_FIELDS, NATIVE_TYPE, OBJECT_METADATA};
use terrane_dialects::parse::KubeDocument;
use terrane_dialects::values::{get, key_string, mapping_to_properties, yaml_to_property};
use terrane_model::mapping::canonical_type_or_unknown;
use terrane_model::{
    Dialect, EdgeKind, EdgeOrigin, MetadataBag, PropertyValue, ReferenceToken, ResourceGraph, ResourceNode,
    SourceOrigin, WarningKind,
};
use tracing::debug;

use crate::fragment::Fragment;
use crate::properties::PropertyConverter;

const METADATA_PROPERTIES: &[&str] = &["name", "namespace", "labels", "annotations"];
const STRUCTURAL_KEYS: &[&str] = &["apiVersion", "kind", "metadata", "spec"];

/// Object name fields that point at another object: `(container key,
/// name key, referenced kind)`.
const NAME_REFERENCES: &[(&str, &str, &str)] = &[
    ("configMapRef", "name", "configmap"),
    ("configMapKeyRef", "name", "configmap"),
    ("configMap", "name", "configmap"),
    ("secretRef", "name", "secret"),
    ("secretKeyRef", "name", "secret"),
    ("secret", "secretName", "secret"),
    ("persistentVolumeClaim", "claimName", "persistentvolumeclaim"),
];

const SERVICE_ACCOUNT_KEYS: &[&str] = &["serviceAccountName", "service_account_name"];

/// Node id of an object.
pub fn object_id(kind: &str, namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(namespace) => format!("{}/{}/{}", kind.to_lowercase(), namespace, name),
        None => format!("{}/{}", kind.to_lowercase(), name),
    }
}

/// Build the fragment for one manifest file.
pub fn fragment(path: &str, documents: &[KubeDocument]) -> Fragment {
    let mut fragment = Fragment::new(path);
    for document in documents {
        node(&mut fragment, document);
    }
    debug!("Normalized {}: {} objects", path, fragment.nodes.len());
    fragment
}

fn node(fragment: &mut Fragment, document: &KubeDocument) {
    let id = object_id(&document.kind, document.namespace.as_deref(), &document.name);
    let canonical = canonical_type_or_unknown(Dialect::Kubernetes, &document.kind);
    let mut node = ResourceNode::new(&id, &canonical)
        .with_metadata(MetadataBag::for_dialect(Dialect::Kubernetes))
        .with_origin(SourceOrigin::new(fragment.file.clone(), Some(document.line)));
    node.metadata.set_extension(NATIVE_TYPE, document.kind.clone().into());
    node.metadata
        .set_extension(API_VERSION, document.api_version.clone().into());
    if node.is_opaque() {
        fragment.warn(
            WarningKind::UnknownType,
            Some(&id),
            format!("kind {} has no canonical mapping", document.kind),
        );
    }

    let mut object_metadata = Mapping::new();
    if let Some(Value::Mapping(metadata)) = get(&document.body, "metadata") {
        for (key, value) in metadata {
            let key = key_string(key);
            if METADATA_PROPERTIES.contains(&key.as_str()) {
                node.properties.insert(key, yaml_to_property(value));
            } else {
                object_metadata.insert(Value::String(key), value.clone());
            }
        }
    }
    if !object_metadata.is_empty() {
        node.metadata.set_extension(
            OBJECT_METADATA,
            PropertyValue::Map(mapping_to_properties(&object_metadata)),
        );
    }

    let converter = PropertyConverter::new(Dialect::Kubernetes, &canonical);
    match get(&document.body, "spec") {
        Some(Value::Mapping(spec)) => {
            for (key, value) in spec {
                converter.assign(&mut node, &key_string(key), yaml_to_property(value), fragment);
            }
        }
        Some(Value::Null) | None => {}
        Some(_) => fragment.warn(
            WarningKind::UnsupportedConstruct,
            Some(&id),
            "spec is not a mapping and was dropped",
        ),
    }

    let mut fields = Vec::new();
    for (key, value) in &document.body {
        let key = key_string(key);
        if STRUCTURAL_KEYS.contains(&key.as_str()) {
            continue;
        }
        converter.assign(&mut node, &key, yaml_to_property(value), fragment);
        fields.push(PropertyValue::String(key));
    }
    node.metadata
        .set_extension(DOCUMENT_FIELDS, PropertyValue::List(fields));

    fragment.nodes.push(node);
}

/// Turn object names into references where the named object exists, and
/// attach namespaced objects to their namespace.
pub fn resolve(graph: &mut ResourceGraph) {
    let ids = graph.node_ids();
    let exists = |id: &str| ids.iter().any(|known| known == id);

    let mut memberships = Vec::new();
    for node in graph.nodes_mut() {
        if !node.metadata.is_from(Dialect::Kubernetes) {
            continue;
        }
        let namespace = node.property_str("namespace").map(str::to_string);
        let lookup = |kind: &str, name: &str| -> Option<String> {
            let scoped = namespace
                .as_deref()
                .map(|ns| object_id(kind, Some(ns), name))
                .filter(|id| exists(id));
            scoped.or_else(|| Some(object_id(kind, None, name)).filter(|id| exists(id)))
        };

        for (key, value) in node.properties.iter_mut() {
            if SERVICE_ACCOUNT_KEYS.contains(&key.as_str()) {
                link_name(value, |name| lookup("serviceaccount", name));
            } else {
                link_nested(value, &lookup);
            }
        }

        if let Some(namespace) = &namespace {
            let owner = object_id("namespace", None, namespace);
            if owner != node.id && exists(&owner) {
                memberships.push((owner, node.id.clone()));
            }
        }
    }

    for (owner, member) in memberships {
        graph.connect(&owner, &member, EdgeKind::Contains, EdgeOrigin::Ownership);
    }
}

fn link_name(value: &mut PropertyValue, lookup: impl Fn(&str) -> Option<String>) {
    if let PropertyValue::String(name) = value {
        if let Some(target) = lookup(name) {
            *value = PropertyValue::Reference(ReferenceToken::attribute(target, "name"));
        }
    }
}

fn link_nested(value: &mut PropertyValue, lookup: &dyn Fn(&str, &str) -> Option<String>) {
    match value {
        PropertyValue::Map(map) => {
            for (key, item) in map.iter_mut() {
                if SERVICE_ACCOUNT_KEYS.contains(&key.as_str()) {
                    link_name(item, |name| lookup("serviceaccount", name));
                    continue;
                }
                let reference = NAME_REFERENCES.iter().find(|(container, _, _)| container == key);
                match (reference, item) {
                    (Some((_, name_key, kind)), PropertyValue::Map(inner)) => {
                        if let Some(name) = inner.get_mut(*name_key) {
                            link_name(name, |n| lookup(kind, n));
                        }
                        for (inner_key, inner_value) in inner.iter_mut() {
                            if inner_key != name_key {
                                link_nested(inner_value, lookup);
                            }
                        }
                    }
                    (_, item) => link_nested(item, lookup),
                }
            }
        }
        PropertyValue::List(items) => {
            for item in items {
                link_nested(item, lookup);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrane_dialects::parse::parse_kubernetes;

    const MANIFESTS: &str = "\
apiVersion: v1
kind: Namespace
metadata:
  name: shop
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  namespace: shop
  uid: abc
data:
  LEVEL: debug
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: shop
  labels:
    app: web
spec:
  replicas: 2
  template:
    spec:
      serviceAccountName: missing
      containers:
        - name: web
          envFrom:
            - configMapRef:
                name: settings
";

    fn normalized() -> Fragment {
        let (documents, errors) = parse_kubernetes("app.yaml", MANIFESTS);
        assert!(errors.is_empty(), "{:?}", errors);
        fragment("app.yaml", &documents)
    }

    #[test]
    fn test_documents_become_nodes() {
        let fragment = normalized();
        let ids: Vec<&str> = fragment.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["namespace/shop", "configmap/shop/settings", "deployment/shop/web"]);

        let config = &fragment.nodes[1];
        assert_eq!(config.resource_type, "config.map");
        assert_eq!(
            config.metadata.extension(DOCUMENT_FIELDS),
            Some(&PropertyValue::List(vec!["data".into()]))
        );
        assert!(config.metadata.extension(OBJECT_METADATA).is_some());

        let deployment = &fragment.nodes[2];
        assert_eq!(deployment.property("replicas"), Some(&PropertyValue::Int(2)));
        assert_eq!(deployment.metadata.extension_str(API_VERSION), Some("apps/v1"));
        assert!(deployment.property("labels").is_some());
    }

    #[test]
    fn test_resolve_links_names_and_namespaces() {
        let fragment = normalized();
        let mut graph = ResourceGraph::new(Dialect::Kubernetes);
        for node in fragment.nodes {
            graph.add_node(node).unwrap();
        }
        resolve(&mut graph);

        let deployment = graph.node("deployment/shop/web").unwrap();
        let name = deployment
            .property("template")
            .and_then(|t| t.get_path(&["spec", "containers"]))
            .and_then(PropertyValue::as_list)
            .and_then(|containers| containers[0].get_path(&["envFrom"]))
            .and_then(PropertyValue::as_list)
            .and_then(|items| items[0].get_path(&["configMapRef", "name"]))
            .unwrap();
        assert_eq!(
            name,
            &PropertyValue::Reference(ReferenceToken::attribute("configmap/shop/settings", "name"))
        );
        let account = deployment
            .property("template")
            .and_then(|t| t.get_path(&["spec", "serviceAccountName"]));
        assert_eq!(account, Some(&PropertyValue::from("missing")));

        assert_eq!(graph.children_of("namespace/shop"), vec!["configmap/shop/settings", "deployment/shop/web"]);
    }
}
