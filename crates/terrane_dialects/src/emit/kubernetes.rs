//! Kubernetes manifest emitter.

use std::collections::{BTreeMap, HashMap};

use serde_yaml::{Mapping, Value};
use terrane_model::mapping::{lookup, native_property_name};
use terrane_model::naming::dns_label;
use terrane_model::{Dialect, EmissionWarningKind, PropertyValue, ResourceGraph, ResourceNode, TemplateSegment};

use super::{assign_names, resolve_shared, single_line, EmitContext, EmitOptions, EmitOutput, Emitter};
use crate::error::DialectResult;
use crate::metadata::{map_extension, API_VERSION, DOCUMENT_FIELDS, OBJECT_METADATA};
use crate::values::property_to_yaml;

/// Properties taken from `metadata` rather than `spec`.
pub const METADATA_PROPERTIES: &[&str] = &["name", "namespace", "labels", "annotations"];

/// Whether a field of `kind` lives at document top level when the
/// source did not say.
pub fn default_top_level(kind: &str, field: &str) -> bool {
    match kind {
        "ConfigMap" => matches!(field, "data" | "binaryData" | "immutable"),
        "Secret" => matches!(field, "data" | "stringData" | "type" | "immutable"),
        "ServiceAccount" => matches!(field, "secrets" | "imagePullSecrets" | "automountServiceAccountToken"),
        "Role" | "ClusterRole" => matches!(field, "rules" | "aggregationRule"),
        "RoleBinding" | "ClusterRoleBinding" => matches!(field, "subjects" | "roleRef"),
        _ => false,
    }
}

pub struct KubernetesEmitter;

impl Emitter for KubernetesEmitter {
    fn dialect(&self) -> Dialect {
        Dialect::Kubernetes
    }

    fn emit(&self, graph: &ResourceGraph, options: &EmitOptions) -> DialectResult<EmitOutput> {
        let mut ctx = EmitContext::new(graph, Dialect::Kubernetes, options);
        for block in &graph.passthrough {
            if block.dialect != Dialect::Kubernetes {
                ctx.warn(
                    EmissionWarningKind::PassthroughDropped,
                    None,
                    format!("{} {} block has no kubernetes equivalent", block.dialect, block.kind),
                );
            }
        }

        let names = object_names(&ctx);
        let mut writer = ManifestWriter { ctx, names };
        let mut documents: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for node in graph.nodes() {
            let artifact = writer.ctx.artifact(node);
            let chunk = match writer.ctx.native_type(node) {
                Some(kind) => {
                    let mut text = writer.ctx.hint_lines(node, "#").join("\n");
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&serde_yaml::to_string(&writer.document(node, &kind))?);
                    text
                }
                None => {
                    let mut stub = writer.ctx.stub_lines(node, "#").join("\n");
                    stub.push('\n');
                    stub
                }
            };
            documents.entry(artifact).or_default().push(chunk);
        }

        if documents.is_empty() {
            documents.insert(Dialect::Kubernetes.default_artifact().to_string(), Vec::new());
        }

        let header = writer.ctx.banner_lines("#");
        let renamed: Vec<String> = writer
            .ctx
            .live_aliases()
            .into_iter()
            .map(|(old, new)| format!("# renamed: {} -> {}", single_line(&old), single_line(&new)))
            .collect();

        let mut output = EmitOutput::default();
        for (index, (file, chunks)) in documents.into_iter().enumerate() {
            let mut lines = header.clone();
            if index == 0 {
                lines.extend(renamed.iter().cloned());
            }
            let mut text = String::new();
            for line in &lines {
                text.push_str(line);
                text.push('\n');
            }
            text.push_str(&chunks.join("---\n"));
            output.artifacts.insert(file, text);
        }
        output.warnings = writer.ctx.warnings;
        Ok(output)
    }
}

/// Object name per node, unique per kind and namespace.
fn object_names(ctx: &EmitContext<'_>) -> HashMap<String, String> {
    let names = assign_names(ctx.graph, "-", |node| {
        let kind = ctx.native_type(node).unwrap_or_default();
        let namespace = node.property_str("namespace").unwrap_or_default();
        let name = match node.property_str("name") {
            Some(name) => name.to_string(),
            None => dns_label(&node.id),
        };
        format!("{}/{}/{}", kind, namespace, name)
    });
    names
        .into_iter()
        .map(|(id, qualified)| {
            let name = qualified.rsplit('/').next().unwrap_or_default().to_string();
            (id, name)
        })
        .collect()
}

struct ManifestWriter<'a> {
    ctx: EmitContext<'a>,
    names: HashMap<String, String>,
}

impl<'a> ManifestWriter<'a> {
    fn document(&mut self, node: &ResourceNode, kind: &str) -> Value {
        let native = self.ctx.is_native(node);
        let api_version = node
            .metadata
            .extension_str(API_VERSION)
            .filter(|_| native)
            .map(str::to_string)
            .or_else(|| lookup(&node.resource_type).and_then(|m| m.kubernetes).map(|k| k.api_version.to_string()))
            .unwrap_or_else(|| "v1".to_string());

        let document_fields: Option<Vec<String>> = if native {
            node.metadata
                .extension(DOCUMENT_FIELDS)
                .and_then(PropertyValue::as_list)
                .map(|items| items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect())
        } else {
            None
        };
        let is_top_level = |field: &str| match &document_fields {
            Some(fields) => fields.iter().any(|f| f == field),
            None => default_top_level(kind, field),
        };

        let mut metadata = Mapping::new();
        let name = self.names.get(&node.id).cloned().unwrap_or_else(|| dns_label(&node.id));
        metadata.insert(Value::String("name".into()), Value::String(name));
        for key in &METADATA_PROPERTIES[1..] {
            if let Some(value) = node.property(key) {
                let rendered = self.value(&node.id, value);
                metadata.insert(Value::String(key.to_string()), rendered);
            }
        }
        if native {
            for (key, value) in map_extension(node, OBJECT_METADATA) {
                metadata.insert(Value::String(key), property_to_yaml(&value));
            }
        }

        let mut top = Mapping::new();
        let mut spec = Mapping::new();
        for (name, value) in &node.properties {
            if METADATA_PROPERTIES.contains(&name.as_str()) {
                continue;
            }
            let native_name = if node.is_opaque() {
                name.clone()
            } else {
                native_property_name(Dialect::Kubernetes, &node.resource_type, name)
            };
            let rendered = self.value(&node.id, value);
            if is_top_level(&native_name) {
                top.insert(Value::String(native_name), rendered);
            } else {
                spec.insert(Value::String(native_name), rendered);
            }
        }
        if native {
            for (name, value) in &node.metadata.opaque {
                let rendered = self.value(&node.id, value);
                if is_top_level(name) {
                    top.insert(Value::String(name.clone()), rendered);
                } else {
                    spec.insert(Value::String(name.clone()), rendered);
                }
            }
        }

        let mut document = Mapping::new();
        document.insert(Value::String("apiVersion".into()), Value::String(api_version));
        document.insert(Value::String("kind".into()), Value::String(kind.to_string()));
        document.insert(Value::String("metadata".into()), Value::Mapping(metadata));
        for (key, value) in top {
            document.insert(key, value);
        }
        if !spec.is_empty() {
            document.insert(Value::String("spec".into()), Value::Mapping(spec));
        }
        Value::Mapping(document)
    }

    fn target_name(&mut self, node: &str, target: &str) -> Option<String> {
        if !self.ctx.exists(target) {
            self.ctx.unresolved(node, target);
            return None;
        }
        self.names.get(target).cloned()
    }

    fn value(&mut self, node: &str, value: &PropertyValue) -> Value {
        match value {
            PropertyValue::List(items) => Value::Sequence(items.iter().map(|i| self.value(node, i)).collect()),
            PropertyValue::Map(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| (Value::String(k.clone()), self.value(node, v)))
                    .collect(),
            ),
            PropertyValue::Reference(token) => match self.target_name(node, &token.target) {
                Some(name) => Value::String(name),
                None => Value::String(format!("<unresolved:{}>", token.target)),
            },
            PropertyValue::Template(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        TemplateSegment::Literal(s) => text.push_str(s),
                        TemplateSegment::Reference(token) => match self.target_name(node, &token.target) {
                            Some(name) => text.push_str(&name),
                            None => text.push_str(&format!("<unresolved:{}>", token.target)),
                        },
                        TemplateSegment::Expression(expr) => {
                            let source = self.ctx.graph.dialect();
                            self.ctx.untranslatable_expression(node, source, expr);
                            text.push_str(&format!("<untranslatable: {}>", expr));
                        }
                    }
                }
                Value::String(text)
            }
            PropertyValue::Shared(name) => match resolve_shared(self.ctx.graph, name) {
                Some(resolved) => self.value(node, resolved),
                None => {
                    self.ctx.warn(
                        EmissionWarningKind::DanglingReference,
                        Some(node),
                        format!("shared value {} is not defined", name),
                    );
                    Value::String(format!("<undefined:{}>", name))
                }
            },
            PropertyValue::Expression(expr) => {
                self.ctx.untranslatable_expression(node, expr.dialect, &expr.text);
                Value::String(format!("<untranslatable: {}>", expr.text))
            }
            literal => property_to_yaml(literal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrane_model::{MetadataBag, PropertyMap, ReferenceToken};

    fn kube_node(id: &str, canonical: &str, kind: &str, name: &str) -> ResourceNode {
        let mut metadata = MetadataBag::for_dialect(Dialect::Kubernetes);
        metadata.set_extension("native_type", kind.into());
        ResourceNode::new(id, canonical)
            .with_metadata(metadata)
            .with_property("name", name.into())
    }

    #[test]
    fn test_reference_emits_target_name() {
        let mut graph = ResourceGraph::new(Dialect::Kubernetes);
        let mut data = PropertyMap::new();
        data.insert("LEVEL".into(), "debug".into());
        let mut config = kube_node("configmap/settings", "config.map", "ConfigMap", "settings")
            .with_property("data", PropertyValue::Map(data));
        config
            .metadata
            .set_extension(DOCUMENT_FIELDS, PropertyValue::List(vec!["data".into()]));
        graph.add_node(config).unwrap();

        let mut from = PropertyMap::new();
        from.insert(
            "name".into(),
            PropertyValue::Reference(ReferenceToken::attribute("configmap/settings", "name")),
        );
        let mut env = PropertyMap::new();
        env.insert("configMapRef".into(), PropertyValue::Map(from));
        graph
            .add_node(
                kube_node("pod/web", "workload.pod", "Pod", "web")
                    .with_property("env_from", PropertyValue::List(vec![PropertyValue::Map(env)])),
            )
            .unwrap();
        graph.derive_reference_edges();

        let output = KubernetesEmitter.emit(&graph, &EmitOptions::default()).unwrap();
        let text = output.artifact("manifests.yaml").unwrap();
        let docs: Vec<&str> = text.split("---\n").collect();
        assert_eq!(docs.len(), 2);
        let config: Value = serde_yaml::from_str(docs[0]).unwrap();
        assert_eq!(config["data"]["LEVEL"], Value::String("debug".into()));
        let pod: Value = serde_yaml::from_str(docs[1]).unwrap();
        assert_eq!(pod["apiVersion"], Value::String("v1".into()));
        assert_eq!(
            pod["spec"]["envFrom"][0]["configMapRef"]["name"],
            Value::String("settings".into())
        );
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_same_name_different_kinds_keep_names() {
        let mut graph = ResourceGraph::new(Dialect::Kubernetes);
        graph
            .add_node(kube_node("service/web", "network.service", "Service", "web"))
            .unwrap();
        graph
            .add_node(kube_node("deployment/web", "workload.deployment", "Deployment", "web"))
            .unwrap();
        let output = KubernetesEmitter.emit(&graph, &EmitOptions::default()).unwrap();
        let text = output.artifact("manifests.yaml").unwrap();
        assert_eq!(text.matches("name: web\n").count(), 2);
    }

    #[test]
    fn test_cloud_resource_is_stubbed() {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        graph.add_node(ResourceNode::new("aws_s3_bucket.logs", "storage.bucket")).unwrap();
        let output = KubernetesEmitter.emit(&graph, &EmitOptions::default()).unwrap();
        assert!(output
            .artifact("manifests.yaml")
            .unwrap()
            .contains("# untranslatable resource aws_s3_bucket.logs"));
        assert_eq!(output.warnings[0].kind, EmissionWarningKind::UntranslatableResource);
    }
}
