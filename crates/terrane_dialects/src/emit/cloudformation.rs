//! CloudFormation (YAML) emitter.

use std::collections::{BTreeMap, HashMap};

use serde_yaml::{Mapping, Value};
use terrane_model::mapping::native_property_name;
use terrane_model::naming::{logical_id, to_pascal_case};
use terrane_model::{
    Dialect, EmissionWarningKind, PropertyValue, ReferenceToken, ResourceGraph, ResourceNode, TemplateSegment,
};
use tracing::debug;

use super::{assign_names, EmitContext, EmitOptions, EmitOutput, Emitter};
use crate::error::DialectResult;
use crate::metadata::{map_extension, CFN_ALIASES_KEY, CFN_SHARED_KEY, CFN_SHARED_MAPPING, RESOURCE_ATTRIBUTES};
use crate::values::{key_string, property_to_yaml};

pub const FORMAT_VERSION: &str = "2010-09-09";

pub struct CloudFormationEmitter;

/// One template being assembled.
#[derive(Default)]
struct Template {
    sections: Vec<(String, Value)>,
    resources: Mapping,
    comments: Vec<String>,
}

impl Template {
    fn section_mut(&mut self, name: &str) -> &mut Value {
        if let Some(index) = self.sections.iter().position(|(n, _)| n == name) {
            return &mut self.sections[index].1;
        }
        self.sections.push((name.to_string(), Value::Mapping(Mapping::new())));
        let last = self.sections.len() - 1;
        &mut self.sections[last].1
    }

    fn merge_into_section(&mut self, name: &str, key: &str, value: Value) {
        let section = self.section_mut(name);
        if !matches!(section, Value::Mapping(_)) {
            *section = Value::Mapping(Mapping::new());
        }
        if let Value::Mapping(map) = section {
            map.insert(Value::String(key.to_string()), value);
        }
    }

    fn render(self, banner: &[String]) -> DialectResult<String> {
        let mut root = Mapping::new();
        root.insert(
            Value::String("AWSTemplateFormatVersion".into()),
            Value::String(FORMAT_VERSION.into()),
        );
        let mut trailing = Vec::new();
        for (name, value) in self.sections {
            if name == "Outputs" {
                trailing.push((name, value));
            } else {
                root.insert(Value::String(name), value);
            }
        }
        if !self.resources.is_empty() {
            root.insert(Value::String("Resources".into()), Value::Mapping(self.resources));
        }
        for (name, value) in trailing {
            root.insert(Value::String(name), value);
        }

        let mut text = String::new();
        for line in banner.iter().chain(self.comments.iter()) {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str(&serde_yaml::to_string(&Value::Mapping(root))?);
        Ok(text)
    }
}

impl Emitter for CloudFormationEmitter {
    fn dialect(&self) -> Dialect {
        Dialect::CloudFormation
    }

    fn emit(&self, graph: &ResourceGraph, options: &EmitOptions) -> DialectResult<EmitOutput> {
        let mut ctx = EmitContext::new(graph, Dialect::CloudFormation, options);
        let ids = logical_ids(&ctx);
        let mut templates: BTreeMap<String, Template> = BTreeMap::new();
        let default = Dialect::CloudFormation.default_artifact().to_string();

        for block in &graph.passthrough {
            if block.dialect != Dialect::CloudFormation {
                ctx.warn(
                    EmissionWarningKind::PassthroughDropped,
                    None,
                    format!("{} {} block has no cloudformation equivalent", block.dialect, block.kind),
                );
                continue;
            }
            let file = block
                .file
                .as_deref()
                .map(|f| super::artifact_path(Dialect::CloudFormation, f))
                .unwrap_or_else(|| default.clone());
            let template = templates.entry(file).or_default();
            match serde_yaml::from_str::<Value>(&block.text) {
                Ok(Value::Mapping(map)) => {
                    for (key, value) in map {
                        let name = key_string(&key);
                        let merged = matches!(name.as_str(), "Mappings" | "Metadata");
                        match value {
                            Value::Mapping(entries) if merged => {
                                for (k, v) in entries {
                                    template.merge_into_section(&name, &key_string(&k), v);
                                }
                            }
                            value => template.sections.push((name, value)),
                        }
                    }
                }
                _ => ctx.warn(
                    EmissionWarningKind::PassthroughDropped,
                    None,
                    format!("{} section is not a YAML mapping", block.kind),
                ),
            }
        }

        let mut writer = CfnWriter { ctx, ids };
        for node in graph.nodes() {
            let artifact = writer.ctx.artifact(node);
            match writer.ctx.native_type(node) {
                Some(native) => {
                    let resource = writer.resource(node, &native);
                    let id = writer.ids.get(&node.id).cloned().unwrap_or_else(|| logical_id(&node.id));
                    let hints = writer
                        .ctx
                        .hint_lines(node, "#")
                        .into_iter()
                        .map(|line| line.replacen("# hint:", &format!("# hint({}):", id), 1))
                        .collect::<Vec<_>>();
                    let template = templates.entry(artifact).or_default();
                    template.comments.extend(hints);
                    template.resources.insert(Value::String(id), resource);
                }
                None => {
                    let stub = writer.ctx.stub_lines(node, "#");
                    templates.entry(artifact).or_default().comments.extend(stub);
                }
            }
        }

        if templates.is_empty() {
            templates.insert(default.clone(), Template::default());
        }

        if !graph.definitions.is_empty() {
            let mut shared = Mapping::new();
            for (name, value) in &graph.definitions {
                let rendered = writer.value("definitions", value);
                shared.insert(Value::String(name.clone()), rendered);
            }
            let mut mapping = Mapping::new();
            mapping.insert(Value::String(CFN_SHARED_KEY.into()), Value::Mapping(shared));
            for template in templates.values_mut() {
                template.merge_into_section("Mappings", CFN_SHARED_MAPPING, Value::Mapping(mapping.clone()));
            }
        }

        let aliases = writer.ctx.live_aliases();
        if !aliases.is_empty() {
            let mut map = Mapping::new();
            for (old, new) in aliases {
                let target = writer.ids.get(&new).cloned().unwrap_or(new);
                map.insert(Value::String(old), Value::String(target));
            }
            if let Some(template) = templates.values_mut().next() {
                template.merge_into_section("Metadata", CFN_ALIASES_KEY, Value::Mapping(map));
            }
        }

        let banner = writer.ctx.banner_lines("#");
        let mut output = EmitOutput::default();
        for (file, template) in templates {
            debug!("Rendering template {}", file);
            output.artifacts.insert(file, template.render(&banner)?);
        }
        output.warnings = writer.ctx.warnings;
        Ok(output)
    }
}

fn logical_ids(ctx: &EmitContext<'_>) -> HashMap<String, String> {
    let names = assign_names(ctx.graph, "", |node| {
        let translatable = ctx.native_type(node).is_some();
        if !translatable {
            format!("#{}", node.id)
        } else if ctx.is_native(node) && node.id.chars().all(|c| c.is_ascii_alphanumeric()) {
            node.id.clone()
        } else {
            logical_id(&node.id)
        }
    });
    names.into_iter().filter(|(_, id)| !id.starts_with('#')).collect()
}

struct CfnWriter<'a> {
    ctx: EmitContext<'a>,
    ids: HashMap<String, String>,
}

impl<'a> CfnWriter<'a> {
    fn resource(&mut self, node: &ResourceNode, native: &str) -> Value {
        let mut resource = Mapping::new();
        resource.insert(Value::String("Type".into()), Value::String(native.to_string()));

        let dependencies: Vec<Value> = self
            .ctx
            .explicit_dependencies(node)
            .iter()
            .filter_map(|target| self.ids.get(target).cloned())
            .map(Value::String)
            .collect();
        match dependencies.len() {
            0 => {}
            1 => {
                resource.insert(Value::String("DependsOn".into()), dependencies[0].clone());
            }
            _ => {
                resource.insert(Value::String("DependsOn".into()), Value::Sequence(dependencies));
            }
        }

        let mut properties = Mapping::new();
        for (name, value) in &node.properties {
            let native_name = if node.is_opaque() {
                name.clone()
            } else {
                native_property_name(Dialect::CloudFormation, &node.resource_type, name)
            };
            let rendered = match (native_name.as_str(), value) {
                ("Tags", PropertyValue::Map(tags)) => {
                    let items = tags
                        .iter()
                        .map(|(key, value)| {
                            let mut tag = Mapping::new();
                            tag.insert(Value::String("Key".into()), Value::String(key.clone()));
                            tag.insert(Value::String("Value".into()), self.value(&node.id, value));
                            Value::Mapping(tag)
                        })
                        .collect();
                    Value::Sequence(items)
                }
                _ => self.value(&node.id, value),
            };
            properties.insert(Value::String(native_name), rendered);
        }
        if self.ctx.is_native(node) {
            for (name, value) in &node.metadata.opaque {
                let rendered = self.value(&node.id, value);
                properties.insert(Value::String(name.clone()), rendered);
            }
        }
        if !properties.is_empty() {
            resource.insert(Value::String("Properties".into()), Value::Mapping(properties));
        }

        if self.ctx.is_native(node) {
            for (name, value) in map_extension(node, RESOURCE_ATTRIBUTES) {
                resource.insert(Value::String(name), property_to_yaml(&value));
            }
        }
        Value::Mapping(resource)
    }

    fn value(&mut self, node: &str, value: &PropertyValue) -> Value {
        match value {
            PropertyValue::List(items) => Value::Sequence(items.iter().map(|i| self.value(node, i)).collect()),
            PropertyValue::Map(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| (Value::String(k.clone()), self.value(node, v)))
                    .collect(),
            ),
            PropertyValue::Reference(token) => match self.intrinsic(node, token) {
                Some(value) => value,
                None => Value::String(format!("<unresolved:{}>", token.target)),
            },
            PropertyValue::Template(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        TemplateSegment::Literal(s) => text.push_str(&s.replace("${", "${!")),
                        TemplateSegment::Reference(token) => match self.sub_variable(node, token) {
                            Some(variable) => text.push_str(&format!("${{{}}}", variable)),
                            None => text.push_str(&format!("<unresolved:{}>", token.target)),
                        },
                        TemplateSegment::Expression(expr) => {
                            if self.ctx.same_dialect() {
                                text.push_str(&format!("${{{}}}", expr));
                            } else {
                                let source = self.ctx.graph.dialect();
                                self.ctx.untranslatable_expression(node, source, expr);
                                text.push_str(&format!("<untranslatable: {}>", expr));
                            }
                        }
                    }
                }
                single_key("Fn::Sub", Value::String(text))
            }
            PropertyValue::Shared(name) => single_key(
                "Fn::FindInMap",
                Value::Sequence(vec![
                    Value::String(CFN_SHARED_MAPPING.into()),
                    Value::String(CFN_SHARED_KEY.into()),
                    Value::String(name.clone()),
                ]),
            ),
            PropertyValue::Expression(expr) => {
                if expr.dialect == Dialect::CloudFormation {
                    match serde_json::from_str::<Value>(&expr.text) {
                        Ok(value) => value,
                        Err(_) => Value::String(expr.text.clone()),
                    }
                } else {
                    self.ctx.untranslatable_expression(node, expr.dialect, &expr.text);
                    Value::String(format!("<untranslatable: {}>", expr.text))
                }
            }
            literal => property_to_yaml(literal),
        }
    }

    fn target_id(&mut self, node: &str, target: &str) -> Option<String> {
        match self.ids.get(target) {
            Some(id) => Some(id.clone()),
            None => {
                if self.ctx.exists(target) {
                    self.ctx.warn(
                        EmissionWarningKind::UntranslatableResource,
                        Some(node),
                        format!("reference to untranslatable resource {} emitted as a placeholder", target),
                    );
                } else {
                    self.ctx.unresolved(node, target);
                }
                None
            }
        }
    }

    /// Attribute name in CloudFormation spelling; `None` means `Ref`.
    fn attribute(&self, token: &ReferenceToken) -> Option<String> {
        match &token.attribute {
            None => None,
            Some(attribute) if self.ctx.same_dialect() => Some(attribute.clone()),
            Some(attribute) if attribute == "id" => None,
            Some(attribute) => Some(
                attribute
                    .split('.')
                    .map(to_pascal_case)
                    .collect::<Vec<_>>()
                    .join("."),
            ),
        }
    }

    fn intrinsic(&mut self, node: &str, token: &ReferenceToken) -> Option<Value> {
        let id = self.target_id(node, &token.target)?;
        Some(match self.attribute(token) {
            None => single_key("Ref", Value::String(id)),
            Some(attribute) => single_key(
                "Fn::GetAtt",
                Value::Sequence(vec![Value::String(id), Value::String(attribute)]),
            ),
        })
    }

    fn sub_variable(&mut self, node: &str, token: &ReferenceToken) -> Option<String> {
        let id = self.target_id(node, &token.target)?;
        Some(match self.attribute(token) {
            None => id,
            Some(attribute) => format!("{}.{}", id, attribute),
        })
    }
}

fn single_key(key: &str, value: Value) -> Value {
    let mut map = Mapping::new();
    map.insert(Value::String(key.to_string()), value);
    Value::Mapping(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrane_model::{EdgeKind, EdgeOrigin, MetadataBag, PropertyMap};

    fn cfn_node(id: &str, canonical: &str, native: &str) -> ResourceNode {
        let mut metadata = MetadataBag::for_dialect(Dialect::CloudFormation);
        metadata.set_extension("native_type", native.into());
        ResourceNode::new(id, canonical).with_metadata(metadata)
    }

    #[test]
    fn test_emit_refs_tags_and_depends_on() {
        let mut graph = ResourceGraph::new(Dialect::CloudFormation);
        let mut tags = PropertyMap::new();
        tags.insert("team".into(), "infra".into());
        graph
            .add_node(
                cfn_node("Logs", "storage.bucket", "AWS::S3::Bucket")
                    .with_property("bucket_name", "logs".into())
                    .with_property("tags", PropertyValue::Map(tags)),
            )
            .unwrap();
        graph
            .add_node(
                cfn_node("Fn", "compute.function", "AWS::Lambda::Function")
                    .with_property("role", PropertyValue::Reference(ReferenceToken::attribute("Logs", "Arn"))),
            )
            .unwrap();
        graph.derive_reference_edges();
        graph.connect("Fn", "Logs", EdgeKind::DependsOn, EdgeOrigin::Explicit);

        let output = CloudFormationEmitter.emit(&graph, &EmitOptions::default()).unwrap();
        let text = output.artifact("template.yaml").unwrap();
        let doc: Value = serde_yaml::from_str(text).unwrap();
        let expected: Value = serde_yaml::from_str(
            r#"
AWSTemplateFormatVersion: '2010-09-09'
Resources:
  Logs:
    Type: AWS::S3::Bucket
    Properties:
      BucketName: logs
      Tags:
        - Key: team
          Value: infra
  Fn:
    Type: AWS::Lambda::Function
    DependsOn: Logs
    Properties:
      Role:
        Fn::GetAtt: [Logs, Arn]
"#,
        )
        .unwrap();
        assert_eq!(doc, expected);
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_cross_dialect_reference_and_shared() {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        graph.add_node(ResourceNode::new("aws_vpc.main", "network.vpc")).unwrap();
        graph
            .add_node(
                ResourceNode::new("aws_subnet.a", "network.subnet")
                    .with_property("vpc_id", PropertyValue::Reference(ReferenceToken::attribute("aws_vpc.main", "id")))
                    .with_property("cidr_block", PropertyValue::Shared("subnet_cidr".into())),
            )
            .unwrap();
        graph.definitions.insert("subnet_cidr".into(), "10.0.1.0/24".into());
        graph.derive_reference_edges();

        let output = CloudFormationEmitter.emit(&graph, &EmitOptions::default()).unwrap();
        let doc: Value = serde_yaml::from_str(output.artifact("template.yaml").unwrap()).unwrap();
        let subnet = &doc["Resources"]["AwsSubnetA"]["Properties"];
        let vpc_ref: Value = serde_yaml::from_str("Ref: AwsVpcMain").unwrap();
        assert_eq!(subnet["VpcId"], vpc_ref);
        let find: Value = serde_yaml::from_str("Fn::FindInMap: [SharedValues, Default, subnet_cidr]").unwrap();
        assert_eq!(subnet["CidrBlock"], find);
        assert_eq!(
            doc["Mappings"]["SharedValues"]["Default"]["subnet_cidr"],
            Value::String("10.0.1.0/24".into())
        );
    }

    #[test]
    fn test_dangling_reference_is_placeholder() {
        let mut graph = ResourceGraph::new(Dialect::CloudFormation);
        graph
            .add_node(
                cfn_node("Fn", "compute.function", "AWS::Lambda::Function")
                    .with_property("role", PropertyValue::Reference(ReferenceToken::new("Missing"))),
            )
            .unwrap();
        graph.derive_reference_edges();
        let output = CloudFormationEmitter.emit(&graph, &EmitOptions::default()).unwrap();
        assert!(output.artifact("template.yaml").unwrap().contains("<unresolved:Missing>"));
        assert_eq!(output.warnings[0].kind, EmissionWarningKind::DanglingReference);
    }
}
