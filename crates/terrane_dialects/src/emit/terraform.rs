//! Terraform (HCL) emitter.

use std::collections::{BTreeMap, HashMap};

use terrane_model::mapping::native_property_name;
use terrane_model::naming::{terraform_name, to_snake_case};
use terrane_model::{
    Dialect, EmissionWarningKind, PropertyMap, PropertyValue, ReferenceToken, ResourceGraph, ResourceNode,
    TemplateSegment,
};
use tracing::debug;

use super::{assign_names, single_line, EmitContext, EmitOptions, EmitOutput, Emitter};
use crate::error::DialectResult;
use crate::metadata::{map_extension, string_list, BLOCK_ATTRIBUTES, META_ARGUMENTS, RAW_BLOCKS};

const LOCALS_ARTIFACT: &str = "locals.tf";

pub struct TerraformEmitter;

impl Emitter for TerraformEmitter {
    fn dialect(&self) -> Dialect {
        Dialect::Terraform
    }

    fn emit(&self, graph: &ResourceGraph, options: &EmitOptions) -> DialectResult<EmitOutput> {
        let ctx = EmitContext::new(graph, Dialect::Terraform, options);
        let addresses = addresses(&ctx);
        let mut writer = HclWriter { ctx, addresses };
        let mut chunks: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let main = Dialect::Terraform.default_artifact().to_string();

        for block in &graph.passthrough {
            if block.dialect == Dialect::Terraform {
                let file = block.file.clone().unwrap_or_else(|| main.clone());
                chunks.entry(file).or_default().push(block.text.trim_end().to_string());
            } else {
                writer.ctx.warn(
                    EmissionWarningKind::PassthroughDropped,
                    None,
                    format!("{} {} block has no terraform equivalent", block.dialect, block.kind),
                );
            }
        }

        if !graph.definitions.is_empty() {
            let locals = writer.locals();
            chunks.entry(LOCALS_ARTIFACT.to_string()).or_default().push(locals);
        }

        for node in graph.nodes() {
            let artifact = writer.ctx.artifact(node);
            let chunk = match writer.ctx.native_type(node) {
                Some(native) => writer.resource(node, &native),
                None => writer.ctx.stub_lines(node, "#").join("\n"),
            };
            chunks.entry(artifact).or_default().push(chunk);
        }

        let mut aliases = writer.ctx.live_aliases();
        aliases.extend(writer.rewritten_addresses());
        if !aliases.is_empty() {
            let chunk = writer.aliases(&aliases);
            chunks.entry(main).or_default().push(chunk);
        }

        let banner = writer.ctx.banner_lines("#");
        let mut output = EmitOutput::default();
        for (file, parts) in chunks {
            let mut text = String::new();
            if !banner.is_empty() {
                text.push_str(&banner.join("\n"));
                text.push_str("\n\n");
            }
            text.push_str(&parts.join("\n\n"));
            text.push('\n');
            output.artifacts.insert(file, text);
        }
        output.warnings = writer.ctx.warnings;
        Ok(output)
    }
}

/// `type.name` address per translatable node.
fn addresses(ctx: &EmitContext<'_>) -> HashMap<String, String> {
    let names = assign_names(ctx.graph, "_", |node| match ctx.native_type(node) {
        Some(native) => {
            let prefix = format!("{}.", native);
            let name = match node.id.strip_prefix(&prefix) {
                Some(rest) if ctx.is_native(node) && is_identifier(rest) => rest.to_string(),
                _ => terraform_name(&node.id),
            };
            format!("{}.{}", native, name)
        }
        None => format!("#{}", node.id),
    });
    names.into_iter().filter(|(_, address)| !address.starts_with('#')).collect()
}

pub(crate) fn is_identifier(s: &str) -> bool {
    hcl_edit::Ident::try_new(s).is_ok()
}

/// Quoted HCL string literal.
pub fn hcl_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    out.push_str(&escape_template_literal(s));
    out.push('"');
    out
}

fn escape_template_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '$' | '%' if chars.get(i + 1) == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn pad(indent: usize) -> String {
    " ".repeat(indent)
}

struct HclWriter<'a> {
    ctx: EmitContext<'a>,
    addresses: HashMap<String, String>,
}

impl<'a> HclWriter<'a> {
    fn resource(&mut self, node: &ResourceNode, native: &str) -> String {
        let address = self
            .addresses
            .get(&node.id)
            .cloned()
            .unwrap_or_else(|| format!("{}.{}", native, terraform_name(&node.id)));
        let name = address.strip_prefix(&format!("{}.", native)).unwrap_or(&address).to_string();
        debug!("Emitting resource {} as {}", node.id, address);

        let mut lines = self.ctx.hint_lines(node, "#");
        lines.push(format!("resource {} {} {{", hcl_string(native), hcl_string(&name)));

        let native_node = self.ctx.is_native(node);
        if native_node {
            for (key, value) in map_extension(node, META_ARGUMENTS) {
                if let Some(text) = value.as_str() {
                    lines.push(format!("  {} = {}", key, text));
                }
            }
        }

        let block_paths = if native_node {
            string_list(node, BLOCK_ATTRIBUTES)
        } else {
            Vec::new()
        };
        let mut body = PropertyMap::new();
        for (name, value) in &node.properties {
            let native_name = native_property_name(Dialect::Terraform, &node.resource_type, name);
            let native_name = if is_identifier(&native_name) {
                native_name
            } else {
                terraform_name(&to_snake_case(&native_name))
            };
            body.insert(native_name, value.clone());
        }
        if native_node {
            for (name, value) in &node.metadata.opaque {
                body.insert(name.clone(), value.clone());
            }
        }
        lines.extend(self.body(&node.id, &body, &block_paths, "", 2));

        let dependencies = self.ctx.explicit_dependencies(node);
        let targets: Vec<String> = dependencies
            .iter()
            .filter_map(|target| self.addresses.get(target).cloned())
            .collect();
        if !targets.is_empty() {
            lines.push(format!("  depends_on = [{}]", targets.join(", ")));
        }

        if native_node {
            let raw = string_list(node, RAW_BLOCKS);
            if !raw.is_empty() {
                lines.push(String::new());
                for block in raw {
                    lines.push(format!("  {}", block.trim_end()));
                }
            }
        }

        lines.push("}".to_string());
        lines.join("\n")
    }

    fn body(&mut self, node: &str, body: &PropertyMap, block_paths: &[String], prefix: &str, indent: usize) -> Vec<String> {
        let mut lines = Vec::new();
        for (name, value) in body {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            let is_block = block_paths.contains(&path);
            match value {
                PropertyValue::Map(map) if is_block => {
                    lines.extend(self.block(node, name, map, block_paths, &path, indent));
                }
                PropertyValue::List(items) if is_block && items.iter().all(|i| i.as_map().is_some()) => {
                    for item in items {
                        if let PropertyValue::Map(map) = item {
                            lines.extend(self.block(node, name, map, block_paths, &path, indent));
                        }
                    }
                }
                _ => {
                    let key = if is_identifier(name) { name.clone() } else { hcl_string(name) };
                    let rendered = self.value(node, value, indent);
                    lines.push(format!("{}{} = {}", pad(indent), key, rendered));
                }
            }
        }
        lines
    }

    fn block(
        &mut self,
        node: &str,
        name: &str,
        map: &PropertyMap,
        block_paths: &[String],
        path: &str,
        indent: usize,
    ) -> Vec<String> {
        let mut lines = vec![format!("{}{} {{", pad(indent), name)];
        lines.extend(self.body(node, map, block_paths, path, indent + 2));
        lines.push(format!("{}}}", pad(indent)));
        lines
    }

    fn value(&mut self, node: &str, value: &PropertyValue, indent: usize) -> String {
        match value {
            PropertyValue::Null => "null".to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Float(f) => format!("{:?}", f),
            PropertyValue::String(s) => hcl_string(s),
            PropertyValue::List(items) => {
                if items.is_empty() {
                    return "[]".to_string();
                }
                let rendered: Vec<String> = items.iter().map(|i| self.value(node, i, indent + 2)).collect();
                let inline = items.iter().all(|i| !matches!(i, PropertyValue::List(_) | PropertyValue::Map(_)));
                if inline {
                    format!("[{}]", rendered.join(", "))
                } else {
                    let mut out = String::from("[\n");
                    for item in rendered {
                        out.push_str(&format!("{}{},\n", pad(indent + 2), item));
                    }
                    out.push_str(&format!("{}]", pad(indent)));
                    out
                }
            }
            PropertyValue::Map(map) => {
                if map.is_empty() {
                    return "{}".to_string();
                }
                let mut out = String::from("{\n");
                for (key, item) in map {
                    let key = if is_identifier(key) { key.clone() } else { hcl_string(key) };
                    let rendered = self.value(node, item, indent + 2);
                    out.push_str(&format!("{}{} = {}\n", pad(indent + 2), key, rendered));
                }
                out.push_str(&format!("{}}}", pad(indent)));
                out
            }
            PropertyValue::Reference(token) => match self.traversal(node, token) {
                Some(address) => address,
                None => format!("null /* unresolved reference: {} */", single_line(&token.target)),
            },
            PropertyValue::Template(segments) => {
                let mut out = String::from("\"");
                for segment in segments {
                    match segment {
                        TemplateSegment::Literal(s) => out.push_str(&escape_template_literal(s)),
                        TemplateSegment::Reference(token) => match self.traversal(node, token) {
                            Some(address) => out.push_str(&format!("${{{}}}", address)),
                            None => out.push_str(&escape_template_literal(&format!("<unresolved:{}>", token.target))),
                        },
                        TemplateSegment::Expression(text) => {
                            if self.ctx.same_dialect() {
                                out.push_str(&format!("${{{}}}", text));
                            } else {
                                let source = self.ctx.graph.dialect();
                                self.ctx.untranslatable_expression(node, source, text);
                                out.push_str(&escape_template_literal(&format!("<untranslatable: {}>", text)));
                            }
                        }
                    }
                }
                out.push('"');
                out
            }
            PropertyValue::Shared(name) => {
                if self.ctx.graph.definitions.contains_key(name) {
                    format!("local.{}", local_name(name))
                } else {
                    self.ctx.warn(
                        EmissionWarningKind::DanglingReference,
                        Some(node),
                        format!("shared value {} is not defined", name),
                    );
                    format!("null /* undefined shared value: {} */", single_line(name))
                }
            }
            PropertyValue::Expression(expr) => {
                if expr.dialect == Dialect::Terraform {
                    expr.text.clone()
                } else {
                    self.ctx.untranslatable_expression(node, expr.dialect, &expr.text);
                    format!(
                        "null /* untranslatable {} expression: {} */",
                        expr.dialect,
                        single_line(&expr.text)
                    )
                }
            }
        }
    }

    /// Address of a reference, `None` (with a warning) when it cannot be emitted.
    fn traversal(&mut self, node: &str, token: &ReferenceToken) -> Option<String> {
        let address = match self.addresses.get(&token.target) {
            Some(address) => address.clone(),
            None => {
                if self.ctx.exists(&token.target) {
                    self.ctx.warn(
                        EmissionWarningKind::UntranslatableResource,
                        Some(node),
                        format!("reference to untranslatable resource {} emitted as a placeholder", token.target),
                    );
                } else {
                    self.ctx.unresolved(node, &token.target);
                }
                return None;
            }
        };
        let attribute = match (&token.attribute, self.ctx.same_dialect()) {
            (Some(attribute), true) => Some(attribute.clone()),
            (Some(attribute), false) => Some(
                attribute
                    .split('.')
                    .map(to_snake_case)
                    .collect::<Vec<_>>()
                    .join("."),
            ),
            (None, true) => None,
            (None, false) => Some("id".to_string()),
        };
        Some(match attribute {
            Some(attribute) => format!("{}.{}", address, attribute),
            None => address,
        })
    }

    fn locals(&mut self) -> String {
        let graph = self.ctx.graph;
        let mut lines = vec!["locals {".to_string()];
        for (name, value) in &graph.definitions {
            let rendered = self.value("locals", value, 2);
            lines.push(format!("  {} = {}", local_name(name), rendered));
        }
        lines.push("}".to_string());
        lines.join("\n")
    }

    /// Native nodes whose address had to change on emission, as
    /// `(id, id)` pairs so they get a `moved` block.
    fn rewritten_addresses(&self) -> Vec<(String, String)> {
        if !self.ctx.same_dialect() {
            return Vec::new();
        }
        self.ctx
            .graph
            .nodes()
            .filter(|node| self.ctx.is_native(node) && is_address(&node.id))
            .filter(|node| self.addresses.get(&node.id).is_some_and(|address| *address != node.id))
            .filter(|node| !self.ctx.graph.aliases.contains_key(&node.id))
            .map(|node| (node.id.clone(), node.id.clone()))
            .collect()
    }

    fn aliases(&mut self, aliases: &[(String, String)]) -> String {
        let mut chunks = Vec::new();
        for (old, new) in aliases {
            let target = self.addresses.get(new).cloned();
            match target {
                Some(to) if self.ctx.same_dialect() && is_address(old) => {
                    chunks.push(format!("moved {{\n  from = {}\n  to   = {}\n}}", old, to));
                }
                _ => chunks.push(format!("# renamed: {} -> {}", single_line(old), single_line(new))),
            }
        }
        chunks.join("\n\n")
    }
}

fn is_address(id: &str) -> bool {
    match id.split_once('.') {
        Some((kind, name)) => is_identifier(kind) && is_identifier(name),
        None => false,
    }
}

/// Local value name for a shared definition.
pub fn local_name(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        terraform_name(&to_snake_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrane_model::{EdgeKind, EdgeOrigin, MetadataBag, NativeExpression};

    fn tf_node(id: &str, canonical: &str, native: &str) -> ResourceNode {
        let mut metadata = MetadataBag::for_dialect(Dialect::Terraform);
        metadata.set_extension("native_type", native.into());
        ResourceNode::new(id, canonical).with_metadata(metadata)
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(hcl_string("a\"b\\c\n${x} %{y}"), r#""a\"b\\c\n$${x} %%{y}""#);
    }

    #[test]
    fn test_emit_resource_with_reference_and_depends_on() {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        graph
            .add_node(tf_node("aws_vpc.main", "network.vpc", "aws_vpc").with_property("cidr_block", "10.0.0.0/16".into()))
            .unwrap();
        graph
            .add_node(
                tf_node("aws_subnet.a", "network.subnet", "aws_subnet")
                    .with_property("vpc_id", PropertyValue::Reference(ReferenceToken::attribute("aws_vpc.main", "id"))),
            )
            .unwrap();
        graph.derive_reference_edges();
        graph.connect("aws_subnet.a", "aws_vpc.main", EdgeKind::DependsOn, EdgeOrigin::Explicit);

        let output = TerraformEmitter.emit(&graph, &EmitOptions::default()).unwrap();
        let main = output.artifact("main.tf").unwrap();
        assert!(main.contains("resource \"aws_vpc\" \"main\" {\n  cidr_block = \"10.0.0.0/16\"\n}"));
        assert!(main.contains("  vpc_id = aws_vpc.main.id"));
        assert!(main.contains("  depends_on = [aws_vpc.main]"));
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_cross_dialect_expression_becomes_placeholder() {
        let mut graph = ResourceGraph::new(Dialect::CloudFormation);
        graph
            .add_node(ResourceNode::new("Queue", "messaging.queue").with_property(
                "name",
                PropertyValue::Expression(NativeExpression::new(Dialect::CloudFormation, r#"{"Ref":"AWS::StackName"}"#)),
            ))
            .unwrap();
        let output = TerraformEmitter.emit(&graph, &EmitOptions::default()).unwrap();
        let main = output.artifact("main.tf").unwrap();
        assert!(main.contains("resource \"aws_sqs_queue\" \"Queue\""));
        assert!(main.contains("name = null /* untranslatable cloudformation expression"));
        assert_eq!(output.warnings[0].kind, EmissionWarningKind::UntranslatableExpression);
    }

    #[test]
    fn test_untranslatable_resource_stub() {
        let mut graph = ResourceGraph::new(Dialect::Kubernetes);
        graph
            .add_node(ResourceNode::new("deployment/web", "workload.deployment").with_property("replicas", 3i64.into()))
            .unwrap();
        let output = TerraformEmitter.emit(&graph, &EmitOptions::default().with_banner("unresolved errors"))
            .unwrap();
        let main = output.artifact("main.tf").unwrap();
        assert!(main.starts_with("# unresolved errors\n"));
        assert!(main.contains("# untranslatable resource deployment/web (workload.deployment)"));
        assert!(main.contains("#   replicas = 3"));
        assert_eq!(output.warnings[0].kind, EmissionWarningKind::UntranslatableResource);
    }

    #[test]
    fn test_nested_blocks_and_locals() {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        let mut rule = PropertyMap::new();
        rule.insert("from_port".into(), 443i64.into());
        let mut node = tf_node("aws_security_group.web", "network.securitygroup", "aws_security_group")
            .with_property("ingress", PropertyValue::List(vec![PropertyValue::Map(rule)]))
            .with_property("name", PropertyValue::Shared("team".into()));
        node.metadata.set_extension(BLOCK_ATTRIBUTES, PropertyValue::List(vec!["ingress".into()]));
        graph.add_node(node).unwrap();
        graph.definitions.insert("team".into(), "infra".into());

        let output = TerraformEmitter.emit(&graph, &EmitOptions::default()).unwrap();
        let main = output.artifact("main.tf").unwrap();
        assert!(main.contains("  ingress {\n    from_port = 443\n  }"));
        assert!(main.contains("  name = local.team"));
        assert_eq!(output.artifact("locals.tf"), Some("locals {\n  team = \"infra\"\n}\n"));
    }

    #[test]
    fn test_unicode_names_keep_their_address() {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        graph
            .add_node(tf_node("aws_s3_bucket.é", "storage.bucket", "aws_s3_bucket").with_property("bucket", "x".into()))
            .unwrap();
        let output = TerraformEmitter.emit(&graph, &EmitOptions::default()).unwrap();
        let main = output.artifact("main.tf").unwrap();
        assert!(main.contains("resource \"aws_s3_bucket\" \"é\" {"));
        assert!(!main.contains("moved"));
    }

    #[test]
    fn test_rewritten_address_gets_moved_block() {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        graph
            .add_node(tf_node("aws_s3_bucket.logs", "storage.bucket", "aws_s3_bucket_v2").with_property("bucket", "x".into()))
            .unwrap();
        let output = TerraformEmitter.emit(&graph, &EmitOptions::default()).unwrap();
        let main = output.artifact("main.tf").unwrap();
        assert!(main.contains("resource \"aws_s3_bucket_v2\" \"aws_s3_bucket_logs\" {"), "{}", main);
        assert!(main.contains("moved {\n  from = aws_s3_bucket.logs\n  to   = aws_s3_bucket_v2.aws_s3_bucket_logs\n}"));
    }

    #[test]
    fn test_emitted_hcl_parses_back() {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        let mut tags = PropertyMap::new();
        tags.insert("Name".into(), "web".into());
        tags.insert("cost center".into(), "a\"b".into());
        graph
            .add_node(tf_node("aws_vpc.main", "network.vpc", "aws_vpc").with_property("cidr_block", "10.0.0.0/16".into()))
            .unwrap();
        graph
            .add_node(
                tf_node("aws_subnet.a", "network.subnet", "aws_subnet")
                    .with_property("vpc_id", PropertyValue::Reference(ReferenceToken::attribute("aws_vpc.main", "id")))
                    .with_property("tags", PropertyValue::Map(tags))
                    .with_property("description", "uses ${literal} and %{ if x }".into()),
            )
            .unwrap();
        graph.derive_reference_edges();

        let output = TerraformEmitter.emit(&graph, &EmitOptions::default().with_banner("generated")).unwrap();
        let main = output.artifact("main.tf").unwrap();
        let (file, errors) = crate::parse::parse_hcl("main.tf", main);
        assert!(errors.is_empty(), "{:?}\n{}", errors, main);
        assert_eq!(file.body.blocks.len(), 2);
        let subnet = file.body.blocks.iter().find(|b| b.labels[0] == "aws_subnet").unwrap();
        assert_eq!(
            subnet.body.attribute("description").unwrap().value.as_literal_str().as_deref(),
            Some("uses ${literal} and %{ if x }")
        );
        assert_eq!(
            subnet.body.attribute("vpc_id").unwrap().value,
            crate::parse::Expr::Traversal(vec!["aws_vpc".into(), "main".into(), "id".into()])
        );
    }
}
