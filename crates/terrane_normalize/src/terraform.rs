//! Terraform syntax tree to graph fragment.

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use terrane_dialects::metadata::{BLOCK_ATTRIBUTES, META_ARGUMENTS, NATIVE_TYPE, RAW_BLOCKS};
use terrane_dialects::parse::{Expr, HclBlock, HclBody, HclFile, TemplatePart};
use terrane_model::mapping::canonical_type_or_unknown;
use terrane_model::{
    Dialect, EdgeKind, EdgeOrigin, MetadataBag, NativeExpression, ParseError, PassthroughBlock, PropertyMap,
    PropertyValue, ReferenceToken, ResourceNode, SourceOrigin, TemplateSegment, WarningKind,
};
use tracing::debug;

use crate::fragment::Fragment;
use crate::properties::PropertyConverter;

/// Traversal roots that never name a resource.
const RESERVED_ROOTS: &[&str] = &[
    "var", "local", "data", "module", "path", "count", "each", "self", "terraform",
];

const META_ARGUMENT_NAMES: &[&str] = &["count", "for_each", "provider"];

/// Nested blocks kept as source text.
const RAW_BLOCK_KINDS: &[&str] = &["lifecycle", "dynamic", "provisioner", "connection"];

/// Nested blocks that are lists even when they appear once.
pub const REPEATABLE_BLOCKS: &[&str] = &[
    "ingress",
    "egress",
    "rule",
    "statement",
    "setting",
    "tag",
    "ebs_block_device",
    "network_interface",
    "origin",
    "listener",
    "condition",
    "filter",
    "volume",
    "container",
];

/// Top-level blocks with no node equivalent.
const PASSTHROUGH_BLOCKS: &[&str] = &[
    "variable",
    "output",
    "provider",
    "terraform",
    "data",
    "module",
    "import",
    "check",
    "removed",
];

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^\w.\-])(\p{L}[\w\-]*)\.([\p{L}_][\w\-]*)").expect("valid regex")
    })
}

fn is_resource_root(root: &str) -> bool {
    root.contains('_') && !RESERVED_ROOTS.contains(&root)
}

/// Resource addresses mentioned in expression text, first mention first.
pub fn scan_tokens(text: &str) -> Vec<ReferenceToken> {
    let mut tokens: Vec<ReferenceToken> = Vec::new();
    for caps in token_pattern().captures_iter(text) {
        if !is_resource_root(&caps[1]) {
            continue;
        }
        let target = format!("{}.{}", &caps[1], &caps[2]);
        if !tokens.iter().any(|t| t.target == target) {
            tokens.push(ReferenceToken::new(target));
        }
    }
    tokens
}

/// Canonical value of an HCL expression.
pub fn expr_to_property(expr: &Expr) -> PropertyValue {
    match expr {
        Expr::Null => PropertyValue::Null,
        Expr::Bool(b) => PropertyValue::Bool(*b),
        Expr::Number(text) => {
            if let Ok(i) = text.parse::<i64>() {
                PropertyValue::Int(i)
            } else if let Ok(f) = text.parse::<f64>() {
                PropertyValue::Float(f)
            } else {
                PropertyValue::Expression(NativeExpression::new(Dialect::Terraform, text.clone()))
            }
        }
        Expr::Template(parts) => template(parts),
        Expr::List(items) => PropertyValue::List(items.iter().map(expr_to_property).collect()),
        Expr::Object(entries) => PropertyValue::Map(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), expr_to_property(value)))
                .collect(),
        ),
        Expr::Traversal(parts) => traversal(parts),
        Expr::Raw(text) => raw_expression(text),
    }
}

fn raw_expression(text: &str) -> PropertyValue {
    PropertyValue::Expression(NativeExpression::new(Dialect::Terraform, text).with_references(scan_tokens(text)))
}

fn resource_token(parts: &[String]) -> Option<ReferenceToken> {
    if parts.len() < 2 || !is_resource_root(&parts[0]) {
        return None;
    }
    let target = format!("{}.{}", parts[0], parts[1]);
    Some(if parts.len() > 2 {
        ReferenceToken::attribute(target, parts[2..].join("."))
    } else {
        ReferenceToken::new(target)
    })
}

fn traversal(parts: &[String]) -> PropertyValue {
    if parts.len() == 2 && parts[0] == "local" {
        return PropertyValue::Shared(parts[1].clone());
    }
    match resource_token(parts) {
        Some(token) => PropertyValue::Reference(token),
        None => PropertyValue::Expression(NativeExpression::new(Dialect::Terraform, parts.join("."))),
    }
}

fn template(parts: &[TemplatePart]) -> PropertyValue {
    if let [TemplatePart::Interpolation(inner)] = parts {
        return expr_to_property(inner);
    }
    let mut literal = String::new();
    let mut segments = Vec::new();
    let mut interpolated = false;
    for part in parts {
        match part {
            TemplatePart::Literal(text) => literal.push_str(text),
            TemplatePart::Interpolation(inner) => {
                interpolated = true;
                if !literal.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut literal)));
                }
                let segment = match inner.as_ref() {
                    Expr::Traversal(parts) => match resource_token(parts) {
                        Some(token) => TemplateSegment::Reference(token),
                        None => TemplateSegment::Expression(parts.join(".")),
                    },
                    other => TemplateSegment::Expression(expr_source(other)),
                };
                segments.push(segment);
            }
        }
    }
    if !interpolated {
        return PropertyValue::String(literal);
    }
    if !literal.is_empty() {
        segments.push(TemplateSegment::Literal(literal));
    }
    PropertyValue::Template(segments)
}

/// Source text of an expression inside an interpolation.
fn expr_source(expr: &Expr) -> String {
    match expr {
        Expr::Null => "null".to_string(),
        Expr::Bool(b) => b.to_string(),
        Expr::Number(text) | Expr::Raw(text) => text.clone(),
        Expr::Traversal(parts) => parts.join("."),
        Expr::Template(parts) => {
            let mut out = String::from("\"");
            for part in parts {
                match part {
                    TemplatePart::Literal(text) => out.push_str(&text.replace('"', "\\\"")),
                    TemplatePart::Interpolation(inner) => out.push_str(&format!("${{{}}}", expr_source(inner))),
                }
            }
            out.push('"');
            out
        }
        Expr::List(items) => format!("[{}]", items.iter().map(expr_source).collect::<Vec<_>>().join(", ")),
        Expr::Object(entries) => format!(
            "{{ {} }}",
            entries
                .iter()
                .map(|(k, v)| format!("{} = {}", k, expr_source(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Targets named by a `depends_on` list.
fn depends_on_targets(expr: &Expr) -> Vec<String> {
    match expr {
        Expr::List(items) => items
            .iter()
            .filter_map(|item| match item {
                Expr::Traversal(parts) if parts.len() >= 2 => Some(format!("{}.{}", parts[0], parts[1])),
                _ => None,
            })
            .collect(),
        Expr::Raw(text) => scan_tokens(text).into_iter().map(|t| t.target).collect(),
        _ => Vec::new(),
    }
}

/// Build the fragment for one `.tf` file.
pub fn fragment(path: &str, file: &HclFile) -> Fragment {
    let mut fragment = Fragment::new(path);

    for attribute in &file.body.attributes {
        fragment.warn(
            WarningKind::UnsupportedConstruct,
            None,
            format!("top-level attribute {} at line {} ignored", attribute.name, attribute.line),
        );
    }

    for block in &file.body.blocks {
        match block.kind.as_str() {
            "resource" => resource(&mut fragment, block),
            "locals" => {
                for attribute in &block.body.attributes {
                    fragment
                        .definitions
                        .insert(attribute.name.clone(), expr_to_property(&attribute.value));
                }
            }
            "moved" => {
                let from = block.body.attribute("from").map(|a| a.text.trim().to_string());
                let to = block.body.attribute("to").map(|a| a.text.trim().to_string());
                match (from, to) {
                    (Some(from), Some(to)) => {
                        fragment.aliases.insert(from, to);
                    }
                    _ => fragment.warn(
                        WarningKind::UnsupportedConstruct,
                        None,
                        format!("moved block at line {} needs from and to", block.line),
                    ),
                }
            }
            kind if PASSTHROUGH_BLOCKS.contains(&kind) => {
                fragment.passthrough(PassthroughBlock::new(Dialect::Terraform, kind, block.text.trim_end()));
            }
            kind => {
                fragment.warn(
                    WarningKind::UnsupportedConstruct,
                    None,
                    format!("unknown top-level block {} kept verbatim", kind),
                );
                fragment.passthrough(PassthroughBlock::new(Dialect::Terraform, kind, block.text.trim_end()));
            }
        }
    }

    debug!(
        "Normalized {}: {} resources, {} locals",
        path,
        fragment.nodes.len(),
        fragment.definitions.len()
    );
    fragment
}

fn resource(fragment: &mut Fragment, block: &HclBlock) {
    let (native, name) = match block.labels.as_slice() {
        [native, name] => (native.clone(), name.clone()),
        labels => {
            let err = ParseError::new(
                fragment.file.clone(),
                Some(block.line),
                "resource block needs a type label and a name label",
            )
            .with_resource(labels.join("."));
            fragment.errors.push(err);
            return;
        }
    };
    let id = format!("{}.{}", native, name);
    let canonical = canonical_type_or_unknown(Dialect::Terraform, &native);

    let mut node = ResourceNode::new(&id, &canonical)
        .with_metadata(MetadataBag::for_dialect(Dialect::Terraform))
        .with_origin(SourceOrigin::new(fragment.file.clone(), Some(block.line)));
    node.metadata.set_extension(NATIVE_TYPE, native.clone().into());
    if node.is_opaque() {
        fragment.warn(
            WarningKind::UnknownType,
            Some(&id),
            format!("terraform type {} has no canonical mapping", native),
        );
    }

    let converter = PropertyConverter::new(Dialect::Terraform, &canonical);
    let mut meta = PropertyMap::new();
    for attribute in &block.body.attributes {
        match attribute.name.as_str() {
            "depends_on" => {
                for target in depends_on_targets(&attribute.value) {
                    fragment.edge(&id, &target, EdgeKind::DependsOn, EdgeOrigin::Explicit);
                }
            }
            name if META_ARGUMENT_NAMES.contains(&name) => {
                meta.insert(name.to_string(), PropertyValue::String(attribute.text.trim().to_string()));
            }
            name => {
                let value = expr_to_property(&attribute.value);
                converter.assign(&mut node, name, value, fragment);
            }
        }
    }

    let mut block_paths = Vec::new();
    let mut raw_blocks = Vec::new();
    let mut nested = Vec::new();
    for child in &block.body.blocks {
        if RAW_BLOCK_KINDS.contains(&child.kind.as_str()) || !child.labels.is_empty() {
            raw_blocks.push(child.text.trim_end().to_string());
        } else {
            nested.push(child);
        }
    }
    for (kind, value) in group_blocks(&nested, "", &mut block_paths) {
        converter.assign(&mut node, &kind, value, fragment);
    }

    if !meta.is_empty() {
        node.metadata.set_extension(META_ARGUMENTS, PropertyValue::Map(meta));
    }
    if !block_paths.is_empty() {
        node.metadata
            .set_extension(BLOCK_ATTRIBUTES, terrane_dialects::metadata::list_value(block_paths));
    }
    if !raw_blocks.is_empty() {
        node.metadata
            .set_extension(RAW_BLOCKS, terrane_dialects::metadata::list_value(raw_blocks));
    }

    for token in node.properties.values().flat_map(template_expression_tokens) {
        fragment.optional_edge(&id, &token);
    }
    fragment.nodes.push(node);
}

/// Group nested blocks by kind, recording each block's dotted path.
fn group_blocks(blocks: &[&HclBlock], prefix: &str, paths: &mut Vec<String>) -> Vec<(String, PropertyValue)> {
    let mut grouped: IndexMap<String, Vec<PropertyValue>> = IndexMap::new();
    for block in blocks {
        let path = if prefix.is_empty() {
            block.kind.clone()
        } else {
            format!("{}.{}", prefix, block.kind)
        };
        let map = block_map(&block.body, &path, paths);
        if !paths.contains(&path) {
            paths.push(path);
        }
        grouped.entry(block.kind.clone()).or_default().push(PropertyValue::Map(map));
    }
    grouped
        .into_iter()
        .map(|(kind, mut items)| {
            let value = if items.len() == 1 && !REPEATABLE_BLOCKS.contains(&kind.as_str()) {
                items.remove(0)
            } else {
                PropertyValue::List(items)
            };
            (kind, value)
        })
        .collect()
}

fn block_map(body: &HclBody, path: &str, paths: &mut Vec<String>) -> PropertyMap {
    let mut map: PropertyMap = body
        .attributes
        .iter()
        .map(|attribute| (attribute.name.clone(), expr_to_property(&attribute.value)))
        .collect();
    let children: Vec<&HclBlock> = body.blocks.iter().collect();
    for (kind, value) in group_blocks(&children, path, paths) {
        map.insert(kind, value);
    }
    map
}

/// Resource addresses mentioned in template expression segments, which
/// carry no tokens of their own.
fn template_expression_tokens(value: &PropertyValue) -> Vec<String> {
    let mut out = Vec::new();
    match value {
        PropertyValue::Template(segments) => {
            for segment in segments {
                if let TemplateSegment::Expression(text) = segment {
                    out.extend(scan_tokens(text).into_iter().map(|t| t.target));
                }
            }
        }
        PropertyValue::List(items) => {
            for item in items {
                out.extend(template_expression_tokens(item));
            }
        }
        PropertyValue::Map(map) => {
            for item in map.values() {
                out.extend(template_expression_tokens(item));
            }
        }
        _ => {}
    }
    out
}
