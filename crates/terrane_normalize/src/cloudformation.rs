//! CloudFormation template to graph fragment.

use serde_yaml::{Mapping, Value};
use terrane_dialects::metadata::{CFN_ALIASES_KEY, CFN_SHARED_KEY, CFN_SHARED_MAPPING, NATIVE_TYPE, RESOURCE_ATTRIBUTES};
use terrane_dialects::parse::{CfnResource, CfnTemplate};
use terrane_dialects::values::{get, key_string, mapping_to_properties, yaml_to_property};
use terrane_model::mapping::canonical_type_or_unknown;
use terrane_model::{
    Dialect, EdgeKind, EdgeOrigin, MetadataBag, NativeExpression, PassthroughBlock, PropertyMap, PropertyValue,
    ReferenceToken, ResourceNode, SourceOrigin, TemplateSegment, WarningKind,
};
use tracing::debug;

use crate::fragment::Fragment;
use crate::properties::PropertyConverter;

/// Converts template values, knowing which names are parameters.
struct ValueReader {
    parameters: Vec<String>,
}

impl ValueReader {
    /// Parameters and pseudo parameters are not resources.
    fn is_resource(&self, name: &str) -> bool {
        !name.starts_with("AWS::") && !self.parameters.iter().any(|p| p == name)
    }

    fn expression(&self, value: &Value) -> PropertyValue {
        let text = serde_json::to_string(value).unwrap_or_default();
        let mut references = Vec::new();
        self.scan(value, &mut references);
        PropertyValue::Expression(NativeExpression::new(Dialect::CloudFormation, text).with_references(references))
    }

    /// Ref and GetAtt targets anywhere inside an intrinsic.
    fn scan(&self, value: &Value, out: &mut Vec<ReferenceToken>) {
        match value {
            Value::Mapping(map) => {
                if let Some(token) = self.single_token(map) {
                    if !out.iter().any(|t| t.target == token.target) {
                        out.push(ReferenceToken::new(token.target));
                    }
                }
                for item in map.values() {
                    self.scan(item, out);
                }
            }
            Value::Sequence(items) => {
                for item in items {
                    self.scan(item, out);
                }
            }
            Value::String(text) => {
                for segment in self.sub_segments(text) {
                    if let TemplateSegment::Reference(token) = segment {
                        if !out.iter().any(|t| t.target == token.target) {
                            out.push(ReferenceToken::new(token.target));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// `Ref` or `Fn::GetAtt` naming a resource.
    fn single_token(&self, map: &Mapping) -> Option<ReferenceToken> {
        if map.len() != 1 {
            return None;
        }
        let (key, value) = map.iter().next()?;
        match (key.as_str()?, value) {
            ("Ref", Value::String(target)) if self.is_resource(target) => Some(ReferenceToken::new(target.clone())),
            ("Fn::GetAtt", Value::Sequence(items)) if items.len() == 2 => {
                let target = items[0].as_str()?;
                let attribute = items[1].as_str()?;
                self.is_resource(target)
                    .then(|| ReferenceToken::attribute(target, attribute))
            }
            ("Fn::GetAtt", Value::String(text)) => {
                let (target, attribute) = text.split_once('.')?;
                self.is_resource(target)
                    .then(|| ReferenceToken::attribute(target, attribute))
            }
            _ => None,
        }
    }

    /// Split an `Fn::Sub` string into template segments.
    fn sub_segments(&self, text: &str) -> Vec<TemplateSegment> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            literal.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            if let Some(escaped) = after.strip_prefix('!') {
                literal.push_str("${");
                rest = escaped;
                continue;
            }
            let end = match after.find('}') {
                Some(end) => end,
                None => {
                    literal.push_str(&rest[start..]);
                    rest = "";
                    break;
                }
            };
            let variable = after[..end].trim();
            if !literal.is_empty() {
                segments.push(TemplateSegment::Literal(std::mem::take(&mut literal)));
            }
            let (target, attribute) = match variable.split_once('.') {
                Some((target, attribute)) => (target, Some(attribute)),
                None => (variable, None),
            };
            if self.is_resource(target) {
                segments.push(TemplateSegment::Reference(ReferenceToken {
                    target: target.to_string(),
                    attribute: attribute.map(str::to_string),
                }));
            } else {
                segments.push(TemplateSegment::Expression(variable.to_string()));
            }
            rest = &after[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(TemplateSegment::Literal(literal));
        }
        segments
    }

    fn value(&self, value: &Value) -> PropertyValue {
        match value {
            Value::Mapping(map) if map.len() == 1 => {
                if let Some(token) = self.single_token(map) {
                    return PropertyValue::Reference(token);
                }
                let (key, inner) = match map.iter().next() {
                    Some(entry) => entry,
                    None => return PropertyValue::Map(PropertyMap::new()),
                };
                let key = key_string(key);
                match (key.as_str(), inner) {
                    ("Fn::Sub", Value::String(text)) => {
                        let segments = self.sub_segments(text);
                        match segments.as_slice() {
                            [] => PropertyValue::Template(vec![TemplateSegment::Literal(String::new())]),
                            _ => PropertyValue::Template(segments),
                        }
                    }
                    ("Fn::FindInMap", Value::Sequence(items))
                        if items.len() == 3
                            && items[0].as_str() == Some(CFN_SHARED_MAPPING)
                            && items[1].as_str() == Some(CFN_SHARED_KEY)
                            && items[2].is_string() =>
                    {
                        PropertyValue::Shared(items[2].as_str().unwrap_or_default().to_string())
                    }
                    (k, _) if k == "Ref" || k.starts_with("Fn::") || k == "Condition" => self.expression(value),
                    _ => PropertyValue::Map(self.mapping(map)),
                }
            }
            Value::Mapping(map) => PropertyValue::Map(self.mapping(map)),
            Value::Sequence(items) => PropertyValue::List(items.iter().map(|i| self.value(i)).collect()),
            other => yaml_to_property(other),
        }
    }

    fn mapping(&self, map: &Mapping) -> PropertyMap {
        map.iter().map(|(k, v)| (key_string(k), self.value(v))).collect()
    }
}

/// `[{Key, Value}]` tag lists become a map.
fn tags_map(value: &Value, reader: &ValueReader) -> Option<PropertyValue> {
    let items = value.as_sequence()?;
    let mut tags = PropertyMap::new();
    for item in items {
        let map = item.as_mapping()?;
        if map.len() != 2 {
            return None;
        }
        let key = get(map, "Key")?.as_str()?;
        let value = get(map, "Value")?;
        tags.insert(key.to_string(), reader.value(value));
    }
    Some(PropertyValue::Map(tags))
}

/// Build the fragment for one template file.
pub fn fragment(path: &str, template: &CfnTemplate) -> Fragment {
    let mut fragment = Fragment::new(path);
    let reader = ValueReader {
        parameters: template.parameter_names(),
    };

    for resource in &template.resources {
        node(&mut fragment, &reader, resource);
    }

    for (name, value) in &template.sections {
        match name.as_str() {
            "AWSTemplateFormatVersion" => {}
            "Mappings" => {
                let rest = split_section(value, CFN_SHARED_MAPPING, |shared| {
                    if let Some(Value::Mapping(defaults)) = get(shared, CFN_SHARED_KEY) {
                        for (key, item) in defaults {
                            fragment.definitions.insert(key_string(key), reader.value(item));
                        }
                    }
                });
                section_passthrough(&mut fragment, name, rest);
            }
            "Metadata" => {
                let rest = split_section(value, CFN_ALIASES_KEY, |aliases| {
                    for (old, new) in aliases {
                        if let Some(new) = new.as_str() {
                            fragment.aliases.insert(key_string(old), new.to_string());
                        }
                    }
                });
                section_passthrough(&mut fragment, name, rest);
            }
            _ => section_passthrough(&mut fragment, name, Some(value.clone())),
        }
    }

    debug!("Normalized {}: {} resources", path, fragment.nodes.len());
    fragment
}

/// Hand the `key` entry of a section to `take`; returns what is left.
fn split_section(value: &Value, key: &str, mut take: impl FnMut(&Mapping)) -> Option<Value> {
    let map = match value {
        Value::Mapping(map) => map,
        other => return Some(other.clone()),
    };
    let mut rest = Mapping::new();
    for (k, v) in map {
        match (k.as_str(), v) {
            (Some(name), Value::Mapping(inner)) if name == key => take(inner),
            _ => {
                rest.insert(k.clone(), v.clone());
            }
        }
    }
    (!rest.is_empty()).then_some(Value::Mapping(rest))
}

fn section_passthrough(fragment: &mut Fragment, name: &str, value: Option<Value>) {
    let Some(value) = value else {
        return;
    };
    let mut section = Mapping::new();
    section.insert(Value::String(name.to_string()), value);
    let text = serde_yaml::to_string(&Value::Mapping(section)).unwrap_or_default();
    fragment.passthrough(PassthroughBlock::new(Dialect::CloudFormation, name, text));
}

fn node(fragment: &mut Fragment, reader: &ValueReader, resource: &CfnResource) {
    let id = resource.logical_id.clone();
    let canonical = canonical_type_or_unknown(Dialect::CloudFormation, &resource.resource_type);
    let mut node = ResourceNode::new(&id, &canonical)
        .with_metadata(MetadataBag::for_dialect(Dialect::CloudFormation))
        .with_origin(SourceOrigin::new(fragment.file.clone(), resource.line));
    node.metadata
        .set_extension(NATIVE_TYPE, resource.resource_type.clone().into());
    if node.is_opaque() {
        fragment.warn(
            WarningKind::UnknownType,
            Some(&id),
            format!("cloudformation type {} has no canonical mapping", resource.resource_type),
        );
    }

    let converter = PropertyConverter::new(Dialect::CloudFormation, &canonical);
    for (key, value) in &resource.properties {
        let native = key_string(key);
        let converted = match native.as_str() {
            "Tags" if !node.is_opaque() => tags_map(value, reader).unwrap_or_else(|| reader.value(value)),
            _ => reader.value(value),
        };
        converter.assign(&mut node, &native, converted, fragment);
    }

    if !resource.attributes.is_empty() {
        node.metadata.set_extension(
            RESOURCE_ATTRIBUTES,
            PropertyValue::Map(mapping_to_properties(&resource.attributes)),
        );
    }
    for target in &resource.depends_on {
        fragment.edge(&id, target, EdgeKind::DependsOn, EdgeOrigin::Explicit);
    }
    fragment.nodes.push(node);
}
