//! Conversions between YAML values and literal property values.

use serde_yaml::{Mapping, Number, Value};
use terrane_model::{PropertyMap, PropertyValue};

/// Stringify a YAML mapping key.
pub fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

pub fn number_to_property(n: &Number) -> PropertyValue {
    if let Some(i) = n.as_i64() {
        PropertyValue::Int(i)
    } else if let Some(f) = n.as_f64() {
        PropertyValue::Float(f)
    } else {
        PropertyValue::String(n.to_string())
    }
}

/// Literal conversion; no dialect reference syntax is interpreted.
pub fn yaml_to_property(value: &Value) -> PropertyValue {
    match value {
        Value::Null => PropertyValue::Null,
        Value::Bool(b) => PropertyValue::Bool(*b),
        Value::Number(n) => number_to_property(n),
        Value::String(s) => PropertyValue::String(s.clone()),
        Value::Sequence(items) => PropertyValue::List(items.iter().map(yaml_to_property).collect()),
        Value::Mapping(map) => PropertyValue::Map(mapping_to_properties(map)),
        Value::Tagged(tagged) => {
            let mut map = PropertyMap::new();
            map.insert(tagged.tag.to_string(), yaml_to_property(&tagged.value));
            PropertyValue::Map(map)
        }
    }
}

pub fn mapping_to_properties(map: &Mapping) -> PropertyMap {
    map.iter()
        .map(|(k, v)| (key_string(k), yaml_to_property(v)))
        .collect()
}

/// Literal conversion back to YAML. Non-literal values fall back to
/// their compact display form; emitters handle them before calling this.
pub fn property_to_yaml(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Null => Value::Null,
        PropertyValue::Bool(b) => Value::Bool(*b),
        PropertyValue::Int(i) => Value::Number((*i).into()),
        PropertyValue::Float(f) => Value::Number((*f).into()),
        PropertyValue::String(s) => Value::String(s.clone()),
        PropertyValue::List(items) => Value::Sequence(items.iter().map(property_to_yaml).collect()),
        PropertyValue::Map(map) => Value::Mapping(
            map.iter()
                .map(|(k, v)| (Value::String(k.clone()), property_to_yaml(v)))
                .collect(),
        ),
        other => Value::String(other.display_compact()),
    }
}

/// Mapping lookup by string key.
pub fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(Value::String(key.to_string()))
}

pub fn get_str<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    get(map, key).and_then(Value::as_str)
}

/// 1-based line of the first line whose trimmed text starts with `needle`.
pub fn find_line(text: &str, needle: &str, from_line: usize) -> Option<usize> {
    text.lines()
        .enumerate()
        .skip(from_line.saturating_sub(1))
        .find(|(_, line)| line.trim_start().trim_start_matches("- ").starts_with(needle))
        .map(|(i, _)| i + 1)
}
