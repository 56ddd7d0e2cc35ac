//! Typed property values.
//!
//! Cross-resource references never appear as raw strings: they are
//! [`ReferenceToken`]s that the graph resolves to a depends-on edge.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

/// Ordered property map.
pub type PropertyMap = IndexMap<String, PropertyValue>;

/// A typed reference to another node in the same graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceToken {
    /// Identifier of the referenced node
    pub target: String,
    /// Attribute read from the target (e.g. `id`, `arn`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl ReferenceToken {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            attribute: None,
        }
    }

    pub fn attribute(target: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            attribute: Some(attribute.into()),
        }
    }
}

/// A dialect-native expression with no canonical meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeExpression {
    pub dialect: Dialect,
    pub text: String,
    /// Nodes mentioned inside the expression
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceToken>,
}

impl NativeExpression {
    pub fn new(dialect: Dialect, text: impl Into<String>) -> Self {
        Self {
            dialect,
            text: text.into(),
            references: Vec::new(),
        }
    }

    pub fn with_references(mut self, references: Vec<ReferenceToken>) -> Self {
        self.references = references;
        self
    }
}

/// One piece of an interpolated string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TemplateSegment {
    Literal(String),
    Reference(ReferenceToken),
    Expression(String),
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
    Map(PropertyMap),
    Reference(ReferenceToken),
    Template(Vec<TemplateSegment>),
    /// Use of a graph-level shared definition
    Shared(String),
    Expression(NativeExpression),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&PropertyMap> {
        match self {
            PropertyValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            PropertyValue::Null
                | PropertyValue::Bool(_)
                | PropertyValue::Int(_)
                | PropertyValue::Float(_)
                | PropertyValue::String(_)
        )
    }

    /// True when the value (recursively) contains no references, templates,
    /// shared uses or native expressions.
    pub fn is_literal(&self) -> bool {
        match self {
            PropertyValue::List(items) => items.iter().all(PropertyValue::is_literal),
            PropertyValue::Map(map) => map.values().all(PropertyValue::is_literal),
            other => other.is_scalar(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "integer",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::List(_) => "list",
            PropertyValue::Map(_) => "map",
            PropertyValue::Reference(_) => "reference",
            PropertyValue::Template(_) => "template",
            PropertyValue::Shared(_) => "shared",
            PropertyValue::Expression(_) => "expression",
        }
    }

    /// Look up a nested map entry by key path.
    pub fn get_path(&self, path: &[&str]) -> Option<&PropertyValue> {
        let mut current = self;
        for key in path {
            current = current.as_map()?.get(*key)?;
        }
        Some(current)
    }

    /// All reference tokens inside this value, in document order.
    pub fn references(&self) -> Vec<&ReferenceToken> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a ReferenceToken>) {
        match self {
            PropertyValue::Reference(token) => out.push(token),
            PropertyValue::Template(segments) => {
                for segment in segments {
                    if let TemplateSegment::Reference(token) = segment {
                        out.push(token);
                    }
                }
            }
            PropertyValue::Expression(expr) => out.extend(expr.references.iter()),
            PropertyValue::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            PropertyValue::Map(map) => {
                for value in map.values() {
                    value.collect_references(out);
                }
            }
            _ => {}
        }
    }

    /// Visit every reference token mutably.
    pub fn for_each_reference_mut(&mut self, f: &mut dyn FnMut(&mut ReferenceToken)) {
        match self {
            PropertyValue::Reference(token) => f(token),
            PropertyValue::Template(segments) => {
                for segment in segments.iter_mut() {
                    if let TemplateSegment::Reference(token) = segment {
                        f(token);
                    }
                }
            }
            PropertyValue::Expression(expr) => {
                for token in expr.references.iter_mut() {
                    f(token);
                }
            }
            PropertyValue::List(items) => {
                for item in items.iter_mut() {
                    item.for_each_reference_mut(f);
                }
            }
            PropertyValue::Map(map) => {
                for value in map.values_mut() {
                    value.for_each_reference_mut(f);
                }
            }
            _ => {}
        }
    }

    /// Point every reference to `old` at `new`, including identifiers
    /// spelled out inside native expression text. Returns the number of
    /// tokens rewritten.
    pub fn retarget(&mut self, old: &str, new: &str) -> usize {
        let mut count = 0;
        self.retarget_inner(old, new, &mut count);
        count
    }

    fn retarget_inner(&mut self, old: &str, new: &str, count: &mut usize) {
        match self {
            PropertyValue::Reference(token) => {
                if token.target == old {
                    token.target = new.to_string();
                    *count += 1;
                }
            }
            PropertyValue::Template(segments) => {
                for segment in segments.iter_mut() {
                    match segment {
                        TemplateSegment::Reference(token) if token.target == old => {
                            token.target = new.to_string();
                            *count += 1;
                        }
                        TemplateSegment::Expression(text) => {
                            *text = rewrite_identifier(text, old, new);
                        }
                        _ => {}
                    }
                }
            }
            PropertyValue::Expression(expr) => {
                let mut touched = false;
                for token in expr.references.iter_mut() {
                    if token.target == old {
                        token.target = new.to_string();
                        touched = true;
                        *count += 1;
                    }
                }
                if touched {
                    expr.text = rewrite_identifier(&expr.text, old, new);
                }
            }
            PropertyValue::List(items) => {
                for item in items.iter_mut() {
                    item.retarget_inner(old, new, count);
                }
            }
            PropertyValue::Map(map) => {
                for value in map.values_mut() {
                    value.retarget_inner(old, new, count);
                }
            }
            _ => {}
        }
    }

    /// Visit every string leaf together with the nearest map key above it.
    pub fn walk_strings<'a>(&'a self, key: Option<&'a str>, f: &mut dyn FnMut(Option<&'a str>, &'a str)) {
        match self {
            PropertyValue::String(s) => f(key, s),
            PropertyValue::Template(segments) => {
                for segment in segments {
                    if let TemplateSegment::Literal(s) = segment {
                        f(key, s);
                    }
                }
            }
            PropertyValue::List(items) => {
                for item in items {
                    item.walk_strings(key, f);
                }
            }
            PropertyValue::Map(map) => {
                for (k, v) in map {
                    v.walk_strings(Some(k.as_str()), f);
                }
            }
            _ => {}
        }
    }

    /// Short single-line rendering used in messages and comment stubs.
    pub fn display_compact(&self) -> String {
        match self {
            PropertyValue::Null => "null".to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::String(s) => format!("{:?}", s),
            PropertyValue::List(items) => format!(
                "[{}]",
                items.iter().map(|i| i.display_compact()).collect::<Vec<_>>().join(", ")
            ),
            PropertyValue::Map(map) => format!(
                "{{{}}}",
                map.iter()
                    .map(|(k, v)| format!("{} = {}", k, v.display_compact()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            PropertyValue::Reference(token) => match &token.attribute {
                Some(attr) => format!("ref({}.{})", token.target, attr),
                None => format!("ref({})", token.target),
            },
            PropertyValue::Template(segments) => {
                let mut out = String::from("\"");
                for segment in segments {
                    match segment {
                        TemplateSegment::Literal(s) => out.push_str(s),
                        TemplateSegment::Reference(token) => {
                            out.push_str(&format!("${{ref({})}}", token.target))
                        }
                        TemplateSegment::Expression(e) => out.push_str(&format!("${{{}}}", e)),
                    }
                }
                out.push('"');
                out
            }
            PropertyValue::Shared(name) => format!("shared({})", name),
            PropertyValue::Expression(expr) => format!("expr({})", expr.text),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<f64> for PropertyValue {
    fn from(f: f64) -> Self {
        PropertyValue::Float(f)
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(items: Vec<PropertyValue>) -> Self {
        PropertyValue::List(items)
    }
}

impl From<PropertyMap> for PropertyValue {
    fn from(map: PropertyMap) -> Self {
        PropertyValue::Map(map)
    }
}

/// Replace whole-identifier occurrences of `old` with `new` in expression text.
pub fn rewrite_identifier(text: &str, old: &str, new: &str) -> String {
    if old.is_empty() || !text.contains(old) {
        return text.to_string();
    }
    let pattern = format!(r"(^|[^A-Za-z0-9_.\-]){}([^A-Za-z0-9_\-]|$)", regex::escape(old));
    match Regex::new(&pattern) {
        Ok(re) => re
            .replace_all(text, |caps: &regex::Captures<'_>| {
                format!("{}{}{}", &caps[1], new, &caps[2])
            })
            .into_owned(),
        Err(_) => text.to_string(),
    }
}
