//! CloudFormation template reader (YAML or JSON).

use serde_yaml::{Mapping, Value};
use terrane_model::ParseError;

use crate::values::{find_line, get, key_string};

/// Resource-level keys other than `Type`, `Properties` and `DependsOn`.
pub const RESOURCE_ATTRIBUTES: &[&str] = &[
    "Condition",
    "DeletionPolicy",
    "UpdateReplacePolicy",
    "Metadata",
    "CreationPolicy",
    "UpdatePolicy",
];

#[derive(Debug, Clone, PartialEq)]
pub struct CfnResource {
    pub logical_id: String,
    pub resource_type: String,
    pub properties: Mapping,
    pub depends_on: Vec<String>,
    /// `Condition`, `DeletionPolicy`, ...
    pub attributes: Mapping,
    pub line: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CfnTemplate {
    pub resources: Vec<CfnResource>,
    /// Every other top-level section, in document order
    pub sections: Vec<(String, Value)>,
}

impl CfnTemplate {
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Names declared under `Parameters`.
    pub fn parameter_names(&self) -> Vec<String> {
        match self.section("Parameters") {
            Some(Value::Mapping(map)) => map.keys().map(key_string).collect(),
            _ => Vec::new(),
        }
    }
}

/// Rewrite short-form intrinsic tags (`!Ref`, `!GetAtt`, `!Sub`, ...) to
/// their long form.
pub fn expand_short_tags(value: Value) -> Value {
    match value {
        Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let name = tag.trim_start_matches('!').to_string();
            let inner = expand_short_tags(tagged.value);
            let (key, inner) = match name.as_str() {
                "Ref" | "Condition" => (name.clone(), inner),
                "GetAtt" => {
                    let inner = match inner {
                        Value::String(s) => match s.split_once('.') {
                            Some((resource, attribute)) => Value::Sequence(vec![
                                Value::String(resource.to_string()),
                                Value::String(attribute.to_string()),
                            ]),
                            None => Value::String(s),
                        },
                        other => other,
                    };
                    ("Fn::GetAtt".to_string(), inner)
                }
                other => (format!("Fn::{}", other), inner),
            };
            let mut map = Mapping::new();
            map.insert(Value::String(key), inner);
            Value::Mapping(map)
        }
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(expand_short_tags).collect()),
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, expand_short_tags(v)))
                .collect(),
        ),
        other => other,
    }
}

fn load(file: &str, text: &str) -> Result<Value, ParseError> {
    if file.to_lowercase().ends_with(".json") {
        serde_json::from_str::<Value>(text)
            .map_err(|e| ParseError::new(file, Some(e.line()), format!("invalid JSON: {}", e)))
    } else {
        serde_yaml::from_str::<Value>(text).map_err(|e| {
            let line = e.location().map(|l| l.line());
            ParseError::new(file, line, format!("invalid YAML: {}", e))
        })
    }
}

pub fn parse_cloudformation(file: &str, text: &str) -> (CfnTemplate, Vec<ParseError>) {
    let mut template = CfnTemplate::default();
    let mut errors = Vec::new();

    let root = match load(file, text) {
        Ok(value) => expand_short_tags(value),
        Err(err) => return (template, vec![err]),
    };
    let root = match root {
        Value::Mapping(map) => map,
        Value::Null => return (template, errors),
        _ => {
            errors.push(ParseError::new(file, Some(1), "template root must be a mapping"));
            return (template, errors);
        }
    };

    for (key, value) in root {
        let name = key_string(&key);
        if name != "Resources" {
            template.sections.push((name, value));
            continue;
        }
        let resources = match value {
            Value::Mapping(map) => map,
            Value::Null => continue,
            _ => {
                errors.push(ParseError::new(file, find_line(text, "Resources", 1), "Resources must be a mapping"));
                continue;
            }
        };
        let resources_line = find_line(text, "Resources", 1).unwrap_or(1);
        for (id, body) in resources {
            let logical_id = key_string(&id);
            let line = find_line(text, &format!("{}:", logical_id), resources_line)
                .or_else(|| find_line(text, &format!("\"{}\"", logical_id), resources_line));
            match parse_resource(&logical_id, body) {
                Ok(mut resource) => {
                    resource.line = line;
                    template.resources.push(resource);
                }
                Err(message) => {
                    errors.push(ParseError::new(file, line, message).with_resource(logical_id));
                }
            }
        }
    }

    (template, errors)
}

fn parse_resource(logical_id: &str, body: Value) -> Result<CfnResource, String> {
    let body = match body {
        Value::Mapping(map) => map,
        _ => return Err(format!("resource {} must be a mapping", logical_id)),
    };
    let resource_type = match get(&body, "Type") {
        Some(Value::String(t)) => t.clone(),
        Some(_) => return Err(format!("resource {} has a non-string Type", logical_id)),
        None => return Err(format!("resource {} has no Type", logical_id)),
    };

    let properties = match get(&body, "Properties") {
        Some(Value::Mapping(map)) => map.clone(),
        Some(Value::Null) | None => Mapping::new(),
        Some(_) => return Err(format!("Properties of {} must be a mapping", logical_id)),
    };

    let depends_on = match get(&body, "DependsOn") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Sequence(items)) => {
            let mut targets = Vec::new();
            for item in items {
                match item.as_str() {
                    Some(s) => targets.push(s.to_string()),
                    None => return Err(format!("DependsOn of {} must list logical ids", logical_id)),
                }
            }
            targets
        }
        Some(_) => return Err(format!("DependsOn of {} must be a string or list", logical_id)),
    };

    let attributes = body
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), Some("Type") | Some("Properties") | Some("DependsOn")))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(CfnResource {
        logical_id: logical_id.to_string(),
        resource_type,
        properties,
        depends_on,
        attributes,
        line: None,
    })
}
