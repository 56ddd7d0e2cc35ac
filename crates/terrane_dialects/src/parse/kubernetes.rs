//! Kubernetes manifest reader. Each `---` document is parsed on its own,
//! so one broken document does not hide the rest of the file.

use serde_yaml::{Mapping, Value};
use terrane_model::ParseError;

use crate::values::{get, get_str};

#[derive(Debug, Clone, PartialEq)]
pub struct KubeDocument {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    /// The whole document
    pub body: Mapping,
    /// First line of the document in its file
    pub line: usize,
}

/// Split a multi-document stream, returning each document with its first line.
pub fn split_documents(text: &str) -> Vec<(usize, String)> {
    let mut documents = Vec::new();
    let mut current = String::new();
    let mut start = 1;

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed.starts_with("--- ") {
            documents.push((start, std::mem::take(&mut current)));
            start = index + 2;
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    documents.push((start, current));

    documents
        .into_iter()
        .filter(|(_, doc)| {
            doc.lines()
                .any(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        })
        .collect()
}

pub fn parse_kubernetes(file: &str, text: &str) -> (Vec<KubeDocument>, Vec<ParseError>) {
    let mut documents = Vec::new();
    let mut errors = Vec::new();

    let chunks = if file.to_lowercase().ends_with(".json") {
        vec![(1, text.to_string())]
    } else {
        split_documents(text)
    };

    for (line, chunk) in chunks {
        let value: Value = match serde_yaml::from_str(&chunk) {
            Ok(value) => value,
            Err(err) => {
                let at = err.location().map(|l| line + l.line() - 1).unwrap_or(line);
                errors.push(ParseError::new(file, Some(at), format!("invalid YAML document: {}", err)));
                continue;
            }
        };
        match value {
            Value::Null => {}
            Value::Mapping(map) => {
                if get_str(&map, "kind") == Some("List") {
                    let items = match get(&map, "items") {
                        Some(Value::Sequence(items)) => items.clone(),
                        _ => Vec::new(),
                    };
                    for item in items {
                        match item {
                            Value::Mapping(item) => push_document(file, item, line, &mut documents, &mut errors),
                            _ => errors.push(ParseError::new(file, Some(line), "List item is not a mapping")),
                        }
                    }
                } else {
                    push_document(file, map, line, &mut documents, &mut errors);
                }
            }
            _ => errors.push(ParseError::new(file, Some(line), "manifest document must be a mapping")),
        }
    }

    (documents, errors)
}

fn push_document(
    file: &str,
    body: Mapping,
    line: usize,
    documents: &mut Vec<KubeDocument>,
    errors: &mut Vec<ParseError>,
) {
    let api_version = get_str(&body, "apiVersion").map(str::to_string);
    let kind = get_str(&body, "kind").map(str::to_string);
    let (api_version, kind) = match (api_version, kind) {
        (Some(a), Some(k)) => (a, k),
        _ => {
            errors.push(ParseError::new(file, Some(line), "document lacks apiVersion or kind"));
            return;
        }
    };

    let metadata = match get(&body, "metadata") {
        Some(Value::Mapping(m)) => m.clone(),
        _ => Mapping::new(),
    };
    let name = match get_str(&metadata, "name") {
        Some(name) => name.to_string(),
        None => {
            errors.push(
                ParseError::new(file, Some(line), format!("{} has no metadata.name", kind)).with_resource(kind),
            );
            return;
        }
    };
    let namespace = get_str(&metadata, "namespace").map(str::to_string);

    documents.push(KubeDocument {
        api_version,
        kind,
        name,
        namespace,
        body,
        line,
    });
}
