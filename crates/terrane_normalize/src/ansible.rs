//! Ansible playbooks and vars files to graph fragment.
//!
//! Plays become `config.play` nodes that contain their tasks. Tasks of
//! `pre_tasks`, `tasks` and `post_tasks` are chained by ordering edges in
//! execution order; `notify` becomes a reference to the handler.

use regex::Regex;
use serde_yaml::Value;
use terrane_dialects::metadata::{FREE_FORM, NATIVE_TYPE, SECTION, TASK_KEYWORDS};
use terrane_dialects::parse::{AnsibleFile, Play, PlaybookEntry, Task, TaskSection};
use terrane_dialects::values::{get_str, key_string, mapping_to_properties, yaml_to_property};
use terrane_model::mapping::{canonical_type_or_unknown, PLAY_TYPE};
use terrane_model::naming::slugify;
use terrane_model::{
    Dialect, EdgeKind, EdgeOrigin, MetadataBag, PassthroughBlock, PropertyValue, ResourceGraph, ResourceNode,
    SourceOrigin, WarningKind,
};
use tracing::debug;

use crate::fragment::Fragment;
use crate::properties::PropertyConverter;

/// Whether `path` is the vars file holding shared definitions.
pub fn is_definitions_file(path: &str) -> bool {
    let path = path.replace('\\', "/");
    path.ends_with("group_vars/all.yml") || path.ends_with("group_vars/all.yaml") || path == "group_vars/all"
}

/// Split a `k=v k2="v 2"` argument string. `None` when any token is not
/// a `key=value` pair.
pub fn split_free_form(text: &str) -> Option<Vec<(String, String)>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), '\\') if chars.peek() == Some(&q) => {
                current.push(q);
                chars.next();
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if quote.is_some() {
        return None;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    if tokens.is_empty() {
        return None;
    }

    let key = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex");
    tokens
        .into_iter()
        .map(|token| {
            let (k, v) = token.split_once('=')?;
            key.is_match(k).then(|| (k.to_string(), v.to_string()))
        })
        .collect()
}

/// Build the fragment for one playbook or vars file.
pub fn fragment(path: &str, file: &AnsibleFile) -> Fragment {
    let mut fragment = Fragment::new(path);
    match file {
        AnsibleFile::Vars(vars) if is_definitions_file(path) => {
            for (key, value) in vars {
                fragment.definitions.insert(key_string(key), yaml_to_property(value));
            }
        }
        AnsibleFile::Vars(vars) => {
            let text = serde_yaml::to_string(&Value::Mapping(vars.clone())).unwrap_or_default();
            fragment.passthrough(PassthroughBlock::new(Dialect::Ansible, "vars", text));
        }
        AnsibleFile::Playbook(entries) => {
            for entry in entries {
                match entry {
                    PlaybookEntry::Play(play) => self::play(&mut fragment, play),
                    PlaybookEntry::Import { text, .. } => {
                        fragment.passthrough(PassthroughBlock::new(Dialect::Ansible, "import_playbook", text.clone()))
                    }
                }
            }
        }
    }
    debug!("Normalized {}: {} nodes", path, fragment.nodes.len());
    fragment
}

fn play(fragment: &mut Fragment, play: &Play) {
    let label = play
        .name
        .clone()
        .or_else(|| get_str(&play.attributes, "hosts").map(str::to_string))
        .unwrap_or_default();
    let slug = match slugify(&label) {
        s if s.is_empty() => "play".to_string(),
        s => s,
    };
    let mut node = ResourceNode::new(format!("play/{}", slug), PLAY_TYPE)
        .with_metadata(MetadataBag::for_dialect(Dialect::Ansible))
        .with_origin(SourceOrigin::new(fragment.file.clone(), play.line));
    node.properties = mapping_to_properties(&play.attributes);
    let play_id = fragment.push_unique(node);
    let play_slug = play_id.trim_start_matches("play/").to_string();

    let mut sections: Vec<&(TaskSection, Vec<Task>)> = play.sections.iter().collect();
    sections.sort_by_key(|(section, _)| *section);

    let mut previous: Option<String> = None;
    let mut handlers: Vec<(String, &Task)> = Vec::new();
    let mut notifiers: Vec<(String, &Task)> = Vec::new();
    for (section, tasks) in sections {
        for task in tasks {
            let id = self::task(fragment, &play_slug, *section, task);
            fragment.edge(&play_id, &id, EdgeKind::Contains, EdgeOrigin::Ownership);
            if *section == TaskSection::Handlers {
                handlers.push((id.clone(), task));
            } else {
                if let Some(previous) = &previous {
                    fragment.edge(&id, previous, EdgeKind::DependsOn, EdgeOrigin::Ordering);
                }
                previous = Some(id.clone());
            }
            if !task.notifies().is_empty() {
                notifiers.push((id, task));
            }
        }
    }

    for (id, task) in notifiers {
        for name in task.notifies() {
            let handler = handlers
                .iter()
                .find(|(_, handler)| handler.name.as_deref() == Some(name.as_str()) || listens(handler, &name));
            match handler {
                Some((handler_id, _)) if *handler_id != id => {
                    fragment.edge(&id, handler_id, EdgeKind::DependsOn, EdgeOrigin::Reference)
                }
                Some(_) => {}
                None => {
                    let missing = format!("task/{}/{}", play_slug, slugify(&name));
                    fragment.edge(&id, &missing, EdgeKind::DependsOn, EdgeOrigin::Reference);
                }
            }
        }
    }
}

fn listens(handler: &Task, topic: &str) -> bool {
    match handler.keyword("listen") {
        Some(Value::String(s)) => s == topic,
        Some(Value::Sequence(items)) => items.iter().any(|i| i.as_str() == Some(topic)),
        _ => false,
    }
}

fn task(fragment: &mut Fragment, play_slug: &str, section: TaskSection, task: &Task) -> String {
    let label = task.name.clone().unwrap_or_else(|| task.module.clone());
    let slug = match slugify(&label) {
        s if s.is_empty() => "task".to_string(),
        s => s,
    };
    let canonical = canonical_type_or_unknown(Dialect::Ansible, &task.module);
    let mut node = ResourceNode::new(format!("task/{}/{}", play_slug, slug), &canonical)
        .with_metadata(MetadataBag::for_dialect(Dialect::Ansible))
        .with_origin(SourceOrigin::new(fragment.file.clone(), task.line));
    node.metadata.set_extension(NATIVE_TYPE, task.module.clone().into());
    node.metadata.set_extension(SECTION, section.as_str().into());
    if !task.keywords.is_empty() {
        node.metadata
            .set_extension(TASK_KEYWORDS, PropertyValue::Map(mapping_to_properties(&task.keywords)));
    }

    let mut deferred = Vec::new();
    let converter = PropertyConverter::new(Dialect::Ansible, &canonical);
    match &task.free_form {
        Some(command) if canonical.starts_with("exec.") => {
            node.properties.insert("cmd".into(), command.clone().into());
            node.metadata.set_extension(FREE_FORM, true.into());
        }
        Some(text) => match split_free_form(text).filter(|_| task.args.is_empty()) {
            Some(pairs) => {
                for (key, value) in pairs {
                    deferred.push((key, PropertyValue::String(value)));
                }
                node.metadata.set_extension(FREE_FORM, true.into());
            }
            None => node
                .metadata
                .set_extension(FREE_FORM, PropertyValue::String(text.clone())),
        },
        None => {}
    }
    for (key, value) in &task.args {
        deferred.push((key_string(key), yaml_to_property(value)));
    }
    for (key, value) in deferred {
        converter.assign(&mut node, &key, value, fragment);
    }

    let id = fragment.push_unique(node);
    if canonical.starts_with(terrane_model::UNKNOWN_PREFIX) {
        fragment.warn(
            WarningKind::UnknownType,
            Some(&id),
            format!("module {} has no canonical mapping", task.module),
        );
    }
    id
}

/// Replace `"{{ name }}"` strings with shared definition uses where the
/// name is defined.
pub fn resolve(graph: &mut ResourceGraph) {
    let pattern = Regex::new(r"^\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}$").expect("valid regex");
    let defined: Vec<String> = graph.definitions.keys().cloned().collect();
    for node in graph.nodes_mut() {
        if !node.metadata.is_from(Dialect::Ansible) {
            continue;
        }
        for value in node.properties.values_mut() {
            share(value, &pattern, &defined);
        }
    }
}

fn share(value: &mut PropertyValue, pattern: &Regex, defined: &[String]) {
    match value {
        PropertyValue::String(text) => {
            let name = pattern
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .filter(|name| defined.contains(name));
            if let Some(name) = name {
                *value = PropertyValue::Shared(name);
            }
        }
        PropertyValue::List(items) => {
            for item in items {
                share(item, pattern, defined);
            }
        }
        PropertyValue::Map(map) => {
            for item in map.values_mut() {
                share(item, pattern, defined);
            }
        }
        _ => {}
    }
}
