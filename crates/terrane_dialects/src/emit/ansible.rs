//! Ansible playbook emitter.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};
use terrane_model::mapping::{native_property_name, PLAY_TYPE};
use terrane_model::{
    Dialect, EmissionWarningKind, PropertyValue, ResourceGraph, ResourceNode, TemplateSegment,
};

use super::{dependency_order, single_line, EmitContext, EmitOptions, EmitOutput, Emitter};
use crate::error::DialectResult;
use crate::metadata::{map_extension, FREE_FORM, SECTION, TASK_KEYWORDS};
use crate::parse::TaskSection;
use crate::values::property_to_yaml;

/// Vars file holding shared definitions.
pub const DEFINITIONS_ARTIFACT: &str = "group_vars/all.yml";

/// Name of the play that collects tasks without one.
pub const GENERATED_PLAY: &str = "Terrane generated";

/// Command modules keep their command line in `cmd`.
fn is_exec(resource_type: &str) -> bool {
    resource_type.starts_with("exec.")
}

/// Join properties into a `k=v` argument string, quoting values with spaces.
pub fn join_free_form(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| {
            if v.is_empty() || v.chars().any(char::is_whitespace) {
                format!("{}=\"{}\"", k, v.replace('"', "\\\""))
            } else {
                format!("{}={}", k, v)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct AnsibleEmitter;

impl Emitter for AnsibleEmitter {
    fn dialect(&self) -> Dialect {
        Dialect::Ansible
    }

    fn emit(&self, graph: &ResourceGraph, options: &EmitOptions) -> DialectResult<EmitOutput> {
        let mut writer = PlaybookWriter {
            ctx: EmitContext::new(graph, Dialect::Ansible, options),
        };
        let default_artifact = Dialect::Ansible.default_artifact().to_string();

        let mut plays: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        let mut stubs: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut comments: Vec<String> = Vec::new();
        let mut orphans: Vec<String> = Vec::new();

        for node in graph.nodes() {
            if node.resource_type == PLAY_TYPE {
                let artifact = writer.ctx.artifact(node);
                let play = writer.play(node, &mut stubs);
                plays.entry(artifact).or_default().push(play);
                continue;
            }
            let in_play = graph
                .parent_of(&node.id)
                .and_then(|parent| graph.node(parent))
                .map_or(false, |parent| parent.resource_type == PLAY_TYPE);
            if !in_play {
                orphans.push(node.id.clone());
            }
        }

        if !orphans.is_empty() {
            let mut play = Mapping::new();
            play.insert(Value::String("name".into()), Value::String(GENERATED_PLAY.into()));
            play.insert(Value::String("hosts".into()), Value::String("localhost".into()));
            let tasks = writer.task_list(&orphans, &default_artifact, &mut stubs);
            if !tasks.is_empty() {
                play.insert(Value::String("tasks".into()), Value::Sequence(tasks));
            }
            plays.entry(default_artifact.clone()).or_default().push(Value::Mapping(play));
        }

        let mut output = EmitOutput::default();
        for block in &graph.passthrough {
            if block.dialect != Dialect::Ansible {
                writer.ctx.warn(
                    EmissionWarningKind::PassthroughDropped,
                    None,
                    format!("{} {} block has no ansible equivalent", block.dialect, block.kind),
                );
                continue;
            }
            let file = block.file.clone().unwrap_or_else(|| default_artifact.clone());
            if block.kind == "vars" {
                output.artifacts.insert(file, block.text.clone());
                continue;
            }
            match serde_yaml::from_str::<Value>(&block.text) {
                Ok(Value::Sequence(entries)) => plays.entry(file).or_default().extend(entries),
                Ok(entry @ Value::Mapping(_)) => plays.entry(file).or_default().push(entry),
                _ => writer.ctx.warn(
                    EmissionWarningKind::PassthroughDropped,
                    None,
                    format!("ansible {} block is not a playbook entry", block.kind),
                ),
            }
        }

        if !graph.definitions.is_empty() {
            let mut vars = Mapping::new();
            for (name, value) in &graph.definitions {
                let rendered = writer.value(None, value);
                vars.insert(Value::String(name.clone()), rendered);
            }
            output
                .artifacts
                .insert(DEFINITIONS_ARTIFACT.to_string(), serde_yaml::to_string(&Value::Mapping(vars))?);
        }

        comments.extend(writer.ctx.banner_lines("#"));
        for (old, new) in writer.ctx.live_aliases() {
            comments.push(format!("# renamed: {} -> {}", single_line(&old), single_line(&new)));
        }
        if writer.ctx.options.include_hints {
            for node in graph.nodes() {
                for hint in &node.hints {
                    comments.push(format!("# hint({}): {}", node.id, single_line(&hint.text)));
                }
            }
        }

        if plays.is_empty() && stubs.is_empty() && output.artifacts.is_empty() {
            plays.insert(default_artifact.clone(), Vec::new());
        }
        let mut files: Vec<String> = plays.keys().chain(stubs.keys()).cloned().collect();
        files.sort();
        files.dedup();
        for (index, file) in files.into_iter().enumerate() {
            let mut text = String::new();
            if index == 0 {
                for line in &comments {
                    text.push_str(line);
                    text.push('\n');
                }
            }
            match plays.remove(&file) {
                Some(entries) if !entries.is_empty() => {
                    text.push_str(&serde_yaml::to_string(&Value::Sequence(entries))?)
                }
                _ => text.push_str("[]\n"),
            }
            for line in stubs.remove(&file).unwrap_or_default() {
                text.push_str(&line);
                text.push('\n');
            }
            output.artifacts.insert(file, text);
        }
        output.warnings = writer.ctx.warnings;
        Ok(output)
    }
}

struct PlaybookWriter<'a> {
    ctx: EmitContext<'a>,
}

impl<'a> PlaybookWriter<'a> {
    fn play(&mut self, node: &ResourceNode, stubs: &mut BTreeMap<String, Vec<String>>) -> Value {
        let graph = self.ctx.graph;
        let artifact = self.ctx.artifact(node);
        let mut play = Mapping::new();
        for (name, value) in &node.properties {
            let rendered = self.value(Some(&node.id), value);
            play.insert(Value::String(name.clone()), rendered);
        }

        let children: Vec<&str> = graph.children_of(&node.id);
        for section in TaskSection::all() {
            let members: Vec<String> = children
                .iter()
                .filter(|child| self.section_of(child) == section)
                .map(|child| child.to_string())
                .collect();
            if members.is_empty() {
                continue;
            }
            let tasks = self.task_list(&members, &artifact, stubs);
            play.insert(Value::String(section.as_str().into()), Value::Sequence(tasks));
        }
        Value::Mapping(play)
    }

    fn section_of(&self, id: &str) -> TaskSection {
        self.ctx
            .graph
            .node(id)
            .filter(|node| self.ctx.is_native(node))
            .and_then(|node| node.metadata.extension_str(SECTION))
            .and_then(TaskSection::from_key)
            .unwrap_or(TaskSection::Tasks)
    }

    fn task_list(&mut self, ids: &[String], artifact: &str, stubs: &mut BTreeMap<String, Vec<String>>) -> Vec<Value> {
        let graph = self.ctx.graph;
        let mut tasks = Vec::new();
        for id in dependency_order(graph, ids) {
            let Some(node) = graph.node(&id) else {
                continue;
            };
            match self.ctx.native_type(node) {
                Some(module) => tasks.push(self.task(node, &module)),
                None => {
                    let lines = self.ctx.stub_lines(node, "#");
                    stubs.entry(artifact.to_string()).or_default().extend(lines);
                }
            }
        }
        tasks
    }

    fn task(&mut self, node: &ResourceNode, module: &str) -> Value {
        let native = self.ctx.is_native(node);
        let keywords = if native {
            map_extension(node, TASK_KEYWORDS)
        } else {
            Default::default()
        };

        let mut task = Mapping::new();
        match keywords.get("name") {
            Some(name) => {
                let rendered = self.value(Some(&node.id), name);
                task.insert(Value::String("name".into()), rendered);
            }
            None if !native => {
                task.insert(Value::String("name".into()), Value::String(node.id.clone()));
            }
            None => {}
        }

        let mut args = Mapping::new();
        for (name, value) in &node.properties {
            let native_name = if node.is_opaque() {
                name.clone()
            } else {
                native_property_name(Dialect::Ansible, &node.resource_type, name)
            };
            let rendered = self.value(Some(&node.id), value);
            args.insert(Value::String(native_name), rendered);
        }
        if native {
            for (name, value) in &node.metadata.opaque {
                let rendered = self.value(Some(&node.id), value);
                args.insert(Value::String(name.clone()), rendered);
            }
        }

        if module == "block" {
            for (key, value) in args {
                task.insert(key, value);
            }
        } else {
            let free_form = if native {
                node.metadata.extension(FREE_FORM).cloned()
            } else {
                None
            };
            let (module_value, extra) = match free_form {
                Some(PropertyValue::Bool(true)) if is_exec(&node.resource_type) => {
                    let command = args.remove("cmd").unwrap_or(Value::Null);
                    (command, args)
                }
                Some(PropertyValue::Bool(true)) => {
                    let pairs: Vec<(String, String)> = args
                        .iter()
                        .map(|(k, v)| (crate::values::key_string(k), crate::values::key_string(v)))
                        .collect();
                    (Value::String(join_free_form(&pairs)), Mapping::new())
                }
                Some(PropertyValue::String(raw)) => (Value::String(raw), args),
                _ if args.is_empty() => (Value::Null, Mapping::new()),
                _ => (Value::Mapping(args), Mapping::new()),
            };
            task.insert(Value::String(module.to_string()), module_value);
            if !extra.is_empty() {
                task.insert(Value::String("args".into()), Value::Mapping(extra));
            }
        }

        for (key, value) in &keywords {
            if key == "name" {
                continue;
            }
            let rendered = self.value(Some(&node.id), value);
            task.insert(Value::String(key.clone()), rendered);
        }
        Value::Mapping(task)
    }

    fn reference(&mut self, node: Option<&str>, target: &str, attribute: Option<&str>) -> String {
        let owner = node.unwrap_or_default();
        if !self.ctx.exists(target) {
            self.ctx.unresolved(owner, target);
            return format!("<unresolved:{}>", target);
        }
        let text = match attribute {
            Some(attribute) => format!("{}.{}", target, attribute),
            None => target.to_string(),
        };
        self.ctx.warn(
            EmissionWarningKind::UntranslatableExpression,
            node,
            format!("reference to {} has no ansible equivalent", text),
        );
        format!("<ref:{}>", text)
    }

    fn value(&mut self, node: Option<&str>, value: &PropertyValue) -> Value {
        match value {
            PropertyValue::List(items) => Value::Sequence(items.iter().map(|i| self.value(node, i)).collect()),
            PropertyValue::Map(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| (Value::String(k.clone()), self.value(node, v)))
                    .collect(),
            ),
            PropertyValue::Reference(token) => {
                Value::String(self.reference(node, &token.target, token.attribute.as_deref()))
            }
            PropertyValue::Template(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        TemplateSegment::Literal(s) => text.push_str(s),
                        TemplateSegment::Reference(token) => {
                            let rendered = self.reference(node, &token.target, token.attribute.as_deref());
                            text.push_str(&rendered);
                        }
                        TemplateSegment::Expression(expr) => {
                            let source = self.ctx.graph.dialect();
                            if source == Dialect::Ansible {
                                text.push_str(expr);
                            } else {
                                self.ctx.untranslatable_expression(node.unwrap_or_default(), source, expr);
                                text.push_str(&format!("<untranslatable: {}>", expr));
                            }
                        }
                    }
                }
                Value::String(text)
            }
            PropertyValue::Shared(name) => {
                if !self.ctx.graph.definitions.contains_key(name) {
                    self.ctx.warn(
                        EmissionWarningKind::DanglingReference,
                        node,
                        format!("shared value {} is not defined", name),
                    );
                }
                Value::String(format!("{{{{ {} }}}}", name))
            }
            PropertyValue::Expression(expr) if expr.dialect == Dialect::Ansible => Value::String(expr.text.clone()),
            PropertyValue::Expression(expr) => {
                self.ctx
                    .untranslatable_expression(node.unwrap_or_default(), expr.dialect, &expr.text);
                Value::String(format!("<untranslatable: {}>", expr.text))
            }
            literal => property_to_yaml(literal),
        }
    }
}
