//! Dialect emitters: canonical graph to dialect artifacts.
//!
//! Emitters never fail on graph content. Anything that cannot be rendered
//! (unmapped types from another dialect, dangling references, foreign
//! native expressions) is replaced by a placeholder and reported as an
//! [`EmissionWarning`].

pub mod ansible;
pub mod cloudformation;
pub mod kubernetes;
pub mod terraform;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use terrane_model::mapping::native_type;
use terrane_model::{
    Dialect, EdgeKind, EdgeOrigin, EmissionWarning, EmissionWarningKind, PropertyValue, ResourceGraph,
    ResourceNode,
};
use tracing::{debug, info};

use crate::error::{DialectError, DialectResult};
use crate::metadata::NATIVE_TYPE;

pub use ansible::AnsibleEmitter;
pub use cloudformation::CloudFormationEmitter;
pub use kubernetes::KubernetesEmitter;
pub use terraform::TerraformEmitter;

/// Emission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitOptions {
    /// Warning banner prepended to every artifact (set when the graph has
    /// unresolved error-level findings)
    #[serde(default)]
    pub banner: Option<String>,

    /// Render advisory hints as comments
    #[serde(default = "default_true")]
    pub include_hints: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            banner: None,
            include_hints: true,
        }
    }
}

impl EmitOptions {
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    pub fn without_hints(mut self) -> Self {
        self.include_hints = false;
        self
    }
}

/// Rendered artifacts keyed by relative path, plus warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmitOutput {
    pub artifacts: BTreeMap<String, String>,
    pub warnings: Vec<EmissionWarning>,
}

impl EmitOutput {
    pub fn artifact(&self, path: &str) -> Option<&str> {
        self.artifacts.get(path).map(String::as_str)
    }

    /// Write every artifact below `root`, creating directories as needed.
    pub fn write_to(&self, root: &std::path::Path) -> DialectResult<Vec<std::path::PathBuf>> {
        let mut written = Vec::new();
        for (relative, content) in &self.artifacts {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, content)?;
            debug!("Wrote artifact {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

/// A dialect writer.
pub trait Emitter: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn emit(&self, graph: &ResourceGraph, options: &EmitOptions) -> DialectResult<EmitOutput>;
}

/// Emitters by target dialect.
#[derive(Default)]
pub struct EmitterRegistry {
    emitters: HashMap<Dialect, Arc<dyn Emitter>>,
}

impl EmitterRegistry {
    pub fn new() -> Self {
        Self {
            emitters: HashMap::new(),
        }
    }

    /// Registry with the four built-in emitters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TerraformEmitter));
        registry.register(Arc::new(CloudFormationEmitter));
        registry.register(Arc::new(KubernetesEmitter));
        registry.register(Arc::new(AnsibleEmitter));
        registry
    }

    /// Register an emitter, replacing any previous one for its dialect.
    pub fn register(&mut self, emitter: Arc<dyn Emitter>) {
        debug!("Registering emitter: {}", emitter.dialect());
        self.emitters.insert(emitter.dialect(), emitter);
    }

    pub fn get(&self, dialect: Dialect) -> Option<Arc<dyn Emitter>> {
        self.emitters.get(&dialect).cloned()
    }

    pub fn get_required(&self, dialect: Dialect) -> DialectResult<Arc<dyn Emitter>> {
        self.get(dialect)
            .ok_or_else(|| DialectError::EmitterNotFound(dialect.to_string()))
    }

    pub fn dialects(&self) -> Vec<Dialect> {
        let mut dialects: Vec<Dialect> = self.emitters.keys().copied().collect();
        dialects.sort();
        dialects
    }

    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }
}

impl std::fmt::Debug for EmitterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterRegistry")
            .field("emitters", &self.dialects())
            .finish()
    }
}

/// Emit `graph` into `target` with the built-in emitters.
pub fn emit(graph: &ResourceGraph, target: Dialect, options: &EmitOptions) -> DialectResult<EmitOutput> {
    let emitter = EmitterRegistry::with_defaults().get_required(target)?;
    let output = emitter.emit(graph, options)?;
    info!(
        "Emitted {} artifact(s) as {} with {} warning(s)",
        output.artifacts.len(),
        target,
        output.warnings.len()
    );
    Ok(output)
}

/// State shared by one emitter run.
pub(crate) struct EmitContext<'a> {
    pub graph: &'a ResourceGraph,
    pub dialect: Dialect,
    pub options: &'a EmitOptions,
    pub warnings: Vec<EmissionWarning>,
}

impl<'a> EmitContext<'a> {
    pub fn new(graph: &'a ResourceGraph, dialect: Dialect, options: &'a EmitOptions) -> Self {
        Self {
            graph,
            dialect,
            options,
            warnings: Vec::new(),
        }
    }

    /// True when the graph was normalized from the target dialect.
    pub fn same_dialect(&self) -> bool {
        self.graph.dialect() == self.dialect
    }

    /// True when the node's metadata can be re-emitted verbatim.
    pub fn is_native(&self, node: &ResourceNode) -> bool {
        node.metadata.is_from(self.dialect)
    }

    /// Native type in the target dialect, `None` when untranslatable.
    pub fn native_type(&self, node: &ResourceNode) -> Option<String> {
        if self.is_native(node) {
            if let Some(native) = node.metadata.extension_str(NATIVE_TYPE) {
                return Some(native.to_string());
            }
        }
        if node.is_opaque() {
            return None;
        }
        native_type(self.dialect, &node.resource_type).map(str::to_string)
    }

    /// Artifact path for a node: its origin file when it came from the
    /// target dialect, else the dialect's default artifact.
    pub fn artifact(&self, node: &ResourceNode) -> String {
        match (&node.origin, self.is_native(node)) {
            (Some(origin), true) => artifact_path(self.dialect, &origin.file),
            _ => self.dialect.default_artifact().to_string(),
        }
    }

    pub fn exists(&self, id: &str) -> bool {
        self.graph.contains(id)
    }

    pub fn warn(&mut self, kind: EmissionWarningKind, node: Option<&str>, message: impl Into<String>) {
        let warning = EmissionWarning::new(kind, node, message);
        debug!("Emission warning: {}", warning.message);
        self.warnings.push(warning);
    }

    pub fn unresolved(&mut self, node: &str, target: &str) {
        self.warn(
            EmissionWarningKind::DanglingReference,
            Some(node),
            format!("reference to missing resource {} emitted as a placeholder", target),
        );
    }

    pub fn untranslatable_expression(&mut self, node: &str, source: Dialect, text: &str) {
        self.warn(
            EmissionWarningKind::UntranslatableExpression,
            Some(node),
            format!("{} expression `{}` has no {} equivalent", source, text, self.dialect),
        );
    }

    pub fn untranslatable_resource(&mut self, node: &ResourceNode) {
        self.warn(
            EmissionWarningKind::UntranslatableResource,
            Some(&node.id),
            format!(
                "resource {} of type {} has no {} equivalent; emitted as a comment stub",
                node.id, node.resource_type, self.dialect
            ),
        );
    }

    /// Explicit and ordering dependencies of a node that the target must
    /// spell out, with dangling targets reported and dropped.
    pub fn explicit_dependencies(&mut self, node: &ResourceNode) -> Vec<String> {
        let mut targets = Vec::new();
        let mut dangling = Vec::new();
        for edge in self.graph.edges_from(&node.id) {
            if edge.kind != EdgeKind::DependsOn {
                continue;
            }
            if !(edge.has_origin(EdgeOrigin::Explicit) || edge.is_only(EdgeOrigin::Ordering)) {
                continue;
            }
            if self.exists(&edge.target) {
                targets.push(edge.target.clone());
            } else {
                dangling.push(edge.target.clone());
            }
        }
        for target in dangling {
            self.unresolved(&node.id, &target);
        }
        targets
    }

    /// Aliases whose surviving node still exists.
    pub fn live_aliases(&self) -> Vec<(String, String)> {
        self.graph
            .aliases
            .iter()
            .map(|(old, _)| (old.clone(), self.graph.resolve_alias(old).to_string()))
            .filter(|(_, new)| self.exists(new))
            .collect()
    }

    /// Comment lines for the banner, prefixed with `marker`.
    pub fn banner_lines(&self, marker: &str) -> Vec<String> {
        match &self.options.banner {
            Some(banner) => banner
                .lines()
                .map(|line| format!("{} {}", marker, line).trim_end().to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Comment lines for a node's hints.
    pub fn hint_lines(&self, node: &ResourceNode, marker: &str) -> Vec<String> {
        if !self.options.include_hints {
            return Vec::new();
        }
        node.hints
            .iter()
            .map(|hint| format!("{} hint: {}", marker, single_line(&hint.text)))
            .collect()
    }

    /// Comment stub for an untranslatable node.
    pub fn stub_lines(&mut self, node: &ResourceNode, marker: &str) -> Vec<String> {
        self.untranslatable_resource(node);
        let mut lines = vec![format!(
            "{} untranslatable resource {} ({})",
            marker, node.id, node.resource_type
        )];
        for (name, value) in node.properties.iter().chain(node.metadata.opaque.iter()) {
            lines.push(format!("{}   {} = {}", marker, name, single_line(&value.display_compact())));
        }
        lines
    }
}

/// Collapse a text onto one line for use inside a comment.
pub(crate) fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").replace("*/", "* /")
}

/// CloudFormation JSON sources are re-emitted as YAML.
pub(crate) fn artifact_path(dialect: Dialect, file: &str) -> String {
    if dialect == Dialect::CloudFormation && file.to_lowercase().ends_with(".json") {
        format!("{}.yaml", &file[..file.len() - ".json".len()])
    } else {
        file.to_string()
    }
}

/// Assign a unique native name to every node, in graph order.
/// Collisions get `{separator}2`, `{separator}3`, ... appended.
pub(crate) fn assign_names<F>(graph: &ResourceGraph, separator: &str, mut base: F) -> HashMap<String, String>
where
    F: FnMut(&ResourceNode) -> String,
{
    let mut taken = HashSet::new();
    let mut names = HashMap::new();
    for node in graph.nodes() {
        let wanted = base(node);
        let mut name = wanted.clone();
        let mut n = 2;
        while !taken.insert(name.clone()) {
            name = format!("{}{}{}", wanted, separator, n);
            n += 1;
        }
        names.insert(node.id.clone(), name);
    }
    names
}

/// Stable topological order of `ids` over depends-on edges among them;
/// ties keep the input order.
pub(crate) fn dependency_order(graph: &ResourceGraph, ids: &[String]) -> Vec<String> {
    let members: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut pending: Vec<&str> = ids.iter().map(String::as_str).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(ids.len());

    while !pending.is_empty() {
        let ready = pending.iter().position(|id| {
            graph
                .dependencies_of(id)
                .into_iter()
                .all(|dep| !members.contains(dep) || placed.contains(dep) || dep == *id)
        });
        // a cycle leaves nothing ready; fall back to input order
        let index = ready.unwrap_or(0);
        let id = pending.remove(index);
        placed.insert(id);
        order.push(id.to_string());
    }
    order
}

/// Value of a shared definition, following nested shared uses.
pub(crate) fn resolve_shared<'g>(graph: &'g ResourceGraph, name: &str) -> Option<&'g PropertyValue> {
    let mut current = graph.definitions.get(name)?;
    let mut hops = 0;
    while let PropertyValue::Shared(next) = current {
        current = graph.definitions.get(next)?;
        hops += 1;
        if hops > graph.definitions.len() {
            return None;
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrane_model::SourceOrigin;

    #[test]
    fn test_registry_defaults() {
        let registry = EmitterRegistry::with_defaults();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.dialects(), Dialect::all());
        assert!(registry.get_required(Dialect::Kubernetes).is_ok());
        assert!(EmitterRegistry::new().get_required(Dialect::Terraform).is_err());
    }

    #[test]
    fn test_assign_names_suffixes_collisions() {
        let mut graph = ResourceGraph::new(Dialect::Kubernetes);
        graph.add_node(ResourceNode::new("a.web", "workload.pod")).unwrap();
        graph.add_node(ResourceNode::new("b.web", "workload.pod")).unwrap();
        let names = assign_names(&graph, "-", |n| n.id.split('.').last().unwrap_or_default().to_string());
        assert_eq!(names["a.web"], "web");
        assert_eq!(names["b.web"], "web-2");
    }

    #[test]
    fn test_dependency_order_is_stable() {
        let mut graph = ResourceGraph::new(Dialect::Ansible);
        for id in ["a", "b", "c"] {
            graph.add_node(ResourceNode::new(id, "exec.shell")).unwrap();
        }
        graph.connect("a", "c", EdgeKind::DependsOn, EdgeOrigin::Explicit);
        let ids: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(dependency_order(&graph, &ids), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_artifact_follows_native_origin() {
        let graph = ResourceGraph::new(Dialect::CloudFormation);
        let options = EmitOptions::default();
        let ctx = EmitContext::new(&graph, Dialect::CloudFormation, &options);
        let mut node = ResourceNode::new("Bucket", "storage.bucket")
            .with_origin(SourceOrigin::new("stacks/storage.json", Some(3)));
        assert_eq!(ctx.artifact(&node), "template.yaml");
        node.metadata.dialect = Some(Dialect::CloudFormation);
        assert_eq!(ctx.artifact(&node), "stacks/storage.yaml");
    }

    #[test]
    fn test_resolve_shared_follows_chain() {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        graph.definitions.insert("a".into(), PropertyValue::Shared("b".into()));
        graph.definitions.insert("b".into(), PropertyValue::from("eu-west-1"));
        assert_eq!(resolve_shared(&graph, "a"), Some(&PropertyValue::from("eu-west-1")));
    }
}
