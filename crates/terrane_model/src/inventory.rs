//! Provider and environment inventory of a graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::dialect::Dialect;
use crate::graph::ResourceGraph;
use crate::node::ResourceNode;

/// Environment names as written, with the name they are reported under.
const ENVIRONMENTS: &[(&str, &str)] = &[
    ("dev", "development"),
    ("development", "development"),
    ("test", "testing"),
    ("testing", "testing"),
    ("staging", "staging"),
    ("homolog", "staging"),
    ("prod", "production"),
    ("production", "production"),
    ("qa", "qa"),
    ("sandbox", "sandbox"),
];

/// Report order of environments.
const ORDER: &[&str] = &["development", "testing", "staging", "production", "qa", "sandbox"];

/// Provider a node is managed through: the Terraform type prefix, the
/// CloudFormation vendor, or the dialect name for Kubernetes and Ansible.
pub fn provider(node: &ResourceNode) -> Option<String> {
    let dialect = node.metadata.dialect?;
    match dialect {
        Dialect::Terraform => {
            let native = node.metadata.native_type()?;
            let prefix = native.split('_').next().unwrap_or(native);
            Some(prefix.to_string())
        }
        Dialect::CloudFormation => {
            let native = node.metadata.native_type()?;
            native.split("::").next().map(str::to_lowercase)
        }
        Dialect::Kubernetes => Some("kubernetes".to_string()),
        Dialect::Ansible => Some("ansible".to_string()),
    }
}

/// Node counts per provider.
pub fn providers(graph: &ResourceGraph) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for name in graph.nodes().filter_map(provider) {
        *counts.entry(name).or_insert(0) += 1;
    }
    counts
}

/// Deployment environments named in file paths, shared value names and
/// variable or parameter labels. Empty when none is named.
pub fn environments(graph: &ResourceGraph) -> Vec<String> {
    let mut sources: Vec<&str> = Vec::new();
    sources.extend(graph.nodes().filter_map(|n| n.origin.as_ref()).map(|o| o.file.as_str()));
    sources.extend(graph.passthrough.iter().filter_map(|b| b.file.as_deref()));
    sources.extend(graph.definitions.keys().map(String::as_str));
    sources.extend(graph.passthrough.iter().filter_map(|b| b.text.lines().next()));

    let found: BTreeSet<&str> = sources
        .into_iter()
        .flat_map(|text| text.split(|c: char| !c.is_alphanumeric()))
        .filter_map(|token| {
            let token = token.to_lowercase();
            ENVIRONMENTS
                .iter()
                .find(|(written, _)| *written == token)
                .map(|(_, name)| *name)
        })
        .collect();
    ORDER
        .iter()
        .filter(|name| found.contains(*name))
        .map(|name| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PassthroughBlock;
    use crate::node::{MetadataBag, SourceOrigin, NATIVE_TYPE_KEY};

    fn native(id: &str, dialect: Dialect, native_type: &str) -> ResourceNode {
        let mut metadata = MetadataBag::for_dialect(dialect);
        metadata.set_extension(NATIVE_TYPE_KEY, native_type.into());
        ResourceNode::new(id, "storage.bucket").with_metadata(metadata)
    }

    #[test]
    fn test_providers_per_dialect() {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        graph.add_node(native("aws_s3_bucket.a", Dialect::Terraform, "aws_s3_bucket")).unwrap();
        graph.add_node(native("aws_vpc.b", Dialect::Terraform, "aws_vpc")).unwrap();
        graph
            .add_node(native("google_storage_bucket.c", Dialect::Terraform, "google_storage_bucket"))
            .unwrap();
        graph.add_node(native("Bucket", Dialect::CloudFormation, "AWS::S3::Bucket")).unwrap();
        graph.add_node(native("configmap/x", Dialect::Kubernetes, "ConfigMap")).unwrap();
        graph.add_node(ResourceNode::new("plain", "storage.bucket")).unwrap();

        let counts = providers(&graph);
        assert_eq!(counts.get("aws"), Some(&3));
        assert_eq!(counts.get("google"), Some(&1));
        assert_eq!(counts.get("kubernetes"), Some(&1));
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn test_environments_from_paths_and_names() {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        graph
            .add_node(
                ResourceNode::new("aws_s3_bucket.a", "storage.bucket")
                    .with_origin(SourceOrigin::new("envs/prod/main.tf", Some(1))),
            )
            .unwrap();
        graph.definitions.insert("staging_prefix".into(), "s".into());
        graph.passthrough.push(
            PassthroughBlock::new(Dialect::Terraform, "variable", "variable \"dev_count\" {\n}").in_file("vars.tf"),
        );
        graph
            .add_node(
                ResourceNode::new("aws_s3_bucket.device", "storage.bucket")
                    .with_origin(SourceOrigin::new("devices/main.tf", None)),
            )
            .unwrap();

        assert_eq!(environments(&graph), vec!["development", "staging", "production"]);
        assert!(environments(&ResourceGraph::new(Dialect::Terraform)).is_empty());
    }
}
