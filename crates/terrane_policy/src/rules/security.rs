//! Security rules over canonical resource types.

use terrane_dialects::values::yaml_to_property;
use terrane_model::{FindingTarget, PropertyValue, ResourceGraph, ResourceNode, ValidationFinding};
use tracing::debug;

use super::{container_name, containers, flag, is_blank, Flag};
use crate::error::PolicyResult;
use crate::rule::ValidationRule;

const OPEN_CIDRS: &[&str] = &["0.0.0.0/0", "::/0"];

/// Ingress rules that admit any address.
pub struct OpenIngress;

impl ValidationRule for OpenIngress {
    rule_identity!(
        "security.open-ingress",
        Security,
        Error,
        "Ingress must not be open to the whole internet"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        let mut findings = Vec::new();
        for node in graph.nodes() {
            let Some(ingress) = node.property("ingress") else {
                continue;
            };
            let mut open = None;
            ingress.walk_strings(None, &mut |_, value| {
                if open.is_none() && OPEN_CIDRS.contains(&value.trim()) {
                    open = Some(value.trim().to_string());
                }
            });
            if let Some(cidr) = open {
                findings.push(self.finding(
                    FindingTarget::node(&node.id),
                    format!("ingress allows traffic from {}", cidr),
                ));
            }
        }
        Ok(findings)
    }
}

pub struct UnencryptedStorage;

impl ValidationRule for UnencryptedStorage {
    rule_identity!(
        "security.unencrypted-storage",
        Security,
        Warning,
        "Buckets, volumes and databases are encrypted at rest"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        let mut findings = Vec::new();
        for node in graph.nodes() {
            let message = match node.resource_type.as_str() {
                "storage.bucket" if is_blank(node.property("encryption")) => {
                    "bucket has no server-side encryption configured"
                }
                "storage.volume" if unencrypted(flag(node, "encrypted")) => "volume is not encrypted",
                "database.instance" if unencrypted(flag(node, "storage_encrypted")) => {
                    "database storage is not encrypted"
                }
                _ => continue,
            };
            findings.push(self.finding(FindingTarget::node(&node.id), message.to_string()));
        }
        Ok(findings)
    }
}

fn unencrypted(flag: Flag) -> bool {
    matches!(flag, Flag::Absent | Flag::Set(false))
}

pub struct PublicAccess;

impl ValidationRule for PublicAccess {
    rule_identity!(
        "security.public-access",
        Security,
        Error,
        "Data stores are not publicly accessible"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        let mut findings = Vec::new();
        for node in graph.nodes() {
            match node.resource_type.as_str() {
                "database.instance" if flag(node, "publicly_accessible") == Flag::Set(true) => {
                    findings.push(self.finding(
                        FindingTarget::node(&node.id),
                        "database is publicly accessible".to_string(),
                    ));
                }
                "storage.bucket" => {
                    if let Some(acl) = node.property_str("acl") {
                        let lower = acl.to_lowercase();
                        if lower.starts_with("public-") || lower.starts_with("publicread") {
                            findings.push(self.finding(
                                FindingTarget::node(&node.id),
                                format!("bucket ACL {} grants public access", acl),
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(findings)
    }
}

pub struct PrivilegedContainer;

impl ValidationRule for PrivilegedContainer {
    rule_identity!(
        "security.privileged-container",
        Security,
        Error,
        "Containers do not run privileged"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        let mut findings = Vec::new();
        for node in graph.nodes() {
            for container in containers(node) {
                let privileged = container
                    .get("securityContext")
                    .and_then(|context| context.get_path(&["privileged"]))
                    .and_then(PropertyValue::as_bool)
                    .unwrap_or(false);
                if privileged {
                    findings.push(self.finding(
                        FindingTarget::node(&node.id),
                        format!("container {} runs privileged", container_name(container)),
                    ));
                }
            }
        }
        Ok(findings)
    }
}

/// Secrets written with `stringData` keep their values in plain text.
pub struct SecretStringData;

impl ValidationRule for SecretStringData {
    rule_identity!(
        "security.secret-string-data",
        Security,
        Warning,
        "Secrets carry encoded data rather than plain-text stringData"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        Ok(graph
            .nodes()
            .filter(|n| n.resource_type == "config.secret")
            .filter(|n| !is_blank(n.property("string_data")) && is_blank(n.property("data")))
            .map(|node| {
                self.finding(
                    FindingTarget::node(&node.id),
                    "secret values are in stringData, not base64-encoded data".to_string(),
                )
            })
            .collect())
    }
}

const POLICY_PROPERTIES: &[&str] = &["assume_role_policy", "policy"];

/// Resources reachable by anyone: policies that allow every principal
/// without a condition, load balancer services without source ranges.
pub struct MissingAccessControl;

impl MissingAccessControl {
    /// Policy document as a value; JSON text is parsed.
    fn document(value: &PropertyValue) -> Option<PropertyValue> {
        match value {
            PropertyValue::Map(_) => Some(value.clone()),
            PropertyValue::String(text) => match serde_yaml::from_str(text) {
                Ok(parsed) => Some(yaml_to_property(&parsed)),
                Err(err) => {
                    debug!("Policy text is not a document: {}", err);
                    None
                }
            },
            _ => None,
        }
    }

    fn open_statement(statement: &PropertyValue) -> bool {
        let allows = statement
            .get_path(&["Effect"])
            .and_then(PropertyValue::as_str)
            .is_some_and(|effect| effect.eq_ignore_ascii_case("allow"));
        let conditioned = !is_blank(statement.get_path(&["Condition"]));
        allows && !conditioned && statement.get_path(&["Principal"]).is_some_and(any_principal)
    }

    fn policy_findings(&self, node: &ResourceNode) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        for name in POLICY_PROPERTIES {
            let Some(document) = node.property(name).and_then(Self::document) else {
                continue;
            };
            let open = match document.get_path(&["Statement"]) {
                Some(PropertyValue::List(statements)) => statements.iter().any(Self::open_statement),
                Some(statement) => Self::open_statement(statement),
                None => false,
            };
            if open {
                findings.push(self.finding(
                    FindingTarget::node(&node.id),
                    format!("{} allows any principal without a condition", name),
                ));
            }
        }
        findings
    }
}

fn any_principal(principal: &PropertyValue) -> bool {
    match principal {
        PropertyValue::String(s) => s.trim() == "*",
        PropertyValue::List(items) => items.iter().any(any_principal),
        PropertyValue::Map(map) => map.values().any(any_principal),
        _ => false,
    }
}

impl ValidationRule for MissingAccessControl {
    rule_identity!(
        "security.missing-access-control",
        Security,
        Error,
        "Access to resources is restricted to known principals or sources"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        let mut findings = Vec::new();
        for node in graph.nodes() {
            findings.extend(self.policy_findings(node));
            if node.resource_type == "network.service"
                && node.property_str("type") == Some("LoadBalancer")
                && is_blank(node.property("loadBalancerSourceRanges"))
            {
                findings.push(self.finding(
                    FindingTarget::node(&node.id),
                    "load balancer service accepts traffic from any source".to_string(),
                ));
            }
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrane_model::{Dialect, PropertyMap};

    fn map(entries: &[(&str, PropertyValue)]) -> PropertyValue {
        let mut map = PropertyMap::new();
        for (k, v) in entries {
            map.insert(k.to_string(), v.clone());
        }
        PropertyValue::Map(map)
    }

    fn graph(nodes: Vec<ResourceNode>) -> ResourceGraph {
        let mut graph = ResourceGraph::new(Dialect::Terraform);
        for node in nodes {
            graph.add_node(node).unwrap();
        }
        graph
    }

    #[test]
    fn test_open_ingress() {
        let open = ResourceNode::new("aws_security_group.web", "network.securitygroup").with_property(
            "ingress",
            PropertyValue::List(vec![map(&[
                ("from_port", PropertyValue::Int(22)),
                ("cidr_blocks", PropertyValue::List(vec!["0.0.0.0/0".into()])),
            ])]),
        );
        let closed = ResourceNode::new("aws_security_group.db", "network.securitygroup").with_property(
            "ingress",
            PropertyValue::List(vec![map(&[("cidr_blocks", PropertyValue::List(vec!["10.0.0.0/8".into()]))])]),
        );
        let findings = OpenIngress.evaluate(&graph(vec![open, closed])).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].target, FindingTarget::node("aws_security_group.web"));
    }

    #[test]
    fn test_unencrypted_storage() {
        let nodes = vec![
            ResourceNode::new("aws_s3_bucket.logs", "storage.bucket"),
            ResourceNode::new("aws_s3_bucket.safe", "storage.bucket")
                .with_property("encryption", map(&[("sse_algorithm", "aws:kms".into())])),
            ResourceNode::new("aws_ebs_volume.data", "storage.volume").with_property("encrypted", false.into()),
            ResourceNode::new("aws_db_instance.main", "database.instance")
                .with_property("storage_encrypted", PropertyValue::Shared("encrypt".into())),
        ];
        let findings = UnencryptedStorage.evaluate(&graph(nodes)).unwrap();
        let targets: Vec<String> = findings.iter().map(|f| f.target.id()).collect();
        assert_eq!(targets, vec!["aws_s3_bucket.logs", "aws_ebs_volume.data"]);
    }

    #[test]
    fn test_public_access() {
        let nodes = vec![
            ResourceNode::new("aws_db_instance.main", "database.instance")
                .with_property("publicly_accessible", true.into()),
            ResourceNode::new("aws_s3_bucket.site", "storage.bucket").with_property("acl", "public-read".into()),
            ResourceNode::new("aws_s3_bucket.logs", "storage.bucket").with_property("acl", "private".into()),
        ];
        let findings = PublicAccess.evaluate(&graph(nodes)).unwrap();
        assert_eq!(findings.len(), 2);
        assert!(findings[1].message.contains("public-read"));
    }

    #[test]
    fn test_privileged_container() {
        let container = map(&[
            ("name", "agent".into()),
            ("securityContext", map(&[("privileged", true.into())])),
        ]);
        let node = ResourceNode::new("pod/agent", "workload.pod")
            .with_property("containers", PropertyValue::List(vec![container]));
        let findings = PrivilegedContainer.evaluate(&graph(vec![node])).unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("agent"));
    }

    #[test]
    fn test_secret_string_data() {
        let nodes = vec![
            ResourceNode::new("secret/plain", "config.secret").with_property("string_data", map(&[("token", "x".into())])),
            ResourceNode::new("secret/encoded", "config.secret").with_property("data", map(&[("token", "eA==".into())])),
        ];
        let findings = SecretStringData.evaluate(&graph(nodes)).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].target, FindingTarget::node("secret/plain"));
    }

    #[test]
    fn test_missing_access_control() {
        let statement = |principal: PropertyValue, condition: bool| {
            let mut entries = vec![("Effect", "Allow".into()), ("Action", "sts:AssumeRole".into()), ("Principal", principal)];
            if condition {
                entries.push(("Condition", map(&[("Bool", map(&[("aws:SecureTransport", "true".into())]))])));
            }
            map(&[("Statement", PropertyValue::List(vec![map(&entries)]))])
        };
        let nodes = vec![
            ResourceNode::new("aws_iam_role.open", "identity.role")
                .with_property("assume_role_policy", statement(map(&[("AWS", "*".into())]), false)),
            ResourceNode::new("aws_iam_role.scoped", "identity.role")
                .with_property("assume_role_policy", statement(map(&[("Service", "ec2.amazonaws.com".into())]), false)),
            ResourceNode::new("aws_iam_role.guarded", "identity.role")
                .with_property("assume_role_policy", statement("*".into(), true)),
            ResourceNode::new("aws_sqs_queue_policy.q", "unknown.aws_sqs_queue_policy").with_property(
                "policy",
                r#"{"Statement": {"Effect": "Allow", "Principal": "*", "Action": "sqs:SendMessage"}}"#.into(),
            ),
            ResourceNode::new("service/public", "network.service").with_property("type", "LoadBalancer".into()),
            ResourceNode::new("service/office", "network.service")
                .with_property("type", "LoadBalancer".into())
                .with_property("loadBalancerSourceRanges", PropertyValue::List(vec!["203.0.113.0/24".into()])),
        ];
        let findings = MissingAccessControl.evaluate(&graph(nodes)).unwrap();
        let targets: Vec<String> = findings.iter().map(|f| f.target.id()).collect();
        assert_eq!(targets, vec!["aws_iam_role.open", "aws_sqs_queue_policy.q", "service/public"]);
    }
}
