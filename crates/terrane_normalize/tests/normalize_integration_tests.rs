//! Integration tests for tree normalization: round trips through each
//! dialect's emitter, determinism and reference closure.

use std::fs;
use std::path::Path;

use tempfile::tempdir;
use terrane_dialects::{emit, DiscoveryOptions, EmitOptions, SourceTree};
use terrane_model::{Dialect, EdgeKind, EdgeOrigin, InvariantViolation, PropertyValue, ResourceGraph, WarningKind};
use terrane_normalize::{normalize_tree, NormalizeOutput};

const MAIN_TF: &str = r#"
locals {
  prefix = "shop"
}

resource "aws_vpc" "main" {
  cidr_block = "10.0.0.0/16"
  tags = {
    Name = "main"
  }
}

resource "aws_subnet" "a" {
  count      = 2
  vpc_id     = aws_vpc.main.id
  cidr_block = "10.0.1.0/24"
  depends_on = [aws_vpc.main]
}

resource "aws_s3_bucket" "logs" {
  bucket = "${local.prefix}-logs"
}
"#;

const TEMPLATE: &str = r#"
AWSTemplateFormatVersion: '2010-09-09'
Parameters:
  Env:
    Type: String
Mappings:
  SharedValues:
    Default:
      owner: platform
Resources:
  Vpc:
    Type: AWS::EC2::VPC
    Properties:
      CidrBlock: 10.0.0.0/16
      Tags:
        - Key: Owner
          Value: !FindInMap [SharedValues, Default, owner]
  Subnet:
    Type: AWS::EC2::Subnet
    DependsOn: Vpc
    DeletionPolicy: Retain
    Properties:
      VpcId: !Ref Vpc
      AvailabilityZone: !Sub '${AWS::Region}a'
  Logs:
    Type: AWS::S3::Bucket
    Properties:
      BucketName: !Sub '${Env}-logs-${Vpc.CidrBlock}'
"#;

const MANIFESTS: &str = "\
apiVersion: v1
kind: Namespace
metadata:
  name: shop
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  namespace: shop
data:
  LEVEL: debug
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: shop
  labels:
    app: web
spec:
  replicas: 2
  template:
    spec:
      containers:
        - name: web
          image: nginx:1.25
          envFrom:
            - configMapRef:
                name: settings
";

const PLAYBOOK: &str = r#"
- name: Configure web
  hosts: web
  become: true
  tasks:
    - name: Install nginx
      apt:
        name: "{{ web_package }}"
        state: present
      notify: restart nginx
    - name: Write motd
      copy: dest=/etc/motd content="hello world"
    - name: Reload
      shell: systemctl daemon-reload
  handlers:
    - name: restart nginx
      service:
        name: nginx
        state: restarted
"#;

async fn normalize_dir(root: &Path, dialect: Dialect) -> NormalizeOutput {
    let mut tree = SourceTree::discover(root, &DiscoveryOptions::default()).unwrap();
    tree.select_dialect(Some(dialect)).unwrap();
    normalize_tree(tree, dialect).await.unwrap()
}

async fn round_trip(graph: &ResourceGraph) -> ResourceGraph {
    let dialect = graph.dialect();
    let output = emit(graph, dialect, &EmitOptions::default()).unwrap();
    let dir = tempdir().unwrap();
    output.write_to(dir.path()).unwrap();
    normalize_dir(dir.path(), dialect).await.graph
}

fn assert_reference_closure(graph: &ResourceGraph) {
    for node in graph.nodes() {
        for value in node.properties.values() {
            for token in value.references() {
                assert!(
                    graph.edge(&node.id, &token.target, EdgeKind::DependsOn).is_some(),
                    "{} -> {} has no edge",
                    node.id,
                    token.target
                );
            }
        }
    }
}

#[tokio::test]
async fn test_terraform_round_trip() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.tf"), MAIN_TF).unwrap();
    let first = normalize_dir(dir.path(), Dialect::Terraform).await;
    assert!(first.parse_errors.is_empty(), "{:?}", first.parse_errors);
    assert_eq!(first.graph.node_count(), 3);
    assert_eq!(first.graph.definitions.get("prefix"), Some(&PropertyValue::from("shop")));

    let edge = first
        .graph
        .edge("aws_subnet.a", "aws_vpc.main", EdgeKind::DependsOn)
        .unwrap();
    assert!(edge.has_origin(EdgeOrigin::Explicit));
    assert!(edge.has_origin(EdgeOrigin::Reference));
    assert_reference_closure(&first.graph);

    let second = round_trip(&first.graph).await;
    assert!(
        first.graph.structurally_equal(&second),
        "{:?}",
        first.graph.structural_diff(&second)
    );
}

const DIRECTIVES_TF: &str = r#"
resource "aws_s3_bucket" "é" {
  bucket = "%{ if var.shared }shared%{ else }private%{ endif }-logs"
}

resource "aws_sqs_queue" "jobs" {
  name = "jobs-${aws_s3_bucket.é.id}"
}
"#;

#[tokio::test]
async fn test_terraform_directives_and_unicode_names_round_trip() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.tf"), DIRECTIVES_TF).unwrap();
    let first = normalize_dir(dir.path(), Dialect::Terraform).await;
    assert!(first.parse_errors.is_empty(), "{:?}", first.parse_errors);
    assert!(first.graph.edge("aws_sqs_queue.jobs", "aws_s3_bucket.é", EdgeKind::DependsOn).is_some());

    let output = emit(&first.graph, Dialect::Terraform, &EmitOptions::default()).unwrap();
    let main = output.artifact("main.tf").unwrap();
    assert!(main.contains("bucket = \"%{ if var.shared }shared%{ else }private%{ endif }-logs\""), "{}", main);
    assert!(!main.contains("%%{"));
    assert!(main.contains("resource \"aws_s3_bucket\" \"é\""));

    let second = round_trip(&first.graph).await;
    assert!(
        first.graph.structurally_equal(&second),
        "{:?}",
        first.graph.structural_diff(&second)
    );
}

#[tokio::test]
async fn test_cloudformation_round_trip() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("template.yaml"), TEMPLATE).unwrap();
    let first = normalize_dir(dir.path(), Dialect::CloudFormation).await;
    assert!(first.parse_errors.is_empty(), "{:?}", first.parse_errors);
    assert!(first.graph.check_invariants().is_empty());
    assert!(first.graph.edge("Logs", "Vpc", EdgeKind::DependsOn).is_some());
    assert_reference_closure(&first.graph);

    let second = round_trip(&first.graph).await;
    assert!(
        first.graph.structurally_equal(&second),
        "{:?}",
        first.graph.structural_diff(&second)
    );
}

#[tokio::test]
async fn test_kubernetes_round_trip() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("app.yaml"), MANIFESTS).unwrap();
    let first = normalize_dir(dir.path(), Dialect::Kubernetes).await;
    assert!(first.parse_errors.is_empty(), "{:?}", first.parse_errors);
    assert_eq!(first.graph.parent_of("deployment/shop/web"), Some("namespace/shop"));
    assert!(first
        .graph
        .edge("deployment/shop/web", "configmap/shop/settings", EdgeKind::DependsOn)
        .is_some());
    assert_reference_closure(&first.graph);

    let second = round_trip(&first.graph).await;
    assert!(
        first.graph.structurally_equal(&second),
        "{:?}",
        first.graph.structural_diff(&second)
    );
}

#[tokio::test]
async fn test_ansible_round_trip() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("site.yml"), PLAYBOOK).unwrap();
    fs::create_dir_all(dir.path().join("group_vars")).unwrap();
    fs::write(dir.path().join("group_vars/all.yml"), "web_package: nginx\n").unwrap();
    let first = normalize_dir(dir.path(), Dialect::Ansible).await;
    assert!(first.parse_errors.is_empty(), "{:?}", first.parse_errors);
    assert_eq!(first.graph.children_of("play/configure-web").len(), 4);
    let install = first.graph.node("task/configure-web/install-nginx").unwrap();
    assert_eq!(install.property("name"), Some(&PropertyValue::Shared("web_package".into())));

    let second = round_trip(&first.graph).await;
    assert!(
        first.graph.structurally_equal(&second),
        "{:?}",
        first.graph.structural_diff(&second)
    );
}

#[tokio::test]
async fn test_normalization_is_deterministic() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.tf"), MAIN_TF).unwrap();
    fs::write(
        dir.path().join("extra.tf"),
        "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"other\"\n}\n",
    )
    .unwrap();

    let first = normalize_dir(dir.path(), Dialect::Terraform).await;
    let second = normalize_dir(dir.path(), Dialect::Terraform).await;
    assert!(first.graph.structurally_equal(&second.graph));
    assert_eq!(first.graph.node_ids(), second.graph.node_ids());
    let messages = |output: &NormalizeOutput| output.warnings.iter().map(|w| w.message.clone()).collect::<Vec<_>>();
    assert_eq!(messages(&first), messages(&second));

    // extra.tf sorts first, so main.tf wins the conflict
    let logs = first.graph.node("aws_s3_bucket.logs").unwrap();
    assert!(matches!(logs.property("bucket_name"), Some(PropertyValue::Template(_))));
    assert!(first
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::ConflictingDeclaration));
}

#[tokio::test]
async fn test_dangling_depends_on_is_kept_and_reported() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("main.tf"),
        "resource \"aws_subnet\" \"a\" {\n  cidr_block = \"10.0.1.0/24\"\n  depends_on = [aws_vpc.missing]\n}\n",
    )
    .unwrap();
    let output = normalize_dir(dir.path(), Dialect::Terraform).await;
    assert!(output
        .graph
        .edge("aws_subnet.a", "aws_vpc.missing", EdgeKind::DependsOn)
        .is_some());
    assert!(output
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::DanglingReference && w.node.as_deref() == Some("aws_subnet.a")));
    assert!(output
        .graph
        .check_invariants()
        .iter()
        .any(|v| matches!(v, InvariantViolation::DanglingEdge { .. })));
}
