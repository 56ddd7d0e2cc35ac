//! Cross-dialect type and property mapping tables.
//!
//! Normalizers read these tables native -> canonical and emitters read the
//! same entries canonical -> native, so both directions always agree.

use crate::dialect::Dialect;
use crate::dialect::Dialect::{Ansible as AN, CloudFormation as CF, Terraform as TF};
use crate::naming::{is_snake_case, to_camel_case, to_pascal_case, to_snake_case};

/// Canonical type given to unmapped native types, followed by the native name.
pub const UNKNOWN_PREFIX: &str = "unknown.";

/// Canonical type of an Ansible play.
pub const PLAY_TYPE: &str = "config.play";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KubernetesKind {
    pub api_version: &'static str,
    pub kind: &'static str,
}

/// A native property name that does not follow the dialect's case convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAlias {
    pub canonical: &'static str,
    pub dialect: Dialect,
    pub native: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct TypeMapping {
    pub canonical: &'static str,
    pub terraform: Option<&'static str>,
    pub cloudformation: Option<&'static str>,
    pub kubernetes: Option<KubernetesKind>,
    /// Fully-qualified module name
    pub ansible: Option<&'static str>,
    /// Other module names that map to this type
    pub ansible_aliases: &'static [&'static str],
    pub properties: &'static [PropertyAlias],
}

impl TypeMapping {
    /// Native type name in `dialect` (Kubernetes: the kind).
    pub fn native_for(&self, dialect: Dialect) -> Option<&'static str> {
        match dialect {
            Dialect::Terraform => self.terraform,
            Dialect::CloudFormation => self.cloudformation,
            Dialect::Kubernetes => self.kubernetes.map(|k| k.kind),
            Dialect::Ansible => self.ansible,
        }
    }

    fn alias_native(&self, dialect: Dialect, canonical: &str) -> Option<&'static str> {
        self.properties
            .iter()
            .find(|a| a.dialect == dialect && a.canonical == canonical)
            .map(|a| a.native)
    }

    fn alias_canonical(&self, dialect: Dialect, native: &str) -> Option<&'static str> {
        self.properties
            .iter()
            .find(|a| a.dialect == dialect && a.native == native)
            .map(|a| a.canonical)
    }
}

macro_rules! alias {
    ($canonical:expr, $dialect:expr, $native:expr) => {
        PropertyAlias {
            canonical: $canonical,
            dialect: $dialect,
            native: $native,
        }
    };
}

const fn cloud(
    canonical: &'static str,
    terraform: &'static str,
    cloudformation: &'static str,
    ansible: Option<&'static str>,
    properties: &'static [PropertyAlias],
) -> TypeMapping {
    TypeMapping {
        canonical,
        terraform: Some(terraform),
        cloudformation: Some(cloudformation),
        kubernetes: None,
        ansible,
        ansible_aliases: &[],
        properties,
    }
}

const fn kube(canonical: &'static str, api_version: &'static str, kind: &'static str) -> TypeMapping {
    TypeMapping {
        canonical,
        terraform: None,
        cloudformation: None,
        kubernetes: Some(KubernetesKind { api_version, kind }),
        ansible: None,
        ansible_aliases: &[],
        properties: &[],
    }
}

const fn module(
    canonical: &'static str,
    fqcn: &'static str,
    ansible_aliases: &'static [&'static str],
) -> TypeMapping {
    TypeMapping {
        canonical,
        terraform: None,
        cloudformation: None,
        kubernetes: None,
        ansible: Some(fqcn),
        ansible_aliases,
        properties: &[],
    }
}

pub static TYPE_MAPPINGS: &[TypeMapping] = &[
    cloud(
        "compute.instance",
        "aws_instance",
        "AWS::EC2::Instance",
        Some("amazon.aws.ec2_instance"),
        &[
            alias!("image_id", TF, "ami"),
            alias!("security_group_ids", TF, "vpc_security_group_ids"),
            alias!("security_group_ids", AN, "security_groups"),
        ],
    ),
    cloud(
        "compute.function",
        "aws_lambda_function",
        "AWS::Lambda::Function",
        Some("amazon.aws.lambda"),
        &[alias!("function_name", AN, "name")],
    ),
    cloud("network.vpc", "aws_vpc", "AWS::EC2::VPC", Some("amazon.aws.ec2_vpc_net"), &[]),
    cloud(
        "network.subnet",
        "aws_subnet",
        "AWS::EC2::Subnet",
        Some("amazon.aws.ec2_vpc_subnet"),
        &[alias!("cidr_block", AN, "cidr"), alias!("availability_zone", AN, "az")],
    ),
    cloud(
        "network.securitygroup",
        "aws_security_group",
        "AWS::EC2::SecurityGroup",
        Some("amazon.aws.ec2_security_group"),
        &[
            alias!("ingress", CF, "SecurityGroupIngress"),
            alias!("ingress", AN, "rules"),
            alias!("egress", CF, "SecurityGroupEgress"),
            alias!("egress", AN, "rules_egress"),
            alias!("description", CF, "GroupDescription"),
            alias!("name", CF, "GroupName"),
        ],
    ),
    cloud(
        "network.loadbalancer",
        "aws_lb",
        "AWS::ElasticLoadBalancingV2::LoadBalancer",
        Some("amazon.aws.elb_application_lb"),
        &[],
    ),
    cloud(
        "storage.bucket",
        "aws_s3_bucket",
        "AWS::S3::Bucket",
        Some("amazon.aws.s3_bucket"),
        &[
            alias!("bucket_name", TF, "bucket"),
            alias!("bucket_name", AN, "name"),
            alias!("acl", CF, "AccessControl"),
            alias!("encryption", TF, "server_side_encryption_configuration"),
            alias!("encryption", CF, "BucketEncryption"),
            alias!("versioning", CF, "VersioningConfiguration"),
        ],
    ),
    cloud(
        "storage.volume",
        "aws_ebs_volume",
        "AWS::EC2::Volume",
        Some("amazon.aws.ec2_vol"),
        &[alias!("size", AN, "volume_size"), alias!("availability_zone", AN, "zone")],
    ),
    cloud(
        "database.instance",
        "aws_db_instance",
        "AWS::RDS::DBInstance",
        Some("amazon.aws.rds_instance"),
        &[
            alias!("instance_class", CF, "DBInstanceClass"),
            alias!("instance_class", AN, "db_instance_class"),
            alias!("username", CF, "MasterUsername"),
            alias!("username", AN, "master_username"),
            alias!("password", CF, "MasterUserPassword"),
            alias!("password", AN, "master_user_password"),
            alias!("identifier", CF, "DBInstanceIdentifier"),
            alias!("identifier", AN, "db_instance_identifier"),
        ],
    ),
    cloud(
        "identity.role",
        "aws_iam_role",
        "AWS::IAM::Role",
        Some("amazon.aws.iam_role"),
        &[
            alias!("assume_role_policy", CF, "AssumeRolePolicyDocument"),
            alias!("assume_role_policy", AN, "assume_role_policy_document"),
            alias!("name", CF, "RoleName"),
        ],
    ),
    cloud(
        "identity.user",
        "aws_iam_user",
        "AWS::IAM::User",
        Some("amazon.aws.iam_user"),
        &[alias!("name", CF, "UserName")],
    ),
    cloud(
        "messaging.queue",
        "aws_sqs_queue",
        "AWS::SQS::Queue",
        Some("amazon.aws.sqs_queue"),
        &[alias!("name", CF, "QueueName")],
    ),
    kube("workload.deployment", "apps/v1", "Deployment"),
    kube("workload.statefulset", "apps/v1", "StatefulSet"),
    kube("workload.daemonset", "apps/v1", "DaemonSet"),
    kube("workload.job", "batch/v1", "Job"),
    kube("workload.cronjob", "batch/v1", "CronJob"),
    kube("workload.pod", "v1", "Pod"),
    kube("network.service", "v1", "Service"),
    kube("network.ingress", "networking.k8s.io/v1", "Ingress"),
    kube("config.map", "v1", "ConfigMap"),
    kube("config.secret", "v1", "Secret"),
    kube("storage.claim", "v1", "PersistentVolumeClaim"),
    kube("cluster.namespace", "v1", "Namespace"),
    kube("identity.serviceaccount", "v1", "ServiceAccount"),
    module(
        "config.package",
        "ansible.builtin.package",
        &["apt", "yum", "dnf", "apk", "zypper"],
    ),
    module("config.service", "ansible.builtin.service", &["systemd", "systemd_service"]),
    module("config.file", "ansible.builtin.file", &[]),
    module("config.copy", "ansible.builtin.copy", &[]),
    module("config.template", "ansible.builtin.template", &[]),
    module("os.user", "ansible.builtin.user", &[]),
    module("exec.command", "ansible.builtin.command", &[]),
    module("exec.shell", "ansible.builtin.shell", &[]),
];

/// Mapping entry of a canonical type.
pub fn lookup(canonical: &str) -> Option<&'static TypeMapping> {
    TYPE_MAPPINGS.iter().find(|m| m.canonical == canonical)
}

/// Canonical type of a native type name.
///
/// Ansible modules match by FQCN, then by short name, then by alias.
pub fn canonical_type(dialect: Dialect, native: &str) -> Option<&'static str> {
    let exact = TYPE_MAPPINGS
        .iter()
        .find(|m| m.native_for(dialect) == Some(native))
        .map(|m| m.canonical);
    if exact.is_some() || dialect != Dialect::Ansible {
        return exact;
    }

    let short = native.rsplit('.').next().unwrap_or(native);
    TYPE_MAPPINGS
        .iter()
        .find(|m| m.ansible.and_then(|f| f.rsplit('.').next()) == Some(short))
        .or_else(|| TYPE_MAPPINGS.iter().find(|m| m.ansible_aliases.contains(&short)))
        .map(|m| m.canonical)
}

/// Canonical type for a native type, `unknown.<native>` when unmapped.
pub fn canonical_type_or_unknown(dialect: Dialect, native: &str) -> String {
    canonical_type(dialect, native)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}{}", UNKNOWN_PREFIX, native))
}

/// Native type of a canonical type in `dialect`.
pub fn native_type(dialect: Dialect, canonical: &str) -> Option<&'static str> {
    lookup(canonical).and_then(|m| m.native_for(dialect))
}

/// Canonical name of a top-level native property.
///
/// Returns `None` when the name cannot be re-emitted faithfully (a
/// snake_case key in a camel/Pascal dialect); such properties are kept
/// opaque.
pub fn canonical_property_name(dialect: Dialect, canonical_type: &str, native: &str) -> Option<String> {
    if let Some(canonical) = lookup(canonical_type).and_then(|m| m.alias_canonical(dialect, native)) {
        return Some(canonical.to_string());
    }
    match dialect {
        Dialect::Terraform | Dialect::Ansible => Some(native.to_string()),
        Dialect::CloudFormation | Dialect::Kubernetes => {
            let snake = to_snake_case(native);
            if recase(dialect, &snake) == native {
                Some(snake)
            } else if is_snake_case(native) {
                None
            } else {
                Some(native.to_string())
            }
        }
    }
}

/// Native name of a canonical property in `dialect`.
pub fn native_property_name(dialect: Dialect, canonical_type: &str, canonical: &str) -> String {
    if let Some(native) = lookup(canonical_type).and_then(|m| m.alias_native(dialect, canonical)) {
        return native.to_string();
    }
    match dialect {
        Dialect::Terraform | Dialect::Ansible => canonical.to_string(),
        Dialect::CloudFormation | Dialect::Kubernetes => {
            if is_snake_case(canonical) {
                recase(dialect, canonical)
            } else {
                canonical.to_string()
            }
        }
    }
}

fn recase(dialect: Dialect, snake: &str) -> String {
    match dialect {
        Dialect::CloudFormation => to_pascal_case(snake),
        Dialect::Kubernetes => to_camel_case(snake),
        _ => snake.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_lookup_both_directions() {
        assert_eq!(canonical_type(Dialect::Terraform, "aws_instance"), Some("compute.instance"));
        assert_eq!(canonical_type(Dialect::CloudFormation, "AWS::S3::Bucket"), Some("storage.bucket"));
        assert_eq!(canonical_type(Dialect::Kubernetes, "Deployment"), Some("workload.deployment"));
        assert_eq!(native_type(Dialect::Terraform, "storage.bucket"), Some("aws_s3_bucket"));
        assert_eq!(native_type(Dialect::Kubernetes, "storage.bucket"), None);
    }

    #[test]
    fn test_ansible_module_resolution() {
        assert_eq!(canonical_type(Dialect::Ansible, "ansible.builtin.shell"), Some("exec.shell"));
        assert_eq!(canonical_type(Dialect::Ansible, "shell"), Some("exec.shell"));
        assert_eq!(canonical_type(Dialect::Ansible, "ansible.builtin.apt"), Some("config.package"));
        assert_eq!(canonical_type(Dialect::Ansible, "debug"), None);
        assert_eq!(canonical_type_or_unknown(Dialect::Ansible, "debug"), "unknown.debug");
    }

    #[test]
    fn test_property_names_round_trip() {
        let name = canonical_property_name(Dialect::CloudFormation, "database.instance", "DBInstanceClass").unwrap();
        assert_eq!(name, "instance_class");
        assert_eq!(
            native_property_name(Dialect::CloudFormation, "database.instance", &name),
            "DBInstanceClass"
        );
        assert_eq!(native_property_name(Dialect::Terraform, "database.instance", &name), "instance_class");

        let cidr = canonical_property_name(Dialect::CloudFormation, "network.vpc", "CidrBlock").unwrap();
        assert_eq!(cidr, "cidr_block");
        assert_eq!(native_property_name(Dialect::Kubernetes, "workload.deployment", "service_account_name"), "serviceAccountName");
    }

    #[test]
    fn test_irreversible_names() {
        // snake keys in a Pascal dialect cannot be re-emitted
        assert_eq!(canonical_property_name(Dialect::CloudFormation, "network.vpc", "cidr_block"), None);
        // other odd spellings are kept verbatim
        let odd = canonical_property_name(Dialect::CloudFormation, "network.vpc", "IPv4Pool").unwrap();
        assert_eq!(native_property_name(Dialect::CloudFormation, "network.vpc", &odd), "IPv4Pool");
    }

    #[test]
    fn test_alias_applies_across_dialects() {
        let image = canonical_property_name(Dialect::Terraform, "compute.instance", "ami").unwrap();
        assert_eq!(native_property_name(Dialect::CloudFormation, "compute.instance", &image), "ImageId");
    }
}
