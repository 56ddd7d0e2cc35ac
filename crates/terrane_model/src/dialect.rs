//! Supported infrastructure-as-code dialects.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// An infrastructure-as-code text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Terraform,
    CloudFormation,
    Kubernetes,
    Ansible,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Terraform => "terraform",
            Dialect::CloudFormation => "cloudformation",
            Dialect::Kubernetes => "kubernetes",
            Dialect::Ansible => "ansible",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Dialect::Terraform,
            Dialect::CloudFormation,
            Dialect::Kubernetes,
            Dialect::Ansible,
        ]
    }

    /// File extensions this dialect can be read from.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Dialect::Terraform => &["tf"],
            Dialect::CloudFormation => &["yaml", "yml", "json", "template"],
            Dialect::Kubernetes => &["yaml", "yml"],
            Dialect::Ansible => &["yaml", "yml"],
        }
    }

    /// Artifact path used when a node has no same-dialect origin file.
    pub fn default_artifact(&self) -> &'static str {
        match self {
            Dialect::Terraform => "main.tf",
            Dialect::CloudFormation => "template.yaml",
            Dialect::Kubernetes => "manifests.yaml",
            Dialect::Ansible => "playbook.yml",
        }
    }

    /// Whether the dialect has a construct for graph-level shared values.
    pub fn supports_shared_definitions(&self) -> bool {
        !matches!(self, Dialect::Kubernetes)
    }
}

impl FromStr for Dialect {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "terraform" | "tf" | "hcl" => Ok(Dialect::Terraform),
            "cloudformation" | "cfn" | "cf" => Ok(Dialect::CloudFormation),
            "kubernetes" | "k8s" => Ok(Dialect::Kubernetes),
            "ansible" => Ok(Dialect::Ansible),
            other => Err(ModelError::UnknownDialect(other.to_string())),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("tf".parse::<Dialect>().unwrap(), Dialect::Terraform);
        assert_eq!("CFN".parse::<Dialect>().unwrap(), Dialect::CloudFormation);
        assert_eq!("k8s".parse::<Dialect>().unwrap(), Dialect::Kubernetes);
        assert_eq!("ansible".parse::<Dialect>().unwrap(), Dialect::Ansible);
    }

    #[test]
    fn test_unknown_dialect() {
        let err = "pulumi".parse::<Dialect>().unwrap_err();
        assert!(err.to_string().contains("pulumi"));
    }

    #[test]
    fn test_display_round_trips() {
        for dialect in Dialect::all() {
            assert_eq!(dialect.to_string().parse::<Dialect>().unwrap(), dialect);
        }
    }
}
