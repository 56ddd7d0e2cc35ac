//! Rules over constructs kept verbatim: template parameters and outputs,
//! Terraform variables, providers and settings.

use serde_yaml::Value;
use terrane_dialects::parse::{parse_hcl, HclBlock};
use terrane_model::{Dialect, FindingTarget, PassthroughBlock, ResourceGraph, ValidationFinding};
use tracing::debug;

use crate::error::PolicyResult;
use crate::rule::ValidationRule;

fn place(block: &PassthroughBlock) -> &str {
    block.file.as_deref().unwrap_or("<source>")
}

/// Top-level HCL blocks of a Terraform passthrough block.
fn hcl_blocks(block: &PassthroughBlock) -> Vec<HclBlock> {
    let (file, errors) = parse_hcl(place(block), &block.text);
    if !errors.is_empty() {
        debug!("Skipping unreadable {} block in {}", block.kind, place(block));
    }
    file.body.blocks
}

fn terraform<'a>(graph: &'a ResourceGraph, kind: &'a str) -> impl Iterator<Item = &'a PassthroughBlock> {
    graph
        .passthrough
        .iter()
        .filter(move |b| b.dialect == Dialect::Terraform && b.kind == kind)
}

/// Inputs and outputs without a description.
pub struct UndocumentedInterface;

impl UndocumentedInterface {
    fn cloudformation(block: &PassthroughBlock) -> Vec<String> {
        let section = match serde_yaml::from_str::<Value>(&block.text) {
            Ok(value) => value.get(block.kind.as_str()).cloned(),
            Err(err) => {
                debug!("Skipping unreadable {} section: {}", block.kind, err);
                None
            }
        };
        let Some(Value::Mapping(entries)) = section else {
            return Vec::new();
        };
        let noun = if block.kind == "Outputs" { "output" } else { "parameter" };
        entries
            .iter()
            .filter(|(_, entry)| entry.get("Description").is_none())
            .filter_map(|(name, _)| name.as_str())
            .map(|name| format!("{} {} in {} has no Description", noun, name, place(block)))
            .collect()
    }

    fn terraform(block: &PassthroughBlock) -> Vec<String> {
        hcl_blocks(block)
            .into_iter()
            .filter(|b| b.body.attribute("description").is_none())
            .map(|b| {
                let name = b.labels.first().map(String::as_str).unwrap_or("?");
                format!("{} {} in {} has no description", b.kind, name, place(block))
            })
            .collect()
    }
}

impl ValidationRule for UndocumentedInterface {
    rule_identity!(
        "best-practice.undocumented-interface",
        BestPractice,
        Warning,
        "Parameters, variables and outputs carry a description"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        let mut messages = Vec::new();
        for block in &graph.passthrough {
            match (block.dialect, block.kind.as_str()) {
                (Dialect::CloudFormation, "Parameters" | "Outputs") => messages.extend(Self::cloudformation(block)),
                (Dialect::Terraform, "variable" | "output") => messages.extend(Self::terraform(block)),
                _ => {}
            }
        }
        Ok(messages
            .into_iter()
            .map(|message| self.finding(FindingTarget::Graph, message))
            .collect())
    }
}

/// Providers with no version constraint anywhere.
pub struct UnpinnedProvider;

impl ValidationRule for UnpinnedProvider {
    rule_identity!(
        "best-practice.unpinned-provider",
        BestPractice,
        Info,
        "Provider versions are constrained"
    );

    fn evaluate(&self, graph: &ResourceGraph) -> PolicyResult<Vec<ValidationFinding>> {
        let required = terraform(graph, "terraform")
            .flat_map(hcl_blocks)
            .any(|settings| settings.body.blocks.iter().any(|b| b.kind == "required_providers"));
        if required {
            return Ok(Vec::new());
        }

        let mut findings = Vec::new();
        for block in terraform(graph, "provider") {
            for provider in hcl_blocks(block) {
                if provider.body.attribute("version").is_none() {
                    let name = provider.labels.first().map(String::as_str).unwrap_or("?");
                    findings.push(self.finding(
                        FindingTarget::Graph,
                        format!("provider {} in {} has no version constraint", name, place(block)),
                    ));
                }
            }
        }
        Ok(findings)
    }
}
