//! Per-file dialect inference.
//!
//! Precedence, first match wins:
//! 1. `.tf` extension: Terraform
//! 2. a `group_vars/` or `host_vars/` path: Ansible
//! 3. CloudFormation markers (`AWSTemplateFormatVersion`, or `Resources`
//!    entries typed `AWS::...`)
//! 4. Kubernetes markers (`apiVersion` and `kind`)
//! 5. Ansible markers (plays with `hosts` plus `tasks`/`roles`, or a
//!    `playbook.yml` / `*.playbook.yml` file name)

use std::sync::OnceLock;

use regex::Regex;
use terrane_model::Dialect;

fn cfn_type() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)(^\s*Type:\s*['"]?AWS::|"Type"\s*:\s*"AWS::)"#).expect("valid regex"))
}

fn kube_markers() -> &'static (Regex, Regex) {
    static RE: OnceLock<(Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r#"(?m)(^apiVersion:|"apiVersion"\s*:)"#).expect("valid regex"),
            Regex::new(r#"(?m)(^kind:|"kind"\s*:)"#).expect("valid regex"),
        )
    })
}

fn play_markers() -> &'static (Regex, Regex) {
    static RE: OnceLock<(Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"(?m)^-?\s*hosts:").expect("valid regex"),
            Regex::new(r"(?m)^\s*(tasks|roles|pre_tasks|post_tasks|handlers):").expect("valid regex"),
        )
    })
}

/// Infer the dialect of one file, `None` when it is not infrastructure.
pub fn detect(path: &str, text: &str) -> Option<Dialect> {
    let lower = path.to_lowercase();
    let extension = lower.rsplit('.').next().unwrap_or_default();

    if extension == "tf" {
        return Some(Dialect::Terraform);
    }
    if !matches!(extension, "yaml" | "yml" | "json" | "template") {
        return None;
    }

    let in_vars_dir = lower
        .split('/')
        .any(|part| part == "group_vars" || part == "host_vars");
    if in_vars_dir && extension != "json" {
        return Some(Dialect::Ansible);
    }

    if text.contains("AWSTemplateFormatVersion") || (text.contains("Resources") && cfn_type().is_match(text)) {
        return Some(Dialect::CloudFormation);
    }

    let (api, kind) = kube_markers();
    if api.is_match(text) && kind.is_match(text) {
        return Some(Dialect::Kubernetes);
    }

    let file_name = lower.rsplit('/').next().unwrap_or_default();
    let named_playbook = matches!(file_name, "playbook.yml" | "playbook.yaml")
        || file_name.ends_with(".playbook.yml")
        || file_name.ends_with(".playbook.yaml");
    let (hosts, body) = play_markers();
    if named_playbook || (text.trim_start().starts_with('-') && hosts.is_match(text) && body.is_match(text)) {
        return Some(Dialect::Ansible);
    }

    None
}
