//! Dialect parsers. Each parser returns whatever it could read together
//! with the errors it recovered from; nothing here aborts a whole tree.

pub mod ansible;
pub mod cloudformation;
pub mod hcl;
pub mod kubernetes;

use terrane_model::{Dialect, ParseError};
use tracing::debug;

use crate::source::SourceFile;

pub use ansible::{parse_ansible, AnsibleFile, Play, PlaybookEntry, Task, TaskSection};
pub use cloudformation::{parse_cloudformation, CfnResource, CfnTemplate};
pub use hcl::{parse_hcl, Expr, HclAttribute, HclBlock, HclBody, HclFile, TemplatePart};
pub use kubernetes::{parse_kubernetes, KubeDocument};

/// Native syntax tree of one file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileAst {
    Terraform(HclFile),
    CloudFormation(CfnTemplate),
    Kubernetes(Vec<KubeDocument>),
    Ansible(AnsibleFile),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    pub path: String,
    pub dialect: Dialect,
    pub ast: FileAst,
}

/// All parsed files of one dialect, in path order.
#[derive(Debug, Clone, PartialEq)]
pub struct DialectAst {
    pub dialect: Dialect,
    pub files: Vec<ParsedFile>,
}

pub fn parse_file(dialect: Dialect, source: &SourceFile) -> (ParsedFile, Vec<ParseError>) {
    let path = source.path.as_str();
    let text = source.text.as_str();
    let (ast, errors) = match dialect {
        Dialect::Terraform => {
            let (file, errors) = parse_hcl(path, text);
            (FileAst::Terraform(file), errors)
        }
        Dialect::CloudFormation => {
            let (template, errors) = parse_cloudformation(path, text);
            (FileAst::CloudFormation(template), errors)
        }
        Dialect::Kubernetes => {
            let (documents, errors) = parse_kubernetes(path, text);
            (FileAst::Kubernetes(documents), errors)
        }
        Dialect::Ansible => {
            let (file, errors) = parse_ansible(path, text);
            (FileAst::Ansible(file), errors)
        }
    };
    debug!("Parsed {} as {} ({} errors)", path, dialect, errors.len());
    (
        ParsedFile {
            path: path.to_string(),
            dialect,
            ast,
        },
        errors,
    )
}

/// Parse every file of `files` sequentially. The normalizer runs
/// `parse_file` per file concurrently instead; this is the simple path.
pub fn parse<'a>(
    dialect: Dialect,
    files: impl IntoIterator<Item = &'a SourceFile>,
) -> (DialectAst, Vec<ParseError>) {
    let mut parsed: Vec<ParsedFile> = Vec::new();
    let mut errors = Vec::new();
    for source in files {
        let (file, mut file_errors) = parse_file(dialect, source);
        parsed.push(file);
        errors.append(&mut file_errors);
    }
    parsed.sort_by(|a, b| a.path.cmp(&b.path));
    (DialectAst { dialect, files: parsed }, errors)
}
