//! # terrane_normalize
//!
//! Turns parsed dialect sources into one canonical [`ResourceGraph`].
//!
//! Each file becomes a [`Fragment`] on its own (in parallel for a whole
//! tree); fragments are then merged in path order, references are resolved
//! to edges and whatever cannot be resolved is reported as a
//! [`NormalizationWarning`].

pub mod ansible;
pub mod cloudformation;
pub mod error;
pub mod fragment;
pub mod kubernetes;
pub mod merge;
pub mod properties;
pub mod terraform;

pub use error::{NormalizeError, NormalizeResult};
pub use fragment::{Fragment, PendingEdge};
pub use merge::{merge, Merged};
pub use properties::PropertyConverter;

use terrane_dialects::{parse_file, DialectAst, FileAst, ParsedFile, SourceTree};
use terrane_model::{Dialect, NormalizationWarning, ParseError, ResourceGraph, WarningKind};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Everything normalization of a source tree produced.
#[derive(Debug, Clone)]
pub struct NormalizeOutput {
    pub graph: ResourceGraph,
    pub warnings: Vec<NormalizationWarning>,
    /// Discovery, parse and per-resource errors, sorted by file and line
    pub parse_errors: Vec<ParseError>,
}

/// Fragment of one parsed file.
pub fn fragment_for(file: &ParsedFile) -> Fragment {
    match &file.ast {
        FileAst::Terraform(hcl) => terraform::fragment(&file.path, hcl),
        FileAst::CloudFormation(template) => cloudformation::fragment(&file.path, template),
        FileAst::Kubernetes(documents) => kubernetes::fragment(&file.path, documents),
        FileAst::Ansible(ansible) => ansible::fragment(&file.path, ansible),
    }
}

/// Normalize an already parsed tree.
///
/// Resources that could not be normalized are reported as
/// `unsupported-construct` warnings.
pub fn normalize(ast: &DialectAst, dialect: Dialect) -> (ResourceGraph, Vec<NormalizationWarning>) {
    let fragments = ast.files.iter().map(fragment_for).collect();
    let merged = merge(dialect, fragments);
    let mut warnings = merged.warnings;
    for error in merged.errors {
        let mut warning = NormalizationWarning::new(WarningKind::UnsupportedConstruct, error.message.clone())
            .in_file(error.file.clone());
        if let Some(resource) = &error.resource {
            warning = warning.for_node(resource.clone());
        }
        warnings.push(warning);
    }
    (merged.graph, warnings)
}

/// Parse and normalize every file of `tree` concurrently, then merge.
pub async fn normalize_tree(tree: SourceTree, dialect: Dialect) -> NormalizeResult<NormalizeOutput> {
    info!("Normalizing {} {} files", tree.files.len(), dialect);
    let mut tasks = JoinSet::new();
    for source in tree.files {
        tasks.spawn_blocking(move || {
            let (parsed, errors) = parse_file(dialect, &source);
            (fragment_for(&parsed), errors)
        });
    }

    let mut fragments = Vec::new();
    let mut parse_errors = tree.errors;
    while let Some(joined) = tasks.join_next().await {
        let (fragment, errors) = joined.map_err(|e| NormalizeError::TaskFailed(e.to_string()))?;
        parse_errors.extend(errors);
        fragments.push(fragment);
    }

    let merged = merge(dialect, fragments);
    parse_errors.extend(merged.errors);
    parse_errors.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
    debug!(
        "Normalized graph: {} nodes, {} edges, {} warnings",
        merged.graph.node_count(),
        merged.graph.edge_count(),
        merged.warnings.len()
    );

    Ok(NormalizeOutput {
        graph: merged.graph,
        warnings: merged.warnings,
        parse_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrane_dialects::{parse, SourceFile};

    #[test]
    fn test_normalize_reports_skipped_resources() {
        let files = vec![
            SourceFile::new("main.tf", "resource \"aws_vpc\" {\n  cidr_block = \"10.0.0.0/16\"\n}\n"),
            SourceFile::new("ok.tf", "resource \"aws_vpc\" \"main\" {\n  cidr_block = \"10.0.0.0/16\"\n}\n"),
        ];
        let (ast, errors) = parse(Dialect::Terraform, &files);
        assert!(errors.is_empty());
        let (graph, warnings) = normalize(&ast, Dialect::Terraform);
        assert_eq!(graph.node_ids(), vec!["aws_vpc.main".to_string()]);
        assert!(warnings
            .iter()
            .any(|w| w.kind == WarningKind::UnsupportedConstruct && w.file.as_deref() == Some("main.tf")));
    }

    #[tokio::test]
    async fn test_normalize_tree_merges_in_path_order() {
        let tree = SourceTree::from_files(vec![
            ("b.tf", "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"second\"\n}\n"),
            ("a.tf", "resource \"aws_s3_bucket\" \"logs\" {\n  bucket = \"first\"\n}\n"),
        ]);
        let output = normalize_tree(tree, Dialect::Terraform).await.unwrap();
        let node = output.graph.node("aws_s3_bucket.logs").unwrap();
        assert_eq!(node.property_str("bucket_name"), Some("second"));
        assert_eq!(output.warnings[0].kind, WarningKind::ConflictingDeclaration);
    }
}
