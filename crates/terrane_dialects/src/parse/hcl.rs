//! Terraform configurations read through `hcl-edit`.
//!
//! The crate parses each top-level item; this module maps its syntax tree
//! into the small [`HclFile`] model the normalizer consumes. Blocks,
//! attributes, lists, objects, quoted templates and traversals are mapped
//! structurally. Everything else (function calls, operators, conditionals,
//! `for` expressions, template directives, index and splat traversals) is
//! kept as raw expression text.
//!
//! Errors are scoped to the top-level item they occur in: the file is split
//! into items first, so one broken block never hides the rest of the file.

use std::ops::Range;

use hcl_edit::expr::{Expression, ObjectKey, Traversal, TraversalOperator};
use hcl_edit::parser::parse_body;
use hcl_edit::structure::{Block, BlockLabel, Body, Structure};
use hcl_edit::template::Element;
use hcl_edit::Span;
use terrane_model::ParseError;
use tracing::debug;

/// Keywords that start a top-level Terraform block.
pub const TOP_LEVEL_BLOCKS: &[&str] = &[
    "resource", "data", "variable", "output", "locals", "module", "provider", "terraform", "moved", "import",
    "check", "removed",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    /// Number literal as written
    Number(String),
    Template(Vec<TemplatePart>),
    List(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// `a.b.c`
    Traversal(Vec<String>),
    Raw(String),
}

impl Expr {
    /// The string when this is a template without interpolation.
    pub fn as_literal_str(&self) -> Option<String> {
        match self {
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(s) => out.push_str(s),
                        TemplatePart::Interpolation(_) => return None,
                    }
                }
                Some(out)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Interpolation(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HclAttribute {
    pub name: String,
    pub value: Expr,
    /// Value source text
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HclBlock {
    pub kind: String,
    pub labels: Vec<String>,
    pub body: HclBody,
    pub line: usize,
    /// Full block source text
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HclBody {
    pub attributes: Vec<HclAttribute>,
    pub blocks: Vec<HclBlock>,
}

impl HclBody {
    pub fn attribute(&self, name: &str) -> Option<&HclAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// A parsed `.tf` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HclFile {
    pub body: HclBody,
}

/// Parse one file. Never fails; malformed top-level items become errors.
pub fn parse_hcl(file: &str, text: &str) -> (HclFile, Vec<ParseError>) {
    let mut collector = Collector {
        file,
        body: HclBody::default(),
        errors: Vec::new(),
    };
    collector.items(text, 1);
    debug!(
        "Read {}: {} blocks, {} errors",
        file,
        collector.body.blocks.len(),
        collector.errors.len()
    );
    (HclFile { body: collector.body }, collector.errors)
}

struct Collector<'f> {
    file: &'f str,
    body: HclBody,
    errors: Vec<ParseError>,
}

impl Collector<'_> {
    /// Parse every top-level item of `text`, which starts at `line`.
    fn items(&mut self, text: &str, line: usize) {
        for item in split_items(text) {
            self.item(item.text, line + item.line - 1);
        }
    }

    fn item(&mut self, text: &str, line: usize) {
        match parse_body(text) {
            Ok(body) => {
                let reader = Reader { source: text, line };
                let parsed = reader.body(&body);
                self.body.attributes.extend(parsed.attributes);
                self.body.blocks.extend(parsed.blocks);
            }
            // an unclosed block swallows the items after it; retry those
            Err(err) => match keyword_cut(text) {
                Some(cut) => {
                    self.item(&text[..cut], line);
                    let rest_line = line + text[..cut].matches('\n').count();
                    self.items(&text[cut..], rest_line);
                }
                None => {
                    let mut error = ParseError::new(
                        self.file,
                        Some(line + err.location().line().saturating_sub(1)),
                        err.message().to_string(),
                    );
                    if let Some(resource) = header_label(text) {
                        error = error.with_resource(resource);
                    }
                    self.errors.push(error);
                }
            },
        }
    }
}

/// Maps `hcl-edit` nodes parsed from `source` into the file model.
struct Reader<'a> {
    source: &'a str,
    /// Line `source` starts at
    line: usize,
}

impl Reader<'_> {
    fn line_of(&self, span: Option<Range<usize>>) -> usize {
        let before = span
            .and_then(|range| self.source.get(..range.start))
            .map_or(0, |text| text.matches('\n').count());
        self.line + before
    }

    fn slice(&self, span: Option<Range<usize>>) -> Option<String> {
        span.and_then(|range| self.source.get(range)).map(|s| s.trim().to_string())
    }

    fn text(&self, expr: &Expression) -> String {
        self.slice(expr.span())
            .unwrap_or_else(|| expr.to_string().trim().to_string())
    }

    fn body(&self, body: &Body) -> HclBody {
        let mut out = HclBody::default();
        for structure in body.iter() {
            match structure {
                Structure::Attribute(attribute) => out.attributes.push(HclAttribute {
                    name: attribute.key.as_str().to_string(),
                    value: self.expr(&attribute.value),
                    text: self.text(&attribute.value),
                    line: self.line_of(attribute.span()),
                }),
                Structure::Block(block) => out.blocks.push(self.block(block)),
            }
        }
        out
    }

    fn block(&self, block: &Block) -> HclBlock {
        HclBlock {
            kind: block.ident.as_str().to_string(),
            labels: block.labels.iter().map(label).collect(),
            body: self.body(&block.body),
            line: self.line_of(block.span()),
            text: self
                .slice(block.span())
                .unwrap_or_else(|| Body::from_iter([block.clone()]).to_string().trim().to_string()),
        }
    }

    fn expr(&self, expr: &Expression) -> Expr {
        match expr {
            Expression::Null(_) => Expr::Null,
            Expression::Bool(b) => Expr::Bool(*b.value()),
            Expression::Number(_) => Expr::Number(self.text(expr)),
            Expression::String(s) => Expr::Template(vec![TemplatePart::Literal(s.value().clone())]),
            Expression::Array(array) => Expr::List(array.iter().map(|item| self.expr(item)).collect()),
            Expression::Object(object) => Expr::Object(
                object
                    .iter()
                    .map(|(key, value)| (self.object_key(key), self.expr(value.expr())))
                    .collect(),
            ),
            Expression::StringTemplate(template) => self.template(template.iter(), expr),
            Expression::HeredocTemplate(_) => {
                let text = self.text(expr);
                match heredoc_literal(&text) {
                    Some(literal) => Expr::Template(vec![TemplatePart::Literal(literal)]),
                    None => Expr::Raw(text),
                }
            }
            Expression::Variable(name) => Expr::Traversal(vec![name.as_str().to_string()]),
            Expression::Traversal(traversal) => self
                .traversal(traversal)
                .unwrap_or_else(|| Expr::Raw(self.text(expr))),
            _ => {
                let text = self.text(expr);
                // `-1` parses as an operation
                if text.parse::<f64>().is_ok() {
                    Expr::Number(text)
                } else {
                    Expr::Raw(text)
                }
            }
        }
    }

    fn template<'e>(&self, elements: impl Iterator<Item = &'e Element>, whole: &Expression) -> Expr {
        let mut parts = Vec::new();
        for element in elements {
            match element {
                Element::Literal(literal) => parts.push(TemplatePart::Literal(literal.value().clone())),
                Element::Interpolation(interpolation) => {
                    parts.push(TemplatePart::Interpolation(Box::new(self.expr(&interpolation.expr))))
                }
                // `%{ if }` and `%{ for }` directives stay native
                _ => return Expr::Raw(self.text(whole)),
            }
        }
        Expr::Template(parts)
    }

    fn object_key(&self, key: &ObjectKey) -> String {
        match key {
            ObjectKey::Ident(ident) => ident.as_str().to_string(),
            ObjectKey::Expression(Expression::String(s)) => s.value().clone(),
            ObjectKey::Expression(expr) => self.text(expr),
        }
    }

    /// `a.b.c` over plain attribute access; `None` for index or splat
    /// operators and non-variable roots.
    fn traversal(&self, traversal: &Traversal) -> Option<Expr> {
        let Expression::Variable(root) = &traversal.expr else {
            return None;
        };
        let mut parts = vec![root.as_str().to_string()];
        for operator in &traversal.operators {
            match operator.value() {
                TraversalOperator::GetAttr(name) => parts.push(name.as_str().to_string()),
                _ => return None,
            }
        }
        Some(Expr::Traversal(parts))
    }
}

fn label(label: &BlockLabel) -> String {
    match label {
        BlockLabel::Ident(ident) => ident.as_str().to_string(),
        BlockLabel::String(s) => s.value().clone(),
    }
}

/// Content of a heredoc without interpolation, indentation stripped for
/// `<<-` markers.
fn heredoc_literal(text: &str) -> Option<String> {
    let mut lines: Vec<&str> = text.lines().collect();
    if lines.len() < 2 {
        return None;
    }
    let indented = lines.remove(0).trim_start().starts_with("<<-");
    lines.pop();
    if lines.iter().any(|line| line.contains("${") || line.contains("%{")) {
        return None;
    }

    let indent = if indented {
        lines
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.len() - line.trim_start().len())
            .min()
            .unwrap_or(0)
    } else {
        0
    };
    let mut out = String::new();
    for line in lines {
        out.push_str(line.get(indent..).unwrap_or_else(|| line.trim_start()));
        out.push('\n');
    }
    Some(out)
}

/// A top-level item's source text.
#[derive(Debug, PartialEq)]
struct Item<'a> {
    text: &'a str,
    /// Line of `text` within the scanned input, from 1
    line: usize,
}

#[derive(Debug, Clone, Copy)]
enum Scan {
    Quoted,
    /// Open `${` or `%{`, with the braces opened inside it
    Interpolation(usize),
}

/// Split `text` into top-level items by bracket depth. Strings, comments
/// and heredocs are skipped so their brackets do not count.
fn split_items(text: &str) -> Vec<Item<'_>> {
    let bytes = text.as_bytes();
    let mut items = Vec::new();
    let mut start: Option<(usize, usize)> = None;
    let mut stack: Vec<Scan> = Vec::new();
    let mut depth = 0usize;
    let mut line = 1;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();

        if b == b'\n' {
            if matches!(stack.last(), Some(Scan::Quoted)) {
                stack.pop();
            }
            line += 1;
            if stack.is_empty() && depth == 0 {
                if let Some((offset, first)) = start.take() {
                    items.push(Item {
                        text: &text[offset..=i],
                        line: first,
                    });
                }
            }
            i += 1;
            continue;
        }

        if let Some(Scan::Quoted) = stack.last() {
            match (b, next) {
                (b'\\', _) => i += 1,
                (b'$', Some(b'$')) | (b'%', Some(b'%')) if bytes.get(i + 2) == Some(&b'{') => i += 2,
                (b'$', Some(b'{')) | (b'%', Some(b'{')) => {
                    stack.push(Scan::Interpolation(0));
                    i += 1;
                }
                (b'"', _) => {
                    stack.pop();
                }
                _ => {}
            }
            i += 1;
            continue;
        }

        match (b, next) {
            (b'#', _) | (b'/', Some(b'/')) => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            (b'/', Some(b'*')) => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    if bytes[i] == b'\n' {
                        line += 1;
                    }
                    i += 1;
                }
                i += 2;
                continue;
            }
            _ => {}
        }

        if !b.is_ascii_whitespace() && start.is_none() && stack.is_empty() && depth == 0 {
            start = Some((i, line));
        }

        match b {
            b'"' => stack.push(Scan::Quoted),
            b'<' if next == Some(b'<') => {
                if let Some(end) = heredoc_end(bytes, i) {
                    line += bytes[i..end].iter().filter(|c| **c == b'\n').count();
                    i = end;
                    continue;
                }
            }
            b'{' | b'[' | b'(' => match stack.last_mut() {
                Some(Scan::Interpolation(open)) => {
                    if b == b'{' {
                        *open += 1;
                    }
                }
                _ => depth += 1,
            },
            b'}' | b']' | b')' => match stack.last_mut() {
                Some(Scan::Interpolation(open)) => {
                    if b == b'}' {
                        if *open == 0 {
                            stack.pop();
                        } else {
                            *open -= 1;
                        }
                    }
                }
                _ => depth = depth.saturating_sub(1),
            },
            _ => {}
        }
        i += 1;
    }

    if let Some((offset, first)) = start {
        items.push(Item {
            text: &text[offset..],
            line: first,
        });
    }
    items
}

/// Offset of the newline ending the heredoc that opens at `at`, or the
/// end of input when the closing marker is missing.
fn heredoc_end(bytes: &[u8], at: usize) -> Option<usize> {
    let mut i = at + 2;
    if bytes.get(i) == Some(&b'-') {
        i += 1;
    }
    let marker_start = i;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if i == marker_start {
        return None;
    }
    let marker = &bytes[marker_start..i];

    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    while i < bytes.len() {
        let line_start = i + 1;
        let mut line_end = line_start;
        while line_end < bytes.len() && bytes[line_end] != b'\n' {
            line_end += 1;
        }
        if bytes.get(line_start..line_end).map(<[u8]>::trim_ascii) == Some(marker) {
            return Some(line_end);
        }
        i = line_end;
    }
    Some(bytes.len())
}

/// Offset of the first line after the first one that starts a top-level
/// block at column 0.
fn keyword_cut(text: &str) -> Option<usize> {
    let mut offset = text.find('\n')? + 1;
    for line in text[offset..].split_inclusive('\n') {
        let word: String = line.chars().take_while(|c| c.is_alphanumeric() || *c == '_').collect();
        let after = line[word.len()..].chars().next();
        if TOP_LEVEL_BLOCKS.contains(&word.as_str()) && matches!(after, Some(' ' | '\t' | '{' | '"')) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Best-effort resource label from a block header.
fn header_label(text: &str) -> Option<String> {
    let header = text.lines().next()?.split('{').next()?;
    let mut words = header.split_whitespace();
    let kind = words.next()?;
    let labels: Vec<&str> = words.map(|w| w.trim_matches('"')).collect();
    match (kind, labels.as_slice()) {
        ("resource", [t, n, ..]) => Some(format!("{}.{}", t, n)),
        (_, [l, ..]) => Some(format!("{}.{}", kind, l)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> HclFile {
        let (file, errors) = parse_hcl("main.tf", text);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        file
    }

    #[test]
    fn test_resource_block_with_attributes() {
        let file = parse_ok(
            r#"
resource "aws_instance" "web" {
  ami           = "ami-123"
  instance_type = "t3.micro"
  count         = 2
  monitoring    = true
  subnet_id     = aws_subnet.a.id
}
"#,
        );
        let block = &file.body.blocks[0];
        assert_eq!(block.kind, "resource");
        assert_eq!(block.labels, vec!["aws_instance", "web"]);
        assert_eq!(block.line, 2);
        let body = &block.body;
        assert_eq!(body.attribute("ami").unwrap().value.as_literal_str().as_deref(), Some("ami-123"));
        assert_eq!(body.attribute("count").unwrap().value, Expr::Number("2".into()));
        assert_eq!(body.attribute("count").unwrap().line, 5);
        assert_eq!(body.attribute("monitoring").unwrap().value, Expr::Bool(true));
        assert_eq!(
            body.attribute("subnet_id").unwrap().value,
            Expr::Traversal(vec!["aws_subnet".into(), "a".into(), "id".into()])
        );
        assert!(block.text.starts_with("resource \"aws_instance\" \"web\" {"));
        assert!(block.text.ends_with('}'));
    }

    #[test]
    fn test_nested_blocks_lists_and_objects() {
        let file = parse_ok(
            r#"
resource "aws_security_group" "web" {
  ingress {
    from_port   = 443
    cidr_blocks = ["10.0.0.0/8", "192.168.0.0/16",]
  }
  tags = {
    Name = "web"
    "team" = "infra"
  }
}
"#,
        );
        let body = &file.body.blocks[0].body;
        assert_eq!(body.blocks[0].kind, "ingress");
        assert!(matches!(&body.blocks[0].body.attribute("cidr_blocks").unwrap().value, Expr::List(items) if items.len() == 2));
        match &body.attribute("tags").unwrap().value {
            Expr::Object(entries) => {
                assert_eq!(entries[0].0, "Name");
                assert_eq!(entries[1].0, "team");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_interpolation_and_raw_expressions() {
        let file = parse_ok(
            r#"
resource "aws_s3_bucket" "logs" {
  bucket = "${var.prefix}-logs-${aws_vpc.main.id}"
  cidr   = cidrsubnet(aws_vpc.main.cidr_block, 8, 1)
  name   = var.enabled ? "a" : "b"
  offset = -1
}
"#,
        );
        let body = &file.body.blocks[0].body;
        match &body.attribute("bucket").unwrap().value {
            Expr::Template(parts) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(
                    parts[0],
                    TemplatePart::Interpolation(Box::new(Expr::Traversal(vec!["var".into(), "prefix".into()])))
                );
                assert_eq!(parts[1], TemplatePart::Literal("-logs-".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            body.attribute("cidr").unwrap().value,
            Expr::Raw("cidrsubnet(aws_vpc.main.cidr_block, 8, 1)".into())
        );
        assert_eq!(body.attribute("name").unwrap().value, Expr::Raw("var.enabled ? \"a\" : \"b\"".into()));
        assert_eq!(body.attribute("offset").unwrap().value, Expr::Number("-1".into()));
    }

    #[test]
    fn test_template_directives_stay_native() {
        let file = parse_ok("locals {\n  y = \"%{ if var.a }yes%{ else }no%{ endif }\"\n}\n");
        assert_eq!(
            file.body.blocks[0].body.attribute("y").unwrap().value,
            Expr::Raw("\"%{ if var.a }yes%{ else }no%{ endif }\"".into())
        );
    }

    #[test]
    fn test_heredoc() {
        let file = parse_ok(
            "locals {\n  plain = <<-EOT\n    echo hi\n    echo bye\n  EOT\n  script = <<EOT\necho ${var.name}\nEOT\n}\n",
        );
        let body = &file.body.blocks[0].body;
        assert_eq!(
            body.attribute("plain").unwrap().value,
            Expr::Template(vec![TemplatePart::Literal("echo hi\necho bye\n".into())])
        );
        match &body.attribute("script").unwrap().value {
            Expr::Raw(text) => {
                assert!(text.starts_with("<<EOT\n"));
                assert!(text.ends_with("EOT"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_recovery_after_broken_block() {
        let text = r#"
resource "aws_vpc" "broken" {
  cidr_block = "10.0.0.0/16
}

resource "aws_vpc" "ok" {
  cidr_block = "10.1.0.0/16"
}
"#;
        let (file, errors) = parse_hcl("main.tf", text);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].line, Some(2..=4)), "line {:?}", errors[0].line);
        assert_eq!(errors[0].resource.as_deref(), Some("aws_vpc.broken"));
        assert_eq!(file.body.blocks.len(), 1);
        assert_eq!(file.body.blocks[0].labels[1], "ok");
        assert_eq!(file.body.blocks[0].line, 6);
    }

    #[test]
    fn test_unclosed_block_stops_at_next_keyword() {
        let text = "resource \"aws_vpc\" \"a\" {\n  cidr_block = \"x\"\n\nresource \"aws_vpc\" \"b\" {\n}\n";
        let (file, errors) = parse_hcl("main.tf", text);
        assert_eq!(errors.len(), 1);
        assert_eq!(file.body.blocks.len(), 1);
        assert_eq!(file.body.blocks[0].labels[1], "b");
        assert_eq!(file.body.blocks[0].line, 4);
    }

    #[test]
    fn test_comments_are_ignored() {
        let file = parse_ok("# top\n// also\n/* block */\nvariable \"x\" { # trailing\n  default = 1 // one\n}\n");
        assert_eq!(file.body.blocks[0].body.attribute("default").unwrap().value, Expr::Number("1".into()));
    }

    #[test]
    fn test_unicode_labels() {
        let file = parse_ok("resource \"aws_s3_bucket\" \"é\" {\n  bucket = \"x\"\n}\n");
        assert_eq!(file.body.blocks[0].labels, vec!["aws_s3_bucket", "é"]);
    }

    #[test]
    fn test_split_items_skips_strings_and_heredocs() {
        let text = "locals {\n  a = \"}${join(\"}\", [])}\"\n  b = <<EOT\n}\nEOT\n}\n\nvariable \"x\" {}\n";
        let items = split_items(text);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].line, 1);
        assert!(items[0].text.ends_with("}\n"));
        assert_eq!(items[1].text, "variable \"x\" {}\n");
        assert_eq!(items[1].line, 8);
    }
}
