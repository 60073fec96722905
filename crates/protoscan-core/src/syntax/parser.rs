//! Protocol parsing wrapper used by every analysis and transformation pass.
//!
//! Protocols are Python scripts; we parse them with the native
//! tree-sitter Python grammar. tree-sitter is error tolerant, so a tree that
//! contains `ERROR` or `MISSING` nodes is treated as a parse failure here.

use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::errors::{ScanError, ScanResult};
use crate::syntax::calls::{call_sites, CallSite};

/// Parsed protocol source. Owns both the text and the tree built from it.
pub struct ParsedProtocol {
    file_name: String,
    source: String,
    tree: Tree,
}

impl std::fmt::Debug for ParsedProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedProtocol")
            .field("file_name", &self.file_name)
            .field("bytes", &self.source.len())
            .finish()
    }
}

fn new_parser(file_name: &str) -> ScanResult<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ScanError::parse(file_name, format!("Failed to set language: {e}")))?;
    Ok(parser)
}

/// Locate the first error or missing node, returning its 1-based line.
fn first_error_line(root: Node<'_>) -> Option<usize> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

impl ParsedProtocol {
    /// Parse protocol source text. `file_name` is only used for reporting.
    pub fn parse(file_name: impl Into<String>, source: impl Into<String>) -> ScanResult<Self> {
        let file_name = file_name.into();
        let source = source.into();

        let mut parser = new_parser(&file_name)?;
        let tree = parser
            .parse(source.as_bytes(), None)
            .ok_or_else(|| ScanError::parse(&file_name, "parser returned no tree"))?;

        let root = tree.root_node();
        if root.has_error() {
            let message = match first_error_line(root) {
                Some(line) => format!("invalid syntax at line {line}"),
                None => "invalid syntax".to_string(),
            };
            return Err(ScanError::parse(file_name, message));
        }

        Ok(Self {
            file_name,
            source,
            tree,
        })
    }

    /// Read and parse a protocol file.
    pub fn from_path(path: &Path) -> ScanResult<Self> {
        let source = std::fs::read_to_string(path)?;
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self::parse(file_name, source)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Number of lines in the source, counting a trailing partial line.
    pub fn line_count(&self) -> usize {
        self.source.lines().count()
    }

    /// Every call expression in the tree, in source order.
    pub fn call_sites(&self) -> Vec<CallSite<'_>> {
        call_sites(self.root(), &self.source)
    }

    /// Every attribute call whose method name equals `method`.
    pub fn method_calls<'a>(&'a self, method: &str) -> Vec<CallSite<'a>> {
        self.call_sites()
            .into_iter()
            .filter(|call| call.method() == Some(method))
            .collect()
    }

    /// Top-level `name = value` bindings in statement order.
    ///
    /// Chained (`a = b = 1`) and annotated (`a: int = 1`) assignments bind
    /// every plain identifier target; tuple targets are skipped.
    pub fn module_assignments(&self) -> Vec<(&str, Node<'_>)> {
        let root = self.root();
        let mut bindings = Vec::new();
        let mut cursor = root.walk();
        for statement in root.named_children(&mut cursor) {
            if statement.kind() != "expression_statement" {
                continue;
            }
            let Some(mut assignment) = statement.named_child(0) else {
                continue;
            };
            let mut targets = Vec::new();
            while assignment.kind() == "assignment" {
                if let Some(left) = assignment.child_by_field_name("left") {
                    targets.push(left);
                }
                match assignment.child_by_field_name("right") {
                    Some(right) => assignment = right,
                    None => break,
                }
            }
            if targets.is_empty() || assignment.kind() == "assignment" {
                continue;
            }
            for target in targets {
                if target.kind() != "identifier" {
                    continue;
                }
                if let Some(name) = node_text(target, &self.source) {
                    bindings.push((name, assignment));
                }
            }
        }
        bindings
    }

    /// Top-level function definition named `name`; the last one wins.
    pub fn module_function(&self, name: &str) -> Option<Node<'_>> {
        let root = self.root();
        let mut cursor = root.walk();
        let mut found = None;
        for statement in root.named_children(&mut cursor) {
            let definition = if statement.kind() == "decorated_definition" {
                match statement.child_by_field_name("definition") {
                    Some(def) => def,
                    None => continue,
                }
            } else {
                statement
            };
            if definition.kind() != "function_definition" {
                continue;
            }
            let def_name = definition
                .child_by_field_name("name")
                .and_then(|n| node_text(n, &self.source));
            if def_name == Some(name) {
                found = Some(definition);
            }
        }
        found
    }
}

/// Borrow the UTF-8 text under `node`.
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> Option<&'a str> {
    source.get(node.byte_range())
}

/// Strip any number of wrapping parentheses from an expression node.
pub fn unwrap_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        let mut cursor = node.walk();
        let inner = node
            .named_children(&mut cursor)
            .find(|child| child.kind() != "comment");
        match inner {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}
