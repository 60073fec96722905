//! Static extraction of the `metadata` and `requirements` dictionaries.
//!
//! Both are optional module-level dict literals. Fields present in
//! `requirements` take precedence over the same fields in `metadata`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::syntax::calls::resolve_literal;
use crate::syntax::literals::string_literal;
use crate::syntax::parser::{unwrap_parens, ParsedProtocol};

pub const NOT_AVAILABLE: &str = "N/A";
pub const SOURCE_NOT_SPECIFIED: &str = "N/A (not specified)";

/// Descriptive fields of one protocol.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMetadata {
    pub author: Option<String>,
    pub protocol_name: Option<String>,
    pub source: Option<String>,
    pub robot_type: Option<String>,
    pub api_level: Option<String>,
    pub has_metadata: bool,
    pub has_requirements: bool,
}

impl ProtocolMetadata {
    pub fn author_or_na(&self) -> &str {
        self.author.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn protocol_name_or_na(&self) -> &str {
        self.protocol_name.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn source_or_na(&self) -> &str {
        self.source.as_deref().unwrap_or(SOURCE_NOT_SPECIFIED)
    }

    pub fn robot_type_or_na(&self) -> &str {
        self.robot_type.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn api_level_or_na(&self) -> &str {
        self.api_level.as_deref().unwrap_or(NOT_AVAILABLE)
    }
}

/// String-keyed entries of a dict literal whose values are string or
/// numeric literals. Other entries are skipped.
fn literal_dictionary(node: Node<'_>, source: &str) -> Option<IndexMap<String, String>> {
    let node = unwrap_parens(node);
    if node.kind() != "dictionary" {
        return None;
    }
    let mut entries = IndexMap::new();
    let mut cursor = node.walk();
    for pair in node.named_children(&mut cursor) {
        if pair.kind() != "pair" {
            continue;
        }
        let (Some(key), Some(value)) = (
            pair.child_by_field_name("key"),
            pair.child_by_field_name("value"),
        ) else {
            continue;
        };
        let Some(key) = string_literal(unwrap_parens(key), source) else {
            continue;
        };
        let value = unwrap_parens(value);
        let text = string_literal(value, source)
            .or_else(|| resolve_literal(value, source).map(|n| n.to_string()));
        if let Some(text) = text {
            entries.insert(key, text);
        }
    }
    Some(entries)
}

/// Read `metadata` and `requirements` from the protocol's top level.
pub fn extract_metadata(parsed: &ParsedProtocol) -> ProtocolMetadata {
    let source = parsed.source();
    let mut metadata_dict = None;
    let mut requirements_dict = None;
    for (name, value) in parsed.module_assignments() {
        match name {
            "metadata" => metadata_dict = literal_dictionary(value, source),
            "requirements" => requirements_dict = literal_dictionary(value, source),
            _ => {}
        }
    }

    let mut result = ProtocolMetadata::default();
    if let Some(entries) = metadata_dict {
        result.has_metadata = true;
        result.author = entries.get("author").cloned();
        result.protocol_name = entries.get("protocolName").cloned();
        result.source = entries.get("source").cloned();
        result.robot_type = entries.get("robotType").cloned();
        result.api_level = entries.get("apiLevel").cloned();
    }
    if let Some(entries) = requirements_dict {
        result.has_requirements = true;
        if let Some(robot_type) = entries.get("robotType") {
            result.robot_type = Some(robot_type.clone());
        }
        if let Some(api_level) = entries.get("apiLevel") {
            result.api_level = Some(api_level.clone());
        }
    }
    result
}
