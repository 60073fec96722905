//! Copy-on-write source splicing.
//!
//! Transformations never touch the parsed tree. They describe replacements
//! over byte ranges of the original text and [`apply_edits`] builds the new
//! source, so everything outside the replaced argument nodes (comments,
//! spacing, quoting style) survives unchanged.

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::syntax::parser::node_text;

/// Replace `source[start_byte..end_byte]` with `replacement`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEdit {
    pub start_byte: usize,
    pub end_byte: usize,
    /// 1-based line of the replaced node.
    pub line: usize,
    pub original: String,
    pub replacement: String,
}

impl SourceEdit {
    /// Edit replacing the full text of `node`.
    pub fn replace_node(node: Node<'_>, source: &str, replacement: impl Into<String>) -> Self {
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            line: node.start_position().row + 1,
            original: node_text(node, source).unwrap_or_default().to_string(),
            replacement: replacement.into(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.original == self.replacement
    }
}

/// Splice `edits` into `source`.
///
/// Edits are applied in byte order. An edit overlapping one already applied
/// is dropped, as is any edit whose range is out of bounds or splits a UTF-8
/// character.
pub fn apply_edits(source: &str, edits: &[SourceEdit]) -> String {
    let mut ordered: Vec<&SourceEdit> = edits.iter().collect();
    ordered.sort_by_key(|e| (e.start_byte, e.end_byte));

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0usize;
    for edit in ordered {
        if edit.start_byte < cursor || edit.end_byte < edit.start_byte {
            continue;
        }
        let (Some(kept), Some(_)) = (
            source.get(cursor..edit.start_byte),
            source.get(edit.start_byte..edit.end_byte),
        ) else {
            continue;
        };
        out.push_str(kept);
        out.push_str(&edit.replacement);
        cursor = edit.end_byte;
    }
    out.push_str(source.get(cursor..).unwrap_or_default());
    out
}
