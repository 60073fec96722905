//! Constant folding for small arithmetic expressions.
//!
//! The grammar is deliberately tiny: numeric literals, names looked up in a
//! [`SymbolTable`], and binary `+` / `-`. Everything else is unevaluable,
//! which is a normal outcome rather than an error.

use std::collections::HashMap;

use tree_sitter::Node;

use crate::models::Number;
use crate::syntax::literals::parse_number;
use crate::syntax::parser::{node_text, unwrap_parens};

/// Named z-height offsets that protocols add to their `bottom(z=...)`
/// arguments. All of them are currently zero.
const Z_OFFSET_NAMES: &[&str] = &[
    "PCRPlate_Z_50_offset",
    "Deepwell_Z_50_offset",
    "Deep384_Z_50_offset",
    "PCRPlate_Z_200_offset",
    "Deepwell_Z_200_offset",
    "Deep384_Z_200_offset",
    "PCRPlate_Z_offset",
    "Deepwell_Z_offset",
    "p300_offset_Deck",
    "p300_offset_Res",
    "p300_offset_Tube",
    "p20_offset_Deck",
    "p20_offset_Res",
    "p20_offset_Tube",
];

/// Variable name to numeric value. Read-only during evaluation.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    values: HashMap<String, Number>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed table of named z-height offsets.
    pub fn z_offsets() -> Self {
        Z_OFFSET_NAMES
            .iter()
            .map(|name| (name.to_string(), Number::Int(0)))
            .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Number) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Number> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Number)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (String, Number)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Fold `node` to a number, or `None` when it is outside the grammar.
pub fn evaluate(node: Node<'_>, source: &str, symbols: &SymbolTable) -> Option<Number> {
    let node = unwrap_parens(node);
    match node.kind() {
        "integer" | "float" => parse_number(node_text(node, source)?),
        "identifier" => symbols.get(node_text(node, source)?),
        "binary_operator" => {
            let left = evaluate(node.child_by_field_name("left")?, source, symbols)?;
            let right = evaluate(node.child_by_field_name("right")?, source, symbols)?;
            match node.child_by_field_name("operator")?.kind() {
                "+" => left.checked_add(right),
                "-" => left.checked_sub(right),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parser::ParsedProtocol;

    /// Evaluate the right-hand side of the single assignment in `source`.
    fn eval_rhs(expression: &str, symbols: &SymbolTable) -> Option<Number> {
        let source = format!("value = {expression}\n");
        let parsed = ParsedProtocol::parse("expr.py", source).unwrap();
        let statement = parsed.root().named_child(0).unwrap();
        let assignment = statement.named_child(0).unwrap();
        let right = assignment.child_by_field_name("right").unwrap();
        evaluate(right, parsed.source(), symbols)
    }

    #[test]
    fn test_literals() {
        let symbols = SymbolTable::new();
        assert_eq!(eval_rhs("5", &symbols), Some(Number::Int(5)));
        assert_eq!(eval_rhs("0.5", &symbols), Some(Number::Float(0.5)));
        assert_eq!(eval_rhs("'5'", &symbols), None);
        assert_eq!(eval_rhs("True", &symbols), None);
        assert_eq!(eval_rhs("None", &symbols), None);
    }

    #[test]
    fn test_arithmetic_is_exact() {
        let symbols = SymbolTable::new();
        assert_eq!(eval_rhs("1 + 2 - 4", &symbols), Some(Number::Int(-1)));
        assert_eq!(eval_rhs("0.25 + 0.25", &symbols), Some(Number::Float(0.5)));
        assert_eq!(eval_rhs("10 - (2 + 3)", &symbols), Some(Number::Int(5)));
        assert_eq!(eval_rhs("1 + 0.5", &symbols), Some(Number::Float(1.5)));
    }

    #[test]
    fn test_symbols_resolve_and_missing_names_fail() {
        let mut symbols = SymbolTable::z_offsets();
        symbols.insert("depth", Number::Float(2.5));
        assert_eq!(
            eval_rhs("PCRPlate_Z_offset + 1", &symbols),
            Some(Number::Int(1))
        );
        assert_eq!(eval_rhs("depth - 3", &symbols), Some(Number::Float(-0.5)));
        assert_eq!(eval_rhs("unknown_offset + 1", &symbols), None);
        assert_eq!(symbols.len(), Z_OFFSET_NAMES.len() + 1);
    }

    #[test]
    fn test_unsupported_nodes_are_unevaluable() {
        let symbols = SymbolTable::new();
        assert_eq!(eval_rhs("2 * 3", &symbols), None);
        assert_eq!(eval_rhs("-1", &symbols), None);
        assert_eq!(eval_rhs("f(1)", &symbols), None);
        assert_eq!(eval_rhs("1 + 'a'", &symbols), None);
        assert_eq!(eval_rhs("[1]", &symbols), None);
    }

    #[test]
    fn test_evaluation_does_not_mutate_symbols() {
        let symbols = SymbolTable::z_offsets();
        let before = symbols.len();
        let _ = eval_rhs("p20_offset_Tube - 1", &symbols);
        assert_eq!(symbols.len(), before);
        assert_eq!(symbols.get("p20_offset_Tube"), Some(Number::Int(0)));
    }
}
