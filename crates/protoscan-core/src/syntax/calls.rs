//! Call-site matching over the protocol syntax tree.
//!
//! A [`CallSite`] is a normalized view of one `call` node: the attribute
//! being called (for `well.bottom(...)` that is `bottom`), the receiver
//! expression, and the argument list split into positional and keyword
//! arguments as Python binds them.

use tree_sitter::Node;

use crate::models::Number;
use crate::syntax::literals::parse_number;
use crate::syntax::parser::{node_text, unwrap_parens};

/// A `name=value` argument.
#[derive(Clone, Copy, Debug)]
pub struct KeywordArgument<'a> {
    pub name: &'a str,
    pub value: Node<'a>,
}

/// One call expression with its arguments split by binding form.
#[derive(Clone, Debug)]
pub struct CallSite<'a> {
    pub node: Node<'a>,
    receiver: Option<Node<'a>>,
    method: Option<&'a str>,
    pub positional: Vec<Node<'a>>,
    pub keywords: Vec<KeywordArgument<'a>>,
}

impl<'a> CallSite<'a> {
    /// Build a call-site view. Returns `None` for non-call nodes.
    pub fn from_node(node: Node<'a>, source: &'a str) -> Option<Self> {
        if node.kind() != "call" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        let (receiver, method) = if function.kind() == "attribute" {
            let attribute = function.child_by_field_name("attribute")?;
            (
                function.child_by_field_name("object"),
                node_text(attribute, source),
            )
        } else {
            (None, None)
        };

        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        if let Some(arguments) = node.child_by_field_name("arguments") {
            if arguments.kind() == "argument_list" {
                let mut cursor = arguments.walk();
                for child in arguments.named_children(&mut cursor) {
                    match child.kind() {
                        "keyword_argument" => {
                            let name = child
                                .child_by_field_name("name")
                                .and_then(|n| node_text(n, source));
                            let value = child.child_by_field_name("value");
                            if let (Some(name), Some(value)) = (name, value) {
                                keywords.push(KeywordArgument { name, value });
                            }
                        }
                        "comment" | "dictionary_splat" => {}
                        _ => positional.push(child),
                    }
                }
            } else {
                // f(x for x in y)
                positional.push(arguments);
            }
        }

        Some(Self {
            node,
            receiver,
            method,
            positional,
            keywords,
        })
    }

    /// Called attribute name, `None` for plain function calls.
    pub fn method(&self) -> Option<&'a str> {
        self.method
    }

    pub fn receiver(&self) -> Option<Node<'a>> {
        self.receiver
    }

    /// Receiver text when it is a bare identifier (`parameters.add_int`).
    pub fn receiver_identifier(&self, source: &'a str) -> Option<&'a str> {
        let receiver = self.receiver?;
        if receiver.kind() != "identifier" {
            return None;
        }
        node_text(receiver, source)
    }

    /// 1-based line of the start of the call.
    pub fn line(&self) -> usize {
        self.node.start_position().row + 1
    }

    pub fn first_positional(&self) -> Option<Node<'a>> {
        self.positional.first().copied()
    }

    /// The value node of keyword argument `name`.
    pub fn keyword(&self, name: &str) -> Option<Node<'a>> {
        self.keywords
            .iter()
            .find(|kw| kw.name == name)
            .map(|kw| kw.value)
    }
}

/// Collect every call expression under `root` in source order.
pub fn call_sites<'a>(root: Node<'a>, source: &'a str) -> Vec<CallSite<'a>> {
    let mut calls = Vec::new();
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if let Some(call) = CallSite::from_node(node, source) {
            calls.push(call);
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return calls;
            }
        }
    }
}

/// Resolve a numeric literal or a negated numeric literal.
///
/// `-1` is a unary minus applied to the literal `1` in the grammar, not a
/// negative literal, so both shapes are recognized here. Parentheses are
/// transparent.
pub fn resolve_literal(node: Node<'_>, source: &str) -> Option<Number> {
    let node = unwrap_parens(node);
    match node.kind() {
        "integer" | "float" => parse_number(node_text(node, source)?),
        "unary_operator" => {
            let operator = node.child_by_field_name("operator")?;
            if operator.kind() != "-" {
                return None;
            }
            let operand = unwrap_parens(node.child_by_field_name("argument")?);
            match operand.kind() {
                "integer" | "float" => parse_number(node_text(operand, source)?)?.negate(),
                _ => None,
            }
        }
        _ => None,
    }
}
