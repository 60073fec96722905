//! Static extraction of parameter declarations.
//!
//! Protocols declare their runtime parameters inside a module-level
//! `add_parameters(parameters)` function by calling `parameters.add_int(...)`
//! and friends. Rather than executing that function, the declaring calls are
//! matched in the syntax tree and their keyword arguments resolved as
//! literals. Each matched call is forwarded to a [`DeclarationSink`].

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tree_sitter::Node;

use crate::analysis::evaluator::{evaluate, SymbolTable};
use crate::config::PARAMETER_ENTRY_POINT;
use crate::errors::{ScanError, ScanResult};
use crate::models::{Choice, ParameterDeclaration, ParameterKind, ParameterValue};
use crate::syntax::calls::{call_sites, resolve_literal, CallSite};
use crate::syntax::literals::string_literal;
use crate::syntax::parser::{node_text, unwrap_parens, ParsedProtocol};

/// Method prefixes that mark a declaring call.
pub const DECLARATION_PREFIXES: &[&str] = &["add_", "declare_"];

/// Everything a declaring call can carry besides its name and kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeclarationFields {
    pub default: Option<ParameterValue>,
    pub minimum: Option<ParameterValue>,
    pub maximum: Option<ParameterValue>,
    pub choices: Vec<Choice>,
    pub line: usize,
}

/// Receiver of the five registration operations.
pub trait DeclarationSink {
    fn declare_bool(&mut self, name: &str, fields: DeclarationFields);
    fn declare_int(&mut self, name: &str, fields: DeclarationFields);
    fn declare_float(&mut self, name: &str, fields: DeclarationFields);
    fn declare_str(&mut self, name: &str, fields: DeclarationFields);
    fn declare_csv(&mut self, name: &str, fields: DeclarationFields);
}

/// Records declarations in declaration order.
///
/// Redeclaring a name replaces the earlier record in place and notes the
/// name in `duplicates`.
#[derive(Clone, Debug, Default)]
pub struct DeclarationRecorder {
    declarations: IndexMap<String, ParameterDeclaration>,
    duplicates: Vec<String>,
}

impl DeclarationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, name: &str, kind: ParameterKind, fields: DeclarationFields) {
        let fields_line = fields.line;
        let declaration = ParameterDeclaration {
            name: name.to_string(),
            kind,
            default: fields.default,
            minimum: fields.minimum,
            maximum: fields.maximum,
            choices: fields.choices,
            line: fields.line,
        };
        if let Some(previous) = self.declarations.insert(name.to_string(), declaration) {
            warn!(
                parameter = name,
                first_line = previous.line,
                line = fields_line,
                "parameter declared more than once"
            );
            if !self.duplicates.iter().any(|d| d == name) {
                self.duplicates.push(name.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn declarations(&self) -> impl Iterator<Item = &ParameterDeclaration> {
        self.declarations.values()
    }

    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    pub fn into_parts(self) -> (Vec<ParameterDeclaration>, Vec<String>) {
        (self.declarations.into_values().collect(), self.duplicates)
    }
}

impl DeclarationSink for DeclarationRecorder {
    fn declare_bool(&mut self, name: &str, fields: DeclarationFields) {
        self.record(name, ParameterKind::Bool, fields);
    }

    fn declare_int(&mut self, name: &str, fields: DeclarationFields) {
        self.record(name, ParameterKind::Int, fields);
    }

    fn declare_float(&mut self, name: &str, fields: DeclarationFields) {
        self.record(name, ParameterKind::Float, fields);
    }

    fn declare_str(&mut self, name: &str, fields: DeclarationFields) {
        self.record(name, ParameterKind::Str, fields);
    }

    fn declare_csv(&mut self, name: &str, fields: DeclarationFields) {
        self.record(name, ParameterKind::Csv, fields);
    }
}

/// A declaration field whose expression could not be resolved statically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedField {
    /// `None` when the declaration's name itself was unresolvable.
    pub parameter: Option<String>,
    pub field: String,
    pub line: usize,
    pub expression: String,
}

/// Result of [`extract_parameters`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterExtraction {
    pub declarations: Vec<ParameterDeclaration>,
    pub duplicates: Vec<String>,
    pub unresolved: Vec<UnresolvedField>,
}

impl ParameterExtraction {
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Parameter names grouped by kind, kinds in first-seen order.
    pub fn types_summary(&self) -> IndexMap<String, Vec<String>> {
        let mut summary: IndexMap<String, Vec<String>> = IndexMap::new();
        for decl in &self.declarations {
            summary
                .entry(decl.kind.as_str().to_string())
                .or_default()
                .push(decl.name.clone());
        }
        summary
    }
}

/// Declared kind for a method name such as `add_int` or `declare_csv`.
pub fn declaration_kind(method: &str) -> Option<ParameterKind> {
    let suffix = DECLARATION_PREFIXES
        .iter()
        .find_map(|prefix| method.strip_prefix(prefix))?;
    match suffix {
        "bool" => Some(ParameterKind::Bool),
        "int" => Some(ParameterKind::Int),
        "float" => Some(ParameterKind::Float),
        "str" => Some(ParameterKind::Str),
        "csv_file" | "csv" => Some(ParameterKind::Csv),
        _ => None,
    }
}

/// Whether `method` carries one of the declaration prefixes.
pub fn is_declaration_method(method: &str) -> bool {
    DECLARATION_PREFIXES.iter().any(|p| method.starts_with(p))
}

/// Parameter name of a declaring call: `variable_name=` or `name=` keyword,
/// else the first positional argument, as a string literal.
pub fn declaration_name(call: &CallSite<'_>, source: &str) -> Option<String> {
    call.keyword("variable_name")
        .or_else(|| call.keyword("name"))
        .or_else(|| call.first_positional())
        .and_then(|node| string_literal(unwrap_parens(node), source))
}

/// Module-level constants usable in declaration arguments.
#[derive(Clone, Debug, Default)]
struct ModuleConstants {
    numbers: SymbolTable,
    values: IndexMap<String, ParameterValue>,
}

impl ModuleConstants {
    fn collect(parsed: &ParsedProtocol) -> Self {
        let source = parsed.source();
        let mut constants = Self::default();
        for (name, value) in parsed.module_assignments() {
            // A non-literal rebinding shadows the earlier value.
            match constants.resolve(value, source) {
                Some(resolved) => {
                    constants.values.insert(name.to_string(), resolved);
                }
                None => {
                    constants.values.shift_remove(name);
                }
            }
            constants.numbers = constants
                .values
                .iter()
                .filter_map(|(k, v)| v.as_number().map(|n| (k.clone(), n)))
                .collect();
        }
        constants
    }

    /// Resolve a literal, negated literal, known name or `+`/`-` fold.
    fn resolve(&self, node: Node<'_>, source: &str) -> Option<ParameterValue> {
        let node = unwrap_parens(node);
        match node.kind() {
            "true" => Some(ParameterValue::Bool(true)),
            "false" => Some(ParameterValue::Bool(false)),
            "none" => Some(ParameterValue::None),
            "string" | "concatenated_string" => string_literal(node, source).map(ParameterValue::Str),
            "identifier" => self.values.get(node_text(node, source)?).cloned(),
            "unary_operator" => {
                if let Some(number) = resolve_literal(node, source) {
                    return Some(number.into());
                }
                if node.child_by_field_name("operator")?.kind() != "-" {
                    return None;
                }
                let operand = node.child_by_field_name("argument")?;
                self.resolve(operand, source)?
                    .as_number()?
                    .negate()
                    .map(ParameterValue::from)
            }
            _ => resolve_literal(node, source)
                .or_else(|| evaluate(node, source, &self.numbers))
                .map(ParameterValue::from),
        }
    }
}

/// Name of the first declared parameter of a function definition.
fn first_parameter_name<'a>(function: Node<'_>, source: &'a str) -> Option<&'a str> {
    let parameters = function.child_by_field_name("parameters")?;
    let mut cursor = parameters.walk();
    let first = parameters
        .named_children(&mut cursor)
        .find(|p| p.kind() != "comment")?;
    let name_node = match first.kind() {
        "identifier" => first,
        "typed_parameter" => first.named_child(0)?,
        "default_parameter" | "typed_default_parameter" => first.child_by_field_name("name")?,
        _ => return None,
    };
    if name_node.kind() != "identifier" {
        return None;
    }
    node_text(name_node, source)
}

fn expression_text(node: Node<'_>, source: &str) -> String {
    node_text(node, source).unwrap_or_default().to_string()
}

struct FieldResolver<'p> {
    constants: &'p ModuleConstants,
    source: &'p str,
    unresolved: &'p mut Vec<UnresolvedField>,
}

impl FieldResolver<'_> {
    fn value(
        &mut self,
        call: &CallSite<'_>,
        parameter: &str,
        field: &str,
    ) -> Option<ParameterValue> {
        let node = call.keyword(field)?;
        match self.constants.resolve(node, self.source) {
            Some(value) => value.present(),
            None => {
                self.record_unresolved(call, parameter, field, node);
                None
            }
        }
    }

    fn choices(&mut self, call: &CallSite<'_>, parameter: &str) -> Vec<Choice> {
        let Some(node) = call.keyword("choices") else {
            return Vec::new();
        };
        match self.choice_list(node) {
            Some(choices) => choices,
            None => {
                self.record_unresolved(call, parameter, "choices", node);
                Vec::new()
            }
        }
    }

    fn choice_list(&self, node: Node<'_>) -> Option<Vec<Choice>> {
        let node = unwrap_parens(node);
        if !matches!(node.kind(), "list" | "tuple") {
            return None;
        }
        let mut choices = Vec::new();
        let mut cursor = node.walk();
        for element in node.named_children(&mut cursor) {
            if element.kind() == "comment" {
                continue;
            }
            let element = unwrap_parens(element);
            if element.kind() != "dictionary" {
                return None;
            }
            let mut value = None;
            let mut display_name = None;
            let mut pairs = element.walk();
            for pair in element.named_children(&mut pairs) {
                if pair.kind() != "pair" {
                    continue;
                }
                let key = pair
                    .child_by_field_name("key")
                    .and_then(|k| string_literal(unwrap_parens(k), self.source));
                let Some(entry) = pair.child_by_field_name("value") else {
                    continue;
                };
                match key.as_deref() {
                    Some("value") => value = Some(self.constants.resolve(entry, self.source)?),
                    Some("display_name") => {
                        display_name = self
                            .constants
                            .resolve(entry, self.source)
                            .map(|v| match v {
                                ParameterValue::Str(s) => s,
                                other => other.to_string(),
                            })
                    }
                    _ => {}
                }
            }
            choices.push(Choice {
                value: value?,
                display_name,
            });
        }
        Some(choices)
    }

    fn record_unresolved(&mut self, call: &CallSite<'_>, parameter: &str, field: &str, node: Node<'_>) {
        let expression = expression_text(node, self.source);
        warn!(
            line = call.line(),
            parameter,
            field,
            "cannot resolve `{expression}` statically"
        );
        self.unresolved.push(UnresolvedField {
            parameter: Some(parameter.to_string()),
            field: field.to_string(),
            line: call.line(),
            expression,
        });
    }
}

fn dispatch(sink: &mut dyn DeclarationSink, kind: ParameterKind, name: &str, fields: DeclarationFields) {
    match kind {
        ParameterKind::Bool => sink.declare_bool(name, fields),
        ParameterKind::Int => sink.declare_int(name, fields),
        ParameterKind::Float => sink.declare_float(name, fields),
        ParameterKind::Str => sink.declare_str(name, fields),
        ParameterKind::Csv => sink.declare_csv(name, fields),
    }
}

/// Feed every declaration in `add_parameters` to `sink`.
///
/// Returns the fields that could not be resolved. Fails with
/// [`ScanError::MissingEntryPoint`] when the function is not defined.
pub fn declare_into(
    parsed: &ParsedProtocol,
    sink: &mut dyn DeclarationSink,
) -> ScanResult<Vec<UnresolvedField>> {
    let source = parsed.source();
    let function = parsed
        .module_function(PARAMETER_ENTRY_POINT)
        .ok_or_else(|| ScanError::MissingEntryPoint {
            file: parsed.file_name().to_string(),
        })?;
    let mut unresolved = Vec::new();

    let Some(receiver) = first_parameter_name(function, source) else {
        debug!(
            file = parsed.file_name(),
            "{PARAMETER_ENTRY_POINT} takes no parameters object"
        );
        return Ok(unresolved);
    };
    let Some(body) = function.child_by_field_name("body") else {
        return Ok(unresolved);
    };

    let constants = ModuleConstants::collect(parsed);
    for call in call_sites(body, source) {
        if call.receiver_identifier(source) != Some(receiver) {
            continue;
        }
        let Some(kind) = call.method().and_then(declaration_kind) else {
            continue;
        };
        let Some(name) = declaration_name(&call, source) else {
            let expression = expression_text(call.node, source);
            warn!(
                file = parsed.file_name(),
                line = call.line(),
                "declaration without a literal name skipped"
            );
            unresolved.push(UnresolvedField {
                parameter: None,
                field: "name".to_string(),
                line: call.line(),
                expression,
            });
            continue;
        };

        let mut resolver = FieldResolver {
            constants: &constants,
            source,
            unresolved: &mut unresolved,
        };
        let fields = DeclarationFields {
            default: resolver.value(&call, &name, "default"),
            minimum: resolver.value(&call, &name, "minimum"),
            maximum: resolver.value(&call, &name, "maximum"),
            choices: resolver.choices(&call, &name),
            line: call.line(),
        };
        debug!(
            file = parsed.file_name(),
            line = call.line(),
            kind = kind.as_str(),
            "declared parameter {name}"
        );
        dispatch(sink, kind, &name, fields);
    }
    Ok(unresolved)
}

/// Extract every parameter declared by the protocol.
pub fn extract_parameters(parsed: &ParsedProtocol) -> ScanResult<ParameterExtraction> {
    let mut recorder = DeclarationRecorder::new();
    let unresolved = declare_into(parsed, &mut recorder)?;
    let (declarations, duplicates) = recorder.into_parts();
    Ok(ParameterExtraction {
        declarations,
        duplicates,
        unresolved,
    })
}

/// Read, parse and extract in one step.
pub fn extract_parameters_from_path(path: &Path) -> ScanResult<ParameterExtraction> {
    let parsed = ParsedProtocol::from_path(path)?;
    extract_parameters(&parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> ParameterExtraction {
        let parsed = ParsedProtocol::parse("params.py", source).unwrap();
        extract_parameters(&parsed).unwrap()
    }

    const PROTOCOL: &str = r#"
DEFAULT_VOLUME = 20
STEP = 5

def add_parameters(parameters):
    parameters.add_int(
        variable_name="sample_count",
        display_name="Samples",
        default=8,
        minimum=1,
        maximum=96,
    )
    parameters.add_float(
        variable_name="volume",
        default=DEFAULT_VOLUME + 0.5,
        minimum=-(1.5),
        maximum=DEFAULT_VOLUME + STEP,
        unit="uL",
    )
    parameters.add_bool(variable_name="dry_run", default=False)
    parameters.add_str(
        variable_name="pipette",
        default="flex_1channel_50",
        choices=[
            {"display_name": "1-Channel 50 uL", "value": "flex_1channel_50"},
            {"display_name": "8-Channel 50 uL", "value": "flex_8channel_50"},
        ],
    )
    parameters.add_csv_file(variable_name="plate_map", display_name="Plate map")

def run(ctx):
    ctx.params.add_int(variable_name="ignored", default=1)
"#;

    #[test]
    fn test_extracts_all_declarations_in_order() {
        let extraction = extract(PROTOCOL);
        let names: Vec<&str> = extraction
            .declarations
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["sample_count", "volume", "dry_run", "pipette", "plate_map"]
        );
        assert!(extraction.unresolved.is_empty());
        assert!(extraction.duplicates.is_empty());
    }

    #[test]
    fn test_numeric_fields_resolve_through_constants() {
        let extraction = extract(PROTOCOL);
        let count = &extraction.declarations[0];
        assert_eq!(count.kind, ParameterKind::Int);
        assert_eq!(count.default, Some(ParameterValue::Int(8)));
        assert_eq!(count.minimum, Some(ParameterValue::Int(1)));
        assert_eq!(count.maximum, Some(ParameterValue::Int(96)));

        let volume = &extraction.declarations[1];
        assert_eq!(volume.default, Some(ParameterValue::Float(20.5)));
        assert_eq!(volume.minimum, Some(ParameterValue::Float(-1.5)));
        assert_eq!(volume.maximum, Some(ParameterValue::Int(25)));
    }

    #[test]
    fn test_choices_and_kinds() {
        let extraction = extract(PROTOCOL);
        let pipette = &extraction.declarations[3];
        assert_eq!(pipette.kind, ParameterKind::Str);
        assert_eq!(pipette.choices.len(), 2);
        assert_eq!(
            pipette.choices[1].value,
            ParameterValue::Str("flex_8channel_50".into())
        );
        assert_eq!(
            pipette.choices[0].display_name.as_deref(),
            Some("1-Channel 50 uL")
        );
        let plate_map = &extraction.declarations[4];
        assert_eq!(plate_map.kind, ParameterKind::Csv);
        assert!(plate_map.default.is_none());
        assert_eq!(extraction.declarations[2].default, Some(ParameterValue::Bool(false)));
    }

    #[test]
    fn test_types_summary() {
        let summary = extract(PROTOCOL).types_summary();
        let kinds: Vec<&str> = summary.keys().map(String::as_str).collect();
        assert_eq!(kinds, vec!["int", "float", "bool", "str", "csv"]);
        assert_eq!(summary["int"], vec!["sample_count".to_string()]);
    }

    #[test]
    fn test_missing_entry_point() {
        let parsed = ParsedProtocol::parse("none.py", "def run(ctx):\n    pass\n").unwrap();
        let err = extract_parameters(&parsed).unwrap_err();
        assert!(matches!(err, ScanError::MissingEntryPoint { ref file } if file == "none.py"));
    }

    #[test]
    fn test_positional_name_and_declare_prefix() {
        let source = "\
def add_parameters(p: Parameters):
    p.declare_int('count', default=2)
    p.declare_csv('layout')
";
        let extraction = extract(source);
        assert_eq!(extraction.len(), 2);
        assert_eq!(extraction.declarations[0].name, "count");
        assert_eq!(extraction.declarations[1].kind, ParameterKind::Csv);
    }

    #[test]
    fn test_unresolvable_fields_are_recorded() {
        let source = "\
def add_parameters(parameters):
    parameters.add_int(variable_name='n', default=compute(), minimum=1)
    parameters.add_int(variable_name=NAME, default=3)
";
        let extraction = extract(source);
        assert_eq!(extraction.len(), 1);
        let decl = &extraction.declarations[0];
        assert!(decl.default.is_none());
        assert_eq!(decl.minimum, Some(ParameterValue::Int(1)));
        assert_eq!(extraction.unresolved.len(), 2);
        assert_eq!(extraction.unresolved[0].field, "default");
        assert_eq!(extraction.unresolved[0].expression, "compute()");
        assert_eq!(extraction.unresolved[1].parameter, None);
        assert_eq!(extraction.unresolved[1].line, 3);
    }

    #[test]
    fn test_duplicate_names_last_write_wins() {
        let source = "\
def add_parameters(parameters):
    parameters.add_int(variable_name='n', default=1)
    parameters.add_bool(variable_name='flag', default=True)
    parameters.add_int(variable_name='n', default=7)
";
        let extraction = extract(source);
        assert_eq!(extraction.len(), 2);
        assert_eq!(extraction.declarations[0].name, "n");
        assert_eq!(extraction.declarations[0].default, Some(ParameterValue::Int(7)));
        assert_eq!(extraction.declarations[0].line, 4);
        assert_eq!(extraction.duplicates, vec!["n".to_string()]);
    }

    #[test]
    fn test_calls_on_other_receivers_are_ignored() {
        let source = "\
def add_parameters(parameters):
    helper.add_int(variable_name='x', default=1)
    parameters.add_unknown(variable_name='y')
";
        assert!(extract(source).is_empty());
    }

    #[test]
    fn test_declaration_kind() {
        assert_eq!(declaration_kind("add_csv_file"), Some(ParameterKind::Csv));
        assert_eq!(declaration_kind("declare_float"), Some(ParameterKind::Float));
        assert_eq!(declaration_kind("add_labware"), None);
        assert_eq!(declaration_kind("bottom"), None);
        assert!(is_declaration_method("add_anything"));
    }

    #[test]
    fn test_recorder_as_sink() {
        let mut recorder = DeclarationRecorder::new();
        recorder.declare_str("mode", DeclarationFields::default());
        recorder.declare_bool("dry_run", DeclarationFields::default());
        assert_eq!(recorder.len(), 2);
        let kinds: Vec<ParameterKind> = recorder.declarations().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![ParameterKind::Str, ParameterKind::Bool]);
    }
}
