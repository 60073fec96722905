//! Default-value patching for generated protocol variants.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ScanResult;
use crate::models::ParameterAssignment;
use crate::params::extractor::{declaration_name, is_declaration_method};
use crate::syntax::edits::{apply_edits, SourceEdit};
use crate::syntax::literals::render_literal;
use crate::syntax::parser::ParsedProtocol;

/// A substitution that could not be made.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchFailure {
    pub parameter: String,
    pub line: usize,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchOutcome {
    pub source: String,
    pub applied: Vec<SourceEdit>,
    pub failures: Vec<PatchFailure>,
}

impl PatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Rewrite the `default=` of every declaration named in `assignment`.
///
/// Declaring calls without a `default` keyword, or for names absent from
/// the assignment, are left untouched. A value that has no literal form
/// fails only its own substitution.
pub fn patch_parsed(
    parsed: &ParsedProtocol,
    assignment: &ParameterAssignment,
) -> ScanResult<PatchOutcome> {
    let source = parsed.source();
    let mut applied = Vec::new();
    let mut failures = Vec::new();

    for call in parsed.call_sites() {
        if !call.method().is_some_and(is_declaration_method) {
            continue;
        }
        let Some(name) = declaration_name(&call, source) else {
            continue;
        };
        let Some(value) = assignment.get(&name) else {
            continue;
        };
        let Some(default) = call.keyword("default") else {
            continue;
        };
        match render_literal(value) {
            Ok(literal) => applied.push(SourceEdit::replace_node(default, source, literal)),
            Err(err) => {
                warn!(
                    file = parsed.file_name(),
                    line = call.line(),
                    parameter = name.as_str(),
                    "default not patched: {err}"
                );
                failures.push(PatchFailure {
                    parameter: name,
                    line: call.line(),
                    message: err.to_string(),
                });
            }
        }
    }

    let new_source = apply_edits(source, &applied);
    ParsedProtocol::parse(parsed.file_name(), new_source.as_str())?;
    debug!(
        file = parsed.file_name(),
        applied = applied.len(),
        failed = failures.len(),
        "defaults patched"
    );
    Ok(PatchOutcome {
        source: new_source,
        applied,
        failures,
    })
}

/// Parse `source` and patch its defaults.
pub fn patch_defaults(
    file_name: &str,
    source: &str,
    assignment: &ParameterAssignment,
) -> ScanResult<PatchOutcome> {
    let parsed = ParsedProtocol::parse(file_name, source)?;
    patch_parsed(&parsed, assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParameterValue;
    use crate::params::extractor::extract_parameters;

    const PROTOCOL: &str = r#"
def add_parameters(parameters):
    parameters.add_int(
        variable_name="sample_count",
        default=8,  # full column
        minimum=1,
        maximum=96,
    )
    parameters.add_bool(variable_name="dry_run", default=False)
    parameters.add_str(variable_name="label", default='plate "A"')
    parameters.add_float(variable_name="volume", default=20.0)
    parameters.add_csv_file(variable_name="plate_map")
"#;

    fn assignment(entries: &[(&str, ParameterValue)]) -> ParameterAssignment {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_defaults_replaced_in_place() {
        let values = assignment(&[
            ("sample_count", ParameterValue::Int(96)),
            ("dry_run", ParameterValue::Bool(true)),
            ("label", ParameterValue::Str("it's".into())),
        ]);
        let outcome = patch_defaults("p.py", PROTOCOL, &values).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.applied.len(), 3);
        assert!(outcome.source.contains("default=96,  # full column"));
        assert!(outcome.source.contains("default=True)"));
        assert!(outcome.source.contains(r#"default="it's")"#));
        assert!(outcome.source.contains("default=20.0)"));
    }

    #[test]
    fn test_patched_source_round_trips_through_extractor() {
        let values = assignment(&[
            ("sample_count", ParameterValue::Int(1)),
            ("volume", ParameterValue::Float(0.1)),
        ]);
        let outcome = patch_defaults("p.py", PROTOCOL, &values).unwrap();
        let parsed = ParsedProtocol::parse("p.py", outcome.source).unwrap();
        let extraction = extract_parameters(&parsed).unwrap();
        assert_eq!(extraction.declarations[0].default, Some(ParameterValue::Int(1)));
        assert_eq!(extraction.declarations[3].default, Some(ParameterValue::Float(0.1)));
        assert_eq!(extraction.declarations[0].maximum, Some(ParameterValue::Int(96)));
    }

    #[test]
    fn test_missing_default_keyword_is_untouched() {
        let values = assignment(&[("plate_map", ParameterValue::Str("x.csv".into()))]);
        let outcome = patch_defaults("p.py", PROTOCOL, &values).unwrap();
        assert_eq!(outcome.source, PROTOCOL);
        assert!(outcome.applied.is_empty());
    }

    #[test]
    fn test_unrepresentable_value_fails_only_itself() {
        let values = assignment(&[
            ("volume", ParameterValue::Float(f64::NAN)),
            ("dry_run", ParameterValue::Bool(true)),
        ]);
        let outcome = patch_defaults("p.py", PROTOCOL, &values).unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].parameter, "volume");
        assert!(outcome.source.contains("default=True)"));
        assert!(outcome.source.contains("default=20.0)"));
    }

    #[test]
    fn test_none_value_renders_as_none() {
        let values = assignment(&[("volume", ParameterValue::None)]);
        let outcome = patch_defaults("p.py", PROTOCOL, &values).unwrap();
        assert!(outcome.source.contains("default=None)"));
    }

    #[test]
    fn test_malformed_source_is_error() {
        assert!(patch_defaults("bad.py", "def add_parameters(:\n", &ParameterAssignment::new()).is_err());
    }
}
