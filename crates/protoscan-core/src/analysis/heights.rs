//! Height-threshold auditing for `bottom()` and `top()` position calls.
//!
//! A `bottom(z)` offset below 0.5 mm risks driving the tip into the well
//! floor; a `top(z)` offset below -7 mm reaches far into the well from the
//! rim. Both thresholds are configurable.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::evaluator::{evaluate, SymbolTable};
use crate::config::{DEFAULT_BOTTOM_THRESHOLD, DEFAULT_TOP_THRESHOLD};
use crate::models::{ArgumentForm, CallKind, Number};
use crate::syntax::calls::{resolve_literal, CallSite};
use crate::syntax::parser::ParsedProtocol;

/// Threshold configuration for [`audit_heights`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeightThresholds {
    /// Values strictly below this are violations for `bottom()`.
    pub bottom: f64,
    /// Values strictly below this are violations for `top()`.
    pub top: f64,
    /// Also inspect `top(z=...)`. Off by default: only the positional form
    /// of `top()` has ever been checked.
    pub inspect_top_keyword: bool,
}

impl Default for HeightThresholds {
    fn default() -> Self {
        Self {
            bottom: DEFAULT_BOTTOM_THRESHOLD,
            top: DEFAULT_TOP_THRESHOLD,
            inspect_top_keyword: false,
        }
    }
}

/// One inspected height argument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeightFinding {
    pub kind: CallKind,
    pub line: usize,
    pub form: ArgumentForm,
    pub value: Option<Number>,
    pub threshold: f64,
    pub violation: bool,
}

impl HeightFinding {
    pub(crate) fn new(
        kind: CallKind,
        line: usize,
        form: ArgumentForm,
        value: Option<Number>,
        threshold: f64,
    ) -> Self {
        let (form, violation) = match value {
            Some(v) => (form, v.is_below(threshold)),
            None => (ArgumentForm::Unevaluable, false),
        };
        Self {
            kind,
            line,
            form,
            value,
            threshold,
            violation,
        }
    }
}

/// Result of auditing one protocol.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeightAudit {
    pub findings: Vec<HeightFinding>,
    pub bottom_violations: usize,
    pub top_violations: usize,
    pub unevaluable: usize,
}

impl HeightAudit {
    fn push(&mut self, finding: HeightFinding) {
        if finding.violation {
            match finding.kind {
                CallKind::Bottom => self.bottom_violations += 1,
                CallKind::Top => self.top_violations += 1,
                _ => {}
            }
        }
        if finding.form == ArgumentForm::Unevaluable {
            self.unevaluable += 1;
        }
        self.findings.push(finding);
    }

    pub fn violations(&self) -> impl Iterator<Item = &HeightFinding> {
        self.findings.iter().filter(|f| f.violation)
    }

    pub fn total_violations(&self) -> usize {
        self.bottom_violations + self.top_violations
    }
}

/// Resolve a keyword `z` value: literal, negated literal, then folding.
fn resolve_keyword(
    call: &CallSite<'_>,
    source: &str,
    symbols: &SymbolTable,
) -> Option<Option<Number>> {
    let value = call.keyword("z")?;
    Some(resolve_literal(value, source).or_else(|| evaluate(value, source, symbols)))
}

fn audit_bottom(
    call: &CallSite<'_>,
    source: &str,
    thresholds: &HeightThresholds,
    symbols: &SymbolTable,
    audit: &mut HeightAudit,
) {
    let line = call.line();
    if let Some(arg) = call.first_positional() {
        let value = resolve_literal(arg, source);
        audit.push(HeightFinding::new(
            CallKind::Bottom,
            line,
            ArgumentForm::Positional,
            value,
            thresholds.bottom,
        ));
    }
    if let Some(value) = resolve_keyword(call, source, symbols) {
        audit.push(HeightFinding::new(
            CallKind::Bottom,
            line,
            ArgumentForm::Keyword,
            value,
            thresholds.bottom,
        ));
    }
}

fn audit_top(
    call: &CallSite<'_>,
    source: &str,
    thresholds: &HeightThresholds,
    symbols: &SymbolTable,
    audit: &mut HeightAudit,
) {
    let line = call.line();
    if let Some(arg) = call.first_positional() {
        let value = resolve_literal(arg, source);
        audit.push(HeightFinding::new(
            CallKind::Top,
            line,
            ArgumentForm::Positional,
            value,
            thresholds.top,
        ));
    }
    if thresholds.inspect_top_keyword {
        if let Some(value) = resolve_keyword(call, source, symbols) {
            audit.push(HeightFinding::new(
                CallKind::Top,
                line,
                ArgumentForm::Keyword,
                value,
                thresholds.top,
            ));
        }
    }
}

/// Audit with the built-in z-offset symbol table.
pub fn audit_heights(parsed: &ParsedProtocol, thresholds: &HeightThresholds) -> HeightAudit {
    audit_heights_with_symbols(parsed, thresholds, &SymbolTable::z_offsets())
}

/// Audit every `bottom()` / `top()` attribute call in the protocol.
pub fn audit_heights_with_symbols(
    parsed: &ParsedProtocol,
    thresholds: &HeightThresholds,
    symbols: &SymbolTable,
) -> HeightAudit {
    let source = parsed.source();
    let mut audit = HeightAudit::default();

    for call in parsed.call_sites() {
        match call.method() {
            Some("bottom") => audit_bottom(&call, source, thresholds, symbols, &mut audit),
            Some("top") => audit_top(&call, source, thresholds, symbols, &mut audit),
            _ => {}
        }
    }

    for finding in audit.violations() {
        if let Some(value) = finding.value {
            warn!(
                file = parsed.file_name(),
                line = finding.line,
                call = finding.kind.as_str(),
                "z-value {value} is below the threshold of {}",
                finding.threshold
            );
        }
    }
    debug!(
        file = parsed.file_name(),
        bottom = audit.bottom_violations,
        top = audit.top_violations,
        unevaluable = audit.unevaluable,
        "height audit complete"
    );
    audit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audit(source: &str) -> HeightAudit {
        let parsed = ParsedProtocol::parse("heights.py", source).unwrap();
        audit_heights(&parsed, &HeightThresholds::default())
    }

    #[test]
    fn test_bottom_keyword_negated_literal() {
        let result = audit("well.bottom(z=-1)\n");
        assert_eq!(result.findings.len(), 1);
        let finding = &result.findings[0];
        assert_eq!(finding.kind, CallKind::Bottom);
        assert_eq!(finding.form, ArgumentForm::Keyword);
        assert_eq!(finding.value, Some(Number::Int(-1)));
        assert!(finding.violation);
        assert_eq!(result.bottom_violations, 1);
    }

    #[test]
    fn test_bottom_positional_negated_literal() {
        let result = audit("well.bottom(-2)\n");
        let finding = &result.findings[0];
        assert_eq!(finding.form, ArgumentForm::Positional);
        assert_eq!(finding.value, Some(Number::Int(-2)));
        assert!(finding.violation);
    }

    #[test]
    fn test_top_below_minus_seven() {
        let result = audit("well.top(-10)\n");
        let finding = &result.findings[0];
        assert_eq!(finding.kind, CallKind::Top);
        assert_eq!(finding.value, Some(Number::Int(-10)));
        assert_eq!(finding.threshold, -7.0);
        assert!(finding.violation);
        assert_eq!(result.top_violations, 1);
    }

    #[test]
    fn test_values_at_threshold_are_not_violations() {
        let result = audit("a.bottom(0.5)\nb.bottom(z=1)\nc.top(-7)\nd.top(2)\n");
        assert_eq!(result.findings.len(), 4);
        assert_eq!(result.total_violations(), 0);
    }

    #[test]
    fn test_keyword_expression_uses_offset_table() {
        let source = "w.bottom(z=PCRPlate_Z_offset + 0.2)\nw.bottom(z=p20_offset_Tube + 2)\n";
        let result = audit(source);
        assert_eq!(result.findings[0].value, Some(Number::Float(0.2)));
        assert!(result.findings[0].violation);
        assert_eq!(result.findings[1].value, Some(Number::Int(2)));
        assert!(!result.findings[1].violation);
    }

    #[test]
    fn test_unevaluable_arguments_are_not_violations() {
        let result = audit("w.bottom(depth)\nw.bottom(z=depth * 2)\nw.top(offset)\n");
        assert_eq!(result.findings.len(), 3);
        assert!(result
            .findings
            .iter()
            .all(|f| f.form == ArgumentForm::Unevaluable && f.value.is_none() && !f.violation));
        assert_eq!(result.unevaluable, 3);
    }

    #[test]
    fn test_top_keyword_is_ignored_by_default() {
        let result = audit("w.top(z=-20)\n");
        assert!(result.findings.is_empty());

        let parsed = ParsedProtocol::parse("t.py", "w.top(z=-20)\n").unwrap();
        let thresholds = HeightThresholds {
            inspect_top_keyword: true,
            ..HeightThresholds::default()
        };
        let result = audit_heights(&parsed, &thresholds);
        assert_eq!(result.top_violations, 1);
    }

    #[test]
    fn test_positional_and_keyword_on_same_call() {
        let result = audit("w.bottom(-1, z=-3)\n");
        assert_eq!(result.findings.len(), 2);
        assert_eq!(result.bottom_violations, 2);
    }

    #[test]
    fn test_finding_lines_within_file() {
        let source = "\n\nfor w in wells:\n    p.dispense(5, w.bottom(\n        z=-1))\n";
        let parsed = ParsedProtocol::parse("lines.py", source).unwrap();
        let result = audit_heights(&parsed, &HeightThresholds::default());
        assert_eq!(result.findings.len(), 1);
        let line = result.findings[0].line;
        assert_eq!(line, 4);
        assert!(line >= 1 && line <= parsed.line_count());
    }

    #[test]
    fn test_string_argument_is_unevaluable() {
        let result = audit("w.bottom('1')\n");
        assert_eq!(result.findings[0].form, ArgumentForm::Unevaluable);
    }
}
