//! Plain-text rendering of audit results.

use indexmap::IndexMap;

use crate::analysis::labware::LabwareStatus;
use crate::batch::pipeline::{BatchReport, ProtocolReport};
use crate::models::{ParameterDeclaration, ParameterKind, ParameterValue};

const SEPARATOR: &str = "------------------------------";

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `str()`-style rendering: strings bare, everything else as a literal.
fn plain(value: Option<&ParameterValue>) -> String {
    match value {
        Some(ParameterValue::Str(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "None".to_string(),
    }
}

/// One line per declaration with its bounds, choices or default.
pub fn render_parameter_details(declarations: &[ParameterDeclaration]) -> String {
    let mut out = String::from("Parameter Details:\n");
    for decl in declarations {
        let mut line = format!("  - {} ({}): ", decl.name, decl.kind.as_str());
        if decl.kind == ParameterKind::Str && !decl.choices.is_empty() {
            let names: Vec<String> = decl
                .choices
                .iter()
                .map(|c| c.display_name.clone().unwrap_or_else(|| plain(Some(&c.value))))
                .collect();
            line.push_str(&format!(
                "Default: '{}', Choices: [{}]",
                plain(decl.default.as_ref()),
                names.join(", ")
            ));
        } else if decl.kind.is_numeric() {
            let mut parts = Vec::new();
            if let Some(min) = &decl.minimum {
                parts.push(format!("Min: {}", plain(Some(min))));
            }
            if let Some(default) = &decl.default {
                parts.push(format!("Default: {}", plain(Some(default))));
            }
            if let Some(max) = &decl.maximum {
                parts.push(format!("Max: {}", plain(Some(max))));
            }
            line.push_str(&parts.join(", "));
        } else {
            line.push_str(&format!("Default: {}", plain(decl.default.as_ref())));
        }
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(SEPARATOR);
    out.push('\n');
    out
}

/// Live summary printed while a file is processed.
pub fn render_protocol_summary(report: &ProtocolReport) -> String {
    let mut out = format!("--- Processing {} ---\n", report.file_name);
    if let Some(error) = &report.error {
        out.push_str(&format!("  Error: {error}\n"));
        out.push_str(SEPARATOR);
        out.push('\n');
        return out;
    }
    let meta = &report.metadata;
    out.push_str(&format!("  Protocol Name: {}\n", meta.protocol_name_or_na()));
    out.push_str(&format!("  Author: {}\n", meta.author_or_na()));
    out.push_str(&format!("  Robot Type: {}\n", meta.robot_type_or_na()));
    let total = report
        .total_parameters()
        .map(|n| n.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    out.push_str(&format!("  Total Parameters: {total}\n"));

    out.push_str("\n  Incorrect heights of z:\n");
    for finding in report.heights.violations() {
        if let Some(value) = finding.value {
            out.push_str(&format!(
                "    line {}: .{}() value {} is below the threshold of {}\n",
                finding.line,
                finding.kind.as_str(),
                value,
                finding.threshold
            ));
        }
    }
    out.push_str(&format!(
        "    Total .bottom() z-value issues: {}\n    Total .top() value issues: {}\n",
        report.heights.bottom_violations, report.heights.top_violations
    ));

    out.push_str("\n  Reservoir Analysis:\n");
    for hit in &report.labware.hits {
        let label = match hit.status {
            LabwareStatus::Deprecated => "Old",
            LabwareStatus::Current => "New",
        };
        out.push_str(&format!("    {label} reservoir: {} (line {})\n", hit.name, hit.line));
    }
    out.push_str(SEPARATOR);
    out.push('\n');
    out
}

fn render_protocol_entry(report: &ProtocolReport, out: &mut String) {
    let meta = &report.metadata;
    out.push_str(&format!("Protocol Module: {}\n", report.module_name));
    out.push_str(&format!("  - File: {}\n", report.file_name));
    out.push_str(&format!("  - Protocol Name: {}\n", meta.protocol_name_or_na()));
    out.push_str(&format!("  - Author: {}\n", meta.author_or_na()));
    out.push_str(&format!("  - Source: {}\n", meta.source_or_na()));
    out.push_str(&format!("  - Robot Type: {}\n", meta.robot_type_or_na()));
    out.push_str(&format!("  - API Level: {}\n", meta.api_level_or_na()));

    if let Some(parameters) = &report.parameters {
        out.push_str("  - Parameter Types:\n");
        for (kind, names) in &parameters.types {
            out.push_str(&format!(
                "    - {}: {} ({})\n",
                capitalize(kind),
                names.len(),
                names.join(", ")
            ));
        }
        if !parameters.duplicates.is_empty() {
            out.push_str(&format!(
                "  - Duplicate parameters: {}\n",
                parameters.duplicates.join(", ")
            ));
        }
        for field in &parameters.unresolved {
            out.push_str(&format!(
                "  - Unresolved {}.{} (line {}): {}\n",
                field.parameter.as_deref().unwrap_or("?"),
                field.field,
                field.line,
                field.expression
            ));
        }
    } else if let Some(error) = &report.parameters_error {
        out.push_str(&format!("  - Parameters Error: {error}\n"));
    }

    if report.name_mismatch() {
        out.push_str("\n  ^^Protocol Name and File name mismatch.^^\n");
    }

    out.push_str("\n  - Loaded Modules:\n");
    if report.modules.is_empty() {
        out.push_str("    - N/A\n");
    }
    for module in &report.modules {
        out.push_str(&format!("    - {module}\n"));
    }
    out.push('\n');
}

fn render_counts(title: &str, counts: &IndexMap<String, usize>, out: &mut String) {
    out.push_str(&format!("\n{title}:\n"));
    for (name, count) in counts {
        out.push_str(&format!("  - {name}: {count}\n"));
    }
}

/// Cross-file report: one block per protocol, then the final counts.
pub fn render_batch_report(batch: &BatchReport) -> String {
    let mut out = String::from("\n=== Comprehensive Report ===\n");
    out.push_str(&format!("Total files processed: {}\n\n", batch.processed()));

    for report in batch.reports.iter().filter(|r| r.is_ok()) {
        render_protocol_entry(report, &mut out);
    }

    out.push_str("\n--- Final Summary Counts ---\n");
    render_counts("Total Module Usage", &batch.module_usage, &mut out);
    render_counts("Old Reservoir Usage", &batch.deprecated_labware, &mut out);
    render_counts("New Reservoir Usage", &batch.current_labware, &mut out);

    if !batch.failed_files.is_empty() {
        out.push_str(&format!("\nFailed files ({}):\n", batch.failed_files.len()));
        for report in batch.reports.iter().filter(|r| !r.is_ok()) {
            let error = report.error.as_deref().unwrap_or_default();
            out.push_str(&format!("  - {}: {error}\n", report.file_name));
        }
    }
    out
}
