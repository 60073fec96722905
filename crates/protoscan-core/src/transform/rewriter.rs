//! Height-value clamping.
//!
//! Offending literal height arguments are replaced in the source text with
//! the clamp value; every other byte of the file is left alone. The new
//! source is re-parsed before it is returned.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::heights::HeightFinding;
use crate::config::{
    env_f64, env_flag, DEFAULT_BOTTOM_THRESHOLD, DEFAULT_TOP_THRESHOLD, ENV_BOTTOM_THRESHOLD,
    ENV_CLAMP_TOP, ENV_TOP_THRESHOLD,
};
use crate::errors::ScanResult;
use crate::models::{ArgumentForm, CallKind, Number};
use crate::syntax::calls::{resolve_literal, CallSite};
use crate::syntax::edits::{apply_edits, SourceEdit};
use crate::syntax::literals::render_number;
use crate::syntax::parser::ParsedProtocol;

/// Which calls have their `z=` keyword clamped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZKeywordScope {
    /// Every call carrying a `z=` keyword.
    #[default]
    AnyCall,
    /// Only `bottom(z=...)`.
    BottomOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewritePolicy {
    /// Clamp target and lower bound for `bottom()` and `z=` values.
    pub threshold: f64,
    /// `top()` positional values below this are reported.
    pub top_threshold: f64,
    /// Replace reported `top()` values with `top_threshold`.
    pub clamp_top_values: bool,
    pub z_keyword_scope: ZKeywordScope,
}

impl Default for RewritePolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_BOTTOM_THRESHOLD,
            top_threshold: DEFAULT_TOP_THRESHOLD,
            clamp_top_values: false,
            z_keyword_scope: ZKeywordScope::AnyCall,
        }
    }
}

impl RewritePolicy {
    /// Defaults overridden by `PROTOSCAN_BOTTOM_THRESHOLD`,
    /// `PROTOSCAN_TOP_THRESHOLD` and `PROTOSCAN_CLAMP_TOP`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            threshold: env_f64(ENV_BOTTOM_THRESHOLD, defaults.threshold),
            top_threshold: env_f64(ENV_TOP_THRESHOLD, defaults.top_threshold),
            clamp_top_values: env_flag(ENV_CLAMP_TOP, defaults.clamp_top_values),
            z_keyword_scope: defaults.z_keyword_scope,
        }
    }
}

/// New source plus what changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewriteOutcome {
    pub source: String,
    pub edits: Vec<SourceEdit>,
    /// `top()` values below `top_threshold`, clamped or not.
    pub top_warnings: Vec<HeightFinding>,
}

impl RewriteOutcome {
    pub fn changed(&self) -> bool {
        !self.edits.is_empty()
    }
}

struct Clamp<'p> {
    policy: &'p RewritePolicy,
    bottom_literal: String,
    top_literal: String,
    source: &'p str,
    edits: Vec<SourceEdit>,
    top_warnings: Vec<HeightFinding>,
}

impl Clamp<'_> {
    fn keyword_z(&mut self, call: &CallSite<'_>) {
        let in_scope = match self.policy.z_keyword_scope {
            ZKeywordScope::AnyCall => true,
            ZKeywordScope::BottomOnly => call.method() == Some("bottom"),
        };
        if !in_scope {
            return;
        }
        // Only the first binding of a repeated keyword is clamped.
        let Some(value) = call.keyword("z") else {
            return;
        };
        if let Some(number) = resolve_literal(value, self.source) {
            if number.is_below(self.policy.threshold) {
                let edit = SourceEdit::replace_node(value, self.source, self.bottom_literal.clone());
                info!(line = edit.line, "z={} raised to {}", edit.original, edit.replacement);
                self.edits.push(edit);
            }
        }
    }

    fn bottom_positional(&mut self, call: &CallSite<'_>) {
        let Some(arg) = call.first_positional() else {
            return;
        };
        if let Some(number) = resolve_literal(arg, self.source) {
            if number.is_below(self.policy.threshold) {
                let edit = SourceEdit::replace_node(arg, self.source, self.bottom_literal.clone());
                info!(line = edit.line, "bottom({}) raised to {}", edit.original, edit.replacement);
                self.edits.push(edit);
            }
        }
    }

    fn top_positional(&mut self, call: &CallSite<'_>) {
        let Some(arg) = call.first_positional() else {
            return;
        };
        let Some(number) = resolve_literal(arg, self.source) else {
            return;
        };
        if !number.is_below(self.policy.top_threshold) {
            return;
        }
        warn!(
            line = call.line(),
            "top value with large negative found: {number}"
        );
        self.top_warnings.push(HeightFinding::new(
            CallKind::Top,
            call.line(),
            ArgumentForm::Positional,
            Some(number),
            self.policy.top_threshold,
        ));
        if self.policy.clamp_top_values {
            self.edits
                .push(SourceEdit::replace_node(arg, self.source, self.top_literal.clone()));
        }
    }
}

/// Clamp offending height literals in `parsed`.
pub fn rewrite_heights(parsed: &ParsedProtocol, policy: &RewritePolicy) -> ScanResult<RewriteOutcome> {
    let source = parsed.source();
    let mut clamp = Clamp {
        policy,
        bottom_literal: render_number(Number::Float(policy.threshold))?,
        top_literal: render_number(Number::Float(policy.top_threshold))?,
        source,
        edits: Vec::new(),
        top_warnings: Vec::new(),
    };

    for call in parsed.call_sites() {
        clamp.keyword_z(&call);
        match call.method() {
            Some("bottom") => clamp.bottom_positional(&call),
            Some("top") => clamp.top_positional(&call),
            _ => {}
        }
    }

    let Clamp {
        edits, top_warnings, ..
    } = clamp;
    let new_source = apply_edits(source, &edits);
    // The result must still be a valid protocol.
    ParsedProtocol::parse(parsed.file_name(), new_source.as_str())?;
    debug!(
        file = parsed.file_name(),
        edits = edits.len(),
        top_warnings = top_warnings.len(),
        "height rewrite complete"
    );
    Ok(RewriteOutcome {
        source: new_source,
        edits,
        top_warnings,
    })
}

/// Parse `source` and clamp it.
pub fn rewrite_source(
    file_name: &str,
    source: &str,
    policy: &RewritePolicy,
) -> ScanResult<RewriteOutcome> {
    let parsed = ParsedProtocol::parse(file_name, source)?;
    rewrite_heights(&parsed, policy)
}
