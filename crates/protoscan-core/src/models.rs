//! Shared typed models used across analysis, transformation and reporting.

use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::syntax::literals::{format_float, quote_string};

// ---------------------------------------------------------------------------
// 1. Number
// ---------------------------------------------------------------------------

/// A folded numeric value. Integer arithmetic stays integral until a float
/// operand is involved.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Negation; `None` when an integer would overflow.
    pub fn negate(self) -> Option<Number> {
        match self {
            Number::Int(i) => i.checked_neg().map(Number::Int),
            Number::Float(f) => Some(Number::Float(-f)),
        }
    }

    pub fn checked_add(self, other: Number) -> Option<Number> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.checked_add(b).map(Number::Int),
            (a, b) => Some(Number::Float(a.as_f64() + b.as_f64())),
        }
    }

    pub fn checked_sub(self, other: Number) -> Option<Number> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.checked_sub(b).map(Number::Int),
            (a, b) => Some(Number::Float(a.as_f64() - b.as_f64())),
        }
    }

    /// Strict `<` against a threshold.
    pub fn is_below(self, threshold: f64) -> bool {
        self.as_f64() < threshold
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(v) => f.write_str(&format_float(*v)),
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Call sites
// ---------------------------------------------------------------------------

/// The call shapes the matcher recognizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Bottom,
    Top,
    LoadLabware,
    ParameterDeclaration,
}

impl CallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Bottom => "bottom",
            CallKind::Top => "top",
            CallKind::LoadLabware => "load_labware",
            CallKind::ParameterDeclaration => "parameter_declaration",
        }
    }
}

/// How a call's effective argument was supplied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentForm {
    Positional,
    Keyword,
    Unevaluable,
}

// ---------------------------------------------------------------------------
// 3. ParameterValue
// ---------------------------------------------------------------------------

/// A concrete parameter value as it can appear in a declaration literal.
///
/// Equality follows Python numerics: `Int(1) == Float(1.0)`, so ordered
/// de-duplication of candidate values behaves like a Python set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParameterValue {
    pub fn is_none(&self) -> bool {
        matches!(self, ParameterValue::None)
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            ParameterValue::Int(i) => Some(Number::Int(*i)),
            ParameterValue::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// `Some(self)` unless the value is `None`.
    pub fn present(self) -> Option<ParameterValue> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }

    /// Integral floats that fit `i64` compare and hash as integers.
    fn integral(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(i) => Some(*i),
            ParameterValue::Float(f)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Some(*f as i64)
            }
            _ => None,
        }
    }
}

impl From<Number> for ParameterValue {
    fn from(value: Number) -> Self {
        match value {
            Number::Int(i) => ParameterValue::Int(i),
            Number::Float(f) => ParameterValue::Float(f),
        }
    }
}

impl PartialEq for ParameterValue {
    fn eq(&self, other: &Self) -> bool {
        use ParameterValue::*;
        match (self, other) {
            (None, None) => true,
            (Bool(a), Bool(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Int(_), Float(_)) | (Float(_), Int(_)) => {
                matches!((self.integral(), other.integral()), (Some(a), Some(b)) if a == b)
            }
            _ => false,
        }
    }
}

impl Eq for ParameterValue {}

impl Hash for ParameterValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if let Some(i) = self.integral() {
            0u8.hash(state);
            i.hash(state);
            return;
        }
        match self {
            ParameterValue::None => 1u8.hash(state),
            ParameterValue::Bool(b) => {
                2u8.hash(state);
                b.hash(state);
            }
            ParameterValue::Float(f) => {
                3u8.hash(state);
                if f.is_nan() {
                    f64::NAN.to_bits().hash(state);
                } else {
                    f.to_bits().hash(state);
                }
            }
            ParameterValue::Str(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            ParameterValue::Int(_) => unreachable!("integers hash through integral()"),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::None => f.write_str("None"),
            ParameterValue::Bool(true) => f.write_str("True"),
            ParameterValue::Bool(false) => f.write_str("False"),
            ParameterValue::Int(i) => write!(f, "{i}"),
            ParameterValue::Float(v) => f.write_str(&format_float(*v)),
            ParameterValue::Str(s) => f.write_str(&quote_string(s)),
        }
    }
}

// ---------------------------------------------------------------------------
// 4. ParameterDeclaration
// ---------------------------------------------------------------------------

/// Declared parameter type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Bool,
    Int,
    Float,
    Str,
    Csv,
}

impl ParameterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterKind::Bool => "bool",
            ParameterKind::Int => "int",
            ParameterKind::Float => "float",
            ParameterKind::Str => "str",
            ParameterKind::Csv => "csv",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ParameterKind::Int | ParameterKind::Float)
    }
}

/// One enumerated option of a `str` parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub value: ParameterValue,
    pub display_name: Option<String>,
}

/// A user-configurable parameter declared by a protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterDeclaration {
    pub name: String,
    pub kind: ParameterKind,
    pub default: Option<ParameterValue>,
    pub minimum: Option<ParameterValue>,
    pub maximum: Option<ParameterValue>,
    pub choices: Vec<Choice>,
    /// 1-based line of the declaring call; 0 when built by hand.
    pub line: usize,
}

impl ParameterDeclaration {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            minimum: None,
            maximum: None,
            choices: Vec::new(),
            line: 0,
        }
    }

    pub fn with_default(mut self, value: ParameterValue) -> Self {
        self.default = value.present();
        self
    }

    pub fn with_bounds(mut self, minimum: ParameterValue, maximum: ParameterValue) -> Self {
        self.minimum = minimum.present();
        self.maximum = maximum.present();
        self
    }

    pub fn with_choice(mut self, value: ParameterValue, display_name: &str) -> Self {
        self.choices.push(Choice {
            value,
            display_name: Some(display_name.to_string()),
        });
        self
    }
}

// ---------------------------------------------------------------------------
// 5. ParameterAssignment
// ---------------------------------------------------------------------------

/// One concrete value for every declared parameter, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterAssignment(IndexMap<String, ParameterValue>);

/// Width at which the pretty form breaks one entry per line.
const PRETTY_WIDTH: usize = 80;

impl ParameterAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParameterValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.0.iter()
    }

    /// Dictionary-literal rendering with keys sorted, wrapped one entry per
    /// line once it would exceed 80 columns.
    pub fn pretty(&self) -> String {
        let mut entries: Vec<(&String, &ParameterValue)> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let items: Vec<String> = entries
            .iter()
            .map(|(k, v)| format!("{}: {}", quote_string(k), v))
            .collect();

        let single = format!("{{{}}}", items.join(", "));
        if single.chars().count() <= PRETTY_WIDTH {
            return single;
        }
        format!("{{{}}}", items.join(",\n "))
    }
}

impl FromIterator<(String, ParameterValue)> for ParameterAssignment {
    fn from_iter<I: IntoIterator<Item = (String, ParameterValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexSet;

    #[test]
    fn test_number_arithmetic_promotes() {
        assert_eq!(
            Number::Int(2).checked_add(Number::Int(3)),
            Some(Number::Int(5))
        );
        assert_eq!(
            Number::Int(2).checked_sub(Number::Float(0.5)),
            Some(Number::Float(1.5))
        );
        assert_eq!(Number::Int(i64::MAX).checked_add(Number::Int(1)), None);
        assert_eq!(Number::Int(i64::MIN).negate(), None);
    }

    #[test]
    fn test_number_display() {
        assert_eq!(Number::Int(-1).to_string(), "-1");
        assert_eq!(Number::Float(0.5).to_string(), "0.5");
        assert_eq!(Number::Float(-10.0).to_string(), "-10.0");
    }

    #[test]
    fn test_parameter_value_equality_follows_numeric_tower() {
        assert_eq!(ParameterValue::Int(1), ParameterValue::Float(1.0));
        assert_ne!(ParameterValue::Int(1), ParameterValue::Float(1.5));
        assert_ne!(ParameterValue::Bool(true), ParameterValue::Int(1));
        assert_ne!(
            ParameterValue::Str("1".into()),
            ParameterValue::Int(1)
        );
    }

    #[test]
    fn test_parameter_value_set_dedup() {
        let mut set = IndexSet::new();
        set.insert(ParameterValue::Int(1));
        set.insert(ParameterValue::Float(1.0));
        set.insert(ParameterValue::Float(2.5));
        set.insert(ParameterValue::Int(1));
        assert_eq!(set.len(), 2);
        assert!(matches!(set[0], ParameterValue::Int(1)));
    }

    #[test]
    fn test_parameter_value_serde_untagged() {
        let values = vec![
            ParameterValue::None,
            ParameterValue::Bool(true),
            ParameterValue::Int(3),
            ParameterValue::Float(0.5),
            ParameterValue::Str("a".into()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[null,true,3,0.5,"a"]"#);
    }

    #[test]
    fn test_assignment_pretty_sorts_keys() {
        let assignment: ParameterAssignment = vec![
            ("volume".to_string(), ParameterValue::Float(20.0)),
            ("dry_run".to_string(), ParameterValue::Bool(false)),
        ]
        .into_iter()
        .collect();
        assert_eq!(assignment.pretty(), "{'dry_run': False, 'volume': 20.0}");
    }

    #[test]
    fn test_assignment_pretty_wraps_long_lines() {
        let mut assignment = ParameterAssignment::new();
        assignment.insert("first_long_parameter_name", ParameterValue::Str("x".repeat(30)));
        assignment.insert("second_long_parameter_name", ParameterValue::Int(1));
        let pretty = assignment.pretty();
        assert!(pretty.contains(",\n 'second_long_parameter_name': 1}"));
    }

    #[test]
    fn test_assignment_pretty_width_counts_characters() {
        let mut assignment = ParameterAssignment::new();
        assignment.insert("a", ParameterValue::Str("é".repeat(60)));
        assignment.insert("b", ParameterValue::Int(1));
        let pretty = assignment.pretty();
        assert_eq!(pretty.chars().count(), 77);
        assert!(!pretty.contains('\n'));
    }

    #[test]
    fn test_declaration_builder_drops_none() {
        let decl = ParameterDeclaration::new("x", ParameterKind::Int)
            .with_default(ParameterValue::None)
            .with_bounds(ParameterValue::Int(1), ParameterValue::None);
        assert!(decl.default.is_none());
        assert_eq!(decl.minimum, Some(ParameterValue::Int(1)));
        assert!(decl.maximum.is_none());
    }
}
