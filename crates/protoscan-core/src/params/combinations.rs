//! Boundary-value combination generation over declared parameters.
//!
//! Each declaration contributes an ordered candidate set; the assignments
//! are the Cartesian product of those sets in declaration order with the
//! rightmost parameter varying fastest.

use indexmap::IndexSet;
use tracing::{debug, warn};

use crate::errors::{ScanError, ScanResult};
use crate::models::{ParameterAssignment, ParameterDeclaration, ParameterKind, ParameterValue};

/// Ordered, de-duplicated candidate values for one declaration. Never empty.
pub fn candidate_values(decl: &ParameterDeclaration) -> IndexSet<ParameterValue> {
    let mut values = IndexSet::new();
    match decl.kind {
        ParameterKind::Int | ParameterKind::Float => {
            for bound in [&decl.minimum, &decl.default, &decl.maximum] {
                if let Some(value) = bound {
                    values.insert(value.clone());
                }
            }
        }
        ParameterKind::Str if !decl.choices.is_empty() => {
            for choice in &decl.choices {
                values.insert(choice.value.clone());
            }
        }
        ParameterKind::Bool => {
            values.insert(ParameterValue::Bool(true));
            values.insert(ParameterValue::Bool(false));
        }
        _ => {
            if let Some(default) = &decl.default {
                values.insert(default.clone());
            }
        }
    }
    if values.is_empty() {
        values.insert(decl.default.clone().unwrap_or(ParameterValue::None));
    }
    values
}

/// Number of assignments the product would contain. Zero without
/// declarations; saturates at `u128::MAX`.
pub fn combination_count(declarations: &[ParameterDeclaration]) -> u128 {
    if declarations.is_empty() {
        return 0;
    }
    declarations
        .iter()
        .map(|d| candidate_values(d).len() as u128)
        .fold(1u128, |acc, n| acc.saturating_mul(n))
}

/// Lazy odometer over the Cartesian product of candidate sets.
#[derive(Clone, Debug)]
pub struct AssignmentIter {
    names: Vec<String>,
    candidates: Vec<Vec<ParameterValue>>,
    indices: Vec<usize>,
    exhausted: bool,
}

impl AssignmentIter {
    pub fn new(declarations: &[ParameterDeclaration]) -> Self {
        let names = declarations.iter().map(|d| d.name.clone()).collect();
        let candidates: Vec<Vec<ParameterValue>> = declarations
            .iter()
            .map(|d| candidate_values(d).into_iter().collect())
            .collect();
        Self {
            indices: vec![0; candidates.len()],
            exhausted: candidates.is_empty(),
            names,
            candidates,
        }
    }

    fn advance(&mut self) {
        for position in (0..self.indices.len()).rev() {
            self.indices[position] += 1;
            if self.indices[position] < self.candidates[position].len() {
                return;
            }
            self.indices[position] = 0;
        }
        self.exhausted = true;
    }
}

impl Iterator for AssignmentIter {
    type Item = ParameterAssignment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let assignment = self
            .names
            .iter()
            .zip(&self.candidates)
            .zip(&self.indices)
            .map(|((name, values), &i)| (name.clone(), values[i].clone()))
            .collect();
        self.advance();
        Some(assignment)
    }
}

/// Materialize every assignment, refusing products larger than `limit`.
pub fn generate_combinations(
    declarations: &[ParameterDeclaration],
    limit: Option<usize>,
) -> ScanResult<Vec<ParameterAssignment>> {
    let count = combination_count(declarations);
    if let Some(limit) = limit {
        if count > limit as u128 {
            warn!(count = %count, limit, "combination product exceeds the configured cap");
            return Err(ScanError::TooManyCombinations { count, limit });
        }
    }
    debug!(count = %count, parameters = declarations.len(), "generating combinations");
    Ok(AssignmentIter::new(declarations).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_d() -> Vec<ParameterDeclaration> {
        vec![
            ParameterDeclaration::new("x", ParameterKind::Int)
                .with_default(ParameterValue::Int(5))
                .with_bounds(ParameterValue::Int(1), ParameterValue::Int(10)),
            ParameterDeclaration::new("y", ParameterKind::Bool),
        ]
    }

    #[test]
    fn test_int_and_bool_product() {
        let assignments = generate_combinations(&scenario_d(), None).unwrap();
        assert_eq!(assignments.len(), 6);
        assert_eq!(assignments[0].get("x"), Some(&ParameterValue::Int(1)));
        assert_eq!(assignments[0].get("y"), Some(&ParameterValue::Bool(true)));
        assert_eq!(assignments[1].get("x"), Some(&ParameterValue::Int(1)));
        assert_eq!(assignments[1].get("y"), Some(&ParameterValue::Bool(false)));
        assert_eq!(assignments[2].get("x"), Some(&ParameterValue::Int(5)));
        assert_eq!(assignments[5].get("x"), Some(&ParameterValue::Int(10)));
        assert!(assignments.iter().all(|a| a.len() == 2));
    }

    #[test]
    fn test_count_matches_product_of_cardinalities() {
        let mut decls = scenario_d();
        decls.push(
            ParameterDeclaration::new("mode", ParameterKind::Str)
                .with_choice(ParameterValue::Str("fast".into()), "Fast")
                .with_choice(ParameterValue::Str("slow".into()), "Slow")
                .with_choice(ParameterValue::Str("fast".into()), "Fast again"),
        );
        decls.push(ParameterDeclaration::new("layout", ParameterKind::Csv));
        assert_eq!(combination_count(&decls), 3 * 2 * 2);
        assert_eq!(AssignmentIter::new(&decls).count(), 12);
    }

    #[test]
    fn test_numeric_candidates_dedupe_equal_values() {
        let decl = ParameterDeclaration::new("v", ParameterKind::Float)
            .with_default(ParameterValue::Float(1.0))
            .with_bounds(ParameterValue::Int(1), ParameterValue::Float(2.5));
        let values: Vec<ParameterValue> = candidate_values(&decl).into_iter().collect();
        assert_eq!(values, vec![ParameterValue::Int(1), ParameterValue::Float(2.5)]);
    }

    #[test]
    fn test_empty_candidates_fall_back_to_default() {
        let bare = ParameterDeclaration::new("n", ParameterKind::Int);
        let values: Vec<ParameterValue> = candidate_values(&bare).into_iter().collect();
        assert_eq!(values, vec![ParameterValue::None]);

        let text = ParameterDeclaration::new("label", ParameterKind::Str)
            .with_default(ParameterValue::Str("A".into()));
        assert_eq!(candidate_values(&text).len(), 1);
    }

    #[test]
    fn test_bool_ignores_default() {
        let decl = ParameterDeclaration::new("flag", ParameterKind::Bool)
            .with_default(ParameterValue::Bool(false));
        let values: Vec<ParameterValue> = candidate_values(&decl).into_iter().collect();
        assert_eq!(
            values,
            vec![ParameterValue::Bool(true), ParameterValue::Bool(false)]
        );
    }

    #[test]
    fn test_no_declarations_no_assignments() {
        assert_eq!(combination_count(&[]), 0);
        assert!(generate_combinations(&[], None).unwrap().is_empty());
    }

    #[test]
    fn test_limit_rejects_large_products() {
        let err = generate_combinations(&scenario_d(), Some(5)).unwrap_err();
        assert!(matches!(
            err,
            ScanError::TooManyCombinations { count: 6, limit: 5 }
        ));
        assert_eq!(generate_combinations(&scenario_d(), Some(6)).unwrap().len(), 6);
    }
}
