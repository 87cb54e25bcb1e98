//! Precision, recall and F1 between a generated and a golden collection.

use std::collections::HashSet;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetMatch {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Set comparison: duplicates collapse and order is irrelevant. Empty sides
/// score 0 rather than NaN.
pub fn score<T: Eq + Hash>(generated: &[T], golden: &[T]) -> SetMatch {
    let a: HashSet<&T> = generated.iter().collect();
    let b: HashSet<&T> = golden.iter().collect();
    let common = a.intersection(&b).count() as f64;

    let precision = if a.is_empty() { 0.0 } else { common / a.len() as f64 };
    let recall = if b.is_empty() { 0.0 } else { common / b.len() as f64 };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    SetMatch {
        precision,
        recall,
        f1,
    }
}

/// Whole-field comparison: 1 when both collections are equal element by
/// element, else 0.
pub fn exact_match<T: PartialEq>(generated: &[T], golden: &[T]) -> f64 {
    if generated == golden {
        1.0
    } else {
        0.0
    }
}
