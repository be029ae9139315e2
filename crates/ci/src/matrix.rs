//! Matrix expansion.
//!
//! Dimensions expand to their cartesian product, first dimension varying
//! slowest. Each combination gets a slice identifier made of a 1-based
//! counter, zero-padded to three digits, and the sanitized values joined by
//! underscores: dimensions `[a, b]` and `[1, 2]` give `001_a_1`, `002_a_2`,
//! `003_b_1`, `004_b_2`.

use crate::definition::MatrixDimension;
use crate::model::MatrixInstance;
use indexmap::IndexMap;

/// Expand dimensions into matrix instances.
///
/// No dimensions, or any dimension without values, yields no instances.
#[must_use]
pub fn expand(dimensions: &[MatrixDimension]) -> Vec<MatrixInstance> {
    if dimensions.is_empty() || dimensions.iter().any(|d| d.values.is_empty()) {
        return Vec::new();
    }

    let total: usize = dimensions.iter().map(|d| d.values.len()).product();
    let mut instances = Vec::with_capacity(total);
    let mut cursor = vec![0usize; dimensions.len()];

    for counter in 1..=total {
        let values: IndexMap<String, String> = dimensions
            .iter()
            .zip(&cursor)
            .map(|(dim, &i)| (dim.name.clone(), dim.values[i].clone()))
            .collect();
        let parts: Vec<String> = values.values().map(|v| sanitize_value(v)).collect();
        instances.push(MatrixInstance {
            slice: format!("{counter:03}_{}", parts.join("_")),
            values,
        });

        // Odometer increment, last dimension fastest.
        for pos in (0..cursor.len()).rev() {
            cursor[pos] += 1;
            if cursor[pos] < dimensions[pos].values.len() {
                break;
            }
            cursor[pos] = 0;
        }
    }

    instances
}

/// Replace every non-alphanumeric character with a hyphen, collapse runs of
/// hyphens and trim them from both ends.
#[must_use]
pub fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
