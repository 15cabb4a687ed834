use std::collections::BTreeMap;

use crate::detect::{unit::NutritionUnit, value::Value};

/// Amounts of two values expressed in a common unit.
///
/// Mass values compare in grams (a missing unit reads as `default_unit`),
/// energy values in kilocalories, anything else only when the units match.
pub fn comparable_amounts(
    first: &Value,
    second: &Value,
    default_unit: Option<NutritionUnit>,
) -> Option<(f64, f64)> {
    if let (Some(first), Some(second)) = (first.grams(default_unit), second.grams(default_unit)) {
        return Some((first, second));
    }
    let unit = |value: &Value| value.unit.or(default_unit);
    match (unit(first), unit(second)) {
        (Some(a), Some(b)) if a.is_energy() && b.is_energy() => {
            let first = NutritionUnit::convert_energy(first.amount, a, NutritionUnit::Kcal)?;
            let second = NutritionUnit::convert_energy(second.amount, b, NutritionUnit::Kcal)?;
            Some((first, second))
        }
        (a, b) if a == b => Some((first.amount, second.amount)),
        _ => None,
    }
}

/// `first / second` for a row, `None` when either side is zero or the units
/// cannot be compared.
pub fn row_ratio(first: &Value, second: &Value, default_unit: Option<NutritionUnit>) -> Option<f64> {
    let (first, second) = comparable_amounts(first, second, default_unit)?;
    (first > 0.0 && second > 0.0).then(|| first / second)
}

/// The ratio shared by most rows of a two-column table.
///
/// The mode is taken over ratios rounded to one decimal; when that is tied
/// the ratios are rounded to whole numbers instead. A tie at both precisions
/// leaves the table without a valid ratio.
///
/// # Example
/// ```
/// use nutriscan_core::grid::ratio::valid_ratio;
/// assert_eq!(valid_ratio(&[0.3, 0.31, 0.29, 0.8]), Some(0.3));
/// assert_eq!(valid_ratio(&[1.0, 2.0]), None);
/// ```
pub fn valid_ratio(ratios: &[f64]) -> Option<f64> {
    let ratios: Vec<f64> = ratios
        .iter()
        .copied()
        .filter(|ratio| ratio.is_finite() && *ratio > 0.0)
        .collect();
    unique_mode(&ratios, 10.0).or_else(|| unique_mode(&ratios, 1.0))
}

fn unique_mode(ratios: &[f64], scale: f64) -> Option<f64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for ratio in ratios {
        *counts.entry((ratio * scale).round() as i64).or_default() += 1;
    }

    let max = *counts.values().max()?;
    let mut modes = counts.iter().filter(|(_, count)| **count == max);
    let (key, _) = modes.next()?;
    if modes.next().is_some() {
        return None;
    }

    let ratio = *key as f64 / scale;
    (ratio > 0.0).then_some(ratio)
}

/// Relative distance of `ratio` from `valid`.
pub fn deviation(ratio: f64, valid: f64) -> f64 {
    ((ratio - valid) / valid).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparable_amounts() {
        let g = |amount| Value::new(amount, Some(NutritionUnit::G));
        assert_eq!(
            comparable_amounts(&g(1.0), &Value::new(500.0, Some(NutritionUnit::Mg)), None),
            Some((1.0, 0.5))
        );
        assert_eq!(
            comparable_amounts(&g(2.0), &Value::new(4.0, None), Some(NutritionUnit::G)),
            Some((2.0, 4.0))
        );
        let (kcal, other) = comparable_amounts(
            &Value::new(418.4, Some(NutritionUnit::Kj)),
            &Value::new(50.0, Some(NutritionUnit::Kcal)),
            Some(NutritionUnit::Kcal),
        )
        .unwrap();
        assert!((kcal - 100.0).abs() < 1e-9);
        assert_eq!(other, 50.0);
        assert_eq!(
            comparable_amounts(&g(2.0), &Value::new(4.0, Some(NutritionUnit::Percent)), None),
            None
        );
    }

    #[test]
    fn test_row_ratio_skips_zero() {
        let g = |amount| Value::new(amount, Some(NutritionUnit::G));
        assert_eq!(row_ratio(&g(3.0), &g(10.0), None), Some(0.3));
        assert_eq!(row_ratio(&g(0.0), &g(10.0), None), None);
        assert_eq!(row_ratio(&g(3.0), &g(0.0), None), None);
    }

    #[test]
    fn test_valid_ratio_falls_back_to_whole_numbers() {
        // 1.0 and 1.1 tie at one decimal, both round to 1
        assert_eq!(valid_ratio(&[1.04, 1.14]), Some(1.0));
        assert_eq!(valid_ratio(&[1.04, 1.06, 1.12, 1.14]), Some(1.1));
        assert_eq!(valid_ratio(&[]), None);
        assert_eq!(valid_ratio(&[0.01, 0.02]), None);
    }

    #[test]
    fn test_deviation() {
        assert!((deviation(1.17, 1.0) - 0.17).abs() < 1e-9);
        assert_eq!(deviation(0.5, 1.0), 0.5);
    }
}
