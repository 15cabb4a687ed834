use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::{consts::TRACE_AMOUNT, detect::unit::NutritionUnit};

/// An amount read off the label, with its unit when one was printed.
///
/// Two values are equal when both the amount and the unit match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub amount: f64,
    pub unit: Option<NutritionUnit>,
}

/// Phrases that make a whole string irrelevant, whatever numbers it carries.
pub const DISQUALIFYING_PHRASES: &[&str] = &[
    "daily value",
    "daily values",
    "daily intake",
    "reference intake",
    "best before",
    "use by",
    "expiry",
    "calorie diet",
    "calories a day",
    "kcal diet",
];

/// Ratio or equation artifacts such as `2 x 30g` or `1 cup = 240ml`.
static DISQUALIFYING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d\s*[x×*]\s*\d|\d[^\d=]*=\s*\d").unwrap());

static THOUSANDS_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([1-9]\d{0,2}),(\d{3})(\D|$)").unwrap());

static DECIMAL_MISREAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d)[,:](\d)").unwrap());

static MIXED_FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\s+(\d+)/(\d+)\b").unwrap());

static FRACTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d+)/(\d+)\b").unwrap());

static ZERO_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(nil|not detected|none detected)\b").unwrap());

static TRACE_LITERAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\btraces?\b").unwrap());

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<amount>\d+(?:\.\d+)?|\.\d+)\s*(?P<unit>%|[a-zµμ]+\.?)?").unwrap()
});

static LESS_THAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(<|less than|\blt\.?)\s*\d").unwrap());

impl Value {
    pub fn new(amount: f64, unit: Option<NutritionUnit>) -> Self {
        Self { amount, unit }
    }

    /// Every value found in `text`, left to right.
    ///
    /// # Example
    /// ```
    /// use nutriscan_core::detect::{unit::NutritionUnit, value::Value};
    /// let values = Value::detect("Total Fat 8g 12%");
    /// assert_eq!(values, vec![
    ///     Value::new(8.0, Some(NutritionUnit::G)),
    ///     Value::new(12.0, Some(NutritionUnit::Percent)),
    /// ]);
    /// ```
    pub fn detect(text: &str) -> Vec<Value> {
        detect_with_positions(text)
            .into_iter()
            .map(|(value, _)| value)
            .collect()
    }

    /// A single value for `text`: the only value carrying a unit if there is
    /// exactly one such value, the first value otherwise.
    pub fn detect_single(text: &str) -> Option<Value> {
        let values = Value::detect(text);
        let mut with_unit = values.iter().filter(|value| value.unit.is_some());
        match (with_unit.next(), with_unit.next()) {
            (Some(value), None) => Some(*value),
            _ => values.first().copied(),
        }
    }

    pub fn has_energy_unit(&self) -> bool {
        self.unit.is_some_and(|unit| unit.is_energy())
    }

    pub fn has_nutrient_unit(&self) -> bool {
        self.unit.is_some_and(|unit| unit.is_nutrient_unit())
    }

    pub fn is_percent(&self) -> bool {
        self.unit == Some(NutritionUnit::Percent)
    }

    /// The amount in grams, reading a missing unit as `default_unit`.
    pub fn grams(&self, default_unit: Option<NutritionUnit>) -> Option<f64> {
        self.unit
            .or(default_unit)
            .and_then(|unit| unit.grams_factor())
            .map(|factor| self.amount * factor)
    }

    /// The amount in kilocalories, reading a missing unit as kilocalories.
    pub fn kcal(&self) -> Option<f64> {
        NutritionUnit::convert_energy(
            self.amount,
            self.unit.unwrap_or(NutritionUnit::Kcal),
            NutritionUnit::Kcal,
        )
    }

    /// Whether both values can be compared directly (same unit or one is unitless).
    pub fn is_comparable_with(&self, other: &Value) -> bool {
        match (self.unit, other.unit) {
            (Some(own), Some(theirs)) => own == theirs,
            _ => true,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.unit {
            Some(unit) => write!(f, "{} {}", self.amount, unit),
            None => write!(f, "{}", self.amount),
        }
    }
}

/// Whether the amount in `text` is printed as an upper bound (`<1g`, `less than 0.5g`).
pub fn is_less_than_prefixed(text: &str) -> bool {
    LESS_THAN.is_match(&text.to_lowercase())
}

/// Normalises OCR misreads of numerals so they parse as plain decimals.
///
/// Thousands separators are dropped, comma and colon decimal separators
/// become dots, fractions become decimals and the literal words for zero and
/// trace amounts are replaced by their amounts.
pub fn normalize_numerals(text: &str) -> String {
    let text = text.to_lowercase();
    let text = THOUSANDS_SEPARATOR.replace_all(&text, "$1$2$3");
    let text = DECIMAL_MISREAD.replace_all(&text, "$1.$2");
    let text = MIXED_FRACTION.replace_all(&text, |caps: &Captures| {
        fraction(&caps[2], &caps[3])
            .and_then(|part| caps[1].parse::<f64>().ok().map(|whole| whole + part))
            .map(format_amount)
            .unwrap_or_else(|| caps[0].to_string())
    });
    let text = FRACTION.replace_all(&text, |caps: &Captures| {
        fraction(&caps[1], &caps[2])
            .map(format_amount)
            .unwrap_or_else(|| caps[0].to_string())
    });
    let text = ZERO_LITERAL.replace_all(&text, "0");
    let text = TRACE_LITERAL.replace_all(&text, format!("{} g", format_amount(TRACE_AMOUNT)));
    text.into_owned()
}

/// Detects values together with their byte range in the normalised string.
///
/// The positions refer to [`normalize_numerals`]'s output, which is what
/// token walkers iterate over.
pub fn detect_with_positions(text: &str) -> Vec<(Value, std::ops::Range<usize>)> {
    let lowered = text.to_lowercase();
    if DISQUALIFYING_PATTERN.is_match(&lowered)
        || DISQUALIFYING_PHRASES
            .iter()
            .any(|phrase| lowered.contains(phrase))
    {
        return Vec::new();
    }

    let normalized = normalize_numerals(&lowered);
    detect_in_normalized(&normalized)
}

/// Runs the amount pattern over an already normalised string.
pub(crate) fn detect_in_normalized(normalized: &str) -> Vec<(Value, std::ops::Range<usize>)> {
    AMOUNT
        .captures_iter(normalized)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let amount_match = caps.name("amount")?;
            if is_part_of_identifier(normalized, amount_match.start()) {
                return None;
            }

            let amount = amount_match.as_str().parse::<f64>().ok()?;
            let unit = caps
                .name("unit")
                .and_then(|unit| NutritionUnit::from_token(unit.as_str()));

            // keep the range tight when the trailing word is not a unit
            let end = match unit {
                Some(_) => whole.end(),
                None => amount_match.end(),
            };
            Some((Value::new(amount, unit), amount_match.start()..end))
        })
        .collect()
}

/// Numbers glued to a single letter (`b12`, `d3`) or to `omega` name a
/// nutrient rather than an amount.
fn is_part_of_identifier(text: &str, start: usize) -> bool {
    let prefix = &text[..start];
    let word: String = prefix
        .chars()
        .rev()
        .take_while(|c| c.is_alphabetic())
        .collect();
    if word.is_empty() {
        return false;
    }
    word.chars().count() == 1 || word == "agemo"
}

fn fraction(numerator: &str, denominator: &str) -> Option<f64> {
    let numerator = numerator.parse::<f64>().ok()?;
    let denominator = denominator.parse::<f64>().ok()?;
    (denominator != 0.0).then(|| numerator / denominator)
}

fn format_amount(amount: f64) -> String {
    let rounded = (amount * 1000.0).round() / 1000.0;
    format!("{rounded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(amount: f64, unit: Option<NutritionUnit>) -> Value {
        Value::new(amount, unit)
    }

    #[test]
    fn test_detect_amount_and_unit() {
        assert_eq!(Value::detect("3g"), vec![value(3.0, Some(NutritionUnit::G))]);
        assert_eq!(Value::detect("Sodium 140 mg"), vec![value(140.0, Some(NutritionUnit::Mg))]);
        assert_eq!(Value::detect("150"), vec![value(150.0, None)]);
        assert_eq!(Value::detect("Energy 1046kJ"), vec![value(1046.0, Some(NutritionUnit::Kj))]);
        assert_eq!(Value::detect(".5g"), vec![value(0.5, Some(NutritionUnit::G))]);
    }

    #[test]
    fn test_detect_multiple_values_in_order() {
        assert_eq!(
            Value::detect("150 40%"),
            vec![value(150.0, None), value(40.0, Some(NutritionUnit::Percent))]
        );
        assert_eq!(
            Value::detect("630, 150"),
            vec![value(630.0, None), value(150.0, None)]
        );
        assert_eq!(
            Value::detect("Protein 3 Fat 4g"),
            vec![value(3.0, None), value(4.0, Some(NutritionUnit::G))]
        );
    }

    #[test]
    fn test_detect_disqualified_strings() {
        assert!(Value::detect("2 x 30g").is_empty());
        assert!(Value::detect("1 cup = 240ml").is_empty());
        assert!(Value::detect("% Daily Value* 5").is_empty());
        assert!(Value::detect("based on a 2000 calorie diet").is_empty());
        assert!(Value::detect("Best before 12 2025").is_empty());
    }

    #[test]
    fn test_detect_literals() {
        assert_eq!(Value::detect("nil"), vec![value(0.0, None)]);
        assert_eq!(Value::detect("Not detected"), vec![value(0.0, None)]);
        assert_eq!(
            Value::detect("Trace"),
            vec![value(TRACE_AMOUNT, Some(NutritionUnit::G))]
        );
        // words merely containing the literal are untouched
        assert!(Value::detect("Vanilla").is_empty());
    }

    #[test]
    fn test_detect_separator_misreads() {
        assert_eq!(Value::detect("1,5g"), vec![value(1.5, Some(NutritionUnit::G))]);
        assert_eq!(Value::detect("2:4g"), vec![value(2.4, Some(NutritionUnit::G))]);
        assert_eq!(Value::detect("1,046 kJ"), vec![value(1046.0, Some(NutritionUnit::Kj))]);
        assert_eq!(Value::detect("1,046kJ"), vec![value(1046.0, Some(NutritionUnit::Kj))]);
        assert_eq!(Value::detect("0,125g"), vec![value(0.125, Some(NutritionUnit::G))]);
    }

    #[test]
    fn test_detect_fractions() {
        assert_eq!(Value::detect("1/2 cup"), vec![value(0.5, None)]);
        assert_eq!(Value::detect("1 1/2 cups"), vec![value(1.5, None)]);
        assert_eq!(Value::detect("1/0"), vec![value(1.0, None), value(0.0, None)]);
    }

    #[test]
    fn test_detect_skips_nutrient_identifiers() {
        assert!(Value::detect("Vitamin B12").is_empty());
        assert_eq!(
            Value::detect("Vitamin B6 0.4mg"),
            vec![value(0.4, Some(NutritionUnit::Mg))]
        );
        assert!(Value::detect("Omega3").is_empty());
        // glued words longer than one letter are still amounts
        assert_eq!(Value::detect("Fat3g"), vec![value(3.0, Some(NutritionUnit::G))]);
    }

    #[test]
    fn test_detect_single() {
        assert_eq!(
            Value::detect_single("150 40%"),
            Some(value(40.0, Some(NutritionUnit::Percent)))
        );
        assert_eq!(Value::detect_single("8g 12%"), Some(value(8.0, Some(NutritionUnit::G))));
        assert_eq!(Value::detect_single("630 150"), Some(value(630.0, None)));
        assert_eq!(Value::detect_single("Protein"), None);
    }

    #[test]
    fn test_value_conversions() {
        assert!((value(250.0, Some(NutritionUnit::Mg)).grams(None).unwrap() - 0.25).abs() < 1e-12);
        assert_eq!(value(3.0, None).grams(Some(NutritionUnit::G)), Some(3.0));
        assert_eq!(value(3.0, None).grams(None), None);
        assert!((value(418.4, Some(NutritionUnit::Kj)).kcal().unwrap() - 100.0).abs() < 1e-9);
        assert_eq!(value(150.0, None).kcal(), Some(150.0));
        assert_eq!(value(3.0, Some(NutritionUnit::G)).kcal(), None);
    }

    #[test]
    fn test_less_than_prefix() {
        assert!(is_less_than_prefixed("<1g"));
        assert!(is_less_than_prefixed("Less than 0.5g"));
        assert!(!is_less_than_prefixed("1g"));
        assert!(!is_less_than_prefixed("Salt 5g"));
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(value(3.0, Some(NutritionUnit::G)), value(3.0, Some(NutritionUnit::G)));
        assert_ne!(value(3.0, Some(NutritionUnit::G)), value(3.0, Some(NutritionUnit::Mg)));
        assert_ne!(value(3.0, None), value(3.0, Some(NutritionUnit::G)));
    }
}
