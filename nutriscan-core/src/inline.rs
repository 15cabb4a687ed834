//! Reading labels printed as running text, where each attribute is followed
//! by its amounts in the same fragment ("Total Fat 3g").

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use tracing::*;
use uuid::Uuid;

use crate::{
    detect::{
        attribute::Attribute,
        unit::NutritionUnit,
        value::{DISQUALIFYING_PHRASES, Value, detect_with_positions, normalize_numerals},
    },
    observation::Observation,
    recognition::RecognizedText,
    text::{AttributeText, ValueText},
};

/// "includes 10g added sugars": the amount belongs to the attribute after it.
static INCLUDES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bincl(?:udes|uding)?\b\.?").unwrap());

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Attribute(Attribute),
    Value(Value),
    /// A phrase such as "calories from fat" whose amounts are not a row.
    Ignored,
    Includes,
}

/// Attribute, value and preposition tokens of a normalised string, in order.
fn tokenize(normalized: &str) -> Vec<(usize, Token)> {
    let mut tokens: Vec<(usize, Token)> = Vec::new();
    tokens.extend(
        Attribute::detect_with_ranges(normalized)
            .into_iter()
            .filter(|(attribute, _)| attribute.is_nutrient())
            .map(|(attribute, range)| (range.start, Token::Attribute(attribute))),
    );
    tokens.extend(
        Attribute::ignored_ranges(normalized)
            .into_iter()
            .map(|range| (range.start, Token::Ignored)),
    );
    tokens.extend(
        INCLUDES
            .find_iter(normalized)
            .map(|found| (found.start(), Token::Includes)),
    );
    tokens.sort_by_key(|(position, _)| *position);
    tokens
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Attach,
    Swallow,
    Defer,
}

/// An attribute with the amounts printed after it.
#[derive(Debug)]
struct Entry<'a> {
    attribute: Attribute,
    text: &'a RecognizedText,
    values: Vec<(Value, &'a RecognizedText)>,
}

/// Walks the tokens of one fragment.
fn read_entries(text: &RecognizedText) -> Vec<Entry<'_>> {
    let string = text.normalized_string();
    let normalized = normalize_numerals(&string);

    let mut tokens = tokenize(&normalized);
    tokens.extend(
        detect_with_positions(&string)
            .into_iter()
            .map(|(value, range)| (range.start, Token::Value(value))),
    );
    // values sort after a token starting at the same place
    tokens.sort_by_key(|(position, token)| (*position, matches!(token, Token::Value(_))));

    let mut entries: Vec<Entry> = Vec::new();
    let mut deferred: Vec<Value> = Vec::new();
    let mut mode = Mode::Attach;

    for (_, token) in tokens {
        match token {
            Token::Attribute(attribute) => {
                entries.push(Entry {
                    attribute,
                    text,
                    values: deferred.drain(..).map(|value| (value, text)).collect(),
                });
                mode = Mode::Attach;
            }
            Token::Ignored => mode = Mode::Swallow,
            Token::Includes => mode = Mode::Defer,
            Token::Value(value) => match mode {
                Mode::Attach => {
                    if let Some(entry) = entries.last_mut() {
                        entry.values.push((value, text));
                    }
                }
                Mode::Defer => deferred.push(value),
                Mode::Swallow => trace!("Skipped {} in `{}`", value, text.string()),
            },
        }
    }

    entries
}

fn is_boilerplate(text: &RecognizedText) -> bool {
    let string = text.normalized_string().to_lowercase();
    DISQUALIFYING_PHRASES
        .iter()
        .any(|phrase| string.contains(phrase))
}

/// Fragments with values and no attribute printed on the same line, right of `text`.
fn adjoining_values<'a>(
    text: &RecognizedText,
    texts: &'a [RecognizedText],
    claimed: &HashSet<Uuid>,
) -> Vec<&'a RecognizedText> {
    let mut adjoining: Vec<&RecognizedText> = texts
        .iter()
        .filter(|other| other.id != text.id && !claimed.contains(&other.id))
        .filter(|other| other.rect.min.x >= text.rect.center().x)
        .filter(|other| other.rect.is_inline_with(&text.rect))
        .filter(|other| !Attribute::is_nutrient_text(&other.normalized_string()))
        .filter(|other| !Value::detect(&other.normalized_string()).is_empty())
        .collect();
    adjoining.sort_by(|a, b| a.rect.min.x.total_cmp(&b.rect.min.x));
    adjoining
}

/// The amounts kept for an attribute: the first one its units allow, and a
/// later amount in the same unit for a second column.
fn pick_values(
    attribute: Attribute,
    values: &[(Value, &RecognizedText)],
) -> (Option<ValueText>, Option<ValueText>) {
    let Some(first) = values
        .iter()
        .position(|(value, _)| attribute.supports_unit(value.unit))
    else {
        return (None, None);
    };

    let (value, text) = values[first];
    let value = calorie_energy(attribute, value, text);
    let second = match value.is_percent() {
        true => None,
        false => values[first + 1..]
            .iter()
            .find(|(other, _)| !other.is_percent() && other.unit == value.unit)
            .map(|(other, text)| ValueText::new(calorie_energy(attribute, *other, text), Some((*text).clone()))),
    };

    (Some(ValueText::new(value, Some(text.clone()))), second)
}

/// "Calories" rows are in kilocalories whatever unit the OCR saw.
fn calorie_energy(attribute: Attribute, value: Value, text: &RecognizedText) -> Value {
    if attribute == Attribute::Energy
        && value.unit == Some(NutritionUnit::Kj)
        && text.normalized_string().to_lowercase().contains("calor")
    {
        return Value::new(value.amount, Some(NutritionUnit::Kcal));
    }
    value
}

/// Reads every attribute printed together with its amounts.
///
/// A fragment holding only attribute names takes its amounts from the
/// unclaimed fragments printed to its right on the same line.
#[tracing::instrument(skip_all)]
pub fn extract_inline(texts: &[RecognizedText]) -> Vec<Observation> {
    let mut ordered: Vec<&RecognizedText> = texts.iter().collect();
    ordered.sort_by(|a, b| {
        a.rect
            .min
            .y
            .total_cmp(&b.rect.min.y)
            .then(a.rect.min.x.total_cmp(&b.rect.min.x))
    });

    let mut claimed: HashSet<Uuid> = HashSet::new();
    let mut observations: Vec<Observation> = Vec::new();

    for text in ordered {
        if claimed.contains(&text.id) || is_boilerplate(text) {
            continue;
        }
        let mut entries = read_entries(text);
        if entries.is_empty() {
            continue;
        }
        claimed.insert(text.id);

        if entries.iter().all(|entry| entry.values.is_empty()) {
            for other in adjoining_values(text, texts, &claimed) {
                claimed.insert(other.id);
                if let Some(entry) = entries.last_mut() {
                    let values = Value::detect(&other.normalized_string());
                    entry.values.extend(values.into_iter().map(|value| (value, other)));
                }
            }
        }

        for entry in entries {
            if observations
                .iter()
                .any(|observation| observation.attribute() == entry.attribute)
            {
                continue;
            }
            let (value1, value2) = pick_values(entry.attribute, &entry.values);
            if value1.is_none() {
                continue;
            }
            observations.push(Observation::nutrient(
                AttributeText::new(entry.attribute, entry.text.clone()),
                value1,
                value2,
            ));
        }
    }

    debug!("Read {} inline rows", observations.len());
    observations
}
