use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::*;
use uuid::Uuid;

use crate::{
    detect::{attribute::Attribute, unit::NutritionUnit, value::normalize_numerals},
    observation::{Observation, Reading},
    recognition::RecognizedText,
};

/// One token of a serving description.
#[derive(Debug, Clone, PartialEq)]
pub enum ServingArtefact {
    Attribute(Attribute),
    Amount(f64),
    Unit(NutritionUnit),
    Text(String),
    Separator,
}

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<amount>\d+(?:\.\d+)?|\.\d+)|(?P<word>%|[a-zµμ]+)|(?P<separator>[()\[\],;:/=])")
        .unwrap()
});

static CONTAINER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"per\s+(?P<name>[a-z]+)").unwrap());

/// Splits a serving description into artefacts.
///
/// Serving and header phrases become [`ServingArtefact::Attribute`] markers;
/// a servings-per-container phrase is followed by the container's name.
///
/// # Example
/// ```
/// use nutriscan_core::detect::{attribute::Attribute, serving::{ServingArtefact, tokenize}, unit::NutritionUnit};
/// assert_eq!(tokenize("Serving Size 30g"), vec![
///     ServingArtefact::Attribute(Attribute::ServingSize),
///     ServingArtefact::Amount(30.0),
///     ServingArtefact::Unit(NutritionUnit::G),
/// ]);
/// ```
pub fn tokenize(text: &str) -> Vec<ServingArtefact> {
    let normalized = normalize_numerals(text);
    let markers: Vec<_> = Attribute::detect_with_ranges(&normalized)
        .into_iter()
        .filter(|(attribute, _)| attribute.is_serving() || attribute.is_header())
        .collect();

    let mut artefacts = Vec::new();
    let mut cursor = 0;
    for (attribute, range) in markers {
        tokenize_plain(&normalized[cursor..range.start], &mut artefacts);
        artefacts.push(ServingArtefact::Attribute(attribute));
        if attribute == Attribute::ServingsPerContainerAmount {
            if let Some(caps) = CONTAINER_NAME.captures(&normalized[range.clone()]) {
                artefacts.push(ServingArtefact::Text(caps["name"].to_string()));
            }
        }
        cursor = range.end;
    }
    tokenize_plain(&normalized[cursor..], &mut artefacts);

    artefacts
}

fn tokenize_plain(text: &str, artefacts: &mut Vec<ServingArtefact>) {
    for caps in TOKEN.captures_iter(text) {
        if let Some(amount) = caps.name("amount") {
            if let Ok(amount) = amount.as_str().parse::<f64>() {
                artefacts.push(ServingArtefact::Amount(amount));
            }
        } else if let Some(word) = caps.name("word") {
            let artefact = match NutritionUnit::from_token(word.as_str()) {
                Some(unit) => ServingArtefact::Unit(unit),
                None => ServingArtefact::Text(word.as_str().to_string()),
            };
            artefacts.push(artefact);
        } else if caps.name("separator").is_some() {
            artefacts.push(ServingArtefact::Separator);
        }
    }
}

enum Slot {
    Amount,
    Unit,
    UnitName,
    ContainerName,
}

fn slot_of(attribute: Attribute) -> Option<Slot> {
    use Attribute::*;
    match attribute {
        ServingAmount
        | ServingEquivalentAmount
        | ServingsPerContainerAmount
        | HeaderServingAmount
        | HeaderServingEquivalentAmount => Some(Slot::Amount),
        ServingUnit | ServingEquivalentUnit | HeaderServingUnit | HeaderServingEquivalentUnit => {
            Some(Slot::Unit)
        }
        ServingUnitSize
        | ServingEquivalentUnitSize
        | HeaderServingUnitSize
        | HeaderServingEquivalentUnitSize => Some(Slot::UnitName),
        ServingsPerContainerName => Some(Slot::ContainerName),
        _ => None,
    }
}

/// Walks artefacts along [`Attribute::next_attributes`] chains.
///
/// Each artefact carries the index of the fragment it was read from, which
/// is handed back with every reading. `start` primes the walker as if that
/// marker had just been read.
pub fn walk(
    artefacts: &[(ServingArtefact, usize)],
    start: Option<Attribute>,
) -> Vec<(Attribute, Reading, usize)> {
    let mut readings: Vec<(Attribute, Reading, usize)> = Vec::new();
    let mut expected: Vec<Attribute> = start
        .map(|attribute| attribute.next_attributes().to_vec())
        .unwrap_or_default();
    let mut pending_amount: Option<(f64, usize)> = None;
    let mut name: Vec<(String, usize)> = Vec::new();

    let emitted = |readings: &[(Attribute, Reading, usize)], attribute: Attribute| {
        readings.iter().any(|(emitted, _, _)| *emitted == attribute)
    };

    for (artefact, source) in artefacts {
        if !matches!(artefact, ServingArtefact::Text(_)) {
            flush_name(&mut name, &mut expected, &mut readings);
        }

        match artefact {
            ServingArtefact::Attribute(Attribute::ServingSize) => {
                expected = Attribute::ServingSize.next_attributes().to_vec();
            }
            ServingArtefact::Attribute(Attribute::ServingsPerContainerAmount) => {
                match pending_amount.take() {
                    Some((amount, amount_source))
                        if !emitted(&readings, Attribute::ServingsPerContainerAmount) =>
                    {
                        readings.push((
                            Attribute::ServingsPerContainerAmount,
                            Reading::Amount(amount),
                            amount_source,
                        ));
                        expected = vec![Attribute::ServingsPerContainerName];
                    }
                    _ => {
                        expected = vec![
                            Attribute::ServingsPerContainerAmount,
                            Attribute::ServingsPerContainerName,
                        ];
                    }
                }
            }
            ServingArtefact::Attribute(_) | ServingArtefact::Separator => {}
            ServingArtefact::Amount(amount) => {
                let target = expected
                    .iter()
                    .copied()
                    .find(|attribute| matches!(slot_of(*attribute), Some(Slot::Amount)));
                match target {
                    Some(attribute) if !emitted(&readings, attribute) => {
                        readings.push((attribute, Reading::Amount(*amount), *source));
                        expected = attribute.next_attributes().to_vec();
                    }
                    _ if expected.is_empty() => pending_amount = Some((*amount, *source)),
                    _ => {}
                }
            }
            ServingArtefact::Unit(unit) => {
                let target = expected
                    .iter()
                    .copied()
                    .find(|attribute| matches!(slot_of(*attribute), Some(Slot::Unit)));
                if let Some(attribute) = target {
                    if !emitted(&readings, attribute) {
                        readings.push((attribute, Reading::Unit(*unit), *source));
                        expected = attribute.next_attributes().to_vec();
                    }
                }
            }
            ServingArtefact::Text(word) => {
                let container = expected.contains(&Attribute::ServingsPerContainerName)
                    && !emitted(&readings, Attribute::ServingsPerContainerName);
                let unit_name = expected
                    .iter()
                    .any(|attribute| matches!(slot_of(*attribute), Some(Slot::UnitName)));
                if container {
                    readings.push((
                        Attribute::ServingsPerContainerName,
                        Reading::Name(word.clone()),
                        *source,
                    ));
                    expected.retain(|attribute| *attribute != Attribute::ServingsPerContainerName);
                } else if unit_name {
                    name.push((word.clone(), *source));
                }
            }
        }
    }
    flush_name(&mut name, &mut expected, &mut readings);

    readings
}

fn flush_name(
    name: &mut Vec<(String, usize)>,
    expected: &mut Vec<Attribute>,
    readings: &mut Vec<(Attribute, Reading, usize)>,
) {
    let Some((_, source)) = name.first().cloned() else {
        return;
    };
    let target = expected
        .iter()
        .copied()
        .find(|attribute| matches!(slot_of(*attribute), Some(Slot::UnitName)));
    if let Some(attribute) = target {
        let joined = name
            .iter()
            .map(|(word, _)| word.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        readings.push((attribute, Reading::Name(joined), source));
        *expected = attribute.next_attributes().to_vec();
    }
    name.clear();
}

/// Walks a single string.
pub fn walk_text(text: &str, start: Option<Attribute>) -> Vec<(Attribute, Reading)> {
    let artefacts: Vec<_> = tokenize(text).into_iter().map(|artefact| (artefact, 0)).collect();
    walk(&artefacts, start)
        .into_iter()
        .map(|(attribute, reading, _)| (attribute, reading))
        .collect()
}

/// Whether the fragment introduces the serving size or the servings per container.
pub fn is_serving_text(text: &str) -> bool {
    Attribute::detect(text).iter().any(Attribute::is_serving)
}

/// Reads the serving facts of `fragment`.
///
/// When the fragment names the serving without giving an amount
/// ("Serving Size" alone), the fragments printed to its right on the same
/// row are read as its continuation.
pub fn read_serving(fragment: &RecognizedText, texts: &[RecognizedText]) -> Vec<Observation> {
    let mut sources = vec![fragment];
    let mut artefacts: Vec<(ServingArtefact, usize)> = tokenize(&fragment.normalized_string())
        .into_iter()
        .map(|artefact| (artefact, 0))
        .collect();

    if !artefacts
        .iter()
        .any(|(artefact, _)| matches!(artefact, ServingArtefact::Amount(_)))
    {
        let mut continuation: Vec<&RecognizedText> = texts
            .iter()
            .filter(|text| {
                text.id != fragment.id
                    && text.rect.is_inline_with(&fragment.rect)
                    && text.rect.min.x >= fragment.rect.center().x
            })
            .collect();
        continuation.sort_by(|a, b| a.rect.min.x.total_cmp(&b.rect.min.x));
        for text in continuation {
            let index = sources.len();
            sources.push(text);
            artefacts.extend(
                tokenize(&text.normalized_string())
                    .into_iter()
                    .map(|artefact| (artefact, index)),
            );
        }
    }

    let readings = walk(&artefacts, None);
    trace!("Serving `{}` read as {:?}", fragment.string(), readings);

    readings
        .into_iter()
        .filter_map(|(attribute, reading, source)| {
            let text = sources.get(source)?;
            Some(Observation::reading(attribute, reading, (*text).clone()))
        })
        .collect()
}

/// A value of the result with the fragment it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub value: T,
    pub text_id: Option<Uuid>,
}

impl<T> Sourced<T> {
    pub fn new(value: T, text_id: Option<Uuid>) -> Self {
        Self { value, text_id }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquivalentSize {
    pub amount: Option<Sourced<f64>>,
    pub unit: Option<Sourced<NutritionUnit>>,
    pub unit_name: Option<Sourced<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerContainer {
    pub amount: Option<Sourced<f64>>,
    pub name: Option<Sourced<String>>,
}

/// The serving a label describes, or the serving a column header refers to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServingDescriptor {
    pub amount: Option<Sourced<f64>>,
    pub unit: Option<Sourced<NutritionUnit>>,
    pub unit_name: Option<Sourced<String>>,
    pub equivalent_size: Option<EquivalentSize>,
    pub per_container: Option<PerContainer>,
}

impl ServingDescriptor {
    /// Assembles the descriptor from serving readings, keeping the first
    /// reading of each kind. `None` when nothing was read.
    pub fn from_observations<'a>(observations: impl IntoIterator<Item = &'a Observation>) -> Option<Self> {
        let mut descriptor = ServingDescriptor::default();
        let mut equivalent = EquivalentSize::default();
        let mut per_container = PerContainer::default();

        for observation in observations {
            let Observation::Reading {
                attribute,
                reading,
                text,
            } = observation
            else {
                continue;
            };
            let id = Some(text.id);
            use Attribute::*;
            match (attribute, reading) {
                (ServingAmount | HeaderServingAmount, Reading::Amount(amount)) => {
                    descriptor.amount.get_or_insert(Sourced::new(*amount, id));
                }
                (ServingUnit | HeaderServingUnit, Reading::Unit(unit)) => {
                    descriptor.unit.get_or_insert(Sourced::new(*unit, id));
                }
                (ServingUnitSize | HeaderServingUnitSize, Reading::Name(name)) => {
                    descriptor.unit_name.get_or_insert(Sourced::new(name.clone(), id));
                }
                (ServingEquivalentAmount | HeaderServingEquivalentAmount, Reading::Amount(amount)) => {
                    equivalent.amount.get_or_insert(Sourced::new(*amount, id));
                }
                (ServingEquivalentUnit | HeaderServingEquivalentUnit, Reading::Unit(unit)) => {
                    equivalent.unit.get_or_insert(Sourced::new(*unit, id));
                }
                (
                    ServingEquivalentUnitSize | HeaderServingEquivalentUnitSize,
                    Reading::Name(name),
                ) => {
                    equivalent.unit_name.get_or_insert(Sourced::new(name.clone(), id));
                }
                (ServingsPerContainerAmount, Reading::Amount(amount)) => {
                    per_container.amount.get_or_insert(Sourced::new(*amount, id));
                }
                (ServingsPerContainerName, Reading::Name(name)) => {
                    per_container.name.get_or_insert(Sourced::new(name.clone(), id));
                }
                _ => {}
            }
        }

        if equivalent != EquivalentSize::default() {
            descriptor.equivalent_size = Some(equivalent);
        }
        if per_container != PerContainer::default() {
            descriptor.per_container = Some(per_container);
        }
        (descriptor != ServingDescriptor::default()).then_some(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::bbox::Bbox;

    fn readings(text: &str) -> Vec<(Attribute, Reading)> {
        walk_text(text, None)
    }

    #[test]
    fn test_serving_size_with_equivalent() {
        assert_eq!(
            readings("Serving Size 1/2 cup (88g)"),
            vec![
                (Attribute::ServingAmount, Reading::Amount(0.5)),
                (Attribute::ServingUnitSize, Reading::Name("cup".into())),
                (Attribute::ServingEquivalentAmount, Reading::Amount(88.0)),
                (Attribute::ServingEquivalentUnit, Reading::Unit(NutritionUnit::G)),
            ]
        );
    }

    #[test]
    fn test_serving_size_with_unit_and_named_equivalent() {
        assert_eq!(
            readings("Serving size: 30g (2 biscuits)"),
            vec![
                (Attribute::ServingAmount, Reading::Amount(30.0)),
                (Attribute::ServingUnit, Reading::Unit(NutritionUnit::G)),
                (Attribute::ServingEquivalentAmount, Reading::Amount(2.0)),
                (
                    Attribute::ServingEquivalentUnitSize,
                    Reading::Name("biscuits".into())
                ),
            ]
        );
    }

    #[test]
    fn test_servings_per_container() {
        let expected = vec![
            (Attribute::ServingsPerContainerAmount, Reading::Amount(8.0)),
            (
                Attribute::ServingsPerContainerName,
                Reading::Name("container".into()),
            ),
        ];
        assert_eq!(readings("About 8 servings per container"), expected);

        let mut reversed = readings("Servings per container: 8");
        reversed.sort_by_key(|(attribute, _)| *attribute);
        assert_eq!(reversed, expected);

        assert_eq!(
            readings("8 servings per pack"),
            vec![
                (Attribute::ServingsPerContainerAmount, Reading::Amount(8.0)),
                (Attribute::ServingsPerContainerName, Reading::Name("pack".into())),
            ]
        );
    }

    #[test]
    fn test_walk_with_header_start() {
        assert_eq!(
            walk_text("(30g)", Some(Attribute::HeaderType1)),
            vec![
                (Attribute::HeaderServingAmount, Reading::Amount(30.0)),
                (Attribute::HeaderServingUnit, Reading::Unit(NutritionUnit::G)),
            ]
        );
    }

    #[test]
    fn test_read_serving_appends_row_continuation() {
        let label = RecognizedText::new(Bbox::from_xywh(0.1, 0.2, 0.2, 0.04), vec!["Serving Size".into()]);
        let amount = RecognizedText::new(Bbox::from_xywh(0.5, 0.2, 0.2, 0.04), vec!["1 cup (240ml)".into()]);
        let elsewhere = RecognizedText::new(Bbox::from_xywh(0.5, 0.6, 0.2, 0.04), vec!["5g".into()]);
        let texts = vec![label.clone(), amount.clone(), elsewhere];

        let observations = read_serving(&label, &texts);
        let descriptor = ServingDescriptor::from_observations(&observations).unwrap();
        assert_eq!(descriptor.amount, Some(Sourced::new(1.0, Some(amount.id))));
        assert_eq!(descriptor.unit_name.map(|name| name.value), Some("cup".to_string()));
        let equivalent = descriptor.equivalent_size.unwrap();
        assert_eq!(equivalent.amount.map(|amount| amount.value), Some(240.0));
        assert_eq!(equivalent.unit.map(|unit| unit.value), Some(NutritionUnit::Ml));
        assert!(descriptor.per_container.is_none());
    }

    #[test]
    fn test_descriptor_from_nothing() {
        assert!(ServingDescriptor::from_observations(&[]).is_none());
        assert!(is_serving_text("Serving Size 1 cup"));
        assert!(!is_serving_text("Protein"));
    }
}
