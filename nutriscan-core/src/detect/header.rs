use std::{ops::Range, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::bbox::Bbox,
    detect::{
        attribute::Attribute,
        serving::{ServingDescriptor, is_serving_text, walk_text},
        value::normalize_numerals,
    },
    observation::{Observation, Reading},
    recognition::RecognizedText,
};

/// What the amounts of a value column refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaderType {
    Per100g,
    Per100ml,
    PerServing,
    Per100gAndPerServing,
    PerServingAndPer100g,
}

static PER_100: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(per\s+)?100\s*(?P<unit>g|ml)\b").unwrap());

static PER_SERVING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bamount\s+per\s+serv(e|ing)\b|\bper\s+serv(e|ing)\b|\bper\s+portion\b|\bper\s+(\d+(\.\d+)?|\.\d+)\s*[a-z(]")
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq)]
enum Marker {
    Per100g,
    Per100ml,
    PerServing,
}

impl HeaderType {
    /// The header kind printed in `text`, if any.
    ///
    /// # Example
    /// ```
    /// use nutriscan_core::detect::header::HeaderType;
    /// assert_eq!(HeaderType::detect("Per 100g"), Some(HeaderType::Per100g));
    /// assert_eq!(HeaderType::detect("Per serving"), Some(HeaderType::PerServing));
    /// assert_eq!(HeaderType::detect("Per serve Per 100g"), Some(HeaderType::PerServingAndPer100g));
    /// assert_eq!(HeaderType::detect("Protein"), None);
    /// ```
    pub fn detect(text: &str) -> Option<HeaderType> {
        let normalized = normalize_numerals(text);
        let mut markers: Vec<Marker> = markers(&normalized)
            .into_iter()
            .map(|(marker, _)| marker)
            .collect();
        markers.dedup();

        let is_per_100 = |marker: &Marker| matches!(marker, Marker::Per100g | Marker::Per100ml);
        match markers.as_slice() {
            [] => None,
            [Marker::Per100g] => Some(HeaderType::Per100g),
            [Marker::Per100ml] => Some(HeaderType::Per100ml),
            [Marker::PerServing] => Some(HeaderType::PerServing),
            [first, second, ..] if is_per_100(first) && !is_per_100(second) => {
                Some(HeaderType::Per100gAndPerServing)
            }
            [first, second, ..] if !is_per_100(first) && is_per_100(second) => {
                Some(HeaderType::PerServingAndPer100g)
            }
            [first, ..] if is_per_100(first) => Some(HeaderType::Per100g),
            [..] => Some(HeaderType::PerServing),
        }
    }

    pub const fn refers_to_serving(&self) -> bool {
        !matches!(self, HeaderType::Per100g | HeaderType::Per100ml)
    }
}

fn markers(normalized: &str) -> Vec<(Marker, Range<usize>)> {
    let mut found: Vec<(Marker, Range<usize>)> = PER_100
        .captures_iter(normalized)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let marker = match caps.name("unit").map(|unit| unit.as_str()) {
                Some("ml") => Marker::Per100ml,
                _ => Marker::Per100g,
            };
            Some((marker, whole.range()))
        })
        .collect();

    for serving in PER_SERVING.find_iter(normalized) {
        let range = serving.range();
        let overlaps = found
            .iter()
            .any(|(_, other)| range.start < other.end && other.start < range.end);
        if !overlaps {
            found.push((Marker::PerServing, range));
        }
    }

    found.sort_by_key(|(_, range)| range.start);
    found
}

/// A column header read from a fragment, with the serving it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderText {
    pub header_type: HeaderType,
    pub serving: Option<ServingDescriptor>,
    pub text: RecognizedText,
}

impl HeaderText {
    /// Reads a header from `text`; serving descriptions are not headers even
    /// when they mention an amount of 100 g.
    pub fn detect(text: &RecognizedText) -> Option<HeaderText> {
        let string = text.normalized_string();
        if is_serving_text(&string) {
            return None;
        }
        let header_type = HeaderType::detect(&string)?;
        let serving = match header_type.refers_to_serving() {
            true => header_serving(&string, text),
            false => None,
        };

        Some(HeaderText {
            header_type,
            serving,
            text: text.clone(),
        })
    }

    pub fn rect(&self) -> Bbox {
        self.text.rect
    }

    /// The header as a reading for column `slot` (0 or 1).
    pub fn observation(&self, slot: usize) -> Observation {
        let attribute = match slot {
            0 => Attribute::HeaderType1,
            _ => Attribute::HeaderType2,
        };
        Observation::reading(attribute, Reading::Header(self.header_type), self.text.clone())
    }
}

/// The serving a "per serving" header names ("Per 1/2 cup (125 ml)").
fn header_serving(string: &str, text: &RecognizedText) -> Option<ServingDescriptor> {
    let mut normalized = normalize_numerals(string);
    // the per-100 part of a combined header is not a serving amount
    for (marker, range) in markers(&normalized).into_iter().rev() {
        if marker != Marker::PerServing {
            normalized.replace_range(range, "");
        }
    }

    let observations: Vec<Observation> = walk_text(&normalized, Some(Attribute::HeaderType1))
        .into_iter()
        .map(|(attribute, reading)| Observation::reading(attribute, reading, text.clone()))
        .collect();
    ServingDescriptor::from_observations(&observations)
}

/// Every header fragment of the label, top to bottom.
pub fn detect_headers(texts: &[RecognizedText]) -> Vec<HeaderText> {
    let mut headers: Vec<HeaderText> = texts.iter().filter_map(HeaderText::detect).collect();
    headers.sort_by(|a, b| a.rect().min.y.total_cmp(&b.rect().min.y));
    headers
}

/// Assigns each header to the value column whose centre is horizontally
/// closest; the first header wins a column.
pub fn assign_to_columns(headers: &[HeaderText], column_rects: &[Bbox]) -> [Option<HeaderText>; 2] {
    let mut assigned: [Option<HeaderText>; 2] = [None, None];
    for header in headers {
        let center = header.rect().center().x;
        let nearest = column_rects
            .iter()
            .take(2)
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a.center().x - center)
                    .abs()
                    .total_cmp(&(b.center().x - center).abs())
            })
            .map(|(index, _)| index);
        if let Some(index) = nearest {
            if assigned[index].is_none() {
                assigned[index] = Some(header.clone());
            }
        }
    }
    assigned
}

/// Assigns headers to the value columns in reading order.
pub fn assign_left_to_right(headers: &[HeaderText]) -> [Option<HeaderText>; 2] {
    let mut sorted: Vec<&HeaderText> = headers.iter().collect();
    sorted.sort_by(|a, b| a.rect().min.x.total_cmp(&b.rect().min.x));
    let mut sorted = sorted.into_iter().cloned();
    [sorted.next(), sorted.next()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::unit::NutritionUnit;

    fn fragment(x: f32, string: &str) -> RecognizedText {
        RecognizedText::new(Bbox::from_xywh(x, 0.1, 0.15, 0.04), vec![string.to_string()])
    }

    #[test]
    fn test_header_type_detect() {
        assert_eq!(HeaderType::detect("per 100 ml"), Some(HeaderType::Per100ml));
        assert_eq!(HeaderType::detect("100g"), Some(HeaderType::Per100g));
        assert_eq!(HeaderType::detect("Amount Per Serving"), Some(HeaderType::PerServing));
        assert_eq!(HeaderType::detect("Per 1/2 cup (125 ml)"), Some(HeaderType::PerServing));
        assert_eq!(
            HeaderType::detect("Per 100g Per serving"),
            Some(HeaderType::Per100gAndPerServing)
        );
        assert_eq!(HeaderType::detect("Total Fat 3g"), None);
    }

    #[test]
    fn test_header_text_serving() {
        let header = HeaderText::detect(&fragment(0.5, "Per 1/2 cup (125 ml)")).unwrap();
        assert_eq!(header.header_type, HeaderType::PerServing);
        let serving = header.serving.unwrap();
        assert_eq!(serving.amount.map(|amount| amount.value), Some(0.5));
        assert_eq!(serving.unit_name.map(|name| name.value), Some("cup".to_string()));
        let equivalent = serving.equivalent_size.unwrap();
        assert_eq!(equivalent.amount.map(|amount| amount.value), Some(125.0));
        assert_eq!(equivalent.unit.map(|unit| unit.value), Some(NutritionUnit::Ml));

        let combined = HeaderText::detect(&fragment(0.5, "Per serve (30g) Per 100g")).unwrap();
        let serving = combined.serving.unwrap();
        assert_eq!(serving.amount.map(|amount| amount.value), Some(30.0));
        assert!(serving.equivalent_size.is_none());

        assert!(HeaderText::detect(&fragment(0.5, "Per 100g")).unwrap().serving.is_none());
        assert!(HeaderText::detect(&fragment(0.1, "Serving size 100g")).is_none());
    }

    #[test]
    fn test_assign_headers() {
        let per_serving = HeaderText::detect(&fragment(0.45, "Per serving")).unwrap();
        let per_100 = HeaderText::detect(&fragment(0.7, "Per 100g")).unwrap();
        let headers = vec![per_100.clone(), per_serving.clone()];

        let columns = [Bbox::from_xywh(0.5, 0.2, 0.1, 0.5), Bbox::from_xywh(0.75, 0.2, 0.1, 0.5)];
        let assigned = assign_to_columns(&headers, &columns);
        assert_eq!(assigned[0].as_ref(), Some(&per_serving));
        assert_eq!(assigned[1].as_ref(), Some(&per_100));

        let assigned = assign_left_to_right(&headers);
        assert_eq!(assigned[0].as_ref(), Some(&per_serving));
        assert_eq!(assigned[1].as_ref(), Some(&per_100));

        assert_eq!(
            per_100.observation(1).attribute(),
            Attribute::HeaderType2
        );
    }
}
