use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    analysis::bbox::Bbox,
    detect::{
        attribute::Attribute,
        value::{Value, is_less_than_prefixed},
    },
    recognition::RecognizedText,
};

/// An attribute read from a fragment.
///
/// Labels printed over several lines ("Total" / "Fat") merge the extra
/// fragments into `texts`; `text` stays the fragment the attribute was
/// detected in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeText {
    pub attribute: Attribute,
    pub text: RecognizedText,
    pub texts: Vec<RecognizedText>,
}

impl AttributeText {
    pub fn new(attribute: Attribute, text: RecognizedText) -> Self {
        Self {
            attribute,
            texts: vec![text.clone()],
            text,
        }
    }

    /// Every attribute found in `text`, one entry per attribute.
    pub fn detect(text: &RecognizedText) -> Vec<AttributeText> {
        Attribute::detect(&text.normalized_string())
            .into_iter()
            .map(|attribute| AttributeText::new(attribute, text.clone()))
            .collect()
    }

    /// Rectangle covering every merged fragment.
    pub fn rect(&self) -> Bbox {
        Bbox::union_all(self.texts.iter().map(|text| &text.rect)).unwrap_or(self.text.rect)
    }

    pub fn id(&self) -> Uuid {
        self.text.id
    }

    pub fn contains_text(&self, id: Uuid) -> bool {
        self.texts.iter().any(|text| text.id == id)
    }

    /// Adds a fragment continuing this label on another line.
    pub fn merge(&mut self, text: RecognizedText) {
        if !self.contains_text(text.id) {
            self.texts.push(text);
        }
    }
}

/// A fragment together with the values read from it.
///
/// Values come from the first candidate that yields any; the other readings
/// are only looked at through [`ValuesText::alternate_values`]. A fragment
/// without values is never wrapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuesText {
    pub text: RecognizedText,
    pub values: Vec<Value>,
    /// Index of the value this entry was split from, for fragments carrying
    /// the readings of two columns.
    pub part: Option<usize>,
    /// Index of the candidate reading `values` came from.
    #[serde(default)]
    pub candidate: usize,
}

impl ValuesText {
    pub fn new(text: &RecognizedText) -> Option<Self> {
        let (candidate, values) = text
            .normalized_candidates()
            .map(|candidate| Value::detect(&candidate))
            .enumerate()
            .find(|(_, values)| !values.is_empty())?;
        Some(Self {
            text: text.clone(),
            values,
            part: None,
            candidate,
        })
    }

    /// Wraps `text` with explicitly chosen values, `None` when `values` is empty.
    pub fn with_values(text: RecognizedText, values: Vec<Value>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            text,
            values,
            part: None,
            candidate: 0,
        })
    }

    /// Same fragment, different values, keeping the split marker.
    pub fn replace_values(&self, values: Vec<Value>) -> Option<Self> {
        let mut replaced = Self::with_values(self.text.clone(), values)?;
        replaced.part = self.part;
        replaced.candidate = self.candidate;
        Some(replaced)
    }

    /// Same fragment read through another candidate.
    pub fn from_candidate(&self, candidate: usize, values: Vec<Value>) -> Option<Self> {
        let mut replaced = self.replace_values(values)?;
        replaced.candidate = candidate;
        Some(replaced)
    }

    /// The entry for value `index` of a multi-value fragment.
    pub fn split(&self, index: usize) -> Option<Self> {
        let value = *self.values.get(index)?;
        Some(Self {
            text: self.text.clone(),
            values: vec![value],
            part: Some(index),
            candidate: self.candidate,
        })
    }

    pub fn id(&self) -> Uuid {
        self.text.id
    }

    pub fn rect(&self) -> Bbox {
        self.text.rect
    }

    pub fn string(&self) -> &str {
        self.text.string()
    }

    pub fn is_single_value(&self) -> bool {
        self.values.len() == 1
    }

    pub fn single_value(&self) -> Option<Value> {
        match self.values.as_slice() {
            [value] => Some(*value),
            _ => None,
        }
    }

    pub fn has_energy_value(&self) -> bool {
        self.values.iter().any(Value::has_energy_unit)
    }

    pub fn nutrient_unit_count(&self) -> usize {
        self.values.iter().filter(|value| value.has_nutrient_unit()).count()
    }

    /// A lone percentage ("12%") never anchors a value column.
    pub fn is_percent_only(&self) -> bool {
        self.single_value().is_some_and(|value| value.is_percent())
    }

    pub fn is_less_than(&self) -> bool {
        is_less_than_prefixed(&self.text.normalized_string())
    }

    /// Values of every candidate other than the one in use, with the
    /// candidate index. Readings without values are skipped.
    pub fn alternate_values(&self) -> Vec<(usize, Vec<Value>)> {
        self.text
            .normalized_candidates()
            .enumerate()
            .filter(|(index, _)| *index != self.candidate)
            .map(|(index, candidate)| (index, Value::detect(&candidate)))
            .filter(|(_, values)| !values.is_empty())
            .collect()
    }

    /// Whether both entries stand for the same reading of the same fragment.
    pub fn is_same_reading(&self, other: &ValuesText) -> bool {
        self.id() == other.id() && self.part == other.part
    }
}

/// A value cell of the grid.
///
/// Values filled in from the column ratio or the energy equation have no
/// source fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSlot {
    Recognized(ValuesText),
    Computed(Value),
}

impl ValueSlot {
    pub fn values(&self) -> &[Value] {
        match self {
            ValueSlot::Recognized(text) => &text.values,
            ValueSlot::Computed(value) => std::slice::from_ref(value),
        }
    }

    pub fn single_value(&self) -> Option<Value> {
        match self.values() {
            [value] => Some(*value),
            _ => None,
        }
    }

    pub fn has_multiple_values(&self) -> bool {
        self.values().len() > 1
    }

    pub fn values_text(&self) -> Option<&ValuesText> {
        match self {
            ValueSlot::Recognized(text) => Some(text),
            ValueSlot::Computed(_) => None,
        }
    }

    pub fn text(&self) -> Option<&RecognizedText> {
        self.values_text().map(|values| &values.text)
    }

    pub fn rect(&self) -> Option<Bbox> {
        self.text().map(|text| text.rect)
    }

    pub fn is_less_than(&self) -> bool {
        self.values_text().is_some_and(ValuesText::is_less_than)
    }
}

/// A single value bound to the fragment it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueText {
    pub value: Value,
    pub text: Option<RecognizedText>,
}

impl ValueText {
    pub fn new(value: Value, text: Option<RecognizedText>) -> Self {
        Self { value, text }
    }

    /// The settled value of a cell, `None` while it still holds several.
    pub fn from_slot(slot: &ValueSlot) -> Option<Self> {
        let value = slot.single_value()?;
        Some(Self::new(value, slot.text().cloned()))
    }

    pub fn text_id(&self) -> Option<Uuid> {
        self.text.as_ref().map(|text| text.id)
    }
}
