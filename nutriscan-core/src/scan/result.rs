use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    detect::{
        attribute::Attribute,
        header::{HeaderText, HeaderType},
        serving::ServingDescriptor,
        unit::NutritionUnit,
    },
    observation::Observation,
    recognition::RecognizedText,
    text::{AttributeText, ValueText},
};

/// How the nutrient rows were read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    Inline,
    Tabular,
}

/// Everything read off one label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub serving: Option<ServingDescriptor>,
    pub nutrients: Option<Nutrients>,
    pub strategy: Option<Strategy>,
    /// Every fragment of the label, as recognized.
    pub texts: Vec<RecognizedText>,
}

impl ScanResult {
    /// The row of `attribute`, if one was read.
    pub fn nutrient(&self, attribute: Attribute) -> Option<&NutrientRow> {
        self.nutrients
            .as_ref()?
            .rows
            .iter()
            .find(|row| row.attribute == attribute)
    }
}

/// The nutrition table with the headers of its value columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrients {
    pub header1: Option<Header>,
    pub header2: Option<Header>,
    pub rows: Vec<NutrientRow>,
}

impl Nutrients {
    /// `None` when no observation is a populated nutrient row.
    pub fn from_observations(observations: &[Observation], headers: [Option<HeaderText>; 2]) -> Option<Self> {
        let rows: Vec<NutrientRow> = observations.iter().filter_map(NutrientRow::from_observation).collect();
        if rows.is_empty() {
            return None;
        }
        let [header1, header2] = headers.map(|header| header.map(Header::from));
        Some(Self {
            header1,
            header2,
            rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub header_type: HeaderType,
    pub serving: Option<ServingDescriptor>,
    pub text_id: Uuid,
}

impl From<HeaderText> for Header {
    fn from(header: HeaderText) -> Self {
        Self {
            header_type: header.header_type,
            serving: header.serving,
            text_id: header.text.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientRow {
    pub attribute: Attribute,
    /// `None` for rows solved from the energy equation.
    pub attribute_text_id: Option<Uuid>,
    pub value1: Option<NutrientValue>,
    pub value2: Option<NutrientValue>,
}

impl NutrientRow {
    fn from_observation(observation: &Observation) -> Option<Self> {
        let Observation::Nutrient {
            attribute,
            label,
            value1,
            value2,
        } = observation
        else {
            return None;
        };
        let to_value = |value: &Option<ValueText>| {
            value
                .as_ref()
                .map(|value| NutrientValue::from_value_text(value, *attribute))
        };
        let row = Self {
            attribute: *attribute,
            attribute_text_id: label.as_ref().map(AttributeText::id),
            value1: to_value(value1),
            value2: to_value(value2),
        };
        (row.value1.is_some() || row.value2.is_some()).then_some(row)
    }
}

/// An amount of the result. `text_id` is `None` for computed amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientValue {
    pub amount: f64,
    pub unit: Option<NutritionUnit>,
    pub text_id: Option<Uuid>,
}

impl NutrientValue {
    /// A missing unit becomes the attribute's default unit.
    pub fn from_value_text(value: &ValueText, attribute: Attribute) -> Self {
        let unit = value.value.unit.or_else(|| {
            attribute
                .default_unit()
                .filter(|unit| attribute.supports_unit(Some(*unit)))
        });
        Self {
            amount: value.value.amount,
            unit,
            text_id: value.text_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::bbox::Bbox, detect::value::Value};

    #[test]
    fn test_nutrients_from_observations() {
        let energy = RecognizedText::new(Bbox::from_xywh(0.1, 0.1, 0.3, 0.03), vec!["Calories 150".into()]);
        let fat = RecognizedText::new(Bbox::from_xywh(0.1, 0.2, 0.3, 0.03), vec!["Fat".into()]);
        let observations = vec![
            Observation::nutrient(
                AttributeText::new(Attribute::Energy, energy.clone()),
                Some(ValueText::new(Value::new(150.0, None), Some(energy.clone()))),
                Some(ValueText::new(Value::new(300.0, None), None)),
            ),
            Observation::nutrient(AttributeText::new(Attribute::Fat, fat), None, None),
        ];

        let nutrients = Nutrients::from_observations(&observations, [None, None]).unwrap();
        assert_eq!(nutrients.rows.len(), 1);
        let row = &nutrients.rows[0];
        assert_eq!(row.attribute_text_id, Some(energy.id));
        assert_eq!(
            row.value1,
            Some(NutrientValue {
                amount: 150.0,
                unit: Some(NutritionUnit::Kcal),
                text_id: Some(energy.id),
            })
        );
        assert_eq!(row.value2.as_ref().and_then(|value| value.text_id), None);

        assert!(Nutrients::from_observations(&observations[1..], [None, None]).is_none());
    }
}
