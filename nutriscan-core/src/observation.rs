use serde::{Deserialize, Serialize};

use crate::{
    detect::{attribute::Attribute, header::HeaderType, unit::NutritionUnit},
    recognition::RecognizedText,
    text::{AttributeText, ValueText},
};

/// One extracted fact with the fragments it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Observation {
    /// A row of the nutrition table.
    Nutrient {
        attribute: Attribute,
        /// The printed label, `None` for rows solved from the energy equation.
        label: Option<AttributeText>,
        value1: Option<ValueText>,
        value2: Option<ValueText>,
    },
    /// A serving or header fact, which is not tabular.
    Reading {
        attribute: Attribute,
        reading: Reading,
        text: RecognizedText,
    },
}

/// The scalar or string carried by a [`Observation::Reading`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    Amount(f64),
    Unit(NutritionUnit),
    Name(String),
    Header(HeaderType),
}

impl Observation {
    pub fn nutrient(attribute: AttributeText, value1: Option<ValueText>, value2: Option<ValueText>) -> Self {
        Observation::Nutrient {
            attribute: attribute.attribute,
            label: Some(attribute),
            value1,
            value2,
        }
    }

    /// A nutrient row with no printed label.
    pub fn unlabelled(attribute: Attribute, value1: Option<ValueText>, value2: Option<ValueText>) -> Self {
        Observation::Nutrient {
            attribute,
            label: None,
            value1,
            value2,
        }
    }

    pub fn reading(attribute: Attribute, reading: Reading, text: RecognizedText) -> Self {
        Observation::Reading {
            attribute,
            reading,
            text,
        }
    }

    pub fn attribute(&self) -> Attribute {
        match self {
            Observation::Nutrient { attribute, .. } => *attribute,
            Observation::Reading { attribute, .. } => *attribute,
        }
    }

    /// The first value of a nutrient row.
    pub fn value1(&self) -> Option<&ValueText> {
        match self {
            Observation::Nutrient { value1, .. } => value1.as_ref(),
            Observation::Reading { .. } => None,
        }
    }

    pub fn value2(&self) -> Option<&ValueText> {
        match self {
            Observation::Nutrient { value2, .. } => value2.as_ref(),
            Observation::Reading { .. } => None,
        }
    }

    /// A nutrient row holding at least one value.
    pub fn is_populated_nutrient(&self) -> bool {
        matches!(self, Observation::Nutrient { .. })
            && (self.value1().is_some() || self.value2().is_some())
    }
}

/// Populated nutrient rows of `observations`.
pub fn populated_nutrient_count(observations: &[Observation]) -> usize {
    observations
        .iter()
        .filter(|observation| observation.is_populated_nutrient())
        .count()
}

/// The first value of `attribute` for the given slot (0 or 1).
pub fn value_of(observations: &[Observation], attribute: Attribute, slot: usize) -> Option<&ValueText> {
    observations
        .iter()
        .filter(|observation| observation.attribute() == attribute)
        .find_map(|observation| match slot {
            0 => observation.value1(),
            _ => observation.value2(),
        })
}
