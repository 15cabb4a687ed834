use crate::{
    consts::{KCAL_PER_G_CARBOHYDRATE, KCAL_PER_G_FAT, KCAL_PER_G_PROTEIN},
    detect::{attribute::Attribute, unit::NutritionUnit, value::Value},
    observation::{Observation, value_of},
};

/// Kilocalories provided by the given grams of the three macronutrients.
pub fn calculated_kcal(carbohydrate: f64, protein: f64, fat: f64) -> f64 {
    KCAL_PER_G_CARBOHYDRATE * carbohydrate + KCAL_PER_G_PROTEIN * protein + KCAL_PER_G_FAT * fat
}

/// Rounds a computed amount to what a label would print: three decimals
/// below 0.02, two otherwise.
pub fn round_amount(amount: f64) -> f64 {
    let scale = if amount.abs() < 0.02 { 1000.0 } else { 100.0 };
    (amount * scale).round() / scale
}

/// The four readings the energy equation ties together, energy in
/// kilocalories and the macronutrients in grams.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyEquation {
    pub energy: Option<f64>,
    pub carbohydrate: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
}

impl EnergyEquation {
    /// Converts printed values; a missing unit reads as the attribute's default.
    pub fn from_values(
        energy: Option<Value>,
        carbohydrate: Option<Value>,
        protein: Option<Value>,
        fat: Option<Value>,
    ) -> Self {
        let grams = |value: Option<Value>| value.and_then(|value| value.grams(Some(NutritionUnit::G)));
        Self {
            energy: energy.and_then(|value| value.kcal()),
            carbohydrate: grams(carbohydrate),
            protein: grams(protein),
            fat: grams(fat),
        }
    }

    /// The equation over the values of one column of `observations`.
    pub fn from_observations(observations: &[Observation], slot: usize) -> Self {
        let value = |attribute| value_of(observations, attribute, slot).map(|text| text.value);
        Self::from_values(
            value(Attribute::Energy),
            value(Attribute::Carbohydrate),
            value(Attribute::Protein),
            value(Attribute::Fat),
        )
    }

    /// Relative distance of the printed energy from the calculated one.
    pub fn error(&self) -> Option<f64> {
        let calculated = calculated_kcal(self.carbohydrate?, self.protein?, self.fat?);
        let energy = self.energy?;
        if calculated <= 0.0 {
            return (energy == 0.0).then_some(0.0);
        }
        Some(((energy - calculated) / calculated).abs())
    }

    /// Whether all four readings are present and agree within `threshold`.
    pub fn is_satisfied(&self, threshold: f64) -> bool {
        self.error().is_some_and(|error| error <= threshold)
    }

    /// The single missing reading, solved from the other three.
    ///
    /// Energy comes back in kilocalories and macronutrients in grams, rounded.
    /// A negative solution means the printed readings disagree and yields `None`.
    pub fn missing(&self) -> Option<(Attribute, f64)> {
        let (attribute, amount) = match (self.energy, self.carbohydrate, self.protein, self.fat) {
            (None, Some(c), Some(p), Some(f)) => (Attribute::Energy, calculated_kcal(c, p, f)),
            (Some(e), None, Some(p), Some(f)) => (
                Attribute::Carbohydrate,
                (e - KCAL_PER_G_PROTEIN * p - KCAL_PER_G_FAT * f) / KCAL_PER_G_CARBOHYDRATE,
            ),
            (Some(e), Some(c), None, Some(f)) => (
                Attribute::Protein,
                (e - KCAL_PER_G_CARBOHYDRATE * c - KCAL_PER_G_FAT * f) / KCAL_PER_G_PROTEIN,
            ),
            (Some(e), Some(c), Some(p), None) => (
                Attribute::Fat,
                (e - KCAL_PER_G_CARBOHYDRATE * c - KCAL_PER_G_PROTEIN * p) / KCAL_PER_G_FAT,
            ),
            _ => return None,
        };
        (amount >= 0.0).then(|| (attribute, round_amount(amount)))
    }
}
