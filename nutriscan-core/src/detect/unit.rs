use serde::{Deserialize, Serialize};

use crate::consts::KJ_PER_KCAL;

/// Units printed next to amounts on a nutrition label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NutritionUnit {
    Mcg,
    Mg,
    G,
    Kj,
    Kcal,
    Percent,
    Ml,
    Iu,
}

/// Unit tokens recognised right after a numeral, matched against the whole
/// lowercase token. Order does not matter; tokens are unique.
pub const UNIT_TOKENS: &[(&str, NutritionUnit)] = &[
    ("mcg", NutritionUnit::Mcg),
    ("µg", NutritionUnit::Mcg),
    ("μg", NutritionUnit::Mcg),
    ("ug", NutritionUnit::Mcg),
    ("microgram", NutritionUnit::Mcg),
    ("micrograms", NutritionUnit::Mcg),
    ("mg", NutritionUnit::Mg),
    ("milligram", NutritionUnit::Mg),
    ("milligrams", NutritionUnit::Mg),
    ("g", NutritionUnit::G),
    ("gm", NutritionUnit::G),
    ("gr", NutritionUnit::G),
    ("gram", NutritionUnit::G),
    ("grams", NutritionUnit::G),
    ("kj", NutritionUnit::Kj),
    ("kilojoule", NutritionUnit::Kj),
    ("kilojoules", NutritionUnit::Kj),
    ("kcal", NutritionUnit::Kcal),
    ("kcals", NutritionUnit::Kcal),
    ("cal", NutritionUnit::Kcal),
    ("cals", NutritionUnit::Kcal),
    ("calorie", NutritionUnit::Kcal),
    ("calories", NutritionUnit::Kcal),
    ("kilocalorie", NutritionUnit::Kcal),
    ("kilocalories", NutritionUnit::Kcal),
    ("%", NutritionUnit::Percent),
    ("ml", NutritionUnit::Ml),
    ("mls", NutritionUnit::Ml),
    ("millilitre", NutritionUnit::Ml),
    ("milliliter", NutritionUnit::Ml),
    ("millilitres", NutritionUnit::Ml),
    ("milliliters", NutritionUnit::Ml),
    ("iu", NutritionUnit::Iu),
];

impl NutritionUnit {
    /// Looks a token up in [`UNIT_TOKENS`], ignoring case and trailing dots.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim_end_matches('.').to_lowercase();
        UNIT_TOKENS
            .iter()
            .find(|(candidate, _)| *candidate == token)
            .map(|(_, unit)| *unit)
    }

    pub const fn is_energy(&self) -> bool {
        matches!(self, NutritionUnit::Kj | NutritionUnit::Kcal)
    }

    pub const fn is_mass(&self) -> bool {
        matches!(self, NutritionUnit::Mcg | NutritionUnit::Mg | NutritionUnit::G)
    }

    /// Units that describe an amount of a nutrient (mass or energy).
    pub const fn is_nutrient_unit(&self) -> bool {
        self.is_mass() || self.is_energy()
    }

    /// Grams in one of this unit, for mass units.
    pub const fn grams_factor(&self) -> Option<f64> {
        match self {
            NutritionUnit::Mcg => Some(0.000_001),
            NutritionUnit::Mg => Some(0.001),
            NutritionUnit::G => Some(1.0),
            _ => None,
        }
    }

    /// Converts an energy amount between kilojoules and kilocalories.
    pub fn convert_energy(amount: f64, from: NutritionUnit, to: NutritionUnit) -> Option<f64> {
        match (from, to) {
            (NutritionUnit::Kj, NutritionUnit::Kj) | (NutritionUnit::Kcal, NutritionUnit::Kcal) => {
                Some(amount)
            }
            (NutritionUnit::Kcal, NutritionUnit::Kj) => Some(amount * KJ_PER_KCAL),
            (NutritionUnit::Kj, NutritionUnit::Kcal) => Some(amount / KJ_PER_KCAL),
            _ => None,
        }
    }

    pub const fn symbol(&self) -> &'static str {
        match self {
            NutritionUnit::Mcg => "mcg",
            NutritionUnit::Mg => "mg",
            NutritionUnit::G => "g",
            NutritionUnit::Kj => "kJ",
            NutritionUnit::Kcal => "kcal",
            NutritionUnit::Percent => "%",
            NutritionUnit::Ml => "ml",
            NutritionUnit::Iu => "IU",
        }
    }
}

impl std::fmt::Display for NutritionUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_from_token() {
        assert_eq!(NutritionUnit::from_token("g"), Some(NutritionUnit::G));
        assert_eq!(NutritionUnit::from_token("MG"), Some(NutritionUnit::Mg));
        assert_eq!(NutritionUnit::from_token("µg"), Some(NutritionUnit::Mcg));
        assert_eq!(NutritionUnit::from_token("kJ"), Some(NutritionUnit::Kj));
        assert_eq!(NutritionUnit::from_token("Calories"), Some(NutritionUnit::Kcal));
        assert_eq!(NutritionUnit::from_token("g."), Some(NutritionUnit::G));
        assert_eq!(NutritionUnit::from_token("%"), Some(NutritionUnit::Percent));
        assert_eq!(NutritionUnit::from_token("protein"), None);
        assert_eq!(NutritionUnit::from_token(""), None);
    }

    #[test]
    fn test_unit_tokens_are_unique() {
        for (idx, (token, _)) in UNIT_TOKENS.iter().enumerate() {
            assert!(
                UNIT_TOKENS[idx + 1..].iter().all(|(other, _)| other != token),
                "duplicate unit token {token}"
            );
        }
    }

    #[test]
    fn test_unit_energy_conversion() {
        let kj = NutritionUnit::convert_energy(100.0, NutritionUnit::Kcal, NutritionUnit::Kj);
        assert!((kj.unwrap() - 418.4).abs() < 1e-9);
        let kcal = NutritionUnit::convert_energy(418.4, NutritionUnit::Kj, NutritionUnit::Kcal);
        assert!((kcal.unwrap() - 100.0).abs() < 1e-9);
        assert!(NutritionUnit::convert_energy(1.0, NutritionUnit::G, NutritionUnit::Kj).is_none());
    }

    #[test]
    fn test_unit_kinds() {
        assert!(NutritionUnit::Kj.is_energy());
        assert!(NutritionUnit::Mcg.is_mass());
        assert!(!NutritionUnit::Percent.is_nutrient_unit());
        assert_eq!(NutritionUnit::Mg.grams_factor(), Some(0.001));
        assert_eq!(NutritionUnit::Kcal.grams_factor(), None);
    }
}
