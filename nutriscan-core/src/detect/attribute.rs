use std::{ops::Range, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::detect::unit::NutritionUnit;

/// Everything the scanner can recognise on a label: nutrients listed in the
/// table, the parts of the serving description, and the column headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    Energy,
    Protein,
    Carbohydrate,
    DietaryFibre,
    SolubleFibre,
    InsolubleFibre,
    Sugar,
    AddedSugar,
    SugarAlcohols,
    Starch,
    Fat,
    SaturatedFat,
    MonounsaturatedFat,
    PolyunsaturatedFat,
    TransFat,
    Cholesterol,
    Salt,
    Sodium,
    Potassium,
    Calcium,
    Iron,
    Magnesium,
    Zinc,
    Phosphorus,
    VitaminA,
    VitaminC,
    VitaminD,
    VitaminE,
    VitaminK,
    Thiamine,
    Riboflavin,
    Niacin,
    VitaminB6,
    VitaminB12,
    Folate,
    Caffeine,

    ServingSize,
    ServingAmount,
    ServingUnit,
    ServingUnitSize,
    ServingEquivalentAmount,
    ServingEquivalentUnit,
    ServingEquivalentUnitSize,
    ServingsPerContainerAmount,
    ServingsPerContainerName,

    HeaderType1,
    HeaderType2,
    HeaderServingAmount,
    HeaderServingUnit,
    HeaderServingUnitSize,
    HeaderServingEquivalentAmount,
    HeaderServingEquivalentUnit,
    HeaderServingEquivalentUnitSize,
}

/// Detection rules, evaluated top to bottom.
///
/// When two rules match overlapping parts of a string the earlier rule wins,
/// so specific names ("saturated fat", "added sugars") precede the generic
/// ones they contain ("fat", "sugars").
pub const ATTRIBUTE_RULES: &[(Attribute, &str)] = &[
    (
        Attribute::ServingsPerContainerAmount,
        r"\bservings?\s+per\s+(container|package|pack|pkg|pouch|bottle|box|bag)\b|\bservings\s+per\b|\bportions?\s+per\s+pack\b",
    ),
    (
        Attribute::HeaderType1,
        r"\bamount\s+per\s+(serv(ing|e)|100\s*(g|ml))\b|\bper\s+100\s*(g|ml)\b|\bper\s+serv(ing|e)\b|\bper\s+portion\b",
    ),
    (
        Attribute::ServingSize,
        r"\bserv(ing|e)\s*size\b|\bportion\s+size\b|\bserving\b",
    ),
    (
        Attribute::Energy,
        r"\benerg(y|ie)\b|\bcalories\b|\bcalorie\b|\bkilojoules?\b|\bkilocalories\b",
    ),
    (
        Attribute::SaturatedFat,
        r"\bsat(urated|\.)?\s*-?\s*fats?\b|\bsaturates\b|\bsaturated\b",
    ),
    (
        Attribute::TransFat,
        r"\btrans\s*-?\s*fat(s|ty\s+acids)?\b|\btrans\b",
    ),
    (
        Attribute::MonounsaturatedFat,
        r"\bmono\s*-?\s*unsaturate[ds]?(\s+fats?)?\b",
    ),
    (
        Attribute::PolyunsaturatedFat,
        r"\bpoly\s*-?\s*unsaturate[ds]?(\s+fats?)?\b",
    ),
    (Attribute::Fat, r"\b(total\s+)?fats?\b|\blipids?\b"),
    (Attribute::Cholesterol, r"\bcholest[eo]rol\b"),
    (Attribute::AddedSugar, r"\badded\s+sugars?\b"),
    (Attribute::SugarAlcohols, r"\bsugar\s+alcohols?\b|\bpolyols\b"),
    (Attribute::Sugar, r"\b(total\s+)?sugars?\b"),
    (Attribute::InsolubleFibre, r"\binsoluble\s+fib(re|er)s?\b"),
    (Attribute::SolubleFibre, r"\bsoluble\s+fib(re|er)s?\b"),
    (Attribute::DietaryFibre, r"\b(dietary\s+)?fib(re|er)s?\b"),
    (Attribute::Starch, r"\bstarch\b"),
    (
        Attribute::Carbohydrate,
        r"\b(total\s+)?carb(ohydrates?|s)?\b|\bcarbohydrate",
    ),
    (Attribute::Protein, r"\bproteins?\b"),
    (Attribute::Salt, r"\bsalt\b"),
    (Attribute::Sodium, r"\bsodium\b"),
    (Attribute::Potassium, r"\bpotassium\b"),
    (Attribute::Calcium, r"\bcalcium\b"),
    (Attribute::Iron, r"\biron\b"),
    (Attribute::Magnesium, r"\bmagnesium\b"),
    (Attribute::Zinc, r"\bzinc\b"),
    (Attribute::Phosphorus, r"\bphosphorus\b"),
    (
        Attribute::VitaminB12,
        r"\bvit(amin|\.)?\s*b\s*12\b|\bcobalamin\b",
    ),
    (
        Attribute::VitaminB6,
        r"\bvit(amin|\.)?\s*b\s*6\b|\bpyridoxine\b",
    ),
    (Attribute::Thiamine, r"\bthiamine?\b|\bvit(amin|\.)?\s*b\s*1\b"),
    (
        Attribute::Riboflavin,
        r"\briboflavin\b|\bvit(amin|\.)?\s*b\s*2\b",
    ),
    (Attribute::Niacin, r"\bniacin\b|\bvit(amin|\.)?\s*b\s*3\b"),
    (Attribute::Folate, r"\bfolate\b|\bfolic\s+acid\b"),
    (Attribute::VitaminA, r"\bvit(amin|\.)?\s*a\b"),
    (Attribute::VitaminC, r"\bvit(amin|\.)?\s*c\b"),
    (Attribute::VitaminD, r"\bvit(amin|\.)?\s*d\b"),
    (Attribute::VitaminE, r"\bvit(amin|\.)?\s*e\b"),
    (Attribute::VitaminK, r"\bvit(amin|\.)?\s*k\b"),
    (Attribute::Caffeine, r"\bcaffeine\b"),
];

/// Phrases mentioning a nutrient that never start a row of their own.
const IGNORED_PHRASES: &str =
    r"\bcalories\s+from\s+(saturated\s+)?fat\b|\benergy\s+from\s+fat\b|\bfat\s+calories\b";

static RULES: LazyLock<Vec<(Attribute, Regex)>> = LazyLock::new(|| {
    ATTRIBUTE_RULES
        .iter()
        .map(|(attribute, pattern)| {
            let regex = Regex::new(&format!("(?i){pattern}"))
                .unwrap_or_else(|err| panic!("invalid pattern for {attribute:?}: {err}"));
            (*attribute, regex)
        })
        .collect()
});

static IGNORED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("(?i){IGNORED_PHRASES}")).unwrap());

impl Attribute {
    /// Distinct attributes mentioned in `text`, in reading order.
    ///
    /// # Example
    /// ```
    /// use nutriscan_core::detect::attribute::Attribute;
    /// assert_eq!(Attribute::detect("Total Fat"), vec![Attribute::Fat]);
    /// assert_eq!(Attribute::detect("Saturated Fat"), vec![Attribute::SaturatedFat]);
    /// assert_eq!(
    ///     Attribute::detect("Protein Carbohydrate"),
    ///     vec![Attribute::Protein, Attribute::Carbohydrate]
    /// );
    /// ```
    pub fn detect(text: &str) -> Vec<Attribute> {
        let mut attributes: Vec<Attribute> = Vec::new();
        for (attribute, _) in Self::detect_with_ranges(text) {
            let conflicts = attributes.iter().any(|kept| {
                kept.conflicting_attributes().contains(&attribute)
                    || attribute.conflicting_attributes().contains(kept)
            });
            if !conflicts && !attributes.contains(&attribute) {
                attributes.push(attribute);
            }
        }
        attributes
    }

    /// Nutrient attributes mentioned in `text`.
    pub fn detect_nutrients(text: &str) -> Vec<Attribute> {
        Self::detect(text)
            .into_iter()
            .filter(Attribute::is_nutrient)
            .collect()
    }

    /// Every attribute occurrence with its byte range, duplicates included.
    ///
    /// Ignored phrases such as "calories from fat" produce no occurrence.
    pub fn detect_with_ranges(text: &str) -> Vec<(Attribute, Range<usize>)> {
        let ignored: Vec<Range<usize>> = Self::ignored_ranges(text);
        let mut claimed: Vec<(Attribute, Range<usize>)> = Vec::new();

        for (attribute, regex) in RULES.iter() {
            for found in regex.find_iter(text) {
                let range = found.range();
                let overlaps = |other: &Range<usize>| range.start < other.end && other.start < range.end;
                if ignored.iter().any(overlaps)
                    || claimed.iter().any(|(_, other)| overlaps(other))
                {
                    continue;
                }
                claimed.push((*attribute, range));
            }
        }

        claimed.sort_by_key(|(_, range)| range.start);
        claimed
    }

    /// Byte ranges of phrases that mention a nutrient without naming a row.
    pub fn ignored_ranges(text: &str) -> Vec<Range<usize>> {
        IGNORED.find_iter(text).map(|found| found.range()).collect()
    }

    /// Whether `text` reads as a nutrient attribute.
    pub fn is_nutrient_text(text: &str) -> bool {
        !Self::detect_nutrients(text).is_empty()
    }

    pub const fn is_nutrient(&self) -> bool {
        use Attribute::*;
        matches!(
            self,
            Energy
                | Protein
                | Carbohydrate
                | DietaryFibre
                | SolubleFibre
                | InsolubleFibre
                | Sugar
                | AddedSugar
                | SugarAlcohols
                | Starch
                | Fat
                | SaturatedFat
                | MonounsaturatedFat
                | PolyunsaturatedFat
                | TransFat
                | Cholesterol
                | Salt
                | Sodium
                | Potassium
                | Calcium
                | Iron
                | Magnesium
                | Zinc
                | Phosphorus
                | VitaminA
                | VitaminC
                | VitaminD
                | VitaminE
                | VitaminK
                | Thiamine
                | Riboflavin
                | Niacin
                | VitaminB6
                | VitaminB12
                | Folate
                | Caffeine
        )
    }

    pub const fn is_serving(&self) -> bool {
        use Attribute::*;
        matches!(
            self,
            ServingSize
                | ServingAmount
                | ServingUnit
                | ServingUnitSize
                | ServingEquivalentAmount
                | ServingEquivalentUnit
                | ServingEquivalentUnitSize
                | ServingsPerContainerAmount
                | ServingsPerContainerName
        )
    }

    pub const fn is_header(&self) -> bool {
        use Attribute::*;
        matches!(
            self,
            HeaderType1
                | HeaderType2
                | HeaderServingAmount
                | HeaderServingUnit
                | HeaderServingUnitSize
                | HeaderServingEquivalentAmount
                | HeaderServingEquivalentUnit
                | HeaderServingEquivalentUnitSize
        )
    }

    pub const fn is_macro(&self) -> bool {
        matches!(
            self,
            Attribute::Carbohydrate | Attribute::Protein | Attribute::Fat
        )
    }

    /// The nutrient this one is a part of (saturated fat is part of fat).
    pub const fn parent(&self) -> Option<Attribute> {
        use Attribute::*;
        match self {
            SaturatedFat | MonounsaturatedFat | PolyunsaturatedFat | TransFat => Some(Fat),
            Sugar | DietaryFibre | Starch | SugarAlcohols => Some(Carbohydrate),
            AddedSugar => Some(Sugar),
            SolubleFibre | InsolubleFibre => Some(DietaryFibre),
            _ => None,
        }
    }

    /// Attributes that cannot be read from the same fragment as this one.
    ///
    /// "Energy from fat" is an energy row, "Sodium (as salt)" a sodium row,
    /// and a servings-per-container phrase never names the serving size.
    pub const fn conflicting_attributes(&self) -> &'static [Attribute] {
        use Attribute::*;
        match self {
            Energy => &[Fat, SaturatedFat],
            Salt => &[Sodium],
            Sodium => &[Salt],
            ServingsPerContainerAmount => &[ServingSize, ServingAmount],
            ServingSize => &[ServingsPerContainerAmount],
            HeaderType1 => &[HeaderType2],
            HeaderType2 => &[HeaderType1],
            _ => &[],
        }
    }

    /// Unit assumed when a value for this attribute is printed without one.
    pub const fn default_unit(&self) -> Option<NutritionUnit> {
        use Attribute::*;
        match self {
            Energy => Some(NutritionUnit::Kcal),
            Protein | Carbohydrate | DietaryFibre | SolubleFibre | InsolubleFibre | Sugar
            | AddedSugar | SugarAlcohols | Starch | Fat | SaturatedFat | MonounsaturatedFat
            | PolyunsaturatedFat | TransFat | Salt => Some(NutritionUnit::G),
            Cholesterol | Sodium | Potassium | Calcium | Iron | Magnesium | Zinc | Phosphorus
            | VitaminC | VitaminE | Thiamine | Riboflavin | Niacin | VitaminB6 | Caffeine => {
                Some(NutritionUnit::Mg)
            }
            VitaminA | VitaminD | VitaminK | VitaminB12 | Folate => Some(NutritionUnit::Mcg),
            _ => None,
        }
    }

    /// Units a printed value for this attribute may carry.
    pub const fn supported_units(&self) -> &'static [NutritionUnit] {
        use Attribute::*;
        use NutritionUnit as U;
        match self {
            Energy => &[U::Kj, U::Kcal],
            Protein | Carbohydrate | DietaryFibre | SolubleFibre | InsolubleFibre | Sugar
            | AddedSugar | SugarAlcohols | Starch | Fat | SaturatedFat | MonounsaturatedFat
            | PolyunsaturatedFat | TransFat | Salt => &[U::G, U::Mg],
            Cholesterol | Sodium | Potassium | Calcium | Iron | Magnesium | Zinc | Phosphorus
            | Caffeine => &[U::Mg, U::G, U::Mcg, U::Percent],
            VitaminA | VitaminC | VitaminD | VitaminE | VitaminK | Thiamine | Riboflavin
            | Niacin | VitaminB6 | VitaminB12 | Folate => &[U::Mcg, U::Mg, U::Iu, U::Percent],
            ServingAmount | ServingEquivalentAmount | HeaderServingAmount
            | HeaderServingEquivalentAmount => &[U::G, U::Ml, U::Mg],
            _ => &[],
        }
    }

    /// Whether a value with `unit` can belong to this attribute; unitless values always can.
    pub fn supports_unit(&self, unit: Option<NutritionUnit>) -> bool {
        match unit {
            Some(unit) => self.supported_units().contains(&unit),
            None => true,
        }
    }

    /// Whether a bare "Total" printed after this attribute belongs to it
    /// ("Fat, total", "Carbohydrate - Total").
    pub const fn supports_total_label(&self) -> bool {
        matches!(
            self,
            Attribute::Fat | Attribute::Carbohydrate | Attribute::Sugar | Attribute::DietaryFibre
        )
    }

    /// Attributes that may follow this one when a serving description is read
    /// as a token stream, in order of preference.
    pub const fn next_attributes(&self) -> &'static [Attribute] {
        use Attribute::*;
        match self {
            ServingSize => &[ServingAmount],
            ServingAmount => &[ServingUnit, ServingUnitSize],
            ServingUnit | ServingUnitSize => &[ServingEquivalentAmount],
            ServingEquivalentAmount => &[ServingEquivalentUnit, ServingEquivalentUnitSize],
            ServingsPerContainerAmount => &[ServingsPerContainerName],
            HeaderType1 | HeaderType2 => &[HeaderServingAmount],
            HeaderServingAmount => &[HeaderServingUnit, HeaderServingUnitSize],
            HeaderServingUnit | HeaderServingUnitSize => &[HeaderServingEquivalentAmount],
            HeaderServingEquivalentAmount => {
                &[HeaderServingEquivalentUnit, HeaderServingEquivalentUnitSize]
            }
            _ => &[],
        }
    }

    pub const fn name(&self) -> &'static str {
        use Attribute::*;
        match self {
            Energy => "Energy",
            Protein => "Protein",
            Carbohydrate => "Carbohydrate",
            DietaryFibre => "Dietary Fibre",
            SolubleFibre => "Soluble Fibre",
            InsolubleFibre => "Insoluble Fibre",
            Sugar => "Sugar",
            AddedSugar => "Added Sugar",
            SugarAlcohols => "Sugar Alcohols",
            Starch => "Starch",
            Fat => "Fat",
            SaturatedFat => "Saturated Fat",
            MonounsaturatedFat => "Monounsaturated Fat",
            PolyunsaturatedFat => "Polyunsaturated Fat",
            TransFat => "Trans Fat",
            Cholesterol => "Cholesterol",
            Salt => "Salt",
            Sodium => "Sodium",
            Potassium => "Potassium",
            Calcium => "Calcium",
            Iron => "Iron",
            Magnesium => "Magnesium",
            Zinc => "Zinc",
            Phosphorus => "Phosphorus",
            VitaminA => "Vitamin A",
            VitaminC => "Vitamin C",
            VitaminD => "Vitamin D",
            VitaminE => "Vitamin E",
            VitaminK => "Vitamin K",
            Thiamine => "Thiamine",
            Riboflavin => "Riboflavin",
            Niacin => "Niacin",
            VitaminB6 => "Vitamin B6",
            VitaminB12 => "Vitamin B12",
            Folate => "Folate",
            Caffeine => "Caffeine",
            ServingSize => "Serving Size",
            ServingAmount => "Serving Amount",
            ServingUnit => "Serving Unit",
            ServingUnitSize => "Serving Unit Size",
            ServingEquivalentAmount => "Serving Equivalent Amount",
            ServingEquivalentUnit => "Serving Equivalent Unit",
            ServingEquivalentUnitSize => "Serving Equivalent Unit Size",
            ServingsPerContainerAmount => "Servings Per Container",
            ServingsPerContainerName => "Container Name",
            HeaderType1 => "Header 1",
            HeaderType2 => "Header 2",
            HeaderServingAmount => "Header Serving Amount",
            HeaderServingUnit => "Header Serving Unit",
            HeaderServingUnitSize => "Header Serving Unit Size",
            HeaderServingEquivalentAmount => "Header Serving Equivalent Amount",
            HeaderServingEquivalentUnit => "Header Serving Equivalent Unit",
            HeaderServingEquivalentUnitSize => "Header Serving Equivalent Unit Size",
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
