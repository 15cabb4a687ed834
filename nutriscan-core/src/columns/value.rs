use tracing::*;

use crate::{
    analysis::bbox::Bbox,
    config::ScanConfig,
    detect::{attribute::Attribute, header::HeaderType, serving::is_serving_text},
    recognition::RecognizedText,
    text::ValuesText,
};

/// Value fragments read top to bottom in one printed column.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesTextColumn {
    pub texts: Vec<ValuesText>,
}

impl ValuesTextColumn {
    pub fn new(texts: Vec<ValuesText>) -> Self {
        Self { texts }
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn rect(&self) -> Option<Bbox> {
        Bbox::union_all(self.texts.iter().map(|text| &text.text.rect))
    }

    /// Rectangle of the entries holding a single value, the whole column
    /// when there are none.
    pub fn single_value_rect(&self) -> Option<Bbox> {
        Bbox::union_all(
            self.texts
                .iter()
                .filter(|text| text.is_single_value())
                .map(|text| &text.text.rect),
        )
        .or_else(|| self.rect())
    }

    pub fn contains(&self, text: &ValuesText) -> bool {
        self.texts.iter().any(|own| own.is_same_reading(text))
    }

    /// Whether every entry also appears in the longer `other`.
    pub fn is_strict_subset_of(&self, other: &ValuesTextColumn) -> bool {
        self.len() < other.len() && self.texts.iter().all(|text| other.contains(text))
    }

    /// Whether both columns hold the same readings in the same order.
    pub fn has_same_readings(&self, other: &ValuesTextColumn) -> bool {
        self.len() == other.len()
            && self
                .texts
                .iter()
                .zip(&other.texts)
                .all(|(own, theirs)| own.is_same_reading(theirs))
    }
}

/// Fragments that can take part in a value column: they carry values and
/// are neither a label, a serving description nor a column header.
pub fn value_candidates(texts: &[RecognizedText]) -> Vec<ValuesText> {
    texts
        .iter()
        .filter(|text| {
            let string = text.normalized_string();
            !Attribute::is_nutrient_text(&string)
                && !is_serving_text(&string)
                && HeaderType::detect(&string).is_none()
        })
        .filter_map(ValuesText::new)
        .collect()
}

/// Builds one column per value seed.
///
/// The result still holds duplicates and strays; the cleanup cascade sorts
/// them out.
#[tracing::instrument(skip_all)]
pub fn build_value_columns(texts: &[RecognizedText], config: &ScanConfig) -> Vec<ValuesTextColumn> {
    let candidates = value_candidates(texts);
    let Some(median_height) = median_height(&candidates) else {
        return Vec::new();
    };
    let max_height = median_height * config.elongated_height_factor;

    let candidates: Vec<ValuesText> = candidates
        .into_iter()
        .filter(|text| text.rect().height() <= max_height)
        .collect();

    let columns: Vec<ValuesTextColumn> = candidates
        .iter()
        .filter(|seed| !seed.is_percent_only())
        .map(|seed| walk_column(seed, &candidates, config))
        .filter(|column| !column.is_empty())
        .collect();

    debug!("Built {} candidate value columns", columns.len());
    columns
}

fn median_height(texts: &[ValuesText]) -> Option<f32> {
    let mut heights: Vec<f32> = texts.iter().map(|text| text.rect().height()).collect();
    heights.sort_by(f32::total_cmp);
    heights.get(heights.len() / 2).copied()
}

fn walk_column(seed: &ValuesText, candidates: &[ValuesText], config: &ScanConfig) -> ValuesTextColumn {
    let mut band: Vec<&ValuesText> = candidates
        .iter()
        .filter(|text| {
            text.rect().horizontal_overlap_ratio(&seed.rect()) >= config.value_column_min_overlap
        })
        .collect();
    band.sort_by(|a, b| a.rect().center().y.total_cmp(&b.rect().center().y));

    // one fragment per printed row: the left-most one
    let mut rows: Vec<&ValuesText> = Vec::new();
    for text in band {
        match rows.last_mut() {
            Some(last) if last.rect().is_inline_with(&text.rect()) => {
                if text.rect().min.x < last.rect().min.x || text.id() == seed.id() {
                    *last = text;
                }
            }
            _ => rows.push(text),
        }
    }

    let mut chosen: Vec<&ValuesText> = Vec::new();
    for text in rows {
        let duplicate = chosen.iter().any(|other| {
            other.string() == text.string()
                && other
                    .rect()
                    .overlaps_substantially(&text.rect(), config.substantial_overlap_ratio)
        });
        if !duplicate {
            chosen.push(text);
        }
    }

    let mut texts = stop_at_footer_energy(&chosen);
    if !texts.iter().any(|text| text.id() == seed.id()) {
        if let Some(position) = chosen.iter().position(|text| text.id() == seed.id()) {
            texts = stop_at_footer_energy(&chosen[position..]);
        }
    }

    ValuesTextColumn::new(texts.into_iter().cloned().collect())
}

/// Cuts the run at the second energy reading that follows another value,
/// where the "based on a 2000 calorie diet" footer starts.
fn stop_at_footer_energy<'a>(texts: &[&'a ValuesText]) -> Vec<&'a ValuesText> {
    let mut kept = Vec::new();
    let mut seen_energy = false;
    let mut seen_other = false;

    for text in texts {
        if text.has_energy_value() {
            if seen_energy && seen_other {
                trace!("Value column stops at `{}`", text.string());
                break;
            }
            seen_energy = true;
        } else {
            seen_other = true;
        }
        kept.push(*text);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(x: f32, y: f32, string: &str) -> RecognizedText {
        RecognizedText::new(Bbox::from_xywh(x, y, 0.12, 0.03), vec![string.to_string()])
    }

    fn strings(column: &ValuesTextColumn) -> Vec<&str> {
        column.texts.iter().map(ValuesText::string).collect()
    }

    #[test]
    fn test_value_candidates_exclude_labels_and_headers() {
        let texts = vec![
            text(0.1, 0.1, "Protein 3g"),
            text(0.6, 0.05, "Per 100g"),
            text(0.1, 0.02, "Serving size 30g"),
            text(0.6, 0.1, "3g"),
            text(0.6, 0.15, "Protein"),
        ];
        let candidates = value_candidates(&texts);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].string(), "3g");
    }

    #[test]
    fn test_column_walk_takes_left_most_per_row() {
        let texts = vec![
            text(0.6, 0.1, "150"),
            text(0.6, 0.15, "8g"),
            text(0.65, 0.15, "12%"),
            text(0.6, 0.2, "3g"),
        ];
        let columns = build_value_columns(&texts, &ScanConfig::default());
        assert!(columns.iter().all(|column| strings(column) == vec!["150", "8g", "3g"]));
        // the lone percentage does not seed a column
        assert_eq!(columns.len(), 3);
    }

    #[test]
    fn test_column_walk_drops_elongated_and_duplicates() {
        let tall = RecognizedText::new(Bbox::from_xywh(0.6, 0.3, 0.12, 0.2), vec!["13".into()]);
        let duplicate = RecognizedText::new(Bbox::from_xywh(0.601, 0.2, 0.12, 0.03), vec!["3g".into()]);
        let texts = vec![
            text(0.6, 0.1, "150"),
            text(0.6, 0.2, "3g"),
            duplicate,
            tall,
            text(0.6, 0.6, "1g"),
        ];
        let columns = build_value_columns(&texts, &ScanConfig::default());
        assert_eq!(strings(&columns[0]), vec!["150", "3g", "1g"]);
    }

    #[test]
    fn test_column_stops_at_footer_energy() {
        let texts = vec![
            text(0.6, 0.1, "1046kJ"),
            text(0.6, 0.15, "250kcal"),
            text(0.6, 0.2, "3g"),
            text(0.6, 0.25, "8g"),
            text(0.6, 0.4, "8700kJ"),
            text(0.6, 0.45, "2g"),
        ];
        let columns = build_value_columns(&texts, &ScanConfig::default());
        assert_eq!(strings(&columns[0]), vec!["1046kJ", "250kcal", "3g", "8g"]);

        let footer_seeded = columns
            .iter()
            .find(|column| column.texts[0].string() == "8700kJ")
            .unwrap();
        assert_eq!(strings(footer_seeded), vec!["8700kJ", "2g"]);
    }

    #[test]
    fn test_column_relations() {
        let texts = vec![text(0.6, 0.1, "150"), text(0.6, 0.15, "8g")];
        let full = ValuesTextColumn::new(texts.iter().filter_map(ValuesText::new).collect());
        let part = ValuesTextColumn::new(vec![full.texts[1].clone()]);
        assert!(part.is_strict_subset_of(&full));
        assert!(!full.is_strict_subset_of(&full));
        assert!(full.has_same_readings(&full.clone()));
        assert!(!part.has_same_readings(&full));
    }
}
