pub mod result;

use tracing::*;

use crate::{
    columns::{ColumnCleanup, build_attribute_columns, build_value_columns},
    config::ScanConfig,
    detect::{
        header::{HeaderText, assign_left_to_right, assign_to_columns, detect_headers},
        serving::{ServingDescriptor, is_serving_text, read_serving},
    },
    error::ScanError,
    grid::{ExtractedGrid, Reconciler, energy::EnergyEquation},
    inline::extract_inline,
    observation::{Observation, populated_nutrient_count},
    recognition::{RecognizedText, TextRecognizer},
};

pub use result::{Header, NutrientRow, NutrientValue, Nutrients, ScanResult, Strategy};

/// Reads nutrition labels with one configuration.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Runs the recognizer, then scans what it returned.
    pub async fn scan_with(&self, recognizer: &impl TextRecognizer) -> Result<ScanResult, ScanError> {
        let texts = recognizer.recognize().await?;
        Ok(self.scan(&texts))
    }

    /// Reads the label made of `texts`.
    ///
    /// Inline reading wins outright when its energy and macronutrients agree
    /// with the energy equation. Otherwise the table is read as well and the
    /// reading with more populated rows is kept, inline on a tie.
    #[tracing::instrument(skip_all, fields(texts = texts.len()))]
    pub fn scan(&self, texts: &[RecognizedText]) -> ScanResult {
        let serving = read_servings(texts);
        let headers = detect_headers(texts);

        let inline = extract_inline(texts);
        if EnergyEquation::from_observations(&inline, 0).is_satisfied(self.config.energy_error_threshold) {
            info!("Inline rows satisfy the energy equation");
            return build_result(texts, Strategy::Inline, &inline, assign_left_to_right(&headers), serving);
        }

        let grid = self.read_table(texts);
        let tabular = grid.observations();
        let (inline_count, tabular_count) =
            (populated_nutrient_count(&inline), populated_nutrient_count(&tabular));

        match arbitrate(inline_count, tabular_count) {
            Strategy::Tabular => {
                info!("Table read with {} rows over {} inline rows", tabular_count, inline_count);
                let headers = table_headers(&headers, &grid);
                build_result(texts, Strategy::Tabular, &tabular, headers, serving)
            }
            Strategy::Inline => {
                info!("Inline read with {} rows over {} table rows", inline_count, tabular_count);
                build_result(texts, Strategy::Inline, &inline, assign_left_to_right(&headers), serving)
            }
        }
    }

    /// The reconciled table of the label.
    pub fn read_table(&self, texts: &[RecognizedText]) -> ExtractedGrid {
        let attribute_columns = build_attribute_columns(texts, &self.config);
        let value_columns = build_value_columns(texts, &self.config);
        let groups = ColumnCleanup::new(&attribute_columns, texts, &self.config).run(value_columns);
        let grid = ExtractedGrid::build(&attribute_columns, &groups, &self.config);
        Reconciler::new(&self.config).run(grid)
    }
}

/// The table only wins with strictly more populated rows.
fn arbitrate(inline_count: usize, tabular_count: usize) -> Strategy {
    match tabular_count > inline_count {
        true => Strategy::Tabular,
        false => Strategy::Inline,
    }
}

/// The serving facts of every serving fragment, top to bottom.
fn read_servings(texts: &[RecognizedText]) -> Option<ServingDescriptor> {
    let mut fragments: Vec<&RecognizedText> = texts
        .iter()
        .filter(|text| is_serving_text(&text.normalized_string()))
        .collect();
    fragments.sort_by(|a, b| a.rect.min.y.total_cmp(&b.rect.min.y));

    let observations: Vec<Observation> = fragments
        .into_iter()
        .flat_map(|fragment| read_serving(fragment, texts))
        .collect();
    ServingDescriptor::from_observations(&observations)
}

/// Headers printed above the first value of the table, matched to its columns.
fn table_headers(headers: &[HeaderText], grid: &ExtractedGrid) -> [Option<HeaderText>; 2] {
    let above: Vec<HeaderText> = match grid.values_top() {
        Some(top) => headers
            .iter()
            .filter(|header| header.rect().center().y < top)
            .cloned()
            .collect(),
        None => headers.to_vec(),
    };
    assign_to_columns(&above, &grid.value_rects())
}

fn build_result(
    texts: &[RecognizedText],
    strategy: Strategy,
    observations: &[Observation],
    headers: [Option<HeaderText>; 2],
    serving: Option<ServingDescriptor>,
) -> ScanResult {
    ScanResult {
        serving,
        nutrients: Nutrients::from_observations(observations, headers),
        strategy: Some(strategy),
        texts: texts.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::bbox::Bbox,
        detect::{attribute::Attribute, unit::NutritionUnit},
        recognition::StaticRecognizer,
    };

    fn text(x: f32, y: f32, width: f32, string: &str) -> RecognizedText {
        RecognizedText::new(Bbox::from_xywh(x, y, width, 0.03), vec![string.to_string()])
    }

    #[test]
    fn test_inline_label_accepted_by_energy_equation() {
        let texts = vec![
            text(0.1, 0.05, 0.5, "Serving Size 1 cup (240ml)"),
            text(0.1, 0.1, 0.5, "Calories 150"),
            text(0.1, 0.15, 0.5, "Total Fat 5g"),
            text(0.1, 0.2, 0.5, "Total Carbohydrate 20g"),
            text(0.1, 0.25, 0.5, "Protein 5g"),
        ];
        let result = Scanner::default().scan(&texts);
        assert_eq!(result.strategy, Some(Strategy::Inline));
        assert_eq!(result.nutrient(Attribute::Fat).unwrap().value1.as_ref().unwrap().amount, 5.0);
        let serving = result.serving.unwrap();
        assert_eq!(serving.amount.map(|amount| amount.value), Some(1.0));
    }

    #[test]
    fn test_ties_favor_inline() {
        assert_eq!(arbitrate(4, 4), Strategy::Inline);
        assert_eq!(arbitrate(5, 4), Strategy::Inline);
        assert_eq!(arbitrate(4, 5), Strategy::Tabular);
        assert_eq!(arbitrate(0, 0), Strategy::Inline);
    }

    #[tokio::test]
    async fn test_scan_with_recognizer() {
        let recognizer = StaticRecognizer {
            texts: vec![text(0.1, 0.1, 0.5, "Protein 3g"), text(0.1, 0.15, 0.5, "Sugars 1g")],
        };
        let result = Scanner::default().scan_with(&recognizer).await.unwrap();
        let nutrients = result.nutrients.unwrap();
        assert_eq!(nutrients.rows.len(), 2);
        assert_eq!(nutrients.rows[1].attribute, Attribute::Sugar);
        assert_eq!(nutrients.rows[1].value1.as_ref().unwrap().unit, Some(NutritionUnit::G));
    }

    #[test]
    fn test_empty_label() {
        let result = Scanner::default().scan(&[]);
        assert!(result.nutrients.is_none());
        assert!(result.serving.is_none());
        assert!(result.texts.is_empty());
    }
}
