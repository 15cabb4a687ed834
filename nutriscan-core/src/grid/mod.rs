pub mod energy;
pub mod ratio;
pub mod reconcile;

use tracing::*;

use crate::{
    analysis::bbox::Bbox,
    config::ScanConfig,
    columns::{attribute::AttributeColumn, cleanup::ColumnGroup, value::ValuesTextColumn},
    detect::{attribute::Attribute, value::Value},
    observation::Observation,
    text::{AttributeText, ValueSlot, ValueText, ValuesText},
};

pub use reconcile::Reconciler;

/// Position of a row: column index, then row index.
pub type RowPosition = (usize, usize);

/// An attribute with the cells of its one or two value columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    pub attribute: Attribute,
    /// The printed label, `None` for rows solved from the energy equation.
    pub label: Option<AttributeText>,
    pub values: [Option<ValueSlot>; 2],
    /// Set when the row breaks the column ratio and no alternate reading fixed it.
    pub invalid: bool,
}

impl ExtractedRow {
    pub fn new(label: AttributeText, values: [Option<ValueSlot>; 2]) -> Self {
        Self {
            attribute: label.attribute,
            label: Some(label),
            values,
            invalid: false,
        }
    }

    /// A row the label never printed a name for.
    pub fn unlabelled(attribute: Attribute, values: [Option<ValueSlot>; 2]) -> Self {
        Self {
            attribute,
            label: None,
            values,
            invalid: false,
        }
    }

    pub fn attribute(&self) -> Attribute {
        self.attribute
    }

    pub fn slot(&self, slot: usize) -> Option<&ValueSlot> {
        self.values.get(slot).and_then(Option::as_ref)
    }

    /// The settled value of a cell.
    pub fn single_value(&self, slot: usize) -> Option<Value> {
        self.slot(slot).and_then(ValueSlot::single_value)
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    pub fn has_multiple_values(&self) -> bool {
        self.values
            .iter()
            .flatten()
            .any(ValueSlot::has_multiple_values)
    }
}

/// Rows read against one attribute column, with the rectangles of its value columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedColumn {
    pub rows: Vec<ExtractedRow>,
    pub value_rects: [Option<Bbox>; 2],
}

/// The table of a label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedGrid {
    pub columns: Vec<ExtractedColumn>,
    /// Number of value columns, 1 or 2 (0 for an empty grid).
    pub slot_count: usize,
}

impl ExtractedGrid {
    /// Pairs every attribute row with the value printed on the same line in
    /// each value column of its group.
    ///
    /// A value column that lands on fewer than `min_column_share` of the rows
    /// is not part of the table.
    #[tracing::instrument(skip_all)]
    pub fn build(attribute_columns: &[AttributeColumn], groups: &[ColumnGroup], config: &ScanConfig) -> Self {
        let mut columns = Vec::new();
        for group in groups {
            let Some(attribute_column) = attribute_columns.get(group.attribute_column) else {
                warn!("No attribute column {} for value columns", group.attribute_column);
                continue;
            };
            let value_column = |slot: usize| group.value_columns.get(slot);
            let mut value_rects =
                [0, 1].map(|slot| value_column(slot).and_then(ValuesTextColumn::single_value_rect));

            let mut rows: Vec<ExtractedRow> = attribute_column
                .rows
                .iter()
                .map(|attribute| {
                    let rect = attribute.rect();
                    let values = [0, 1].map(|slot| {
                        value_column(slot)
                            .and_then(|column| closest_inline(column, &rect))
                            .map(|text| ValueSlot::Recognized(text.clone()))
                    });
                    ExtractedRow::new(attribute.clone(), values)
                })
                .collect();

            let min_rows = rows.len() as f32 * config.min_column_share;
            for slot in 0..2 {
                let matched = rows.iter().filter(|row| row.slot(slot).is_some()).count();
                if matched > 0 && (matched as f32) < min_rows {
                    debug!("Value column {} matches only {} rows", slot, matched);
                    rows.iter_mut().for_each(|row| row.values[slot] = None);
                    value_rects[slot] = None;
                }
            }

            columns.push(ExtractedColumn { rows, value_rects });
        }

        let slot_count = columns
            .iter()
            .map(|column| {
                (0..2)
                    .filter(|slot| column.rows.iter().any(|row| row.slot(*slot).is_some()))
                    .map(|slot| slot + 1)
                    .max()
                    .unwrap_or(0)
            })
            .max()
            .unwrap_or(0);
        if slot_count == 0 {
            return ExtractedGrid::default();
        }

        debug!(
            "Built grid of {} columns with {} value slots",
            columns.len(),
            slot_count
        );
        ExtractedGrid {
            columns,
            slot_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(|column| column.rows.is_empty())
    }

    pub fn rows(&self) -> impl Iterator<Item = &ExtractedRow> {
        self.columns.iter().flat_map(|column| column.rows.iter())
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut ExtractedRow> {
        self.columns.iter_mut().flat_map(|column| column.rows.iter_mut())
    }

    /// The value-column ratio of a two-column table, see [`ratio::valid_ratio`].
    pub fn valid_ratio(&self) -> Option<f64> {
        if self.slot_count < 2 {
            return None;
        }
        let ratios: Vec<f64> = self
            .rows()
            .filter_map(|row| {
                let (first, second) = (row.single_value(0)?, row.single_value(1)?);
                ratio::row_ratio(&first, &second, row.attribute().default_unit())
            })
            .collect();
        ratio::valid_ratio(&ratios)
    }

    pub fn positions(&self) -> Vec<RowPosition> {
        self.columns
            .iter()
            .enumerate()
            .flat_map(|(column, rows)| (0..rows.rows.len()).map(move |row| (column, row)))
            .collect()
    }

    /// Position of the first row of `attribute`.
    pub fn position(&self, attribute: Attribute) -> Option<RowPosition> {
        self.positions()
            .into_iter()
            .find(|position| self.row(*position).is_some_and(|row| row.attribute() == attribute))
    }

    pub fn row(&self, (column, row): RowPosition) -> Option<&ExtractedRow> {
        self.columns.get(column)?.rows.get(row)
    }

    pub fn row_mut(&mut self, (column, row): RowPosition) -> Option<&mut ExtractedRow> {
        self.columns.get_mut(column)?.rows.get_mut(row)
    }

    /// Rectangles of the value columns of the first attribute column.
    pub fn value_rects(&self) -> Vec<Bbox> {
        self.columns
            .first()
            .map(|column| column.value_rects.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Top edge of the first value of the grid.
    pub fn values_top(&self) -> Option<f32> {
        self.rows()
            .flat_map(|row| row.values.iter().flatten())
            .filter_map(ValueSlot::rect)
            .map(|rect| rect.min.y)
            .reduce(f32::min)
    }

    /// One observation per attribute, the first populated row winning.
    pub fn observations(&self) -> Vec<Observation> {
        let mut observations: Vec<Observation> = Vec::new();
        for row in self.rows() {
            let value1 = row.slot(0).and_then(ValueText::from_slot);
            let value2 = row.slot(1).and_then(ValueText::from_slot);
            if value1.is_none() && value2.is_none() {
                continue;
            }
            if observations
                .iter()
                .any(|observation| observation.attribute() == row.attribute())
            {
                continue;
            }
            observations.push(match &row.label {
                Some(label) => Observation::nutrient(label.clone(), value1, value2),
                None => Observation::unlabelled(row.attribute, value1, value2),
            });
        }
        observations
    }
}

/// The column entry on the same line as `rect`, nearest centre first.
fn closest_inline<'a>(column: &'a ValuesTextColumn, rect: &Bbox) -> Option<&'a ValuesText> {
    column
        .texts
        .iter()
        .filter(|text| text.rect().is_inline_with(rect))
        .min_by(|a, b| {
            let gap = |text: &ValuesText| (text.rect().center().y - rect.center().y).abs();
            gap(a).total_cmp(&gap(b))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detect::unit::NutritionUnit,
        recognition::RecognizedText,
    };

    fn label(y: f32, string: &str) -> AttributeText {
        let text = RecognizedText::new(Bbox::from_xywh(0.05, y, 0.3, 0.03), vec![string.to_string()]);
        AttributeText::detect(&text).remove(0)
    }

    fn values(x: f32, y: f32, string: &str) -> ValuesText {
        let text = RecognizedText::new(Bbox::from_xywh(x, y, 0.12, 0.03), vec![string.to_string()]);
        ValuesText::new(&text).unwrap()
    }

    #[test]
    fn test_build_grid() {
        let attributes = vec![AttributeColumn::new(vec![
            label(0.1, "Energy"),
            label(0.15, "Protein"),
            label(0.2, "Fat"),
        ])];
        let groups = vec![ColumnGroup {
            attribute_column: 0,
            value_columns: vec![
                ValuesTextColumn::new(vec![values(0.55, 0.1, "150kcal"), values(0.55, 0.205, "8g")]),
                ValuesTextColumn::new(vec![values(0.75, 0.1, "300kcal"), values(0.75, 0.15, "6g")]),
            ],
        }];

        let grid = ExtractedGrid::build(&attributes, &groups, &ScanConfig::default());
        assert_eq!(grid.slot_count, 2);
        assert_eq!(grid.columns[0].rows.len(), 3);
        let protein = grid.row(grid.position(Attribute::Protein).unwrap()).unwrap();
        assert!(protein.slot(0).is_none());
        assert_eq!(protein.single_value(1), Some(Value::new(6.0, Some(NutritionUnit::G))));
        let fat = grid.row((0, 2)).unwrap();
        assert_eq!(fat.single_value(0), Some(Value::new(8.0, Some(NutritionUnit::G))));
        assert_eq!(grid.value_rects().len(), 2);
        assert_eq!(grid.values_top(), Some(0.1));

        let observations = grid.observations();
        assert_eq!(observations.len(), 3);
        assert_eq!(observations[1].value1(), None);
    }

    #[test]
    fn test_build_grid_without_value_columns() {
        let attributes = vec![AttributeColumn::new(vec![label(0.1, "Energy")])];
        assert!(ExtractedGrid::build(&attributes, &[], &ScanConfig::default()).is_empty());

        let groups = vec![ColumnGroup {
            attribute_column: 3,
            value_columns: vec![ValuesTextColumn::new(vec![values(0.55, 0.1, "150")])],
        }];
        let grid = ExtractedGrid::build(&attributes, &groups, &ScanConfig::default());
        assert!(grid.is_empty());
        assert!(grid.observations().is_empty());
    }
}
