use std::sync::LazyLock;

use regex::Regex;
use tracing::*;

use crate::{
    analysis::bbox::Bbox,
    columns::{
        attribute::{AttributeColumn, vertical_bounds},
        value::ValuesTextColumn,
    },
    config::ScanConfig,
    detect::{attribute::Attribute, header::HeaderType, unit::NutritionUnit, value::Value},
    recognition::RecognizedText,
    text::ValuesText,
};

static TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(nutrition|supplement)\s+facts\b|\bnutrition(al)?\s+information\b").unwrap()
});

/// Value columns aligned with one attribute column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnGroup {
    pub attribute_column: usize,
    pub value_columns: Vec<ValuesTextColumn>,
}

/// Every value column of the groups, in group order.
pub fn flatten(groups: &[ColumnGroup]) -> Vec<ValuesTextColumn> {
    groups
        .iter()
        .flat_map(|group| group.value_columns.iter().cloned())
        .collect()
}

/// The ordered cleanup cascade turning raw value columns into the columns
/// of each attribute column.
///
/// Every step works on the whole column set; running the cascade again on
/// its own flattened output changes nothing.
pub struct ColumnCleanup<'a> {
    pub attribute_columns: &'a [AttributeColumn],
    pub texts: &'a [RecognizedText],
    pub config: &'a ScanConfig,
}

impl<'a> ColumnCleanup<'a> {
    pub fn new(
        attribute_columns: &'a [AttributeColumn],
        texts: &'a [RecognizedText],
        config: &'a ScanConfig,
    ) -> Self {
        Self {
            attribute_columns,
            texts,
            config,
        }
    }

    #[tracing::instrument(skip_all)]
    pub fn run(&self, columns: Vec<ValuesTextColumn>) -> Vec<ColumnGroup> {
        debug!("Cleaning up {} value columns", columns.len());
        let columns = self.drop_above_energy_and_title(columns);
        let columns = self.drop_outside_attribute_rows(columns);
        let columns = self.drop_implausible_texts(columns);
        let columns = drop_duplicate_and_empty_columns(columns);
        let columns = self.drop_stray_columns(columns);
        let columns = self.drop_footer_texts(columns);
        let columns = self.drop_subset_and_short_columns(columns);
        let groups = self.group_by_attribute_column(columns);
        let groups = self.drop_attribute_text_columns(groups);
        let groups = self.finalize_groups(groups);
        debug!(
            "Kept value columns {:?}",
            groups
                .iter()
                .map(|group| (group.attribute_column, group.value_columns.len()))
                .collect::<Vec<_>>()
        );
        groups
    }

    /// Step 1: nothing above the first energy reading or the label title
    /// belongs to the table.
    fn drop_above_energy_and_title(&self, columns: Vec<ValuesTextColumn>) -> Vec<ValuesTextColumn> {
        let title_bottom = self
            .texts
            .iter()
            .filter(|text| TITLE.is_match(text.string()))
            .map(|text| text.rect.max.y)
            .reduce(f32::max);
        let energy_label_top = self
            .attribute_columns
            .iter()
            .flat_map(|column| column.rows.iter())
            .filter(|row| row.attribute == Attribute::Energy)
            .map(|row| row.rect().min.y)
            .reduce(f32::min);

        map_columns(columns, |column| {
            let energy_top = energy_label_top.or_else(|| {
                column
                    .texts
                    .iter()
                    .find(|text| text.has_energy_value())
                    .map(|text| text.rect().min.y)
            });
            column
                .texts
                .into_iter()
                .filter(|text| {
                    let rect = text.rect();
                    let below_title = title_bottom.is_none_or(|bottom| rect.center().y > bottom);
                    let below_energy = energy_top.is_none_or(|top| rect.max.y > top);
                    below_title && below_energy
                })
                .collect()
        })
    }

    /// Step 2: values sit between the first and the last attribute row.
    fn drop_outside_attribute_rows(&self, columns: Vec<ValuesTextColumn>) -> Vec<ValuesTextColumn> {
        let Some((top, bottom)) = vertical_bounds(self.attribute_columns) else {
            return columns;
        };
        map_columns(columns, |column| {
            column
                .texts
                .into_iter()
                .filter(|text| text.rect().max.y > top && text.rect().min.y < bottom)
                .collect()
        })
    }

    /// Step 3: fragments with too many readings, absurd amounts or header boilerplate.
    fn drop_implausible_texts(&self, columns: Vec<ValuesTextColumn>) -> Vec<ValuesTextColumn> {
        let max_amount = self.config.max_plausible_amount;
        map_columns(columns, |column| {
            column
                .texts
                .into_iter()
                .filter(|text| {
                    let implausible = text.nutrient_unit_count() > 2
                        || text.values.iter().any(|value| value.amount > max_amount)
                        || HeaderType::detect(text.string()).is_some();
                    if implausible {
                        trace!("Dropping implausible value text `{}`", text.string());
                    }
                    !implausible
                })
                .collect()
        })
    }

    /// Step 5: a column whose single values line up with neither another
    /// column nor an attribute row is a stray number.
    fn drop_stray_columns(&self, columns: Vec<ValuesTextColumn>) -> Vec<ValuesTextColumn> {
        let attribute_rects: Vec<Bbox> = self
            .attribute_columns
            .iter()
            .flat_map(|column| column.rows.iter().map(|row| row.rect()))
            .collect();

        let keep: Vec<bool> = columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let mut singles = column.texts.iter().filter(|text| text.is_single_value()).peekable();
                if singles.peek().is_none() {
                    return true;
                }
                singles.any(|text| {
                    let rect = text.rect();
                    attribute_rects.iter().any(|other| other.is_inline_with(&rect))
                        || columns.iter().enumerate().any(|(other_index, other)| {
                            other_index != index
                                && other.texts.iter().any(|other| {
                                    other.is_single_value()
                                        && !other.is_same_reading(text)
                                        && other.rect().is_inline_with(&rect)
                                })
                        })
                })
            })
            .collect();

        columns
            .into_iter()
            .zip(keep)
            .filter_map(|(column, keep)| keep.then_some(column))
            .collect()
    }

    /// Step 6: long strings without an attribute below the table are footers.
    fn drop_footer_texts(&self, columns: Vec<ValuesTextColumn>) -> Vec<ValuesTextColumn> {
        let Some((_, bottom)) = vertical_bounds(self.attribute_columns) else {
            return columns;
        };
        let min_length = self.config.footer_text_min_length;
        map_columns(columns, |column| {
            column
                .texts
                .into_iter()
                .filter(|text| {
                    let footer = text.string().chars().count() >= min_length
                        && Attribute::detect(text.string()).is_empty()
                        && text.rect().min.y > bottom;
                    !footer
                })
                .collect()
        })
    }

    /// Step 7: subsets of a longer column and columns far shorter than the tallest.
    fn drop_subset_and_short_columns(&self, columns: Vec<ValuesTextColumn>) -> Vec<ValuesTextColumn> {
        let columns = drop_duplicate_and_empty_columns(drop_subsets(columns));
        let tallest = columns.iter().map(ValuesTextColumn::len).max().unwrap_or(0);
        let min_len = tallest as f32 * self.config.short_column_proportion;
        columns
            .into_iter()
            .filter(|column| column.len() as f32 >= min_len)
            .collect()
    }

    /// Step 8: attach each column to the attribute column it is vertically
    /// aligned with and keep the longest few per attribute column.
    fn group_by_attribute_column(&self, columns: Vec<ValuesTextColumn>) -> Vec<ColumnGroup> {
        let attribute_rects: Vec<Option<Bbox>> =
            self.attribute_columns.iter().map(AttributeColumn::rect).collect();
        let mut groups: Vec<ColumnGroup> = (0..self.attribute_columns.len())
            .map(|attribute_column| ColumnGroup {
                attribute_column,
                value_columns: Vec::new(),
            })
            .collect();

        for column in columns {
            let Some(rect) = column.single_value_rect() else {
                continue;
            };
            let best = attribute_rects
                .iter()
                .enumerate()
                .filter_map(|(index, attribute_rect)| {
                    let ratio = attribute_rect.as_ref()?.vertical_intersection_ratio(&rect);
                    (ratio >= self.config.column_group_intersection_ratio).then_some((index, ratio))
                })
                .fold(None, |best: Option<(usize, f32)>, (index, ratio)| match best {
                    Some((_, best_ratio)) if best_ratio >= ratio => best,
                    _ => Some((index, ratio)),
                });
            match best.and_then(|(index, _)| groups.get_mut(index)) {
                Some(group) => group.value_columns.push(column),
                None => trace!("Value column at {:?} aligns with no attribute column", rect),
            }
        }

        let max_columns = self.config.max_value_columns_per_group;
        for group in groups.iter_mut() {
            group.value_columns.sort_by(|a, b| b.len().cmp(&a.len()));
            group.value_columns.truncate(max_columns);
        }
        groups
    }

    /// Step 9: columns starting inside, or right at the edge of, the
    /// attribute labels are part of the labels.
    fn drop_attribute_text_columns(&self, groups: Vec<ColumnGroup>) -> Vec<ColumnGroup> {
        let Some(first) = self.attribute_columns.first().and_then(AttributeColumn::rect) else {
            return groups;
        };
        let edge = first.max.x + first.width() * self.config.attribute_edge_margin;

        groups
            .into_iter()
            .map(|mut group| {
                group
                    .value_columns
                    .retain(|column| column.rect().is_some_and(|rect| rect.min.x >= edge));
                group
            })
            .collect()
    }

    /// Step 10: left-to-right order, dual readings split into two columns and
    /// one energy unit per column.
    fn finalize_groups(&self, groups: Vec<ColumnGroup>) -> Vec<ColumnGroup> {
        let max_columns = self.config.max_value_columns_per_group;
        groups
            .into_iter()
            .map(|group| {
                let mut columns = group.value_columns;
                columns.sort_by(|a, b| {
                    let x = |column: &ValuesTextColumn| column.rect().map(|rect| rect.min.x).unwrap_or(0.0);
                    x(a).total_cmp(&x(b))
                });
                let columns = drop_subsets(columns);

                let mut columns: Vec<ValuesTextColumn> = columns.into_iter().flat_map(split_dual_column).collect();
                columns.truncate(max_columns);

                let value_columns = columns
                    .into_iter()
                    .map(resolve_energy)
                    .filter(|column| !column.is_empty())
                    .collect();
                ColumnGroup {
                    attribute_column: group.attribute_column,
                    value_columns,
                }
            })
            .filter(|group| !group.value_columns.is_empty())
            .collect()
    }
}

fn map_columns(
    columns: Vec<ValuesTextColumn>,
    filter: impl Fn(ValuesTextColumn) -> Vec<ValuesText>,
) -> Vec<ValuesTextColumn> {
    columns
        .into_iter()
        .map(|column| ValuesTextColumn::new(filter(column)))
        .collect()
}

/// Step 4: identical columns come from seeds of the same printed column.
fn drop_duplicate_and_empty_columns(columns: Vec<ValuesTextColumn>) -> Vec<ValuesTextColumn> {
    let mut kept: Vec<ValuesTextColumn> = Vec::new();
    for column in columns {
        if !column.is_empty() && !kept.iter().any(|other| other.has_same_readings(&column)) {
            kept.push(column);
        }
    }
    kept
}

fn drop_subsets(columns: Vec<ValuesTextColumn>) -> Vec<ValuesTextColumn> {
    let keep: Vec<bool> = columns
        .iter()
        .map(|column| !columns.iter().any(|other| column.is_strict_subset_of(other)))
        .collect();
    columns
        .into_iter()
        .zip(keep)
        .filter_map(|(column, keep)| keep.then_some(column))
        .collect()
}

/// A column whose every fragment reads two values ("150 630") is two columns.
fn split_dual_column(column: ValuesTextColumn) -> Vec<ValuesTextColumn> {
    let dual = !column.is_empty() && column.texts.iter().all(|text| text.values.len() == 2);
    if !dual {
        return vec![column];
    }
    trace!("Splitting dual value column of {} rows", column.len());
    (0..2)
        .map(|index| ValuesTextColumn::new(column.texts.iter().filter_map(|text| text.split(index)).collect()))
        .collect()
}

/// Keeps one energy unit per column, kilojoules when both are printed; the
/// first reading wins among readings of the same unit.
fn resolve_energy(column: ValuesTextColumn) -> ValuesTextColumn {
    let has_kj = column
        .texts
        .iter()
        .flat_map(|text| text.values.iter())
        .any(|value| value.unit == Some(NutritionUnit::Kj));
    let preferred = match has_kj {
        true => NutritionUnit::Kj,
        false => NutritionUnit::Kcal,
    };

    let mut seen_preferred = false;
    let texts = column
        .texts
        .into_iter()
        .filter_map(|text| {
            if !text.has_energy_value() {
                return Some(text);
            }
            let mut values: Vec<Value> = Vec::new();
            for value in &text.values {
                match value.unit {
                    Some(unit) if unit.is_energy() && (unit != preferred || seen_preferred) => {}
                    Some(unit) if unit.is_energy() => {
                        seen_preferred = true;
                        values.push(*value);
                    }
                    _ => values.push(*value),
                }
            }
            if values.len() != text.values.len() {
                trace!("Energy readings of `{}` reduced to {:?}", text.string(), values);
            }
            text.replace_values(values)
        })
        .collect();

    ValuesTextColumn::new(texts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        columns::{attribute::build_attribute_columns, value::build_value_columns},
        text::AttributeText,
    };

    fn text(x: f32, y: f32, string: &str) -> RecognizedText {
        RecognizedText::new(Bbox::from_xywh(x, y, 0.12, 0.03), vec![string.to_string()])
    }

    fn label(x: f32, y: f32, string: &str) -> RecognizedText {
        RecognizedText::new(Bbox::from_xywh(x, y, 0.3, 0.03), vec![string.to_string()])
    }

    fn strings(column: &ValuesTextColumn) -> Vec<&str> {
        column.texts.iter().map(ValuesText::string).collect()
    }

    fn two_column_label() -> Vec<RecognizedText> {
        vec![
            label(0.05, 0.02, "Nutrition Facts"),
            text(0.55, 0.06, "Per serving"),
            text(0.75, 0.06, "Per 100g"),
            label(0.05, 0.1, "Energy"),
            label(0.05, 0.15, "Protein"),
            label(0.05, 0.2, "Fat"),
            label(0.05, 0.25, "Carbohydrate"),
            label(0.05, 0.3, "Sodium"),
            text(0.55, 0.1, "630kJ"),
            text(0.55, 0.15, "3.0g"),
            text(0.55, 0.2, "8.0g"),
            text(0.55, 0.25, "18g"),
            text(0.55, 0.3, "120mg"),
            text(0.75, 0.1, "1260kJ"),
            text(0.75, 0.15, "6.0g"),
            text(0.75, 0.2, "16g"),
            text(0.75, 0.25, "36g"),
            text(0.75, 0.3, "240mg"),
            text(0.05, 0.4, "Based on a 8700 kJ average adult diet"),
            text(0.55, 0.5, "2"),
        ]
    }

    fn clean(texts: &[RecognizedText]) -> (Vec<AttributeColumn>, Vec<ColumnGroup>) {
        let config = ScanConfig::default();
        let attributes = build_attribute_columns(texts, &config);
        let columns = build_value_columns(texts, &config);
        let groups = ColumnCleanup::new(&attributes, texts, &config).run(columns);
        (attributes, groups)
    }

    #[test]
    fn test_cascade_two_columns() {
        let texts = two_column_label();
        let (attributes, groups) = clean(&texts);
        assert_eq!(attributes.len(), 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].attribute_column, 0);
        assert_eq!(groups[0].value_columns.len(), 2);
        assert_eq!(
            strings(&groups[0].value_columns[0]),
            vec!["630kJ", "3.0g", "8.0g", "18g", "120mg"]
        );
        assert_eq!(
            strings(&groups[0].value_columns[1]),
            vec!["1260kJ", "6.0g", "16g", "36g", "240mg"]
        );
    }

    #[test]
    fn test_cascade_is_idempotent() {
        let texts = two_column_label();
        let config = ScanConfig::default();
        let (attributes, groups) = clean(&texts);
        let again = ColumnCleanup::new(&attributes, &texts, &config).run(flatten(&groups));
        assert_eq!(again, groups);
    }

    #[test]
    fn test_split_dual_column() {
        let column = ValuesTextColumn::new(
            [text(0.6, 0.1, "150 150"), text(0.6, 0.15, "8g 8g")]
                .iter()
                .filter_map(ValuesText::new)
                .collect(),
        );
        let split = split_dual_column(column);
        assert_eq!(split.len(), 2);
        assert_eq!(split[1].texts[1].single_value(), Some(Value::new(8.0, Some(NutritionUnit::G))));
        assert_eq!(split[1].texts[1].part, Some(1));
    }

    #[test]
    fn test_resolve_energy_prefers_kilojoules() {
        let column = ValuesTextColumn::new(
            [
                text(0.6, 0.1, "250kcal"),
                text(0.6, 0.15, "1046kJ 250kcal"),
                text(0.6, 0.2, "1046kJ"),
                text(0.6, 0.25, "3g"),
            ]
            .iter()
            .filter_map(ValuesText::new)
            .collect(),
        );
        let resolved = resolve_energy(column);
        assert_eq!(strings(&resolved), vec!["1046kJ 250kcal", "3g"]);
        assert_eq!(
            resolved.texts[0].values,
            vec![Value::new(1046.0, Some(NutritionUnit::Kj))]
        );
    }

    #[test]
    fn test_attribute_text_column_dropped() {
        let attributes = vec![AttributeColumn::new(
            [label(0.05, 0.1, "Protein"), label(0.05, 0.15, "Fat"), label(0.05, 0.2, "Sugars")]
                .iter()
                .flat_map(AttributeText::detect)
                .collect(),
        )];
        let texts: Vec<RecognizedText> = vec![];
        let config = ScanConfig::default();
        let cleanup = ColumnCleanup::new(&attributes, &texts, &config);

        let inside = ValuesTextColumn::new(
            [text(0.3, 0.1, "12"), text(0.3, 0.15, "3"), text(0.3, 0.2, "1")]
                .iter()
                .filter_map(ValuesText::new)
                .collect(),
        );
        let outside = ValuesTextColumn::new(
            [text(0.6, 0.1, "12g"), text(0.6, 0.15, "3g"), text(0.6, 0.2, "1g")]
                .iter()
                .filter_map(ValuesText::new)
                .collect(),
        );
        let groups = cleanup.drop_attribute_text_columns(vec![ColumnGroup {
            attribute_column: 0,
            value_columns: vec![inside, outside.clone()],
        }]);
        assert_eq!(groups[0].value_columns, vec![outside]);
    }
}
