use tracing::*;
use uuid::Uuid;

use crate::{
    analysis::bbox::Bbox,
    config::ScanConfig,
    detect::{attribute::Attribute, unit::NutritionUnit, value::Value},
    grid::{
        ExtractedGrid, ExtractedRow, RowPosition,
        energy::{EnergyEquation, round_amount},
        ratio::{comparable_amounts, deviation, row_ratio},
    },
    text::{ValueSlot, ValuesText},
};

/// Repairs an extracted grid with label arithmetic.
///
/// Each pass takes the whole grid and hands it back, so passes never hold
/// references into rows another pass edits.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    config: &'a ScanConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a ScanConfig) -> Self {
        Self { config }
    }

    #[tracing::instrument(skip_all)]
    pub fn run(&self, grid: ExtractedGrid) -> ExtractedGrid {
        let grid = drop_misplaced_values(grid);
        let grid = resolve_duplicate_readings(grid);
        let grid = resolve_single_column_energy(grid);
        let grid = split_shared_fragments(grid);
        let grid = distribute_across_columns(grid);
        let grid = pick_pairs_by_ratio(grid);
        let grid = fix_parent_child(grid);

        let ratio = grid.valid_ratio();
        debug!("Valid ratio: {:?}", ratio);
        let grid = fill_from_ratio(grid, ratio);
        let grid = self.repair_invalid_rows(grid, ratio);
        let grid = reconcile_energy_units(grid);
        let grid = self.repair_energy_equation(grid, ratio);
        let grid = fill_from_energy_equation(grid);
        drop_unresolved_rows(grid)
    }

    /// Rows whose ratio strays from the valid one get their alternate readings
    /// tried; energy rows are left alone.
    fn repair_invalid_rows(&self, mut grid: ExtractedGrid, ratio: Option<f64>) -> ExtractedGrid {
        let Some(ratio) = ratio else {
            return grid;
        };

        for row in grid.rows_mut() {
            let attribute = row.attribute();
            if attribute == Attribute::Energy {
                continue;
            }
            let (Some(first), Some(second)) = (row.slot(0).cloned(), row.slot(1).cloned()) else {
                continue;
            };
            let threshold = match first.is_less_than() || second.is_less_than() {
                true => self.config.less_than_ratio_error_threshold,
                false => self.config.ratio_error_threshold,
            };
            let consistent = |a: &ValueSlot, b: &ValueSlot| {
                pair_consistency(a, b, ratio, threshold, attribute) == Some(true)
            };
            if pair_consistency(&first, &second, ratio, threshold, attribute) != Some(false) {
                continue;
            }

            let firsts = alternate_slots(&first, attribute);
            let seconds = alternate_slots(&second, attribute);
            let repaired = firsts
                .iter()
                .map(|a| (a.clone(), second.clone()))
                .chain(seconds.iter().map(|b| (first.clone(), b.clone())))
                .chain(
                    firsts
                        .iter()
                        .flat_map(|a| seconds.iter().map(move |b| (a.clone(), b.clone()))),
                )
                .find(|(a, b)| consistent(a, b));

            match repaired {
                Some((a, b)) => {
                    debug!("Repaired {} from alternate readings", attribute);
                    row.values = [Some(a), Some(b)];
                    row.invalid = false;
                }
                None => {
                    debug!("{} breaks the column ratio", attribute);
                    row.invalid = true;
                }
            }
        }

        grid
    }

    /// A column whose energy disagrees with its macronutrients gets the
    /// alternate readings of those cells tried, one cell at a time before
    /// two. The first combination that balances the equation is kept.
    fn repair_energy_equation(&self, mut grid: ExtractedGrid, ratio: Option<f64>) -> ExtractedGrid {
        let threshold = self.config.energy_error_threshold;
        for slot in 0..grid.slot_count {
            let equation = equation_of(&grid, slot);
            if equation.error().is_none() || equation.is_satisfied(threshold) {
                continue;
            }
            // the other column only constrains the repair once it balances itself
            let other_slot = 1 - slot;
            let ratio = ratio.filter(|_| grid.slot_count == 2 && equation_of(&grid, other_slot).is_satisfied(threshold));

            let terms: Vec<EquationTerm> = EQUATION_TERMS
                .iter()
                .filter_map(|attribute| {
                    let position = grid.position(*attribute)?;
                    let row = grid.row(position)?;
                    let cell = row.slot(slot)?.clone();
                    Some(EquationTerm {
                        position,
                        attribute: *attribute,
                        alternates: alternate_slots(&cell, *attribute),
                        other: row.slot(other_slot).cloned(),
                        cell,
                    })
                })
                .collect();
            let terms = terms.as_slice();

            let fits = |combination: &Vec<(usize, &ValueSlot)>| {
                let reading = |attribute: Attribute| {
                    let (index, term) = terms.iter().enumerate().find(|(_, term)| term.attribute == attribute)?;
                    combination
                        .iter()
                        .find(|(replaced, _)| *replaced == index)
                        .map_or(&term.cell, |(_, cell)| *cell)
                        .single_value()
                };
                let equation = EnergyEquation::from_values(
                    reading(Attribute::Energy),
                    reading(Attribute::Carbohydrate),
                    reading(Attribute::Protein),
                    reading(Attribute::Fat),
                );
                if !equation.is_satisfied(threshold) {
                    return false;
                }
                let Some(ratio) = ratio else {
                    return true;
                };
                combination.iter().all(|(index, cell)| {
                    let Some(term) = terms.get(*index) else {
                        return false;
                    };
                    let Some(other) = term.other.as_ref().filter(|_| term.attribute.is_macro()) else {
                        return true;
                    };
                    let (first, second) = match slot {
                        0 => (*cell, other),
                        _ => (other, *cell),
                    };
                    pair_consistency(first, second, ratio, self.config.ratio_error_threshold, term.attribute) != Some(false)
                })
            };

            let singles = terms
                .iter()
                .enumerate()
                .flat_map(|(index, term)| term.alternates.iter().map(move |cell| vec![(index, cell)]));
            let pairs = terms.iter().enumerate().flat_map(move |(i, a)| {
                terms.iter().enumerate().skip(i + 1).flat_map(move |(j, b)| {
                    a.alternates
                        .iter()
                        .flat_map(move |x| b.alternates.iter().map(move |y| vec![(i, x), (j, y)]))
                })
            });
            let repair: Option<Vec<(RowPosition, Attribute, ValueSlot)>> = singles
                .chain(pairs)
                .find(|combination| fits(combination))
                .map(|combination| {
                    combination
                        .into_iter()
                        .filter_map(|(index, cell)| {
                            let term = terms.get(index)?;
                            Some((term.position, term.attribute, cell.clone()))
                        })
                        .collect()
                });

            let Some(repair) = repair else {
                debug!("Energy equation of column {} stays unbalanced", slot);
                continue;
            };
            for (position, attribute, cell) in repair {
                debug!("Balanced the energy equation with another reading of {}", attribute);
                if let Some(row) = grid.row_mut(position) {
                    row.values[slot] = Some(cell);
                }
            }
        }
        grid
    }
}

/// Attributes tied together by the energy equation.
const EQUATION_TERMS: [Attribute; 4] = [
    Attribute::Energy,
    Attribute::Carbohydrate,
    Attribute::Protein,
    Attribute::Fat,
];

/// One cell of the energy equation with its alternate readings.
struct EquationTerm {
    position: RowPosition,
    attribute: Attribute,
    cell: ValueSlot,
    alternates: Vec<ValueSlot>,
    /// The same row's cell in the other column.
    other: Option<ValueSlot>,
}

fn equation_of(grid: &ExtractedGrid, slot: usize) -> EnergyEquation {
    let value = |attribute| {
        grid.position(attribute)
            .and_then(|position| grid.row(position))
            .and_then(|row| row.single_value(slot))
    };
    EnergyEquation::from_values(
        value(Attribute::Energy),
        value(Attribute::Carbohydrate),
        value(Attribute::Protein),
        value(Attribute::Fat),
    )
}

/// Whether two cells agree with the valid ratio, `None` when they cannot be compared.
fn pair_consistency(
    first: &ValueSlot,
    second: &ValueSlot,
    ratio: f64,
    threshold: f64,
    attribute: Attribute,
) -> Option<bool> {
    let (a, b) = comparable_amounts(
        &first.single_value()?,
        &second.single_value()?,
        attribute.default_unit(),
    )?;
    if b == 0.0 {
        return Some(a == 0.0);
    }
    Some(deviation(a / b, ratio) <= threshold)
}

/// Single readings of the cell's other OCR candidates that suit `attribute`.
fn alternate_slots(slot: &ValueSlot, attribute: Attribute) -> Vec<ValueSlot> {
    let Some(text) = slot.values_text() else {
        return Vec::new();
    };
    let current = slot.single_value();
    text.alternate_values()
        .into_iter()
        .filter_map(|(candidate, values)| {
            let value = values
                .into_iter()
                .find(|value| !value.is_percent() && attribute.supports_unit(value.unit))?;
            Some((candidate, value))
        })
        .filter(|(_, value)| Some(*value) != current)
        .filter_map(|(candidate, value)| text.from_candidate(candidate, vec![value]).map(ValueSlot::Recognized))
        .collect()
}

fn grams(slot: &ValueSlot, attribute: Attribute) -> Option<f64> {
    slot.single_value()?.grams(attribute.default_unit())
}

/// Unit-bearing readings win over percentages and bare numbers; bare
/// numbers win over percentages.
fn drop_extraneous_values(values: &[Value]) -> Vec<Value> {
    let is_amount = |value: &Value| value.unit.is_some() && !value.is_percent();
    let has_amount = values.iter().any(is_amount);
    let has_plain = values.iter().any(|value| value.unit.is_none());

    values
        .iter()
        .copied()
        .filter(|value| match (has_amount, has_plain) {
            (true, _) => is_amount(value),
            (false, true) => !value.is_percent(),
            (false, false) => true,
        })
        .collect()
}

fn lies_outside(text: &ValuesText, rect: &Bbox) -> bool {
    if text.is_single_value() {
        let center = text.rect().center().x;
        center < rect.min.x || center > rect.max.x
    } else {
        // several readings span more than one column
        text.rect().horizontal_overlap(rect) <= 0.0
    }
}

fn drop_misplaced_values(mut grid: ExtractedGrid) -> ExtractedGrid {
    for column in &mut grid.columns {
        let value_rects = column.value_rects;
        for row in &mut column.rows {
            let attribute = row.attribute();
            for (slot, rect) in row.values.iter_mut().zip(value_rects) {
                let next = match slot.as_ref() {
                    Some(ValueSlot::Recognized(text)) => {
                        if rect.is_some_and(|rect| lies_outside(text, &rect)) {
                            trace!("Dropped `{}` outside its column for {}", text.string(), attribute);
                            Some(None)
                        } else {
                            let kept = drop_extraneous_values(&text.values);
                            (kept.len() != text.values.len())
                                .then(|| text.replace_values(kept).map(ValueSlot::Recognized))
                        }
                    }
                    _ => None,
                };
                if let Some(next) = next {
                    *slot = next;
                }
            }
        }
    }
    grid
}

/// A fragment matched in both columns stays in the one whose centre is closer.
fn resolve_duplicate_readings(mut grid: ExtractedGrid) -> ExtractedGrid {
    for column in &mut grid.columns {
        let value_rects = column.value_rects;
        for row in &mut column.rows {
            let center = match (&row.values[0], &row.values[1]) {
                (Some(ValueSlot::Recognized(a)), Some(ValueSlot::Recognized(b))) if a.is_same_reading(b) => {
                    a.rect().center().x
                }
                _ => continue,
            };
            let distance = |rect: Option<Bbox>| {
                rect.map(|rect| (rect.center().x - center).abs())
                    .unwrap_or(f32::MAX)
            };
            let dropped = match distance(value_rects[1]) < distance(value_rects[0]) {
                true => 0,
                false => 1,
            };
            row.values[dropped] = None;
        }
    }
    grid
}

/// On a single-column label a row holding two bare numbers for energy
/// carries kilojoules and kilocalories; the larger one is the kilojoules.
fn resolve_single_column_energy(mut grid: ExtractedGrid) -> ExtractedGrid {
    if grid.slot_count != 1 {
        return grid;
    }
    for row in grid.rows_mut() {
        if row.attribute() != Attribute::Energy {
            continue;
        }
        let Some(ValueSlot::Recognized(text)) = &row.values[0] else {
            continue;
        };
        let [a, b] = text.values.as_slice() else {
            continue;
        };
        if a.unit.is_some() || b.unit.is_some() {
            continue;
        }
        let energy = Value::new(a.amount.max(b.amount), Some(NutritionUnit::Kj));
        debug!("Read `{}` as {}", text.string(), energy);
        let replaced = text.replace_values(vec![energy]);
        row.values[0] = replaced.map(ValueSlot::Recognized);
    }
    grid
}

/// Tracks which value of a fragment shared by consecutive rows goes to the
/// next row. Starts over whenever the fragment changes.
#[derive(Debug, Default)]
struct SharedFragmentCursor {
    text: Option<Uuid>,
    index: usize,
}

impl SharedFragmentCursor {
    fn advance(&mut self, id: Uuid) -> usize {
        if self.text == Some(id) {
            self.index += 1;
        } else {
            self.text = Some(id);
            self.index = 0;
        }
        self.index
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A multi-value fragment matched by consecutive rows gives each row one of
/// its values, in order.
fn split_shared_fragments(mut grid: ExtractedGrid) -> ExtractedGrid {
    for column in &mut grid.columns {
        for slot in 0..2 {
            let ids: Vec<Option<Uuid>> = column
                .rows
                .iter()
                .map(|row| {
                    row.slot(slot)
                        .and_then(ValueSlot::values_text)
                        .map(ValuesText::id)
                })
                .collect();

            let mut cursor = SharedFragmentCursor::default();
            for (index, row) in column.rows.iter_mut().enumerate() {
                let Some(id) = ids[index] else {
                    cursor.reset();
                    continue;
                };
                let previous = index.checked_sub(1).and_then(|previous| ids[previous]);
                let next = ids.get(index + 1).copied().flatten();
                if previous != Some(id) && next != Some(id) {
                    cursor.reset();
                    continue;
                }

                let part = cursor.advance(id);
                let Some(ValueSlot::Recognized(text)) = &row.values[slot] else {
                    continue;
                };
                if text.is_single_value() {
                    continue;
                }
                trace!("Row {} takes value {} of `{}`", row.attribute, part, text.string());
                let split = text.split(part);
                row.values[slot] = split.map(ValueSlot::Recognized);
            }
        }
    }
    grid
}

/// A two-column row whose numbers all came in one fragment gets the first
/// number in the first column and the second in the second.
fn distribute_across_columns(mut grid: ExtractedGrid) -> ExtractedGrid {
    if grid.slot_count != 2 {
        return grid;
    }
    for row in grid.rows_mut() {
        let text = match (&row.values[0], &row.values[1]) {
            (Some(ValueSlot::Recognized(text)), None) | (None, Some(ValueSlot::Recognized(text)))
                if text.values.len() >= 2 =>
            {
                text.clone()
            }
            (Some(ValueSlot::Recognized(a)), Some(ValueSlot::Recognized(b)))
                if a.values.len() >= 2 && a.is_same_reading(b) =>
            {
                a.clone()
            }
            _ => continue,
        };
        row.values = [
            text.split(0).map(ValueSlot::Recognized),
            text.split(1).map(ValueSlot::Recognized),
        ];
    }
    grid
}

/// Cells still holding several numbers keep the pair closest to the valid ratio.
fn pick_pairs_by_ratio(mut grid: ExtractedGrid) -> ExtractedGrid {
    let Some(ratio) = grid.valid_ratio() else {
        return grid;
    };
    for row in grid.rows_mut() {
        if !row.has_multiple_values() {
            continue;
        }
        let (Some(first), Some(second)) = (row.slot(0).cloned(), row.slot(1).cloned()) else {
            continue;
        };
        let default_unit = row.attribute().default_unit();
        let best = first
            .values()
            .iter()
            .flat_map(|a| second.values().iter().map(move |b| (*a, *b)))
            .filter_map(|(a, b)| Some((a, b, deviation(row_ratio(&a, &b, default_unit)?, ratio))))
            .min_by(|x, y| x.2.total_cmp(&y.2));
        let Some((a, b, _)) = best else {
            continue;
        };

        for (index, (slot, value)) in [(first, a), (second, b)].into_iter().enumerate() {
            if let ValueSlot::Recognized(text) = &slot {
                if !text.is_single_value() {
                    row.values[index] = text.replace_values(vec![value]).map(ValueSlot::Recognized);
                }
            }
        }
    }
    grid
}

/// A part never outweighs its whole: the part's alternate readings are tried
/// first, then the whole's. A conflict neither resolves clears the part.
fn fix_parent_child(mut grid: ExtractedGrid) -> ExtractedGrid {
    for position in grid.positions() {
        let Some(child) = grid.row(position).map(|row| row.attribute()) else {
            continue;
        };
        let Some(parent) = child.parent() else {
            continue;
        };
        let Some(parent_position) = grid.position(parent) else {
            continue;
        };

        for slot in 0..grid.slot_count {
            let cell = |position| grid.row(position).and_then(|row| row.slot(slot)).cloned();
            let (Some(child_cell), Some(parent_cell)) = (cell(position), cell(parent_position)) else {
                continue;
            };
            let (Some(child_grams), Some(parent_grams)) = (grams(&child_cell, child), grams(&parent_cell, parent)) else {
                continue;
            };
            if child_grams <= parent_grams {
                continue;
            }

            let child_fix = alternate_slots(&child_cell, child)
                .into_iter()
                .find(|alternate| grams(alternate, child).is_some_and(|grams| grams <= parent_grams));
            let parent_fix = || {
                alternate_slots(&parent_cell, parent)
                    .into_iter()
                    .find(|alternate| grams(alternate, parent).is_some_and(|grams| grams >= child_grams))
            };

            let (target, replacement) = match child_fix {
                Some(fix) => (position, Some(fix)),
                None => match parent_fix() {
                    Some(fix) => (parent_position, Some(fix)),
                    None => (position, None),
                },
            };
            debug!("{} exceeds {} in column {}", child, parent, slot);
            if let Some(row) = grid.row_mut(target) {
                row.values[slot] = replacement;
            }
        }
    }
    grid
}

/// A two-column row missing one value gets it from the other through the valid ratio.
fn fill_from_ratio(mut grid: ExtractedGrid, ratio: Option<f64>) -> ExtractedGrid {
    let Some(ratio) = ratio else {
        return grid;
    };
    if grid.slot_count != 2 {
        return grid;
    }
    for row in grid.rows_mut() {
        let missing = match (row.slot(0).is_some(), row.slot(1).is_some()) {
            (true, false) => 1,
            (false, true) => 0,
            _ => continue,
        };
        let Some(known) = row.single_value(1 - missing) else {
            continue;
        };
        let amount = match missing {
            1 => known.amount / ratio,
            _ => known.amount * ratio,
        };
        let filled = Value::new(round_amount(amount), known.unit);
        trace!("Filled {} with {}", row.attribute, filled);
        row.values[missing] = Some(ValueSlot::Computed(filled));
    }
    grid
}

/// Energy printed in kilojoules in one column and kilocalories in the other
/// is brought to the unit of the first column.
fn reconcile_energy_units(mut grid: ExtractedGrid) -> ExtractedGrid {
    for row in grid.rows_mut() {
        if row.attribute() != Attribute::Energy {
            continue;
        }
        let (Some(first), Some(second)) = (row.single_value(0), row.single_value(1)) else {
            continue;
        };
        let (Some(target), Some(source)) = (first.unit, second.unit) else {
            continue;
        };
        if target == source {
            continue;
        }
        let Some(amount) = NutritionUnit::convert_energy(second.amount, source, target) else {
            continue;
        };

        let converted = Value::new(round_amount(amount), Some(target));
        row.values[1] = match row.values[1].take() {
            Some(ValueSlot::Recognized(text)) => text
                .replace_values(vec![converted])
                .map(ValueSlot::Recognized),
            _ => Some(ValueSlot::Computed(converted)),
        };
    }
    grid
}

/// Solves the energy equation for a single missing reading of each column.
/// An attribute the table has no row for gets an unlabelled one, next to
/// the rows the equation was solved from.
fn fill_from_energy_equation(mut grid: ExtractedGrid) -> ExtractedGrid {
    for slot in 0..grid.slot_count {
        let Some((attribute, amount)) = equation_of(&grid, slot).missing() else {
            continue;
        };
        let position = grid.position(attribute);

        let filled = match attribute {
            Attribute::Energy => {
                let other = position
                    .and_then(|position| grid.row(position))
                    .and_then(|row| row.single_value(1 - slot))
                    .and_then(|value| value.unit);
                match other {
                    Some(NutritionUnit::Kj) => NutritionUnit::convert_energy(amount, NutritionUnit::Kcal, NutritionUnit::Kj)
                        .map(|kilojoules| Value::new(round_amount(kilojoules), Some(NutritionUnit::Kj))),
                    _ => Some(Value::new(amount, Some(NutritionUnit::Kcal))),
                }
            }
            _ => Some(Value::new(amount, Some(NutritionUnit::G))),
        };
        let Some(filled) = filled else {
            continue;
        };

        let Some(position) = position else {
            let column = EQUATION_TERMS
                .iter()
                .find_map(|term| grid.position(*term))
                .map(|(column, _)| column);
            let Some(column) = column.and_then(|column| grid.columns.get_mut(column)) else {
                continue;
            };
            debug!("Added {} solved from the energy equation", attribute);
            let mut values = [None, None];
            values[slot] = Some(ValueSlot::Computed(filled));
            column.rows.push(ExtractedRow::unlabelled(attribute, values));
            continue;
        };
        let Some(row) = grid.row_mut(position) else {
            continue;
        };
        if row.values[slot].is_some() {
            continue;
        }
        debug!("Solved {} from the energy equation", attribute);
        row.values[slot] = Some(ValueSlot::Computed(filled));
    }
    grid
}

fn drop_unresolved_rows(mut grid: ExtractedGrid) -> ExtractedGrid {
    for column in &mut grid.columns {
        column
            .rows
            .retain(|row| !row.is_empty() && !row.has_multiple_values());
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grid::ExtractedColumn,
        recognition::RecognizedText,
        text::AttributeText,
    };

    fn attribute(attribute: Attribute) -> AttributeText {
        let text = RecognizedText::new(Bbox::from_xywh(0.05, 0.1, 0.3, 0.03), vec![attribute.name().to_string()]);
        AttributeText::new(attribute, text)
    }

    fn cell(x: f32, candidates: &[&str]) -> Option<ValueSlot> {
        let text = RecognizedText::new(
            Bbox::from_xywh(x, 0.1, 0.1, 0.03),
            candidates.iter().map(|candidate| candidate.to_string()).collect(),
        );
        ValuesText::new(&text).map(ValueSlot::Recognized)
    }

    fn row(name: Attribute, first: Option<ValueSlot>, second: Option<ValueSlot>) -> ExtractedRow {
        ExtractedRow::new(attribute(name), [first, second])
    }

    fn grid(slot_count: usize, rows: Vec<ExtractedRow>) -> ExtractedGrid {
        ExtractedGrid {
            columns: vec![ExtractedColumn {
                rows,
                value_rects: [None, None],
            }],
            slot_count,
        }
    }

    fn reconcile(grid: ExtractedGrid) -> ExtractedGrid {
        Reconciler::new(&ScanConfig::default()).run(grid)
    }

    fn value(grid: &ExtractedGrid, attribute: Attribute, slot: usize) -> Option<Value> {
        grid.row(grid.position(attribute)?)?.single_value(slot)
    }

    fn g(amount: f64) -> Option<Value> {
        Some(Value::new(amount, Some(NutritionUnit::G)))
    }

    #[test]
    fn test_invalid_row_repaired_from_alternates() {
        let grid = reconcile(grid(
            2,
            vec![
                row(Attribute::Protein, cell(0.5, &["5g"]), cell(0.7, &["5g"])),
                row(Attribute::Fat, cell(0.5, &["3g"]), cell(0.7, &["3g"])),
                row(Attribute::Carbohydrate, cell(0.5, &["18g"]), cell(0.7, &["78g", "18g"])),
            ],
        ));
        assert_eq!(value(&grid, Attribute::Carbohydrate, 0), g(18.0));
        assert_eq!(value(&grid, Attribute::Carbohydrate, 1), g(18.0));
        assert!(grid.rows().all(|row| !row.invalid));
    }

    #[test]
    fn test_invalid_row_flagged_and_kept() {
        let grid = reconcile(grid(
            2,
            vec![
                row(Attribute::Protein, cell(0.5, &["5g"]), cell(0.7, &["10g"])),
                row(Attribute::Fat, cell(0.5, &["3g"]), cell(0.7, &["6g"])),
                row(Attribute::Salt, cell(0.5, &["1g"]), cell(0.7, &["9g"])),
            ],
        ));
        let salt = grid.row(grid.position(Attribute::Salt).unwrap()).unwrap();
        assert!(salt.invalid);
        assert_eq!(salt.single_value(1), g(9.0));
    }

    #[test]
    fn test_single_column_energy_pair() {
        let grid = reconcile(grid(1, vec![row(Attribute::Energy, cell(0.5, &["630, 150"]), None)]));
        assert_eq!(
            value(&grid, Attribute::Energy, 0),
            Some(Value::new(630.0, Some(NutritionUnit::Kj)))
        );
    }

    #[test]
    fn test_fill_from_ratio() {
        let grid = reconcile(grid(
            2,
            vec![
                row(Attribute::Protein, cell(0.5, &["5g"]), cell(0.7, &["10g"])),
                row(Attribute::Fat, cell(0.5, &["2g"]), cell(0.7, &["4g"])),
                row(Attribute::Sugar, cell(0.5, &["1.5g"]), None),
            ],
        ));
        assert_eq!(value(&grid, Attribute::Sugar, 1), g(3.0));
        let sugar = grid.row(grid.position(Attribute::Sugar).unwrap()).unwrap();
        assert!(matches!(sugar.slot(1), Some(ValueSlot::Computed(_))));
    }

    #[test]
    fn test_child_never_exceeds_parent() {
        let grid = reconcile(grid(
            1,
            vec![
                row(Attribute::Carbohydrate, cell(0.5, &["10g"]), None),
                row(Attribute::Sugar, cell(0.5, &["80g", "8.0g"]), None),
                row(Attribute::Fat, cell(0.5, &["2g"]), None),
                row(Attribute::SaturatedFat, cell(0.5, &["5g"]), None),
            ],
        ));
        assert_eq!(value(&grid, Attribute::Sugar, 0), g(8.0));
        // nothing repairs the saturated fat reading
        assert!(grid.position(Attribute::SaturatedFat).is_none());
    }

    #[test]
    fn test_energy_equation_fills_missing_macro() {
        let grid = reconcile(grid(
            1,
            vec![
                row(Attribute::Energy, cell(0.5, &["150"]), None),
                row(Attribute::Carbohydrate, cell(0.5, &["20g"]), None),
                row(Attribute::Protein, cell(0.5, &["5g"]), None),
                row(Attribute::Fat, None, None),
            ],
        ));
        assert_eq!(value(&grid, Attribute::Fat, 0), g(5.71));
        let equation = EnergyEquation::from_values(
            value(&grid, Attribute::Energy, 0),
            value(&grid, Attribute::Carbohydrate, 0),
            value(&grid, Attribute::Protein, 0),
            value(&grid, Attribute::Fat, 0),
        );
        assert!(equation.is_satisfied(0.075));
    }

    #[test]
    fn test_energy_equation_adds_missing_row() {
        let grid = reconcile(grid(
            1,
            vec![
                row(Attribute::Energy, cell(0.5, &["150"]), None),
                row(Attribute::Carbohydrate, cell(0.5, &["20g"]), None),
                row(Attribute::Fat, cell(0.5, &["5g"]), None),
            ],
        ));
        assert_eq!(value(&grid, Attribute::Protein, 0), g(6.56));
        let protein = grid.row(grid.position(Attribute::Protein).unwrap()).unwrap();
        assert!(protein.label.is_none());
        assert!(matches!(protein.slot(0), Some(ValueSlot::Computed(_))));
        assert!(
            grid.observations()
                .iter()
                .any(|observation| observation.attribute() == Attribute::Protein)
        );
    }

    #[test]
    fn test_energy_equation_repaired_from_alternates() {
        let grid = reconcile(grid(
            2,
            vec![
                row(Attribute::Energy, cell(0.5, &["150kcal"]), cell(0.7, &["150kcal"])),
                row(Attribute::Fat, cell(0.5, &["8g"]), cell(0.7, &["8g"])),
                row(Attribute::Carbohydrate, cell(0.5, &["0g", "18g"]), cell(0.7, &["0g", "18g"])),
                row(Attribute::Protein, cell(0.5, &["3g"]), cell(0.7, &["3g"])),
            ],
        ));
        assert_eq!(value(&grid, Attribute::Carbohydrate, 0), g(18.0));
        assert_eq!(value(&grid, Attribute::Carbohydrate, 1), g(18.0));
        for slot in 0..2 {
            assert!(equation_of(&grid, slot).is_satisfied(0.075));
        }
        let carbohydrate = grid.row(grid.position(Attribute::Carbohydrate).unwrap()).unwrap();
        assert_eq!(carbohydrate.slot(0).and_then(ValueSlot::values_text).map(|text| text.candidate), Some(1));
    }

    #[test]
    fn test_unbalanced_energy_without_alternates_is_kept() {
        let grid = reconcile(grid(
            1,
            vec![
                row(Attribute::Energy, cell(0.5, &["150kcal"]), None),
                row(Attribute::Fat, cell(0.5, &["8g"]), None),
                row(Attribute::Carbohydrate, cell(0.5, &["0g"]), None),
                row(Attribute::Protein, cell(0.5, &["3g"]), None),
            ],
        ));
        assert_eq!(value(&grid, Attribute::Carbohydrate, 0), g(0.0));
        assert!(!equation_of(&grid, 0).is_satisfied(0.075));
    }

    #[test]
    fn test_less_than_reading_tightens_ratio_threshold() {
        let table = |sugar: &str| {
            grid(
                2,
                vec![
                    row(Attribute::Protein, cell(0.5, &["5g"]), cell(0.7, &["5g"])),
                    row(Attribute::Fat, cell(0.5, &["3g"]), cell(0.7, &["3g"])),
                    row(Attribute::Salt, cell(0.5, &[sugar]), cell(0.7, &["1.15g"])),
                ],
            )
        };
        let flagged = |grid: &ExtractedGrid| grid.row(grid.position(Attribute::Salt).unwrap()).unwrap().invalid;

        assert!(flagged(&reconcile(table("<1g"))));
        assert!(!flagged(&reconcile(table("1g"))));
    }

    #[test]
    fn test_multi_value_pair_closest_to_ratio() {
        let grid = reconcile(grid(
            2,
            vec![
                row(Attribute::Protein, cell(0.5, &["5g"]), cell(0.7, &["10g"])),
                row(Attribute::Fat, cell(0.5, &["2g"]), cell(0.7, &["4g"])),
                row(Attribute::Carbohydrate, cell(0.5, &["12g 30g"]), cell(0.7, &["7g 24g"])),
            ],
        ));
        assert_eq!(value(&grid, Attribute::Carbohydrate, 0), g(12.0));
        assert_eq!(value(&grid, Attribute::Carbohydrate, 1), g(24.0));
    }

    #[test]
    fn test_multi_value_cells() {
        let shared = cell(0.5, &["3g 1g"]);
        let grid = reconcile(grid(
            1,
            vec![
                row(Attribute::Fat, shared.clone(), None),
                row(Attribute::SaturatedFat, shared, None),
                row(Attribute::Protein, cell(0.5, &["2g 4g"]), None),
            ],
        ));
        assert_eq!(value(&grid, Attribute::Fat, 0), g(3.0));
        assert_eq!(value(&grid, Attribute::SaturatedFat, 0), g(1.0));
        // one column cannot hold two readings
        assert!(grid.position(Attribute::Protein).is_none());

        let grid = reconcile(grid_two_columns_in_one_fragment());
        assert_eq!(value(&grid, Attribute::Protein, 0), g(3.0));
        assert_eq!(value(&grid, Attribute::Protein, 1), g(6.0));
        assert_eq!(
            value(&grid, Attribute::Energy, 1),
            Some(Value::new(1046.0, Some(NutritionUnit::Kj)))
        );
    }

    fn grid_two_columns_in_one_fragment() -> ExtractedGrid {
        grid(
            2,
            vec![
                row(Attribute::Energy, cell(0.5, &["523kJ"]), cell(0.7, &["250kcal"])),
                row(Attribute::Protein, cell(0.5, &["3g 6g"]), None),
            ],
        )
    }

    #[test]
    fn test_misplaced_and_extraneous_values() {
        let mut misplaced = grid(
            1,
            vec![
                row(Attribute::Sodium, cell(0.5, &["140mg 6%"]), None),
                row(Attribute::Energy, cell(0.5, &["150 40%"]), None),
                row(Attribute::Protein, cell(0.9, &["3g"]), None),
                row(Attribute::Fat, None, None),
            ],
        );
        misplaced.columns[0].value_rects = [Some(Bbox::from_xywh(0.45, 0.1, 0.25, 0.5)), None];

        let grid = reconcile(misplaced);
        assert_eq!(
            value(&grid, Attribute::Sodium, 0),
            Some(Value::new(140.0, Some(NutritionUnit::Mg)))
        );
        assert_eq!(value(&grid, Attribute::Energy, 0), Some(Value::new(150.0, None)));
        assert!(grid.position(Attribute::Protein).is_none());
        assert!(grid.position(Attribute::Fat).is_none());
    }

    #[test]
    fn test_duplicate_reading_stays_in_closer_column() {
        let shared = cell(0.72, &["5g"]);
        let mut duplicated = grid(2, vec![row(Attribute::Protein, shared.clone(), shared)]);
        duplicated.columns[0].value_rects = [
            Some(Bbox::from_xywh(0.5, 0.1, 0.1, 0.5)),
            Some(Bbox::from_xywh(0.7, 0.1, 0.1, 0.5)),
        ];
        let grid = resolve_duplicate_readings(duplicated);
        let protein = grid.row((0, 0)).unwrap();
        assert!(protein.slot(0).is_none());
        assert_eq!(protein.single_value(1), g(5.0));
    }

    #[test]
    fn test_shared_fragment_cursor() {
        let mut cursor = SharedFragmentCursor::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(cursor.advance(a), 0);
        assert_eq!(cursor.advance(a), 1);
        assert_eq!(cursor.advance(b), 0);
        cursor.reset();
        assert_eq!(cursor.advance(b), 0);
    }
}
