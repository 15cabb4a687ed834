use std::sync::LazyLock;

use regex::Regex;
use tracing::*;
use uuid::Uuid;

use crate::{
    analysis::bbox::Bbox,
    config::ScanConfig,
    detect::attribute::Attribute,
    recognition::RecognizedText,
    text::AttributeText,
};

/// Phrases after which no further attribute label can follow in a column.
static HARD_TERMINATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)daily\s+value|%\s*dv\b|percent\s+daily|ingredients|allergen|contains\b|nutrition\s+(facts|information)|nutritional\s+information|supplement\s+facts|reference\s+intake|best\s+before",
    )
    .unwrap()
});

/// Fragments a column walk steps over without spending its skip pass.
static SKIPPABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\W\d_]*(total|of\s+which|includes?|incl|less\s+than)?[\W\d_]*$").unwrap()
});

static BARE_TOTAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[\W_]*total[\W_]*$").unwrap());

/// Attribute labels printed one below the other.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeColumn {
    pub rows: Vec<AttributeText>,
}

impl AttributeColumn {
    pub fn new(rows: Vec<AttributeText>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rect(&self) -> Option<Bbox> {
        Bbox::union_all(self.rows.iter().flat_map(|row| row.texts.iter().map(|text| &text.rect)))
    }

    pub fn mean_center_x(&self) -> f32 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.rows.iter().map(|row| row.rect().center().x).sum();
        sum / self.rows.len() as f32
    }

    pub fn contains(&self, attribute: Attribute) -> bool {
        self.rows.iter().any(|row| row.attribute == attribute)
    }

    pub fn contains_text(&self, id: Uuid) -> bool {
        self.rows.iter().any(|row| row.contains_text(id))
    }

    fn shares_row_with(&self, other: &AttributeColumn) -> bool {
        self.rows.iter().any(|row| {
            other
                .rows
                .iter()
                .any(|other| other.attribute == row.attribute && other.id() == row.id())
        })
    }
}

/// Top and bottom edges of the attribute rows of every column.
pub fn vertical_bounds(columns: &[AttributeColumn]) -> Option<(f32, f32)> {
    let rects: Vec<Bbox> = columns.iter().filter_map(AttributeColumn::rect).collect();
    let union = Bbox::union_all(rects.iter())?;
    Some((union.min.y, union.max.y))
}

/// Builds the attribute columns of a label, ordered left to right.
#[tracing::instrument(skip_all)]
pub fn build_attribute_columns(texts: &[RecognizedText], config: &ScanConfig) -> Vec<AttributeColumn> {
    let Some(label) = Bbox::union_all(texts.iter().map(|text| &text.rect)) else {
        return Vec::new();
    };
    let tolerance = config.attribute_column_tolerance * label.width();

    let mut ordered: Vec<&RecognizedText> = texts.iter().collect();
    ordered.sort_by(|a, b| a.rect.center().y.total_cmp(&b.rect.center().y));

    let mut candidates: Vec<AttributeColumn> = ordered
        .iter()
        .filter(|text| is_attribute_label(&text.normalized_string()))
        .map(|seed| walk_column(seed, &ordered, tolerance, config))
        .filter(|column| !column.is_empty())
        .collect();
    debug!("Built {} candidate attribute columns", candidates.len());

    // the longer of two competing columns wins, earlier seeds break ties
    candidates.sort_by(|a, b| b.len().cmp(&a.len()));
    let mut columns: Vec<AttributeColumn> = Vec::new();
    for candidate in candidates {
        if !columns.iter().any(|kept| kept.shares_row_with(&candidate)) {
            columns.push(candidate);
        }
    }

    columns.sort_by(|a, b| a.mean_center_x().total_cmp(&b.mean_center_x()));
    if columns.len() > 1 {
        columns.retain(|column| column.len() >= config.min_attributes_per_column);
    }
    inject_energy(&mut columns, &ordered);

    debug!(
        "Kept {} attribute columns with {:?} rows",
        columns.len(),
        columns.iter().map(AttributeColumn::len).collect::<Vec<_>>()
    );
    columns
}

fn walk_column(
    seed: &RecognizedText,
    ordered: &[&RecognizedText],
    tolerance: f32,
    config: &ScanConfig,
) -> AttributeColumn {
    let band: Vec<&RecognizedText> = ordered
        .iter()
        .copied()
        .filter(|text| (text.rect.min.x - seed.rect.min.x).abs() <= tolerance)
        .collect();
    let Some(position) = band.iter().position(|text| text.id == seed.id) else {
        return AttributeColumn::new(Vec::new());
    };

    let mut above = walk_direction(band[..position].iter().rev().copied(), seed, config);
    above.reverse();
    let below = walk_direction(band[position + 1..].iter().copied(), seed, config);

    let mut rows: Vec<AttributeText> = Vec::new();
    for text in above.into_iter().chain(std::iter::once(seed)).chain(below) {
        let detected = AttributeText::detect(text)
            .into_iter()
            .filter(|row| row.attribute.is_nutrient());
        rows.extend(detected);
    }

    merge_total_labels(&mut rows, &band);
    AttributeColumn::new(rows)
}

/// Collects attribute fragments moving away from the seed.
fn walk_direction<'a>(
    band: impl Iterator<Item = &'a RecognizedText>,
    seed: &RecognizedText,
    config: &ScanConfig,
) -> Vec<&'a RecognizedText> {
    let mut collected: Vec<&RecognizedText> = Vec::new();
    let mut skip_passes = config.attribute_column_skip_passes;

    for text in band {
        let last = collected.last().map(|last| last.rect).unwrap_or(seed.rect);
        if text.rect.is_inline_with(&last) {
            continue;
        }

        let string = text.normalized_string();
        if HARD_TERMINATOR.is_match(&string) {
            trace!("Attribute column stops at `{}`", string);
            break;
        } else if Attribute::is_nutrient_text(&string) {
            collected.push(text);
        } else if SKIPPABLE.is_match(&string) {
            continue;
        } else if skip_passes > 0 {
            skip_passes -= 1;
        } else {
            break;
        }
    }

    collected
}

fn is_attribute_label(string: &str) -> bool {
    !HARD_TERMINATOR.is_match(string) && Attribute::is_nutrient_text(string)
}

/// Attaches a bare "Total" printed on the line next to a label that takes it.
fn merge_total_labels(rows: &mut [AttributeText], band: &[&RecognizedText]) {
    for text in band.iter().filter(|text| BARE_TOTAL.is_match(text.string())) {
        let nearest = rows
            .iter_mut()
            .filter(|row| row.attribute.supports_total_label())
            .filter(|row| {
                let rect = row.text.rect;
                let gap = (text.rect.center().y - rect.center().y).abs();
                gap <= rect.height().max(text.rect.height()) * 1.5
            })
            .min_by(|a, b| {
                let gap = |row: &AttributeText| (text.rect.center().y - row.text.rect.center().y).abs();
                gap(a).total_cmp(&gap(b))
            });
        if let Some(row) = nearest {
            row.merge((*text).clone());
        }
    }
}

/// Adds the first energy label of the label as the opening row when no
/// column carries one.
fn inject_energy(columns: &mut [AttributeColumn], ordered: &[&RecognizedText]) {
    if columns.iter().any(|column| column.contains(Attribute::Energy)) {
        return;
    }
    let Some(column) = columns.first_mut() else {
        return;
    };
    let energy = ordered.iter().find_map(|text| {
        AttributeText::detect(text)
            .into_iter()
            .find(|row| row.attribute == Attribute::Energy)
    });
    if let Some(energy) = energy {
        debug!("Injecting energy label `{}`", energy.text.string());
        column.rows.insert(0, energy);
    }
}
