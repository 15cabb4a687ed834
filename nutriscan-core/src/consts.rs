/// Horizontal tolerance for attribute columns, as a fraction of the label width.
///
/// Two attribute labels belong to the same column when their left edges are
/// no further apart than this share of the width spanned by all recognized
/// text. Labels are usually left aligned, but indented sub-nutrients
/// ("Saturated Fat", "- of which sugars") shift the left edge noticeably.
pub const ATTRIBUTE_COLUMN_TOLERANCE: f32 = 0.26;

/// Minimum horizontal overlap (relative to the narrower fragment) for a value
/// fragment to join the column grown from a seed value.
pub const VALUE_COLUMN_MIN_OVERLAP: f32 = 0.05;

/// Minimum vertical intersection ratio between a value column and an
/// attribute column for the two to be grouped together.
///
/// Measured on the vertical projection of the value column's single-value
/// cells against the attribute column.
pub const COLUMN_GROUP_INTERSECTION_RATIO: f32 = 0.43;

/// Maximum number of value columns kept per attribute column.
pub const MAX_VALUE_COLUMNS_PER_GROUP: usize = 2;

/// Relative deviation from the valid ratio above which a row is invalid.
pub const RATIO_ERROR_THRESHOLD: f64 = 0.17;

/// Stricter ratio deviation used for rows printed as "less than" (`<1g`).
pub const LESS_THAN_RATIO_ERROR_THRESHOLD: f64 = 0.09;

/// Relative error tolerated between the printed energy and the energy
/// calculated from carbohydrate, protein and fat.
pub const ENERGY_ERROR_THRESHOLD: f64 = 0.075;

/// Amounts above this are considered OCR noise (merged digits, barcodes).
pub const MAX_PLAUSIBLE_AMOUNT: f64 = 15_000.0;

/// Value columns starting less than this share of the first attribute
/// column's width past its right edge are attribute text, not values.
pub const ATTRIBUTE_EDGE_MARGIN: f32 = 0.05;

/// Attribute columns with fewer rows are dropped when several columns exist.
pub const MIN_ATTRIBUTES_PER_COLUMN: usize = 3;

/// A value fragment taller than this multiple of the median fragment height
/// spans several printed rows and is discarded.
pub const ELONGATED_HEIGHT_FACTOR: f32 = 1.8;

/// Overlap ratio at which two fragments with the same string are duplicates.
pub const SUBSTANTIAL_OVERLAP_RATIO: f32 = 0.5;

/// Value columns with fewer rows than this share of the tallest column are dropped.
pub const SHORT_COLUMN_PROPORTION: f32 = 0.3;

/// Share of the attribute rows a grid column has to fill before the tabular
/// result competes with the inline one.
pub const MIN_COLUMN_SHARE: f32 = 0.2;

/// Number of non-attribute fragments tolerated while walking an attribute column.
pub const ATTRIBUTE_COLUMN_SKIP_PASSES: usize = 1;

/// Strings at least this long, without any attribute, are footer boilerplate.
pub const FOOTER_TEXT_MIN_LENGTH: usize = 15;

/// Kilojoules per kilocalorie.
pub const KJ_PER_KCAL: f64 = 4.184;

/// Kilocalories per gram of carbohydrate.
pub const KCAL_PER_G_CARBOHYDRATE: f64 = 4.0;

/// Kilocalories per gram of protein.
pub const KCAL_PER_G_PROTEIN: f64 = 4.0;

/// Kilocalories per gram of fat.
///
/// Slightly below the textbook 9 kcal/g; this value reproduces the energy
/// printed on most labels that round fat conservatively.
pub const KCAL_PER_G_FAT: f64 = 8.75428571;

/// Amount used for "trace" readings, in grams.
pub const TRACE_AMOUNT: f64 = 0.08;
