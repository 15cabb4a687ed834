use std::path::Path;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::{
    consts::*,
    error::{ConfigSnafu, IoReadSnafu, JsonDecodeSnafu, ScanError},
};

/// Tunable thresholds of the scanning pipeline.
///
/// Every value was tuned against a corpus of label photographs; the defaults
/// come from [`crate::consts`]. Build a variant with [`ScanConfigBuilder`] or
/// deserialize one from JSON (missing fields keep their defaults).
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(default, build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct ScanConfig {
    /// Left-edge tolerance of attribute columns, relative to label width.
    pub attribute_column_tolerance: f32,
    /// Non-attribute fragments tolerated while walking an attribute column.
    pub attribute_column_skip_passes: usize,
    /// Attribute columns with fewer rows are dropped when several exist.
    pub min_attributes_per_column: usize,
    /// Horizontal overlap needed for a fragment to join a value column.
    pub value_column_min_overlap: f32,
    /// Vertical intersection ratio grouping value columns with attribute columns.
    pub column_group_intersection_ratio: f32,
    /// Value columns kept per attribute column.
    pub max_value_columns_per_group: usize,
    /// Fragments taller than this multiple of the median height are dropped.
    pub elongated_height_factor: f32,
    /// Overlap ratio marking two fragments as the same reading.
    pub substantial_overlap_ratio: f32,
    /// Value columns shorter than this share of the tallest are dropped.
    pub short_column_proportion: f32,
    /// Width share past the attribute column below which values are attribute text.
    pub attribute_edge_margin: f32,
    /// Minimum length of a footer string.
    pub footer_text_min_length: usize,
    /// Amounts above this are discarded.
    pub max_plausible_amount: f64,
    /// Ratio deviation marking a row invalid.
    pub ratio_error_threshold: f64,
    /// Ratio deviation for "less than" rows.
    pub less_than_ratio_error_threshold: f64,
    /// Tolerated energy equation error.
    pub energy_error_threshold: f64,
    /// Share of attribute rows a grid column must fill to be considered.
    pub min_column_share: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            attribute_column_tolerance: ATTRIBUTE_COLUMN_TOLERANCE,
            attribute_column_skip_passes: ATTRIBUTE_COLUMN_SKIP_PASSES,
            min_attributes_per_column: MIN_ATTRIBUTES_PER_COLUMN,
            value_column_min_overlap: VALUE_COLUMN_MIN_OVERLAP,
            column_group_intersection_ratio: COLUMN_GROUP_INTERSECTION_RATIO,
            max_value_columns_per_group: MAX_VALUE_COLUMNS_PER_GROUP,
            elongated_height_factor: ELONGATED_HEIGHT_FACTOR,
            substantial_overlap_ratio: SUBSTANTIAL_OVERLAP_RATIO,
            short_column_proportion: SHORT_COLUMN_PROPORTION,
            attribute_edge_margin: ATTRIBUTE_EDGE_MARGIN,
            footer_text_min_length: FOOTER_TEXT_MIN_LENGTH,
            max_plausible_amount: MAX_PLAUSIBLE_AMOUNT,
            ratio_error_threshold: RATIO_ERROR_THRESHOLD,
            less_than_ratio_error_threshold: LESS_THAN_RATIO_ERROR_THRESHOLD,
            energy_error_threshold: ENERGY_ERROR_THRESHOLD,
            min_column_share: MIN_COLUMN_SHARE,
        }
    }
}

impl ScanConfig {
    /// Loads a configuration from a JSON file and validates it.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).context(IoReadSnafu {
            path: path.to_string_lossy(),
        })?;
        let config: ScanConfig = serde_json::from_str(&raw).context(JsonDecodeSnafu {
            path: path.to_string_lossy(),
        })?;
        config.validated()
    }

    /// Runs the builder validation over an already constructed configuration.
    pub fn validated(self) -> Result<Self, ScanError> {
        ScanConfigBuilder::default()
            .attribute_column_tolerance(self.attribute_column_tolerance)
            .attribute_column_skip_passes(self.attribute_column_skip_passes)
            .min_attributes_per_column(self.min_attributes_per_column)
            .value_column_min_overlap(self.value_column_min_overlap)
            .column_group_intersection_ratio(self.column_group_intersection_ratio)
            .max_value_columns_per_group(self.max_value_columns_per_group)
            .elongated_height_factor(self.elongated_height_factor)
            .substantial_overlap_ratio(self.substantial_overlap_ratio)
            .short_column_proportion(self.short_column_proportion)
            .attribute_edge_margin(self.attribute_edge_margin)
            .footer_text_min_length(self.footer_text_min_length)
            .max_plausible_amount(self.max_plausible_amount)
            .ratio_error_threshold(self.ratio_error_threshold)
            .less_than_ratio_error_threshold(self.less_than_ratio_error_threshold)
            .energy_error_threshold(self.energy_error_threshold)
            .min_column_share(self.min_column_share)
            .build()
            .context(ConfigSnafu)
    }
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let ratios = [
            ("attribute_column_tolerance", self.attribute_column_tolerance),
            ("value_column_min_overlap", self.value_column_min_overlap),
            (
                "column_group_intersection_ratio",
                self.column_group_intersection_ratio,
            ),
            ("substantial_overlap_ratio", self.substantial_overlap_ratio),
            ("short_column_proportion", self.short_column_proportion),
            ("attribute_edge_margin", self.attribute_edge_margin),
            ("min_column_share", self.min_column_share),
        ];
        for (name, value) in ratios {
            match value {
                Some(value) if !(0.0..=1.0).contains(&value) => {
                    return Err(format!("{name} must be within 0..=1, got {value}"));
                }
                _ => {}
            }
        }

        if let Some(0) = self.max_value_columns_per_group {
            return Err("max_value_columns_per_group must be at least 1".to_string());
        }
        match self.elongated_height_factor {
            Some(factor) if factor < 1.0 => {
                return Err(format!("elongated_height_factor must be >= 1, got {factor}"));
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_config_default() {
        let config = ScanConfig::default();
        assert_eq!(config.attribute_column_tolerance, 0.26);
        assert_eq!(config.column_group_intersection_ratio, 0.43);
        assert_eq!(config.ratio_error_threshold, 0.17);
        assert_eq!(config.less_than_ratio_error_threshold, 0.09);
        assert_eq!(config.energy_error_threshold, 0.075);
        assert_eq!(config.max_value_columns_per_group, 2);
    }

    #[test]
    fn test_scan_config_builder() {
        let config = ScanConfigBuilder::default()
            .ratio_error_threshold(0.2)
            .build()
            .unwrap();
        assert_eq!(config.ratio_error_threshold, 0.2);
        // untouched fields keep their defaults
        assert_eq!(config.attribute_column_tolerance, 0.26);

        let invalid = ScanConfigBuilder::default()
            .attribute_column_tolerance(1.5)
            .build();
        assert!(invalid.is_err());

        let no_columns = ScanConfigBuilder::default()
            .max_value_columns_per_group(0)
            .build();
        assert!(no_columns.is_err());
    }

    #[test]
    fn test_scan_config_partial_json() {
        let config: ScanConfig =
            serde_json::from_str(r#"{ "energy_error_threshold": 0.1 }"#).unwrap();
        assert_eq!(config.energy_error_threshold, 0.1);
        assert_eq!(config.ratio_error_threshold, 0.17);
    }

    #[test]
    fn test_scan_config_validated() {
        let config = ScanConfig {
            short_column_proportion: 2.0,
            ..ScanConfig::default()
        };
        assert!(matches!(config.validated(), Err(ScanError::Config { .. })));
        assert!(ScanConfig::default().validated().is_ok());
    }
}
