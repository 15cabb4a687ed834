//! Column layout of a tabular label: attribute columns on the left, value
//! columns to their right, and the cleanup that reduces the candidate value
//! columns to the printed ones.

pub mod attribute;
pub mod cleanup;
pub mod value;

pub use attribute::{AttributeColumn, build_attribute_columns};
pub use cleanup::{ColumnCleanup, ColumnGroup};
pub use value::{ValuesTextColumn, build_value_columns};
