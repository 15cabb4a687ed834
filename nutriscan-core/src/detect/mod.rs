pub mod attribute;
pub mod header;
pub mod serving;
pub mod unit;
pub mod value;

pub use attribute::Attribute;
pub use header::{HeaderText, HeaderType};
pub use serving::ServingDescriptor;
pub use unit::NutritionUnit;
pub use value::Value;
