pub mod analysis;
pub mod columns;
pub mod config;
pub mod consts;
pub mod detect;
pub mod error;
pub mod fixture;
pub mod grid;
pub mod inline;
pub mod observation;
pub mod recognition;
pub mod scan;
pub mod text;

// Re-export commonly used types
pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::ScanError;
pub use recognition::{JsonRecognizer, RecognizedText, StaticRecognizer, TextRecognizer};
pub use scan::{ScanResult, Scanner, Strategy};
