use snafu::prelude::*;

use crate::config::ScanConfigBuilderError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ScanError {
    #[snafu(display("Read `{}` error: {}", path, source))]
    IoRead {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Write `{}` error: {}", path, source))]
    IoWrite {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Decode json `{}` error: {}", path, source))]
    JsonDecode {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Encode json for `{}` error: {}", stage, source))]
    JsonEncode {
        source: serde_json::Error,
        stage: String,
    },
    #[snafu(display("Invalid scan config: {}", source))]
    Config { source: ScanConfigBuilderError },
    #[snafu(display("Recognizer `{}` failed: {}", stage, message))]
    Recognizer { stage: String, message: String },
}
