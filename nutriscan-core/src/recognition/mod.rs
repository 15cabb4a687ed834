pub mod text;

use std::{future::Future, path::PathBuf};

use snafu::ResultExt;
use tracing::*;

use crate::{
    error::{IoReadSnafu, RecognizerSnafu, ScanError},
    fixture::FragmentFile,
};

pub use text::RecognizedText;

/// The OCR stage feeding the scanner.
///
/// Recognition is the only asynchronous step of a scan; everything after it
/// runs synchronously over the returned fragments.
pub trait TextRecognizer {
    fn recognize(&self) -> impl Future<Output = Result<Vec<RecognizedText>, ScanError>>;
}

/// Replays fragments stored as JSON, either a bare fragment list or a test case.
#[derive(Debug, Clone)]
pub struct JsonRecognizer {
    pub path: PathBuf,
}

impl JsonRecognizer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TextRecognizer for JsonRecognizer {
    fn recognize(&self) -> impl Future<Output = Result<Vec<RecognizedText>, ScanError>> {
        async move {
            let raw = tokio::fs::read_to_string(&self.path)
                .await
                .context(IoReadSnafu {
                    path: self.path.to_string_lossy(),
                })?;

            let texts = FragmentFile::decode(&raw, &self.path.to_string_lossy())?.into_texts();
            debug!("Loaded {} fragments from {:?}", texts.len(), self.path);

            if let Some(text) = texts.iter().find(|text| text.candidates.is_empty()) {
                return RecognizerSnafu {
                    stage: self.path.to_string_lossy(),
                    message: format!("fragment {} has no reading", text.id),
                }
                .fail();
            }
            Ok(texts)
        }
    }
}

/// Recognizer over fragments already held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticRecognizer {
    pub texts: Vec<RecognizedText>,
}

impl TextRecognizer for StaticRecognizer {
    fn recognize(&self) -> impl Future<Output = Result<Vec<RecognizedText>, ScanError>> {
        let texts = self.texts.clone();
        async move { Ok(texts) }
    }
}
