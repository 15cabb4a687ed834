use std::borrow::Cow;

use plsfix::fix_text;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::bbox::Bbox;

/// One fragment returned by the OCR engine.
///
/// `candidates` holds the alternate readings of the same glyph region, the
/// primary reading first. The pipeline never mutates a fragment; derived
/// entities keep a copy for provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    pub id: Uuid,
    pub rect: Bbox,
    pub candidates: Vec<String>,
}

impl RecognizedText {
    pub fn new(rect: Bbox, candidates: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rect,
            candidates,
        }
    }

    /// The primary reading, empty when the recognizer returned no candidate.
    pub fn string(&self) -> &str {
        self.candidates.first().map(String::as_str).unwrap_or("")
    }

    /// The primary reading with broken Unicode repaired.
    pub fn normalized_string(&self) -> Cow<'_, str> {
        normalize(self.string())
    }

    /// Every candidate reading, repaired.
    pub fn normalized_candidates(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.candidates.iter().map(|candidate| normalize(candidate))
    }
}

fn normalize(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(fix_text(text, None))
    }
}
