//! Labels stored on disk: the recognized fragments of a photograph, with the
//! result a scan of them is expected to produce.

use std::path::Path;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::*;

use crate::{
    error::{IoReadSnafu, IoWriteSnafu, JsonDecodeSnafu, JsonEncodeSnafu, ScanError},
    recognition::RecognizedText,
    scan::ScanResult,
};

/// One recorded label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub texts: Vec<RecognizedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<ScanResult>,
}

impl TestCase {
    pub fn new(id: impl Into<String>, texts: Vec<RecognizedText>) -> Self {
        Self {
            id: id.into(),
            texts,
            expected: None,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).context(IoReadSnafu {
            path: path.to_string_lossy(),
        })?;
        serde_json::from_str(&raw).context(JsonDecodeSnafu {
            path: path.to_string_lossy(),
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ScanError> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(self).context(JsonEncodeSnafu {
            stage: format!("test case {}", self.id),
        })?;
        std::fs::write(path, raw).context(IoWriteSnafu {
            path: path.to_string_lossy(),
        })?;
        debug!("Saved test case {} to {:?}", self.id, path);
        Ok(())
    }
}

/// Either a bare list of fragments or a full test case.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FragmentFile {
    Texts(Vec<RecognizedText>),
    Fixture(TestCase),
}

impl FragmentFile {
    pub fn decode(raw: &str, path: &str) -> Result<Self, ScanError> {
        serde_json::from_str(raw).context(JsonDecodeSnafu { path })
    }

    pub fn into_texts(self) -> Vec<RecognizedText> {
        match self {
            FragmentFile::Texts(texts) => texts,
            FragmentFile::Fixture(case) => case.texts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::bbox::Bbox, scan::Strategy};

    fn texts() -> Vec<RecognizedText> {
        vec![
            RecognizedText::new(Bbox::from_xywh(0.1, 0.1, 0.3, 0.03), vec!["Protein 3g".into()]),
            RecognizedText::new(
                Bbox::from_xywh(0.1, 0.15, 0.3, 0.03),
                vec!["Sodium 140mg".into(), "Sodium 14Omg".into()],
            ),
        ]
    }

    #[test]
    fn test_save_and_load() {
        let mut case = TestCase::new("cereal-box", texts());
        case.expected = Some(ScanResult {
            strategy: Some(Strategy::Inline),
            ..Default::default()
        });

        let path = std::env::temp_dir().join(format!("nutriscan-case-{}.json", uuid::Uuid::new_v4()));
        case.save(&path).unwrap();
        let loaded = TestCase::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, case);
    }

    #[test]
    fn test_decode_either_shape() {
        let texts = texts();
        let list = serde_json::to_string(&texts).unwrap();
        assert_eq!(FragmentFile::decode(&list, "list.json").unwrap().into_texts(), texts);

        let case = serde_json::to_string(&TestCase::new("case", texts.clone())).unwrap();
        let decoded = FragmentFile::decode(&case, "case.json").unwrap();
        assert!(matches!(decoded, FragmentFile::Fixture(_)));
        assert_eq!(decoded.into_texts(), texts);
    }

    #[test]
    fn test_decode_error_names_the_file() {
        let error = FragmentFile::decode("{\"id\": 3}", "broken.json").unwrap_err();
        assert!(matches!(error, ScanError::JsonDecode { ref path, .. } if path == "broken.json"));
    }

    #[test]
    fn test_load_missing_file() {
        let error = TestCase::load("/nonexistent/case.json").unwrap_err();
        assert!(matches!(error, ScanError::IoRead { .. }));
    }
}
