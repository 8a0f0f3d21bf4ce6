//! The analysis artifact: the JSON document the AI analysis produces and the
//! PPTX converter consumes.
//!
//! The artifact is a single JSON object keyed `"page_1"`, `"page_2"`, … —
//! one [`PageAnalysis`] per page. Text geometry uses a resolution-independent
//! 1000×1000 coordinate system so the artifact stays valid whatever scale the
//! page was rendered at; font sizes are expressed in points relative to a
//! 1376 × 768 pt slide.
//!
//! This module is the single place that knows the artifact's shape. The
//! analysis stage builds it, the upload handler validates it, and the
//! converter contract consumes it unchanged.

use crate::error::{ConvertError, PageFailure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Slide dimensions (pt) the `font_size_pt` field is calibrated against.
pub const SLIDE_WIDTH_PT: u32 = 1376;
pub const SLIDE_HEIGHT_PT: u32 = 768;

/// The eight font families the analysis prompt allows the model to choose
/// from. Four Japanese, four Latin — the converter embeds exactly these.
pub const KNOWN_FONT_FAMILIES: [&str; 8] = [
    "Noto Sans JP",
    "Noto Serif JP",
    "Yomogi",
    "Kosugi Maru",
    "Roboto",
    "Merriweather",
    "Roboto Mono",
    "Montserrat",
];

/// A contiguous run of characters sharing one colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRun {
    /// `[start, end]` character offsets into [`TextBlock::text`].
    pub range: [usize; 2],
    /// `[r, g, b]`, each 0–255.
    pub rgb: [u8; 3],
}

/// One positioned text box on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    /// `[x, y, width, height]` in the 1000×1000 page coordinate system.
    pub bbox_1000: [u32; 4],
    pub font_family: String,
    pub is_bold: bool,
    pub font_size_pt: f32,
    pub colors: Vec<ColorRun>,
}

/// Analysis result for a single page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    /// Always `true` in artifacts produced here: the converter replaces the
    /// page's native text layer entirely rather than patching it.
    pub replace_all: bool,
    pub blocks: Vec<TextBlock>,
}

impl PageAnalysis {
    /// Substitute page used when a page's analysis fails.
    ///
    /// The artifact must contain an entry for every page or the converter
    /// would silently drop slides, so a failed page becomes a single visible
    /// block describing the failure instead of being omitted.
    pub fn placeholder(page: usize, failure: &PageFailure) -> Self {
        let (text, font_size_pt, rgb) = match failure {
            PageFailure::BadReply { .. } => (
                format!("[Page {page} - Parse error]"),
                32.0,
                [30, 30, 30],
            ),
            PageFailure::ApiFailed { detail, .. } => (
                format!("[Page {page} - Analysis error: {}]", truncate_chars(detail, 50)),
                24.0,
                [200, 50, 50],
            ),
        };
        let len = text.chars().count();
        Self {
            replace_all: true,
            blocks: vec![TextBlock {
                text,
                bbox_1000: [50, 50, 900, 100],
                font_family: "Roboto".into(),
                is_bold: true,
                font_size_pt,
                colors: vec![ColorRun {
                    range: [0, len],
                    rgb,
                }],
            }],
        }
    }
}

/// The whole-document artifact: `"page_N"` → [`PageAnalysis`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentAnalysis {
    pages: BTreeMap<String, PageAnalysis>,
}

impl DocumentAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// The artifact key for a 1-indexed page number.
    pub fn page_key(page: usize) -> String {
        format!("page_{page}")
    }

    pub fn insert_page(&mut self, page: usize, analysis: PageAnalysis) {
        self.pages.insert(Self::page_key(page), analysis);
    }

    pub fn get_page(&self, page: usize) -> Option<&PageAnalysis> {
        self.pages.get(&Self::page_key(page))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Validate an uploaded artifact.
///
/// Deliberately shallow: the artifact must parse as JSON and the top level
/// must be an object with page keys. Anything deeper is the converter's
/// contract to enforce — users hand-edit these files, and rejecting an
/// artifact the converter would have accepted helps nobody.
pub fn validate_artifact(bytes: &[u8]) -> Result<(), ConvertError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| ConvertError::InvalidAnalysis(format!("Invalid JSON format: {e}")))?;
    if !value.is_object() {
        return Err(ConvertError::InvalidAnalysis(
            "JSON must be an object with page keys".into(),
        ));
    }
    Ok(())
}

/// Truncate to at most `max` characters, respecting char boundaries.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> PageAnalysis {
        PageAnalysis {
            replace_all: true,
            blocks: vec![TextBlock {
                text: "四半期決算".into(),
                bbox_1000: [80, 40, 840, 90],
                font_family: "Noto Sans JP".into(),
                is_bold: true,
                font_size_pt: 44.0,
                colors: vec![ColorRun {
                    range: [0, 5],
                    rgb: [20, 20, 60],
                }],
            }],
        }
    }

    #[test]
    fn artifact_round_trips() {
        let mut doc = DocumentAnalysis::new();
        doc.insert_page(1, sample_page());

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.starts_with("{\"page_1\""), "got: {json}");

        let back: DocumentAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.get_page(1).unwrap().blocks[0].text, "四半期決算");
    }

    #[test]
    fn validate_accepts_object() {
        assert!(validate_artifact(br#"{"page_1": {"replace_all": true, "blocks": []}}"#).is_ok());
        // Shallow by design: unknown page shapes pass.
        assert!(validate_artifact(br#"{"anything": 1}"#).is_ok());
    }

    #[test]
    fn validate_rejects_non_object() {
        let err = validate_artifact(b"[1, 2, 3]").unwrap_err();
        assert!(err.to_string().contains("object"));
    }

    #[test]
    fn validate_rejects_malformed_json() {
        let err = validate_artifact(b"{not json").unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn placeholder_for_bad_reply() {
        let failure = PageFailure::BadReply {
            page: 4,
            detail: "expected value".into(),
        };
        let page = PageAnalysis::placeholder(4, &failure);
        assert!(page.replace_all);
        assert_eq!(page.blocks.len(), 1);
        assert_eq!(page.blocks[0].text, "[Page 4 - Parse error]");
        assert_eq!(page.blocks[0].bbox_1000, [50, 50, 900, 100]);
    }

    #[test]
    fn placeholder_truncates_long_errors_char_safely() {
        let failure = PageFailure::ApiFailed {
            page: 2,
            retries: 3,
            detail: "エラー".repeat(40),
        };
        let page = PageAnalysis::placeholder(2, &failure);
        let text = &page.blocks[0].text;
        assert!(text.starts_with("[Page 2 - Analysis error: "));
        // 50 chars of detail, not 50 bytes.
        assert!(text.chars().count() < 50 + 30);
        // Colour range must cover the actual text length in chars.
        assert_eq!(page.blocks[0].colors[0].range[1], text.chars().count());
    }

    #[test]
    fn page_keys_are_one_indexed() {
        assert_eq!(DocumentAnalysis::page_key(1), "page_1");
        assert_eq!(DocumentAnalysis::page_key(12), "page_12");
    }
}
