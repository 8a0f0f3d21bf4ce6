//! The page-analysis prompt sent to the vision model.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the prompt defines the analysis
//!    artifact's wire contract (coordinate system, font families, size
//!    formula). Changing the contract means editing exactly one place,
//!    alongside the matching types in [`crate::analysis`].
//!
//! 2. **Testability** — unit tests can assert the prompt still names every
//!    contract constant without spinning up a real model.

use crate::analysis::{KNOWN_FONT_FAMILIES, SLIDE_HEIGHT_PT, SLIDE_WIDTH_PT};

/// Prompt for analysing a single rendered PDF page image.
///
/// The model must reply with JSON only — one `PageAnalysis` object. The
/// reply is still defensively unfenced before parsing (models occasionally
/// wrap output in code fences despite rule 5).
pub const PAGE_ANALYSIS_PROMPT: &str = r#"You are an analyst extracting text information from a PDF page image. Analyse the image and reply in exactly this JSON format:

```json
{
  "replace_all": true,
  "blocks": [
    {
      "text": "text content",
      "bbox_1000": [x, y, width, height],
      "font_family": "font name",
      "is_bold": true/false,
      "font_size_pt": number,
      "colors": [
        {"range": [start_char, end_char], "rgb": [R, G, B]}
      ]
    }
  ]
}
```

Follow these rules precisely:

1. COORDINATES (bbox_1000)
   - Treat the image as a 1000x1000 coordinate system
   - [x, y, width, height]: x from the left edge, y from the top edge (0-1000)
   - width and height are the extent of the text box

2. FONT FAMILY (font_family)
   Choose one of exactly these eight families:
   - Japanese: "Noto Sans JP" (gothic), "Noto Serif JP" (mincho), "Yomogi" (handwritten), "Kosugi Maru" (rounded)
   - Latin: "Roboto" (sans-serif default), "Merriweather" (serif), "Roboto Mono" (monospace), "Montserrat" (bold display)

3. FONT SIZE (font_size_pt)
   - Calibrated to a 1376 pt x 768 pt slide
   - font_size_pt = (text height / image height) x 768

4. TEXT GROUPING
   - Different vertical positions (different Y) are always separate blocks
   - Same line: merge into one block only when horizontally close
   - Express colour changes within a block via the colors array
   - Never emit newlines inside text; split into separate blocks instead

5. OUTPUT
   - Reply with the JSON only, no commentary"#;
