//! Pipeline stages for PDF-to-PPTX conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch rendering backend or AI provider)
//! without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ render ──▶ encode ──▶ analyze ──▶ generate
//! (PDF)      (pdfium)   (base64)   (Gemini)    (converter subprocess)
//! ```
//!
//! 1. [`render`]   — rasterise every page to a PNG in the job directory;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 2. [`encode`]   — base64-wrap a page PNG for the API request body
//! 3. [`analyze`]  — drive the Gemini call per page and assemble the
//!    analysis artifact; the only stage with network I/O
//! 4. [`generate`] — run the external converter and watch it finish
//!
//! JSON-mode jobs enter the pipeline at [`generate`]: the artifact arrived
//! with the upload, so stages 1–3 never run.

pub mod analyze;
pub mod encode;
pub mod generate;
pub mod render;
