//! # pdf2deck
//!
//! Convert PDF documents to editable PowerPoint decks using Vision Language
//! Models — a browser-driven web service and the library behind it.
//!
//! ## Why this crate?
//!
//! Slide decks exported to PDF lose their editability. Text extraction
//! tools recover the words but not the layout; layout tools recover boxes
//! but garble the text. Instead this service rasterises each page into a
//! PNG and lets a vision model read it as a human would, producing a
//! structured analysis artifact (text blocks with geometry, fonts, and
//! colours) that an external converter turns back into an editable PPTX.
//!
//! ## Job Lifecycle
//!
//! ```text
//! upload (PDF [+ JSON artifact])
//!  │
//!  ├─ 1. Render    rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 2. Encode    PNG → base64 inline payload
//!  ├─ 3. Analyze   Gemini vision call per page → analysis artifact
//!  ├─ 4. Park      json_ready: user downloads the artifact
//!  └─ 5. Generate  external converter produces the PPTX
//!
//! status: pending → processing → analyzing → json_ready → generating
//!         → completed (error reachable from any live state)
//! ```
//!
//! JSON-mode jobs carry their artifact with the upload and skip steps 1–4.
//! The browser polls `GET /api/status/{job_id}` once a second and renders a
//! linear progress bar from the `progress` field.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2deck::{router, AppState, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads HOST / PORT / GEMINI_API_KEY / … from the environment.
//!     let config = ServiceConfig::from_env()?;
//!     let app = router(AppState::new(config));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## What this crate does NOT do
//!
//! PPTX authoring and OCR live in the external converter executables
//! (`CONVERTER_PRECISION_CMD` / `CONVERTER_SAFEGUARD_CMD`); page content
//! understanding lives in the Gemini API. This crate is the job machinery
//! around them: uploads, the state machine, background tasks, and polling.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analysis;
pub mod config;
pub mod error;
pub mod gemini;
pub mod job;
pub mod pipeline;
pub mod prompts;
pub mod runner;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analysis::{DocumentAnalysis, PageAnalysis, TextBlock};
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::{ConvertError, PageFailure};
pub use gemini::GeminiClient;
pub use job::{AnalysisMode, ConverterMode, Job, JobStatus, JobStore};
pub use server::{router, AppState};
