//! Error types for the pdf2deck library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`] — **Fatal**: the job cannot proceed at all (the upload
//!   is not a PDF, pdfium cannot open it, the converter exited non-zero, the
//!   AI provider is not configured). A fatal error moves the whole job to the
//!   `error` state.
//!
//! * [`PageFailure`] — **Non-fatal**: analysis of a single page failed (a
//!   transient API error, an unparseable model reply) but the remaining pages
//!   are fine. A failed page is replaced by a placeholder block in the
//!   analysis artifact so the document stays structurally complete and the
//!   job keeps running.
//!
//! The separation lets the background runner decide its own tolerance: abort
//! the job, or substitute a placeholder and continue.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors produced while driving a conversion job.
///
/// Page-level analysis failures use [`PageFailure`] and are absorbed into the
/// analysis artifact rather than propagated here.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// The uploaded file does not carry the `%PDF` magic bytes.
    #[error("Uploaded file '{filename}' is not a valid PDF.\nFirst bytes: {magic:?}")]
    NotAPdf { filename: String, magic: [u8; 4] },

    /// The uploaded analysis artifact is not valid JSON, or is not an object.
    #[error("Invalid analysis JSON: {0}")]
    InvalidAnalysis(String),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open the stored PDF at all.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
         Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── AI provider errors ────────────────────────────────────────────────
    /// No API key is configured for AI analysis.
    #[error("GEMINI_API_KEY is not configured; normal-mode analysis is unavailable")]
    ApiKeyMissing,

    /// The Gemini API returned an error response.
    #[error("Gemini API error (HTTP {status}): {message}")]
    GeminiApi { status: u16, message: String },

    /// The Gemini API call failed at the transport level after all retries.
    #[error("Gemini request failed after {retries} retries: {detail}")]
    GeminiTransport { retries: u32, detail: String },

    // ── Converter errors ──────────────────────────────────────────────────
    /// The converter executable could not be started.
    #[error("Failed to launch converter '{command}': {source}")]
    ConverterSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The converter process exited with a non-zero status.
    #[error("Converter failed with code {code}: {stderr}")]
    ConverterFailed { code: i32, stderr: String },

    // ── Job bookkeeping ───────────────────────────────────────────────────
    /// The referenced job id is not in the store.
    #[error("Job {0} not found")]
    JobNotFound(uuid::Uuid),

    /// The job is not in a state that allows the requested operation.
    #[error("Job is in state '{actual}', expected '{expected}'")]
    InvalidState { expected: String, actual: String },

    // ── I/O and config ────────────────────────────────────────────────────
    /// Filesystem operation on job or output directories failed.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Shorthand for wrapping an I/O error with its path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal failure for a single page during AI analysis.
///
/// The page is replaced by a placeholder block in the artifact; the job
/// continues with the remaining pages.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageFailure {
    /// The API call failed after all retries.
    #[error("Page {page}: analysis failed after {retries} retries: {detail}")]
    ApiFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The model replied, but the reply was not the expected JSON.
    #[error("Page {page}: unparseable model reply: {detail}")]
    BadReply { page: usize, detail: String },
}
