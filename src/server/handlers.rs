//! HTTP handlers for the conversion API.
//!
//! Handlers stay thin: validate, touch the job store, spawn a background
//! task, reply. All conversion work happens in [`crate::runner`]; all
//! artifact knowledge lives in [`crate::analysis`].

use axum::extract::{Multipart, Path as AxumPath, State};
use axum::http::{header, StatusCode};
use axum::response::{Redirect, Response};
use axum::body::Body;
use axum::Json;
use serde::Serialize;
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis;
use crate::error::ConvertError;
use crate::job::{progress, AnalysisMode, ConverterMode, Job, JobStatus};
use crate::runner;
use crate::server::error::{ApiError, ApiResult};
use crate::server::state::AppState;

const PPTX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Name the uploaded PDF is stored under inside the job directory.
const STORED_PDF_NAME: &str = "input.pdf";

// ── GET / ────────────────────────────────────────────────────────────────

/// Redirect the browser to the bundled frontend.
pub async fn root() -> Redirect {
    Redirect::to("/static/index.html")
}

// ── GET /health ──────────────────────────────────────────────────────────

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Number of live job records.
    pub jobs: usize,
    /// Whether normal-mode (AI) analysis is available.
    pub ai_configured: bool,
}

/// GET /health — service liveness and configuration summary.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        jobs: state.store.len(),
        ai_configured: state.config.gemini_api_key.is_some(),
    })
}

// ── POST /api/upload ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct UploadResponse {
    pub job_id: Uuid,
    pub message: &'static str,
    pub mode: AnalysisMode,
    pub converter_mode: ConverterMode,
}

/// POST /api/upload
///
/// Accept a multipart upload: `pdf_file` (required), `json_file` (required
/// in JSON mode), `mode`, and `converter_mode`. Stores the files into a
/// fresh job directory and registers the job as `pending`.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut pdf: Option<(String, Vec<u8>)> = None;
    let mut json: Option<(String, Vec<u8>)> = None;
    let mut mode = AnalysisMode::default();
    let mut converter_mode = ConverterMode::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "pdf_file" => {
                let filename = field.file_name().unwrap_or("upload.pdf").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                pdf = Some((filename, data.to_vec()));
            }
            "json_file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                // An empty optional file input still submits a field.
                if !filename.is_empty() && !data.is_empty() {
                    json = Some((filename, data.to_vec()));
                }
            }
            "mode" => {
                let value = field.text().await.unwrap_or_default();
                mode = AnalysisMode::parse(&value);
            }
            "converter_mode" => {
                let value = field.text().await.unwrap_or_default();
                converter_mode = ConverterMode::parse(&value);
            }
            other => {
                warn!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let (pdf_name, pdf_bytes) =
        pdf.ok_or_else(|| ApiError::BadRequest("A PDF file is required".into()))?;

    if !pdf_name.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ApiError::BadRequest("First file must be a PDF".into()));
    }
    validate_pdf_magic(&pdf_name, &pdf_bytes)?;

    match mode {
        AnalysisMode::Json => match &json {
            Some((name, bytes)) if name.to_ascii_lowercase().ends_with(".json") => {
                // Structural validation before anything touches disk.
                analysis::validate_artifact(bytes)?;
            }
            _ => {
                return Err(ApiError::BadRequest("JSON mode requires a JSON file".into()));
            }
        },
        AnalysisMode::Normal => {
            if state.config.gemini_api_key.is_none() {
                return Err(ConvertError::ApiKeyMissing.into());
            }
        }
    }

    // ── Persist the upload into a fresh job directory ────────────────────
    let job_id = Uuid::new_v4();
    let job_dir = state.config.work_dir.join(job_id.to_string());
    tokio::fs::create_dir_all(&job_dir)
        .await
        .map_err(|e| ConvertError::io(&job_dir, e))?;

    let pdf_path = job_dir.join(STORED_PDF_NAME);
    tokio::fs::write(&pdf_path, &pdf_bytes)
        .await
        .map_err(|e| ConvertError::io(&pdf_path, e))?;

    let json_path = match json {
        Some((_, bytes)) => {
            let path = job_dir.join(runner::ARTIFACT_FILENAME);
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| ConvertError::io(&path, e))?;
            Some(path)
        }
        None => None,
    };

    let job = Job::new(
        job_id,
        mode,
        converter_mode,
        pdf_name,
        job_dir,
        pdf_path,
        json_path,
    );
    state.store.insert(job);

    info!(%job_id, ?mode, ?converter_mode, "Upload accepted");

    Ok(Json(UploadResponse {
        job_id,
        message: "Upload successful",
        mode,
        converter_mode,
    }))
}

/// Reject uploads whose content is not a PDF, whatever the filename says.
fn validate_pdf_magic(filename: &str, bytes: &[u8]) -> Result<(), ApiError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(ConvertError::NotAPdf {
            filename: filename.to_string(),
            magic,
        }
        .into());
    }
    Ok(())
}

// ── POST /api/process/{job_id} ───────────────────────────────────────────

#[derive(Serialize)]
pub struct TaskStartedResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// POST /api/process/{job_id}
///
/// Start the background task for an uploaded job: AI analysis for
/// normal-mode jobs, straight to PPTX generation for JSON-mode jobs.
pub async fn process(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<Uuid>,
) -> ApiResult<Json<TaskStartedResponse>> {
    let job = state
        .store
        .get(job_id)
        .ok_or(ConvertError::JobNotFound(job_id))?;

    if state.store.transition(job_id, JobStatus::Processing).is_none() {
        return Err(ConvertError::InvalidState {
            expected: JobStatus::Pending.as_str().into(),
            actual: job.status.as_str().into(),
        }
        .into());
    }

    state.store.update(job_id, |job| {
        job.progress = progress::START;
        job.message = "Processing started".into();
    });

    match job.mode {
        AnalysisMode::Normal => {
            tokio::spawn(runner::run_analysis(
                state.store.clone(),
                state.config.clone(),
                job_id,
            ));
        }
        AnalysisMode::Json => {
            tokio::spawn(runner::run_generation(
                state.store.clone(),
                state.config.clone(),
                job_id,
            ));
        }
    }

    Ok(Json(TaskStartedResponse {
        status: "processing",
        message: "Processing started",
    }))
}

// ── POST /api/continue/{job_id} ──────────────────────────────────────────

/// POST /api/continue/{job_id}
///
/// Resume a `json_ready` job into PPTX generation after the user has
/// downloaded the artifact.
pub async fn continue_job(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<Uuid>,
) -> ApiResult<Json<TaskStartedResponse>> {
    let job = state
        .store
        .get(job_id)
        .ok_or(ConvertError::JobNotFound(job_id))?;

    if state.store.transition(job_id, JobStatus::Generating).is_none() {
        return Err(ConvertError::InvalidState {
            expected: JobStatus::JsonReady.as_str().into(),
            actual: job.status.as_str().into(),
        }
        .into());
    }

    state.store.update(job_id, |job| {
        job.progress = progress::ANALYZE_END;
        job.message = "Generating PowerPoint...".into();
    });

    tokio::spawn(runner::run_generation(
        state.store.clone(),
        state.config.clone(),
        job_id,
    ));

    Ok(Json(TaskStartedResponse {
        status: "generating",
        message: "PPTX generation started",
    }))
}

// ── GET /api/status/{job_id} ─────────────────────────────────────────────

/// GET /api/status/{job_id} — the polled job record.
pub async fn status(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = state
        .store
        .get(job_id)
        .ok_or(ConvertError::JobNotFound(job_id))?;
    Ok(Json(job))
}

// ── GET /api/download-json/{job_id} ──────────────────────────────────────

/// GET /api/download-json/{job_id} — download the analysis artifact.
pub async fn download_json(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<Uuid>,
) -> ApiResult<Response> {
    let job = state
        .store
        .get(job_id)
        .ok_or(ConvertError::JobNotFound(job_id))?;

    let json_path = job
        .json_path
        .clone()
        .ok_or_else(|| ApiError::BadRequest("JSON file not available".into()))?;

    let filename = format!("{}_analysis.json", job.filename_stem());
    file_attachment(&json_path, &filename, "application/json").await
}

// ── GET /api/download/{job_id} ───────────────────────────────────────────

/// GET /api/download/{job_id} — download the finished PPTX.
///
/// When the job record is gone (the server restarted, or cleanup raced the
/// download) the output directory is scanned for a file prefixed with the
/// job id — output filenames embed the id for exactly this reason.
pub async fn download(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<Uuid>,
) -> ApiResult<Response> {
    let (output_path, filename) = match state.store.get(job_id) {
        Some(job) => {
            if job.status != JobStatus::Completed {
                return Err(ApiError::BadRequest("Processing not completed".into()));
            }
            let path = job
                .output_path
                .clone()
                .ok_or_else(|| ApiError::Internal("Completed job has no output path".into()))?;
            let filename = job
                .output_filename
                .clone()
                .unwrap_or_else(|| format!("{}.pptx", job.filename_stem()));
            (path, filename)
        }
        None => find_orphaned_output(&state.config.output_dir, job_id).await?,
    };

    file_attachment(&output_path, &filename, PPTX_MIME).await
}

/// Look for `<job_id>_*.pptx` in the output directory.
async fn find_orphaned_output(
    output_dir: &Path,
    job_id: Uuid,
) -> ApiResult<(std::path::PathBuf, String)> {
    let prefix = format!("{job_id}_");
    let mut entries = match tokio::fs::read_dir(output_dir).await {
        Ok(entries) => entries,
        Err(_) => {
            return Err(ApiError::NotFound(
                "Job not found and no matching file in output directory".into(),
            ))
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(&prefix) {
            return Ok((entry.path(), name));
        }
    }

    Err(ApiError::NotFound(
        "Job not found and no matching file in output directory".into(),
    ))
}

// ── DELETE /api/job/{job_id} ─────────────────────────────────────────────

#[derive(Serialize)]
pub struct CleanupResponse {
    pub message: &'static str,
}

/// DELETE /api/job/{job_id} — drop the job record and its working files.
///
/// Idempotent: deleting an unknown job still reports success, matching the
/// frontend's fire-and-forget cleanup on page unload.
pub async fn delete_job(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<Uuid>,
) -> Json<CleanupResponse> {
    if let Some(job) = state.store.remove(job_id) {
        if let Err(e) = tokio::fs::remove_dir_all(&job.job_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(%job_id, error = %e, "Failed to remove job directory");
            }
        }
        info!(%job_id, "Job cleaned up");
    }
    Json(CleanupResponse {
        message: "Job cleaned up",
    })
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Stream a file as an attachment download.
///
/// The download name goes out as RFC 5987 `filename*` so non-ASCII upload
/// names (the service sees a lot of Japanese decks) survive the round trip
/// through every browser.
async fn file_attachment(
    path: &Path,
    download_name: &str,
    content_type: &'static str,
) -> ApiResult<Response> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!(
                "{} not found",
                path.file_name().unwrap_or_default().to_string_lossy()
            )));
        }
        Err(e) => return Err(ConvertError::io(path, e).into()),
    };

    let body = Body::from_stream(ReaderStream::new(file));
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(download_name)
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(body)
        .map_err(|e| ApiError::Internal(format!("Response build: {e}")))
}
