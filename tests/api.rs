//! Integration tests for the conversion API.
//!
//! Every test drives the real router via `tower::ServiceExt::oneshot` with
//! temp-dir backed storage. The end-to-end JSON-mode flow uses a stub
//! converter script instead of a real PPTX converter, so no network, API
//! key, or pdfium library is needed.

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use pdf2deck::{router, AppState, JobStatus, ServiceConfig};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "pdf2deck-test-boundary";
const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj <<>> endobj\ntrailer <<>>\n%%EOF\n";
const ARTIFACT: &str = r#"{
  "page_1": {
    "replace_all": true,
    "blocks": [{
      "text": "Quarterly results",
      "bbox_1000": [60, 40, 880, 90],
      "font_family": "Montserrat",
      "is_bold": true,
      "font_size_pt": 40.0,
      "colors": [{"range": [0, 17], "rgb": [20, 20, 60]}]
    }]
  }
}"#;

// ── Test helpers ─────────────────────────────────────────────────────────

struct TestService {
    state: AppState,
    dirs: TempDir,
}

impl TestService {
    /// Build a service backed by temp dirs and a stub converter script.
    fn new(with_api_key: bool) -> Self {
        let dirs = TempDir::new().unwrap();
        let work_dir = dirs.path().join("work");
        let output_dir = dirs.path().join("output");
        std::fs::create_dir_all(&work_dir).unwrap();
        std::fs::create_dir_all(&output_dir).unwrap();

        let converter = write_stub_converter(dirs.path());

        let mut builder = ServiceConfig::builder()
            .work_dir(&work_dir)
            .output_dir(&output_dir)
            .static_dir(dirs.path().join("static"))
            .page_delay_ms(0)
            .converter_precision(converter.to_str().unwrap())
            .converter_safeguard(converter.to_str().unwrap());
        if with_api_key {
            builder = builder.gemini_api_key("test-key");
        }
        let config = builder.build().unwrap();

        TestService {
            state: AppState::new(config),
            dirs,
        }
    }

    fn app(&self) -> axum::Router {
        router(self.state.clone())
    }

    async fn get(&self, uri: &str) -> Response<Body> {
        self.app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post(&self, uri: &str) -> Response<Body> {
        self.app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn upload(&self, parts: Vec<Part<'_>>) -> Response<Body> {
        let body = multipart_body(&parts);
        self.app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/upload")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// Poll the store until the job reaches a terminal state.
    async fn wait_for_terminal(&self, job_id: Uuid) -> JobStatus {
        for _ in 0..150 {
            let status = self.state.store.get(job_id).expect("job vanished").status;
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("job never reached a terminal state");
    }
}

enum Part<'a> {
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Stub converter: finds `--output` in its args and writes a fake PPTX there.
#[cfg(unix)]
fn write_stub_converter(dir: &Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("stub-converter");
    std::fs::write(
        &path,
        "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"--output\" ]; then out=\"$2\"; fi\n  shift\ndone\nprintf 'PK-fake-pptx' > \"$out\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(not(unix))]
fn write_stub_converter(dir: &Path) -> std::path::PathBuf {
    dir.join("stub-converter")
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_mode_parts<'a>() -> Vec<Part<'a>> {
    vec![
        Part::File {
            name: "pdf_file",
            filename: "deck.pdf",
            content_type: "application/pdf",
            data: PDF_BYTES,
        },
        Part::File {
            name: "json_file",
            filename: "deck_analysis.json",
            content_type: "application/json",
            data: ARTIFACT.as_bytes(),
        },
        Part::Text {
            name: "mode",
            value: "json",
        },
        Part::Text {
            name: "converter_mode",
            value: "precision",
        },
    ]
}

// ── Health and routing ───────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_status_and_configuration() {
    let service = TestService::new(false);
    let response = service.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["ai_configured"], false);
    assert_eq!(json["jobs"], 0);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let service = TestService::new(false);
    let response = service.get("/this-route-does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let service = TestService::new(false);
    let response = service.get("/health").await;
    let request_id = response.headers().get("x-request-id");
    assert!(request_id.is_some(), "response must carry x-request-id");
    assert_eq!(request_id.unwrap().to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn root_redirects_to_frontend() {
    let service = TestService::new(false);
    let response = service.get("/").await;
    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/static/index.html"
    );
}

// ── Upload validation ────────────────────────────────────────────────────

#[tokio::test]
async fn upload_rejects_non_pdf_filename() {
    let service = TestService::new(false);
    let response = service
        .upload(vec![
            Part::File {
                name: "pdf_file",
                filename: "deck.docx",
                content_type: "application/octet-stream",
                data: PDF_BYTES,
            },
            Part::Text {
                name: "mode",
                value: "json",
            },
        ])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("PDF"));
}

#[tokio::test]
async fn upload_rejects_wrong_magic_bytes() {
    let service = TestService::new(false);
    let response = service
        .upload(vec![
            Part::File {
                name: "pdf_file",
                filename: "deck.pdf",
                content_type: "application/pdf",
                data: b"PK\x03\x04 this is a zip",
            },
            Part::Text {
                name: "mode",
                value: "json",
            },
        ])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn json_mode_requires_a_json_file() {
    let service = TestService::new(false);
    let response = service
        .upload(vec![
            Part::File {
                name: "pdf_file",
                filename: "deck.pdf",
                content_type: "application/pdf",
                data: PDF_BYTES,
            },
            Part::Text {
                name: "mode",
                value: "json",
            },
        ])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("JSON"));
}

#[tokio::test]
async fn json_mode_rejects_a_non_object_artifact() {
    let service = TestService::new(false);
    let mut parts = json_mode_parts();
    parts[1] = Part::File {
        name: "json_file",
        filename: "deck_analysis.json",
        content_type: "application/json",
        data: b"[1, 2, 3]",
    };
    let response = service.upload(parts).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn normal_mode_without_api_key_is_unavailable() {
    let service = TestService::new(false);
    let response = service
        .upload(vec![
            Part::File {
                name: "pdf_file",
                filename: "deck.pdf",
                content_type: "application/pdf",
                data: PDF_BYTES,
            },
            Part::Text {
                name: "mode",
                value: "normal",
            },
        ])
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn upload_registers_a_pending_job() {
    let service = TestService::new(false);
    let response = service.upload(json_mode_parts()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["mode"], "json");
    assert_eq!(json["converter_mode"], "precision");
    let job_id: Uuid = json["job_id"].as_str().unwrap().parse().unwrap();

    let status = service.get(&format!("/api/status/{job_id}")).await;
    assert_eq!(status.status(), StatusCode::OK);
    let job = body_json(status).await;
    assert_eq!(job["status"], "pending");
    assert_eq!(job["progress"], 0);
    assert_eq!(job["original_filename"], "deck.pdf");
    // Filesystem paths stay server-side.
    assert!(job.get("pdf_path").is_none());
}

// ── Job lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn status_of_unknown_job_is_404() {
    let service = TestService::new(false);
    let response = service
        .get(&format!("/api/status/{}", Uuid::new_v4()))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn process_of_unknown_job_is_404() {
    let service = TestService::new(false);
    let response = service
        .post(&format!("/api/process/{}", Uuid::new_v4()))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn continue_requires_json_ready() {
    let service = TestService::new(false);
    let upload = service.upload(json_mode_parts()).await;
    let job_id = body_json(upload).await["job_id"].as_str().unwrap().to_string();

    let response = service.post(&format!("/api/continue/{job_id}")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("pending"));
}

#[cfg(unix)]
#[tokio::test]
async fn double_process_is_rejected() {
    let service = TestService::new(false);
    let upload = service.upload(json_mode_parts()).await;
    let job_id = body_json(upload).await["job_id"].as_str().unwrap().to_string();

    let first = service.post(&format!("/api/process/{job_id}")).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = service.post(&format!("/api/process/{job_id}")).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
}

#[cfg(unix)]
#[tokio::test]
async fn json_mode_flow_runs_to_completion() {
    let service = TestService::new(false);

    // Upload.
    let upload = service.upload(json_mode_parts()).await;
    assert_eq!(upload.status(), StatusCode::OK);
    let job_id: Uuid = body_json(upload).await["job_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    // Download is refused before the job has run.
    let early = service.get(&format!("/api/download/{job_id}")).await;
    assert_eq!(early.status(), StatusCode::BAD_REQUEST);

    // Start processing; JSON mode goes straight to generation.
    let start = service.post(&format!("/api/process/{job_id}")).await;
    assert_eq!(start.status(), StatusCode::OK);
    assert_eq!(body_json(start).await["status"], "processing");

    assert_eq!(service.wait_for_terminal(job_id).await, JobStatus::Completed);

    let job = service.state.store.get(job_id).unwrap();
    assert_eq!(job.progress, 100);
    assert_eq!(job.output_filename.as_deref(), Some("deck.pptx"));

    // The status payload the frontend polls.
    let status = service.get(&format!("/api/status/{job_id}")).await;
    let json = body_json(status).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["progress"], 100);
    assert_eq!(json["output_filename"], "deck.pptx");

    // The artifact round-trips through the download endpoint.
    let artifact = service.get(&format!("/api/download-json/{job_id}")).await;
    assert_eq!(artifact.status(), StatusCode::OK);
    let disposition = artifact
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("deck_analysis.json"));
    let bytes = artifact.into_body().collect().await.unwrap().to_bytes();
    let round_trip: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(round_trip["page_1"]["blocks"][0]["text"], "Quarterly results");

    // The PPTX download streams the stub converter's output.
    let download = service.get(&format!("/api/download/{job_id}")).await;
    assert_eq!(download.status(), StatusCode::OK);
    assert!(download
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .contains("presentationml"));
    let bytes = download.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"PK-fake-pptx");
}

#[cfg(unix)]
#[tokio::test]
async fn download_falls_back_to_output_dir_after_cleanup() {
    let service = TestService::new(false);

    let upload = service.upload(json_mode_parts()).await;
    let job_id: Uuid = body_json(upload).await["job_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    service.post(&format!("/api/process/{job_id}")).await;
    assert_eq!(service.wait_for_terminal(job_id).await, JobStatus::Completed);

    let job_dir = service.state.store.get(job_id).unwrap().job_dir.clone();

    // Cleanup removes the record and the working directory…
    let cleanup = service
        .app()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/job/{job_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(cleanup.status(), StatusCode::OK);
    assert!(!job_dir.exists());
    assert_eq!(
        service.get(&format!("/api/status/{job_id}")).await.status(),
        StatusCode::NOT_FOUND
    );

    // …but the finished PPTX is still recoverable by id prefix.
    let download = service.get(&format!("/api/download/{job_id}")).await;
    assert_eq!(download.status(), StatusCode::OK);
    let bytes = download.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"PK-fake-pptx");
}

#[cfg(unix)]
#[tokio::test]
async fn failing_converter_marks_the_job_errored() {
    use std::os::unix::fs::PermissionsExt;

    let service = TestService::new(false);

    // Swap in a converter that always fails.
    let broken = service.dirs.path().join("broken-converter");
    std::fs::write(&broken, "#!/bin/sh\necho 'no fonts installed' >&2\nexit 7\n").unwrap();
    std::fs::set_permissions(&broken, std::fs::Permissions::from_mode(0o755)).unwrap();
    let mut config = (*service.state.config).clone();
    config.converter_precision = broken.to_str().unwrap().to_string();
    config.converter_safeguard = config.converter_precision.clone();
    let state = AppState {
        store: service.state.store.clone(),
        config: std::sync::Arc::new(config),
    };
    let service = TestService { state, dirs: service.dirs };

    let upload = service.upload(json_mode_parts()).await;
    let job_id: Uuid = body_json(upload).await["job_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    service.post(&format!("/api/process/{job_id}")).await;

    assert_eq!(service.wait_for_terminal(job_id).await, JobStatus::Error);

    let job = service.state.store.get(job_id).unwrap();
    assert_eq!(job.progress, 0);
    assert!(job.message.contains("no fonts installed"), "got: {}", job.message);
    assert!(job.message.contains("code 7"), "got: {}", job.message);
}

#[tokio::test]
async fn cleanup_is_idempotent() {
    let service = TestService::new(false);
    let response = service
        .app()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/job/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["message"], "Job cleaned up");
}
