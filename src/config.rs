//! Service configuration.
//!
//! All behaviour is controlled through [`ServiceConfig`], built via its
//! [`ServiceConfigBuilder`] or loaded from environment variables with
//! [`ServiceConfig::from_env`]. Keeping every knob in one struct makes it
//! trivial to share the config across handlers and background tasks, and to
//! diff two deployments to understand why their behaviour differs.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest; `from_env` is a thin layer on top.

use crate::error::ConvertError;
use serde::Serialize;
use std::path::PathBuf;

/// Configuration for the conversion service.
///
/// Built via [`ServiceConfig::builder()`], [`ServiceConfig::from_env()`], or
/// [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2deck::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .port(9000)
///     .gemini_model("gemini-3-flash-preview")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ServiceConfig {
    /// Bind address. Default: `0.0.0.0`.
    pub host: String,

    /// Bind port. Default: `8000`.
    pub port: u16,

    /// Allowed CORS origins; empty means allow any origin (the default,
    /// matching a service that fronts its own bundled frontend).
    pub cors_origins: Vec<String>,

    /// Maximum accepted upload body size in bytes. Default: 100 MiB.
    ///
    /// Multipart uploads are buffered to disk per field; without a cap a
    /// single request could fill the work volume.
    pub max_upload_bytes: usize,

    /// Per-job working directory root. Default: `temp_processing`.
    ///
    /// Each job gets `<work_dir>/<job_id>/` holding the stored PDF, rendered
    /// page PNGs, the analysis artifact, and the converter log.
    pub work_dir: PathBuf,

    /// Finished PPTX directory. Default: `output`.
    ///
    /// Output files are named `<job_id>_<original_stem>.pptx` so the
    /// download endpoint can recover them by id even after a restart.
    pub output_dir: PathBuf,

    /// Static frontend directory. Default: `static`.
    pub static_dir: PathBuf,

    // ── AI analysis ───────────────────────────────────────────────────────
    /// Gemini API key. `None` disables normal-mode analysis (JSON-mode jobs
    /// still work — they never call the API).
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,

    /// Gemini model id. Default: `gemini-3-flash-preview`.
    pub gemini_model: String,

    /// Sampling temperature for analysis calls. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to what it sees on the page,
    /// which is exactly what a layout-transcription task wants.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 8192.
    ///
    /// Dense slides produce large block lists; truncated JSON is unparseable
    /// JSON, so this errs high.
    pub max_output_tokens: u32,

    /// Maximum retry attempts on a transient API failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s, avoiding the
    /// thundering-herd problem against a recovering API endpoint.
    pub retry_backoff_ms: u64,

    /// Per-API-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Delay between consecutive page analyses in milliseconds. Default: 500.
    ///
    /// The free Gemini tier rate-limits aggressively; a fixed gap between
    /// pages keeps a multi-page job under the per-minute quota.
    pub page_delay_ms: u64,

    // ── Rendering ─────────────────────────────────────────────────────────
    /// Render scale relative to the page's natural size. Default: 2.0.
    ///
    /// 2× is the sweet spot for vision models: text is sharp enough to read
    /// reliably while PNG payloads stay well under API upload limits.
    pub render_scale: f32,

    /// Maximum rendered image dimension (width or height) in pixels.
    /// Default: 4000.
    ///
    /// A safety cap independent of scale: a 2× render of an A0 poster page
    /// would otherwise exhaust memory. Caps either dimension, scaling the
    /// other proportionally.
    pub max_rendered_pixels: u32,

    // ── Converter ─────────────────────────────────────────────────────────
    /// Precision-mode converter command. Default: `converters/precision`.
    ///
    /// Invoked as `<cmd> --pdf <pdf> --output <pptx> --json <artifact>
    /// --log <logfile>`.
    pub converter_precision: String,

    /// Safeguard-mode converter command. Default: `converters/safeguard`.
    pub converter_safeguard: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_origins: Vec::new(),
            max_upload_bytes: 100 * 1024 * 1024,
            work_dir: PathBuf::from("temp_processing"),
            output_dir: PathBuf::from("output"),
            static_dir: PathBuf::from("static"),
            gemini_api_key: None,
            gemini_model: "gemini-3-flash-preview".into(),
            temperature: 0.1,
            max_output_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            page_delay_ms: 500,
            render_scale: 2.0,
            max_rendered_pixels: 4000,
            converter_precision: "converters/precision".into(),
            converter_safeguard: "converters/safeguard".into(),
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                   |
    /// |---------------------------|---------------------------|
    /// | `HOST`                    | `0.0.0.0`                 |
    /// | `PORT`                    | `8000`                    |
    /// | `CORS_ORIGINS`            | *(empty — allow any)*     |
    /// | `MAX_UPLOAD_BYTES`        | `104857600`               |
    /// | `WORK_DIR`                | `temp_processing`         |
    /// | `OUTPUT_DIR`              | `output`                  |
    /// | `STATIC_DIR`              | `static`                  |
    /// | `GEMINI_API_KEY`          | *(unset — normal mode off)* |
    /// | `GEMINI_MODEL`            | `gemini-3-flash-preview`  |
    /// | `GEMINI_PAGE_DELAY_MS`    | `500`                     |
    /// | `CONVERTER_PRECISION_CMD` | `converters/precision`    |
    /// | `CONVERTER_SAFEGUARD_CMD` | `converters/safeguard`    |
    pub fn from_env() -> Result<Self, ConvertError> {
        let mut builder = Self::builder();

        if let Ok(host) = std::env::var("HOST") {
            builder = builder.host(host);
        }
        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| ConvertError::InvalidConfig(format!("PORT must be a u16, got '{port}'")))?;
            builder = builder.port(port);
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            builder = builder.cors_origins(
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>(),
            );
        }
        if let Ok(bytes) = std::env::var("MAX_UPLOAD_BYTES") {
            let bytes: usize = bytes.parse().map_err(|_| {
                ConvertError::InvalidConfig(format!("MAX_UPLOAD_BYTES must be a number, got '{bytes}'"))
            })?;
            builder = builder.max_upload_bytes(bytes);
        }
        if let Ok(dir) = std::env::var("WORK_DIR") {
            builder = builder.work_dir(dir);
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            builder = builder.output_dir(dir);
        }
        if let Ok(dir) = std::env::var("STATIC_DIR") {
            builder = builder.static_dir(dir);
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                builder = builder.gemini_api_key(key);
            }
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            builder = builder.gemini_model(model);
        }
        if let Ok(delay) = std::env::var("GEMINI_PAGE_DELAY_MS") {
            let delay: u64 = delay.parse().map_err(|_| {
                ConvertError::InvalidConfig(format!(
                    "GEMINI_PAGE_DELAY_MS must be a number, got '{delay}'"
                ))
            })?;
            builder = builder.page_delay_ms(delay);
        }
        if let Ok(cmd) = std::env::var("CONVERTER_PRECISION_CMD") {
            builder = builder.converter_precision(cmd);
        }
        if let Ok(cmd) = std::env::var("CONVERTER_SAFEGUARD_CMD") {
            builder = builder.converter_safeguard(cmd);
        }

        builder.build()
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn cors_origins(mut self, origins: Vec<String>) -> Self {
        self.config.cors_origins = origins;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes.max(1024);
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.static_dir = dir.into();
        self
    }

    pub fn gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.gemini_api_key = Some(key.into());
        self
    }

    pub fn gemini_model(mut self, model: impl Into<String>) -> Self {
        self.config.gemini_model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.page_delay_ms = ms;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(1.0, 4.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn converter_precision(mut self, cmd: impl Into<String>) -> Self {
        self.config.converter_precision = cmd.into();
        self
    }

    pub fn converter_safeguard(mut self, cmd: impl Into<String>) -> Self {
        self.config.converter_safeguard = cmd.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ConvertError> {
        let c = &self.config;
        if c.render_scale < 1.0 || c.render_scale > 4.0 {
            return Err(ConvertError::InvalidConfig(format!(
                "render_scale must be 1.0–4.0, got {}",
                c.render_scale
            )));
        }
        if c.converter_precision.trim().is_empty() || c.converter_safeguard.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "Converter commands must not be empty".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
