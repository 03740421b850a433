use axum::body::Body;
use axum::http::header;
use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tempfile::{NamedTempFile, TempPath};
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

use crate::catalog::store::MarkerCatalog;
use crate::cli::ServeArgs;
use crate::output::sink::SinkError;
use crate::parsing::stats::{StatsError, StatsMethod};
use crate::pipeline::budget::CancelToken;
use crate::pipeline::config::ScreenConfig;
use crate::pipeline::orchestrator::{screen_file, PipelineError, RunReport};
use crate::utils::validation::{validate_filename, PrefixSniffer, ValidationError};

/// Largest accepted upload
pub const MAX_UPLOAD_SIZE: usize = 11 * 1024 * 1024 * 1024;
pub const MAX_MULTIPART_FIELDS: usize = 10;
/// Requests handled at once; each upload runs its own worker pool
pub const MAX_CONCURRENT_REQUESTS: usize = 16;

pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

/// Filename used when the upload does not name its file
const DEFAULT_UPLOAD_NAME: &str = "upload.fastq";

/// Shared application state
pub struct AppState {
    pub catalog: MarkerCatalog,
    pub config: ScreenConfig,
    /// Where a copy of every result is kept, if anywhere
    pub output_dir: Option<PathBuf>,
    /// Parent of every upload's cancellation token, cancelled on shutdown
    pub shutdown: CancelToken,
}

impl AppState {
    #[must_use]
    pub fn new(catalog: MarkerCatalog, config: ScreenConfig, output_dir: Option<PathBuf>) -> Self {
        Self {
            catalog,
            config,
            output_dir,
            shutdown: CancelToken::new(),
        }
    }
}

/// Error body returned to clients
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: String,
}

/// Create a safe error response that prevents information disclosure
/// while logging detailed errors server-side for debugging
pub fn create_safe_error_response(
    error_type: &str,
    user_message: &str,
    internal_error: Option<&str>,
) -> ErrorResponse {
    if let Some(internal_msg) = internal_error {
        tracing::error!("Internal error ({}): {}", error_type, internal_msg);
    }

    ErrorResponse {
        error: user_message.to_string(),
        error_type: error_type.to_string(),
    }
}

fn error_response(
    status: StatusCode,
    error_type: &str,
    user_message: &str,
    internal_error: Option<&str>,
) -> Response {
    (
        status,
        Json(create_safe_error_response(
            error_type,
            user_message,
            internal_error,
        )),
    )
        .into_response()
}

/// Run the web server
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded, the tokio runtime cannot be
/// created or the server fails to start.
pub fn run(args: ServeArgs) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move { run_server(args).await })
}

/// Create the application router with all routes and middleware configured.
///
/// Per-IP rate limiting needs the peer address, so a rate-limited router must be
/// served with `into_make_service_with_connect_info::<SocketAddr>()`.
///
/// # Errors
///
/// Returns an error if the rate limiter cannot be configured.
pub fn create_router(state: Arc<AppState>, rate_limited: bool) -> anyhow::Result<Router> {
    let mut app = Router::new()
        .route("/upload", post(upload_handler))
        .route("/api/catalog", get(catalog_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    if rate_limited {
        let governor_conf = GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(50)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?;
        app = app.layer(GovernorLayer {
            config: Arc::new(governor_conf),
        });
    }

    let app = app.layer(
        ServiceBuilder::new()
            // Security headers for browser protection
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static("x-content-type-options"),
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static("x-frame-options"),
                HeaderValue::from_static("DENY"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static("strict-transport-security"),
                HeaderValue::from_static("max-age=31536000; includeSubDomains"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static("referrer-policy"),
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ))
            .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
    );

    Ok(app)
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.run.screen_config()?;
    let catalog = MarkerCatalog::load_from_file(&args.catalog)?;
    info!(
        "Loaded {} markers from {}",
        catalog.len(),
        args.catalog.display()
    );

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let state = Arc::new(AppState::new(catalog, config, args.output_dir));
    let shutdown = state.shutdown.clone();
    let app = create_router(state, true)?;

    let addr = format!("{}:{}", args.address, args.port);
    info!("Starting bhedi server at http://{addr}");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
        shutdown.cancel();
    })
    .await?;

    Ok(())
}

/// An upload spooled to disk
struct Upload {
    file: NamedTempFile,
    filename: String,
    bytes: u64,
}

/// Stream one multipart field into a temp file, checking its leading bytes
async fn spool_field(field: &mut Field<'_>, filename: String) -> Result<Upload, Response> {
    let file = NamedTempFile::with_prefix("bhedi-upload-").map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            "Failed to store upload",
            Some(&e.to_string()),
        )
    })?;
    let std_file = file.reopen().map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            "Failed to store upload",
            Some(&e.to_string()),
        )
    })?;
    let mut writer = tokio::fs::File::from_std(std_file);

    let mut sniffer = PrefixSniffer::new();
    let mut bytes = 0u64;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                return Err(error_response(
                    e.status(),
                    "upload_failed",
                    "Failed to receive upload",
                    Some(&e.body_text()),
                ));
            }
        };

        if let Err(e) = sniffer.feed(&chunk) {
            return Err(validation_error_response(&e));
        }
        bytes += chunk.len() as u64;

        if let Err(e) = writer.write_all(&chunk).await {
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "Failed to store upload",
                Some(&e.to_string()),
            ));
        }
    }

    if let Err(e) = writer.flush().await {
        return Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            "Failed to store upload",
            Some(&e.to_string()),
        ));
    }
    if let Err(e) = sniffer.finish() {
        return Err(validation_error_response(&e));
    }

    Ok(Upload {
        file,
        filename,
        bytes,
    })
}

fn validation_error_response(error: &ValidationError) -> Response {
    let (error_type, message) = match error {
        ValidationError::FilenameTooLong => {
            ("filename_too_long", "Filename exceeds maximum length limit")
        }
        ValidationError::InvalidFilename | ValidationError::EmptyFilename => (
            "invalid_filename",
            "Filename contains invalid or dangerous characters",
        ),
        ValidationError::EmptyFile => ("empty_file", "Uploaded file is empty"),
        ValidationError::FormatValidationFailed => (
            "unsupported_format",
            "Uploaded file is not FASTQ or FASTA (plain or gzip-compressed)",
        ),
    };
    error_response(StatusCode::BAD_REQUEST, error_type, message, None)
}

/// Pull the `file` field out of the form
async fn receive_upload(multipart: &mut Multipart) -> Result<Upload, Response> {
    let mut fields_received = 0usize;

    loop {
        if fields_received >= MAX_MULTIPART_FIELDS {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "field_limit_exceeded",
                "Too many form fields",
                None,
            ));
        }

        match multipart.next_field().await {
            Ok(Some(mut field)) => {
                fields_received += 1;
                if field.name() != Some("file") {
                    continue;
                }

                let filename = match field.file_name() {
                    Some(name) => validate_filename(name)
                        .map_err(|e| validation_error_response(&e))?,
                    None => DEFAULT_UPLOAD_NAME.to_string(),
                };
                return spool_field(&mut field, filename).await;
            }
            Ok(None) => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "missing_file",
                    "No file provided in the 'file' field",
                    None,
                ));
            }
            Err(e) => {
                return Err(error_response(
                    e.status(),
                    "multipart_error",
                    "Malformed multipart request",
                    Some(&e.body_text()),
                ));
            }
        }
    }
}

/// A Parquet result on disk, removed once the response body is dropped
struct ResultFile {
    file: tokio::fs::File,
    _path: TempPath,
}

impl AsyncRead for ResultFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_read(cx, buf)
    }
}

/// A finished result ready to send
struct ScreenedUpload {
    result: ResultFile,
    length: u64,
    report: RunReport,
}

/// Run the pipeline over a spooled upload. Blocking.
fn screen_upload(
    state: &AppState,
    upload: &Upload,
    cancel: &CancelToken,
) -> Result<ScreenedUpload, PipelineError> {
    let output = tempfile::Builder::new()
        .prefix("bhedi-result-")
        .suffix(".parquet")
        .tempfile()
        .map_err(|e| PipelineError::Output(SinkError::Io(e)))?;

    let report = screen_file(
        &state.catalog,
        upload.file.path(),
        output.path(),
        &state.config,
        StatsMethod::Native,
        cancel,
    )?;

    let path = output.into_temp_path();
    if let Some(dir) = &state.output_dir {
        let kept = dir.join(format!("{}.parquet", upload.filename));
        if let Err(e) = std::fs::copy(&path, &kept) {
            warn!("Failed to keep a copy at {}: {}", kept.display(), e);
        }
    }

    let reopen = || -> io::Result<(std::fs::File, u64)> {
        let file = std::fs::File::open(&path)?;
        let length = file.metadata()?.len();
        Ok((file, length))
    };
    let (file, length) = reopen().map_err(|e| PipelineError::Finalize(SinkError::Io(e)))?;

    Ok(ScreenedUpload {
        result: ResultFile {
            file: tokio::fs::File::from_std(file),
            _path: path,
        },
        length,
        report,
    })
}

/// Cancels the upload's run if the request is dropped before the run ends
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn pipeline_error_response(error: &PipelineError) -> Response {
    let internal = error.to_string();
    match error {
        PipelineError::Read(_) | PipelineError::Stats(StatsError::Stream(_)) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_sequence_file",
            "Uploaded file could not be read as FASTQ or FASTA",
            Some(&internal),
        ),
        PipelineError::Cancelled => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "run_cancelled",
            "Processing was cancelled",
            Some(&internal),
        ),
        _ => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "processing_failed",
            "Failed to process the uploaded file",
            Some(&internal),
        ),
    }
}

/// Screen an uploaded FASTQ/FASTA file and return the Parquet result
async fn upload_handler(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let upload = match receive_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };
    info!("Received {} ({} bytes)", upload.filename, upload.bytes);

    // a client disconnect drops this future and with it the guard
    let guard = CancelOnDrop(state.shutdown.child());
    let cancel = guard.0.clone();
    let worker_state = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || {
        (screen_upload(&worker_state, &upload, &cancel), upload)
    })
    .await;
    drop(guard);

    let (screened, upload) = match result {
        Ok(pair) => pair,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "processing_failed",
                "Failed to process the uploaded file",
                Some(&e.to_string()),
            );
        }
    };

    match screened {
        Ok(ScreenedUpload {
            result,
            length,
            report,
        }) => {
            info!(
                "{}: {} reads, {} matched, {} rows in {:.2?}",
                upload.filename,
                report.records,
                report.matched_records,
                report.rows_written,
                report.elapsed
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, PARQUET_CONTENT_TYPE.to_string()),
                    (header::CONTENT_LENGTH, length.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}.parquet\"", upload.filename),
                    ),
                    (
                        HeaderName::from_static("x-bhedi-records"),
                        report.records.to_string(),
                    ),
                    (
                        HeaderName::from_static("x-bhedi-rows-dropped"),
                        report.rows_dropped.to_string(),
                    ),
                ],
                Body::from_stream(ReaderStream::new(result)),
            )
                .into_response()
        }
        Err(e) => pipeline_error_response(&e),
    }
}

/// Return the markers of the loaded catalog
async fn catalog_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let markers: Vec<serde_json::Value> = state
        .catalog
        .iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id.0,
                "serotype": m.serotype,
                "length": m.length,
                "sequence": m.sequence,
            })
        })
        .collect();

    Json(serde_json::json!({
        "count": markers.len(),
        "serotypes": state.catalog.serotypes(),
        "markers": markers,
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "markers": state.catalog.len(),
    }))
}
