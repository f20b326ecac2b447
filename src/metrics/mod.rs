//! Metrics module
//!
//! Prometheus metrics for uploads, B2 calls and inbound authentication.
//! Exposed as text on `GET /metrics` by the HTTP server.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "b2relay_uploads_total",
        "Uploads by mode and outcome",
        &["mode", "status"]  // mode: "single" or "large_file"
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "b2relay_upload_bytes_total",
        "Total bytes relayed to B2"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "b2relay_upload_duration_seconds",
        "Time to handle one upload request",
        &["mode"],
        vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Large-file metrics
    pub static ref PARTS_TOTAL: CounterVec = register_counter_vec!(
        "b2relay_parts_total",
        "Large-file parts uploaded",
        &["status"]
    ).unwrap();

    pub static ref LARGE_FILE_PARTS: Histogram = register_histogram!(
        "b2relay_large_file_parts",
        "Number of parts per finished large file",
        vec![2.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 10000.0]
    ).unwrap();

    // Provider metrics
    pub static ref PROVIDER_CALLS: CounterVec = register_counter_vec!(
        "b2relay_provider_calls_total",
        "B2 API calls by step and outcome",
        &["step", "status"]
    ).unwrap();

    pub static ref PROVIDER_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "b2relay_provider_call_duration_seconds",
        "B2 API call latency",
        &["step"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();

    // Auth metrics
    pub static ref AUTH_ATTEMPTS: CounterVec = register_counter_vec!(
        "b2relay_auth_attempts_total",
        "Inbound bearer-token checks",
        &["status"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "b2relay_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record a completed upload (single-shot or finished large file)
pub fn record_upload_success(mode: &str, bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&[mode, "success"]).inc();
    record_bytes(bytes);
}

/// Record a failed upload request
pub fn record_upload_failure(mode: &str) {
    UPLOADS_TOTAL.with_label_values(&[mode, "failure"]).inc();
}

/// Record bytes relayed without completing a file
pub fn record_bytes(bytes: u64) {
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record upload request duration
pub fn record_upload_duration(mode: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[mode])
        .observe(duration_secs);
}

/// Record one large-file part upload
pub fn record_part(success: bool) {
    PARTS_TOTAL.with_label_values(&[status_label(success)]).inc();
}

/// Record a finished large file
pub fn record_large_file_completed(parts_count: usize) {
    LARGE_FILE_PARTS.observe(parts_count as f64);
}

/// Record one B2 API call
pub fn record_provider_call(step: &str, success: bool, duration_secs: f64) {
    PROVIDER_CALLS
        .with_label_values(&[step, status_label(success)])
        .inc();
    PROVIDER_CALL_DURATION
        .with_label_values(&[step])
        .observe(duration_secs);
}

/// Record authentication attempt
pub fn record_auth_attempt(success: bool) {
    AUTH_ATTEMPTS
        .with_label_values(&[status_label(success)])
        .inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render the default registry in Prometheus text format
pub fn render() -> Result<(String, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    let body = String::from_utf8_lossy(&buffer).into_owned();
    Ok((encoder.format_type().to_string(), body))
}
