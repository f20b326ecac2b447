//! Request envelope parsing
//!
//! Turns an inbound upload request into an [`UploadRequest`]. Two shapes are
//! accepted on the same endpoint:
//!
//! - **JSON** (`Content-Type: application/json`): `file` (base64),
//!   `fileName`, `mimeType`, `partNumber`, `totalParts`, `fileId`
//! - **Raw** (anything else): the body is the payload and metadata travels in
//!   `x-file-name` (percent-encoded), `x-part-number`, `x-total-parts`,
//!   `x-file-id`

use crate::upload::UploadRequest;
use base64::Engine;
use bytes::Bytes;
use hyper::HeaderMap;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub const HEADER_FILE_NAME: &str = "x-file-name";
pub const HEADER_PART_NUMBER: &str = "x-part-number";
pub const HEADER_TOTAL_PARTS: &str = "x-total-parts";
pub const HEADER_FILE_ID: &str = "x-file-id";

/// Envelope errors
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid base64 in 'file': {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Header {0} is not valid UTF-8")]
    InvalidHeader(&'static str),
}

/// Which envelope shape a request uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Json,
    Raw,
}

impl EnvelopeKind {
    /// Decide from the request's Content-Type
    pub fn detect(headers: &HeaderMap) -> Self {
        let is_json = header_str(headers, "content-type")
            .and_then(|ct| ct.split(';').next())
            .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
            .unwrap_or(false);

        if is_json {
            EnvelopeKind::Json
        } else {
            EnvelopeKind::Raw
        }
    }
}

/// Parse a request body and headers into an upload request
pub fn parse(headers: &HeaderMap, body: Bytes) -> Result<UploadRequest, EnvelopeError> {
    match EnvelopeKind::detect(headers) {
        EnvelopeKind::Json => parse_json(&body),
        EnvelopeKind::Raw => parse_raw(headers, body),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonEnvelope {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    part_number: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    total_parts: Option<u32>,
    #[serde(default)]
    file_id: Option<String>,
}

/// Accept `3`, `"3"`, `null` or an empty string
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u32),
        Text(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn parse_json(body: &[u8]) -> Result<UploadRequest, EnvelopeError> {
    let envelope: JsonEnvelope = serde_json::from_slice(body)?;

    let payload = match envelope.file.as_deref() {
        Some(encoded) => Bytes::from(base64::engine::general_purpose::STANDARD.decode(encoded.trim())?),
        None => Bytes::new(),
    };

    Ok(UploadRequest {
        file_name: envelope.file_name.unwrap_or_default(),
        mime_type: non_empty(envelope.mime_type),
        payload,
        part_number: envelope.part_number.filter(|n| *n > 0),
        total_parts: envelope.total_parts.unwrap_or(0),
        file_id: non_empty(envelope.file_id),
    })
}

fn parse_raw(headers: &HeaderMap, body: Bytes) -> Result<UploadRequest, EnvelopeError> {
    let file_name = match header_value(headers, HEADER_FILE_NAME)? {
        Some(encoded) => percent_decode_str(encoded)
            .decode_utf8()
            .map_err(|_| EnvelopeError::InvalidHeader(HEADER_FILE_NAME))?
            .into_owned(),
        None => String::new(),
    };

    // Unparsable numbers count as absent
    let part_number = header_value(headers, HEADER_PART_NUMBER)?
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|n| *n > 0);
    let total_parts = header_value(headers, HEADER_TOTAL_PARTS)?
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let file_id = non_empty(header_value(headers, HEADER_FILE_ID)?.map(str::to_string));

    // A generic binary Content-Type says nothing about the file
    let mime_type = header_str(headers, "content-type")
        .map(str::trim)
        .filter(|ct| !ct.eq_ignore_ascii_case("application/octet-stream"))
        .map(str::to_string);

    Ok(UploadRequest {
        file_name,
        mime_type: non_empty(mime_type),
        payload: body,
        part_number,
        total_parts,
        file_id,
    })
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_value<'h>(
    headers: &'h HeaderMap,
    name: &'static str,
) -> Result<Option<&'h str>, EnvelopeError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| EnvelopeError::InvalidHeader(name)),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
