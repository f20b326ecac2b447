//! Backblaze B2 client module
//!
//! Thin client over the B2 native API (v2). Every call is a single request
//! with no retry; a non-success status becomes a [`B2Error::Api`] carrying
//! the step that failed and the raw provider payload.
//!
//! # Sessions
//!
//! [`B2Client::authorize_account`] returns a [`B2Session`] that borrows the
//! client. The session holds the short-lived authorization token and the
//! API/download endpoints for one inbound request and is dropped with it;
//! nothing is cached between requests.
//!
//! # Example
//!
//! ```no_run
//! use b2_relay::b2::{B2Client, B2ClientConfig};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = B2Client::new(B2ClientConfig {
//!     account_id: "account".to_string(),
//!     application_key: "key".to_string(),
//!     auth_url: b2_relay::config::DEFAULT_AUTH_URL.to_string(),
//!     timeout: Duration::from_secs(60),
//! })?;
//!
//! let session = client.authorize_account().await?;
//! let target = session.get_upload_url("bucket-id").await?;
//! let body = Bytes::from("Hello, World!");
//! let digest = b2_relay::upload::digest::sha1_hex(&body);
//! session
//!     .upload_file(&target, "hello.txt", "text/plain", body, &digest)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing
//!
//! | Call | Span Name |
//! |------|-----------|
//! | b2_authorize_account | `b2.authorize_account` |
//! | b2_get_upload_url | `b2.get_upload_url` |
//! | upload by URL | `b2.upload_file` |
//! | b2_start_large_file | `b2.start_large_file` |
//! | b2_get_upload_part_url | `b2.get_upload_part_url` |
//! | upload part by URL | `b2.upload_part` |
//! | b2_list_parts | `b2.list_parts` |
//! | b2_finish_large_file | `b2.finish_large_file` |

pub mod types;

use crate::config::B2Config;
use crate::metrics;
use base64::Engine;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

pub use types::{
    AuthorizeAccountResponse, FileInfo, ListPartsResponse, PartInfo, UploadPartUrl, UploadUrl,
};
use types::{
    FileIdRequest, FinishLargeFileRequest, GetUploadUrlRequest, ListPartsRequest,
    StartLargeFileRequest,
};

/// Characters B2 accepts unescaped in `X-Bz-File-Name` and download paths
const FILE_NAME_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Percent-encode a file name for B2 headers and download URLs
pub fn encode_file_name(file_name: &str) -> String {
    utf8_percent_encode(file_name, FILE_NAME_SET).to_string()
}

/// The B2 API call a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum B2Step {
    AuthorizeAccount,
    GetUploadUrl,
    UploadFile,
    StartLargeFile,
    GetUploadPartUrl,
    UploadPart,
    ListParts,
    FinishLargeFile,
}

impl B2Step {
    /// Name used in logs, metrics labels and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            B2Step::AuthorizeAccount => "b2_authorize_account",
            B2Step::GetUploadUrl => "b2_get_upload_url",
            B2Step::UploadFile => "b2_upload_file",
            B2Step::StartLargeFile => "b2_start_large_file",
            B2Step::GetUploadPartUrl => "b2_get_upload_part_url",
            B2Step::UploadPart => "b2_upload_part",
            B2Step::ListParts => "b2_list_parts",
            B2Step::FinishLargeFile => "b2_finish_large_file",
        }
    }
}

impl fmt::Display for B2Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// B2 client errors
#[derive(Error, Debug)]
pub enum B2Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{step} request failed: {source}")]
    Request {
        step: B2Step,
        #[source]
        source: reqwest::Error,
    },

    #[error("{step} failed ({status}): {body}")]
    Api {
        step: B2Step,
        status: u16,
        body: String,
    },

    #[error("{step} returned an unexpected response: {message}")]
    Decode { step: B2Step, message: String },
}

impl B2Error {
    /// The step that failed, if the error came from a B2 call
    pub fn step(&self) -> Option<B2Step> {
        match self {
            B2Error::ConfigError(_) => None,
            B2Error::Request { step, .. }
            | B2Error::Api { step, .. }
            | B2Error::Decode { step, .. } => Some(*step),
        }
    }
}

/// B2 client configuration
#[derive(Debug, Clone)]
pub struct B2ClientConfig {
    pub account_id: String,
    pub application_key: String,
    pub auth_url: String,
    pub timeout: Duration,
}

impl From<&B2Config> for B2ClientConfig {
    fn from(config: &B2Config) -> Self {
        Self {
            account_id: config.account_id.clone(),
            application_key: config.application_key.clone(),
            auth_url: config.auth_url.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

/// B2 client
///
/// Holds the account credentials and a pooled HTTP client. It carries no
/// authorization state of its own; see [`B2Session`].
#[derive(Clone)]
pub struct B2Client {
    config: B2ClientConfig,
    http_client: reqwest::Client,
}

impl B2Client {
    /// Create a new B2 client
    pub fn new(config: B2ClientConfig) -> Result<Self, B2Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| B2Error::ConfigError(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Authorization endpoint this client talks to
    pub fn auth_url(&self) -> &str {
        &self.config.auth_url
    }

    /// Authorize the account and open a session for one request
    #[tracing::instrument(
        name = "b2.authorize_account",
        skip(self),
        fields(http.status_code = tracing::field::Empty),
        err
    )]
    pub async fn authorize_account(&self) -> Result<B2Session<'_>, B2Error> {
        let step = B2Step::AuthorizeAccount;
        let credentials = format!("{}:{}", self.config.account_id, self.config.application_key);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);

        let start = Instant::now();
        let result = self
            .http_client
            .get(&self.config.auth_url)
            .header("Authorization", format!("Basic {}", encoded))
            .send()
            .await;
        let auth: AuthorizeAccountResponse = decode(step, start, result).await?;

        tracing::info!(api_url = %auth.api_url, "B2 account authorized");

        Ok(B2Session {
            client: self,
            authorization_token: auth.authorization_token,
            api_url: auth.api_url.trim_end_matches('/').to_string(),
            download_url: auth.download_url.trim_end_matches('/').to_string(),
            recommended_part_size: auth.recommended_part_size,
            absolute_minimum_part_size: auth.absolute_minimum_part_size,
        })
    }
}

/// An authorized B2 session, scoped to one inbound request
pub struct B2Session<'a> {
    client: &'a B2Client,
    authorization_token: String,
    api_url: String,
    download_url: String,
    recommended_part_size: Option<u64>,
    absolute_minimum_part_size: Option<u64>,
}

impl fmt::Debug for B2Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("B2Session")
            .field("api_url", &self.api_url)
            .field("download_url", &self.download_url)
            .field("authorization_token", &"<redacted>")
            .finish()
    }
}

impl<'a> B2Session<'a> {
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    pub fn recommended_part_size(&self) -> Option<u64> {
        self.recommended_part_size
    }

    pub fn absolute_minimum_part_size(&self) -> Option<u64> {
        self.absolute_minimum_part_size
    }

    /// Public URL of a file in a bucket, as served from the download endpoint
    pub fn file_url(&self, bucket_name: &str, file_name: &str) -> String {
        format!(
            "{}/file/{}/{}",
            self.download_url,
            bucket_name,
            encode_file_name(file_name)
        )
    }

    /// Get a one-time upload target for a bucket
    #[tracing::instrument(
        name = "b2.get_upload_url",
        skip(self),
        fields(http.status_code = tracing::field::Empty),
        err
    )]
    pub async fn get_upload_url(&self, bucket_id: &str) -> Result<UploadUrl, B2Error> {
        self.call(
            B2Step::GetUploadUrl,
            "b2_get_upload_url",
            &GetUploadUrlRequest { bucket_id },
        )
        .await
    }

    /// Upload a whole file to a target obtained from [`Self::get_upload_url`]
    #[tracing::instrument(
        name = "b2.upload_file",
        skip(self, target, body),
        fields(
            b2.file_name = %file_name,
            upload.bytes = body.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_file(
        &self,
        target: &UploadUrl,
        file_name: &str,
        content_type: &str,
        body: Bytes,
        content_sha1: &str,
    ) -> Result<FileInfo, B2Error> {
        let step = B2Step::UploadFile;
        let start = Instant::now();
        let result = self
            .client
            .http_client
            .post(&target.upload_url)
            .header("Authorization", &target.authorization_token)
            .header("X-Bz-File-Name", encode_file_name(file_name))
            .header("Content-Type", content_type)
            .header("Content-Length", body.len())
            .header("X-Bz-Content-Sha1", content_sha1)
            .body(body)
            .send()
            .await;
        decode(step, start, result).await
    }

    /// Begin a large file and return its provider-side metadata
    #[tracing::instrument(
        name = "b2.start_large_file",
        skip(self),
        fields(http.status_code = tracing::field::Empty),
        err
    )]
    pub async fn start_large_file(
        &self,
        bucket_id: &str,
        file_name: &str,
        content_type: &str,
    ) -> Result<FileInfo, B2Error> {
        self.call(
            B2Step::StartLargeFile,
            "b2_start_large_file",
            &StartLargeFileRequest {
                bucket_id,
                file_name,
                content_type,
            },
        )
        .await
    }

    /// Get an upload target for parts of a large file
    #[tracing::instrument(
        name = "b2.get_upload_part_url",
        skip(self),
        fields(http.status_code = tracing::field::Empty),
        err
    )]
    pub async fn get_upload_part_url(&self, file_id: &str) -> Result<UploadPartUrl, B2Error> {
        self.call(
            B2Step::GetUploadPartUrl,
            "b2_get_upload_part_url",
            &FileIdRequest { file_id },
        )
        .await
    }

    /// Upload one part of a large file
    #[tracing::instrument(
        name = "b2.upload_part",
        skip(self, target, body),
        fields(
            b2.file_id = %target.file_id,
            b2.part_number = part_number,
            upload.bytes = body.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_part(
        &self,
        target: &UploadPartUrl,
        part_number: u32,
        body: Bytes,
        content_sha1: &str,
    ) -> Result<PartInfo, B2Error> {
        let step = B2Step::UploadPart;
        let start = Instant::now();
        let result = self
            .client
            .http_client
            .post(&target.upload_url)
            .header("Authorization", &target.authorization_token)
            .header("X-Bz-Part-Number", part_number)
            .header("Content-Length", body.len())
            .header("X-Bz-Content-Sha1", content_sha1)
            .body(body)
            .send()
            .await;
        decode(step, start, result).await
    }

    /// Fetch one page of stored parts
    #[tracing::instrument(
        name = "b2.list_parts",
        skip(self),
        fields(http.status_code = tracing::field::Empty),
        err
    )]
    pub async fn list_parts(
        &self,
        file_id: &str,
        start_part_number: u32,
        max_part_count: u32,
    ) -> Result<ListPartsResponse, B2Error> {
        self.call(
            B2Step::ListParts,
            "b2_list_parts",
            &ListPartsRequest {
                file_id,
                start_part_number,
                max_part_count,
            },
        )
        .await
    }

    /// Fetch every stored part of a large file, following `nextPartNumber`
    pub async fn list_all_parts(
        &self,
        file_id: &str,
        page_size: u32,
    ) -> Result<Vec<PartInfo>, B2Error> {
        let mut parts = Vec::new();
        let mut start_part_number = 1;

        loop {
            let page = self.list_parts(file_id, start_part_number, page_size).await?;
            parts.extend(page.parts);

            match page.next_part_number {
                Some(next) if next > start_part_number => start_part_number = next,
                Some(next) => {
                    return Err(B2Error::Decode {
                        step: B2Step::ListParts,
                        message: format!(
                            "nextPartNumber {} does not advance past {}",
                            next, start_part_number
                        ),
                    })
                }
                None => break,
            }
        }

        Ok(parts)
    }

    /// Assemble a large file from the ordered list of part digests
    #[tracing::instrument(
        name = "b2.finish_large_file",
        skip(self, part_sha1_array),
        fields(
            parts_count = part_sha1_array.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn finish_large_file(
        &self,
        file_id: &str,
        part_sha1_array: &[String],
    ) -> Result<FileInfo, B2Error> {
        self.call(
            B2Step::FinishLargeFile,
            "b2_finish_large_file",
            &FinishLargeFileRequest {
                file_id,
                part_sha1_array,
            },
        )
        .await
    }

    /// POST a JSON body to `{api_url}/b2api/v2/{operation}` with the session token
    async fn call<B, T>(&self, step: B2Step, operation: &str, body: &B) -> Result<T, B2Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/b2api/v2/{}", self.api_url, operation);
        let start = Instant::now();
        let result = self
            .client
            .http_client
            .post(url)
            .header("Authorization", &self.authorization_token)
            .json(body)
            .send()
            .await;
        decode(step, start, result).await
    }
}

/// Turn a B2 response into a typed body, recording status and metrics
async fn decode<T: DeserializeOwned>(
    step: B2Step,
    start: Instant,
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, B2Error> {
    let outcome = match result {
        Err(source) => Err(B2Error::Request { step, source }),
        Ok(response) => {
            let status = response.status();
            tracing::Span::current().record("http.status_code", status.as_u16());

            match response.text().await {
                Err(source) => Err(B2Error::Request { step, source }),
                Ok(body) if !status.is_success() => Err(B2Error::Api {
                    step,
                    status: status.as_u16(),
                    body,
                }),
                Ok(body) => serde_json::from_str(&body).map_err(|e| B2Error::Decode {
                    step,
                    message: e.to_string(),
                }),
            }
        }
    };

    metrics::record_provider_call(
        step.as_str(),
        outcome.is_ok(),
        start.elapsed().as_secs_f64(),
    );

    outcome
}
