//! Common test infrastructure
//!
//! A wiremock server standing in for the B2 API, with helpers to mount each
//! call the relay makes and to build configuration pointing at it.

#![allow(dead_code)]

use b2_relay::b2::{B2Client, B2ClientConfig};
use b2_relay::config::{
    AuthConfig, B2Config, Config, LoggingConfig, MetricsConfig, ServerConfig, UploadConfig,
};
use base64::Engine;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const ACCOUNT_ID: &str = "test-account";
pub const APPLICATION_KEY: &str = "test-application-key";
pub const SESSION_TOKEN: &str = "session-token";
pub const UPLOAD_TOKEN: &str = "upload-token";
pub const PART_TOKEN: &str = "part-token";
pub const BUCKET_ID: &str = "test-bucket-id";
pub const BUCKET_NAME: &str = "test-bucket";
pub const API_TOKEN: &str = "relay-api-token";

pub const AUTHORIZE_PATH: &str = "/b2api/v2/b2_authorize_account";
pub const UPLOAD_FILE_PATH: &str = "/upload/file";
pub const UPLOAD_PART_PATH: &str = "/upload/part";

/// Small part floor so tests do not push megabytes around
pub const TEST_MIN_PART_SIZE: usize = 1024;

/// Mock B2 API
pub struct MockB2 {
    pub server: MockServer,
}

impl MockB2 {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn b2_config(&self) -> B2Config {
        B2Config {
            account_id: ACCOUNT_ID.to_string(),
            application_key: APPLICATION_KEY.to_string(),
            bucket_id: BUCKET_ID.to_string(),
            bucket_name: BUCKET_NAME.to_string(),
            auth_url: format!("{}{}", self.uri(), AUTHORIZE_PATH),
            timeout_seconds: 10,
        }
    }

    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            min_part_size: TEST_MIN_PART_SIZE,
            ..Default::default()
        }
    }

    /// Full relay configuration bound to an OS-assigned local port
    pub fn config(&self) -> Config {
        Config {
            server: ServerConfig {
                address: "127.0.0.1:0".to_string(),
                ..Default::default()
            },
            auth: AuthConfig {
                api_token: API_TOKEN.to_string(),
            },
            b2: self.b2_config(),
            upload: self.upload_config(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn client(&self) -> B2Client {
        B2Client::new(B2ClientConfig::from(&self.b2_config())).unwrap()
    }

    pub async fn mount_authorize(&self, expected_calls: u64) {
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", ACCOUNT_ID, APPLICATION_KEY));

        Mock::given(method("GET"))
            .and(path(AUTHORIZE_PATH))
            .and(header("Authorization", format!("Basic {}", credentials).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accountId": ACCOUNT_ID,
                "authorizationToken": SESSION_TOKEN,
                "apiUrl": self.uri(),
                "downloadUrl": self.uri(),
                "recommendedPartSize": 100000000,
                "absoluteMinimumPartSize": 5000000
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_authorize_failure(&self, status: u16, code: &str) {
        Mock::given(method("GET"))
            .and(path(AUTHORIZE_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "status": status,
                "code": code,
                "message": "rejected by test"
            })))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_get_upload_url(&self, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_get_upload_url"))
            .and(header("Authorization", SESSION_TOKEN))
            .and(body_partial_json(json!({ "bucketId": BUCKET_ID })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bucketId": BUCKET_ID,
                "uploadUrl": format!("{}{}", self.uri(), UPLOAD_FILE_PATH),
                "authorizationToken": UPLOAD_TOKEN
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_upload_file(&self, file_name: &str, sha1: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(UPLOAD_FILE_PATH))
            .and(header("Authorization", UPLOAD_TOKEN))
            .and(header("X-Bz-Content-Sha1", sha1))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fileId": "4_single_file",
                "fileName": file_name,
                "contentSha1": sha1,
                "contentType": "application/octet-stream"
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_start_large_file(&self, file_id: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_start_large_file"))
            .and(header("Authorization", SESSION_TOKEN))
            .and(body_partial_json(json!({ "bucketId": BUCKET_ID })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fileId": file_id,
                "fileName": "ignored",
                "contentType": "application/octet-stream"
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_get_upload_part_url(&self, file_id: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_get_upload_part_url"))
            .and(header("Authorization", SESSION_TOKEN))
            .and(body_partial_json(json!({ "fileId": file_id })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fileId": file_id,
                "uploadUrl": format!("{}{}", self.uri(), UPLOAD_PART_PATH),
                "authorizationToken": PART_TOKEN
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_upload_part(
        &self,
        file_id: &str,
        part_number: u32,
        sha1: &str,
        length: usize,
        expected_calls: u64,
    ) {
        Mock::given(method("POST"))
            .and(path(UPLOAD_PART_PATH))
            .and(header("Authorization", PART_TOKEN))
            .and(header("X-Bz-Part-Number", part_number.to_string().as_str()))
            .and(header("X-Bz-Content-Sha1", sha1))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fileId": file_id,
                "partNumber": part_number,
                "contentLength": length,
                "contentSha1": sha1
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// Mount one page of `b2_list_parts` starting at `start_part_number`
    pub async fn mount_list_parts_page(
        &self,
        file_id: &str,
        start_part_number: u32,
        parts: &[(u32, String, usize)],
        next_part_number: Option<u32>,
        expected_calls: u64,
    ) {
        let parts: Vec<_> = parts
            .iter()
            .map(|(number, sha1, length)| {
                json!({
                    "fileId": file_id,
                    "partNumber": number,
                    "contentLength": length,
                    "contentSha1": sha1,
                    "uploadTimestamp": 1700000000000u64
                })
            })
            .collect();

        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_list_parts"))
            .and(header("Authorization", SESSION_TOKEN))
            .and(body_partial_json(json!({
                "fileId": file_id,
                "startPartNumber": start_part_number
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "parts": parts,
                "nextPartNumber": next_part_number
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_finish_large_file(&self, file_id: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/b2api/v2/b2_finish_large_file"))
            .and(header("Authorization", SESSION_TOKEN))
            .and(body_partial_json(json!({ "fileId": file_id })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fileId": file_id,
                "fileName": "ignored",
                "contentSha1": "none"
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// Requests B2 received on `request_path`, in arrival order
    pub async fn requests_to(&self, request_path: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .collect()
    }

    /// Total number of requests B2 received
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or(0)
    }
}

/// A payload of `size` random bytes
pub fn random_payload(size: usize) -> Vec<u8> {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random()).collect()
}
