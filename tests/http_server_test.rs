//! End-to-end HTTP tests
//!
//! Runs the relay on an OS-assigned port in front of a mock B2 and talks to
//! it with a plain HTTP client, covering both request envelopes.

mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use b2_relay::config::Config;
    use b2_relay::server::Server;
    use b2_relay::upload::digest::sha1_hex;
    use base64::Engine;
    use reqwest::StatusCode;
    use serde_json::{json, Value};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    struct Relay {
        base_url: String,
        shutdown: Option<oneshot::Sender<()>>,
        handle: JoinHandle<()>,
    }

    impl Relay {
        async fn start(config: Config) -> Self {
            let server = Server::bind(config).await.unwrap();
            let base_url = format!("http://{}", server.local_addr());
            let (tx, rx) = oneshot::channel();

            let handle = tokio::spawn(async move {
                server
                    .run_until(async {
                        let _ = rx.await;
                    })
                    .await
                    .unwrap();
            });

            Self {
                base_url,
                shutdown: Some(tx),
                handle,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base_url, path)
        }

        async fn stop(mut self) {
            if let Some(tx) = self.shutdown.take() {
                let _ = tx.send(());
            }
            let _ = self.handle.await;
        }
    }

    async fn json_body(response: reqwest::Response) -> Value {
        response.json().await.unwrap()
    }

    // ========================================================================
    // Authorization and method checks
    // ========================================================================

    #[tokio::test]
    async fn test_missing_token_is_forbidden() {
        let b2 = MockB2::start().await;
        b2.mount_authorize(0).await;
        let relay = Relay::start(b2.config()).await;

        let response = reqwest::Client::new()
            .post(relay.url("/upload"))
            .json(&json!({
                "fileName": "report.pdf",
                "file": "aGVsbG8=",
                "totalParts": 1
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["message"], "Unauthorized");

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_wrong_token_is_forbidden() {
        let b2 = MockB2::start().await;
        b2.mount_authorize(0).await;
        let relay = Relay::start(b2.config()).await;

        let response = reqwest::Client::new()
            .post(relay.url("/upload"))
            .bearer_auth("not-the-token")
            .body("hello")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_put_is_not_allowed() {
        let b2 = MockB2::start().await;
        b2.mount_authorize(0).await;
        let relay = Relay::start(b2.config()).await;

        let response = reqwest::Client::new()
            .put(relay.url("/upload"))
            .bearer_auth(API_TOKEN)
            .body("hello")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let b2 = MockB2::start().await;
        let relay = Relay::start(b2.config()).await;
        let client = reqwest::Client::new();

        let health = client.get(relay.url("/health")).send().await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(json_body(health).await["status"], "ok");

        // A rejected upload records an auth attempt
        let rejected = client.post(relay.url("/upload")).send().await.unwrap();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

        let metrics = client.get(relay.url("/metrics")).send().await.unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
        assert!(metrics.text().await.unwrap().contains("b2relay_auth_attempts_total"));

        relay.stop().await;
    }

    // ========================================================================
    // JSON envelope
    // ========================================================================

    #[tokio::test]
    async fn test_json_single_upload() {
        let b2 = MockB2::start().await;
        let payload = b"hello, world";
        let sha1 = sha1_hex(payload);

        b2.mount_authorize(1).await;
        b2.mount_get_upload_url(1).await;
        b2.mount_upload_file("report.pdf", &sha1, 1).await;
        let relay = Relay::start(b2.config()).await;

        let response = reqwest::Client::new()
            .post(relay.url("/upload"))
            .bearer_auth(API_TOKEN)
            .json(&json!({
                "file": base64::engine::general_purpose::STANDARD.encode(payload),
                "fileName": "report.pdf",
                "mimeType": "application/pdf",
                "totalParts": 1
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "File uploaded successfully");
        assert!(body["fileUrl"].as_str().unwrap().contains("report.pdf"));

        let uploads = b2.requests_to(UPLOAD_FILE_PATH).await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].body, payload.to_vec());

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_json_missing_file_name_is_500_without_b2_calls() {
        let b2 = MockB2::start().await;
        b2.mount_authorize(0).await;
        let relay = Relay::start(b2.config()).await;

        let response = reqwest::Client::new()
            .post(relay.url("/upload"))
            .bearer_auth(API_TOKEN)
            .json(&json!({ "file": "aGVsbG8=", "totalParts": "1" }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Error uploading file");
        assert!(body["error"].as_str().unwrap().contains("fileName"));

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_base64_is_500() {
        let b2 = MockB2::start().await;
        b2.mount_authorize(0).await;
        let relay = Relay::start(b2.config()).await;

        let response = reqwest::Client::new()
            .post(relay.url("/upload"))
            .bearer_auth(API_TOKEN)
            .json(&json!({
                "file": "%%% not base64 %%%",
                "fileName": "report.pdf",
                "totalParts": 1
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        relay.stop().await;
    }

    // ========================================================================
    // Raw envelope
    // ========================================================================

    #[tokio::test]
    async fn test_raw_large_file_sequence() {
        let b2 = MockB2::start().await;
        const FILE_ID: &str = "4_large_raw";

        let chunks = vec![random_payload(TEST_MIN_PART_SIZE), random_payload(10)];
        let digests: Vec<String> = chunks.iter().map(|c| sha1_hex(c)).collect();

        b2.mount_authorize(2).await;
        b2.mount_start_large_file(FILE_ID, 1).await;
        b2.mount_get_upload_part_url(FILE_ID, 2).await;
        b2.mount_upload_part(FILE_ID, 1, &digests[0], chunks[0].len(), 1)
            .await;
        b2.mount_upload_part(FILE_ID, 2, &digests[1], chunks[1].len(), 1)
            .await;
        let stored = vec![
            (1, digests[0].clone(), chunks[0].len()),
            (2, digests[1].clone(), chunks[1].len()),
        ];
        b2.mount_list_parts_page(FILE_ID, 1, &stored, None, 1).await;
        b2.mount_finish_large_file(FILE_ID, 1).await;

        let relay = Relay::start(b2.config()).await;
        let client = reqwest::Client::new();

        let first = client
            .post(relay.url("/upload"))
            .bearer_auth(API_TOKEN)
            .header("Content-Type", "video/mp4")
            .header("x-file-name", "clips/holiday%20video.mp4")
            .header("x-part-number", "1")
            .header("x-total-parts", "2")
            .body(chunks[0].clone())
            .send()
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let first = json_body(first).await;
        assert_eq!(first["message"], "Part 1 received successfully");
        assert_eq!(first["fileId"], FILE_ID);

        let second = client
            .post(relay.url("/upload"))
            .bearer_auth(API_TOKEN)
            .header("Content-Type", "video/mp4")
            .header("x-file-name", "clips/holiday%20video.mp4")
            .header("x-part-number", "2")
            .header("x-total-parts", "2")
            .header("x-file-id", FILE_ID)
            .body(chunks[1].clone())
            .send()
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        let second = json_body(second).await;
        assert_eq!(second["message"], "File uploaded successfully");
        assert_eq!(
            second["fileUrl"],
            format!("{}/file/{}/clips/holiday%20video.mp4", b2.uri(), BUCKET_NAME)
        );

        let starts = b2.requests_to("/b2api/v2/b2_start_large_file").await;
        let start_body: Value = serde_json::from_slice(&starts[0].body).unwrap();
        assert_eq!(start_body["fileName"], "clips/holiday video.mp4");
        assert_eq!(start_body["contentType"], "video/mp4");

        relay.stop().await;
    }

    #[tokio::test]
    async fn test_raw_body_over_limit_is_rejected() {
        let b2 = MockB2::start().await;
        b2.mount_authorize(0).await;

        let mut config = b2.config();
        config.server.max_body_bytes = TEST_MIN_PART_SIZE;
        let relay = Relay::start(config).await;

        let response = reqwest::Client::new()
            .post(relay.url("/upload"))
            .bearer_auth(API_TOKEN)
            .header("x-file-name", "big.bin")
            .header("x-total-parts", "1")
            .body(random_payload(TEST_MIN_PART_SIZE * 2))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        relay.stop().await;
    }
}
