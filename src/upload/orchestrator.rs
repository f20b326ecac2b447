//! Upload orchestrator
//!
//! Handles exactly one inbound upload per call:
//!
//! ```text
//! single:     authorize -> get_upload_url -> upload_file
//! large file: authorize -> [start_large_file] -> get_upload_part_url -> upload_part
//!                       -> [list_parts -> finish_large_file]
//! ```
//!
//! Calls are issued one after another. A failed call ends the request; the
//! caller re-sends the chunk (or the whole file). A large file whose finish
//! fails stays unfinished at B2.

use super::digest::sha1_hex;
use super::large_file::{LargeFileHandle, PartRecord, UploadPhase};
use super::{UploadError, UploadOutcome, UploadPlan, UploadRequest};
use crate::b2::{B2Client, B2ClientConfig, B2Error, B2Session};
use crate::config::{B2Config, Config, UploadConfig};
use crate::metrics;
use std::time::Instant;

/// Drives uploads against one B2 bucket
#[derive(Clone)]
pub struct UploadOrchestrator {
    client: B2Client,
    bucket_id: String,
    bucket_name: String,
    policy: UploadConfig,
}

impl UploadOrchestrator {
    /// Create an orchestrator from an existing client
    pub fn new(client: B2Client, b2: &B2Config, policy: UploadConfig) -> Self {
        Self {
            client,
            bucket_id: b2.bucket_id.clone(),
            bucket_name: b2.bucket_name.clone(),
            policy,
        }
    }

    /// Build the B2 client and orchestrator from configuration
    pub fn from_config(config: &Config) -> Result<Self, B2Error> {
        let client = B2Client::new(B2ClientConfig::from(&config.b2))?;
        Ok(Self::new(client, &config.b2, config.upload.clone()))
    }

    pub fn policy(&self) -> &UploadConfig {
        &self.policy
    }

    /// Handle one upload request
    #[tracing::instrument(
        name = "upload.handle",
        skip(self, request),
        fields(
            file_name = %request.file_name,
            part_number = ?request.part_number,
            total_parts = request.total_parts,
            upload.bytes = request.payload.len()
        ),
        err
    )]
    pub async fn handle(&self, request: UploadRequest) -> Result<UploadOutcome, UploadError> {
        let start = Instant::now();
        let bytes = request.payload.len() as u64;

        // Validation happens before any B2 call
        let plan = request.plan(self.policy.min_part_size)?;
        let mode = plan.mode();

        let result = self.execute(plan, request).await;

        metrics::record_upload_duration(mode, start.elapsed().as_secs_f64());
        match &result {
            Ok(UploadOutcome::Complete { .. }) => metrics::record_upload_success(mode, bytes),
            Ok(UploadOutcome::PartAccepted { .. }) => metrics::record_bytes(bytes),
            Err(_) => metrics::record_upload_failure(mode),
        }

        result
    }

    async fn execute(
        &self,
        plan: UploadPlan,
        request: UploadRequest,
    ) -> Result<UploadOutcome, UploadError> {
        let session = self.client.authorize_account().await?;

        match plan {
            UploadPlan::Single => self.upload_single(&session, request).await,
            UploadPlan::Part {
                part_number,
                total_parts,
                file_id,
            } => {
                self.upload_part(&session, request, part_number, total_parts, file_id)
                    .await
            }
        }
    }

    fn mime_type<'r>(&'r self, request: &'r UploadRequest) -> &'r str {
        request
            .mime_type
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.policy.default_mime_type)
    }

    async fn upload_single(
        &self,
        session: &B2Session<'_>,
        request: UploadRequest,
    ) -> Result<UploadOutcome, UploadError> {
        let target = session.get_upload_url(&self.bucket_id).await?;
        let sha1 = sha1_hex(&request.payload);

        let stored = session
            .upload_file(
                &target,
                &request.file_name,
                self.mime_type(&request),
                request.payload.clone(),
                &sha1,
            )
            .await?;

        if let Some(stored_sha1) = stored.content_sha1.as_deref() {
            if !super::digest::digests_match(&sha1, stored_sha1) {
                return Err(UploadError::DigestMismatch {
                    part_number: 1,
                    sent: sha1,
                    stored: stored_sha1.to_string(),
                });
            }
        }

        tracing::info!(file_id = %stored.file_id, "Single-shot upload completed");

        Ok(UploadOutcome::Complete {
            file_url: session.file_url(&self.bucket_name, &request.file_name),
            file_name: request.file_name,
        })
    }

    async fn upload_part(
        &self,
        session: &B2Session<'_>,
        request: UploadRequest,
        part_number: u32,
        total_parts: u32,
        file_id: Option<String>,
    ) -> Result<UploadOutcome, UploadError> {
        let mut handle = match file_id {
            Some(file_id) => LargeFileHandle::resume(file_id, total_parts),
            None => {
                let mut handle = LargeFileHandle::new(total_parts);
                let started = session
                    .start_large_file(
                        &self.bucket_id,
                        &request.file_name,
                        self.mime_type(&request),
                    )
                    .await?;
                tracing::info!(file_id = %started.file_id, "Large file started");
                handle.start(started.file_id);
                handle
            }
        };

        // Present in both branches above
        let file_id = handle.file_id().unwrap_or_default().to_string();

        let target = session.get_upload_part_url(&file_id).await?;
        let sha1 = sha1_hex(&request.payload);
        let size = request.payload.len();

        let stored = session
            .upload_part(&target, part_number, request.payload, &sha1)
            .await;
        let stored = match stored {
            Ok(stored) => {
                metrics::record_part(true);
                stored
            }
            Err(e) => {
                metrics::record_part(false);
                return Err(e.into());
            }
        };

        let phase = handle.record_part(PartRecord::from(stored));
        handle.verify_part(part_number, &sha1)?;

        tracing::info!(
            file_id = %file_id,
            part_number = part_number,
            size = size,
            "Part stored"
        );

        if phase != UploadPhase::Finalizing {
            return Ok(UploadOutcome::PartAccepted {
                file_id,
                part_number,
            });
        }

        self.finish(session, &mut handle).await?;

        Ok(UploadOutcome::Complete {
            file_url: session.file_url(&self.bucket_name, &request.file_name),
            file_name: request.file_name,
        })
    }

    /// List B2's stored parts and assemble the large file from them
    async fn finish(
        &self,
        session: &B2Session<'_>,
        handle: &mut LargeFileHandle,
    ) -> Result<(), UploadError> {
        let file_id = handle.file_id().unwrap_or_default().to_string();

        let listed = session
            .list_all_parts(&file_id, self.policy.list_parts_page_size)
            .await?;
        tracing::debug!(file_id = %file_id, parts = listed.len(), "Listed stored parts");

        handle.replace_parts(listed.into_iter().map(PartRecord::from));
        let digests = handle.finalize_digests()?;

        session.finish_large_file(&file_id, &digests).await?;
        handle.complete();

        metrics::record_large_file_completed(digests.len());
        tracing::info!(file_id = %file_id, parts = digests.len(), "Large file finished");

        Ok(())
    }
}
