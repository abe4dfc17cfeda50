//! `/ai/generate`, `/ai/transcribe`, and job-status routes (spec §4.1, §6).
//!
//! Grounded on the gateway's inbound intake (`crates/gateway/src/api/inbound.rs`
//! in spirit: validate, dedupe, enqueue, respond with a handle) adapted to
//! this crate's typed job queue instead of an in-process dispatch.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use relay_cache::dedupe::Claim;
use relay_cache::ratelimit::{GENERATE_LIMIT, GENERATE_WINDOW_SECS};
use relay_domain::ids::dedup_fingerprint;
use relay_domain::types::{HistoryMessage, Job, JobType, ReferencedMessage};
use sha2::Digest;

use crate::api::response::{ApiError, SuccessEnvelope};
use crate::state::AppState;
use crate::worker::GenerateJobPayload;

#[derive(Debug, Deserialize)]
pub struct AttachmentInput {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub user_id: Uuid,
    pub personality_id: Uuid,
    pub message_text: String,
    pub user_display_name: String,
    #[serde(default)]
    pub user_handle: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    #[serde(default)]
    pub referenced: Vec<ReferencedMessage>,
    #[serde(default)]
    pub attachments: Vec<AttachmentInput>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    #[serde(default)]
    pub wait: bool,
}

fn sanitize_filename(name: &str) -> String {
    name.chars().map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' }).collect()
}

/// Downloads each attachment into the shared temp-attachments directory
/// under a path keyed by `request_id` (spec §4.1), returning the content
/// hash of each (for the dedup fingerprint) and the staged public URL.
async fn stage_attachments(
    state: &AppState,
    request_id: Uuid,
    attachments: &[AttachmentInput],
) -> Result<Vec<String>, ApiError> {
    if attachments.is_empty() {
        return Ok(Vec::new());
    }

    let dir = std::path::Path::new(&state.config.storage.temp_attachments_dir).join(request_id.to_string());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::validation(format!("failed to stage attachments: {e}")))?;

    let client = reqwest::Client::new();
    let mut content_hashes = Vec::with_capacity(attachments.len());
    for (index, attachment) in attachments.iter().enumerate() {
        let bytes = client
            .get(&attachment.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ApiError::validation(format!("failed to download attachment {}: {e}", attachment.name)))?
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("failed to read attachment {}: {e}", attachment.name)))?;

        let hash = hex::encode(sha2::Sha256::digest(&bytes));
        let staged_name = format!("{index}-{}", sanitize_filename(&attachment.name));
        tokio::fs::write(dir.join(&staged_name), &bytes)
            .await
            .map_err(|e| ApiError::validation(format!("failed to stage attachment {}: {e}", attachment.name)))?;
        content_hashes.push(hash);
    }
    Ok(content_hashes)
}

pub async fn submit_generate(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
    Json(request): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if request.message_text.trim().is_empty() {
        return Err(ApiError::validation("messageText must not be empty"));
    }

    let decision = state
        .rate_limiter
        .check("generate", &request.user_id.to_string(), GENERATE_LIMIT, GENERATE_WINDOW_SECS)
        .await?;
    if !decision.allowed {
        return Err(ApiError::rate_limited(decision.retry_after_secs));
    }

    let request_id = Uuid::new_v4();
    let attachment_hashes = stage_attachments(&state, request_id, &request.attachments).await?;

    let referenced_ids: Vec<String> = request.referenced.iter().map(|r| r.content.clone()).collect();
    let fingerprint =
        dedup_fingerprint(request.user_id, request.personality_id, &request.message_text, referenced_ids, attachment_hashes);

    let candidate_job_id = Uuid::new_v4();
    // Subscribe before enqueueing so a job that finishes immediately after
    // this caller wins the dedup claim still delivers its terminal event
    // instead of racing `JobEvents::cleanup`.
    let mut rx = if query.wait { Some(state.job_events.subscribe(candidate_job_id)) } else { None };

    let job_id = match state.dedupe.claim(&fingerprint, candidate_job_id).await? {
        Claim::Inserted => {
            let payload = GenerateJobPayload {
                user_id: request.user_id,
                personality_id: request.personality_id,
                channel_id: request.channel_id,
                guild_id: request.guild_id,
                session_id: request.session_id,
                message_text: request.message_text,
                raw_history: request.history,
                referenced: request.referenced,
                stop_sequences: request.stop_sequences,
                reasoning: None,
                user_display_name: request.user_display_name,
                user_handle: request.user_handle,
            };
            let job_payload = serde_json::to_value(&payload).map_err(|e| ApiError::validation(e.to_string()))?;
            let job = Job::new(candidate_job_id, JobType::LlmGeneration, job_payload);
            state.jobs.enqueue(&job).await?;
            candidate_job_id
        }
        Claim::Existing(existing) => {
            // This caller did not win the claim, so the subscription above
            // was opened against the wrong id; re-subscribe against the
            // job that is actually in flight.
            rx = if query.wait { Some(state.job_events.subscribe(existing)) } else { None };
            existing
        }
    };

    if let Some(existing_job) = state.jobs.get(job_id).await? {
        if let Some(result) = existing_job.result {
            return Ok((
                StatusCode::OK,
                Json(serde_json::json!({
                    "jobId": job_id,
                    "requestId": request_id,
                    "status": "completed",
                    "result": result,
                })),
            ));
        }
    }

    if let Some(mut rx) = rx {
        match tokio::time::timeout(Duration::from_secs(60), rx.recv()).await {
            Ok(Ok(relay_queue::JobEvent::Completed(result))) => {
                return Ok((
                    StatusCode::OK,
                    Json(serde_json::json!({
                        "jobId": job_id,
                        "requestId": request_id,
                        "status": "completed",
                        "result": result,
                    })),
                ));
            }
            Ok(Ok(relay_queue::JobEvent::Failed(message))) => return Err(ApiError::validation(message)),
            Ok(Err(_)) => return Err(ApiError::service_unavailable("lost job completion notification")),
            Err(_) => return Err(ApiError::service_unavailable("timed out waiting for job completion")),
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "jobId": job_id,
            "requestId": request_id,
            "status": "queued",
        })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeRequest {
    pub user_id: Uuid,
    pub audio_url: String,
    #[serde(default)]
    pub language: Option<String>,
}

pub async fn submit_transcribe(
    State(state): State<AppState>,
    Json(request): Json<TranscribeRequest>,
) -> Result<SuccessEnvelope, ApiError> {
    let job_id = Uuid::new_v4();
    let payload = serde_json::json!({
        "userId": request.user_id,
        "audioUrl": request.audio_url,
        "language": request.language,
    });
    let job = Job::new(job_id, JobType::AudioTranscription, payload);
    state.jobs.enqueue(&job).await?;
    Ok(SuccessEnvelope { job_id: Some(job_id), request_id: None, status: "queued".into() })
}

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state.jobs.get(job_id).await?.ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;
    Ok(Json(serde_json::json!({
        "jobId": job.id,
        "jobType": job.job_type,
        "state": job.state,
        "attempt": job.attempt,
        "result": job.result,
        "error": job.error,
    })))
}

pub async fn confirm_delivery(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<SuccessEnvelope, ApiError> {
    let existing = state.deliveries.get(job_id).await?.ok_or_else(|| ApiError::not_found(format!("job {job_id} has no result")))?;
    let _ = existing;
    state.deliveries.confirm_delivery(job_id).await?;
    Ok(SuccessEnvelope { job_id: Some(job_id), request_id: None, status: "delivered".into() })
}
