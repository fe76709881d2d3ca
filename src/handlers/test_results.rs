//! Test-result endpoints: badge, ingestion, and run redirect.

use std::str::FromStr;
use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::badge::Badge;
use crate::cache::CacheDirective;
use crate::error::ApiError;
use crate::handlers::{AppContext, RouteRequest};
use crate::responder;
use crate::store::results::{Platform, PutOutcome, TestResultRecord};
use crate::types::Response;

/// Ingestion payload as signed and posted by CI.
#[derive(Debug, Deserialize)]
struct IngestPayload {
    platform: String,
    passed: u32,
    failed: u32,
    skipped: u32,
    total: u32,
    run_id: String,
    url_html: String,
    commit: String,
    timestamp: String,
    /// Branch the run executed on; older clients omit it.
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    test_result_id: String,
    repository: String,
    timestamp: String,
}

const DEFAULT_BRANCH: &str = "main";

fn parse_platform(raw: &str) -> Result<Platform, ApiError> {
    Platform::from_str(raw).map_err(|_| {
        ApiError::validation(
            "Platform must be one of linux, windows, macos",
            "INVALID_PLATFORM",
            "platform",
        )
    })
}

/// Pulls the `(platform, owner, repo, branch)` quartet out of a route.
fn route_key(request: &RouteRequest) -> Result<(Platform, String, String, String), ApiError> {
    let platform = parse_platform(request.param("platform").ok_or(ApiError::Internal)?.as_ref())?;
    let owner = request.param("owner").ok_or(ApiError::Internal)?.into_owned();
    let repo = request.param("repo").ok_or(ApiError::Internal)?.into_owned();
    let branch = request
        .param("branch")
        .ok_or(ApiError::Internal)?
        .into_owned();
    Ok((platform, owner, repo, branch))
}

/// `GET /badges/tests/{platform}/{owner}/{repo}/{branch}`
pub async fn test_badge(
    request: RouteRequest,
    context: Arc<AppContext>,
) -> Result<Response, ApiError> {
    let (platform, owner, repo, branch) = route_key(&request)?;
    let latest = context
        .results
        .get_latest(&owner, &repo, platform, &branch)
        .await
        .map_err(|_| ApiError::Unavailable)?;

    let badge = match &latest {
        Some(record) => Badge::test_results(record.passed, record.failed, record.total),
        None => Badge::not_found("tests", "not found"),
    };
    Ok(responder::ok_json(
        &badge,
        CacheDirective::badge(),
        None,
        request.header("if-none-match"),
    ))
}

/// `POST /tests/results`: authenticated, idempotent per run id.
pub async fn ingest(request: RouteRequest, context: Arc<AppContext>) -> Result<Response, ApiError> {
    let auth = request.auth().ok_or(ApiError::Internal)?;
    let (owner, repo) = auth.repo.split_once('/').ok_or_else(|| {
        ApiError::validation(
            "Repository identifier must be in owner/repo form",
            "INVALID_REPOSITORY",
            "x-repo-secret",
        )
    })?;

    let payload: IngestPayload = serde_json::from_slice(request.body()).map_err(|err| {
        ApiError::validation(
            format!("Request body is not a valid test result: {err}"),
            "INVALID_BODY",
            "body",
        )
    })?;

    let platform = parse_platform(&payload.platform)?;
    let counted = payload.passed as u64 + payload.failed as u64 + payload.skipped as u64;
    if payload.total as u64 != counted {
        return Err(ApiError::validation(
            "Total must equal passed + failed + skipped",
            "TOTAL_MISMATCH",
            "total",
        ));
    }
    if payload.run_id.trim().is_empty() {
        return Err(ApiError::validation(
            "Run id must not be empty",
            "RUN_ID_REQUIRED",
            "run_id",
        ));
    }
    let timestamp = DateTime::parse_from_rfc3339(&payload.timestamp).map_err(|_| {
        ApiError::validation(
            "Timestamp must be RFC 3339",
            "INVALID_BODY_TIMESTAMP",
            "timestamp",
        )
    })?;

    let record = TestResultRecord {
        owner: owner.to_string(),
        repo: repo.to_string(),
        platform,
        branch: payload
            .branch
            .clone()
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        run_id: payload.run_id.clone(),
        passed: payload.passed,
        failed: payload.failed,
        skipped: payload.skipped,
        total: payload.total,
        run_url: payload.url_html.clone(),
        commit: payload.commit.clone(),
        timestamp_epoch: timestamp.timestamp(),
    };
    let test_result_id = format!("{}#{}", record.timestamp_epoch, record.run_id);

    match context
        .results
        .put(record, context.run_marker_ttl)
        .await
        .map_err(|_| ApiError::Unavailable)?
    {
        PutOutcome::Accepted => {
            tracing::info!(repo = %auth.repo, run_id = %payload.run_id, "test result accepted");
            let body = IngestResponse {
                test_result_id,
                repository: auth.repo.clone(),
                timestamp: payload.timestamp,
            };
            Ok(responder::created_json(&body, None))
        }
        PutOutcome::Duplicate => Err(ApiError::DuplicateRun),
    }
}

/// `GET /redirect/test-results/{platform}/{owner}/{repo}/{branch}`
pub async fn redirect_to_run(
    request: RouteRequest,
    context: Arc<AppContext>,
) -> Result<Response, ApiError> {
    let (platform, owner, repo, branch) = route_key(&request)?;
    let latest = context
        .results
        .get_latest(&owner, &repo, platform, &branch)
        .await
        .map_err(|_| ApiError::Unavailable)?;

    match latest {
        Some(record) => Ok(responder::redirect(&record.run_url, None)),
        None => Err(ApiError::NotFound),
    }
}
