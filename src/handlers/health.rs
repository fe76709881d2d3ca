//! Liveness probe.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::cache::CacheDirective;
use crate::error::ApiError;
use crate::handlers::{AppContext, RouteRequest};
use crate::responder;
use crate::types::Response;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: String,
}

pub async fn health(_request: RouteRequest, _context: Arc<AppContext>) -> Result<Response, ApiError> {
    let body = HealthBody {
        status: "Healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    Ok(responder::ok_json(
        &body,
        CacheDirective::no_store(),
        None,
        None,
    ))
}
