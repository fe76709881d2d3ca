//! Package badge handler.
//!
//! Resolves the provider from the route, applies the query filters, and maps
//! every lookup outcome to a badge-shaped 200 wherever possible: missing
//! packages and empty filter sets render a "not found" badge, a degraded
//! upstream renders the cached version with a shorter cache window or an
//! "unavailable" badge. Only caller mistakes (unknown provider, missing org,
//! malformed filters) surface as 4xx.

use std::sync::Arc;

use crate::badge::Badge;
use crate::cache::CacheDirective;
use crate::error::ApiError;
use crate::handlers::{AppContext, RouteRequest};
use crate::providers::{PackageLookup, ProviderError};
use crate::responder;
use crate::types::Response;
use crate::version::VersionFilters;

pub async fn package_badge(
    request: RouteRequest,
    context: Arc<AppContext>,
) -> Result<Response, ApiError> {
    let provider_key = request
        .param("provider")
        .ok_or(ApiError::Internal)?
        .into_owned();
    let package = request
        .param("package")
        .ok_or(ApiError::Internal)?
        .into_owned();
    let org = request.param("org").map(|org| org.into_owned());

    let provider = context.providers.get(&provider_key).ok_or_else(|| {
        ApiError::validation(
            format!("Unknown package provider '{provider_key}'"),
            "PROVIDER_UNKNOWN",
            "provider",
        )
    })?;

    let filters = VersionFilters::from_query(request.query())?;
    let if_none_match = request.header("if-none-match");
    let label = provider.key();

    let lookup = provider
        .get_latest(org.as_deref(), &package, &filters)
        .await;

    let response = match lookup {
        Ok(PackageLookup::Fresh(info)) => responder::ok_json(
            &Badge::package_version(label, &info.version, provider.logo()),
            CacheDirective::badge(),
            info.published_at,
            if_none_match,
        ),
        Ok(PackageLookup::Stale(info)) => responder::ok_json(
            &Badge::package_version(label, &info.version, provider.logo()),
            CacheDirective::stale_badge(),
            info.published_at,
            if_none_match,
        ),
        Ok(PackageLookup::NotFound { reason }) => responder::ok_json(
            &Badge::not_found(label, reason),
            CacheDirective::badge(),
            None,
            if_none_match,
        ),
        Err(ProviderError::OrgRequired) => {
            return Err(ApiError::validation(
                ProviderError::OrgRequired.to_string(),
                "ORG_REQUIRED",
                "org",
            ));
        }
        Err(ProviderError::Unavailable) => responder::ok_json(
            &Badge::unavailable(label),
            CacheDirective::unavailable_badge(),
            None,
            if_none_match,
        ),
        Err(ProviderError::Internal) => return Err(ApiError::Internal),
    };
    Ok(response)
}
