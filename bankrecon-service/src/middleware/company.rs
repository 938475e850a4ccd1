//! Company context middleware for multi-tenancy support.
//!
//! Extracts the company scope and caller identity from request headers set by
//! the gateway after authentication.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

/// Company context extracted from request headers.
#[derive(Debug, Clone)]
pub struct CompanyContext {
    pub company_id: Uuid,
    /// Caller identity (optional for read paths).
    pub user_id: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for CompanyContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let company_id = parts
            .headers
            .get("X-Company-Id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("Missing X-Company-Id header"))
            })?;

        let company_id = Uuid::parse_str(company_id)
            .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid X-Company-Id header")))?;

        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let span = tracing::Span::current();
        span.record("company_id", tracing::field::display(company_id));
        if let Some(ref uid) = user_id {
            span.record("user_id", uid.as_str());
        }

        Ok(CompanyContext {
            company_id,
            user_id,
        })
    }
}
