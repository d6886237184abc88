//! Password-protected admin API. Login trades the admin password for a
//! bearer token; every other route requires that token.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{header::AUTHORIZATION, request::Parts},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{blocking, error::AppError, AppState};
use crate::crypto::passwords::verify_password;
use crate::store::{redact_email, Submission, SubmissionExport};

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SubmissionList<T> {
    pub success: bool,
    pub count: usize,
    pub submissions: Vec<T>,
}

impl<T> SubmissionList<T> {
    fn new(submissions: Vec<T>) -> Self {
        Self {
            success: true,
            count: submissions.len(),
            submissions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmissionDetail {
    pub success: bool,
    pub submission: Submission,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErasureResponse {
    pub success: bool,
    pub deleted: usize,
}

/// Proof that the request carried a live admin token.
pub struct AdminSession {
    token: String,
}

impl FromRequestParts<Arc<AppState>> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        if !state.sessions.validate(token, Utc::now()) {
            return Err(AppError::Unauthorized);
        }
        Ok(AdminSession {
            token: token.to_string(),
        })
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(request) = payload?;
    if request.password.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let stored = state.admin_password_hash.clone();
    let matches =
        tokio::task::spawn_blocking(move || verify_password(&request.password, &stored)).await?;
    if !matches {
        warn!("admin login rejected");
        return Err(AppError::Unauthorized);
    }

    let (token, expires_at) = state.sessions.issue(Utc::now());
    info!(%expires_at, "admin session issued");
    Ok(Json(LoginResponse {
        success: true,
        token,
        expires_at,
    }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
) -> Json<ActionResponse> {
    state.sessions.revoke(&session.token);
    Json(ActionResponse {
        success: true,
        message: "Logged out".to_string(),
    })
}

pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
) -> Result<Json<SubmissionList<Submission>>, AppError> {
    let store = state.store.clone();
    let submissions = blocking(move || store.read_all()).await?;
    info!(count = submissions.len(), "admin listed submissions");
    Ok(Json(SubmissionList::new(submissions)))
}

pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
    Path(id): Path<String>,
) -> Result<Json<SubmissionDetail>, AppError> {
    let store = state.store.clone();
    let submission = blocking(move || store.find_by_id(&id))
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(SubmissionDetail {
        success: true,
        submission,
    }))
}

pub async fn delete_submission(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    let store = state.store.clone();
    let removed = blocking(move || store.delete_by_id(&id)).await?;
    if !removed {
        return Err(AppError::NotFound);
    }
    info!("admin deleted a submission");
    Ok(Json(ActionResponse {
        success: true,
        message: "Submission deleted".to_string(),
    }))
}

pub async fn export_by_email(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<SubmissionList<SubmissionExport>>, AppError> {
    let email = requested_email(payload)?;
    let store = state.store.clone();
    let exported = blocking(move || store.export_by_email(&email)).await?;
    Ok(Json(SubmissionList::new(exported)))
}

pub async fn erase_by_email(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<ErasureResponse>, AppError> {
    let email = requested_email(payload)?;
    let redacted = redact_email(&email);
    let store = state.store.clone();
    let deleted = blocking(move || store.delete_by_email(&email)).await?;
    info!(email = %redacted, deleted, "erasure request processed");
    Ok(Json(ErasureResponse {
        success: true,
        deleted,
    }))
}

fn requested_email(payload: Result<Json<EmailRequest>, JsonRejection>) -> Result<String, AppError> {
    let Json(request) = payload?;
    let email = request.email.trim().to_string();
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".into()));
    }
    Ok(email)
}
