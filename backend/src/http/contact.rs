use std::sync::{Arc, OnceLock};

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{blocking, error::AppError, rate_limit::ClientIp, AppState};
use crate::crypto::integrity::{hash_ip, short_id};
use crate::store::NewSubmission;

const MAX_NAME: usize = 100;
const MAX_COMPANY: usize = 200;
const MAX_EMAIL: usize = 254;
const MAX_INTERESTS: usize = 20;
const MAX_INTEREST: usize = 100;
const MAX_INTEREST_OTHER: usize = 200;
const MAX_WEBSITE: usize = 300;
const MAX_BUDGET: usize = 100;
const MAX_DEADLINE: usize = 100;
const MAX_MESSAGE: usize = 5000;

const THANK_YOU: &str = "Thank you for your message. We will get back to you soon.";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContactRequest {
    pub name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub interests: Vec<String>,
    pub interest_other: Option<String>,
    pub website: Option<String>,
    pub budget: Option<String>,
    pub deadline: Option<String>,
    pub message: Option<String>,
    pub consent: bool,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl ContactRequest {
    /// Trims every field and checks presence and length limits.
    /// The returned submission has no ip hash yet.
    pub fn validate(self) -> Result<NewSubmission, AppError> {
        let company = required(self.company, "Company", MAX_COMPANY)?;
        let email = required(self.email, "Email", MAX_EMAIL)?;
        if !email_pattern().is_match(&email) {
            return Err(AppError::Validation("Email address is invalid".into()));
        }

        let interests: Vec<String> = self
            .interests
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect();
        if interests.is_empty() {
            return Err(AppError::Validation("Select at least one interest".into()));
        }
        if interests.len() > MAX_INTERESTS {
            return Err(AppError::Validation("Too many interests selected".into()));
        }
        if interests.iter().any(|i| i.chars().count() > MAX_INTEREST) {
            return Err(AppError::Validation("Interest is too long".into()));
        }

        let message = required(self.message, "Message", MAX_MESSAGE)?;
        if !self.consent {
            return Err(AppError::Validation(
                "Consent to data processing is required".into(),
            ));
        }

        Ok(NewSubmission {
            name: optional(self.name, "Name", MAX_NAME)?,
            company,
            email,
            interests,
            interest_other: optional(self.interest_other, "Other interest", MAX_INTEREST_OTHER)?,
            website: optional(self.website, "Website", MAX_WEBSITE)?,
            budget: optional(self.budget, "Budget", MAX_BUDGET)?,
            deadline: optional(self.deadline, "Deadline", MAX_DEADLINE)?,
            message,
            consent: true,
            ip_hash: String::new(),
        })
    }
}

fn required(value: Option<String>, field: &str, max: usize) -> Result<String, AppError> {
    let value = optional(value, field, max)?;
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(value)
}

fn optional(value: Option<String>, field: &str, max: usize) -> Result<String, AppError> {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value)
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
    })
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<ContactRequest>, JsonRejection>,
) -> Result<Json<ContactResponse>, AppError> {
    let Json(request) = payload?;
    let mut new = request.validate()?;
    new.ip_hash = hash_ip(&state.ip_pepper, &ip)?;

    let store = state.store.clone();
    let submission = blocking(move || store.insert(new)).await?;
    info!(short_id = %short_id(&submission.id), "contact submission stored");

    if let Some(notifier) = &state.notifier {
        if let Err(e) = notifier.submission_received(&submission).await {
            warn!(short_id = %short_id(&submission.id), "notification failed: {e}");
        }
    }

    Ok(Json(ContactResponse {
        success: true,
        message: THANK_YOU,
    }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
    })
}
