use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

const ID_BYTES: usize = 16;

/// One stored contact form submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub name: String,
    pub company: String,
    pub email: String,
    pub interests: Vec<String>,
    pub interest_other: String,
    pub website: String,
    pub budget: String,
    pub deadline: String,
    pub message: String,
    pub consent: bool,
    pub consent_timestamp: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub ip_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Validated form fields before the store assigns an id and retention stamps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewSubmission {
    pub name: String,
    pub company: String,
    pub email: String,
    pub interests: Vec<String>,
    pub interest_other: String,
    pub website: String,
    pub budget: String,
    pub deadline: String,
    pub message: String,
    pub consent: bool,
    pub ip_hash: String,
}

impl NewSubmission {
    /// None when `now + retention` is past the representable range.
    pub(crate) fn into_submission(
        self,
        id: String,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Option<Submission> {
        let expires_at = now.checked_add_signed(retention)?;
        Some(Submission {
            id,
            name: self.name,
            company: self.company,
            email: self.email,
            interests: self.interests,
            interest_other: self.interest_other,
            website: self.website,
            budget: self.budget,
            deadline: self.deadline,
            message: self.message,
            consent: self.consent,
            consent_timestamp: now,
            submitted_at: now,
            ip_hash: self.ip_hash,
            created_at: now,
            expires_at,
        })
    }
}

/// Data-portability view of a submission: internal fields are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionExport {
    pub name: String,
    pub company: String,
    pub email: String,
    pub interests: Vec<String>,
    pub interest_other: String,
    pub website: String,
    pub budget: String,
    pub deadline: String,
    pub message: String,
    pub consent: bool,
    pub consent_timestamp: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Submission> for SubmissionExport {
    fn from(s: Submission) -> Self {
        Self {
            name: s.name,
            company: s.company,
            email: s.email,
            interests: s.interests,
            interest_other: s.interest_other,
            website: s.website,
            budget: s.budget,
            deadline: s.deadline,
            message: s.message,
            consent: s.consent,
            consent_timestamp: s.consent_timestamp,
            submitted_at: s.submitted_at,
            created_at: s.created_at,
            expires_at: s.expires_at,
        }
    }
}

impl Submission {
    pub fn email_matches(&self, email: &str) -> bool {
        self.email.trim().to_lowercase() == email.trim().to_lowercase()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// 128 random bits, hex encoded.
pub fn generate_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Keeps the first two characters of the local part: `jo***@example.com`.
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{visible}***@{domain}")
        }
        None => "***".to_string(),
    }
}
