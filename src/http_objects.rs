use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use secure_links::{LinkStats, LinkSummary};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(skip)]
    status_code: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status_code: StatusCode, message: &str) -> Self {
        Self {
            status_code,
            message: message.to_string(),
        }
    }

    pub fn internal_error(e: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string().as_str())
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("API Error: {} - {}", self.status_code, self.message);
        (self.status_code, self.message).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    pub key: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub sha256_hash: String,
    pub visibility: Visibility,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FilesList {
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LinkClass {
    Standard,
    Temporary,
    Presigned,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLinkRequest {
    pub class: LinkClass,
    /// Overrides the configured expiry for this link, seconds.
    pub expiry_secs: Option<u64>,
    /// Overrides the access cap for this link.
    pub max_accesses: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkResponse {
    pub url: String,
    pub class: LinkClass,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_accesses: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkStatsResponse {
    pub access_count: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_accesses: Option<u32>,
}

impl From<LinkStats> for LinkStatsResponse {
    fn from(stats: LinkStats) -> Self {
        Self {
            access_count: stats.access_count,
            created_at: stats.created_at,
            expires_at: stats.expires_at,
            max_accesses: stats.max_accesses,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkSummaryItem {
    pub id: String,
    pub bucket_name: String,
    pub object_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_accesses: Option<u32>,
    pub access_count: u32,
}

impl From<LinkSummary> for LinkSummaryItem {
    fn from(s: LinkSummary) -> Self {
        Self {
            id: s.id,
            bucket_name: s.bucket_name,
            object_key: s.object_key,
            created_at: s.created_at,
            expires_at: s.expires_at,
            max_accesses: s.max_accesses,
            access_count: s.access_count,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinksList {
    pub links: Vec<LinkSummaryItem>,
}
