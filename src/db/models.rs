//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Project row. `status` is the derived completed flag.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub project_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub live_link: Option<String>,
    pub git_link: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: bool,
}

/// Tool (technology) that can be linked to projects
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tool {
    pub tool_id: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub category: Option<String>,
    pub image: Option<String>,
}

/// Client that can be linked to projects
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Client {
    pub client_id: i64,
    pub name: String,
    pub tel: Option<String>,
    pub e_mail: Option<String>,
    pub image: Option<String>,
}

/// Project image. `project_id` is NULL once soft-detached from a deleted project.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProjectImage {
    pub image_id: i64,
    pub project_id: Option<i64>,
    pub image: String,
    pub public_id: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProjectDemo {
    pub demo_id: i64,
    pub project_id: i64,
    pub demo: String,
}

/// Service row. `status` is the active flag; a passed `end_date` forces it off.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Service {
    pub service_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: bool,
    pub created_at: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub pricing: Option<f64>,
}

/// Blog post. `content` is the rich editor document stored verbatim.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub post_id: i64,
    pub title: String,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub summary: Option<String>,
    pub head_image: Option<String>,
    pub content: Option<serde_json::Value>,
    pub status: bool,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PostImage {
    pub image_id: i64,
    pub post_id: i64,
    pub image: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PostText {
    pub post_text_id: i64,
    pub post_id: i64,
    pub part: String,
}

/// Contact-form message
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub content: String,
    pub contact: String,
    pub date: Option<NaiveDate>,
}

/// Magic-link login token; only the SHA-256 hash of the token is stored.
#[derive(Debug, Clone, FromRow)]
pub struct AuthToken {
    pub id: i64,
    pub email: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}
