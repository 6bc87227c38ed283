/**
 * Routes Module
 * API route handlers and the request plumbing they share
 */

pub mod auth;
pub mod health;
pub mod images;
pub mod posts;
pub mod projects;
pub mod services;

use axum::extract::Multipart;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

pub use crate::error::{ApiError, ErrorResponse};

/// Plain acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Date used for status derivation
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Accepts `YYYY-MM-DD`, a full RFC 3339 timestamp (date part kept), `""` or null.
pub fn optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", s))),
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().or_else(|| {
        chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.date_naive())
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Lenient boolean: form widgets send `true`, `1`, `"1"`, `"published"`, `""`...
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<FlagRepr> = Option::deserialize(deserializer)?;
    Ok(match raw {
        None => false,
        Some(FlagRepr::Bool(b)) => b,
        Some(FlagRepr::Int(i)) => i != 0,
        Some(FlagRepr::Text(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "active" | "published" | "completed"
        ),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberRepr {
    Number(f64),
    Text(String),
}

/// Optional number that may arrive as a JSON string
pub fn optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<NumberRepr> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(NumberRepr::Number(n)) => Ok(Some(n)),
        Some(NumberRepr::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberRepr::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid number '{}'", s))),
    }
}

/// Rejects blank required text fields.
pub fn require_text(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{} is required", field)));
    }
    Ok(())
}

/// Blank optional strings are stored as NULL.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// File part of a multipart upload
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Multipart body split into text fields and file parts
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl UploadForm {
    pub fn id_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(|v| v.trim().parse().ok())
    }
}

/// Reads every part; parts named in `file_fields` are collected as files.
pub async fn read_upload_form(
    multipart: &mut Multipart,
    file_fields: &[&str],
) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Multipart error: {}", e);
                return Err(ApiError::bad_request("Invalid multipart data"));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if file_fields.contains(&name.as_str()) {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field.bytes().await.map_err(|e| {
                tracing::warn!("Failed to read upload bytes: {}", e);
                ApiError::bad_request("Failed to read file data")
            })?;
            form.files.push(UploadedFile {
                filename,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field.text().await.map_err(|e| {
                tracing::warn!("Failed to read multipart field: {}", e);
                ApiError::bad_request("Invalid multipart data")
            })?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}
