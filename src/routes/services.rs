/**
 * Service Routes
 * Offered services, their expiry and images
 */
use axum::{
    extract::{Multipart, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::collections::HashMap;

use crate::db::{self, models::Service};
use crate::error::ApiError;
use crate::media;
use crate::routes::auth::verify_auth;
use crate::routes::images::{collect_public_ids, StoredImage, UploadImagesResponse, SERVICE_IMAGES};
use crate::routes::{
    flag, non_blank, optional_date, optional_number, read_upload_form, require_text, today,
    MessageResponse,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServiceFields {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub status: bool,
    #[serde(default, deserialize_with = "optional_date")]
    pub created_at: Option<NaiveDate>,
    #[serde(default, deserialize_with = "optional_date")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "optional_number")]
    pub pricing: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ModifyServiceRequest {
    pub service_id: Option<i64>,
    #[serde(flatten)]
    pub fields: ServiceFields,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServiceIdRequest {
    pub service_id: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServiceImageRequest {
    pub service_id: Option<i64>,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatedServiceResponse {
    pub message: String,
    pub service_id: i64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatedServiceImageResponse {
    pub message: String,
    pub image: StoredImage,
}

/// Public listing entry: the service plus its image URLs
#[derive(Debug, Deserialize, Serialize)]
pub struct ActiveService {
    #[serde(flatten)]
    pub service: Service,
    pub images: Vec<String>,
}

// ============================================================================
// Derived state
// ============================================================================

/// A service stays active until its end date has passed.
pub fn effective_status(stored: bool, end_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    let expired = matches!(end_date, Some(end) if end < today);
    stored && !expired
}

/// Deactivates expired services, writing back only the rows that changed.
async fn expire_services(
    pool: &MySqlPool,
    services: &mut [Service],
    today: NaiveDate,
) -> Result<usize, sqlx::Error> {
    let mut expired = 0;
    for service in services.iter_mut() {
        let derived = effective_status(service.status, service.end_date, today);
        if derived == service.status {
            continue;
        }
        sqlx::query("UPDATE service SET status = ? WHERE service_id = ?")
            .bind(derived)
            .bind(service.service_id)
            .execute(pool)
            .await?;
        service.status = derived;
        expired += 1;
    }

    if expired > 0 {
        tracing::info!(expired, "expired services deactivated");
    }
    Ok(expired)
}

/// Groups `(service_id, url)` rows by service, keeping row order.
pub fn group_images(rows: Vec<(i64, String)>) -> HashMap<i64, Vec<String>> {
    let mut grouped: HashMap<i64, Vec<String>> = HashMap::new();
    for (service_id, url) in rows {
        grouped.entry(service_id).or_default().push(url);
    }
    grouped
}

// ============================================================================
// Helpers
// ============================================================================

const SERVICE_COLUMNS: &str =
    "service_id, title, description, status, created_at, end_date, pricing";

fn require_service_id(value: Option<i64>) -> Result<i64, ApiError> {
    value.ok_or_else(|| ApiError::bad_request("Service ID is required"))
}

fn validate_fields(fields: &ServiceFields) -> Result<(), ApiError> {
    require_text(&fields.title, "Title")?;
    if matches!(fields.pricing, Some(p) if p < 0.0) {
        return Err(ApiError::bad_request("Pricing must not be negative"));
    }
    Ok(())
}

async fn fetch_services(pool: &MySqlPool) -> Result<Vec<Service>, sqlx::Error> {
    let sql = format!("SELECT {} FROM service ORDER BY service_id", SERVICE_COLUMNS);
    let mut services = sqlx::query_as::<_, Service>(&sql).fetch_all(pool).await?;
    expire_services(pool, &mut services, today()).await?;
    Ok(services)
}

async fn write_service(pool: &MySqlPool, service_id: i64, fields: ServiceFields) -> Result<(), ApiError> {
    validate_fields(&fields)?;
    if !SERVICE_IMAGES.owner_exists(pool, service_id).await? {
        return Err(ApiError::not_found("Service not found"));
    }

    sqlx::query(
        r#"
        UPDATE service
        SET title = ?, description = ?, status = ?, created_at = ?, end_date = ?, pricing = ?
        WHERE service_id = ?
        "#,
    )
    .bind(fields.title.trim())
    .bind(non_blank(fields.description))
    .bind(effective_status(fields.status, fields.end_date, today()))
    .bind(fields.created_at)
    .bind(fields.end_date)
    .bind(fields.pricing)
    .bind(service_id)
    .execute(pool)
    .await?;

    tracing::info!(service_id, "service updated");
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/services
pub async fn create_service(
    headers: HeaderMap,
    Json(payload): Json<ServiceFields>,
) -> Result<impl IntoResponse, ApiError> {
    verify_auth(&headers)?;
    validate_fields(&payload)?;
    let pool = db::require_pool()?;

    let created_at = payload.created_at.unwrap_or_else(today);
    let service_id = sqlx::query(
        r#"
        INSERT INTO service (title, description, status, created_at, end_date, pricing)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(non_blank(payload.description))
    .bind(effective_status(payload.status, payload.end_date, today()))
    .bind(created_at)
    .bind(payload.end_date)
    .bind(payload.pricing)
    .execute(pool.as_ref())
    .await?
    .last_insert_id() as i64;

    tracing::info!(service_id, "service created");
    Ok((
        StatusCode::CREATED,
        Json(CreatedServiceResponse {
            message: "Service added".to_string(),
            service_id,
        }),
    ))
}

/// GET /api/services
pub async fn list_services() -> Result<Json<Vec<Service>>, ApiError> {
    let pool = db::require_pool()?;
    Ok(Json(fetch_services(pool.as_ref()).await?))
}

/// GET /api/services/active
pub async fn active_services() -> Result<Json<Vec<ActiveService>>, ApiError> {
    let pool = db::require_pool()?;
    let services = fetch_services(pool.as_ref()).await?;

    let rows: Vec<(i64, String)> =
        sqlx::query_as("SELECT service_id, image FROM service_image ORDER BY image_id")
            .fetch_all(pool.as_ref())
            .await?;
    let mut images = group_images(rows);

    let active = services
        .into_iter()
        .filter(|s| s.status)
        .map(|service| ActiveService {
            images: images.remove(&service.service_id).unwrap_or_default(),
            service,
        })
        .collect();

    Ok(Json(active))
}

/// GET /api/services/{id}
pub async fn get_service(Path(service_id): Path<i64>) -> Result<Json<Service>, ApiError> {
    let pool = db::require_pool()?;

    let sql = format!("SELECT {} FROM service WHERE service_id = ?", SERVICE_COLUMNS);
    let service = sqlx::query_as::<_, Service>(&sql)
        .bind(service_id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    let mut services = [service];
    expire_services(pool.as_ref(), &mut services, today()).await?;
    let [service] = services;
    Ok(Json(service))
}

/// POST /api/services/modify
pub async fn modify_service(
    headers: HeaderMap,
    Json(payload): Json<ModifyServiceRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    verify_auth(&headers)?;
    let service_id = require_service_id(payload.service_id)?;
    let pool = db::require_pool()?;

    write_service(pool.as_ref(), service_id, payload.fields).await?;
    Ok(Json(MessageResponse::new("Service modified")))
}

/// PUT /api/services/{id}
pub async fn replace_service(
    headers: HeaderMap,
    Path(service_id): Path<i64>,
    Json(payload): Json<ServiceFields>,
) -> Result<Json<MessageResponse>, ApiError> {
    verify_auth(&headers)?;
    let pool = db::require_pool()?;

    write_service(pool.as_ref(), service_id, payload).await?;
    Ok(Json(MessageResponse::new("Service modified")))
}

/// POST /api/services/delete
/// Image rows and the service go in one transaction; assets are destroyed after commit.
pub async fn delete_service(
    headers: HeaderMap,
    Json(payload): Json<ServiceIdRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    verify_auth(&headers)?;
    let service_id = require_service_id(payload.service_id)?;
    let pool = db::require_pool()?;

    let mut tx = pool.begin().await?;

    let exists: Option<(i64,)> =
        sqlx::query_as("SELECT service_id FROM service WHERE service_id = ? FOR UPDATE")
            .bind(service_id)
            .fetch_optional(&mut *tx)
            .await?;
    if exists.is_none() {
        tx.rollback().await?;
        return Err(ApiError::not_found("Service not found"));
    }

    let images = sqlx::query_as::<_, StoredImage>(
        "SELECT image_id, image, public_id FROM service_image WHERE service_id = ?",
    )
    .bind(service_id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM service_image WHERE service_id = ?")
        .bind(service_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM service WHERE service_id = ?")
        .bind(service_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    media::destroy_all(&collect_public_ids(&images)).await;
    tracing::info!(service_id, images = images.len(), "service deleted");

    Ok(Json(MessageResponse::new("Service deleted")))
}

/// GET /api/services/{id}/images
pub async fn service_images(Path(service_id): Path<i64>) -> Result<Json<Vec<StoredImage>>, ApiError> {
    let pool = db::require_pool()?;
    Ok(Json(SERVICE_IMAGES.list(pool.as_ref(), service_id).await?))
}

/// POST /api/services/image
pub async fn add_service_image(
    headers: HeaderMap,
    Json(payload): Json<ServiceImageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    verify_auth(&headers)?;
    let service_id = match payload.service_id {
        Some(id) if !payload.image.trim().is_empty() => id,
        _ => return Err(ApiError::bad_request("Service ID and image are required")),
    };
    let pool = db::require_pool()?;

    let image = SERVICE_IMAGES
        .attach_url(pool.as_ref(), service_id, &payload.image)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedServiceImageResponse {
            message: "Image linked to service".to_string(),
            image,
        }),
    ))
}

/// POST /api/services/upload_image
/// Multipart: `service_id` plus `service_images` / `image` file parts
pub async fn upload_service_images(
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    verify_auth(&headers)?;
    let pool = db::require_pool()?;

    let form = read_upload_form(&mut multipart, &["service_images", "image"]).await?;
    let service_id = match form.id_field("service_id") {
        Some(id) if !form.files.is_empty() => id,
        _ => {
            return Err(ApiError::bad_request(
                "Service ID and image file are required",
            ))
        }
    };

    let images = SERVICE_IMAGES
        .upload(pool.as_ref(), media::settings(), service_id, form.files)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadImagesResponse {
            message: "Images uploaded and linked to service".to_string(),
            images,
        }),
    ))
}

/// POST /api/services/remove_image
pub async fn remove_service_image(
    headers: HeaderMap,
    Json(payload): Json<ServiceImageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    verify_auth(&headers)?;
    let service_id = match payload.service_id {
        Some(id) if !payload.image.trim().is_empty() => id,
        _ => return Err(ApiError::bad_request("Service ID and image are required")),
    };
    let pool = db::require_pool()?;

    SERVICE_IMAGES
        .remove(pool.as_ref(), media::settings(), service_id, payload.image.trim())
        .await?;
    Ok(Json(MessageResponse::new("Image removed from service")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::auth::tests::bearer;
    use crate::routes::ErrorResponse;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn service_router() -> Router {
        Router::new()
            .route("/api/services", get(list_services).post(create_service))
            .route("/api/services/active", get(active_services))
            .route("/api/services/modify", post(modify_service))
            .route("/api/services/image", post(add_service_image))
            .route("/api/services/remove_image", post(remove_service_image))
    }

    async fn call(req: Request<Body>) -> (StatusCode, ErrorResponse) {
        let res = service_router().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, auth: bool, json: serde_json::Value) -> Request<Body> {
        let mut builder = Request::post(uri).header("content-type", "application/json");
        if auth {
            builder = builder.header("authorization", bearer());
        }
        builder
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap()
    }

    #[test]
    fn test_expired_services_become_inactive() {
        let today = date(2024, 6, 15);
        assert!(effective_status(true, None, today));
        assert!(effective_status(true, Some(today), today));
        assert!(!effective_status(true, Some(date(2024, 6, 1)), today));
        assert!(!effective_status(false, Some(date(2025, 1, 1)), today));
    }

    #[test]
    fn test_group_images_keeps_order() {
        let grouped = group_images(vec![
            (1, "a".to_string()),
            (2, "b".to_string()),
            (1, "c".to_string()),
        ]);
        assert_eq!(grouped[&1], vec!["a", "c"]);
        assert_eq!(grouped[&2], vec!["b"]);
    }

    #[test]
    fn test_fields_accept_form_values() {
        let fields: ServiceFields = serde_json::from_str(
            r#"{"title":"Hosting","status":"1","pricing":"49.9","created_at":"2024-02-01","end_date":""}"#,
        )
        .unwrap();
        assert!(fields.status);
        assert_eq!(fields.pricing, Some(49.9));
        assert_eq!(fields.created_at, Some(date(2024, 2, 1)));
        assert_eq!(fields.end_date, None);
    }

    #[test]
    fn test_negative_pricing_rejected() {
        let fields = ServiceFields {
            title: "Audit".to_string(),
            pricing: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(validate_fields(&fields), Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_create_requires_auth() {
        let (status, _) = call(post_json(
            "/api/services",
            false,
            serde_json::json!({"title": "Hosting"}),
        ))
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_modify_requires_service_id() {
        let (status, body) = call(post_json(
            "/api/services/modify",
            true,
            serde_json::json!({"title": "Hosting"}),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Service ID is required");
    }

    #[tokio::test]
    async fn test_image_requires_service_and_url() {
        let (status, body) = call(post_json(
            "/api/services/image",
            true,
            serde_json::json!({"service_id": 2, "image": " "}),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Service ID and image are required");

        let (status, _) = call(post_json(
            "/api/services/remove_image",
            true,
            serde_json::json!({"image": "https://cdn/x.png"}),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_public_listings_need_database() {
        for uri in ["/api/services", "/api/services/active"] {
            let req = Request::get(uri).body(Body::empty()).unwrap();
            let (status, body) = call(req).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body.error, "Database not available");
        }
    }

    #[tokio::test]
    async fn test_expire_services_deactivates_past_end_date() {
        let Some(pool) = crate::db::tests::test_pool().await else { return };
        let today = date(2024, 6, 1);
        let mut ids = Vec::new();
        for end_date in [Some(date(2024, 5, 1)), Some(date(2024, 6, 1)), None] {
            let id = sqlx::query("INSERT INTO service (title, status, end_date) VALUES ('expiry test', TRUE, ?)")
                .bind(end_date)
                .execute(&pool)
                .await
                .unwrap()
                .last_insert_id() as i64;
            ids.push(id);
        }

        let sql = format!(
            "SELECT {} FROM service WHERE service_id IN (?, ?, ?) ORDER BY service_id",
            SERVICE_COLUMNS
        );
        let mut services = sqlx::query_as::<_, Service>(&sql)
            .bind(ids[0])
            .bind(ids[1])
            .bind(ids[2])
            .fetch_all(&pool)
            .await
            .unwrap();

        assert_eq!(expire_services(&pool, &mut services, today).await.unwrap(), 1);
        assert_eq!(
            services.iter().map(|s| s.status).collect::<Vec<_>>(),
            vec![false, true, true]
        );

        let (stored,): (bool,) = sqlx::query_as("SELECT status FROM service WHERE service_id = ?")
            .bind(ids[0])
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(!stored);
    }
}
