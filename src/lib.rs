//! Portfolio CMS - REST backend for the portfolio admin panel and public site

pub mod db;
pub mod error;
pub mod logging;
pub mod mail;
pub mod media;
pub mod routes;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use thiserror::Error;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use routes::{auth, health, posts, projects, services};

/// Default request body cap; uploads carry several images per request.
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.trim_end_matches('/').parse().ok())
        .collect()
}

/// Configure CORS from ALLOWED_ORIGINS (comma-separated) or FRONTEND_URL,
/// falling back to the local dev servers.
pub fn configure_cors() -> CorsLayer {
    let mut origins = std::env::var("ALLOWED_ORIGINS")
        .map(|s| parse_origins(&s))
        .unwrap_or_default();

    if origins.is_empty() {
        origins = std::env::var("FRONTEND_URL")
            .map(|s| parse_origins(&s))
            .unwrap_or_default();
    }
    if origins.is_empty() {
        origins = vec![
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://localhost:3000"),
        ];
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

pub fn max_body_bytes() -> usize {
    std::env::var("MAX_BODY_BYTES")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_MAX_BODY_BYTES)
}

fn auth_routes() -> Router {
    Router::new()
        .route("/login", post(auth::login))
        .route("/verify", post(auth::verify))
        .route("/session", get(auth::session))
}

fn project_routes() -> Router {
    Router::new()
        .route(
            "/",
            get(projects::list_projects).post(projects::create_project),
        )
        .route("/modify", post(projects::modify_project))
        .route("/delete", post(projects::delete_project))
        .route("/tools", get(projects::list_tools))
        .route("/allTools", get(projects::list_tools))
        .route("/tools/add", post(projects::add_tool))
        .route("/tools/delete", post(projects::delete_tool))
        .route(
            "/clients",
            get(projects::list_clients).post(projects::add_client),
        )
        .route("/allClients", get(projects::list_clients))
        .route("/clients/delete", post(projects::delete_client))
        .route("/add_project_tool", post(projects::add_project_tool))
        .route("/remove_project_tool", post(projects::remove_project_tool))
        .route("/add_project_client", post(projects::add_project_client))
        .route("/remove_project_client", post(projects::remove_project_client))
        .route("/image", post(projects::add_project_image))
        .route("/upload_image", post(projects::upload_project_images))
        .route("/remove_image", post(projects::remove_project_image))
        .route("/demo", post(projects::add_project_demo))
        .route("/remove_demo", post(projects::remove_project_demo))
        .route(
            "/{id}",
            get(projects::get_project).put(projects::replace_project),
        )
        .route("/{id}/tools", get(projects::project_tools))
        .route("/{id}/tools/sync", post(projects::sync_project_tools))
        .route("/{id}/clients", get(projects::project_clients))
        .route("/{id}/clients/sync", post(projects::sync_project_clients))
        .route("/{id}/images", get(projects::project_images))
        .route("/{id}/demos", get(projects::project_demos))
}

fn service_routes() -> Router {
    Router::new()
        .route(
            "/",
            get(services::list_services).post(services::create_service),
        )
        .route("/active", get(services::active_services))
        .route("/modify", post(services::modify_service))
        .route("/delete", post(services::delete_service))
        .route("/image", post(services::add_service_image))
        .route("/upload_image", post(services::upload_service_images))
        .route("/remove_image", post(services::remove_service_image))
        .route(
            "/{id}",
            get(services::get_service).put(services::replace_service),
        )
        .route("/{id}/images", get(services::service_images))
}

fn post_routes() -> Router {
    Router::new()
        .route("/", get(posts::list_posts).post(posts::create_post))
        .route("/modify", post(posts::modify_post))
        .route("/delete", post(posts::delete_post))
        .route("/add_image", post(posts::add_post_image))
        .route("/remove_image", post(posts::remove_post_image))
        .route("/add_text", post(posts::add_post_text))
        .route("/remove_text", post(posts::remove_post_text))
        .route("/add_keyword", post(posts::add_post_keyword))
        .route("/remove_keyword", post(posts::remove_post_keyword))
        .route("/message", post(posts::create_message))
        .route("/message/delete", post(posts::delete_message))
        .route("/messages", get(posts::list_messages))
        .route("/{id}", get(posts::get_post).put(posts::replace_post))
        .route("/{id}/images", get(posts::post_images))
        .route("/{id}/texts", get(posts::post_texts))
        .route("/{id}/keywords", get(posts::list_post_keywords))
}

/// Create and configure the application router.
pub fn create_app() -> Router {
    let cors = configure_cors();
    let body_limit = max_body_bytes();
    tracing::info!(body_limit, "CORS and body limit configured");

    Router::new()
        .nest("/api/auth", auth_routes())
        .nest("/api/projects", project_routes())
        .nest("/api/services", service_routes())
        .nest("/api/posts", post_routes())
        .route("/health", get(health::health_ping))
        .route("/health/database", get(health::health_database))
        .route("/health/ready", get(health::health_ready))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        // The extractor-level 2 MB default is replaced by one global cap
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
}

/// Refuse the built-in JWT secret in production.
fn check_production_config() -> Result<(), StartupError> {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_default();
    if environment != "production" {
        return Ok(());
    }

    let secret = std::env::var("JWT_SECRET").unwrap_or_default();
    if secret.is_empty() || secret == auth::DEFAULT_JWT_SECRET {
        return Err(StartupError::Config(
            "JWT_SECRET must be set to a secure, unique value in production".to_string(),
        ));
    }

    if std::env::var("ADMIN_EMAIL").is_err() && std::env::var("EMAIL_USER").is_err() {
        tracing::warn!("SECURITY: neither ADMIN_EMAIL nor EMAIL_USER is set; admin login uses a placeholder address");
    }
    if !media::is_configured() {
        tracing::warn!("Cloudinary is not configured; image uploads will be rejected");
    }

    Ok(())
}

/// Run the server (used by main).
pub async fn run() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();

    // Dropping the guards stops the background writers and loses buffered lines.
    let _log_guards = logging::init();

    health::init_start_time();
    check_production_config()?;

    if db::is_configured() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Continuing without database.",
                    e
                );
            }
        }
    } else {
        tracing::info!("No database configured. Content routes will answer 503.");
    }

    let app = create_app();

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| StartupError::Config(format!("invalid HOST/PORT: {}", e)))?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_parse_origins() {
        let origins = parse_origins("https://admin.example.com/, ,http://localhost:5173");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "https://admin.example.com");
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn test_max_body_bytes_default() {
        if std::env::var("MAX_BODY_BYTES").is_err() {
            assert_eq!(max_body_bytes(), DEFAULT_MAX_BODY_BYTES);
        }
    }

    #[tokio::test]
    async fn test_app_serves_health() {
        let res = create_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_nested_routes_are_mounted() {
        let res = create_app()
            .oneshot(Request::get("/api/projects/allTools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        let res = create_app()
            .oneshot(
                Request::post("/api/services/delete")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"service_id":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = create_app()
            .oneshot(Request::get("/api/unknown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_dev_origin() {
        if std::env::var("ALLOWED_ORIGINS").is_ok() || std::env::var("FRONTEND_URL").is_ok() {
            return;
        }
        let res = create_app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/projects")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            res.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:5173")
        );
    }
}
