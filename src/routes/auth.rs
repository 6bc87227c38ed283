/**
 * Authentication Routes
 * Passwordless admin login: emailed single-use token exchanged for a JWT session
 */
use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;

use crate::db::{self, models::AuthToken};
use crate::error::ApiError;
use crate::mail;

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

lazy_static::lazy_static! {
    /// JWT secret key from environment
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string());

    /// The single address allowed to sign in
    pub static ref ADMIN_EMAIL: String = std::env::var("ADMIN_EMAIL")
        .or_else(|_| std::env::var("EMAIL_USER"))
        .unwrap_or_else(|_| "admin@example.com".to_string());

    /// Base URL of the admin SPA, used to build the login link
    pub static ref FRONTEND_URL: String = std::env::var("FRONTEND_URL")
        .unwrap_or_else(|_| "http://localhost:5173".to_string());

    /// Login tokens kept in memory when no database is configured
    static ref LOGIN_TOKENS: Arc<RwLock<HashMap<String, PendingLoginToken>>> =
        Arc::new(RwLock::new(HashMap::new()));

    /// Rate limit storage (IP -> recent login request timestamps)
    static ref RATE_LIMIT: Arc<RwLock<HashMap<String, Vec<i64>>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

/// Login link lifetime
pub const LOGIN_TOKEN_TTL_MINUTES: i64 = 15;

/// Session JWT lifetime
pub const SESSION_TOKEN_EXPIRY_HOURS: i64 = 24;

pub const ADMIN_ROLE: &str = "admin";

const RATE_LIMIT_WINDOW_SECS: i64 = 15 * 60;
const RATE_LIMIT_MAX_REQUESTS: usize = 5;

// ============================================================================
// Types
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
struct PendingLoginToken {
    email: String,
    expires_at: i64,
    used: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserInfo {
    pub email: String,
    pub role: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SessionResponse {
    pub valid: bool,
    pub user: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResponse {
    fn error(msg: &str) -> Json<Self> {
        Json(Self {
            message: None,
            error: Some(msg.to_string()),
        })
    }
}

impl VerifyResponse {
    fn error(msg: &str) -> Json<Self> {
        Json(Self {
            message: None,
            token: None,
            user: None,
            error: Some(msg.to_string()),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 32 random bytes, hex encoded
pub fn generate_login_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Only the SHA-256 of a login token is persisted.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Login tokens are 32 random bytes as lowercase hex.
pub fn is_well_formed_token(token: &str) -> bool {
    token.len() == 64 && token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

pub fn is_admin_email(email: &str) -> bool {
    email.trim().eq_ignore_ascii_case(ADMIN_EMAIL.trim())
}

pub fn login_link(token: &str) -> String {
    format!(
        "{}/auth/verify?token={}",
        FRONTEND_URL.trim_end_matches('/'),
        token
    )
}

/// Create the signed session token
pub fn create_session_token(email: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::hours(SESSION_TOKEN_EXPIRY_HOURS);

    let claims = Claims {
        sub: email.to_string(),
        email: email.to_string(),
        role: ADMIN_ROLE.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
}

/// Verify and decode a session token
pub fn verify_access_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Guard for every mutating route: 401 without a token, 403 with a bad one.
pub fn verify_auth(headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("Access token required".to_string()))?;

    verify_access_token(&token).map_err(|e| {
        tracing::debug!("JWT verification failed: {}", e);
        ApiError::Forbidden("Invalid or expired token".to_string())
    })
}

/// Sliding-window limiter. Stale entries are evicted on every call so the map only
/// holds recently active IPs.
fn allow_login_attempt(limits: &mut HashMap<String, Vec<i64>>, ip: &str, now: i64) -> bool {
    limits.retain(|_, hits| {
        hits.retain(|t| now - *t < RATE_LIMIT_WINDOW_SECS);
        !hits.is_empty()
    });

    let hits = limits.entry(ip.to_string()).or_default();
    if hits.len() >= RATE_LIMIT_MAX_REQUESTS {
        return false;
    }
    hits.push(now);
    true
}

async fn check_rate_limit(ip: &str) -> bool {
    let mut limits = RATE_LIMIT.write().await;
    allow_login_attempt(&mut limits, ip, Utc::now().timestamp())
}

// ============================================================================
// Token store
// ============================================================================

/// Persists a token hash. Expired and used tokens are purged on the way.
pub async fn store_login_token(
    email: &str,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let now = Utc::now();

    if let Some(pool) = db::get_pool() {
        let purged = sqlx::query("DELETE FROM auth_tokens WHERE expires_at <= ? OR used = TRUE")
            .bind(now)
            .execute(pool.as_ref())
            .await?
            .rows_affected();
        if purged > 0 {
            tracing::debug!(purged, "purged stale login tokens");
        }

        sqlx::query("INSERT INTO auth_tokens (email, token_hash, expires_at) VALUES (?, ?, ?)")
            .bind(email)
            .bind(token_hash)
            .bind(expires_at)
            .execute(pool.as_ref())
            .await?;
    } else {
        let mut tokens = LOGIN_TOKENS.write().await;
        tokens.retain(|_, t| !t.used && t.expires_at > now.timestamp());
        tokens.insert(
            token_hash.to_string(),
            PendingLoginToken {
                email: email.to_string(),
                expires_at: expires_at.timestamp(),
                used: false,
            },
        );
    }

    Ok(())
}

/// Generates and stores a fresh login token for `email`, returning the raw token.
pub async fn issue_login_token(email: &str) -> Result<String, sqlx::Error> {
    let token = generate_login_token();
    let expires_at = Utc::now() + Duration::minutes(LOGIN_TOKEN_TTL_MINUTES);
    store_login_token(email, &hash_token(&token), expires_at).await?;
    Ok(token)
}

/// Consumes a login token. Returns the owning email only for an unexpired, unused
/// token; the used flag is flipped with a conditional update so two concurrent
/// redemptions cannot both succeed.
pub async fn redeem_login_token(token: &str) -> Result<Option<String>, sqlx::Error> {
    let token_hash = hash_token(token);
    let now = Utc::now();

    if let Some(pool) = db::get_pool() {
        let row = sqlx::query_as::<_, AuthToken>(
            r#"SELECT id, email, token_hash, expires_at, used
               FROM auth_tokens
               WHERE token_hash = ? AND expires_at > ? AND used = FALSE"#,
        )
        .bind(&token_hash)
        .bind(now)
        .fetch_optional(pool.as_ref())
        .await?;

        let record = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let claimed = sqlx::query("UPDATE auth_tokens SET used = TRUE WHERE id = ? AND used = FALSE")
            .bind(record.id)
            .execute(pool.as_ref())
            .await?
            .rows_affected();

        return Ok((claimed == 1).then_some(record.email));
    }

    let mut tokens = LOGIN_TOKENS.write().await;
    match tokens.get_mut(&token_hash) {
        Some(pending) if !pending.used && pending.expires_at > now.timestamp() => {
            pending.used = true;
            Ok(Some(pending.email.clone()))
        }
        _ => Ok(None),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/login
/// Email a single-use login link to the admin address
pub async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let ip = addr.ip().to_string();

    if !check_rate_limit(&ip).await {
        tracing::warn!(ip = %ip, "login rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            LoginResponse::error("Too many requests. Please try again later."),
        );
    }

    let email = payload.email.trim();
    if email.is_empty() {
        return (StatusCode::BAD_REQUEST, LoginResponse::error("Email is required"));
    }

    if !is_admin_email(email) {
        tracing::warn!(ip = %ip, email = %email, "login attempt for unauthorized email");
        return (StatusCode::FORBIDDEN, LoginResponse::error("Unauthorized email"));
    }

    let token = match issue_login_token(email).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to store login token: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                LoginResponse::error("Failed to send login email"),
            );
        }
    };

    if let Err(e) = mail::send_login_link(email, &login_link(&token)).await {
        tracing::error!("Failed to send login email: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            LoginResponse::error("Failed to send login email"),
        );
    }

    tracing::info!(email = %email, "login link issued");

    (
        StatusCode::OK,
        Json(LoginResponse {
            message: Some("Login link sent to your email".to_string()),
            error: None,
        }),
    )
}

/// POST /api/auth/verify
/// Exchange a login token for a session JWT
pub async fn verify(Json(payload): Json<VerifyRequest>) -> impl IntoResponse {
    let token = payload.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, VerifyResponse::error("Token is required"));
    }

    if !is_well_formed_token(token) {
        return (
            StatusCode::BAD_REQUEST,
            VerifyResponse::error("Invalid or expired token"),
        );
    }

    let email = match redeem_login_token(token).await {
        Ok(Some(email)) => email,
        Ok(None) => {
            tracing::warn!(token = %crate::logging::redact(token), "login token not found, expired or used");
            return (
                StatusCode::BAD_REQUEST,
                VerifyResponse::error("Invalid or expired token"),
            );
        }
        Err(e) => {
            tracing::error!("Database error during token verification: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                VerifyResponse::error("Failed to verify token"),
            );
        }
    };

    let session = match create_session_token(&email) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to create session token: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                VerifyResponse::error("Failed to verify token"),
            );
        }
    };

    tracing::info!(email = %email, "admin login successful");

    (
        StatusCode::OK,
        Json(VerifyResponse {
            message: Some("Login successful".to_string()),
            token: Some(session),
            user: Some(UserInfo {
                email,
                role: ADMIN_ROLE.to_string(),
            }),
            error: None,
        }),
    )
}

/// GET /api/auth/session
/// Report whether the bearer session token is still valid
pub async fn session(headers: HeaderMap) -> impl IntoResponse {
    let token = match extract_bearer_token(&headers) {
        Some(t) => t,
        None => {
            return (
                StatusCode::OK,
                Json(SessionResponse {
                    valid: false,
                    user: None,
                    error: Some("No authorization token provided".to_string()),
                }),
            );
        }
    };

    match verify_access_token(&token) {
        Ok(claims) => (
            StatusCode::OK,
            Json(SessionResponse {
                valid: true,
                user: Some(UserInfo {
                    email: claims.email,
                    role: claims.role,
                }),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::debug!("Session check failed: {}", e);
            (
                StatusCode::OK,
                Json(SessionResponse {
                    valid: false,
                    user: None,
                    error: Some("Invalid or expired token".to_string()),
                }),
            )
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    /// Authorization header value carrying a fresh admin session
    pub(crate) fn bearer() -> String {
        format!("Bearer {}", create_session_token(&ADMIN_EMAIL).unwrap())
    }

    fn auth_router(ip: [u8; 4]) -> Router {
        use axum::extract::connect_info::MockConnectInfo;
        Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/verify", post(verify))
            .route("/api/auth/session", get(session))
            .layer(MockConnectInfo(SocketAddr::from((ip, 12345))))
    }

    async fn post_json(
        app: Router,
        uri: &str,
        json: &impl serde::Serialize,
    ) -> (StatusCode, axum::body::Bytes) {
        let body = Body::from(serde_json::to_vec(json).unwrap());
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    #[test]
    fn test_generated_token_is_64_hex_chars() {
        let token = generate_login_token();
        assert_eq!(token.len(), 64);
        assert!(is_well_formed_token(&token));
        assert_ne!(token, generate_login_token());
    }

    #[test]
    fn test_hash_token_is_stable_sha256() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        assert!(!is_well_formed_token(""));
        assert!(!is_well_formed_token("abc"));
        assert!(!is_well_formed_token(&"G".repeat(64)));
        assert!(!is_well_formed_token(&"A".repeat(64)));
        assert!(!is_well_formed_token(&"a".repeat(63)));
        assert!(!is_well_formed_token(&"a".repeat(65)));
        // 64 bytes, but not hex
        assert!(!is_well_formed_token(&"é".repeat(32)));
        assert!(is_well_formed_token(&"0f".repeat(32)));
    }

    #[test]
    fn test_only_admin_email_is_accepted() {
        assert!(is_admin_email(&ADMIN_EMAIL));
        assert!(is_admin_email(&format!("  {}  ", ADMIN_EMAIL.to_uppercase())));
        assert!(!is_admin_email("intruder@example.org"));
    }

    #[test]
    fn test_login_link_points_at_frontend_verify_page() {
        let link = login_link("deadbeef");
        assert!(link.starts_with(FRONTEND_URL.trim_end_matches('/')));
        assert!(link.ends_with("/auth/verify?token=deadbeef"));
    }

    #[test]
    fn test_session_token_carries_admin_role_and_24h_expiry() {
        let token = create_session_token("owner@example.com").unwrap();
        let claims = verify_access_token(&token).unwrap();
        assert_eq!(claims.email, "owner@example.com");
        assert_eq!(claims.role, ADMIN_ROLE);
        assert_eq!(claims.exp - claims.iat, SESSION_TOKEN_EXPIRY_HOURS * 3600);
    }

    #[test]
    fn test_verify_access_token_invalid_returns_err() {
        assert!(verify_access_token("invalid.jwt.token").is_err());
    }

    #[test]
    fn test_verify_auth_missing_and_invalid() {
        let headers = HeaderMap::new();
        assert!(matches!(
            verify_auth(&headers),
            Err(ApiError::Unauthorized(_))
        ));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer nope".parse().unwrap());
        assert!(matches!(verify_auth(&headers), Err(ApiError::Forbidden(_))));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", bearer().parse().unwrap());
        assert_eq!(verify_auth(&headers).unwrap().role, ADMIN_ROLE);
    }

    #[test]
    fn test_rate_limiter_window() {
        let mut limits = HashMap::new();
        for _ in 0..RATE_LIMIT_MAX_REQUESTS {
            assert!(allow_login_attempt(&mut limits, "10.0.0.1", 1_000));
        }
        assert!(!allow_login_attempt(&mut limits, "10.0.0.1", 1_001));
        assert!(allow_login_attempt(&mut limits, "10.0.0.2", 1_001));
        assert!(allow_login_attempt(
            &mut limits,
            "10.0.0.1",
            1_000 + RATE_LIMIT_WINDOW_SECS
        ));
    }

    #[tokio::test]
    async fn test_login_token_redeems_exactly_once() {
        let token = issue_login_token(&ADMIN_EMAIL).await.unwrap();
        let first = redeem_login_token(&token).await.unwrap();
        assert_eq!(first.as_deref(), Some(ADMIN_EMAIL.as_str()));
        assert!(redeem_login_token(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_login_token_is_rejected() {
        let token = generate_login_token();
        store_login_token(
            &ADMIN_EMAIL,
            &hash_token(&token),
            Utc::now() - Duration::seconds(1),
        )
        .await
        .unwrap();
        assert!(redeem_login_token(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_login_token_is_rejected() {
        let token = generate_login_token();
        assert!(redeem_login_token(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_empty_email_returns_bad_request() {
        let (status, bytes) = post_json(
            auth_router([127, 0, 0, 2]),
            "/api/auth/login",
            &LoginRequest {
                email: "".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: LoginResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.as_deref(), Some("Email is required"));
    }

    #[tokio::test]
    async fn test_login_other_email_is_forbidden() {
        let (status, _) = post_json(
            auth_router([127, 0, 0, 3]),
            "/api/auth/login",
            &LoginRequest {
                email: "intruder@example.org".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_login_admin_email_sends_link() {
        if std::env::var("EMAIL_PASS").is_ok() {
            return;
        }
        let (status, bytes) = post_json(
            auth_router([127, 0, 0, 4]),
            "/api/auth/login",
            &LoginRequest {
                email: ADMIN_EMAIL.clone(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: LoginResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message.as_deref(), Some("Login link sent to your email"));
    }

    #[tokio::test]
    async fn test_login_rate_limited_per_ip() {
        let ip = [127, 0, 0, 5];
        for _ in 0..RATE_LIMIT_MAX_REQUESTS {
            let (status, _) = post_json(
                auth_router(ip),
                "/api/auth/login",
                &LoginRequest {
                    email: "".to_string(),
                },
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (status, _) = post_json(
            auth_router(ip),
            "/api/auth/login",
            &LoginRequest {
                email: "".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_verify_missing_token_returns_bad_request() {
        let (status, bytes) = post_json(
            auth_router([127, 0, 0, 6]),
            "/api/auth/verify",
            &serde_json::json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: VerifyResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.as_deref(), Some("Token is required"));
    }

    #[tokio::test]
    async fn test_verify_issues_session_once() {
        let token = issue_login_token(&ADMIN_EMAIL).await.unwrap();

        let (status, bytes) = post_json(
            auth_router([127, 0, 0, 7]),
            "/api/auth/verify",
            &VerifyRequest {
                token: token.clone(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: VerifyResponse = serde_json::from_slice(&bytes).unwrap();
        let claims = verify_access_token(&body.token.unwrap()).unwrap();
        assert_eq!(claims.role, ADMIN_ROLE);
        assert_eq!(
            body.user,
            Some(UserInfo {
                email: ADMIN_EMAIL.clone(),
                role: ADMIN_ROLE.to_string(),
            })
        );

        let (status, bytes) = post_json(
            auth_router([127, 0, 0, 7]),
            "/api/auth/verify",
            &VerifyRequest { token },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: VerifyResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.as_deref(), Some("Invalid or expired token"));
    }

    #[tokio::test]
    async fn test_session_reports_validity() {
        let req = Request::get("/api/auth/session")
            .header("authorization", bearer())
            .body(Body::empty())
            .unwrap();
        let res = auth_router([127, 0, 0, 8]).oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: SessionResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.valid);

        let req = Request::get("/api/auth/session").body(Body::empty()).unwrap();
        let res = auth_router([127, 0, 0, 8]).oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: SessionResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.valid);
    }
}
