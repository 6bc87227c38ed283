pub mod models;

use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
    MySqlPool,
};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::ApiError;

static DB_POOL: OnceCell<Arc<MySqlPool>> = OnceCell::const_new();

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub connect: MySqlConnectOptions,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback)
}

/// Connection options from discrete settings. Credentials are passed as-is, so
/// passwords containing `@`, `/` or `#` need no escaping.
pub fn options_from_parts(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    database: &str,
) -> MySqlConnectOptions {
    let options = MySqlConnectOptions::new()
        .host(host)
        .port(port)
        .username(user)
        .database(database);
    if password.is_empty() {
        options
    } else {
        options.password(password)
    }
}

/// True when either `DATABASE_URL` or `DB_HOST` is present.
pub fn is_configured() -> bool {
    std::env::var("DATABASE_URL").is_ok() || std::env::var("DB_HOST").is_ok()
}

impl DbConfig {
    /// `DATABASE_URL` when set, otherwise `DB_HOST`/`DB_PORT`/`DB_USER`/`DB_PASSWORD`/`DB_NAME`.
    pub fn from_env() -> Result<Self, sqlx::Error> {
        let connect = match std::env::var("DATABASE_URL") {
            Ok(url) => url.parse::<MySqlConnectOptions>()?,
            Err(_) => options_from_parts(
                &std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
                env_or("DB_PORT", 3306),
                &std::env::var("DB_USER").unwrap_or_else(|_| "root".to_string()),
                &std::env::var("DB_PASSWORD").unwrap_or_default(),
                &std::env::var("DB_NAME").unwrap_or_else(|_| "portfolio".to_string()),
            ),
        };

        Ok(Self {
            connect,
            max_connections: env_or("DB_POOL_MAX", 10),
            min_connections: env_or("DB_POOL_MIN", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT", 300),
        })
    }
}

pub async fn init_pool(config: Option<DbConfig>) -> Result<Arc<MySqlPool>, sqlx::Error> {
    let config = match config {
        Some(config) => config,
        None => DbConfig::from_env()?,
    };

    tracing::info!(
        host = config.connect.get_host(),
        port = config.connect.get_port(),
        database = config.connect.get_database().unwrap_or("-"),
        "Initializing database connection pool..."
    );

    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(std::time::Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(std::time::Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect_with(config.connect)
        .await?;

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    tracing::info!("Database connection pool initialized successfully");

    let pool = Arc::new(pool);
    let _ = DB_POOL.set(pool.clone());

    Ok(pool)
}

pub fn get_pool() -> Option<Arc<MySqlPool>> {
    DB_POOL.get().cloned()
}

/// Pool accessor for handlers that cannot work without the database.
pub fn require_pool() -> Result<Arc<MySqlPool>, ApiError> {
    get_pool().ok_or(ApiError::DatabaseUnavailable)
}

pub async fn health_check() -> Result<std::time::Duration, sqlx::Error> {
    let pool = get_pool()
        .ok_or_else(|| sqlx::Error::Configuration("Database pool not initialized".into()))?;

    let start = std::time::Instant::now();
    sqlx::query("SELECT 1").fetch_one(pool.as_ref()).await?;

    Ok(start.elapsed())
}

/// MySQL rejects multi-statement prepared queries, so each DDL runs on its own.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS project (
        project_id BIGINT AUTO_INCREMENT PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        description TEXT,
        live_link VARCHAR(512),
        git_link VARCHAR(512),
        start_date DATE,
        end_date DATE,
        status BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tool (
        tool_id BIGINT AUTO_INCREMENT PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        type VARCHAR(64),
        image VARCHAR(512)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS client (
        client_id BIGINT AUTO_INCREMENT PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        tel VARCHAR(64),
        e_mail VARCHAR(255),
        image VARCHAR(512)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS project_tool (
        project_id BIGINT NOT NULL,
        tool_id BIGINT NOT NULL,
        PRIMARY KEY (project_id, tool_id),
        INDEX idx_project_tool_tool (tool_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS project_client (
        project_id BIGINT NOT NULL,
        client_id BIGINT NOT NULL,
        PRIMARY KEY (project_id, client_id),
        INDEX idx_project_client_client (client_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS project_images (
        image_id BIGINT AUTO_INCREMENT PRIMARY KEY,
        project_id BIGINT NULL,
        image VARCHAR(1024) NOT NULL,
        public_id VARCHAR(255) NULL,
        INDEX idx_project_images_project (project_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS project_demos (
        demo_id BIGINT AUTO_INCREMENT PRIMARY KEY,
        project_id BIGINT NOT NULL,
        demo VARCHAR(1024) NOT NULL,
        INDEX idx_project_demos_project (project_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS service (
        service_id BIGINT AUTO_INCREMENT PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        description TEXT,
        status BOOLEAN NOT NULL DEFAULT FALSE,
        created_at DATE,
        end_date DATE NULL,
        pricing DOUBLE NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS service_image (
        image_id BIGINT AUTO_INCREMENT PRIMARY KEY,
        service_id BIGINT NOT NULL,
        image VARCHAR(1024) NOT NULL,
        public_id VARCHAR(255) NULL,
        INDEX idx_service_image_service (service_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS post (
        post_id BIGINT AUTO_INCREMENT PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        abstract TEXT,
        head_image VARCHAR(1024),
        content JSON NULL,
        status BOOLEAN NOT NULL DEFAULT FALSE,
        date DATE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS post_images (
        image_id BIGINT AUTO_INCREMENT PRIMARY KEY,
        post_id BIGINT NOT NULL,
        image VARCHAR(1024) NOT NULL,
        INDEX idx_post_images_post (post_id),
        INDEX idx_post_images_image (image(255))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS post_texts (
        post_text_id BIGINT AUTO_INCREMENT PRIMARY KEY,
        post_id BIGINT NOT NULL,
        part MEDIUMTEXT NOT NULL,
        INDEX idx_post_texts_post (post_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS post_keywords (
        post_id BIGINT NOT NULL,
        keyword VARCHAR(128) NOT NULL,
        PRIMARY KEY (post_id, keyword)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS message (
        message_id BIGINT AUTO_INCREMENT PRIMARY KEY,
        content TEXT NOT NULL,
        contact VARCHAR(255) NOT NULL,
        date DATE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS auth_tokens (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        email VARCHAR(255) NOT NULL,
        token_hash CHAR(64) NOT NULL UNIQUE,
        expires_at DATETIME NOT NULL,
        used BOOLEAN NOT NULL DEFAULT FALSE,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        INDEX idx_auth_tokens_expires_at (expires_at)
    )
    "#,
];

pub async fn run_migrations(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running database migrations...");

    for statement in SCHEMA {
        sqlx::query(*statement).execute(pool).await?;
    }

    tracing::info!(
        tables = SCHEMA.len(),
        "Database migrations completed successfully"
    );

    Ok(())
}
