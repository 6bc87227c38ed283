use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Logging settings resolved from `ENVIRONMENT`, `LOG_LEVEL` and `LOG_DIR`
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub environment: String,
    pub level: LogLevel,
    pub directory: String,
}

impl LogConfig {
    pub fn from_env() -> Self {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        Self::resolve(
            environment,
            std::env::var("LOG_LEVEL").ok().as_deref(),
            std::env::var("LOG_DIR").ok(),
        )
    }

    fn resolve(environment: String, level: Option<&str>, directory: Option<String>) -> Self {
        let default_level = if environment == "production" {
            LogLevel::Info
        } else {
            LogLevel::Debug
        };

        Self {
            level: level.and_then(|l| l.parse().ok()).unwrap_or(default_level),
            directory: directory.unwrap_or_else(|| "logs".to_string()),
            environment,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Filter used when `RUST_LOG` is not set
    pub fn filter_directive(&self) -> String {
        format!(
            "portfolio_cms={},tower_http=debug,axum=debug,sqlx=warn",
            self.level
        )
    }
}
