use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Station not found: {0}")]
    StationNotFound(String),

    #[error("Store connection error: {0}")]
    StoreConnection(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{}", describe_invocation_failure(.command, .status, .stderr, .stdout_prefix))]
    InvocationFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
        stdout_prefix: Option<String>,
    },

    #[error("{}", describe_http_failure(.endpoint, .status, .reason, .body_prefix))]
    ForecasterRejected {
        endpoint: String,
        status: u16,
        reason: String,
        body_prefix: Option<String>,
    },

    #[error("Forecaster `{command}` did not finish within {}s", .timeout.as_secs_f64())]
    InvocationTimeout { command: String, timeout: Duration },

    #[error("Forecaster unavailable: {0}")]
    ForecasterUnavailable(String),

    #[error("Malformed forecaster output: {0}")]
    MalformedOutput(String),

    #[error("Cache write error: {0}")]
    CacheWrite(#[source] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => AppError::StoreConnection(err),
            other => AppError::Database(other),
        }
    }
}

/// Longest slice of forecaster stdout carried into an error message
pub const OUTPUT_PREFIX_CHARS: usize = 200;

/// Cut `text` down to at most `max_chars` characters, on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn describe_http_failure(
    endpoint: &str,
    status: &u16,
    reason: &str,
    body_prefix: &Option<String>,
) -> String {
    let mut message = format!("Forecaster `{}` answered HTTP {}", endpoint, status);
    if !reason.is_empty() {
        message.push(' ');
        message.push_str(reason);
    }

    match body_prefix {
        Some(prefix) if !prefix.trim().is_empty() => {
            message.push_str(". Body: ");
            message.push_str(prefix.trim());
        }
        _ => message.push_str(". Body was empty"),
    }

    message
}

fn describe_invocation_failure(
    command: &str,
    status: &Option<i32>,
    stderr: &str,
    stdout_prefix: &Option<String>,
) -> String {
    let mut message = match status {
        Some(code) => format!("Forecaster `{}` failed (exit status {})", command, code),
        None => format!("Forecaster `{}` failed (terminated without exit status)", command),
    };

    let stderr = stderr.trim();
    if !stderr.is_empty() {
        message.push_str(". Details: ");
        message.push_str(stderr);
    }

    match stdout_prefix {
        Some(prefix) if !prefix.trim().is_empty() => {
            message.push_str(". Output: ");
            message.push_str(prefix.trim());
        }
        _ => message.push_str(". Output was empty"),
    }

    message
}

pub type Result<T> = std::result::Result<T, AppError>;
