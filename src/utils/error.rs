use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Notification error: {notifier}: {message}")]
    Notification { notifier: String, message: String },

    #[error("Unknown product: {url}")]
    UnknownProduct { url: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Coarse classification of a failed page fetch, used in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Transport,
    Timeout,
    Status,
    Launch,
    Render,
}

/// A page could not be observed this cycle. Never fatal to the cycle.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unexpected status {status}")]
    Status { status: u16 },

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("render failed: {0}")]
    Render(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Transport(_) => FetchErrorKind::Transport,
            FetchError::Timeout(_) => FetchErrorKind::Timeout,
            FetchError::Status { .. } => FetchErrorKind::Status,
            FetchError::Launch(_) => FetchErrorKind::Launch,
            FetchError::Render(_) => FetchErrorKind::Render,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured duration on the error
            FetchError::Timeout(std::time::Duration::ZERO)
        } else if let Some(status) = err.status() {
            FetchError::Status { status: status.as_u16() }
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_notification_error() {
        let err = AppError::Notification {
            notifier: "pushover".to_string(),
            message: "status 500".to_string(),
        };
        assert_eq!(err.to_string(), "Notification error: pushover: status 500");
    }

    #[test]
    fn test_unknown_product_error() {
        let err = AppError::UnknownProduct {
            url: "https://shop.example/p/1".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown product: https://shop.example/p/1");
    }

    #[test]
    fn test_fetch_error_kind() {
        assert_eq!(FetchError::Status { status: 503 }.kind(), FetchErrorKind::Status);
        assert_eq!(
            FetchError::Timeout(std::time::Duration::from_secs(60)).kind(),
            FetchErrorKind::Timeout
        );
        assert_eq!(FetchError::Render("boom".into()).kind(), FetchErrorKind::Render);
        assert_eq!(FetchError::Status { status: 503 }.to_string(), "unexpected status 503");
    }
}
