use actix_http::ResponseBuilder;
use actix_web::http::{header, StatusCode};
use actix_web::HttpResponse;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum JobStoreError {
    #[error("Missing required fields: {}", missing.join(", "))]
    Validation { missing: Vec<&'static str> },

    #[error("Job listing {} not found", id)]
    NotFound { id: i64 },

    #[error("Failed to parse job id '{}', {}", value, source)]
    ParseId {
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("Failed to connect to the database, {}", source)]
    Connect { source: rusqlite::Error },

    #[error("Failed to run database migrations, {}", source)]
    Migrate { source: refinery::Error },

    #[error("Failed to execute database query, {}", source)]
    Query { source: rusqlite::Error },

    #[error("Insert statement did not create a row")]
    NothingInserted {},

    #[error("Database call did not finish within {:?}", after)]
    Timeout { after: Duration },

    #[error("Database pool is not running")]
    Unavailable {},

    #[error("Failed to read application context")]
    ReadContext {},

    #[error("Session lifetime of {} hours is out of range", hours)]
    TokenLifetime { hours: i64 },

    #[error("Password is longer than {} bytes", max)]
    PasswordTooLong { max: usize },

    #[error("Missing session, please log in")]
    MissingSession {},

    #[error("Failed to authenticate request, {}", source)]
    Authenticate { source: jsonwebtoken::errors::Error },

    #[error("User {} does not exist", username)]
    UnknownUser { username: String },

    #[error("Invalid username or password")]
    InvalidCredentials {},

    #[error("Username {} is already taken", username)]
    UsernameTaken { username: String },

    #[error("Failed to hash password, {}", source)]
    HashPassword { source: bcrypt::BcryptError },

    #[error("Failed to run blocking task")]
    BlockingTask {},

    #[error("Failed to read configuration file, {}", source)]
    ReadConfigFile { source: std::io::Error },

    #[error("Failed to parse configuration file, {}", source)]
    ParseConfigFile { source: toml::de::Error },

    #[error("Invalid configuration, {}", reason)]
    InvalidConfig { reason: String },
}

impl JobStoreError {
    /// Failures of the database itself, as opposed to a caller asking for
    /// something invalid or absent.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            JobStoreError::Connect { .. }
                | JobStoreError::Migrate { .. }
                | JobStoreError::Query { .. }
                | JobStoreError::NothingInserted {}
                | JobStoreError::Timeout { .. }
                | JobStoreError::Unavailable {}
        )
    }
}

impl actix_web::error::ResponseError for JobStoreError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        let body = if status.is_server_error() {
            if self.is_store_failure() {
                error!("Database failure: {}", self);
            } else {
                error!("Request failed: {}", self);
            }
            format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Internal Server Error")
            )
        } else {
            self.to_string()
        };

        ResponseBuilder::new(status)
            .set_header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            JobStoreError::Validation { .. }
            | JobStoreError::ParseId { .. }
            | JobStoreError::PasswordTooLong { .. } => StatusCode::BAD_REQUEST,
            JobStoreError::NotFound { .. } | JobStoreError::UnknownUser { .. } => {
                StatusCode::NOT_FOUND
            }
            JobStoreError::MissingSession {}
            | JobStoreError::Authenticate { .. }
            | JobStoreError::InvalidCredentials {} => StatusCode::UNAUTHORIZED,
            JobStoreError::UsernameTaken { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
