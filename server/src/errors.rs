use std::collections::HashMap;
use std::fmt;
use std::fs;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use panel_shared::types::ErrorResponse;

use crate::ApiResponse;

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// Boundary classification of a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Malformed,
    Unauthenticated,
    Forbidden,
    Conflict,
    NotFound,
    RateLimited,
    Timeout,
    Internal,
}

/// Stable error codes that reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidRequest,
    Unauthorized,
    InvalidCredentials,
    TokenExpired,
    PermissionDenied,
    ActionNotAllowed,
    RateLimitExceeded,
    SessionNotFound,
    SessionAlreadyRevoked,
    NotFound,
    RequestTimeout,
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 13] = [
        Self::InvalidRequest,
        Self::Unauthorized,
        Self::InvalidCredentials,
        Self::TokenExpired,
        Self::PermissionDenied,
        Self::ActionNotAllowed,
        Self::RateLimitExceeded,
        Self::SessionNotFound,
        Self::SessionAlreadyRevoked,
        Self::NotFound,
        Self::RequestTimeout,
        Self::DatabaseError,
        Self::InternalError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ActionNotAllowed => "ACTION_NOT_ALLOWED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionAlreadyRevoked => "SESSION_ALREADY_REVOKED",
            Self::NotFound => "NOT_FOUND",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == code)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest => ErrorKind::Malformed,
            Self::Unauthorized | Self::InvalidCredentials | Self::TokenExpired => {
                ErrorKind::Unauthenticated
            }
            Self::PermissionDenied | Self::ActionNotAllowed => ErrorKind::Forbidden,
            Self::RateLimitExceeded => ErrorKind::RateLimited,
            Self::SessionAlreadyRevoked => ErrorKind::Conflict,
            Self::SessionNotFound | Self::NotFound => ErrorKind::NotFound,
            Self::RequestTimeout => ErrorKind::Timeout,
            Self::DatabaseError | Self::InternalError => ErrorKind::Internal,
        }
    }

    fn default_status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Malformed => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid request",
            Self::Unauthorized => "Authentication required",
            Self::InvalidCredentials => "Invalid username or password",
            Self::TokenExpired => "Session is invalid or has expired",
            Self::PermissionDenied => "Permission denied",
            Self::ActionNotAllowed => "Insufficient privileges for this action",
            Self::RateLimitExceeded => "Too many requests, try again later",
            Self::SessionNotFound => "Session not found",
            Self::SessionAlreadyRevoked => "Session is already revoked",
            Self::NotFound => "Endpoint not found",
            Self::RequestTimeout => "Request timed out",
            Self::DatabaseError => "Database error occurred",
            Self::InternalError => "An internal error occurred",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejection on its way to the client: a code plus the only context that
/// may leak, the retry-after hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            code: ErrorCode::RateLimitExceeded,
            retry_after: Some(retry_after),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }
}

impl From<ErrorCode> for ApiError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.retry_after {
            Some(secs) => write!(f, "{} (retry after {}s)", self.code, secs),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for ApiError {}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error reading error catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error catalog parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid status {status} for {code}")]
    InvalidStatus { code: String, status: u16 },
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    errors: HashMap<String, CatalogFileEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogFileEntry {
    status: Option<u16>,
    message: Option<String>,
}

/// Immutable table of status codes and messages for every [`ErrorCode`].
///
/// Built once at start-up and shared by reference with every layer that
/// renders a rejection.
#[derive(Debug, Clone)]
pub struct ErrorCatalog {
    entries: HashMap<ErrorCode, CatalogEntry>,
}

impl ErrorCatalog {
    pub fn builtin() -> Self {
        let entries = ErrorCode::ALL
            .into_iter()
            .map(|code| {
                (
                    code,
                    CatalogEntry {
                        status: code.default_status(),
                        message: code.default_message().to_string(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Built-in defaults overridden by a TOML document of the form
    /// `[errors.CODE] status = 401, message = "..."`.
    pub fn from_toml(contents: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(contents)?;
        let mut catalog = Self::builtin();

        for (name, raw) in file.errors {
            let Some(code) = ErrorCode::parse(&name) else {
                warn!("Error catalog entry {} has no matching error code, ignored", name);
                continue;
            };
            let Some(entry) = catalog.entries.get_mut(&code) else {
                continue;
            };
            if let Some(status) = raw.status {
                entry.status = StatusCode::from_u16(status)
                    .map_err(|_| CatalogError::InvalidStatus { code: name.clone(), status })?;
            }
            if let Some(message) = raw.message {
                entry.message = message;
            }
        }

        Ok(catalog)
    }

    pub fn load(path: Option<&str>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => {
                debug!("Loading error catalog overrides from {}", path);
                Self::from_toml(&fs::read_to_string(path)?)
            }
            None => Ok(Self::builtin()),
        }
    }

    pub fn entry(&self, code: ErrorCode) -> &CatalogEntry {
        &self.entries[&code]
    }

    /// Render a rejection as the JSON error envelope. Rate-limit rejections
    /// also carry a `Retry-After` header.
    pub fn render(&self, error: &ApiError) -> ApiResponse {
        let entry = self.entry(error.code);
        let mut body = ErrorResponse::new(error.code.as_str(), &entry.message);
        if let Some(secs) = error.retry_after {
            body = body.with_retry_after(secs);
        }

        let json = serde_json::to_vec(&body).unwrap_or_default();
        let mut response = Response::new(Full::new(Bytes::from(json)).boxed());
        *response.status_mut() = entry.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if let Some(secs) = error.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl Default for ErrorCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
