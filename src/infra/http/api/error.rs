use crate::application::error::ErrorReport;
use crate::application::storage::StorageError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const MALFORMED_URI: &str = "malformed_uri";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNKNOWN_PLUGIN: &str = "unknown_plugin";
    pub const PERSISTENCE: &str = "persistence_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, hint)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        let hint = Some(err.to_string());
        match err {
            StorageError::MalformedUri(_) => Self::new(
                StatusCode::BAD_REQUEST,
                codes::MALFORMED_URI,
                "Malformed node uri",
                hint,
            ),
            StorageError::NodeDoesNotExist { .. } => Self::not_found("Node not found", hint),
            StorageError::UnknownPlugin { .. } => Self::new(
                StatusCode::NOT_FOUND,
                codes::UNKNOWN_PLUGIN,
                "No renderer for extension",
                hint,
            ),
            StorageError::Persistence { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::PERSISTENCE,
                "Node could not be stored",
                hint,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http::api",
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::UriError;

    #[test]
    fn storage_errors_map_to_codes() {
        let cases = [
            (
                StorageError::from(UriError::malformed("", "empty")),
                StatusCode::BAD_REQUEST,
                codes::MALFORMED_URI,
            ),
            (
                StorageError::NodeDoesNotExist {
                    uri: "i18n://sv-se@page/title".to_string(),
                },
                StatusCode::NOT_FOUND,
                codes::NOT_FOUND,
            ),
            (
                StorageError::UnknownPlugin {
                    ext: "foo".to_string(),
                },
                StatusCode::NOT_FOUND,
                codes::UNKNOWN_PLUGIN,
            ),
            (
                StorageError::Persistence {
                    message: "timeout".to_string(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::PERSISTENCE,
            ),
        ];

        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn response_carries_report_for_logging() {
        let response = ApiError::bad_request("Invalid body", Some("missing data".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages, vec!["bad_request: missing data".to_string()]);
    }
}
