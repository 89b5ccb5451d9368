//! Mapping of [`ClinicError`] onto HTTP responses.
//!
//! This is the only place that picks status codes. Bodies are always
//! `{"detail": ...}`; validation failures carry a list of
//! `{"loc": [...], "msg": ...}` objects.

use axum::Json;
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use clinic_core::error::{ClinicError, FieldError};
use serde_json::{Value, json};
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError(pub ClinicError);

/// Field diagnostics attached to a 422 response for request logging.
#[derive(Debug, Clone)]
pub struct ValidationDiagnostics(pub Vec<FieldError>);

impl From<ClinicError> for ApiError {
    fn from(err: ClinicError) -> Self {
        Self(err)
    }
}

fn rejected(location: &str, message: String) -> ApiError {
    ApiError(ClinicError::invalid(location, message))
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        rejected("body", rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        rejected("body", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        rejected("query", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        rejected("path", rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ClinicError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            ClinicError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ClinicError::NotFound { .. } => StatusCode::NOT_FOUND,
            ClinicError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ClinicError::Conflict { .. } => StatusCode::CONFLICT,
            ClinicError::Dependency(_) => StatusCode::BAD_GATEWAY,
            ClinicError::Database(_) | ClinicError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn detail(&self) -> Value {
        match &self.0 {
            ClinicError::Unauthenticated { reason } | ClinicError::Forbidden { reason } => {
                Value::String(reason.clone())
            }
            // Same text whether the row is absent or owned by another tenant.
            ClinicError::NotFound { entity, .. } => Value::String(format!("{entity} not found")),
            ClinicError::Validation { errors } => Value::Array(
                errors
                    .iter()
                    .map(|e| json!({ "loc": location(&e.field), "msg": e.message }))
                    .collect(),
            ),
            ClinicError::Conflict { entity } => {
                Value::String(format!("{entity} already exists"))
            }
            ClinicError::Dependency(_) => Value::String("upstream service unavailable".into()),
            ClinicError::Database(_) | ClinicError::Internal(_) => {
                Value::String("internal server error".into())
            }
        }
    }
}

/// `"body"` and friends name a whole request part; anything else is a
/// body field.
fn location(field: &str) -> Value {
    match field {
        "body" | "query" | "path" => json!([field]),
        _ => json!(["body", field]),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.0 {
            ClinicError::Dependency(message)
            | ClinicError::Database(message)
            | ClinicError::Internal(message) => {
                error!(status = status.as_u16(), error = %message, "Request failed");
            }
            _ => {}
        }

        let mut response = (status, Json(json!({ "detail": self.detail() }))).into_response();
        match self.0 {
            ClinicError::Unauthenticated { .. } => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            ClinicError::Validation { errors } => {
                response.extensions_mut().insert(ValidationDiagnostics(errors));
            }
            _ => {}
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (ClinicError::unauthenticated("x"), 401),
            (ClinicError::forbidden("x"), 403),
            (ClinicError::not_found("patient", "1"), 404),
            (ClinicError::invalid("slug", "bad"), 422),
            (ClinicError::conflict("tenant"), 409),
            (ClinicError::Dependency("smtp".into()), 502),
            (ClinicError::Database("boom".into()), 500),
            (ClinicError::Internal("boom".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status().as_u16(), status);
        }
    }

    #[test]
    fn not_found_hides_the_id() {
        let detail = ApiError(ClinicError::not_found("patient", "secret-id")).detail();
        assert_eq!(detail, json!("patient not found"));
    }

    #[test]
    fn validation_detail_lists_locations() {
        let detail = ApiError(ClinicError::invalid("slug", "bad slug")).detail();
        assert_eq!(detail, json!([{ "loc": ["body", "slug"], "msg": "bad slug" }]));
    }

    #[test]
    fn internal_messages_stay_server_side() {
        let detail = ApiError(ClinicError::Internal("db password wrong".into())).detail();
        assert_eq!(detail, json!("internal server error"));
    }

    #[test]
    fn unauthenticated_sets_challenge_header() {
        let response = ApiError(ClinicError::unauthenticated("token has expired")).into_response();
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
