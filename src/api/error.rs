// Error type for API handlers, rendered through the standard envelope.

use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::api::models::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("too many requests, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("database error")]
    Database(sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Maps a query error for `what`: missing rows become 404, unique
    /// violations 409 and foreign-key violations 400.
    pub fn from_sqlx(what: &str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ApiError::NotFound(what.to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23505") => ApiError::Conflict(format!("{what} already exists")),
                Some("23503") => {
                    ApiError::BadRequest(format!("{what} references a missing record"))
                }
                Some("23514") => ApiError::BadRequest(format!("{what} has an invalid value")),
                _ => ApiError::Database(err),
            },
            _ => ApiError::Database(err),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::from_sqlx("record", err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            match self {
                ApiError::Database(err) => tracing::error!(error = %err, "database error"),
                ApiError::Internal(err) => tracing::error!(error = ?err, "internal error"),
                _ => {}
            }
        }

        let mut body = ApiResponse::<()>::error(self.to_string());
        if let ApiError::Validation(errors) = self {
            body = body.with_details(serde_json::to_value(errors).unwrap_or_default());
        }

        let mut builder = HttpResponse::build(status);
        if let ApiError::RateLimited { retry_after } = self {
            builder.insert_header((header::RETRY_AFTER, retry_after.to_string()));
        }
        builder.json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 1))]
        name: String,
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err = ApiError::from_sqlx("competitor", sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "competitor not found");
    }

    #[actix_web::test]
    async fn validation_errors_carry_field_details() {
        let errors = Probe { name: String::new() }.validate().unwrap_err();
        let resp = ApiError::from(errors).error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["details"]["name"].is_array());
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let resp = ApiError::RateLimited { retry_after: 42 }.error_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }
}
