//! HTTP error mapping and request extractors that report failures in the same
//! `{"code", "message"}` shape as every other error.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::realm::RealmError;

#[derive(Debug)]
pub struct ApiError(pub RealmError);

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError(RealmError::InvalidInput(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RealmError::InvalidInput(_) | RealmError::InsufficientGold { .. } => {
                StatusCode::BAD_REQUEST
            }
            RealmError::Conflict(_) => StatusCode::CONFLICT,
            RealmError::NotFound(_) => StatusCode::NOT_FOUND,
            RealmError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RealmError::Sled(_)
            | RealmError::Bincode(_)
            | RealmError::Io(_)
            | RealmError::SchemaMismatch { .. }
            | RealmError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RealmError> for ApiError {
    fn from(err: RealmError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            code: self.0.code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Parse a path id. Ids are positive integers; anything else is a 400.
pub fn parse_id(raw: &str) -> ApiResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::invalid(format!("invalid id: {}", raw))),
    }
}

/// `Json` whose rejections (bad syntax, missing fields, wrong content type)
/// come back as 400 `InvalidInput`.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::invalid(rejection.body_text())
}

/// `Query` with the same error mapping as [`ApiJson`].
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::invalid(rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("17").unwrap(), 17);
        for bad in ["0", "-3", "abc", "", "1.5"] {
            let err = parse_id(bad).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{}", bad);
        }
    }

    #[test]
    fn realm_errors_map_to_statuses() {
        let cases = [
            (RealmError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (
                RealmError::InsufficientGold {
                    needed: 2,
                    available: 1,
                },
                StatusCode::BAD_REQUEST,
            ),
            (RealmError::Conflict("x".into()), StatusCode::CONFLICT),
            (RealmError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (RealmError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (RealmError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }
}
