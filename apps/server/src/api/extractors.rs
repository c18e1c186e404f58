//! Custom Axum extractors for queue request bodies and identifiers.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, HeaderMap},
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::{models::EntryId, Error};

/// JSON body that is deserialized and then checked with `validator`.
///
/// Malformed bodies and failed validation both surface as the crate's
/// `Validation` error so clients always receive the same error shape.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_json_content_type(req.headers()) {
            return Err(Error::Validation(
                "Content-Type must be application/json".to_string(),
            ));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| Error::Validation(format!("Failed to read request body: {}", e)))?;

        let value: T = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Validation(format!("Invalid JSON in request body: {}", e)))?;
        value
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;

        Ok(ValidJson(value))
    }
}

/// Missing Content-Type is accepted as JSON
fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(ct) = headers.get("content-type").and_then(|v| v.to_str().ok()) else {
        return true;
    };
    let media_type = ct.split(';').next().unwrap_or("").trim().to_lowercase();
    media_type == "application/json" || media_type.ends_with("+json")
}

/// `:id` path segment parsed as an [`EntryId`]
pub struct EntryPath(pub EntryId);

#[async_trait]
impl<S> FromRequestParts<S> for EntryPath
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| Error::Validation(format!("Invalid path: {}", e)))?;
        Ok(EntryPath(raw.parse()?))
    }
}
