//! Conversions between reqwest responses and stored entries.

use bytes::Bytes;
use cachet_core::StoredResponse;
use http::StatusCode;
use http_body_util::BodyExt;
use reqwest::Response;
use reqwest_middleware::Error;

/// Splits a response into parts and fully materialized body bytes.
///
/// Response bodies are one-shot streams; collecting to `Bytes` is the
/// materialization that makes the body replayable for both the caller and
/// the store. A body read error surfaces as a transport error.
pub(crate) async fn materialize(
    response: Response,
) -> Result<(http::response::Parts, Bytes), Error> {
    let http_response: http::Response<reqwest::Body> = response.into();
    let (parts, body) = http_response.into_parts();
    let bytes = body.collect().await.map_err(Error::Reqwest)?.to_bytes();
    Ok((parts, bytes))
}

/// Reassembles a response from parts and a materialized body.
pub(crate) fn rebuild(parts: http::response::Parts, bytes: Bytes) -> Response {
    http::Response::from_parts(parts, reqwest::Body::from(bytes)).into()
}

/// Builds a caller-facing response from a stored entry's response.
pub(crate) fn response_from_stored(stored: &StoredResponse) -> Response {
    let mut response = http::Response::new(reqwest::Body::from(stored.body.clone()));
    *response.status_mut() = stored.status;
    *response.headers_mut() = stored.headers.clone();
    response.into()
}

/// Synthetic `504 Gateway Timeout` for `only-if-cached` misses.
pub(crate) fn gateway_timeout() -> Response {
    let mut response = http::Response::new(reqwest::Body::from(Bytes::new()));
    *response.status_mut() = StatusCode::GATEWAY_TIMEOUT;
    response.into()
}
