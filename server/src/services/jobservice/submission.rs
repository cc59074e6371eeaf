//! Splitting a `POST /jobs` body into the JSON request and the staged input.
//!
//! The body is one JSON document followed by optional raw bytes. A single
//! newline right after the document separates the two and is dropped.

use crate::error::{AppError, AppResult};
use axum::http::HeaderValue;
use bytes::Bytes;
use joblib::Submission;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub args: Vec<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub webhook: Option<String>,
}

pub fn parse_submission(body: Bytes) -> AppResult<Submission> {
    let mut stream = serde_json::Deserializer::from_slice(&body).into_iter::<SubmitRequest>();
    let request = match stream.next() {
        Some(Ok(request)) => request,
        Some(Err(err)) => return Err(AppError::BadRequest(format!("invalid job request: {}", err))),
        None => return Err(AppError::BadRequest("empty job request".into())),
    };
    let offset = stream.byte_offset();

    let mime_type = request.mime_type.filter(|s| !s.is_empty());
    if let Some(mime_type) = &mime_type {
        // served back verbatim as the result's Content-Type
        if HeaderValue::from_str(mime_type).is_err() {
            return Err(AppError::BadRequest(format!(
                "mime_type {:?} is not a valid header value",
                mime_type
            )));
        }
    }

    let mut rest = body.slice(offset..);
    if rest.starts_with(b"\r\n") {
        rest = rest.slice(2..);
    } else if rest.starts_with(b"\n") {
        rest = rest.slice(1..);
    }

    Ok(Submission {
        args: request.args,
        mime_type,
        webhook: request.webhook.filter(|s| !s.is_empty()),
        input: if rest.is_empty() { None } else { Some(rest) },
    })
}
