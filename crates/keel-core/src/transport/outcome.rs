//! Status-code normalization into uniform outcomes.

use hyper::Method;
use serde_json::Value;

use crate::error::ClientError;

/// The classified result of one request attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// 200/201/204. The body decoded as JSON, `Null` when the body was empty.
    Success(Value),
    /// 404 on a non-POST call: the resource is absent.
    Empty,
    /// Any other status, with the raw body.
    Failure { status: u16, body: String },
}

impl ResponseOutcome {
    /// Collapse into the value one-shot callers see.
    pub fn into_result(self) -> Result<Option<Value>, ClientError> {
        match self {
            ResponseOutcome::Success(value) => Ok(Some(value)),
            ResponseOutcome::Empty => Ok(None),
            ResponseOutcome::Failure { status, body } => {
                Err(ClientError::Protocol { status, body })
            }
        }
    }
}

/// Classify a response by status code.
///
/// A success body that is not valid JSON is a [`ClientError::Decode`], not a
/// failure outcome: the engine answered, but with malformed content.
pub fn classify(method: &Method, status: u16, body: &[u8]) -> Result<ResponseOutcome, ClientError> {
    match status {
        200 | 201 | 204 => {
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(ResponseOutcome::Success(Value::Null));
            }
            serde_json::from_slice(body)
                .map(ResponseOutcome::Success)
                .map_err(|e| ClientError::Decode(e.to_string()))
        }
        404 if *method != Method::POST => Ok(ResponseOutcome::Empty),
        _ => Ok(ResponseOutcome::Failure {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        }),
    }
}
