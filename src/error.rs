use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

// failure of a single reset or chat call against the runtime
#[derive(Debug, Error)]
pub enum RuntimeCallError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("runtime returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed runtime response: {0}")]
    Protocol(String),
}

// failure of a whole reset-then-chat sequence
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to reset runtime: {0}")]
    Reset(#[source] RuntimeCallError),

    #[error("chat call failed: runtime was still busy after {attempts} attempts")]
    BusyExhausted { attempts: u32 },

    #[error("chat call failed after {attempts} attempts due to network error: {source}")]
    NetworkExhausted {
        attempts: u32,
        #[source]
        source: RuntimeCallError,
    },

    #[error("chat call failed with HTTP {status}: {body}")]
    ChatHttp { status: u16, body: String },

    #[error("unexpected error during chat call: {0}")]
    ChatProtocol(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("model path not found: {0}")]
    ModelNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Runtime(#[from] AdapterError),
}

impl ApiError {

    pub fn status(&self) -> StatusCode {

        match self {
            ApiError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Runtime(_) => StatusCode::SERVICE_UNAVAILABLE,
        }

    }

}

// malformed bodies, unknown roles and out-of-range numbers are client errors too
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {

        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()

    }
}
