use async_trait::async_trait;
use hishtory_data::DataError;
use salvo::http::StatusCode;
use salvo::prelude::{Depot, Request, Response, Writer};
use thiserror::Error;

/// The coordinator's single application-level error type. Every failure
/// surfaced at the HTTP boundary funnels through here so the router has one
/// place that decides status codes and response bodies.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid request: `{0}`")]
    InvalidRequest(String),
    #[error("data: `{0}`")]
    Data(#[from] DataError),
    #[error("config: `{0}`")]
    Config(#[from] figment::Error),
    #[error("serde json: `{0}`")]
    SerdeJson(#[from] serde_json::Error),
    #[error("reqwest: `{0}`")]
    Reqwest(#[from] reqwest::Error),
    #[error("salvo: `{0}`")]
    Salvo(#[from] salvo::Error),
    #[error("salvo http: `{0}`")]
    HttpStatus(#[from] salvo::http::StatusError),
    #[error("salvo parse: `{0}`")]
    HttpParse(#[from] salvo::http::ParseError),
}

impl AppError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

#[async_trait]
impl Writer for AppError {
    async fn write(self, _req: &mut Request, _depot: &mut Depot, res: &mut Response) {
        let (status, message) = match &self {
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Data(DataError::CapacityExceeded) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "user capacity exceeded".to_owned())
            }
            Self::Data(DataError::NotFound) => (StatusCode::INTERNAL_SERVER_ERROR, "not found".to_owned()),
            Self::Data(DataError::Conflict) => {
                // Re-registration races are idempotent by design; callers
                // treat this as a no-op success rather than a failure.
                (StatusCode::OK, String::new())
            }
            Self::Data(DataError::Cancelled) => return,
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_owned()),
        };
        if status != StatusCode::BAD_REQUEST && status != StatusCode::OK {
            tracing::error!(error = ?self, %status, "request failed");
        }
        res.status_code(status);
        if !message.is_empty() {
            res.render(message);
        }
    }
}
