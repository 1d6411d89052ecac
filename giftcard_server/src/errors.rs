use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use giftcard_engine::CardFlowError;
use log::error;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    CardFlow(#[from] CardFlowError),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Could not initialize a backend. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Too many requests")]
    RateLimited,
}

impl ServerError {
    /// What the caller gets to see. Node internals, backend addresses and stack detail stay in
    /// the logs.
    fn public_message(&self) -> String {
        match self {
            Self::CardFlow(e) => match e {
                CardFlowError::NotFound(_)
                | CardFlowError::InvalidArgument(_)
                | CardFlowError::PreconditionFailed(_)
                | CardFlowError::Conflict(_) => e.to_string(),
                CardFlowError::Node(_) => "The payment could not be completed".to_string(),
                CardFlowError::Transient(_) => "A backend service is temporarily unavailable".to_string(),
                CardFlowError::Internal(_) => "Internal server error".to_string(),
            },
            Self::RateLimited => "Too many requests".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CardFlow(e) => match e {
                CardFlowError::NotFound(_) => StatusCode::NOT_FOUND,
                CardFlowError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                CardFlowError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
                CardFlowError::Conflict(_) => StatusCode::CONFLICT,
                CardFlowError::Node(_) => StatusCode::BAD_GATEWAY,
                CardFlowError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                CardFlowError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!("💻️ {self}");
        }
        HttpResponse::build(self.status_code()).json(json!({ "error": self.public_message() }))
    }
}

#[cfg(test)]
mod test {
    use actix_web::http::StatusCode;
    use giftcard_engine::{traits::NodeError, CardFlowError};

    use super::*;

    #[test]
    fn error_kinds_map_to_the_documented_status_codes() {
        let cases = [
            (CardFlowError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CardFlowError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (CardFlowError::PreconditionFailed("x".into()), StatusCode::PRECONDITION_FAILED),
            (CardFlowError::Conflict("x".into()), StatusCode::CONFLICT),
            (CardFlowError::Node(NodeError::Payment("x".into())), StatusCode::BAD_GATEWAY),
            (CardFlowError::Transient("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (CardFlowError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status_code(), status);
        }
        assert_eq!(ServerError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn backend_detail_never_reaches_the_public_message() {
        let err = ServerError::from(CardFlowError::Transient("postgres at 10.0.0.3 refused".into()));
        assert!(!err.public_message().contains("10.0.0.3"));
        let err = ServerError::from(CardFlowError::Node(NodeError::Rpc("macaroon rejected".into())));
        assert!(!err.public_message().contains("macaroon"));
    }
}
