//! Error types shared by the HTTP layer and the MME model.

/// Error raised when a request or response does not conform to the MME API.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The body is not valid JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),
    /// The body is valid JSON but violates the MME API schema.
    #[error("schema violation: {0}")]
    Schema(String),
}

impl ValidationError {
    /// Shortcut for creating a schema violation.
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        ValidationError::Schema(msg.into())
    }
}

/// Error returned by the HTTP handlers.
///
/// The response body is the message as a JSON string.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Invalid request JSON")]
    BadRequest,
    #[error("Not authorized")]
    Unauthorized,
    #[error("Request does not conform to API specifications")]
    Unprocessable,
    #[error("Internal server error")]
    Internal(anyhow::Error),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        tracing::warn!("rejecting request: {}", err);
        match err {
            ValidationError::MalformedJson(_) => ApiError::BadRequest,
            ValidationError::Schema(_) => ApiError::Unprocessable,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl actix_web::ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        if let ApiError::Internal(err) = self {
            tracing::error!("internal error: {:?}", err);
        }
        actix_web::HttpResponse::build(self.status_code()).json(self.to_string())
    }
}

#[cfg(test)]
mod test {
    use actix_web::{http::StatusCode, ResponseError};
    use pretty_assertions::assert_eq;

    use super::*;

    #[rstest::rstest]
    #[case(ValidationError::MalformedJson("eof".into()), StatusCode::BAD_REQUEST)]
    #[case(ValidationError::schema("no id"), StatusCode::UNPROCESSABLE_ENTITY)]
    fn validation_status(#[case] err: ValidationError, #[case] expected: StatusCode) {
        assert_eq!(ApiError::from(err).status_code(), expected);
    }

    #[test]
    fn messages() {
        assert_eq!(ApiError::BadRequest.to_string(), "Invalid request JSON");
        assert_eq!(ApiError::Unauthorized.to_string(), "Not authorized");
        assert_eq!(
            ApiError::Unprocessable.to_string(),
            "Request does not conform to API specifications"
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
