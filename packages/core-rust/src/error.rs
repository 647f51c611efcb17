//! MEP error codes and the problem-details body rendered on failure.

use serde::{Deserialize, Serialize};

/// Error taxonomy recorded by pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Generic internal failure.
    FailBase,
    ServiceNotFound,
    ServiceInstanceNotFound,
    /// Request body could not be parsed.
    ParseInfo,
    /// A request field failed validation.
    RequestParam,
    AuthorizationValidate,
}

impl ErrorCode {
    /// Numeric code carried in the response body.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            Self::FailBase => 1,
            Self::ServiceNotFound => 2,
            Self::ServiceInstanceNotFound => 3,
            Self::ParseInfo => 4,
            Self::RequestParam => 5,
            Self::AuthorizationValidate => 11,
        }
    }

    /// HTTP status the code is rendered with.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::FailBase => 500,
            Self::ServiceNotFound | Self::ServiceInstanceNotFound => 404,
            Self::ParseInfo | Self::RequestParam => 400,
            Self::AuthorizationValidate => 401,
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::FailBase => "Internal server error",
            Self::ServiceNotFound => "Service not found",
            Self::ServiceInstanceNotFound => "Service instance not found",
            Self::ParseInfo => "Bad request body",
            Self::RequestParam => "Invalid request parameter",
            Self::AuthorizationValidate => "Unauthorized",
        }
    }
}

/// Problem-details response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: u32,
}

impl ProblemDetails {
    #[must_use]
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            title: code.title().to_string(),
            status: code.http_status(),
            detail: detail.into(),
            code: code.as_u32(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_details_carry_code_and_status() {
        let body = ProblemDetails::new(ErrorCode::ServiceNotFound, "could not find any instance");
        assert_eq!(body.status, 404);
        assert_eq!(body.code, 2);
        assert_eq!(body.detail, "could not find any instance");

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["title"], "Service not found");
    }

    #[test]
    fn authorization_maps_to_401() {
        assert_eq!(ErrorCode::AuthorizationValidate.http_status(), 401);
    }
}
