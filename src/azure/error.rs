use thiserror::Error;

/// Errors returned by the ARM REST API or while polling long-running operations.
///
/// SECURITY: Error messages must NEVER contain the bearer token.
#[derive(Debug, Error)]
pub enum ArmError {
    /// The resource does not exist (HTTP 404)
    #[error("resource not found: {id}")]
    NotFound { id: String },

    /// Authentication or authorization failed (HTTP 401/403)
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// API returned an error response
    #[error("API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Network-level error (connection failed, timeout, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A long-running operation reached a failed terminal state
    #[error("long-running operation ended with status {status:?}: {code}: {message}")]
    OperationFailed {
        status: String,
        code: String,
        message: String,
    },

    /// The response body could not be decoded
    #[error("decoding response: {message}")]
    Decode { message: String },
}

impl ArmError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArmError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = ArmError::NotFound {
            id: "/subscriptions/sub/resourceGroups/rg".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "resource not found: /subscriptions/sub/resourceGroups/rg"
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_api_error_display() {
        let err = ArmError::Api {
            status: 409,
            code: "InUseSubnetCannotBeDeleted".to_string(),
            message: "Subnet is in use".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error (409) InUseSubnetCannotBeDeleted: Subnet is in use"
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_operation_failed_display() {
        let err = ArmError::OperationFailed {
            status: "Failed".to_string(),
            code: "InternalServerError".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "long-running operation ended with status \"Failed\": InternalServerError: boom"
        );
    }

    #[test]
    fn test_auth_error_does_not_contain_token() {
        let fake_token = "eyJ0eXAiOiJKV1QiLCJhbGciOi_secret";
        let err = ArmError::Auth {
            status: 401,
            message: "The access token is invalid.".to_string(),
        };
        assert!(!err.to_string().contains(fake_token));
    }
}
