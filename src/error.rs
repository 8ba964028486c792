use thiserror::Error;

/// Response codes reported by the billing backend.
///
/// `UserCanceled` and `ItemAlreadyOwned` are informational outcomes on the
/// purchase-update channel rather than real failures; everything else marks
/// a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    ServiceUnavailable,
    BillingUnavailable,
    DeveloperError,
    ItemAlreadyOwned,
    UserCanceled,
    Internal,
}

/// A failed call against the billing backend, carrying the backend's
/// response code and debug message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("billing backend call failed, code={code:?}, msg={message}")]
pub struct GatewayError {
    pub code: ResponseCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BillingError {
    /// A call was attempted while the connection was not Ready.
    /// Short-circuited locally, no backend round trip happens.
    #[error("billing connection not ready")]
    NotReady,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, BillingError>;
