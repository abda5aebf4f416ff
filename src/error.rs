use thiserror::Error;

/// Errors raised by a payment transport call.
///
/// These never escape the orchestrator as errors: initiation failures become a
/// `Failed` resolution and poll failures are retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("HTTP error ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Request timeout")]
    Timeout,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Rejected by server: {0}")]
    Rejected(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("A payment is already in progress for order {order_id}")]
    Busy { order_id: String },
    #[error("Payment attempt has already been resolved")]
    AlreadyResolved,
    #[error("Transport error: {0}")]
    TransportError(#[from] TransportError),
    #[error("Order store error: {0}")]
    StoreError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PaymentError>;
