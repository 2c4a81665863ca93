//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// The gateway rejected the request and said why
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// The gateway answered 2xx but the payload is missing fields
    #[error("Malformed gateway payload: {0}")]
    MalformedCharge(String),

    /// Transport-level failure talking to the gateway
    #[error("Gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// Row-store failure during activation
    #[error("Store error: {0}")]
    Store(#[from] nest_store::StoreError),

    /// The flow was asked to do something its state forbids
    #[error("Invalid flow state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            // One message for every way charge generation can fail:
            // unreachable, rejected, or malformed.
            Self::Gateway(msg) => format!("Could not generate the Pix charge: {msg}"),
            Self::MalformedCharge(_) | Self::Transport(_) => {
                "Could not generate the Pix charge. Please try again.".into()
            }
            Self::Store(e) => e.user_message().into(),
            Self::InvalidState(_) => "This payment flow is no longer active.".into(),
            Self::Config(_) => "Payments are not configured.".into(),
        }
    }
}
