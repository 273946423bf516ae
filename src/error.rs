//! Error types shared across the assistant.

use thiserror::Error;

use crate::provider::Vendor;

/// Failure of a single vendor call. Every vendor client returns this
/// instead of a sentinel string.
#[derive(Error, Debug)]
pub enum VendorError {
    #[error("{0} API key not configured")]
    MissingKey(Vendor),

    #[error("{vendor} request timed out")]
    Timeout { vendor: Vendor },

    #[error("{vendor} network error: {message}")]
    Network { vendor: Vendor, message: String },

    #[error("{vendor} API error {status}: {body}")]
    Status {
        vendor: Vendor,
        status: u16,
        body: String,
    },

    #[error("{vendor} returned an unexpected response: {detail}")]
    MalformedResponse { vendor: Vendor, detail: String },
}

impl VendorError {
    pub fn from_reqwest(vendor: Vendor, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VendorError::Timeout { vendor }
        } else if err.is_decode() {
            VendorError::MalformedResponse {
                vendor,
                detail: err.to_string(),
            }
        } else {
            VendorError::Network {
                vendor,
                message: err.to_string(),
            }
        }
    }

    pub fn vendor(&self) -> Vendor {
        match self {
            VendorError::MissingKey(vendor) => *vendor,
            VendorError::Timeout { vendor }
            | VendorError::Network { vendor, .. }
            | VendorError::Status { vendor, .. }
            | VendorError::MalformedResponse { vendor, .. } => *vendor,
        }
    }
}

#[derive(Error, Debug)]
pub enum RepairDeskError {
    #[error("RepairDesk API key not configured")]
    MissingKey,

    #[error("RepairDesk request timed out")]
    Timeout,

    #[error("RepairDesk network error: {0}")]
    Network(String),

    #[error("RepairDesk API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("RepairDesk rejected the request: {0}")]
    Rejected(String),

    #[error("Ticket {0} not found")]
    TicketNotFound(String),

    #[error("Invalid RepairDesk response: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RepairDeskError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RepairDeskError::Timeout
        } else {
            RepairDeskError::Network(err.to_string())
        }
    }
}

impl RepairDeskError {
    /// Errors worth another attempt: the server never answered.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepairDeskError::Timeout | RepairDeskError::Network(_))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("'{0}' is not a ticket number")]
pub struct TicketIdError(pub String);
