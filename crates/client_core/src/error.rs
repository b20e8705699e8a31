use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Network(String),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("{message}")]
    Validation {
        message: String,
        field_errors: BTreeMap<String, String>,
    },
    #[error("malformed server response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Network(value.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("{field} cannot be chosen before {missing}")]
    UpstreamEmpty {
        field: &'static str,
        missing: &'static str,
    },
    #[error("{field} options are still loading")]
    OptionsLoading { field: &'static str },
    #[error("{value:?} is not an available {field} option")]
    NotAnOption { field: &'static str, value: String },
    #[error("{field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("{field} has no option source")]
    NoOptionSource { field: &'static str },
    #[error("The form cannot be changed while it is being submitted")]
    Submitting,
}

/// Form-level failures. The `Display` text is what the error banner shows.
#[derive(Debug, Clone, Error)]
pub enum FormError {
    #[error("Please fill in the required fields: {}", .labels.join(", "))]
    MissingFields { labels: Vec<&'static str> },
    #[error("Could not load {field} options: {reason}")]
    OptionFetch { field: &'static str, reason: String },
    #[error("{message}")]
    SubmissionValidation {
        message: String,
        field_errors: BTreeMap<String, String>,
    },
    #[error("Could not create the appointment: {0}")]
    SubmissionTransport(String),
    #[error("The appointment is already being submitted")]
    AlreadySubmitting,
    #[error("{0}")]
    InvalidRequest(String),
}

impl FormError {
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::MissingFields { .. } | Self::AlreadySubmitting | Self::InvalidRequest(_)
        )
    }
}

impl From<TransportError> for FormError {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Validation {
                message,
                field_errors,
            } => Self::SubmissionValidation {
                message,
                field_errors,
            },
            other => Self::SubmissionTransport(other.to_string()),
        }
    }
}
