use serde::Serialize;
use thiserror::Error;

/// Stable numeric codes reported in the `error` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    NoResponse = 1,
    NoCookie = 2,
    NoDomain = 3,
    Transport = 4,
    Http = 5,
    NoData = 6,
    MissingFields = 7,
    UnknownDataset = 8,
}

impl ErrorCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// The `{code, message}` structure callers check before treating a payload as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub code: u8,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ShimError {
    #[error("transport error while fetching {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("HTTP error {status} while fetching {url}")]
    Http { status: u16, url: String },
    #[error("unable to extract any data from the page at {url}")]
    NoData { url: String },
    #[error("missing fields {} required for query '{query}'", quote_list(.fields))]
    MissingFields {
        query: &'static str,
        fields: Vec<&'static str>,
    },
    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),
    #[error("no cookie provided")]
    NoCookie,
    #[error("no domain provided")]
    NoDomain,
    #[error("empty response: {0}")]
    NoResponse(String),
}

impl ShimError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ShimError::Transport { .. } => ErrorCode::Transport,
            ShimError::Http { .. } => ErrorCode::Http,
            ShimError::NoData { .. } => ErrorCode::NoData,
            ShimError::MissingFields { .. } => ErrorCode::MissingFields,
            ShimError::UnknownDataset(_) => ErrorCode::UnknownDataset,
            ShimError::NoCookie => ErrorCode::NoCookie,
            ShimError::NoDomain => ErrorCode::NoDomain,
            ShimError::NoResponse(_) => ErrorCode::NoResponse,
        }
    }

    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord {
            code: self.code().as_u8(),
            message: self.to_string(),
        }
    }
}

fn quote_list(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| format!("'{}'", f))
        .collect::<Vec<_>>()
        .join(", ")
}
