//! 42 intranet API access.
//!
//! The async [`IntraClient`] fetches access tokens, user levels, campus
//! login lists and the evaluations a login gave or received. [`IntraLevels`] and [`IntraRecords`] adapt it to
//! the synchronous collaborator traits the detector consumes, translating
//! every failure into "unresolved" or "no records".
//!
//! # Environment Variables
//!
//! - `UID`: application client id
//! - `SECRET`: application client secret

mod blocking;
mod client;

pub use blocking::{IntraLevels, IntraRecords};
pub use client::{ClientConfig, Credentials, IntraClient};

use thiserror::Error;

/// Errors that can occur while talking to the intranet API.
#[derive(Error, Debug)]
pub enum IntraError {
    #[error("Missing API credentials: {0} not set")]
    MissingCredentials(&'static str),

    #[error("API request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),
}

impl IntraError {
    /// True for a 404 answer, e.g. an unknown login.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IntraError::ApiError { status: 404, .. })
    }
}

pub type IntraResult<T> = Result<T, IntraError>;
