//! # Outcome
//!
//! The single result shape produced by both the legacy and the SOAP
//! discovery clients.

use std::fmt;

use http::ureq::http::Uri;

/// What an Autodiscover endpoint answered.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome<S> {
    /// The endpoint returned the settings.
    Success(S),
    /// The endpoint asked to retry the same request at another URL.
    RedirectToUrl(Uri),
    /// The endpoint asked to retry with another SMTP address.
    RedirectToAddress(String),
    /// The endpoint answered with an application-level error.
    Error(RemoteError),
}

/// An application-level error reported by an Autodiscover endpoint.
///
/// Legacy endpoints report numeric codes (`500`, `600`…), SOAP
/// endpoints report error code names (`InvalidUser`…).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl ToString, message: impl ToString) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.message, self.code)
        }
    }
}
