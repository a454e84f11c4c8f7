//! # Error
//!
//! Module dedicated to the terminal errors of a resolution. Only
//! these errors ever reach the caller: transport, XML and DNS
//! failures are absorbed by the resolution and only show up in logs.

use thiserror::Error;

use crate::outcome::RemoteError;

/// The global `Result` alias of the library.
pub type Result<T> = std::result::Result<T, Error>;

/// The global `Error` enum of the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot resolve settings: SMTP address is empty")]
    MissingSmtpAddressError,
    #[error("cannot resolve settings: domain is empty")]
    MissingDomainError,
    #[error("cannot resolve settings: at least one setting must be requested")]
    MissingRequestedSettingsError,
    #[error("cannot parse email address {1}")]
    ParseEmailAddressError(#[source] email_address::Error, String),
    #[error("invalid autodiscover domain {0}")]
    InvalidDomainError(String),
    #[error("invalid autodiscover URL {0}")]
    InvalidUrlError(String),
    #[error("autodiscover requires a domain or an URL")]
    MissingDomainOrUrlError,
    #[error("domain settings require the SOAP protocol, available from Exchange2010")]
    DomainSettingsRequireSoapError,

    #[error("maximum of {0} redirection hops exceeded")]
    MaxRedirectionHopsExceeded(u8),
    #[error("autodiscover service could not be located")]
    ServiceNotLocated,
    #[error("autodiscover service returned an error: {0}")]
    AutodiscoverRemoteError(RemoteError),
}

impl Error {
    /// Return `true` if the error was raised before any network I/O.
    pub fn is_validation_error(&self) -> bool {
        !matches!(
            self,
            Self::MaxRedirectionHopsExceeded(_)
                | Self::ServiceNotLocated
                | Self::AutodiscoverRemoteError(_)
        )
    }
}
