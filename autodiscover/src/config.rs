//! # Configuration
//!
//! Module dedicated to the caller-supplied configuration of an
//! [`AutodiscoverService`](crate::AutodiscoverService). The
//! configuration is long-lived and never mutated by a resolution.

use std::{net::SocketAddr, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine};

/// The Exchange version targeted by requests.
///
/// Versions older than [`ExchangeVersion::Exchange2010`] only know
/// the legacy POX protocol.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "derive", derive(serde::Serialize, serde::Deserialize))]
pub enum ExchangeVersion {
    Exchange2007_SP1,
    #[default]
    Exchange2010,
    Exchange2010_SP1,
    Exchange2010_SP2,
    Exchange2013,
    Exchange2013_SP1,
}

impl ExchangeVersion {
    /// The oldest version exposing the SOAP Autodiscover service.
    pub const MIN_SOAP: Self = Self::Exchange2010;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exchange2007_SP1 => "Exchange2007_SP1",
            Self::Exchange2010 => "Exchange2010",
            Self::Exchange2010_SP1 => "Exchange2010_SP1",
            Self::Exchange2010_SP2 => "Exchange2010_SP2",
            Self::Exchange2013 => "Exchange2013",
            Self::Exchange2013_SP1 => "Exchange2013_SP1",
        }
    }

    pub fn supports_soap(&self) -> bool {
        *self >= Self::MIN_SOAP
    }
}

/// Credentials presented to authenticated Autodiscover endpoints.
#[derive(Clone, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case", tag = "type")
)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl Credentials {
    /// The value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        match self {
            Self::Basic { username, password } => format!(
                "Basic {}",
                STANDARD.encode(format!("{username}:{password}"))
            ),
            Self::Bearer { token } => format!("Bearer {token}"),
        }
    }

    pub fn is_bearer(&self) -> bool {
        matches!(self, Self::Bearer { .. })
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Bearer { .. } => f.debug_struct("Bearer").finish_non_exhaustive(),
        }
    }
}

/// The Autodiscover configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case", default)
)]
pub struct AutodiscoverConfig {
    /// The Exchange version targeted by requests. It also decides
    /// between the legacy and the SOAP protocol.
    pub server_version: ExchangeVersion,

    /// Credentials sent along authenticated requests.
    pub credentials: Option<Credentials>,

    /// The `User-Agent` header sent along requests.
    pub user_agent: Option<String>,

    /// The DNS server used for SRV lookups. The system resolver
    /// configuration is used when absent.
    pub dns_server: Option<SocketAddr>,

    /// The per-request timeout handed to the HTTP transport.
    pub timeout: Option<Duration>,

    /// Consult the trusted directory for candidate URLs.
    pub enable_directory_lookup: bool,
}

impl AutodiscoverConfig {
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("autodiscover-lib/{}", env!("CARGO_PKG_VERSION")))
    }
}

impl Default for AutodiscoverConfig {
    fn default() -> Self {
        Self {
            server_version: ExchangeVersion::default(),
            credentials: None,
            user_agent: None,
            dns_server: None,
            timeout: None,
            enable_directory_lookup: true,
        }
    }
}
