//! # Identity
//!
//! Module dedicated to what a resolution is about: SMTP addresses,
//! domains, the well-known Autodiscover URLs derived from them and
//! the [`ResolutionTarget`] of a service.

use std::str::FromStr;

use email_address::EmailAddress;
use http::ureq::http::Uri;

use crate::{Error, Result};

/// Path of the legacy POX endpoint.
pub const LEGACY_PATH: &str = "/autodiscover/autodiscover.xml";

/// Path of the SOAP endpoint.
pub const SOAP_PATH: &str = "/autodiscover/autodiscover.svc";

/// Path of the WS-Security SOAP endpoint.
pub const SOAP_WS_SECURITY_PATH: &str = "/autodiscover/autodiscover.svc/wssecurity";

/// Parse the given SMTP address and return it with its domain.
pub fn parse_smtp_address(addr: &str) -> Result<(EmailAddress, String)> {
    let addr = addr.trim();

    if addr.is_empty() {
        return Err(Error::MissingSmtpAddressError);
    }

    let email = EmailAddress::from_str(addr)
        .map_err(|err| Error::ParseEmailAddressError(err, addr.to_owned()))?;
    let domain = validate_domain(email.domain())?;

    Ok((email, domain))
}

/// Validate the given domain and return its lower-cased ASCII form,
/// without leading or trailing dots. Internationalized domains are
/// converted to punycode.
pub fn validate_domain(domain: &str) -> Result<String> {
    let domain = domain.trim().trim_matches('.');

    if domain.is_empty() {
        return Err(Error::MissingDomainError);
    }

    let domain = idna::domain_to_ascii(domain)
        .map_err(|_| Error::InvalidDomainError(domain.to_owned()))?;

    let valid_chars = domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    let valid_labels = domain
        .split('.')
        .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'));

    if !valid_chars || !valid_labels {
        return Err(Error::InvalidDomainError(domain));
    }

    Ok(domain)
}

fn build_uri(scheme: &str, host: &str, path: &str) -> Result<Uri> {
    let uri = format!("{scheme}://{host}{path}");
    Uri::from_str(&uri).map_err(|_| Error::InvalidUrlError(uri))
}

/// `https://<host>/autodiscover/autodiscover.xml`. The host may
/// carry a port.
pub fn legacy_https_url(host: &str) -> Result<Uri> {
    build_uri("https", host, LEGACY_PATH)
}

/// `http://<host>/autodiscover/autodiscover.xml`
pub fn legacy_http_url(host: &str) -> Result<Uri> {
    build_uri("http", host, LEGACY_PATH)
}

/// `https://<host>/autodiscover/autodiscover.svc`
pub fn soap_https_url(host: &str) -> Result<Uri> {
    build_uri("https", host, SOAP_PATH)
}

/// `https://<host>/autodiscover/autodiscover.svc/wssecurity`
pub fn soap_ws_security_url(host: &str) -> Result<Uri> {
    build_uri("https", host, SOAP_WS_SECURITY_PATH)
}

/// Return `true` if the URI uses `https` and points to one of the
/// given paths. Paths are compared case-insensitively.
pub fn is_https_with_path(uri: &Uri, paths: &[&str]) -> bool {
    let https = uri
        .scheme_str()
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https"));
    let path = uri.path();

    https && paths.iter().any(|p| p.eq_ignore_ascii_case(path))
}

/// Well-known hosts of the Autodiscover service for a domain, in the
/// order they are tried.
pub fn default_hosts(domain: &str) -> Vec<String> {
    vec![domain.to_owned(), format!("autodiscover.{domain}")]
}

/// What an Autodiscover service resolves against.
///
/// At most one of URL and domain is authoritative at a time: setting
/// an URL derives the domain from its host, setting a domain clears
/// the URL.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum ResolutionTarget {
    ExplicitUrl(Uri),
    ExplicitDomain(String),
    #[default]
    AutoDetect,
}

impl ResolutionTarget {
    pub fn from_url(url: &str) -> Result<Self> {
        let uri = Uri::from_str(url.trim()).map_err(|_| Error::InvalidUrlError(url.to_owned()))?;

        match uri.host() {
            Some(host) if !host.is_empty() => Ok(Self::ExplicitUrl(uri)),
            _ => Err(Error::InvalidUrlError(url.to_owned())),
        }
    }

    pub fn from_domain(domain: &str) -> Result<Self> {
        Ok(Self::ExplicitDomain(validate_domain(domain)?))
    }

    pub fn url(&self) -> Option<&Uri> {
        match self {
            Self::ExplicitUrl(uri) => Some(uri),
            _ => None,
        }
    }

    pub fn domain(&self) -> Option<&str> {
        match self {
            Self::ExplicitUrl(uri) => uri.host(),
            Self::ExplicitDomain(domain) => Some(domain),
            Self::AutoDetect => None,
        }
    }
}
