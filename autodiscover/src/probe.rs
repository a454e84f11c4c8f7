//! # Endpoint capability probe
//!
//! Before talking SOAP to a host, discovery sends it a lightweight
//! unauthenticated GET on its legacy endpoint. The response headers
//! tell which endpoint types the host exposes.

use std::sync::Arc;

use bitflags::bitflags;
use http::ureq::http::Uri;
use tracing::debug;

use crate::{
    config::Credentials,
    identity::{legacy_https_url, soap_https_url, soap_ws_security_url, LEGACY_PATH},
    session::HopBudget,
    transport::{HttpRequest, HttpResponse, Transport},
    AutodiscoverConfig, Result,
};

bitflags! {
    /// Endpoint types exposed by an Autodiscover host.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct EndpointFlags: u8 {
        const LEGACY = 1;
        const SOAP = 1 << 1;
        const WS_SECURITY = 1 << 2;
        const WS_SECURITY_SYMMETRIC_KEY = 1 << 3;
        const WS_SECURITY_X509_CERT = 1 << 4;
        const OAUTH = 1 << 5;
    }
}

const CAPABILITY_HEADERS: [(&str, EndpointFlags); 5] = [
    ("X-SOAP-Enabled", EndpointFlags::SOAP),
    ("X-WSSecurity-Enabled", EndpointFlags::WS_SECURITY),
    (
        "X-WSSecurity-SymmetricKey-Enabled",
        EndpointFlags::WS_SECURITY_SYMMETRIC_KEY,
    ),
    (
        "X-WSSecurity-X509Cert-Enabled",
        EndpointFlags::WS_SECURITY_X509_CERT,
    ),
    ("X-OAuth-Enabled", EndpointFlags::OAUTH),
];

impl EndpointFlags {
    /// Read the capability headers of a probe response. Headers are
    /// flags by presence: any non-empty value enables them.
    pub fn from_response(res: &HttpResponse) -> Self {
        CAPABILITY_HEADERS
            .iter()
            .filter(|(name, _)| res.header(name).is_some_and(|val| !val.trim().is_empty()))
            .fold(Self::LEGACY, |flags, (_, flag)| flags | *flag)
    }
}

/// The endpoint picked on a probed host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EndpointChoice {
    Soap(Uri),
    WsSecurity(Uri),
    /// The host only exposes the legacy endpoint usable with the
    /// configured credentials.
    Legacy(Uri),
}

impl EndpointChoice {
    /// Pick the endpoint of the host matching the given flags and
    /// credentials.
    pub fn select(
        host: &str,
        flags: EndpointFlags,
        credentials: Option<&Credentials>,
    ) -> Result<Self> {
        let bearer = credentials.is_some_and(Credentials::is_bearer);

        if bearer && !flags.contains(EndpointFlags::OAUTH) {
            debug!(host, "host does not accept OAuth tokens on SOAP endpoints");
            return Ok(Self::Legacy(legacy_https_url(host)?));
        }

        if flags.contains(EndpointFlags::SOAP) {
            Ok(Self::Soap(soap_https_url(host)?))
        } else if flags.contains(EndpointFlags::WS_SECURITY) {
            Ok(Self::WsSecurity(soap_ws_security_url(host)?))
        } else {
            Ok(Self::Legacy(legacy_https_url(host)?))
        }
    }
}

/// Probe of the endpoint types exposed by a host.
#[derive(Clone)]
pub struct EndpointProbe {
    config: Arc<AutodiscoverConfig>,
    transport: Arc<dyn Transport>,
}

impl EndpointProbe {
    pub fn new(config: Arc<AutodiscoverConfig>, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Probe the given host, which may carry a port.
    ///
    /// Redirections are followed by switching to the redirected host,
    /// each one consuming a hop of the shared budget. Returns the host
    /// that finally answered with its flags, or `None` if the host
    /// could not be probed.
    pub async fn probe(
        &self,
        host: &str,
        hops: &mut HopBudget,
    ) -> Result<Option<(String, EndpointFlags)>> {
        let mut host = host.to_owned();

        loop {
            let url = legacy_https_url(&host)?;
            debug!(%url, "probing autodiscover endpoint");

            let req = HttpRequest::get(url.clone()).prepared(&self.config, false);
            let res = match self.transport.send(req).await {
                Ok(res) => res,
                Err(err) => {
                    debug!(%url, ?err, "cannot probe autodiscover endpoint");
                    return Ok(None);
                }
            };

            if res.is_redirection() {
                let Some(redirect) = res.redirection(&[LEGACY_PATH]) else {
                    debug!(%url, status = res.status, "non-actionable probe redirection");
                    return Ok(None);
                };

                let Some(next) = redirect.authority().map(ToString::to_string) else {
                    return Ok(None);
                };

                hops.consume()?;
                debug!(from = %host, to = %next, "following probe redirection");
                host = next;
                continue;
            }

            let flags = EndpointFlags::from_response(&res);
            debug!(%host, ?flags, "autodiscover endpoint probed");
            return Ok(Some((host, flags)));
        }
    }
}
