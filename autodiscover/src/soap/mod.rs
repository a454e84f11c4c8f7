//! # SOAP discovery client
//!
//! This module contains the client of the SOAP Autodiscover service,
//! `/autodiscover/autodiscover.svc`, available from Exchange 2010.
//! It supports the `GetUserSettings` and `GetDomainSettings`
//! operations.

pub mod request;
pub mod response;

use std::{fmt::Debug, str::FromStr, sync::Arc};

use http::ureq::http::Uri;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    config::{AutodiscoverConfig, ExchangeVersion},
    identity::{LEGACY_PATH, SOAP_PATH, SOAP_WS_SECURITY_PATH},
    outcome::Outcome,
    settings::{DomainSettingName, DomainSettings, Settings, UserSettingName, UserSettings},
    transport::{self, HttpRequest, HttpResponse, Transport},
    xml,
};

use self::{
    request::{build_domain_settings_request, build_user_settings_request, Operation},
    response::{parse_envelope, parse_settings_response, Envelope},
};

pub const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const AUTODISCOVER_NS: &str = "http://schemas.microsoft.com/exchange/2010/Autodiscover";
pub const WSA_NS: &str = "http://www.w3.org/2005/08/addressing";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// The `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// A non-fatal failure of a SOAP endpoint.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    TransportError(#[from] transport::Error),
    #[error("cannot parse SOAP autodiscover response")]
    ParseResponseError(#[from] xml::Error),
    #[error("unexpected SOAP response message {0} for operation {1}")]
    UnexpectedResponseError(String, &'static str),
    #[error("SOAP endpoint {1} returned unexpected HTTP status {0}")]
    UnexpectedStatusError(u16, Uri),
    #[error("SOAP endpoint {1} returned a non-actionable redirection (HTTP {0})")]
    NonActionableRedirectError(u16, Uri),
    #[error("SOAP endpoint returned an invalid redirection URL {0}")]
    InvalidRedirectUrlError(String),
}

/// Client of SOAP Autodiscover endpoints.
#[derive(Clone)]
pub struct SoapClient {
    config: Arc<AutodiscoverConfig>,
    transport: Arc<dyn Transport>,
}

impl SoapClient {
    pub fn new(config: Arc<AutodiscoverConfig>, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Ask the SOAP endpoint at the given URL for the settings of the
    /// given address.
    pub async fn get_user_settings(
        &self,
        url: &Uri,
        addr: &str,
        requested: &[UserSettingName],
        version: ExchangeVersion,
    ) -> Result<Outcome<UserSettings>> {
        debug!(%url, addr, "requesting SOAP user settings");

        let body = build_user_settings_request(url, addr, requested, version)?;
        let outcome = self
            .execute(url, Operation::GetUserSettings, body, addr)
            .await?;

        Ok(match outcome {
            Outcome::Success(settings) => Outcome::Success(settings.restrict_to(requested)),
            outcome => outcome,
        })
    }

    /// Ask the SOAP endpoint at the given URL for the settings of the
    /// given domain.
    pub async fn get_domain_settings(
        &self,
        url: &Uri,
        domain: &str,
        requested: &[DomainSettingName],
        version: ExchangeVersion,
    ) -> Result<Outcome<DomainSettings>> {
        debug!(%url, domain, "requesting SOAP domain settings");

        let body = build_domain_settings_request(url, domain, requested, version)?;
        let outcome = self
            .execute(url, Operation::GetDomainSettings, body, domain)
            .await?;

        Ok(match outcome {
            Outcome::Success(settings) => Outcome::Success(settings.restrict_to(requested)),
            outcome => outcome,
        })
    }

    async fn execute<N>(
        &self,
        url: &Uri,
        op: Operation,
        body: String,
        identity: &str,
    ) -> Result<Outcome<Settings<N>>>
    where
        N: FromStr + Ord + Copy + AsRef<str> + Debug,
    {
        let req = HttpRequest::post(url.clone(), body)
            .with_header("Content-Type", "text/xml; charset=utf-8")
            .with_header("SOAPAction", op.action())
            .prepared(&self.config, true);
        let res = self.transport.send(req).await?;

        if res.is_redirection() {
            return match res.redirection(&[SOAP_PATH, SOAP_WS_SECURITY_PATH, LEGACY_PATH]) {
                Some(uri) => Ok(Outcome::RedirectToUrl(uri)),
                None => Err(Error::NonActionableRedirectError(res.status, url.clone())),
            };
        }

        if res.status == 500 {
            return parse_fault_response(&res, url);
        }

        if !res.is_success() {
            return Err(Error::UnexpectedStatusError(res.status, url.clone()));
        }

        let outcome = match parse_envelope(&res.body)? {
            Envelope::Fault(err) => Outcome::Error(err),
            Envelope::Body {
                server_version,
                body,
            } => parse_settings_response(op, &body, identity, server_version)?,
        };

        trace!("{outcome:#?}");
        Ok(outcome)
    }
}

/// An HTTP 500 is only meaningful when it carries a SOAP fault.
fn parse_fault_response<S>(res: &HttpResponse, url: &Uri) -> Result<Outcome<S>> {
    match parse_envelope(&res.body) {
        Ok(Envelope::Fault(err)) => {
            debug!(%url, %err, "SOAP fault returned");
            Ok(Outcome::Error(err))
        }
        Ok(Envelope::Body { .. }) => Err(Error::UnexpectedStatusError(res.status, url.clone())),
        Err(err) => {
            debug!(%url, ?err, "cannot parse SOAP fault");
            Err(Error::UnexpectedStatusError(res.status, url.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::test;

    use super::*;
    use crate::outcome::RemoteError;

    struct OneShot {
        res: HttpResponse,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl OneShot {
        fn new(res: HttpResponse) -> Arc<Self> {
            Arc::new(Self {
                res,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for OneShot {
        async fn send(&self, req: HttpRequest) -> transport::Result<HttpResponse> {
            self.sent.lock().unwrap().push(req);
            Ok(self.res.clone())
        }
    }

    fn url() -> Uri {
        "https://autodiscover.example.com/autodiscover/autodiscover.svc"
            .parse()
            .unwrap()
    }

    fn client(transport: Arc<OneShot>) -> SoapClient {
        let config = AutodiscoverConfig {
            credentials: Some(crate::config::Credentials::Bearer {
                token: "token".into(),
            }),
            ..Default::default()
        };
        SoapClient::new(Arc::new(config), transport)
    }

    #[test_log::test(test)]
    async fn request_headers() {
        let transport = OneShot::new(HttpResponse::new(404));
        let err = client(transport.clone())
            .get_user_settings(
                &url(),
                "alice@example.com",
                &[UserSettingName::ExternalEwsUrl],
                ExchangeVersion::Exchange2010,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatusError(404, _)));

        let sent = transport.sent.lock().unwrap();
        let req = &sent[0];
        let header = |name: &str| {
            req.headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, val)| val.as_str())
        };
        assert_eq!(header("Authorization"), Some("Bearer token"));
        assert_eq!(
            header("SOAPAction"),
            Some("http://schemas.microsoft.com/exchange/2010/Autodiscover/Autodiscover/GetUserSettings"),
        );
    }

    #[test_log::test(test)]
    async fn fault_on_internal_server_error() {
        let fault = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
          <s:Body>
            <s:Fault>
              <s:Code><s:Value>s:Receiver</s:Value></s:Code>
              <s:Reason><s:Text xml:lang="en-US">Mailbox database is offline.</s:Text></s:Reason>
            </s:Fault>
          </s:Body>
        </s:Envelope>"#;

        let transport = OneShot::new(HttpResponse::new(500).with_body(fault));
        let outcome = client(transport)
            .get_domain_settings(
                &url(),
                "example.com",
                &[DomainSettingName::ExternalEwsUrl],
                ExchangeVersion::Exchange2013,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Error(RemoteError::new(
                "InternalServerError",
                "Mailbox database is offline."
            )),
        );

        let transport = OneShot::new(HttpResponse::new(500).with_body("<html/>"));
        let err = client(transport)
            .get_domain_settings(
                &url(),
                "example.com",
                &[DomainSettingName::ExternalEwsUrl],
                ExchangeVersion::Exchange2013,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatusError(500, _)));
    }

    #[test_log::test(test)]
    async fn http_redirections() {
        let res = HttpResponse::new(302).with_header(
            "Location",
            "https://mail.example.com/Autodiscover/Autodiscover.svc",
        );
        let outcome = client(OneShot::new(res))
            .get_user_settings(
                &url(),
                "alice@example.com",
                &[UserSettingName::ExternalEwsUrl],
                ExchangeVersion::Exchange2010,
            )
            .await
            .unwrap();
        let Outcome::RedirectToUrl(uri) = outcome else {
            panic!("expected URL redirection");
        };
        assert_eq!(uri.host(), Some("mail.example.com"));

        let res = HttpResponse::new(302).with_header("Location", "https://mail.example.com/owa/");
        let err = client(OneShot::new(res))
            .get_user_settings(
                &url(),
                "alice@example.com",
                &[UserSettingName::ExternalEwsUrl],
                ExchangeVersion::Exchange2010,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NonActionableRedirectError(302, _)));
    }
}
