//! # Transport
//!
//! Module dedicated to the HTTP seam of the library. Discovery
//! clients only talk to a [`Transport`], which sends one request and
//! hands back the raw response without following redirections.
//! [`HttpTransport`] is the default implementation, based on the
//! `http-lib` client.

use std::{io, str::FromStr};

use async_trait::async_trait;
use http::{
    ureq::http::{HeaderName, HeaderValue, Uri},
    Client as HttpClient,
};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{config::AutodiscoverConfig, identity::is_https_with_path};

/// The `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// A failure to get a response from an endpoint.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot send {0} request to {1}")]
    SendRequestError(Method, Uri, #[source] http::Error),
    #[error("cannot reach {1}")]
    IoError(#[source] io::Error, Uri),
}

impl Error {
    /// Connection-level failures stay distinguishable from protocol
    /// failures.
    fn from_client(method: Method, uri: Uri, err: http::Error) -> Self {
        match err {
            http::Error::SendRequestError(http::ureq::Error::Io(err)) => Self::IoError(err, uri),
            err => Self::SendRequestError(method, uri, err),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// A request sent by a discovery client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(uri: Uri) -> Self {
        Self {
            method: Method::Get,
            uri,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(uri: Uri, body: impl ToString) -> Self {
        Self {
            method: Method::Post,
            uri,
            headers: Vec::new(),
            body: Some(body.to_string()),
        }
    }

    pub fn with_header(mut self, name: impl ToString, value: impl ToString) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Add the `User-Agent` header and, if `authenticated`, the
    /// `Authorization` header derived from the configured
    /// credentials.
    pub fn prepared(mut self, config: &AutodiscoverConfig, authenticated: bool) -> Self {
        self = self.with_header("User-Agent", config.user_agent());

        if authenticated {
            if let Some(creds) = &config.credentials {
                self = self.with_header("Authorization", creds.authorization());
            }
        }

        self
    }
}

/// A response received by a discovery client.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl ToString) -> Self {
        self.headers
            .push((name.as_ref().to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl ToString) -> Self {
        self.body = body.to_string();
        self
    }

    /// Get the first header matching the given name,
    /// case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, val)| val.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirection(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307)
    }

    /// Return the redirection target if the response is an
    /// actionable redirection: a redirect status with a parseable
    /// `https` `Location` pointing to one of the given paths.
    pub fn redirection(&self, paths: &[&str]) -> Option<Uri> {
        if !self.is_redirection() {
            return None;
        }

        let location = self.header("location").filter(|l| !l.trim().is_empty())?;

        let uri = match Uri::from_str(location.trim()) {
            Ok(uri) => uri,
            Err(err) => {
                debug!(location, ?err, "invalid redirection URL returned");
                return None;
            }
        };

        if is_https_with_path(&uri, paths) {
            debug!(%uri, "redirection URL found");
            Some(uri)
        } else {
            debug!(%uri, "ignoring redirection to unexpected scheme or path");
            None
        }
    }
}

/// Send one HTTP request and return the raw response.
///
/// Implementations must not follow redirections and must return
/// non-2xx responses as regular responses.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse>;
}

/// The default [`Transport`], based on the `http-lib` client.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: HttpClient,
}

impl HttpTransport {
    pub fn new(config: &AutodiscoverConfig) -> Self {
        let client = match config.timeout {
            Some(timeout) => HttpClient::with_timeout(timeout),
            None => HttpClient::new(),
        };

        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        let method = req.method;
        let uri = req.uri.clone();
        debug!(%method, %uri, "sending request");

        let res = self
            .client
            .send(move |agent| {
                let res = match req.method {
                    Method::Get => {
                        let mut builder = agent.get(req.uri);
                        for (key, val) in &req.headers {
                            builder = builder.header(key.as_str(), val.as_str());
                        }
                        builder.call()?
                    }
                    Method::Post => {
                        let mut builder = agent.post(req.uri);
                        for (key, val) in &req.headers {
                            builder = builder.header(key.as_str(), val.as_str());
                        }
                        builder.send(req.body.unwrap_or_default())?
                    }
                };

                let status = res.status().as_u16();
                let headers = res
                    .headers()
                    .iter()
                    .filter_map(|(key, val): (&HeaderName, &HeaderValue)| {
                        let val = val.to_str().ok()?;
                        Some((key.as_str().to_ascii_lowercase(), val.to_owned()))
                    })
                    .collect();
                let body = res.into_body().read_to_string()?;

                Ok(HttpResponse {
                    status,
                    headers,
                    body,
                })
            })
            .await
            .map_err(|err| Error::from_client(method, uri.clone(), err))?;

        debug!(%uri, status = res.status, "received response");
        trace!("{}", res.body);

        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LEGACY_PATH;

    #[test]
    fn actionable_redirections() {
        for status in [301, 302, 303, 307] {
            let res = HttpResponse::new(status).with_header(
                "Location",
                "https://mail.example.com/autodiscover/autodiscover.xml",
            );
            assert_eq!(
                res.redirection(&[LEGACY_PATH]).unwrap().host(),
                Some("mail.example.com"),
            );
        }

        let res = HttpResponse::new(308).with_header(
            "Location",
            "https://mail.example.com/autodiscover/autodiscover.xml",
        );
        assert_eq!(res.redirection(&[LEGACY_PATH]), None);
    }

    #[test]
    fn non_actionable_redirections() {
        let res = HttpResponse::new(302);
        assert_eq!(res.redirection(&[LEGACY_PATH]), None);

        let res = HttpResponse::new(302).with_header("Location", "not a uri");
        assert_eq!(res.redirection(&[LEGACY_PATH]), None);

        let res = HttpResponse::new(302).with_header(
            "Location",
            "http://mail.example.com/autodiscover/autodiscover.xml",
        );
        assert_eq!(res.redirection(&[LEGACY_PATH]), None);

        let res = HttpResponse::new(302).with_header("Location", "https://mail.example.com/owa/");
        assert_eq!(res.redirection(&[LEGACY_PATH]), None);
    }

    #[test]
    fn client_errors() {
        let uri = Uri::from_static("https://example.com/autodiscover/autodiscover.xml");

        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = http::Error::SendRequestError(http::ureq::Error::Io(err));
        let err = Error::from_client(Method::Post, uri.clone(), err);
        let Error::IoError(err, _) = err else {
            panic!("expected I/O error, got {err:?}");
        };
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);

        let err = http::Error::SendRequestError(http::ureq::Error::ConnectionFailed);
        let err = Error::from_client(Method::Get, uri, err);
        assert!(matches!(err, Error::SendRequestError(Method::Get, _, _)));
    }
}
