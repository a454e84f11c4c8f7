#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![doc = include_str!("../README.md")]

mod error;

use std::time::Duration;

use tracing::trace;
pub use ureq;
use ureq::{
    config::Config,
    tls::{RootCerts, TlsConfig, TlsProvider},
    Agent,
};

#[doc(inline)]
pub use crate::error::{Error, Result};

#[cfg(not(feature = "tokio"))]
compile_error!("Feature `tokio` must be enabled for this crate.");

#[cfg(any(
    all(feature = "rustls", feature = "native-tls"),
    not(any(feature = "rustls", feature = "native-tls"))
))]
compile_error!("Either feature `rustls` or `native-tls` must be enabled for this crate.");

/// The HTTP client structure.
///
/// This structure wraps a HTTP agent, which is used by the
/// [`Client::send`] function. The agent never follows redirections
/// and hands back non-2xx responses as regular responses.
#[derive(Clone, Debug)]
pub struct Client {
    /// The HTTP agent used to perform calls.
    agent: Agent,
}

impl Client {
    /// Creates a new HTTP client with sane defaults.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a new HTTP client whose requests give up after the
    /// given duration.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Self {
        let tls = TlsConfig::builder()
            .root_certs(RootCerts::PlatformVerifier)
            .provider(
                #[cfg(feature = "native-tls")]
                TlsProvider::NativeTls,
                #[cfg(feature = "rustls")]
                TlsProvider::Rustls,
            );

        let config = Config::builder()
            .tls_config(tls.build())
            .max_redirects(0)
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();

        trace!(?timeout, "built HTTP agent without redirections");
        let agent = config.new_agent();

        Self { agent }
    }

    /// Sends a request.
    ///
    /// This function takes a callback that tells how the request
    /// looks like and what to extract from the response. It takes a
    /// reference to the inner HTTP agent as parameter and runs on a
    /// blocking thread.
    pub async fn send<T>(
        &self,
        f: impl FnOnce(&Agent) -> std::result::Result<T, ureq::Error> + Send + 'static,
    ) -> Result<T>
    where
        T: Send + 'static,
    {
        let agent = self.agent.clone();

        spawn_blocking(move || f(&agent))
            .await?
            .map_err(Error::SendRequestError)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns a blocking task using [`tokio`].
async fn spawn_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}
