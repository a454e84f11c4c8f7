//! # Autodiscover service
//!
//! This module contains the resolution engine. An
//! [`AutodiscoverService`] tries the candidate endpoints of a domain
//! in order, follows URL and address redirections within a shared
//! hop budget, then falls back to the plain HTTP redirection probe
//! and finally to the DNS SRV records of the domain.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use http::ureq::http::Uri;
use tracing::{debug, trace};

use crate::{
    config::{AutodiscoverConfig, ExchangeVersion},
    directory::{DirectoryLookup, NoDirectory},
    dns::{HickorySrvLookup, RandomTieBreaker, SrvLookup, SrvResolver, TieBreaker},
    identity::{
        default_hosts, is_https_with_path, legacy_http_url, legacy_https_url, parse_smtp_address,
        validate_domain, ResolutionTarget, LEGACY_PATH, SOAP_PATH, SOAP_WS_SECURITY_PATH,
    },
    legacy::LegacyClient,
    outcome::{Outcome, RemoteError},
    probe::{EndpointChoice, EndpointProbe},
    session::{HopBudget, SessionState},
    settings::{DomainSettingName, DomainSettings, UserSettingName, UserSettings},
    soap::SoapClient,
    transport::{HttpRequest, HttpTransport, Transport},
    Error, Result,
};

/// Callback deciding whether a URL obtained from an unauthenticated
/// source (plain HTTP redirection, DNS SRV record) can be used.
pub type RedirectionUrlValidator = Arc<dyn Fn(&Uri) -> bool + Send + Sync>;

/// The Autodiscover resolution engine.
///
/// The service holds the caller configuration and the endpoint
/// found by the last successful resolution: subsequent resolutions
/// go straight to that endpoint. Use a fresh service for one-shot
/// resolutions.
pub struct AutodiscoverService {
    config: Arc<AutodiscoverConfig>,
    transport: Arc<dyn Transport>,
    srv_lookup: Arc<dyn SrvLookup>,
    tie_breaker: Arc<dyn TieBreaker>,
    directory: Arc<dyn DirectoryLookup>,
    validator: RedirectionUrlValidator,
    target: ResolutionTarget,
    is_external: bool,
    enable_directory_lookup: bool,
    redirection_hops: u8,
}

impl AutodiscoverService {
    pub fn new(config: AutodiscoverConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(&config));
        let srv_lookup = Arc::new(HickorySrvLookup::new(config.dns_server));
        let enable_directory_lookup = config.enable_directory_lookup;

        Self {
            config: Arc::new(config),
            transport,
            srv_lookup,
            tie_breaker: Arc::new(RandomTieBreaker),
            directory: Arc::new(NoDirectory),
            validator: Arc::new(|_: &Uri| true),
            target: ResolutionTarget::default(),
            is_external: true,
            enable_directory_lookup,
            redirection_hops: 0,
        }
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    pub fn with_srv_lookup(mut self, lookup: impl SrvLookup + 'static) -> Self {
        self.srv_lookup = Arc::new(lookup);
        self
    }

    pub fn with_directory(mut self, directory: impl DirectoryLookup + 'static) -> Self {
        self.directory = Arc::new(directory);
        self
    }

    pub fn with_tie_breaker(mut self, tie_breaker: impl TieBreaker + 'static) -> Self {
        self.tie_breaker = Arc::new(tie_breaker);
        self
    }

    pub fn with_redirection_url_validator(
        mut self,
        validator: impl Fn(&Uri) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn config(&self) -> &AutodiscoverConfig {
        &self.config
    }

    /// The explicit or discovered URL of the Autodiscover endpoint.
    pub fn url(&self) -> Option<&Uri> {
        self.target.url()
    }

    /// The explicit domain, or the host of the explicit or discovered
    /// URL.
    pub fn domain(&self) -> Option<&str> {
        self.target.domain()
    }

    /// `false` only when the endpoint was found through the trusted
    /// directory.
    pub fn is_external(&self) -> bool {
        self.is_external
    }

    pub fn enable_directory_lookup(&self) -> bool {
        self.enable_directory_lookup
    }

    pub fn set_enable_directory_lookup(&mut self, enable: bool) {
        self.enable_directory_lookup = enable;
    }

    /// The number of redirection hops the last resolution consumed,
    /// whether it succeeded or not.
    pub fn redirection_hops(&self) -> u8 {
        self.redirection_hops
    }

    /// Pin the Autodiscover endpoint. The domain becomes the host of
    /// the URL.
    pub fn set_url(&mut self, url: &str) -> Result<()> {
        self.target = ResolutionTarget::from_url(url)?;
        Ok(())
    }

    /// Pin the domain candidates are built from. Clears any URL.
    pub fn set_domain(&mut self, domain: &str) -> Result<()> {
        self.target = ResolutionTarget::from_domain(domain)?;
        Ok(())
    }

    /// Resolve the given user settings using the configured server
    /// version.
    pub async fn get_user_settings(
        &mut self,
        addr: &str,
        requested: &[UserSettingName],
    ) -> Result<UserSettings> {
        let version = self.config.server_version;
        self.resolve_user_settings(addr, requested, version).await
    }

    /// Resolve the given user settings of the given SMTP address.
    ///
    /// Versions older than Exchange 2010 talk to legacy endpoints,
    /// newer ones probe hosts and talk to SOAP endpoints.
    pub async fn resolve_user_settings(
        &mut self,
        addr: &str,
        requested: &[UserSettingName],
        version: ExchangeVersion,
    ) -> Result<UserSettings> {
        let (_, domain) = parse_smtp_address(addr)?;

        if requested.is_empty() {
            return Err(Error::MissingRequestedSettingsError);
        }

        let addr = addr.trim().to_owned();
        let start = self.start(domain);
        let mut session = self.session();

        debug!(%addr, ?version, "resolving user settings");

        let res = if version.supports_soap() {
            let discovery = SoapUserDiscovery {
                endpoints: self.endpoints(),
                requested,
                version,
            };
            self.discover(&discovery, &mut session, addr, start).await
        } else {
            let discovery = LegacyUserDiscovery {
                client: LegacyClient::new(self.config.clone(), self.transport.clone()),
                requested,
            };
            self.discover(&discovery, &mut session, addr, start).await
        };

        self.redirection_hops = session.hops.used();
        let settings = res?;
        self.commit(session);
        Ok(settings)
    }

    /// Resolve the given domain settings using the configured server
    /// version.
    pub async fn get_domain_settings(
        &mut self,
        domain: &str,
        requested: &[DomainSettingName],
    ) -> Result<DomainSettings> {
        let version = self.config.server_version;
        self.resolve_domain_settings(domain, requested, version)
            .await
    }

    /// Resolve the given settings of the given domain. Only SOAP
    /// endpoints serve domain settings.
    pub async fn resolve_domain_settings(
        &mut self,
        domain: &str,
        requested: &[DomainSettingName],
        version: ExchangeVersion,
    ) -> Result<DomainSettings> {
        let domain = validate_domain(domain)?;

        if requested.is_empty() {
            return Err(Error::MissingRequestedSettingsError);
        }

        if !version.supports_soap() {
            return Err(Error::DomainSettingsRequireSoapError);
        }

        let start = self.start(domain.clone());
        let mut session = self.session();

        debug!(%domain, ?version, "resolving domain settings");

        let discovery = SoapDomainDiscovery {
            endpoints: self.endpoints(),
            requested,
            version,
        };
        let res = self.discover(&discovery, &mut session, domain, start).await;

        self.redirection_hops = session.hops.used();
        let settings = res?;

        self.commit(session);
        Ok(settings)
    }

    fn start(&self, domain: String) -> Start {
        match &self.target {
            ResolutionTarget::ExplicitUrl(url) => Start::Url(url.clone()),
            ResolutionTarget::ExplicitDomain(domain) => Start::Domain(domain.clone()),
            ResolutionTarget::AutoDetect => Start::Domain(domain),
        }
    }

    fn session(&self) -> SessionState {
        let mut session = SessionState::new(self.enable_directory_lookup);
        if let ResolutionTarget::ExplicitUrl(url) = &self.target {
            session.url = Some(url.clone());
            session.is_external = self.is_external;
        }
        session
    }

    fn commit(&mut self, session: SessionState) {
        if let Some(url) = session.url {
            debug!(%url, is_external = session.is_external, "autodiscover endpoint found");
            self.target = ResolutionTarget::ExplicitUrl(url);
        }
        self.is_external = session.is_external;
    }

    fn endpoints(&self) -> Endpoints {
        Endpoints {
            config: self.config.clone(),
            legacy: LegacyClient::new(self.config.clone(), self.transport.clone()),
            soap: SoapClient::new(self.config.clone(), self.transport.clone()),
            probe: EndpointProbe::new(self.config.clone(), self.transport.clone()),
        }
    }

    /// Run the resolution algorithm.
    ///
    /// Address redirections restart the algorithm for the domain of
    /// the new address, within the same session.
    async fn discover<D: Discovery>(
        &self,
        discovery: &D,
        session: &mut SessionState,
        mut identity: String,
        mut start: Start,
    ) -> Result<D::Settings> {
        let mut delayed: Option<RemoteError> = None;

        'restart: loop {
            let (mut candidates, mut fallbacks) = match &start {
                Start::Url(url) => (vec![Candidate::untrusted(url.clone())], Vec::new()),
                Start::Domain(domain) => {
                    let candidates = self.candidates(session, domain).await?;
                    let fallbacks = vec![
                        Fallback::Srv(domain.clone()),
                        Fallback::HttpRedirect(domain.clone()),
                    ];
                    (candidates, fallbacks)
                }
            };

            let mut i = 0;

            loop {
                while let Some(candidate) = candidates.get(i).cloned() {
                    debug!(
                        url = %candidate.url,
                        trusted = candidate.trusted,
                        %identity,
                        "trying autodiscover candidate"
                    );

                    let attempt = discovery
                        .attempt(&candidate.url, &identity, &mut session.hops)
                        .await?;

                    let (url, outcome) = match attempt {
                        Attempt::Answered(url, outcome) => (url, outcome),
                        Attempt::Failed => {
                            i += 1;
                            continue;
                        }
                    };

                    match outcome {
                        Outcome::Success(settings) => {
                            if candidate.trusted {
                                session.is_external = false;
                            }
                            session.url = Some(url);
                            return Ok(settings);
                        }
                        Outcome::RedirectToUrl(next) => {
                            session.hops.consume()?;
                            debug!(from = %url, to = %next, "following URL redirection");
                            candidates.insert(
                                i,
                                Candidate {
                                    url: next,
                                    trusted: candidate.trusted,
                                },
                            );
                        }
                        Outcome::RedirectToAddress(addr) => {
                            session.hops.consume()?;
                            match parse_smtp_address(&addr) {
                                Ok((_, domain)) => {
                                    debug!(
                                        from = %identity,
                                        to = %addr,
                                        "following address redirection"
                                    );
                                    session.record_redirection(&addr);
                                    identity = addr;
                                    start = Start::Domain(domain);
                                    continue 'restart;
                                }
                                Err(err) => {
                                    debug!(%addr, ?err, "ignoring invalid redirection address");
                                    i += 1;
                                }
                            }
                        }
                        Outcome::Error(err) if candidate.trusted => {
                            debug!(
                                %url,
                                %err,
                                "trusted endpoint returned an error, trying next candidate"
                            );
                            delayed = Some(err);
                            i += 1;
                        }
                        Outcome::Error(err) => {
                            debug!(%url, %err, "endpoint returned an error");
                            return Err(Error::AutodiscoverRemoteError(err));
                        }
                    }
                }

                let url = match fallbacks.pop() {
                    None => break 'restart,
                    Some(Fallback::HttpRedirect(domain)) => {
                        self.http_redirection_url(&domain).await
                    }
                    Some(Fallback::Srv(domain)) => self.srv_url(&domain).await,
                };

                if let Some(url) = url {
                    candidates.push(Candidate::untrusted(url));
                }
            }
        }

        match delayed {
            Some(err) => {
                debug!(%err, "all strategies exhausted, returning delayed error");
                Err(Error::AutodiscoverRemoteError(err))
            }
            None => {
                debug!("all strategies exhausted");
                Err(Error::ServiceNotLocated)
            }
        }
    }

    /// Build the candidate list of a domain: trusted directory
    /// entries first, then the well-known URLs.
    async fn candidates(&self, session: &SessionState, domain: &str) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        if session.enable_directory_lookup {
            let urls = self.directory.trusted_urls(domain).await;
            debug!(
                domain,
                count = urls.len(),
                "trusted directory entries found"
            );
            candidates.extend(urls.into_iter().map(Candidate::trusted));
        }

        for host in default_hosts(domain) {
            let url = legacy_https_url(&host)?;
            if !candidates.iter().any(|known| known.is(&url)) {
                candidates.push(Candidate::untrusted(url));
            }
        }

        if candidates.is_empty() {
            return Err(Error::MissingDomainOrUrlError);
        }

        trace!("{candidates:#?}");
        Ok(candidates)
    }

    /// Ask `http://autodiscover.<domain>` where the legacy endpoint
    /// lives. Only a redirection to the `https` legacy path counts.
    async fn http_redirection_url(&self, domain: &str) -> Option<Uri> {
        let url = legacy_http_url(&format!("autodiscover.{domain}")).ok()?;
        debug!(%url, "trying plain HTTP redirection");

        let req = HttpRequest::get(url.clone()).prepared(&self.config, false);
        let res = match self.transport.send(req).await {
            Ok(res) => res,
            Err(err) => {
                debug!(%url, ?err, "plain HTTP redirection failed");
                return None;
            }
        };

        let Some(redirect) = res.redirection(&[LEGACY_PATH]) else {
            debug!(%url, status = res.status, "no plain HTTP redirection");
            return None;
        };

        self.validate(redirect)
    }

    async fn srv_url(&self, domain: &str) -> Option<Uri> {
        let resolver = SrvResolver::new(self.srv_lookup.clone(), self.tie_breaker.clone());
        let host = resolver.find_host(domain).await?;
        let url = legacy_https_url(&host).ok()?;
        self.validate(url)
    }

    fn validate(&self, url: Uri) -> Option<Uri> {
        if (self.validator)(&url) {
            Some(url)
        } else {
            debug!(%url, "redirection URL rejected");
            None
        }
    }
}

impl fmt::Debug for AutodiscoverService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutodiscoverService")
            .field("config", &self.config)
            .field("target", &self.target)
            .field("is_external", &self.is_external)
            .field("enable_directory_lookup", &self.enable_directory_lookup)
            .field("redirection_hops", &self.redirection_hops)
            .finish_non_exhaustive()
    }
}

/// Where a resolution starts from.
enum Start {
    Url(Uri),
    Domain(String),
}

/// Strategies tried once the candidate list is exhausted, popped
/// from the end.
enum Fallback {
    HttpRedirect(String),
    Srv(String),
}

#[derive(Clone, Debug)]
struct Candidate {
    url: Uri,
    trusted: bool,
}

impl Candidate {
    fn trusted(url: Uri) -> Self {
        Self { url, trusted: true }
    }

    fn untrusted(url: Uri) -> Self {
        Self {
            url,
            trusted: false,
        }
    }

    /// URLs are compared case-insensitively.
    fn is(&self, url: &Uri) -> bool {
        self.url.to_string().eq_ignore_ascii_case(&url.to_string())
    }
}

/// The result of one candidate attempt.
enum Attempt<S> {
    /// The endpoint at the given URL answered.
    Answered(Uri, Outcome<S>),
    /// The candidate could not be used. The reason is logged.
    Failed,
}

impl<S> Attempt<S> {
    fn from_result<E: fmt::Debug>(url: &Uri, res: std::result::Result<Outcome<S>, E>) -> Self {
        match res {
            Ok(outcome) => Self::Answered(url.clone(), outcome),
            Err(err) => {
                debug!(%url, ?err, "autodiscover endpoint failed, trying next candidate");
                Self::Failed
            }
        }
    }
}

/// One flavor of resolution: what to send to a candidate.
#[async_trait]
trait Discovery: Send + Sync {
    type Settings: Send;

    async fn attempt(
        &self,
        url: &Uri,
        identity: &str,
        hops: &mut HopBudget,
    ) -> Result<Attempt<Self::Settings>>;
}

struct LegacyUserDiscovery<'a> {
    client: LegacyClient,
    requested: &'a [UserSettingName],
}

#[async_trait]
impl<'a> Discovery for LegacyUserDiscovery<'a> {
    type Settings = UserSettings;

    async fn attempt(
        &self,
        url: &Uri,
        identity: &str,
        _hops: &mut HopBudget,
    ) -> Result<Attempt<UserSettings>> {
        let res = self.client.execute(url, identity, self.requested).await;
        Ok(Attempt::from_result(url, res))
    }
}

/// Clients used by SOAP resolutions.
struct Endpoints {
    config: Arc<AutodiscoverConfig>,
    legacy: LegacyClient,
    soap: SoapClient,
    probe: EndpointProbe,
}

impl Endpoints {
    /// Find the endpoint to talk to behind a candidate URL.
    ///
    /// SOAP URLs are used as they are. Other URLs designate a host
    /// whose endpoints are probed.
    async fn endpoint(&self, url: &Uri, hops: &mut HopBudget) -> Result<Option<EndpointChoice>> {
        if is_https_with_path(url, &[SOAP_PATH]) {
            return Ok(Some(EndpointChoice::Soap(url.clone())));
        }

        if is_https_with_path(url, &[SOAP_WS_SECURITY_PATH]) {
            return Ok(Some(EndpointChoice::WsSecurity(url.clone())));
        }

        let Some(authority) = url.authority() else {
            return Ok(None);
        };

        let Some((host, flags)) = self.probe.probe(authority.as_str(), hops).await? else {
            return Ok(None);
        };

        match EndpointChoice::select(&host, flags, self.config.credentials.as_ref()) {
            Ok(choice) => Ok(Some(choice)),
            Err(err) => {
                debug!(%host, ?err, "cannot select autodiscover endpoint");
                Ok(None)
            }
        }
    }
}

struct SoapUserDiscovery<'a> {
    endpoints: Endpoints,
    requested: &'a [UserSettingName],
    version: ExchangeVersion,
}

#[async_trait]
impl<'a> Discovery for SoapUserDiscovery<'a> {
    type Settings = UserSettings;

    async fn attempt(
        &self,
        url: &Uri,
        identity: &str,
        hops: &mut HopBudget,
    ) -> Result<Attempt<UserSettings>> {
        let Some(endpoint) = self.endpoints.endpoint(url, hops).await? else {
            return Ok(Attempt::Failed);
        };

        let attempt = match &endpoint {
            EndpointChoice::Soap(url) | EndpointChoice::WsSecurity(url) => {
                let res = self
                    .endpoints
                    .soap
                    .get_user_settings(url, identity, self.requested, self.version)
                    .await;
                Attempt::from_result(url, res)
            }
            EndpointChoice::Legacy(url) => {
                debug!(%url, "host only exposes the legacy endpoint");
                let res = self
                    .endpoints
                    .legacy
                    .execute(url, identity, self.requested)
                    .await;
                Attempt::from_result(url, res)
            }
        };

        Ok(attempt)
    }
}

struct SoapDomainDiscovery<'a> {
    endpoints: Endpoints,
    requested: &'a [DomainSettingName],
    version: ExchangeVersion,
}

#[async_trait]
impl<'a> Discovery for SoapDomainDiscovery<'a> {
    type Settings = DomainSettings;

    async fn attempt(
        &self,
        url: &Uri,
        identity: &str,
        hops: &mut HopBudget,
    ) -> Result<Attempt<DomainSettings>> {
        let url = match self.endpoints.endpoint(url, hops).await? {
            Some(EndpointChoice::Soap(url) | EndpointChoice::WsSecurity(url)) => url,
            Some(EndpointChoice::Legacy(url)) => {
                debug!(%url, "legacy endpoints cannot serve domain settings, skipping host");
                return Ok(Attempt::Failed);
            }
            None => return Ok(Attempt::Failed),
        };

        let res = self
            .endpoints
            .soap
            .get_domain_settings(&url, identity, self.requested, self.version)
            .await;

        Ok(match Attempt::from_result(&url, res) {
            Attempt::Answered(url, Outcome::RedirectToAddress(addr)) => {
                debug!(%url, %addr, "ignoring address redirection for domain settings");
                Attempt::Failed
            }
            attempt => attempt,
        })
    }
}
