//! # DNS SRV discovery
//!
//! This module contains everything needed to find an Autodiscover
//! host using the `_autodiscover._tcp` SRV records of a domain.

use std::{cmp::Ordering, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use hickory_resolver::{
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    error::ResolveError,
    TokioAsyncResolver,
};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, trace};

/// The only port Autodiscover SRV records are honored for.
pub const SSL_PORT: u16 = 443;

/// The `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// A failed SRV query. Never fatal: discovery treats it as no
/// answer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot lookup SRV records of {1}")]
    LookUpSrvError(#[source] ResolveError, String),
}

/// A SRV record, independent from the resolver that produced it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DnsSrvRecord {
    pub target: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

impl DnsSrvRecord {
    pub fn new(target: impl ToString, port: u16, priority: u16, weight: u16) -> Self {
        Self {
            target: target.to_string(),
            port,
            priority,
            weight,
        }
    }
}

// Lower priority first, then lower weight.
impl Ord for DnsSrvRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.weight.cmp(&other.weight))
            .then_with(|| self.target.cmp(&other.target))
            .then_with(|| self.port.cmp(&other.port))
    }
}

impl PartialOrd for DnsSrvRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Query the SRV records of a fully qualified name.
///
/// Implementations return records sorted by priority then weight.
#[async_trait]
pub trait SrvLookup: Send + Sync {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<DnsSrvRecord>>;
}

/// The default [`SrvLookup`], based on the tokio async resolver.
pub struct HickorySrvLookup {
    resolver: TokioAsyncResolver,
}

impl HickorySrvLookup {
    /// Create a lookup using the system configuration, or the given
    /// name server.
    pub fn new(dns_server: Option<SocketAddr>) -> Self {
        let resolver = match dns_server {
            Some(addr) => {
                let servers =
                    NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
                let config = ResolverConfig::from_parts(None, vec![], servers);
                TokioAsyncResolver::tokio(config, ResolverOpts::default())
            }
            None => TokioAsyncResolver::tokio(Default::default(), Default::default()),
        };

        Self { resolver }
    }
}

impl Default for HickorySrvLookup {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl SrvLookup for HickorySrvLookup {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<DnsSrvRecord>> {
        let mut records: Vec<DnsSrvRecord> = self
            .resolver
            .srv_lookup(name)
            .await
            .map_err(|err| Error::LookUpSrvError(err, name.to_owned()))?
            .iter()
            .map(|record| {
                DnsSrvRecord::new(
                    record.target(),
                    record.port(),
                    record.priority(),
                    record.weight(),
                )
            })
            .collect();

        records.sort();

        debug!("{name}: discovered {} SRV record(s)", records.len());
        trace!("{records:#?}");

        Ok(records)
    }
}

/// Pick one index among `len` equally good candidates.
pub trait TieBreaker: Send + Sync {
    fn pick(&self, len: usize) -> usize;
}

impl<F: Fn(usize) -> usize + Send + Sync> TieBreaker for F {
    fn pick(&self, len: usize) -> usize {
        self(len)
    }
}

/// The default [`TieBreaker`], picking uniformly at random.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomTieBreaker;

impl TieBreaker for RandomTieBreaker {
    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            0
        } else {
            rand::thread_rng().gen_range(0..len)
        }
    }
}

/// Find the best Autodiscover host of a domain.
#[derive(Clone)]
pub struct SrvResolver {
    lookup: Arc<dyn SrvLookup>,
    tie_breaker: Arc<dyn TieBreaker>,
}

impl SrvResolver {
    pub fn new(lookup: Arc<dyn SrvLookup>, tie_breaker: Arc<dyn TieBreaker>) -> Self {
        Self {
            lookup,
            tie_breaker,
        }
    }

    /// Query `_autodiscover._tcp.<domain>` and return the target of
    /// the best SSL record, without trailing dot.
    pub async fn find_host(&self, domain: &str) -> Option<String> {
        let name = format!("_autodiscover._tcp.{domain}");
        debug!(%name, "looking up autodiscover SRV records");

        let records = match self.lookup.lookup_srv(&name).await {
            Ok(records) => records,
            Err(err) => {
                debug!(?err, "SRV lookup failed, considering it as no answer");
                return None;
            }
        };

        let host = self.select(records)?;
        debug!(%name, %host, "best SRV record found");
        Some(host)
    }

    /// Select the best SSL record: minimum priority, then minimum
    /// weight among them, ties broken by the tie-breaker.
    pub fn select(&self, records: Vec<DnsSrvRecord>) -> Option<String> {
        let records: Vec<_> = records
            .into_iter()
            .filter(|record| record.port == SSL_PORT)
            .collect();

        let priority = records.iter().map(|record| record.priority).min()?;
        let weight = records
            .iter()
            .filter(|record| record.priority == priority)
            .map(|record| record.weight)
            .min()?;

        let mut best: Vec<_> = records
            .into_iter()
            .filter(|record| record.priority == priority && record.weight == weight)
            .collect();

        let index = match best.len() {
            1 => 0,
            len => {
                let index = self.tie_breaker.pick(len);
                trace!(len, index, "breaking SRV tie");
                index.min(len - 1)
            }
        };

        let host = best.swap_remove(index).target;
        let host = host.trim_end_matches('.');

        if host.is_empty() {
            None
        } else {
            Some(host.to_owned())
        }
    }
}

impl Default for SrvResolver {
    fn default() -> Self {
        Self::new(
            Arc::new(HickorySrvLookup::default()),
            Arc::new(RandomTieBreaker),
        )
    }
}
