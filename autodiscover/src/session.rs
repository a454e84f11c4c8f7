//! # Session
//!
//! Module dedicated to the mutable state of one logical resolution:
//! the hop budget, the redirection log and the service state that is
//! committed back to the service on success.

use std::collections::HashSet;

use http::ureq::http::Uri;
use tracing::debug;

use crate::{Error, Result};

/// Maximum number of redirections followed within one resolution.
pub const MAX_REDIRECTION_HOPS: u8 = 10;

/// A bounded redirection counter shared by URL redirections, address
/// redirections and probe redirections.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HopBudget {
    used: u8,
    max: u8,
}

impl HopBudget {
    pub fn new(max: u8) -> Self {
        Self { used: 0, max }
    }

    pub fn used(&self) -> u8 {
        self.used
    }

    /// Consume one hop, or fail with
    /// [`Error::MaxRedirectionHopsExceeded`] once the budget is
    /// spent.
    pub fn consume(&mut self) -> Result<()> {
        if self.used >= self.max {
            debug!(
                max = self.max,
                "maximum number of redirection hops exceeded"
            );
            return Err(Error::MaxRedirectionHopsExceeded(self.max));
        }

        self.used += 1;
        Ok(())
    }
}

impl Default for HopBudget {
    fn default() -> Self {
        Self::new(MAX_REDIRECTION_HOPS)
    }
}

/// The SMTP addresses already visited through address redirections,
/// lower-cased.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RedirectionLog(HashSet<String>);

impl RedirectionLog {
    /// Record the address. Return `false` if it was already visited.
    pub fn insert(&mut self, addr: &str) -> bool {
        self.0.insert(addr.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// State owned by one resolution call.
#[derive(Clone, Debug)]
pub struct SessionState {
    pub hops: HopBudget,
    pub redirections: RedirectionLog,
    /// The URL of the endpoint that answered successfully.
    pub url: Option<Uri>,
    /// Optimistically `true`, flipped only when a trusted candidate
    /// answers.
    pub is_external: bool,
    pub enable_directory_lookup: bool,
}

impl SessionState {
    pub fn new(enable_directory_lookup: bool) -> Self {
        Self {
            hops: HopBudget::default(),
            redirections: RedirectionLog::default(),
            url: None,
            is_external: true,
            enable_directory_lookup,
        }
    }

    /// Record an address redirection. A repeated address hints at a
    /// loop between directory entries, so directory lookups are
    /// disabled for the rest of the session.
    pub fn record_redirection(&mut self, addr: &str) {
        if !self.redirections.insert(addr) && self.enable_directory_lookup {
            debug!(addr, "address already visited, disabling directory lookup");
            self.enable_directory_lookup = false;
        }
    }
}
