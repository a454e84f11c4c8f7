//! # Trusted directory
//!
//! Enterprise deployments publish Autodiscover URLs in their
//! directory (service connection points). URLs coming from there are
//! trusted: they are tried first, their errors are not fatal and a
//! success from one of them marks the endpoint as internal.

use async_trait::async_trait;
use http::ureq::http::Uri;

/// Lookup of trusted Autodiscover URLs for a domain.
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    async fn trusted_urls(&self, domain: &str) -> Vec<Uri>;
}

/// A [`DirectoryLookup`] without any directory.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDirectory;

#[async_trait]
impl DirectoryLookup for NoDirectory {
    async fn trusted_urls(&self, _domain: &str) -> Vec<Uri> {
        Vec::new()
    }
}

/// A [`DirectoryLookup`] returning a fixed list of URLs whatever the
/// domain.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory(pub Vec<Uri>);

#[async_trait]
impl DirectoryLookup for StaticDirectory {
    async fn trusted_urls(&self, _domain: &str) -> Vec<Uri> {
        self.0.clone()
    }
}
