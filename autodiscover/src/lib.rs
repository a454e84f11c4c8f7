#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod directory;
pub mod dns;
mod error;
pub mod identity;
pub mod legacy;
pub mod outcome;
pub mod probe;
pub mod service;
pub mod session;
pub mod settings;
pub mod soap;
pub mod transport;
pub mod xml;

#[doc(inline)]
pub use http::ureq::http::Uri;

#[doc(inline)]
pub use crate::{
    config::{AutodiscoverConfig, Credentials, ExchangeVersion},
    directory::{DirectoryLookup, NoDirectory, StaticDirectory},
    dns::{DnsSrvRecord, SrvLookup, SrvResolver, TieBreaker},
    error::{Error, Result},
    outcome::{Outcome, RemoteError},
    service::AutodiscoverService,
    settings::{
        DomainSettingName, DomainSettings, ErrorCode, SettingError, SettingValue, Settings,
        UserSettingName, UserSettings,
    },
    transport::{HttpRequest, HttpResponse, Transport},
};

#[cfg(not(feature = "tokio"))]
compile_error!("Feature `tokio` must be enabled for this crate.");

#[cfg(any(
    all(feature = "rustls", feature = "native-tls"),
    not(any(feature = "rustls", feature = "native-tls"))
))]
compile_error!("Either feature `rustls` or `native-tls` must be enabled for this crate.");
