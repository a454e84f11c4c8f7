//! # Settings
//!
//! This module contains the typed catalog of requestable settings,
//! the values an Autodiscover endpoint can return for them and the
//! [`Settings`] map handed back to callers.

use std::collections::BTreeMap;

use strum::{AsRefStr, Display, EnumString};

/// The name of a user setting.
///
/// The string representation is the name used on the wire.
#[derive(
    AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
pub enum UserSettingName {
    UserDisplayName,
    #[strum(serialize = "UserDN")]
    UserDn,
    UserDeploymentId,
    #[strum(serialize = "AutoDiscoverSMTPAddress")]
    AutoDiscoverSmtpAddress,
    InternalMailboxServer,
    InternalRpcClientServer,
    #[strum(serialize = "InternalMailboxServerDN")]
    InternalMailboxServerDn,
    InternalWebClientUrls,
    InternalEcpUrl,
    InternalEwsUrl,
    #[strum(serialize = "InternalOABUrl")]
    InternalOabUrl,
    #[strum(serialize = "InternalUMUrl")]
    InternalUmUrl,
    InternalPop3Connections,
    InternalImap4Connections,
    InternalSmtpConnections,
    ExternalMailboxServer,
    #[strum(serialize = "ExternalMailboxServerRequiresSSL")]
    ExternalMailboxServerRequiresSsl,
    ExternalMailboxServerAuthenticationMethods,
    ExternalWebClientUrls,
    ExternalEcpUrl,
    ExternalEwsUrl,
    #[strum(serialize = "ExternalOABUrl")]
    ExternalOabUrl,
    #[strum(serialize = "ExternalUMUrl")]
    ExternalUmUrl,
    ExternalEwsVersion,
    ExternalPop3Connections,
    ExternalImap4Connections,
    ExternalSmtpConnections,
    CasVersion,
    EwsSupportedSchemas,
    ActiveDirectoryServer,
    #[strum(serialize = "MailboxDN")]
    MailboxDn,
    PublicFolderServer,
    AlternateMailboxes,
    MobileMailboxPolicy,
    GroupingInformation,
}

/// The name of a domain setting.
#[derive(
    AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
pub enum DomainSettingName {
    ExternalEwsUrl,
    ExternalEwsVersion,
}

/// Error codes used by Autodiscover responses, at response, identity
/// and setting level.
#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, Hash, PartialEq)]
pub enum ErrorCode {
    NoError,
    RedirectAddress,
    RedirectUrl,
    InvalidUser,
    InvalidRequest,
    InvalidSetting,
    SettingIsNotAvailable,
    ServerBusy,
    InvalidDomain,
    NotFederated,
    InternalServerError,
}

/// A web client (OWA) URL together with the authentication methods
/// it accepts.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WebClientUrl {
    pub authentication_methods: String,
    pub url: String,
}

/// A POP3, IMAP4 or SMTP connection endpoint.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProtocolConnection {
    pub encryption_method: String,
    pub hostname: String,
    pub port: u16,
}

/// A mailbox the user has access to besides their own.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AlternateMailbox {
    pub r#type: String,
    pub display_name: String,
    pub legacy_dn: String,
    pub server: String,
    pub smtp_address: String,
    pub owner_smtp_address: String,
}

/// The value of a setting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SettingValue {
    String(String),
    WebClientUrls(Vec<WebClientUrl>),
    ProtocolConnections(Vec<ProtocolConnection>),
    AlternateMailboxes(Vec<AlternateMailbox>),
}

impl SettingValue {
    /// Return the inner string if the value is a plain string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// A requested setting that could not be returned.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SettingError {
    pub code: ErrorCode,
    pub message: String,
    pub setting_name: String,
}

/// Version information of the server that answered a SOAP request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerVersionInfo {
    pub major_version: Option<u32>,
    pub minor_version: Option<u32>,
    pub major_build_number: Option<u32>,
    pub minor_build_number: Option<u32>,
    pub version: Option<String>,
}

/// Settings returned for one identity.
///
/// Requested settings the endpoint could not provide are listed in
/// [`Settings::errors`] rather than silently dropped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Settings<N: Ord> {
    /// The SMTP address or the domain the settings belong to.
    pub identity: String,
    pub settings: BTreeMap<N, SettingValue>,
    pub errors: Vec<SettingError>,
    pub server_version: Option<ServerVersionInfo>,
}

/// Settings returned for a user.
pub type UserSettings = Settings<UserSettingName>;

/// Settings returned for a domain.
pub type DomainSettings = Settings<DomainSettingName>;

impl<N: Ord + Copy + AsRef<str>> Settings<N> {
    pub fn new(identity: impl ToString) -> Self {
        Self {
            identity: identity.to_string(),
            settings: BTreeMap::new(),
            errors: Vec::new(),
            server_version: None,
        }
    }

    pub fn get(&self, name: &N) -> Option<&SettingValue> {
        self.settings.get(name)
    }

    pub fn get_str(&self, name: &N) -> Option<&str> {
        self.get(name).and_then(SettingValue::as_str)
    }

    /// Keep only the requested settings, and report every requested
    /// setting that is missing as not available.
    pub fn restrict_to(mut self, requested: &[N]) -> Self {
        self.settings.retain(|name, _| requested.contains(name));

        for name in requested {
            let reported = self
                .errors
                .iter()
                .any(|err| err.setting_name == name.as_ref());

            if !self.settings.contains_key(name) && !reported {
                self.errors.push(SettingError {
                    code: ErrorCode::SettingIsNotAvailable,
                    message: format!("setting {} is not available", name.as_ref()),
                    setting_name: name.as_ref().to_owned(),
                });
            }
        }

        self
    }
}
