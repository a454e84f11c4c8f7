//! # Legacy discovery client
//!
//! This module contains the client of the legacy POX ("plain old
//! XML") Autodiscover endpoint, `/autodiscover/autodiscover.xml`.
//! The endpoint answers a POST carrying the email address with
//! either the account settings, a redirection to another URL, a
//! redirection to another address or an error.

use std::sync::Arc;

use http::ureq::http::Uri;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    config::AutodiscoverConfig,
    identity::LEGACY_PATH,
    outcome::{Outcome, RemoteError},
    settings::{AlternateMailbox, SettingValue, UserSettingName, UserSettings, WebClientUrl},
    transport::{self, HttpRequest, Transport},
    xml::{self, Element, XmlWriter, NO_ATTRIBUTES},
};

/// Namespace of the legacy request.
pub const REQUEST_NS: &str =
    "http://schemas.microsoft.com/exchange/autodiscover/outlook/requestschema/2006";

/// The response schema the client accepts.
pub const RESPONSE_SCHEMA: &str =
    "http://schemas.microsoft.com/exchange/autodiscover/outlook/responseschema/2006a";

/// The `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// A non-fatal failure of a legacy endpoint.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    TransportError(#[from] transport::Error),
    #[error("cannot parse legacy autodiscover response")]
    ParseResponseError(#[from] xml::Error),
    #[error("legacy endpoint {1} returned unexpected HTTP status {0}")]
    UnexpectedStatusError(u16, Uri),
    #[error("legacy endpoint {1} returned a non-actionable redirection (HTTP {0})")]
    NonActionableRedirectError(u16, Uri),
    #[error("legacy endpoint returned an invalid redirection URL {0}")]
    InvalidRedirectUrlError(String),
}

/// Client of legacy Autodiscover endpoints.
#[derive(Clone)]
pub struct LegacyClient {
    config: Arc<AutodiscoverConfig>,
    transport: Arc<dyn Transport>,
}

impl LegacyClient {
    pub fn new(config: Arc<AutodiscoverConfig>, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Ask the legacy endpoint at the given URL for the settings of
    /// the given address, restricted to the requested settings.
    pub async fn execute(
        &self,
        url: &Uri,
        addr: &str,
        requested: &[UserSettingName],
    ) -> Result<Outcome<UserSettings>> {
        debug!(%url, addr, "requesting legacy autodiscover settings");

        let req = HttpRequest::post(url.clone(), build_request(addr)?)
            .with_header("Content-Type", "text/xml; charset=utf-8")
            .prepared(&self.config, true);
        let res = self.transport.send(req).await?;

        if res.is_redirection() {
            return match res.redirection(&[LEGACY_PATH]) {
                Some(uri) => Ok(Outcome::RedirectToUrl(uri)),
                None => Err(Error::NonActionableRedirectError(res.status, url.clone())),
            };
        }

        if !res.is_success() {
            return Err(Error::UnexpectedStatusError(res.status, url.clone()));
        }

        let outcome = parse_response(&res.body, addr)?;
        trace!("{outcome:#?}");

        Ok(match outcome {
            Outcome::Success(settings) => Outcome::Success(settings.restrict_to(requested)),
            outcome => outcome,
        })
    }
}

/// Build the body of a legacy request.
pub fn build_request(addr: &str) -> xml::Result<String> {
    let mut writer = XmlWriter::new()?;
    writer
        .start("Autodiscover", [("xmlns", REQUEST_NS)])?
        .start("Request", NO_ATTRIBUTES)?
        .text_element("EMailAddress", addr)?
        .text_element("AcceptableResponseSchema", RESPONSE_SCHEMA)?
        .end("Request")?
        .end("Autodiscover")?;
    Ok(writer.into_string())
}

/// Parse the body of a legacy response into an [`Outcome`].
pub fn parse_response(body: &str, addr: &str) -> Result<Outcome<UserSettings>> {
    let root = Element::parse(body)?;

    if !root.name.eq_ignore_ascii_case("Autodiscover") {
        return Err(xml::Error::UnexpectedRootError(root.name, "Autodiscover").into());
    }

    let res = root
        .child("Response")
        .ok_or(xml::Error::MissingElementError("Response"))?;

    if let Some(err) = res.child("Error") {
        return Ok(Outcome::Error(parse_error(err)));
    }

    let account = res
        .child("Account")
        .ok_or(xml::Error::MissingElementError("Account"))?;

    if let Some(err) = account.child("Error") {
        return Ok(Outcome::Error(parse_error(err)));
    }

    let action = account.child_text("Action").unwrap_or("settings");

    if action.eq_ignore_ascii_case("redirectAddr") {
        let target = account
            .child_text("RedirectAddr")
            .ok_or(xml::Error::MissingElementError("RedirectAddr"))?;
        return Ok(Outcome::RedirectToAddress(target.to_owned()));
    }

    if action.eq_ignore_ascii_case("redirectUrl") {
        let target = account
            .child_text("RedirectUrl")
            .ok_or(xml::Error::MissingElementError("RedirectUrl"))?;
        let uri = target
            .parse::<Uri>()
            .ok()
            .filter(|uri| {
                uri.scheme_str()
                    .is_some_and(|s| s.eq_ignore_ascii_case("https"))
            })
            .ok_or_else(|| Error::InvalidRedirectUrlError(target.to_owned()))?;
        return Ok(Outcome::RedirectToUrl(uri));
    }

    Ok(Outcome::Success(parse_settings(res, account, addr)))
}

fn parse_error(err: &Element) -> RemoteError {
    RemoteError::new(
        err.child_text("ErrorCode").unwrap_or_default(),
        err.child_text("Message").unwrap_or_default(),
    )
}

fn parse_settings(res: &Element, account: &Element, addr: &str) -> UserSettings {
    let mut settings = UserSettings::new(addr);

    if let Some(user) = res.child("User") {
        for (name, tag) in [
            (UserSettingName::UserDisplayName, "DisplayName"),
            (UserSettingName::UserDn, "LegacyDN"),
            (UserSettingName::UserDeploymentId, "DeploymentId"),
            (
                UserSettingName::AutoDiscoverSmtpAddress,
                "AutoDiscoverSMTPAddress",
            ),
        ] {
            set(&mut settings, name, user.child_text(tag));
        }
    }

    for protocol in account.children_named("Protocol") {
        match protocol.child_text("Type").unwrap_or_default() {
            "EXCH" => {
                for (name, tag) in [
                    (UserSettingName::InternalMailboxServer, "Server"),
                    (UserSettingName::InternalMailboxServerDn, "ServerDN"),
                    (UserSettingName::MailboxDn, "MdbDN"),
                    (UserSettingName::PublicFolderServer, "PublicFolderServer"),
                    (UserSettingName::ActiveDirectoryServer, "AD"),
                    (UserSettingName::InternalEwsUrl, "EwsUrl"),
                    (UserSettingName::InternalEcpUrl, "EcpUrl"),
                    (UserSettingName::InternalOabUrl, "OABUrl"),
                    (UserSettingName::InternalUmUrl, "UMUrl"),
                ] {
                    set(&mut settings, name, protocol.child_text(tag));
                }

                let cas_version = protocol
                    .child_text("ServerVersion")
                    .and_then(decode_server_version);
                let name = UserSettingName::CasVersion;
                set(&mut settings, name, cas_version.as_deref());
            }
            "EXPR" => {
                for (name, tag) in [
                    (UserSettingName::ExternalMailboxServer, "Server"),
                    (
                        UserSettingName::ExternalMailboxServerAuthenticationMethods,
                        "AuthPackage",
                    ),
                    (UserSettingName::ExternalEwsUrl, "EwsUrl"),
                    (UserSettingName::ExternalEcpUrl, "EcpUrl"),
                    (UserSettingName::ExternalOabUrl, "OABUrl"),
                    (UserSettingName::ExternalUmUrl, "UMUrl"),
                ] {
                    set(&mut settings, name, protocol.child_text(tag));
                }

                let requires_ssl = protocol
                    .child_text("SSL")
                    .map(|ssl| ssl.eq_ignore_ascii_case("on"))
                    .map(|ssl| if ssl { "True" } else { "False" });
                set(
                    &mut settings,
                    UserSettingName::ExternalMailboxServerRequiresSsl,
                    requires_ssl,
                );
            }
            "WEB" => {
                for (scope, name) in [
                    ("Internal", UserSettingName::InternalWebClientUrls),
                    ("External", UserSettingName::ExternalWebClientUrls),
                ] {
                    let urls = web_client_urls(protocol.child(scope));
                    if !urls.is_empty() {
                        let value = SettingValue::WebClientUrls(urls);
                        settings.settings.insert(name, value);
                    }
                }
            }
            kind => trace!(kind, "ignoring legacy protocol block"),
        }
    }

    let mailboxes: Vec<AlternateMailbox> = account
        .child("AlternateMailboxes")
        .into_iter()
        .flat_map(|mailboxes| mailboxes.children_named("AlternateMailbox"))
        .map(|mailbox| {
            let text = |name: &str| mailbox.child_text(name).unwrap_or_default().to_owned();
            AlternateMailbox {
                r#type: text("Type"),
                display_name: text("DisplayName"),
                legacy_dn: text("LegacyDN"),
                server: text("Server"),
                smtp_address: text("SmtpAddress"),
                owner_smtp_address: text("OwnerSmtpAddress"),
            }
        })
        .collect();

    if !mailboxes.is_empty() {
        settings.settings.insert(
            UserSettingName::AlternateMailboxes,
            SettingValue::AlternateMailboxes(mailboxes),
        );
    }

    settings
}

fn set(settings: &mut UserSettings, name: UserSettingName, value: Option<&str>) {
    if let Some(value) = value {
        settings.settings.insert(name, SettingValue::from(value));
    }
}

fn web_client_urls(scope: Option<&Element>) -> Vec<WebClientUrl> {
    scope
        .into_iter()
        .flat_map(|scope| scope.children_named("OWAUrl"))
        .filter(|url| !url.text.trim().is_empty())
        .map(|url| WebClientUrl {
            authentication_methods: url
                .attribute("AuthenticationMethod")
                .unwrap_or_default()
                .to_owned(),
            url: url.text.trim().to_owned(),
        })
        .collect()
}

/// Decode the hexadecimal `ServerVersion` of a legacy response into
/// a `major.minor.build` version.
fn decode_server_version(hex: &str) -> Option<String> {
    let version = u32::from_str_radix(hex, 16).ok()?;
    let major = (version >> 22) & 0x3F;
    let minor = (version >> 16) & 0x3F;
    let build = version & 0x7FFF;
    Some(format!("{major}.{minor}.{build}"))
}
