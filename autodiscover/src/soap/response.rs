//! # SOAP responses
//!
//! Parsing of SOAP envelopes returned by the Autodiscover service
//! into an [`Outcome`].

use std::str::FromStr;

use http::ureq::http::Uri;
use tracing::trace;

use crate::{
    outcome::{Outcome, RemoteError},
    settings::{
        AlternateMailbox, ErrorCode, ProtocolConnection, ServerVersionInfo, SettingError,
        SettingValue, Settings, WebClientUrl,
    },
    xml::{self, Element},
};

use super::{request::Operation, Error, Result};

/// Element names that differ between user and domain responses.
struct Shape {
    responses: &'static str,
    response: &'static str,
    errors: &'static str,
    error: &'static str,
    settings: &'static str,
    setting: &'static str,
}

const USER_SHAPE: Shape = Shape {
    responses: "UserResponses",
    response: "UserResponse",
    errors: "UserSettingErrors",
    error: "UserSettingError",
    settings: "UserSettings",
    setting: "UserSetting",
};

const DOMAIN_SHAPE: Shape = Shape {
    responses: "DomainResponses",
    response: "DomainResponse",
    errors: "DomainSettingErrors",
    error: "DomainSettingError",
    settings: "DomainSettings",
    setting: "DomainSetting",
};

/// A parsed SOAP envelope.
pub enum Envelope {
    Body {
        server_version: Option<ServerVersionInfo>,
        body: Element,
    },
    Fault(RemoteError),
}

/// Read and validate the SOAP envelope wrapper.
pub fn parse_envelope(document: &str) -> Result<Envelope> {
    let root = Element::parse(document)?;

    if !root.name.eq_ignore_ascii_case("Envelope") {
        return Err(xml::Error::UnexpectedRootError(root.name, "Envelope").into());
    }

    let server_version = root
        .path(&["Header", "ServerVersionInfo"])
        .map(parse_server_version);

    let body = root
        .child("Body")
        .ok_or(xml::Error::MissingElementError("Body"))?;

    if let Some(fault) = body.child("Fault") {
        return Ok(Envelope::Fault(parse_fault(fault)?));
    }

    let body = body
        .children
        .first()
        .cloned()
        .ok_or(xml::Error::MissingElementError("Body"))?;

    Ok(Envelope::Body {
        server_version,
        body,
    })
}

/// Parse the body of a user or domain settings response.
pub fn parse_settings_response<N>(
    op: Operation,
    message: &Element,
    identity: &str,
    server_version: Option<ServerVersionInfo>,
) -> Result<Outcome<Settings<N>>>
where
    N: FromStr + Ord + Copy + AsRef<str>,
{
    if !message.name.eq_ignore_ascii_case(&op.response_element()) {
        let name = message.name.clone();
        return Err(Error::UnexpectedResponseError(name, op.name()));
    }

    let shape = match op {
        Operation::GetUserSettings => &USER_SHAPE,
        Operation::GetDomainSettings => &DOMAIN_SHAPE,
    };

    let res = message
        .child("Response")
        .ok_or(xml::Error::MissingElementError("Response"))?;

    let code = parse_error_code(res)?;
    if code != ErrorCode::NoError {
        let message = res.child_text("ErrorMessage").unwrap_or_default();
        return Ok(Outcome::Error(RemoteError::new(code, message)));
    }

    let res = res
        .child(shape.responses)
        .and_then(|responses| responses.child(shape.response))
        .ok_or(xml::Error::MissingElementError("Responses"))?;

    match parse_error_code(res)? {
        ErrorCode::NoError => (),
        ErrorCode::RedirectAddress => {
            let target = res
                .child_text("RedirectTarget")
                .ok_or(xml::Error::MissingElementError("RedirectTarget"))?;
            return Ok(Outcome::RedirectToAddress(target.to_owned()));
        }
        ErrorCode::RedirectUrl => {
            let target = res
                .child_text("RedirectTarget")
                .ok_or(xml::Error::MissingElementError("RedirectTarget"))?;
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
        code => {
            let message = res.child_text("ErrorMessage").unwrap_or_default();
            return Ok(Outcome::Error(RemoteError::new(code, message)));
        }
    }

    let mut settings = Settings::<N>::new(identity);
    settings.server_version = server_version;

    for err in res
        .child(shape.errors)
        .into_iter()
        .flat_map(|errors| errors.children_named(shape.error))
    {
        let text = |name: &str| err.child_text(name).unwrap_or_default().to_owned();
        settings.errors.push(SettingError {
            code: parse_error_code(err)?,
            message: text("ErrorMessage"),
            setting_name: text("SettingName"),
        });
    }

    for setting in res
        .child(shape.settings)
        .into_iter()
        .flat_map(|settings| settings.children_named(shape.setting))
    {
        let Some(name) = setting.child_text("Name") else {
            continue;
        };

        let Ok(name) = N::from_str(name) else {
            trace!(name, "ignoring unknown setting");
            continue;
        };

        if let Some(value) = parse_setting_value(setting) {
            settings.settings.insert(name, value);
        }
    }

    Ok(Outcome::Success(settings))
}

fn parse_error_code(elem: &Element) -> Result<ErrorCode> {
    match elem.child_text("ErrorCode") {
        None => Ok(ErrorCode::NoError),
        Some(code) => ErrorCode::from_str(code)
            .map_err(|_| xml::Error::InvalidValueError("ErrorCode", code.to_owned()).into()),
    }
}

fn parse_setting_value(setting: &Element) -> Option<SettingValue> {
    if let Some(value) = setting.child("Value") {
        if value.is_nil() {
            return None;
        }
        return Some(SettingValue::String(value.text.trim().to_owned()));
    }

    if let Some(urls) = setting.child("WebClientUrls") {
        let urls = urls
            .children_named("WebClientUrl")
            .map(|url| WebClientUrl {
                authentication_methods: text(url, "AuthenticationMethods"),
                url: text(url, "Url"),
            })
            .collect();
        return Some(SettingValue::WebClientUrls(urls));
    }

    if let Some(conns) = setting.child("ProtocolConnections") {
        let conns = conns
            .children_named("ProtocolConnection")
            .map(|conn| ProtocolConnection {
                encryption_method: text(conn, "EncryptionMethod"),
                hostname: text(conn, "Hostname"),
                port: conn
                    .child_text("Port")
                    .and_then(|port| port.parse().ok())
                    .unwrap_or_default(),
            })
            .collect();
        return Some(SettingValue::ProtocolConnections(conns));
    }

    if let Some(mailboxes) = setting.child("AlternateMailboxes") {
        let mailboxes = mailboxes
            .children_named("AlternateMailbox")
            .map(|mailbox| AlternateMailbox {
                r#type: text(mailbox, "Type"),
                display_name: text(mailbox, "DisplayName"),
                legacy_dn: text(mailbox, "LegacyDN"),
                server: text(mailbox, "Server"),
                smtp_address: text(mailbox, "SmtpAddress"),
                owner_smtp_address: text(mailbox, "OwnerSmtpAddress"),
            })
            .collect();
        return Some(SettingValue::AlternateMailboxes(mailboxes));
    }

    trace!(kind = ?setting.attribute("type"), "ignoring unsupported setting value");
    None
}

fn text(elem: &Element, name: &str) -> String {
    elem.child_text(name).unwrap_or_default().to_owned()
}

fn parse_server_version(info: &Element) -> ServerVersionInfo {
    // Exchange sends version numbers as child elements, some proxies
    // as attributes.
    let field = |name: &str| {
        info.child_text(name)
            .or_else(|| info.attribute(name))
            .map(str::to_owned)
    };
    let number = |name: &str| field(name).and_then(|n| n.parse().ok());

    ServerVersionInfo {
        major_version: number("MajorVersion"),
        minor_version: number("MinorVersion"),
        major_build_number: number("MajorBuildNumber"),
        minor_build_number: number("MinorBuildNumber"),
        version: field("Version"),
    }
}

fn parse_fault(fault: &Element) -> Result<RemoteError> {
    // SOAP 1.1 uses faultstring, SOAP 1.2 uses Reason/Text.
    let message = fault
        .child_text("faultstring")
        .or_else(|| fault.path(&["Reason", "Text"]).map(|t| t.text.trim()))
        .filter(|message| !message.is_empty())
        .ok_or(xml::Error::MissingElementError("faultstring"))?;

    Ok(RemoteError::new(ErrorCode::InternalServerError, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DomainSettingName, UserSettingName, UserSettings};

    const USER_RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" xmlns:a="http://www.w3.org/2005/08/addressing">
  <s:Header>
    <a:Action s:mustUnderstand="1">http://schemas.microsoft.com/exchange/2010/Autodiscover/Autodiscover/GetUserSettingsResponse</a:Action>
    <h:ServerVersionInfo xmlns:h="http://schemas.microsoft.com/exchange/2010/Autodiscover" xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
      <h:MajorVersion>15</h:MajorVersion>
      <h:MinorVersion>1</h:MinorVersion>
      <h:MajorBuildNumber>2507</h:MajorBuildNumber>
      <h:MinorBuildNumber>6</h:MinorBuildNumber>
      <h:Version>Exchange2015</h:Version>
    </h:ServerVersionInfo>
  </s:Header>
  <s:Body>
    <GetUserSettingsResponseMessage xmlns="http://schemas.microsoft.com/exchange/2010/Autodiscover">
      <Response xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
        <ErrorCode>NoError</ErrorCode>
        <ErrorMessage />
        <UserResponses>
          <UserResponse>
            <ErrorCode>NoError</ErrorCode>
            <ErrorMessage>No error.</ErrorMessage>
            <RedirectTarget i:nil="true" />
            <UserSettingErrors>
              <UserSettingError>
                <ErrorCode>SettingIsNotAvailable</ErrorCode>
                <ErrorMessage>User setting 'ExternalEcpUrl' is not available.</ErrorMessage>
                <SettingName>ExternalEcpUrl</SettingName>
              </UserSettingError>
            </UserSettingErrors>
            <UserSettings>
              <UserSetting i:type="StringSetting">
                <Name>UserDisplayName</Name>
                <Value>Alice</Value>
              </UserSetting>
              <UserSetting i:type="StringSetting">
                <Name>ExternalEwsUrl</Name>
                <Value>https://mail.example.com/EWS/Exchange.asmx</Value>
              </UserSetting>
              <UserSetting i:type="ProtocolConnectionCollectionSetting">
                <Name>ExternalImap4Connections</Name>
                <ProtocolConnections>
                  <ProtocolConnection>
                    <EncryptionMethod>SSL</EncryptionMethod>
                    <Hostname>imap.example.com</Hostname>
                    <Port>993</Port>
                  </ProtocolConnection>
                </ProtocolConnections>
              </UserSetting>
              <UserSetting i:type="StringSetting">
                <Name>SomeFutureSetting</Name>
                <Value>ignored</Value>
              </UserSetting>
            </UserSettings>
          </UserResponse>
        </UserResponses>
      </Response>
    </GetUserSettingsResponseMessage>
  </s:Body>
</s:Envelope>"#;

    fn parse_user(document: &str) -> Result<Outcome<UserSettings>> {
        match parse_envelope(document)? {
            Envelope::Body {
                server_version,
                body,
            } => parse_settings_response(
                Operation::GetUserSettings,
                &body,
                "alice@example.com",
                server_version,
            ),
            Envelope::Fault(err) => Ok(Outcome::Error(err)),
        }
    }

    #[test]
    fn user_settings() {
        let Outcome::Success(settings) = parse_user(USER_RESPONSE).unwrap() else {
            panic!("expected settings");
        };

        assert_eq!(
            settings.get_str(&UserSettingName::UserDisplayName),
            Some("Alice")
        );
        let imap = ProtocolConnection {
            encryption_method: "SSL".into(),
            hostname: "imap.example.com".into(),
            port: 993,
        };
        assert_eq!(
            settings.get(&UserSettingName::ExternalImap4Connections),
            Some(&SettingValue::ProtocolConnections(vec![imap])),
        );
        assert_eq!(settings.settings.len(), 3);
        assert_eq!(settings.errors.len(), 1);
        assert_eq!(settings.errors[0].setting_name, "ExternalEcpUrl");

        let version = settings.server_version.unwrap();
        assert_eq!(version.major_version, Some(15));
        assert_eq!(version.major_build_number, Some(2507));
        assert_eq!(version.version.as_deref(), Some("Exchange2015"));
    }

    #[test]
    fn user_redirections() {
        let redirect_addr = USER_RESPONSE
            .replacen(
                "<UserResponse>\n            <ErrorCode>NoError</ErrorCode>",
                "<UserResponse>\n            <ErrorCode>RedirectAddress</ErrorCode>",
                1,
            )
            .replace(
                r#"<RedirectTarget i:nil="true" />"#,
                "<RedirectTarget>alice@contoso.com</RedirectTarget>",
            );
        assert_eq!(
            parse_user(&redirect_addr).unwrap(),
            Outcome::RedirectToAddress("alice@contoso.com".into()),
        );

        let redirect_url = USER_RESPONSE
            .replacen(
                "<UserResponse>\n            <ErrorCode>NoError</ErrorCode>",
                "<UserResponse>\n            <ErrorCode>RedirectUrl</ErrorCode>",
                1,
            )
            .replace(
                r#"<RedirectTarget i:nil="true" />"#,
                "<RedirectTarget>https://mail.contoso.com/autodiscover/autodiscover.svc</RedirectTarget>",
            );
        let Outcome::RedirectToUrl(uri) = parse_user(&redirect_url).unwrap() else {
            panic!("expected URL redirection");
        };
        assert_eq!(uri.host(), Some("mail.contoso.com"));
    }

    #[test]
    fn user_error() {
        let invalid_user = USER_RESPONSE
            .replacen(
                "<UserResponse>\n            <ErrorCode>NoError</ErrorCode>\n            <ErrorMessage>No error.</ErrorMessage>",
                "<UserResponse>\n            <ErrorCode>InvalidUser</ErrorCode>\n            <ErrorMessage>Invalid user.</ErrorMessage>",
                1,
            );

        assert_eq!(
            parse_user(&invalid_user).unwrap(),
            Outcome::Error(RemoteError::new("InvalidUser", "Invalid user.")),
        );
    }

    #[test]
    fn soap_fault() {
        let fault = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
          <s:Body>
            <s:Fault>
              <faultcode>s:Client</faultcode>
              <faultstring xml:lang="en-US">The server cannot service this request right now.</faultstring>
            </s:Fault>
          </s:Body>
        </s:Envelope>"#;

        assert_eq!(
            parse_user(fault).unwrap(),
            Outcome::Error(RemoteError::new(
                "InternalServerError",
                "The server cannot service this request right now.",
            )),
        );

        let malformed = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
          <s:Body><s:Fault><faultcode>s:Client</faultcode></s:Fault></s:Body>
        </s:Envelope>"#;
        assert!(parse_user(malformed).is_err());
    }

    #[test]
    fn domain_settings() {
        let document = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
          <s:Body>
            <GetDomainSettingsResponseMessage xmlns="http://schemas.microsoft.com/exchange/2010/Autodiscover">
              <Response>
                <ErrorCode>NoError</ErrorCode>
                <DomainResponses>
                  <DomainResponse>
                    <ErrorCode>NoError</ErrorCode>
                    <DomainSettingErrors />
                    <DomainSettings>
                      <DomainSetting>
                        <Name>ExternalEwsUrl</Name>
                        <Value>https://mail.example.com/EWS/Exchange.asmx</Value>
                      </DomainSetting>
                    </DomainSettings>
                  </DomainResponse>
                </DomainResponses>
              </Response>
            </GetDomainSettingsResponseMessage>
          </s:Body>
        </s:Envelope>"#;

        let Envelope::Body {
            server_version,
            body,
        } = parse_envelope(document).unwrap()
        else {
            panic!("expected body");
        };

        let outcome = parse_settings_response::<DomainSettingName>(
            Operation::GetDomainSettings,
            &body,
            "example.com",
            server_version,
        )
        .unwrap();

        let Outcome::Success(settings) = outcome else {
            panic!("expected settings");
        };
        assert_eq!(settings.identity, "example.com");
        assert_eq!(settings.server_version, None);
        assert_eq!(
            settings.get_str(&DomainSettingName::ExternalEwsUrl),
            Some("https://mail.example.com/EWS/Exchange.asmx"),
        );

        assert!(matches!(
            parse_settings_response::<DomainSettingName>(
                Operation::GetUserSettings,
                &body,
                "example.com",
                None,
            ),
            Err(Error::UnexpectedResponseError(..))
        ));
    }
}
