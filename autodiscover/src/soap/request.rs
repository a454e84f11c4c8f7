//! # SOAP requests
//!
//! Serialization of `GetUserSettings` and `GetDomainSettings` SOAP
//! envelopes.

use http::ureq::http::Uri;

use crate::{
    config::ExchangeVersion,
    xml::{self, XmlWriter, NO_ATTRIBUTES},
};

use super::{AUTODISCOVER_NS, SOAP_NS, WSA_NS, XSI_NS};

/// The operations of the SOAP Autodiscover service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    GetUserSettings,
    GetDomainSettings,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetUserSettings => "GetUserSettings",
            Self::GetDomainSettings => "GetDomainSettings",
        }
    }

    /// The WS-Addressing action of the operation.
    pub fn action(&self) -> String {
        format!("{AUTODISCOVER_NS}/Autodiscover/{}", self.name())
    }

    pub fn request_element(&self) -> String {
        format!("a:{}RequestMessage", self.name())
    }

    pub fn response_element(&self) -> String {
        format!("{}ResponseMessage", self.name())
    }
}

/// Build a `GetUserSettings` envelope for one SMTP address.
pub fn build_user_settings_request<S: AsRef<str>>(
    url: &Uri,
    addr: &str,
    settings: &[S],
    version: ExchangeVersion,
) -> xml::Result<String> {
    build_request(url, Operation::GetUserSettings, version, |writer| {
        writer
            .start("a:Users", NO_ATTRIBUTES)?
            .start("a:User", NO_ATTRIBUTES)?
            .text_element("a:Mailbox", addr)?
            .end("a:User")?
            .end("a:Users")?;
        write_requested_settings(writer, settings)?;
        Ok(())
    })
}

/// Build a `GetDomainSettings` envelope for one domain.
pub fn build_domain_settings_request<S: AsRef<str>>(
    url: &Uri,
    domain: &str,
    settings: &[S],
    version: ExchangeVersion,
) -> xml::Result<String> {
    build_request(url, Operation::GetDomainSettings, version, |writer| {
        writer
            .start("a:Domains", NO_ATTRIBUTES)?
            .text_element("a:Domain", domain)?
            .end("a:Domains")?;
        write_requested_settings(writer, settings)?;
        writer.text_element("a:RequestedVersion", version.as_str())?;
        Ok(())
    })
}

fn write_requested_settings<S: AsRef<str>>(
    writer: &mut XmlWriter,
    settings: &[S],
) -> xml::Result<()> {
    writer.start("a:RequestedSettings", NO_ATTRIBUTES)?;
    for setting in settings {
        writer.text_element("a:Setting", setting.as_ref())?;
    }
    writer.end("a:RequestedSettings")?;
    Ok(())
}

fn build_request(
    url: &Uri,
    op: Operation,
    version: ExchangeVersion,
    write_body: impl FnOnce(&mut XmlWriter) -> xml::Result<()>,
) -> xml::Result<String> {
    let mut writer = XmlWriter::new()?;
    let url = url.to_string();
    let action = op.action();
    let message = op.request_element();

    writer
        .start(
            "soap:Envelope",
            [
                ("xmlns:a", AUTODISCOVER_NS),
                ("xmlns:wsa", WSA_NS),
                ("xmlns:xsi", XSI_NS),
                ("xmlns:soap", SOAP_NS),
            ],
        )?
        .start("soap:Header", NO_ATTRIBUTES)?
        .text_element("a:RequestedServerVersion", version.as_str())?
        .text_element("wsa:Action", &action)?
        .text_element("wsa:To", &url)?
        .end("soap:Header")?
        .start("soap:Body", NO_ATTRIBUTES)?
        .start(&message, [("xmlns:a", AUTODISCOVER_NS)])?
        .start("a:Request", NO_ATTRIBUTES)?;

    write_body(&mut writer)?;

    writer
        .end("a:Request")?
        .end(&message)?
        .end("soap:Body")?
        .end("soap:Envelope")?;

    Ok(writer.into_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DomainSettingName, UserSettingName};

    #[test]
    fn user_settings_envelope() {
        let url: Uri = "https://autodiscover.example.com/autodiscover/autodiscover.svc"
            .parse()
            .unwrap();
        let body = build_user_settings_request(
            &url,
            "alice@example.com",
            &[
                UserSettingName::UserDisplayName,
                UserSettingName::InternalOabUrl,
            ],
            ExchangeVersion::Exchange2010_SP1,
        )
        .unwrap();

        assert!(
            body.contains("<a:RequestedServerVersion>Exchange2010_SP1</a:RequestedServerVersion>")
        );
        assert!(body.contains(
            "<wsa:Action>http://schemas.microsoft.com/exchange/2010/Autodiscover/Autodiscover/GetUserSettings</wsa:Action>"
        ));
        assert!(body.contains(
            "<wsa:To>https://autodiscover.example.com/autodiscover/autodiscover.svc</wsa:To>"
        ));
        assert!(body.contains("<a:Mailbox>alice@example.com</a:Mailbox>"));
        assert!(body.contains("<a:Setting>UserDisplayName</a:Setting>"));
        assert!(body.contains("<a:Setting>InternalOABUrl</a:Setting>"));
        assert!(body.contains("</a:GetUserSettingsRequestMessage></soap:Body></soap:Envelope>"));
    }

    #[test]
    fn domain_settings_envelope() {
        let url: Uri = "https://example.com/autodiscover/autodiscover.svc"
            .parse()
            .unwrap();
        let body = build_domain_settings_request(
            &url,
            "example.com",
            &[DomainSettingName::ExternalEwsUrl],
            ExchangeVersion::Exchange2013,
        )
        .unwrap();

        assert!(body.contains("<a:GetDomainSettingsRequestMessage"));
        assert!(body.contains("<a:Domain>example.com</a:Domain>"));
        assert!(body.contains("<a:Setting>ExternalEwsUrl</a:Setting>"));
        assert!(body.contains("<a:RequestedVersion>Exchange2013</a:RequestedVersion>"));
    }
}
