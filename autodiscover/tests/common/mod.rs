#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use autodiscover::{
    dns, transport, AutodiscoverConfig, AutodiscoverService, Credentials, DirectoryLookup,
    DnsSrvRecord, ExchangeVersion, HttpRequest, HttpResponse, SrvLookup, Transport, Uri,
};

/// In-memory transport answering queued responses per method and
/// URL. Unknown routes are unreachable.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    routes: HashMap<String, VecDeque<HttpResponse>>,
    sent: Vec<String>,
}

impl MockTransport {
    pub fn on(&self, method: &str, url: &str, res: HttpResponse) -> &Self {
        let mut state = self.state.lock().unwrap();
        state
            .routes
            .entry(format!("{method} {url}"))
            .or_default()
            .push_back(res);
        drop(state);
        self
    }

    pub fn on_post(&self, url: &str, res: HttpResponse) -> &Self {
        self.on("POST", url, res)
    }

    pub fn on_get(&self, url: &str, res: HttpResponse) -> &Self {
        self.on("GET", url, res)
    }

    /// The requests sent so far, as `METHOD url`.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, req: HttpRequest) -> transport::Result<HttpResponse> {
        let key = format!("{} {}", req.method, req.uri);
        let mut state = self.state.lock().unwrap();
        state.sent.push(key.clone());

        match state.routes.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(res) => Ok(res),
            None => {
                let err = io::Error::new(io::ErrorKind::ConnectionRefused, key);
                Err(transport::Error::IoError(err, req.uri))
            }
        }
    }
}

/// SRV lookup returning fixed records.
#[derive(Clone, Default)]
pub struct MockSrv(pub Vec<DnsSrvRecord>);

#[async_trait]
impl SrvLookup for MockSrv {
    async fn lookup_srv(&self, name: &str) -> dns::Result<Vec<DnsSrvRecord>> {
        assert!(name.starts_with("_autodiscover._tcp."));
        Ok(self.0.clone())
    }
}

/// Directory returning fixed trusted URLs and counting lookups.
#[derive(Clone, Default)]
pub struct MockDirectory {
    urls: Vec<Uri>,
    lookups: Arc<AtomicUsize>,
}

impl MockDirectory {
    pub fn new(urls: &[&str]) -> Self {
        Self {
            urls: urls.iter().map(|url| url.parse().unwrap()).collect(),
            lookups: Default::default(),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryLookup for MockDirectory {
    async fn trusted_urls(&self, _domain: &str) -> Vec<Uri> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.urls.clone()
    }
}

pub fn service(transport: &MockTransport, version: ExchangeVersion) -> AutodiscoverService {
    let config = AutodiscoverConfig {
        server_version: version,
        credentials: Some(Credentials::Basic {
            username: "alice".into(),
            password: "secret".into(),
        }),
        ..Default::default()
    };

    AutodiscoverService::new(config)
        .with_transport(transport.clone())
        .with_srv_lookup(MockSrv::default())
}

pub fn legacy_url(host: &str) -> String {
    format!("https://{host}/autodiscover/autodiscover.xml")
}

pub fn soap_url(host: &str) -> String {
    format!("https://{host}/autodiscover/autodiscover.svc")
}

pub fn legacy_settings(ews_url: &str) -> HttpResponse {
    HttpResponse::new(200).with_body(format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Autodiscover xmlns="http://schemas.microsoft.com/exchange/autodiscover/responseschema/2006">
  <Response xmlns="http://schemas.microsoft.com/exchange/autodiscover/outlook/responseschema/2006a">
    <User><DisplayName>Alice</DisplayName></User>
    <Account>
      <AccountType>email</AccountType>
      <Action>settings</Action>
      <Protocol>
        <Type>EXPR</Type>
        <EwsUrl>{ews_url}</EwsUrl>
      </Protocol>
    </Account>
  </Response>
</Autodiscover>"#
    ))
}

fn legacy_account(account: &str) -> HttpResponse {
    HttpResponse::new(200).with_body(format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Autodiscover xmlns="http://schemas.microsoft.com/exchange/autodiscover/responseschema/2006">
  <Response xmlns="http://schemas.microsoft.com/exchange/autodiscover/outlook/responseschema/2006a">
    <Account>{account}</Account>
  </Response>
</Autodiscover>"#
    ))
}

pub fn legacy_redirect_url(url: &str) -> HttpResponse {
    legacy_account(&format!(
        "<Action>redirectUrl</Action><RedirectUrl>{url}</RedirectUrl>"
    ))
}

pub fn legacy_redirect_addr(addr: &str) -> HttpResponse {
    legacy_account(&format!(
        "<Action>redirectAddr</Action><RedirectAddr>{addr}</RedirectAddr>"
    ))
}

pub fn legacy_error(code: &str, message: &str) -> HttpResponse {
    HttpResponse::new(200).with_body(format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Autodiscover xmlns="http://schemas.microsoft.com/exchange/autodiscover/responseschema/2006">
  <Response>
    <Error Time="16:42:44.2157521" Id="2520165546">
      <ErrorCode>{code}</ErrorCode>
      <Message>{message}</Message>
      <DebugData />
    </Error>
  </Response>
</Autodiscover>"#
    ))
}

pub fn http_redirect(location: &str) -> HttpResponse {
    HttpResponse::new(302).with_header("Location", location)
}

/// Probe response advertising the given capability headers.
pub fn probe(headers: &[&str]) -> HttpResponse {
    let mut res = HttpResponse::new(401);
    for name in headers {
        res = res.with_header(name, "On");
    }
    res
}

fn soap_response(op: &str, kind: &str, inner: &str) -> HttpResponse {
    HttpResponse::new(200).with_body(format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" xmlns:a="http://www.w3.org/2005/08/addressing">
  <s:Header>
    <h:ServerVersionInfo xmlns:h="http://schemas.microsoft.com/exchange/2010/Autodiscover">
      <h:MajorVersion>15</h:MajorVersion>
      <h:MinorVersion>1</h:MinorVersion>
    </h:ServerVersionInfo>
  </s:Header>
  <s:Body>
    <{op}ResponseMessage xmlns="http://schemas.microsoft.com/exchange/2010/Autodiscover">
      <Response xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
        <ErrorCode>NoError</ErrorCode>
        <{kind}Responses>
          <{kind}Response>
            {inner}
          </{kind}Response>
        </{kind}Responses>
      </Response>
    </{op}ResponseMessage>
  </s:Body>
</s:Envelope>"#
    ))
}

pub fn soap_user_settings(ews_url: &str) -> HttpResponse {
    soap_response(
        "GetUserSettings",
        "User",
        &format!(
            r#"<ErrorCode>NoError</ErrorCode>
            <UserSettingErrors />
            <UserSettings>
              <UserSetting i:type="StringSetting">
                <Name>ExternalEwsUrl</Name>
                <Value>{ews_url}</Value>
              </UserSetting>
            </UserSettings>"#
        ),
    )
}

pub fn soap_user_redirect_addr(addr: &str) -> HttpResponse {
    soap_response(
        "GetUserSettings",
        "User",
        &format!("<ErrorCode>RedirectAddress</ErrorCode><RedirectTarget>{addr}</RedirectTarget>"),
    )
}

pub fn soap_domain_settings(ews_url: &str) -> HttpResponse {
    soap_response(
        "GetDomainSettings",
        "Domain",
        &format!(
            r#"<ErrorCode>NoError</ErrorCode>
            <DomainSettings>
              <DomainSetting i:type="StringSetting">
                <Name>ExternalEwsUrl</Name>
                <Value>{ews_url}</Value>
              </DomainSetting>
            </DomainSettings>"#
        ),
    )
}

pub fn soap_fault(message: &str) -> HttpResponse {
    HttpResponse::new(500).with_body(format!(
        r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <s:Fault>
      <faultcode>s:Server</faultcode>
      <faultstring>{message}</faultstring>
    </s:Fault>
  </s:Body>
</s:Envelope>"#
    ))
}
