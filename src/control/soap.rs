//! SOAP envelope building, transport and fault classification

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::wsse;

/// Raw result of one SOAP POST
#[derive(Debug, Clone)]
pub struct SoapResponse {
    pub status: u16,
    pub body: String,
}

/// Transport seam for SOAP requests.
///
/// Production uses [`HttpTransport`]; tests substitute a scripted camera.
#[async_trait]
pub trait SoapTransport: Send + Sync + 'static {
    /// POST one envelope to an ONVIF service endpoint.
    ///
    /// Fails with [`Error::Network`] only for transport-level problems;
    /// HTTP error statuses come back as a normal [`SoapResponse`].
    async fn post(&self, endpoint: &str, envelope: String) -> Result<SoapResponse>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SoapTransport for HttpTransport {
    async fn post(&self, endpoint: &str, envelope: String) -> Result<SoapResponse> {
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(envelope)
            .send()
            .await
            .map_err(|e| Error::Network(format!("soap post to {endpoint}: {e}")))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(SoapResponse { status, body })
    }
}

/// Wrap an operation body in a SOAP 1.2 envelope with a WS-Security header.
pub fn envelope(username: &str, password: &str, body: &str) -> Result<String> {
    let header = wsse::security_header(username, password)?;
    Ok(format!(
        concat!(
            "<s:Envelope xmlns:s=\"http://www.w3.org/2003/05/soap-envelope\">",
            "{header}",
            "<s:Body>{body}</s:Body>",
            "</s:Envelope>"
        ),
        header = header,
        body = body,
    ))
}

/// Map a SOAP response onto the bridge error taxonomy.
///
/// - HTTP 401 or a `NotAuthorized` fault: [`Error::Auth`]
/// - `ActionNotSupported` / PTZ-capability faults: [`Error::CommandRejected`]
/// - any other fault or unexpected status: [`Error::Protocol`]
pub fn check_response(operation: &str, response: &SoapResponse) -> Result<()> {
    if response.status == 401 {
        return Err(Error::Auth(format!("{operation}: HTTP 401")));
    }

    if let Some(fault) = parse_fault(&response.body) {
        let code = fault.code.as_deref().unwrap_or("");
        let reason = fault.reason.unwrap_or_else(|| "unspecified fault".into());
        if code.contains("NotAuthorized") || code.contains("FailedAuthentication") {
            return Err(Error::Auth(format!("{operation}: {reason}")));
        }
        if code.contains("ActionNotSupported")
            || code.contains("NoPTZProfile")
            || code.contains("OptionalActionNotImplemented")
        {
            return Err(Error::CommandRejected(format!("{operation}: {reason}")));
        }
        return Err(Error::Protocol(format!("{operation}: fault {code}: {reason}")));
    }

    if !(200..300).contains(&response.status) {
        return Err(Error::Protocol(format!(
            "{operation}: HTTP {}",
            response.status
        )));
    }

    Ok(())
}

struct Fault {
    code: Option<String>,
    reason: Option<String>,
}

/// Extract the innermost fault code and the reason text, if the body is a
/// SOAP fault. Namespace prefixes vary between cameras, so matching is by
/// local tag name.
fn parse_fault(body: &str) -> Option<Fault> {
    let doc = roxmltree::Document::parse(body).ok()?;
    let fault = doc
        .descendants()
        .find(|n| n.has_tag_name_local("Fault"))?;

    // The most specific subcode wins; ONVIF puts its own codes there.
    let code = fault
        .descendants()
        .filter(|n| n.has_tag_name_local("Value"))
        .last()
        .and_then(|n| n.text())
        .map(|s| s.trim().to_string());

    let reason = fault
        .descendants()
        .find(|n| n.has_tag_name_local("Text"))
        .and_then(|n| n.text())
        .map(|s| s.trim().to_string());

    Some(Fault { code, reason })
}

pub(crate) trait LocalName {
    fn has_tag_name_local(&self, name: &str) -> bool;
}

impl LocalName for roxmltree::Node<'_, '_> {
    fn has_tag_name_local(&self, name: &str) -> bool {
        self.is_element() && self.tag_name().name() == name
    }
}
