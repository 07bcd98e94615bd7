use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use volley_http::HttpClient;

use super::http::{build_request, exchange_from_response};
use super::{Exchange, ProtocolExecutor, ProtocolKind, ResolvedRequest, timed};
use crate::scope::ScopeView;

const ENVELOPE_OPEN: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body>";
const ENVELOPE_CLOSE: &str = "</soap:Body></soap:Envelope>";

/// SOAP 1.1 over HTTP POST.
///
/// Bodies without an `Envelope` element are wrapped in one. The method is sent
/// as the `SOAPAction` header. A `Fault` element in the response fails the
/// outcome with its `faultstring`.
#[derive(Debug, Clone)]
pub struct SoapExecutor {
    client: Arc<HttpClient>,
}

impl SoapExecutor {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

pub(crate) fn envelope(body: &str) -> String {
    if body.contains("Envelope") {
        return body.to_string();
    }
    format!("{ENVELOPE_OPEN}{body}{ENVELOPE_CLOSE}")
}

/// Text of the first element whose local name is `name`.
fn element_text<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let mut search = xml;
    while let Some(lt) = search.find('<') {
        let tag = &search[lt + 1..];
        let end = tag.find('>')?;
        let head = &tag[..end];
        let qname = head.split_whitespace().next().unwrap_or_default();
        let local = qname.rsplit(':').next().unwrap_or(qname);
        if local == name && !head.starts_with('/') {
            let content = &tag[end + 1..];
            let close = content.find("</")?;
            return Some(content[..close].trim());
        }
        search = &tag[end + 1..];
    }
    None
}

pub(crate) fn soap_fault(xml: &str) -> Option<String> {
    element_text(xml, "Fault")?;
    let reason = element_text(xml, "faultstring")
        .or_else(|| element_text(xml, "Text"))
        .filter(|s| !s.is_empty())
        .unwrap_or("unspecified fault");
    Some(reason.to_string())
}

#[async_trait]
impl ProtocolExecutor for SoapExecutor {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Soap
    }

    async fn execute(&self, request: &ResolvedRequest, _scope: &ScopeView<'_>) -> Exchange {
        timed(request, async {
            let mut req = build_request(request, "POST")?;
            req.method = http::Method::POST;
            if request.header("content-type").is_none() {
                req.headers
                    .push(("content-type".to_string(), "text/xml; charset=utf-8".to_string()));
            }
            if request.header("soapaction").is_none() {
                req.headers
                    .push(("soapaction".to_string(), format!("\"{}\"", request.method.trim())));
            }
            let req = req.body(envelope(request.body.as_deref().unwrap_or_default()));

            let started = Instant::now();
            let res = self.client.send(req).await?;
            let mut exchange = exchange_from_response(request, res, started);
            if let Some(reason) = soap_fault(&exchange.response.body_text()) {
                exchange.outcome = exchange.outcome.with_failure(format!("SOAP fault: {reason}"));
            }
            Ok(exchange)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_bare_payloads_only() {
        let wrapped = envelope("<GetUser><Id>1</Id></GetUser>");
        assert!(wrapped.starts_with("<?xml"));
        assert!(wrapped.contains("<soap:Body><GetUser>"));

        let full = "<soapenv:Envelope><soapenv:Body/></soapenv:Envelope>";
        assert_eq!(envelope(full), full);
    }

    #[test]
    fn detects_faults_with_or_without_prefix() {
        let fault = "<soap:Envelope><soap:Body><soap:Fault><faultcode>soap:Server</faultcode>\
                     <faultstring>operation failed</faultstring></soap:Fault></soap:Body></soap:Envelope>";
        assert_eq!(soap_fault(fault).as_deref(), Some("operation failed"));

        let soap12 = "<Envelope><Body><Fault><Reason><Text xml:lang=\"en\">bad input</Text>\
                      </Reason></Fault></Body></Envelope>";
        assert_eq!(soap_fault(soap12).as_deref(), Some("bad input"));

        assert_eq!(soap_fault("<Envelope><Body><Result>ok</Result></Body></Envelope>"), None);
    }
}
