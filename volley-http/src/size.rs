//! HTTP/1.1 wire-size approximations for byte accounting.

const CRLF: u64 = 2;

pub(crate) fn header_line(name: &[u8], value: &[u8]) -> u64 {
    // "name: value\r\n"
    (name.len() as u64)
        .saturating_add(2)
        .saturating_add(value.len() as u64)
        .saturating_add(CRLF)
}

pub(crate) fn request_head(method: &http::Method, uri: &http::Uri, headers: &http::HeaderMap) -> u64 {
    let target = uri.path_and_query().map_or("/", |p| p.as_str());
    // "METHOD SP target SP HTTP/1.1 CRLF"
    let line = (method.as_str().len() as u64)
        .saturating_add(1)
        .saturating_add(target.len() as u64)
        .saturating_add(1)
        .saturating_add("HTTP/1.1".len() as u64)
        .saturating_add(CRLF);

    headers
        .iter()
        .fold(line, |acc, (k, v)| {
            acc.saturating_add(header_line(k.as_str().as_bytes(), v.as_bytes()))
        })
        .saturating_add(CRLF)
}

pub(crate) fn response_head(status: http::StatusCode, headers: &http::HeaderMap) -> u64 {
    let reason = status.canonical_reason().unwrap_or("");
    // "HTTP/1.1 SP 200 SP OK CRLF"
    let line = ("HTTP/1.1".len() as u64)
        .saturating_add(1)
        .saturating_add(3)
        .saturating_add(1)
        .saturating_add(reason.len() as u64)
        .saturating_add(CRLF);

    headers
        .iter()
        .fold(line, |acc, (k, v)| {
            acc.saturating_add(header_line(k.as_str().as_bytes(), v.as_bytes()))
        })
        .saturating_add(CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_head_counts_line_headers_and_terminator() {
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::HOST, http::HeaderValue::from_static("x"));
        let uri: http::Uri = "http://x/ping?a=1".parse().unwrap_or_else(|e| panic!("{e}"));

        // "GET /ping?a=1 HTTP/1.1\r\n" = 24, "host: x\r\n" = 9, "\r\n" = 2
        assert_eq!(request_head(&http::Method::GET, &uri, &headers), 35);
    }

    #[test]
    fn response_head_uses_canonical_reason() {
        let headers = http::HeaderMap::new();
        // "HTTP/1.1 200 OK\r\n" = 17, "\r\n" = 2
        assert_eq!(response_head(http::StatusCode::OK, &headers), 19);
    }
}
