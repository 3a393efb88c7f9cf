//! Transport metadata → reporting scope.

use http::HeaderMap;
use sentry::Scope;
use sentry::protocol::{Context as EventContext, Map, Request as EventRequest, Value};

use crate::transport::Transport;

/// Headers left out of reported HTTP requests unless the client opted into
/// sending personally identifiable information.
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "x-forwarded-for", "x-real-ip"];

/// Attaches what `transport` knows about the request to `scope`.
///
/// gRPC calls get a `gRPC` context (endpoint, operation) and a `Headers`
/// context with the request metadata. HTTP requests become the `request` of
/// every event captured through the scope. Other transports add nothing.
pub(crate) fn apply_transport(scope: &mut Scope, transport: &Transport, send_default_pii: bool) {
    match transport {
        Transport::Grpc(grpc) => {
            let mut call = Map::new();
            call.insert("endpoint".to_owned(), Value::from(grpc.endpoint()));
            call.insert("operation".to_owned(), Value::from(grpc.operation()));
            scope.set_context("gRPC", EventContext::Other(call));

            let headers = header_values(grpc.request_header())
                .map(|(k, v)| (k.to_owned(), Value::String(v)))
                .collect();
            scope.set_context("Headers", EventContext::Other(headers));
        }
        Transport::Http(http) => {
            let request = event_request(http.request(), send_default_pii);
            scope.add_event_processor(move |mut event| {
                if event.request.is_none() {
                    event.request = Some(request.clone());
                }
                Some(event)
            });
        }
        Transport::Other(_) => {}
    }
}

/// Converts a request head into the event-protocol request.
pub(crate) fn event_request(req: &http::Request<()>, send_default_pii: bool) -> EventRequest {
    let headers = header_values(req.headers())
        .filter(|(k, _)| send_default_pii || !SENSITIVE_HEADERS.contains(k))
        .map(|(k, v)| (k.to_owned(), v))
        .collect();

    let cookies = send_default_pii
        .then(|| req.headers().get(http::header::COOKIE))
        .flatten()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

    EventRequest {
        url: absolute_url(req).and_then(|u| u.parse().ok()),
        method: Some(req.method().to_string()),
        query_string: req.uri().query().map(str::to_owned),
        cookies,
        headers,
        ..Default::default()
    }
}

/// One entry per header name, holding its first value.
fn header_values(headers: &HeaderMap) -> impl Iterator<Item = (&str, String)> {
    headers.keys().filter_map(|name| {
        let value = headers.get(name)?;
        Some((name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
    })
}

/// Servers see origin-form URIs (`/path?q`); rebuild the absolute URL from
/// the `host` header. The query string is reported separately.
fn absolute_url(req: &http::Request<()>) -> Option<String> {
    let uri = req.uri();
    if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
        return Some(format!("{scheme}://{authority}{}", uri.path()));
    }
    let host = req.headers().get(http::header::HOST)?.to_str().ok()?;
    Some(format!("http://{host}{}", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> http::Request<()> {
        http::Request::builder()
            .method("POST")
            .uri("/orders?page=2")
            .header("host", "shop.example")
            .header("content-type", "application/json")
            .header("authorization", "Bearer secret")
            .header("cookie", "session=abc")
            .body(())
            .unwrap()
    }

    #[test]
    fn event_request_mirrors_request_head() {
        let r = event_request(&request(), false);

        assert_eq!(r.method.as_deref(), Some("POST"));
        assert_eq!(r.url.map(|u| u.to_string()).as_deref(), Some("http://shop.example/orders"));
        assert_eq!(r.query_string.as_deref(), Some("page=2"));
        assert_eq!(r.headers.get("content-type").map(String::as_str), Some("application/json"));
        assert_eq!(r.headers.get("host").map(String::as_str), Some("shop.example"));
    }

    #[test]
    fn sensitive_headers_are_dropped_without_pii() {
        let r = event_request(&request(), false);

        assert!(!r.headers.contains_key("authorization"));
        assert!(!r.headers.contains_key("cookie"));
        assert!(r.cookies.is_none());
    }

    #[test]
    fn sensitive_headers_are_kept_with_pii() {
        let r = event_request(&request(), true);

        assert_eq!(r.headers.get("authorization").map(String::as_str), Some("Bearer secret"));
        assert_eq!(r.cookies.as_deref(), Some("session=abc"));
    }

    #[test]
    fn absolute_uri_is_kept() {
        let req = http::Request::get("https://api.example/v1/items").body(()).unwrap();
        let r = event_request(&req, false);
        assert_eq!(r.url.map(|u| u.to_string()).as_deref(), Some("https://api.example/v1/items"));
    }

    #[test]
    fn no_host_means_no_url() {
        let req = http::Request::get("/health").body(()).unwrap();
        assert!(event_request(&req, false).url.is_none());
    }

    #[test]
    fn header_values_keeps_first_value_per_name() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", "one".parse().unwrap());
        headers.append("x-tag", "two".parse().unwrap());
        headers.insert("x-other", "three".parse().unwrap());

        let mut seen: Vec<_> = header_values(&headers).collect();
        seen.sort();
        assert_eq!(seen, vec![("x-other", "three".to_owned()), ("x-tag", "one".to_owned())]);
    }
}
