//! The `send` entry point.
//!
//! # Design
//! `Client` holds only an injected [`Transport`] and a [`ClientConfig`]; it
//! carries no mutable state between calls. Each `send` builds a fresh
//! [`RequestConfig`], applies the caller's options in order, stamps a request
//! id, and then walks a fixed pipeline: build the request, execute it, run the
//! response handler, run the header handler. The first failure ends the call.
//!
//! A process-wide default client backs the free [`send`] function. Install
//! one explicitly with [`init_default`] before first use; otherwise the first
//! call builds a ureq-backed client from [`ClientConfig::from_env`].

use std::sync::{Arc, OnceLock};

use http::{HeaderValue, Method, Uri};
use tracing::{debug, debug_span, error, info};

use crate::config::ClientConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::{Request, Transport};
use crate::options::{RequestConfig, RequestOption};
use crate::request_id::{random_id, REQUEST_ID_HEADER};
use crate::transport::UreqTransport;

static DEFAULT_CLIENT: OnceLock<Client> = OnceLock::new();

/// Sends requests through an injected [`Transport`].
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::from_config(ClientConfig::default())
    }
}

impl Client {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: impl Transport + 'static, config: ClientConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
        }
    }

    /// A client backed by [`UreqTransport`] built from `config`.
    pub fn from_config(config: ClientConfig) -> Self {
        let transport = UreqTransport::new(&config);
        Self::with_config(transport, config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one request to `url`, configured by `options` applied in order.
    ///
    /// Returns the first error from option application, request
    /// construction, the transport, or the response/header handlers.
    pub fn send<'a, I>(&self, ctx: &Context, url: &str, options: I) -> Result<()>
    where
        I: IntoIterator<Item = RequestOption<'a>>,
    {
        let mut config = RequestConfig::default();
        for option in options {
            option.apply(&mut config)?;
        }

        let rid = ensure_request_id(&mut config);
        config.apply_content_type();

        let span = debug_span!(parent: ctx.span(), "send", reqid = %rid, url = %url);
        let _entered = span.enter();

        debug!("start");

        let RequestConfig {
            method,
            body,
            headers,
            on_response,
            on_headers,
            ..
        } = config;

        let request = match build_request(&method, url) {
            Ok((method, url)) => Request {
                method,
                url,
                headers,
                body,
            },
            Err(err) => {
                error!(error = %err, "building request");
                return Err(err);
            }
        };

        let response = self.transport.execute(ctx, request).map_err(|err| {
            error!(error = %err, "executing request");
            err
        })?;

        // Headers are inspected only after the body handler succeeded.
        let headers = response.headers.clone();
        on_response
            .handle(response, self.config.max_response_bytes, ctx)
            .map_err(|err| {
                error!(error = %err, "handling response");
                err
            })?;
        on_headers.handle(&headers).map_err(|err| {
            error!(error = %err, "handling response headers");
            err
        })?;

        info!("end");
        Ok(())
    }
}

/// Keep a caller-supplied, non-empty request id, otherwise stamp a fresh one.
/// Returns the id for the logging scope, lossily decoded if it is not UTF-8.
///
/// The inbound id on the context is not consulted; callers that want
/// propagation copy it into the header themselves.
fn ensure_request_id(config: &mut RequestConfig<'_>) -> String {
    if let Some(value) = config.headers.get(REQUEST_ID_HEADER) {
        if !value.as_bytes().is_empty() {
            return String::from_utf8_lossy(value.as_bytes()).into_owned();
        }
    }

    let rid = random_id();
    if let Ok(value) = HeaderValue::from_str(&rid) {
        config.headers.insert(REQUEST_ID_HEADER, value);
    }
    rid
}

fn build_request(method: &str, url: &str) -> Result<(Method, Uri)> {
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|e| Error::InvalidRequest(format!("method {method:?}: {e}")))?;
    let uri: Uri = url
        .parse()
        .map_err(|e| Error::InvalidRequest(format!("url {url:?}: {e}")))?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(Error::InvalidRequest(format!("url {url:?}: missing scheme or host")));
    }
    Ok((method, uri))
}

/// Install the process-wide client used by [`send`]. Fails, handing the
/// client back, if one is already installed.
pub fn init_default(client: Client) -> std::result::Result<(), Client> {
    DEFAULT_CLIENT.set(client)
}

/// The process-wide client, built from the environment on first use if
/// [`init_default`] was never called.
pub fn default_client() -> &'static Client {
    DEFAULT_CLIENT.get_or_init(|| Client::from_config(ClientConfig::from_env()))
}

/// [`Client::send`] on the [`default_client`].
pub fn send<'a, I>(ctx: &Context, url: &str, options: I) -> Result<()>
where
    I: IntoIterator<Item = RequestOption<'a>>,
{
    default_client().send(ctx, url, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContextError;
    use crate::http::{RequestBody, Response, ResponseBody};
    use crate::options::*;
    use http::header::CONTENT_TYPE;
    use http::{HeaderMap, StatusCode};
    use serde::{Deserialize, Serialize};
    use std::cell::Cell;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What the fake transport saw for one request.
    #[derive(Debug, Clone)]
    struct Seen {
        method: Method,
        url: String,
        headers: HeaderMap,
        body: Vec<u8>,
    }

    /// In-memory transport: records requests and answers with a canned
    /// status, echoing the request body and an `x-echo` header.
    struct FakeTransport {
        status: StatusCode,
        seen: Mutex<Vec<Seen>>,
        closed: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
    }

    impl FakeTransport {
        fn new(status: StatusCode) -> Self {
            Self {
                status,
                seen: Mutex::new(Vec::new()),
                closed: Arc::new(AtomicUsize::new(0)),
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    /// Body reader that counts its reads and how many times it is dropped.
    struct CountingBody {
        data: std::io::Cursor<Vec<u8>>,
        closed: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
    }

    impl Read for CountingBody {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.data.read(buf)
        }
    }

    impl Drop for CountingBody {
        fn drop(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Transport for FakeTransport {
        fn execute(&self, ctx: &Context, request: Request) -> Result<Response> {
            if let Some(err) = ctx.err() {
                return Err(err.into());
            }
            let body = match request.body {
                None => Vec::new(),
                Some(RequestBody::Bytes(bytes)) => bytes,
                Some(RequestBody::Reader(mut reader)) => {
                    let mut bytes = Vec::new();
                    reader.read_to_end(&mut bytes).map_err(|e| Error::Transport(Box::new(e)))?;
                    bytes
                }
            };
            self.seen.lock().unwrap().push(Seen {
                method: request.method,
                url: request.url.to_string(),
                headers: request.headers,
                body: body.clone(),
            });
            let mut headers = HeaderMap::new();
            headers.insert("x-echo", HeaderValue::from_static("yes"));
            let body = CountingBody {
                data: std::io::Cursor::new(body),
                closed: Arc::clone(&self.closed),
                reads: Arc::clone(&self.reads),
            };
            Ok(Response::new(self.status, headers, ResponseBody::new(body)))
        }
    }

    fn fake(status: StatusCode) -> (Client, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::new(status));
        (Client::new(SharedFake(Arc::clone(&transport))), transport)
    }

    struct SharedFake(Arc<FakeTransport>);

    impl Transport for SharedFake {
        fn execute(&self, ctx: &Context, request: Request) -> Result<Response> {
            self.0.execute(ctx, request)
        }
    }

    fn last_seen(transport: &FakeTransport) -> Seen {
        transport.seen.lock().unwrap().last().cloned().unwrap()
    }

    const URL: &str = "http://localhost:3000/echo";

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u64,
        item: String,
        quantity: u32,
    }

    #[test]
    fn default_send_is_get_and_checks_status() {
        let (client, transport) = fake(StatusCode::OK);
        client.send(&Context::background(), URL, []).unwrap();
        let seen = last_seen(&transport);
        assert_eq!(seen.method, Method::GET);
        assert_eq!(seen.url, URL);
        assert!(seen.body.is_empty());

        let (client, _) = fake(StatusCode::NOT_FOUND);
        let err = client.send(&Context::background(), URL, []).unwrap_err();
        assert_eq!(err.to_string(), "404 Not Found");
    }

    #[test]
    fn failing_option_skips_network_and_later_options() {
        let (client, transport) = fake(StatusCode::OK);
        let later = Cell::new(false);
        let err = client
            .send(
                &Context::background(),
                URL,
                [
                    with_header_value("bad header", "x"),
                    RequestOption::new(|_| {
                        later.set(true);
                        Ok(())
                    }),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
        assert!(!later.get());
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn generates_request_id_when_absent() {
        let (client, transport) = fake(StatusCode::OK);
        let ctx = Context::with_request_id(&Context::background(), "inbound-id");
        client.send(&ctx, URL, []).unwrap();
        client.send(&ctx, URL, []).unwrap();

        let seen = transport.seen.lock().unwrap();
        let first = seen[0].headers[REQUEST_ID_HEADER].to_str().unwrap().to_string();
        let second = seen[1].headers[REQUEST_ID_HEADER].to_str().unwrap().to_string();
        assert!(!first.is_empty());
        assert_ne!(first, second);
        assert_ne!(first, "inbound-id");
    }

    #[test]
    fn preserves_caller_request_id() {
        let (client, transport) = fake(StatusCode::OK);
        client
            .send(
                &Context::background(),
                URL,
                [with_header_value(REQUEST_ID_HEADER, "caller-chosen")],
            )
            .unwrap();
        assert_eq!(last_seen(&transport).headers[REQUEST_ID_HEADER], "caller-chosen");
    }

    #[test]
    fn empty_request_id_is_replaced() {
        let (client, transport) = fake(StatusCode::OK);
        client
            .send(&Context::background(), URL, [with_header_value(REQUEST_ID_HEADER, "")])
            .unwrap();
        let seen = last_seen(&transport);
        assert_eq!(seen.headers.get_all(REQUEST_ID_HEADER).iter().count(), 1);
        assert!(!seen.headers[REQUEST_ID_HEADER].is_empty());
    }

    #[test]
    fn json_round_trip_through_echo() {
        let (client, transport) = fake(StatusCode::OK);
        let order = Order {
            id: 42,
            item: "lamp".to_string(),
            quantity: 2,
        };
        let mut echoed = Order::default();
        client
            .send(
                &Context::background(),
                URL,
                [with_json_body(&order), with_json_response(&mut echoed)],
            )
            .unwrap();
        assert_eq!(echoed, order);

        let seen = last_seen(&transport);
        assert_eq!(seen.method, Method::POST);
        assert_eq!(seen.headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn xml_round_trip_through_echo() {
        let (client, transport) = fake(StatusCode::OK);
        let order = Order {
            id: 7,
            item: "desk".to_string(),
            quantity: 1,
        };
        let mut echoed = Order::default();
        client
            .send(
                &Context::background(),
                URL,
                [with_xml_body(&order), with_xml_response(&mut echoed)],
            )
            .unwrap();
        assert_eq!(echoed, order);
        assert_eq!(last_seen(&transport).headers[CONTENT_TYPE], "application/xml");
    }

    #[test]
    fn method_override_after_body() {
        let (client, transport) = fake(StatusCode::OK);
        client
            .send(
                &Context::background(),
                URL,
                [with_bytes_body("payload"), with_method("PUT")],
            )
            .unwrap();
        let seen = last_seen(&transport);
        assert_eq!(seen.method, Method::PUT);
        assert_eq!(seen.body, b"payload");
        assert!(seen.headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn stream_body_is_sent() {
        let (client, transport) = fake(StatusCode::OK);
        let mut echoed = Vec::new();
        client
            .send(
                &Context::background(),
                URL,
                [
                    with_body(std::io::Cursor::new(b"streamed".to_vec())),
                    with_bytes_response(&mut echoed),
                ],
            )
            .unwrap();
        assert_eq!(echoed, b"streamed");
        assert_eq!(last_seen(&transport).method, Method::POST);
    }

    #[test]
    fn invalid_method_is_a_request_error() {
        let (client, transport) = fake(StatusCode::OK);
        let err = client
            .send(&Context::background(), URL, [with_method("BAD METHOD")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn relative_url_is_a_request_error() {
        let (client, _) = fake(StatusCode::OK);
        let err = client.send(&Context::background(), "/echo", []).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn canceled_context_fails_before_transport_work() {
        let (client, transport) = fake(StatusCode::OK);
        let (ctx, cancel) = Context::with_cancel(&Context::background());
        cancel.cancel();
        let err = client.send(&ctx, URL, []).unwrap_err();
        assert!(matches!(err, Error::Context(ContextError::Canceled)));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn body_is_closed_once_after_bytes_response() {
        let (client, transport) = fake(StatusCode::OK);
        let mut bytes = Vec::new();
        client
            .send(
                &Context::background(),
                URL,
                [with_bytes_body("abc"), with_bytes_response(&mut bytes)],
            )
            .unwrap();
        assert_eq!(bytes, b"abc");
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_status_skips_decode_and_headers() {
        let (client, _) = fake(StatusCode::INTERNAL_SERVER_ERROR);
        let mut order = Order::default();
        let mut headers = HeaderMap::new();
        let err = client
            .send(
                &Context::background(),
                URL,
                [
                    with_bytes_body(r#"{"id":1,"item":"x","quantity":1}"#),
                    with_json_response(&mut order),
                    with_response_header(&mut headers),
                ],
            )
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(order, Order::default());
        assert!(headers.is_empty());
    }

    #[test]
    fn response_headers_are_captured() {
        let (client, _) = fake(StatusCode::OK);
        let mut headers = HeaderMap::new();
        client
            .send(&Context::background(), URL, [with_response_header(&mut headers)])
            .unwrap();
        assert_eq!(headers["x-echo"], "yes");
    }

    #[test]
    fn raw_response_is_captured_regardless_of_status() {
        let (client, _) = fake(StatusCode::ACCEPTED);
        let mut response = None;
        client
            .send(&Context::background(), URL, [with_response(&mut response)])
            .unwrap();
        assert_eq!(response.map(|r| r.status), Some(StatusCode::ACCEPTED));
    }

    #[test]
    fn custom_handler_errors_are_returned_verbatim() {
        let (client, _) = fake(StatusCode::OK);
        let header_ran = Cell::new(false);
        let err = client
            .send(
                &Context::background(),
                URL,
                [
                    with_response_handler(|_| Err(Error::other("rejected by handler"))),
                    with_response_header_handler(|_| {
                        header_ran.set(true);
                        Ok(())
                    }),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "rejected by handler");
        assert!(!header_ran.get());

        let err = client
            .send(
                &Context::background(),
                URL,
                [with_response_header_handler(|headers| {
                    assert_eq!(headers["x-echo"], "yes");
                    Err(Error::other("header check failed"))
                })],
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "header check failed");
    }

    #[test]
    fn response_limit_comes_from_config() {
        let transport = FakeTransport::new(StatusCode::OK);
        let config = ClientConfig {
            max_response_bytes: 3,
            ..ClientConfig::default()
        };
        let client = Client::with_config(transport, config);
        let mut bytes = Vec::new();
        let err = client
            .send(
                &Context::background(),
                URL,
                [with_bytes_body("too long"), with_bytes_response(&mut bytes)],
            )
            .unwrap_err();
        assert!(matches!(err, Error::BodyTooLarge { limit: 3 }));
    }

    #[test]
    fn non_utf8_request_id_is_preserved() {
        let (client, transport) = fake(StatusCode::OK);
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_bytes(b"trace-\xe9").unwrap());
        client
            .send(&Context::background(), URL, [with_header(headers)])
            .unwrap();
        let seen = last_seen(&transport);
        assert_eq!(seen.headers.get_all(REQUEST_ID_HEADER).iter().count(), 1);
        assert_eq!(seen.headers[REQUEST_ID_HEADER].as_bytes(), b"trace-\xe9");
    }

    #[test]
    fn decoded_bodies_are_closed_once() {
        let order = Order {
            id: 3,
            item: "chair".to_string(),
            quantity: 4,
        };

        let (client, transport) = fake(StatusCode::OK);
        let mut echoed = Order::default();
        client
            .send(
                &Context::background(),
                URL,
                [with_json_body(&order), with_json_response(&mut echoed)],
            )
            .unwrap();
        assert_eq!(echoed, order);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);

        let (client, transport) = fake(StatusCode::OK);
        let mut echoed = Order::default();
        client
            .send(
                &Context::background(),
                URL,
                [with_xml_body(&order), with_xml_response(&mut echoed)],
            )
            .unwrap();
        assert_eq!(echoed, order);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_status_closes_body_without_reading() {
        let (client, transport) = fake(StatusCode::BAD_GATEWAY);
        let mut order = Order::default();
        let err = client
            .send(
                &Context::background(),
                URL,
                [with_bytes_body("{}"), with_json_response(&mut order)],
            )
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(transport.reads.load(Ordering::SeqCst), 0);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);

        let (client, transport) = fake(StatusCode::NOT_FOUND);
        client.send(&Context::background(), URL, []).unwrap_err();
        assert_eq!(transport.reads.load(Ordering::SeqCst), 0);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn config_is_exposed() {
        let config = ClientConfig {
            max_response_bytes: 64,
            user_agent: "inventory-sync/2".to_string(),
            ..ClientConfig::default()
        };
        let client = Client::with_config(FakeTransport::new(StatusCode::OK), config);
        assert_eq!(client.config().max_response_bytes, 64);
        assert_eq!(client.config().user_agent, "inventory-sync/2");
        assert_eq!(Client::new(FakeTransport::new(StatusCode::OK)).config().timeout, None);
    }
}
