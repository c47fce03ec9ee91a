//! Composable options that configure a single `send` call.
//!
//! # Design
//! A [`RequestOption`] is a fallible mutation of a [`RequestConfig`]. Options
//! are applied in the order given; the first failure aborts the call before
//! any network activity and later options are never applied.
//!
//! Response processing is expressed as two strategy enums instead of stored
//! closures with hidden defaults: [`ResponseHandler`] runs first with the
//! whole response, [`HeaderHandler`] runs only if it succeeded. Caller slots
//! are `&mut` borrows, so decoded values land directly in caller storage and
//! the borrow checker ties them to the lifetime of the call.

use std::fmt;
use std::io::{self, Read};

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::{RequestBody, Response};

type Apply<'a> = Box<dyn FnOnce(&mut RequestConfig<'a>) -> Result<()> + 'a>;
type DecodeFn<'a> = Box<dyn FnOnce(&[u8]) -> Result<()> + 'a>;
type ResponseFn<'a> = Box<dyn FnOnce(Response) -> Result<()> + 'a>;
type HeaderFn<'a> = Box<dyn FnOnce(&HeaderMap) -> Result<()> + 'a>;

/// What to do with the response once the transport returns it.
#[derive(Default)]
pub enum ResponseHandler<'a> {
    /// Fail unless the status is `200 OK`. The body is left unread.
    #[default]
    RequireOk,
    /// Hand the raw response to the caller without inspecting it.
    Capture(&'a mut Option<Response>),
    /// Require `200 OK` and buffer the body into the caller's vector.
    Bytes(&'a mut Vec<u8>),
    /// Require `200 OK`, buffer the body and decode it.
    Decode(DecodeFn<'a>),
    /// Caller-supplied handler; its error is returned unchanged.
    Custom(ResponseFn<'a>),
}

impl fmt::Debug for ResponseHandler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponseHandler::RequireOk => "RequireOk",
            ResponseHandler::Capture(_) => "Capture",
            ResponseHandler::Bytes(_) => "Bytes",
            ResponseHandler::Decode(_) => "Decode",
            ResponseHandler::Custom(_) => "Custom",
        })
    }
}

impl ResponseHandler<'_> {
    pub(crate) fn handle(self, response: Response, limit: u64, ctx: &Context) -> Result<()> {
        match self {
            ResponseHandler::RequireOk => require_ok(response.status),
            ResponseHandler::Capture(slot) => {
                *slot = Some(response);
                Ok(())
            }
            ResponseHandler::Bytes(slot) => {
                *slot = read_response(response, limit, ctx)?;
                Ok(())
            }
            ResponseHandler::Decode(decode) => {
                let body = read_response(response, limit, ctx)?;
                decode(&body)
            }
            ResponseHandler::Custom(handler) => handler(response),
        }
    }
}

/// What to do with the response headers after the body handler succeeded.
#[derive(Default)]
pub enum HeaderHandler<'a> {
    #[default]
    Ignore,
    Capture(&'a mut HeaderMap),
    Custom(HeaderFn<'a>),
}

impl fmt::Debug for HeaderHandler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HeaderHandler::Ignore => "Ignore",
            HeaderHandler::Capture(_) => "Capture",
            HeaderHandler::Custom(_) => "Custom",
        })
    }
}

impl HeaderHandler<'_> {
    pub(crate) fn handle(self, headers: &HeaderMap) -> Result<()> {
        match self {
            HeaderHandler::Ignore => Ok(()),
            HeaderHandler::Capture(slot) => {
                *slot = headers.clone();
                Ok(())
            }
            HeaderHandler::Custom(handler) => handler(headers),
        }
    }
}

fn require_ok(status: StatusCode) -> Result<()> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(Error::Status(status))
    }
}

/// Buffer the whole body of a `200 OK` response, at most `limit` bytes.
///
/// The body is consumed and dropped (closed) before returning on the success
/// path; a non-200 response fails before the body is touched. A read that
/// times out after `ctx` is done reports the context error.
fn read_response(response: Response, limit: u64, ctx: &Context) -> Result<Vec<u8>> {
    require_ok(response.status)?;

    let mut body = Vec::new();
    response
        .into_body()
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|err| match ctx.err() {
            Some(done) if err.kind() == io::ErrorKind::TimedOut => Error::Context(done),
            _ => Error::Read(err),
        })?;
    if body.len() as u64 > limit {
        return Err(Error::BodyTooLarge { limit });
    }
    Ok(body)
}

/// Accumulated configuration for one `send` call.
#[derive(Debug)]
pub struct RequestConfig<'a> {
    pub(crate) method: String,
    pub(crate) body: Option<RequestBody>,
    pub(crate) content_type: Option<&'static str>,
    pub(crate) headers: HeaderMap,
    pub(crate) on_response: ResponseHandler<'a>,
    pub(crate) on_headers: HeaderHandler<'a>,
}

impl Default for RequestConfig<'_> {
    fn default() -> Self {
        Self {
            method: Method::GET.to_string(),
            body: None,
            content_type: None,
            headers: HeaderMap::new(),
            on_response: ResponseHandler::default(),
            on_headers: HeaderHandler::default(),
        }
    }
}

impl<'a> RequestConfig<'a> {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }

    /// Replace the body and switch the method to `POST`.
    pub fn set_body(&mut self, body: RequestBody) {
        self.body = Some(body);
        self.content_type = None;
        self.method = Method::POST.to_string();
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn set_response_handler(&mut self, handler: ResponseHandler<'a>) {
        self.on_response = handler;
    }

    pub fn set_header_handler(&mut self, handler: HeaderHandler<'a>) {
        self.on_headers = handler;
    }

    /// Add the recorded default `Content-Type` unless the caller set one.
    pub(crate) fn apply_content_type(&mut self) {
        if let Some(content_type) = self.content_type {
            self.headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static(content_type));
        }
    }

    fn set_encoded_body(&mut self, body: Vec<u8>, content_type: &'static str) {
        self.set_body(RequestBody::Bytes(body));
        self.content_type = Some(content_type);
    }
}

/// One fallible mutation of a [`RequestConfig`].
pub struct RequestOption<'a>(Apply<'a>);

impl<'a> RequestOption<'a> {
    /// Build a custom option from a closure.
    pub fn new(apply: impl FnOnce(&mut RequestConfig<'a>) -> Result<()> + 'a) -> Self {
        Self(Box::new(apply))
    }

    pub(crate) fn apply(self, config: &mut RequestConfig<'a>) -> Result<()> {
        (self.0)(config)
    }
}

impl fmt::Debug for RequestOption<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestOption(..)")
    }
}

/// Replace the whole outbound header map.
pub fn with_header<'a>(headers: HeaderMap) -> RequestOption<'a> {
    RequestOption::new(move |config| {
        config.headers = headers;
        Ok(())
    })
}

/// Append one header to the outbound map.
pub fn with_header_value<'a>(name: &'a str, value: &'a str) -> RequestOption<'a> {
    RequestOption::new(move |config| {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidHeader(format!("{name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidHeader(format!("{name}: {e}")))?;
        config.headers.append(name, value);
        Ok(())
    })
}

/// Stream the request body from `reader`. Switches the method to `POST`.
pub fn with_body<'a>(reader: impl Read + Send + 'static) -> RequestOption<'a> {
    RequestOption::new(move |config| {
        config.set_body(RequestBody::Reader(Box::new(reader)));
        Ok(())
    })
}

/// Send `bytes` as the request body. Switches the method to `POST`.
pub fn with_bytes_body<'a>(bytes: impl Into<Vec<u8>>) -> RequestOption<'a> {
    let bytes = bytes.into();
    RequestOption::new(move |config| {
        config.set_body(RequestBody::Bytes(bytes));
        Ok(())
    })
}

/// Serialize `value` as JSON into the request body. Switches the method to `POST`.
pub fn with_json_body<'a, T>(value: &'a T) -> RequestOption<'a>
where
    T: Serialize + ?Sized,
{
    RequestOption::new(move |config| {
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        config.set_encoded_body(body, "application/json");
        Ok(())
    })
}

/// Serialize `value` as XML into the request body. Switches the method to `POST`.
pub fn with_xml_body<'a, T>(value: &'a T) -> RequestOption<'a>
where
    T: Serialize + ?Sized,
{
    RequestOption::new(move |config| {
        let body = quick_xml::se::to_string(value).map_err(|e| Error::Serialization(e.to_string()))?;
        config.set_encoded_body(body.into_bytes(), "application/xml");
        Ok(())
    })
}

/// Override the request method. Validated when the request is built.
pub fn with_method<'a>(method: impl Into<String>) -> RequestOption<'a> {
    let method = method.into();
    RequestOption::new(move |config| {
        config.method = method;
        Ok(())
    })
}

/// Store the raw response in `slot` without checking its status.
pub fn with_response(slot: &mut Option<Response>) -> RequestOption<'_> {
    RequestOption::new(move |config| {
        config.on_response = ResponseHandler::Capture(slot);
        Ok(())
    })
}

/// Buffer the body of a `200 OK` response into `slot`.
pub fn with_bytes_response(slot: &mut Vec<u8>) -> RequestOption<'_> {
    RequestOption::new(move |config| {
        config.on_response = ResponseHandler::Bytes(slot);
        Ok(())
    })
}

/// Decode the JSON body of a `200 OK` response into `slot`.
pub fn with_json_response<T>(slot: &mut T) -> RequestOption<'_>
where
    T: DeserializeOwned,
{
    RequestOption::new(move |config| {
        config.on_response = ResponseHandler::Decode(Box::new(move |body: &[u8]| {
            *slot = serde_json::from_slice(body).map_err(|e| Error::Deserialization(e.to_string()))?;
            Ok(())
        }));
        Ok(())
    })
}

/// Decode the XML body of a `200 OK` response into `slot`.
pub fn with_xml_response<T>(slot: &mut T) -> RequestOption<'_>
where
    T: DeserializeOwned,
{
    RequestOption::new(move |config| {
        config.on_response = ResponseHandler::Decode(Box::new(move |body: &[u8]| {
            *slot = quick_xml::de::from_reader(body).map_err(|e| Error::Deserialization(e.to_string()))?;
            Ok(())
        }));
        Ok(())
    })
}

/// Process the response with `handler`, replacing the default status check.
pub fn with_response_handler<'a>(handler: impl FnOnce(Response) -> Result<()> + 'a) -> RequestOption<'a> {
    RequestOption::new(move |config| {
        config.on_response = ResponseHandler::Custom(Box::new(handler));
        Ok(())
    })
}

/// Copy the response headers into `slot`.
pub fn with_response_header(slot: &mut HeaderMap) -> RequestOption<'_> {
    RequestOption::new(move |config| {
        config.on_headers = HeaderHandler::Capture(slot);
        Ok(())
    })
}

/// Inspect the response headers with `handler`.
pub fn with_response_header_handler<'a>(
    handler: impl FnOnce(&HeaderMap) -> Result<()> + 'a,
) -> RequestOption<'a> {
    RequestOption::new(move |config| {
        config.on_headers = HeaderHandler::Custom(Box::new(handler));
        Ok(())
    })
}
