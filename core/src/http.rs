//! Transport-level request and response types and the transport seam.
//!
//! # Design
//! `send` builds a [`Request`] from the accumulated options and hands it to a
//! [`Transport`]. The transport owns connection reuse, TLS and timeouts; this
//! crate only owns marshaling on either side of it. Keeping the seam a trait
//! lets tests substitute an in-memory transport for the real network.

use std::fmt;
use std::io::Read;

use http::{HeaderMap, Method, StatusCode, Uri};

use crate::context::Context;
use crate::error::Result;

/// Outbound request body.
pub enum RequestBody {
    Bytes(Vec<u8>),
    Reader(Box<dyn Read + Send>),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            RequestBody::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// A fully built request, ready for a [`Transport`].
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: Uri,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

/// Unread response body. Dropping it closes the underlying stream.
pub struct ResponseBody(Box<dyn Read + Send>);

impl ResponseBody {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self(Box::new(reader))
    }

    pub fn empty() -> Self {
        Self::new(std::io::empty())
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody(..)")
    }
}

/// A response as returned by a [`Transport`], body still unread.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: ResponseBody,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}

/// Executes requests on behalf of [`Client`](crate::Client).
///
/// Implementations must stop waiting and return
/// [`Error::Context`](crate::Error::Context) once `ctx` is cancelled or its
/// deadline passes.
pub trait Transport: Send + Sync {
    fn execute(&self, ctx: &Context, request: Request) -> Result<Response>;
}
