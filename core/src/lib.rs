//! A thin convenience layer over a blocking HTTP client.
//!
//! # Overview
//! One entry point, [`Client::send`] (or the free [`send`] on the process-wide
//! client), configured by composable [`RequestOption`]s that set the method,
//! body (bytes, stream, JSON, XML), headers, and how the response is consumed
//! (raw, bytes, JSON, XML, headers). [`RawUrl`] normalizes loosely written
//! URLs.
//!
//! # Design
//! - Options are applied in order to a fresh per-call [`RequestConfig`]; the
//!   first failing option ends the call before any network activity.
//! - The network round-trip goes through the [`Transport`] trait. The default
//!   implementation is [`UreqTransport`]; tests inject their own.
//! - Cancellation and deadlines come from the caller's [`Context`].
//! - Every outbound request carries a request id under
//!   [`REQUEST_ID_HEADER`], generated fresh unless the caller set one.
//!
//! ```no_run
//! use httpc::{with_json_body, with_json_response, Context};
//!
//! #[derive(serde::Serialize, serde::Deserialize, Default)]
//! struct Echo { message: String }
//!
//! let ctx = Context::background();
//! let sent = Echo { message: "hi".to_string() };
//! let mut received = Echo::default();
//! httpc::send(
//!     &ctx,
//!     "http://localhost:3000/echo",
//!     [with_json_body(&sent), with_json_response(&mut received)],
//! )?;
//! # Ok::<(), httpc::Error>(())
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod options;
pub mod request_id;
pub mod transport;
pub mod url;

pub use client::{default_client, init_default, send, Client};
pub use config::ClientConfig;
pub use context::{CancelHandle, Context};
pub use error::{ContextError, Error, Result};
pub use crate::http::{Request, RequestBody, Response, ResponseBody, Transport};
pub use options::{
    with_body, with_bytes_body, with_bytes_response, with_header, with_header_value, with_json_body,
    with_json_response, with_method, with_response, with_response_handler, with_response_header,
    with_response_header_handler, with_xml_body, with_xml_response, HeaderHandler, RequestConfig,
    RequestOption, ResponseHandler,
};
pub use request_id::{random_id, REQUEST_ID_HEADER};
pub use transport::UreqTransport;
pub use crate::url::{clean_path, RawUrl};
