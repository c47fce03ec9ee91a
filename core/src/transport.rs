//! Ureq-based [`Transport`] (blocking).
//!
//! ureq has no notion of an external cancellation signal. A context that can
//! never be done (no cancel handle, no deadline) runs the round-trip inline on
//! the caller's thread. Otherwise the round-trip runs on a short-lived worker
//! thread while the caller waits on a channel and polls the [`Context`]. On
//! cancellation the caller returns at once, and the abandoned call ends at the
//! per-request timeout: the earlier of the context deadline and the client
//! timeout, or the cancel fallback when neither is set.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use ureq::SendBody;

use crate::config::ClientConfig;
use crate::context::Context;
use crate::error::{ContextError, Error, Result};
use crate::http::{Request, RequestBody, Response, ResponseBody, Transport};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A [`Transport`] backed by a shared [`ureq::Agent`].
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    timeout: Option<Duration>,
    cancel_fallback: Duration,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(config.timeout)
            .user_agent(config.user_agent.clone())
            // Status codes are interpreted by the response handlers.
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self::from_agent(agent, config)
    }

    /// Wrap an existing agent, taking timeouts from `config`. The agent must be
    /// configured with `http_status_as_error(false)` so non-200 responses
    /// reach the handlers.
    pub fn from_agent(agent: ureq::Agent, config: &ClientConfig) -> Self {
        Self {
            agent,
            timeout: config.timeout,
            cancel_fallback: config.cancel_fallback_timeout,
        }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, ctx: &Context, request: Request) -> Result<Response> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let deadline = ctx.deadline();
        if !ctx.can_be_done() {
            let timeout = request_timeout(deadline, self.timeout, None);
            return run(&self.agent, request, deadline, timeout);
        }

        let agent = self.agent.clone();
        let timeout = request_timeout(deadline, self.timeout, Some(self.cancel_fallback));
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("httpc-transport".to_string())
            .spawn(move || {
                // The receiver is gone if the caller already gave up.
                let _ = tx.send(run(&agent, request, deadline, timeout));
            })
            .map_err(|e| Error::Transport(Box::new(e)))?;

        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(err) = ctx.err() {
                        return Err(err.into());
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Transport("transport worker exited without a result".into()));
                }
            }
        }
    }
}

/// The tighter of the remaining deadline and the client timeout, else `fallback`.
fn request_timeout(
    deadline: Option<Instant>,
    client_timeout: Option<Duration>,
    fallback: Option<Duration>,
) -> Option<Duration> {
    let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
    match (remaining, client_timeout) {
        (Some(remaining), Some(timeout)) => Some(remaining.min(timeout)),
        (remaining, timeout) => remaining.or(timeout).or(fallback),
    }
}

fn run(
    agent: &ureq::Agent,
    request: Request,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
) -> Result<Response> {
    let Request {
        method,
        url,
        headers,
        body,
    } = request;

    let mut builder = http::Request::builder().method(method).uri(url);
    if let Some(map) = builder.headers_mut() {
        *map = headers;
    }

    let result = match body {
        None => {
            let req = builder
                .body(())
                .map_err(|e| Error::InvalidRequest(e.to_string()))?;
            agent.run(with_timeout(agent, req, timeout))
        }
        Some(RequestBody::Bytes(bytes)) => {
            let req = builder
                .body(bytes)
                .map_err(|e| Error::InvalidRequest(e.to_string()))?;
            agent.run(with_timeout(agent, req, timeout))
        }
        Some(RequestBody::Reader(mut reader)) => {
            let req = builder
                .body(SendBody::from_reader(&mut reader))
                .map_err(|e| Error::InvalidRequest(e.to_string()))?;
            agent.run(with_timeout(agent, req, timeout))
        }
    };

    match result {
        Ok(response) => Ok(convert_response(response)),
        Err(ureq::Error::Timeout(_)) if deadline.is_some_and(|d| d <= Instant::now()) => {
            Err(ContextError::DeadlineExceeded.into())
        }
        Err(e) => Err(Error::Transport(Box::new(e))),
    }
}

/// Bound a single request, replacing the agent-wide timeout.
fn with_timeout<B: ureq::AsSendBody>(
    agent: &ureq::Agent,
    request: http::Request<B>,
    timeout: Option<Duration>,
) -> http::Request<B> {
    match timeout {
        Some(timeout) => agent
            .configure_request(request)
            .timeout_global(Some(timeout))
            .build(),
        None => request,
    }
}

/// Convert a ureq `http::Response<Body>`, leaving the body unread.
fn convert_response(response: http::Response<ureq::Body>) -> Response {
    let (parts, body) = response.into_parts();
    Response::new(parts.status, parts.headers, ResponseBody::new(body.into_reader()))
}
