//! Caller-owned execution context: cancellation, deadlines, logging scope.
//!
//! # Design
//! A `Context` is an immutable node in a parent chain. Cancellation is a flag
//! on the node that created it; `err()` walks the chain, so children observe
//! a parent's cancellation or deadline without any registration step, and
//! cancelling a child never reaches the parent.
//!
//! The context also carries the `tracing::Span` that was current when it was
//! created and, optionally, an inbound request id. `send` never copies that id
//! into outbound headers on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Span;

use crate::error::ContextError;

#[derive(Debug)]
struct Node {
    parent: Option<Context>,
    cancelable: bool,
    canceled: AtomicBool,
    deadline: Option<Instant>,
    request_id: Option<String>,
    span: Span,
}

/// Execution context bound to a single logical call chain.
#[derive(Debug, Clone)]
pub struct Context {
    node: Arc<Node>,
}

/// Cancels the [`Context`] returned alongside it by [`Context::with_cancel`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    node: Arc<Node>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.node.canceled.store(true, Ordering::Release);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A root context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::root(Span::current())
    }

    /// A root context whose logging scope is `span`.
    pub fn with_span(span: Span) -> Self {
        Self::root(span)
    }

    fn root(span: Span) -> Self {
        Self {
            node: Arc::new(Node {
                parent: None,
                cancelable: false,
                canceled: AtomicBool::new(false),
                deadline: None,
                request_id: None,
                span,
            }),
        }
    }

    fn child(
        parent: &Context,
        cancelable: bool,
        deadline: Option<Instant>,
        request_id: Option<String>,
    ) -> Self {
        Self {
            node: Arc::new(Node {
                parent: Some(parent.clone()),
                cancelable,
                canceled: AtomicBool::new(false),
                deadline,
                request_id,
                span: parent.node.span.clone(),
            }),
        }
    }

    /// A child context plus the handle that cancels it.
    pub fn with_cancel(parent: &Context) -> (Self, CancelHandle) {
        let ctx = Self::child(parent, true, None, None);
        let handle = CancelHandle {
            node: Arc::clone(&ctx.node),
        };
        (ctx, handle)
    }

    pub fn with_timeout(parent: &Context, timeout: Duration) -> Self {
        Self::with_deadline(parent, Instant::now() + timeout)
    }

    pub fn with_deadline(parent: &Context, deadline: Instant) -> Self {
        Self::child(parent, false, Some(deadline), None)
    }

    /// A child context carrying an inbound request id.
    pub fn with_request_id(parent: &Context, request_id: impl Into<String>) -> Self {
        Self::child(parent, false, None, Some(request_id.into()))
    }

    /// Why this context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        let now = Instant::now();
        let mut node = Some(self);
        while let Some(ctx) = node {
            if ctx.node.canceled.load(Ordering::Acquire) {
                return Some(ContextError::Canceled);
            }
            if ctx.node.deadline.is_some_and(|deadline| deadline <= now) {
                return Some(ContextError::DeadlineExceeded);
            }
            node = ctx.node.parent.as_ref();
        }
        None
    }

    /// Whether anything along the chain can ever end this context: a cancel
    /// handle or a deadline. `background()` and its request-id children
    /// cannot.
    pub fn can_be_done(&self) -> bool {
        let mut node = Some(self);
        while let Some(ctx) = node {
            if ctx.node.cancelable || ctx.node.deadline.is_some() {
                return true;
            }
            node = ctx.node.parent.as_ref();
        }
        false
    }

    /// The earliest deadline along the parent chain.
    pub fn deadline(&self) -> Option<Instant> {
        let mut earliest: Option<Instant> = None;
        let mut node = Some(self);
        while let Some(ctx) = node {
            if let Some(deadline) = ctx.node.deadline {
                earliest = Some(earliest.map_or(deadline, |e| e.min(deadline)));
            }
            node = ctx.node.parent.as_ref();
        }
        earliest
    }

    /// Time left before the deadline, `Some(Duration::ZERO)` once it passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// The nearest inbound request id along the parent chain.
    pub fn request_id(&self) -> Option<&str> {
        let mut node = Some(self);
        while let Some(ctx) = node {
            if let Some(id) = ctx.node.request_id.as_deref() {
                return Some(id);
            }
            node = ctx.node.parent.as_ref();
        }
        None
    }

    pub fn span(&self) -> &Span {
        &self.node.span
    }
}
