//! Message types shared by lanes, worker slots and the dispatcher
//!
//! A [`LaneRequest`] carries one payload plus an optional one-shot reply
//! channel. The reply channel is present only when the caller asked to wait
//! for the handler's result; fire-and-forget requests carry `None`.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::sync::oneshot;

/// Boxed error returned by handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Future returned by an installed handler
pub type HandlerFuture<R> = Pin<Box<dyn Future<Output = Result<R, HandlerError>> + Send>>;

/// Handler shared by every lane of a dispatcher
pub type Handler<P, R> = Arc<dyn Fn(P) -> HandlerFuture<R> + Send + Sync>;

/// Wrap an async closure into a [`Handler`]
///
/// Any error type convertible into [`HandlerError`] is accepted so callers can
/// return their own `thiserror` enums.
pub fn handler_fn<P, R, E, F, Fut>(f: F) -> Handler<P, R>
where
  P: 'static,
  R: 'static,
  F: Fn(P) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<R, E>> + Send + 'static,
  E: Into<HandlerError> + 'static,
{
  Arc::new(move |payload| {
    let fut = f(payload);
    Box::pin(async move { fut.await.map_err(Into::into) })
  })
}

// ============================================================================
// Payload
// ============================================================================

/// A value that can travel through a lane
///
/// `is_empty` marks payloads the dispatcher rejects up front with
/// [`DispatchError::InvalidInput`].
pub trait Payload: Send + 'static {
  fn is_empty(&self) -> bool {
    false
  }
}

impl Payload for String {
  fn is_empty(&self) -> bool {
    String::is_empty(self)
  }
}

impl<T: Send + 'static> Payload for Vec<T> {
  fn is_empty(&self) -> bool {
    Vec::is_empty(self)
  }
}

impl Payload for serde_json::Value {
  fn is_empty(&self) -> bool {
    match self {
      serde_json::Value::Null => true,
      serde_json::Value::String(s) => s.is_empty(),
      serde_json::Value::Array(a) => a.is_empty(),
      serde_json::Value::Object(o) => o.is_empty(),
      _ => false,
    }
  }
}

// ============================================================================
// Lane Requests
// ============================================================================

/// Reply channel for a synchronous request
pub type ReplySender<R> = oneshot::Sender<Result<R, DispatchError>>;

/// A request buffered in a lane
pub struct LaneRequest<P, R> {
  /// The payload handed to the handler
  pub payload: P,
  /// Reply channel, present iff the caller waits for the result
  pub reply: Option<ReplySender<R>>,
}

impl<P, R> LaneRequest<P, R> {
  /// Fire-and-forget request
  pub fn detached(payload: P) -> Self {
    Self { payload, reply: None }
  }

  /// Request whose result is delivered on the returned receiver
  pub fn with_reply(payload: P) -> (Self, oneshot::Receiver<Result<R, DispatchError>>) {
    let (tx, rx) = oneshot::channel();
    (
      Self {
        payload,
        reply: Some(tx),
      },
      rx,
    )
  }

  pub fn wants_response(&self) -> bool {
    self.reply.is_some()
  }
}

// ============================================================================
// Routing
// ============================================================================

/// How the dispatcher picks a slot for a request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Route {
  /// Uniformly random slot
  #[default]
  Any,
  /// Slot derived from the key's hash on every call
  Hashed(String),
  /// Slot derived from the key's hash once, then cached for the
  /// dispatcher's lifetime
  Sticky(String),
}

impl Route {
  /// Deterministic route for `key`, or [`Route::Any`] when the key is empty
  pub fn hashed(key: impl Into<String>) -> Self {
    let key = key.into();
    if key.is_empty() { Self::Any } else { Self::Hashed(key) }
  }

  /// Cached route for `key`, or [`Route::Any`] when the key is empty
  pub fn sticky(key: impl Into<String>) -> Self {
    let key = key.into();
    if key.is_empty() { Self::Any } else { Self::Sticky(key) }
  }

  pub fn key(&self) -> Option<&str> {
    match self {
      Self::Any => None,
      Self::Hashed(key) | Self::Sticky(key) => Some(key),
    }
  }
}

impl From<&str> for Route {
  fn from(key: &str) -> Self {
    Self::hashed(key)
  }
}

impl From<String> for Route {
  fn from(key: String) -> Self {
    Self::hashed(key)
  }
}

impl From<Option<&str>> for Route {
  fn from(key: Option<&str>) -> Self {
    key.map(Self::hashed).unwrap_or_default()
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors returned by lanes, slots and the dispatcher
///
/// Validation errors are always returned to the caller. `Handler`,
/// `HandlerPanicked` and `NoHandler` only reach callers that asked for a
/// response; fire-and-forget requests drop them after the lane logs a warning.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
  #[error("Invalid input: {0}")]
  InvalidInput(&'static str),
  #[error("No workers available")]
  NoWorkers,
  #[error("Lane {0} is not running")]
  NotRunning(u64),
  #[error("No handler installed on lane {0}")]
  NoHandler(u64),
  #[error("Handler failed: {0}")]
  Handler(#[source] HandlerError),
  #[error("Handler panicked: {0}")]
  HandlerPanicked(String),
}
