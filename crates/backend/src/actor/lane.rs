//! Lane - a bounded FIFO buffer with exactly one consumer task
//!
//! Each lane owns a `tokio::sync::mpsc` channel and a background task that
//! pulls requests one at a time and runs the installed handler on them. At
//! most one handler invocation is in flight per lane, so requests routed to
//! the same lane are processed strictly in arrival order.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──spawn──▶ Running ──shutdown──▶ Draining ──▶ Stopped
//! ```
//!
//! On shutdown the lane stops accepting, processes whatever is already
//! buffered (still through the handler), and only then lets its task exit.

use std::{
  panic::AssertUnwindSafe,
  sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
  },
};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::message::{DispatchError, Handler, LaneRequest, Payload};

/// Default buffer capacity of a lane
pub const DEFAULT_LANE_CAPACITY: usize = 256;

// ============================================================================
// Lane State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LaneState {
  Created = 0,
  Running = 1,
  Draining = 2,
  Stopped = 3,
}

impl LaneState {
  fn from_u8(value: u8) -> Self {
    match value {
      0 => Self::Created,
      1 => Self::Running,
      2 => Self::Draining,
      _ => Self::Stopped,
    }
  }
}

type SharedHandler<P, R> = Arc<RwLock<Option<Handler<P, R>>>>;

// ============================================================================
// Lane
// ============================================================================

/// Sending half of a lane plus the join handle of its consumer task
pub struct Lane<P, R> {
  id: u64,
  tx: mpsc::Sender<LaneRequest<P, R>>,
  state: Arc<AtomicU8>,
  handler: SharedHandler<P, R>,
  cancel: CancellationToken,
  /// Cancelled by the consumer task right before it exits
  done: CancellationToken,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Payload, R: Send + 'static> Lane<P, R> {
  /// Create a lane and start its consumer task
  ///
  /// The handler (if any) is installed before the task receives its first
  /// request. Must be called from within a Tokio runtime.
  pub fn spawn(id: u64, capacity: usize, handler: Option<Handler<P, R>>) -> Self {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let state = Arc::new(AtomicU8::new(LaneState::Created as u8));
    let handler = Arc::new(RwLock::new(handler));
    let cancel = CancellationToken::new();
    let done = CancellationToken::new();

    let worker = LaneWorker {
      id,
      rx,
      state: state.clone(),
      handler: handler.clone(),
      cancel: cancel.clone(),
      done: done.clone(),
    };

    state.store(LaneState::Running as u8, Ordering::Release);
    let task = tokio::spawn(worker.run());

    Self {
      id,
      tx,
      state,
      handler,
      cancel,
      done,
      task: Mutex::new(Some(task)),
    }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn state(&self) -> LaneState {
    LaneState::from_u8(self.state.load(Ordering::Acquire))
  }

  pub fn is_running(&self) -> bool {
    self.state() == LaneState::Running
  }

  /// Requests buffered and not yet picked up by the consumer task
  pub fn pending(&self) -> usize {
    self.tx.max_capacity() - self.tx.capacity()
  }

  /// Install or replace the handler used for subsequent requests
  pub fn set_handler(&self, handler: Handler<P, R>) {
    *self.handler.write() = Some(handler);
  }

  /// Buffer a request on this lane
  ///
  /// With `wants_response == false` this returns `Ok(None)` as soon as the
  /// request is buffered. Otherwise it waits until the consumer task has run
  /// the handler and returns its result. Suspends while the buffer is full.
  pub async fn enqueue(&self, payload: P, wants_response: bool) -> Result<Option<R>, DispatchError> {
    if wants_response {
      self.call(payload).await.map(Some)
    } else {
      self.cast(payload).await.map(|()| None)
    }
  }

  /// Buffer a request without waiting for it to be handled
  pub async fn cast(&self, payload: P) -> Result<(), DispatchError> {
    self.accept(&payload)?;
    self
      .tx
      .send(LaneRequest::detached(payload))
      .await
      .map_err(|_| DispatchError::NotRunning(self.id))
  }

  /// Buffer a request and wait for the handler's result
  pub async fn call(&self, payload: P) -> Result<R, DispatchError> {
    self.accept(&payload)?;
    let (request, reply_rx) = LaneRequest::with_reply(payload);
    self
      .tx
      .send(request)
      .await
      .map_err(|_| DispatchError::NotRunning(self.id))?;

    // The consumer drains everything it accepted, so a dropped reply sender
    // means the task itself died.
    reply_rx.await.unwrap_or(Err(DispatchError::NotRunning(self.id)))
  }

  fn accept(&self, payload: &P) -> Result<(), DispatchError> {
    if payload.is_empty() {
      return Err(DispatchError::InvalidInput("payload is empty"));
    }
    if !self.is_running() {
      return Err(DispatchError::NotRunning(self.id));
    }
    Ok(())
  }

  /// Stop accepting, drain buffered requests, then join the consumer task
  ///
  /// Idempotent: later calls wait for the first shutdown to finish.
  pub async fn shutdown(&self) {
    if self
      .state
      .compare_exchange(
        LaneState::Running as u8,
        LaneState::Draining as u8,
        Ordering::AcqRel,
        Ordering::Acquire,
      )
      .is_ok()
    {
      debug!(lane = self.id, "Lane draining");
      self.cancel.cancel();
    }

    let task = self.task.lock().take();
    if let Some(task) = task
      && let Err(e) = task.await
    {
      warn!(lane = self.id, error = %e, "Lane task terminated abnormally");
      self.state.store(LaneState::Stopped as u8, Ordering::Release);
      self.done.cancel();
    }

    self.done.cancelled().await;
  }
}

impl<P, R> std::fmt::Debug for Lane<P, R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Lane")
      .field("id", &self.id)
      .field("state", &LaneState::from_u8(self.state.load(Ordering::Acquire)))
      .finish()
  }
}

// ============================================================================
// Consumer Task
// ============================================================================

struct LaneWorker<P, R> {
  id: u64,
  rx: mpsc::Receiver<LaneRequest<P, R>>,
  state: Arc<AtomicU8>,
  handler: SharedHandler<P, R>,
  cancel: CancellationToken,
  done: CancellationToken,
}

impl<P: Payload, R: Send + 'static> LaneWorker<P, R> {
  async fn run(mut self) {
    debug!(lane = self.id, "Lane started");

    loop {
      tokio::select! {
          biased;

          _ = self.cancel.cancelled() => break,

          request = self.rx.recv() => match request {
              Some(request) => self.process(request).await,
              None => break,
          }
      }
    }

    // Refuse new sends (including senders parked on a full buffer), then
    // run everything that made it into the buffer.
    self.state.store(LaneState::Draining as u8, Ordering::Release);
    self.rx.close();
    let mut drained = 0usize;
    while let Some(request) = self.rx.recv().await {
      self.process(request).await;
      drained += 1;
    }

    self.state.store(LaneState::Stopped as u8, Ordering::Release);
    if drained > 0 {
      info!(lane = self.id, drained, "Lane drained on shutdown");
    }
    debug!(lane = self.id, "Lane stopped");
    self.done.cancel();
  }

  async fn process(&self, request: LaneRequest<P, R>) {
    let LaneRequest { payload, reply } = request;
    trace!(lane = self.id, sync = reply.is_some(), "Processing request");

    // Clone out of the lock so it is never held across the handler's await.
    let handler = self.handler.read().clone();
    let result = match handler {
      None => Err(DispatchError::NoHandler(self.id)),
      Some(handler) => match AssertUnwindSafe(async move { handler(payload).await })
        .catch_unwind()
        .await
      {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DispatchError::Handler(e)),
        Err(panic) => {
          let message = panic_message(panic.as_ref());
          warn!(lane = self.id, panic = %message, "Handler panicked");
          Err(DispatchError::HandlerPanicked(message))
        }
      },
    };

    match reply {
      Some(reply) => {
        if reply.send(result).is_err() {
          debug!(lane = self.id, "Caller went away before the reply was sent");
        }
      }
      None => {
        if let Err(e) = result {
          warn!(lane = self.id, error = %e, "Detached request failed");
        }
      }
    }
  }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
