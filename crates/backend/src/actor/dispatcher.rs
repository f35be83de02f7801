//! Dispatcher - fans requests out over a pool of worker slots
//!
//! The dispatcher owns a set of [`WorkerSlot`]s, each with its own lane, and
//! picks one per request:
//!
//! - [`Route::Any`] picks a slot uniformly at random and records nothing
//! - [`Route::Hashed`] maps the key's hash onto the current pool on every call
//! - [`Route::Sticky`] does the same once, then caches the binding so the key
//!   keeps its slot even after the pool grows
//!
//! All requests for one key therefore land on one lane and are handled in
//! submission order, while different keys run in parallel.
//!
//! # Usage
//!
//! ```ignore
//! let dispatcher = Dispatcher::new(256);
//! dispatcher.set_handler(|doc: String| async move { Ok::<_, std::io::Error>(doc.len()) });
//! dispatcher.create_workers(4)?;
//! let len = dispatcher.submit("hello".to_string(), Route::sticky("doc-1"), true).await?;
//! dispatcher.shutdown().await;
//! ```

use std::{
  collections::BTreeMap,
  future::Future,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
};

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info, trace, warn};

use super::{
  lane::DEFAULT_LANE_CAPACITY,
  message::{DispatchError, Handler, HandlerError, Payload, Route, handler_fn},
  slot::WorkerSlot,
};
use crate::domain::config::PoolConfig;

// ============================================================================
// Dispatcher
// ============================================================================

pub struct Dispatcher<P, R> {
  /// Live slots in ascending id order
  slots: RwLock<BTreeMap<u64, Arc<WorkerSlot<P, R>>>>,

  /// Sticky key -> slot id, filled lazily and never evicted
  bindings: DashMap<String, u64>,

  /// Source of slot ids; ids are never reused
  next_id: AtomicU64,

  /// Handler applied to every existing and future slot
  handler: RwLock<Option<Handler<P, R>>>,

  lane_capacity: usize,
}

impl<P: Payload, R: Send + 'static> Dispatcher<P, R> {
  pub fn new(lane_capacity: usize) -> Self {
    Self {
      slots: RwLock::new(BTreeMap::new()),
      bindings: DashMap::new(),
      next_id: AtomicU64::new(1),
      handler: RwLock::new(None),
      lane_capacity: lane_capacity.max(1),
    }
  }

  pub fn from_config(config: &PoolConfig) -> Self {
    Self::new(config.lane_capacity)
  }

  /// Install the handler on every existing slot and remember it for new ones
  pub fn set_handler<F, Fut, E>(&self, f: F)
  where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    E: Into<HandlerError> + 'static,
  {
    let handler = handler_fn(f);
    // Hold the slot lock so create_workers cannot miss the new handler.
    let slots = self.slots.read();
    *self.handler.write() = Some(handler.clone());
    for slot in slots.values() {
      slot.set_handler(handler.clone());
    }
    debug!(slots = slots.len(), "Handler installed");
  }

  pub fn has_handler(&self) -> bool {
    self.handler.read().is_some()
  }

  /// Spawn `n` new slots and return their ids
  ///
  /// Must be called from within a Tokio runtime.
  pub fn create_workers(&self, n: usize) -> Result<Vec<u64>, DispatchError> {
    if n == 0 {
      return Err(DispatchError::InvalidInput("worker count must be positive"));
    }

    let mut slots = self.slots.write();
    let handler = self.handler.read().clone();
    let mut ids = Vec::with_capacity(n);
    for _ in 0..n {
      let id = self.next_id.fetch_add(1, Ordering::Relaxed);
      slots.insert(id, Arc::new(WorkerSlot::spawn(id, self.lane_capacity, handler.clone())));
      ids.push(id);
    }

    info!(created = n, total = slots.len(), "Worker slots created");
    Ok(ids)
  }

  /// Route a payload to a slot and hand it to that slot's lane
  ///
  /// Returns `Ok(None)` for fire-and-forget submissions once the payload is
  /// buffered. With `wants_response` it waits for the handler and returns its
  /// value, or its error. Fire-and-forget handler errors are logged by the
  /// lane and never reach the caller.
  pub async fn submit(
    &self,
    payload: P,
    route: impl Into<Route>,
    wants_response: bool,
  ) -> Result<Option<R>, DispatchError> {
    if payload.is_empty() {
      return Err(DispatchError::InvalidInput("payload is empty"));
    }
    let slot = self.pick(&route.into())?;
    trace!(slot = slot.id(), wants_response, "Dispatching request");
    slot.send(payload, wants_response).await
  }

  /// Fire-and-forget submit
  pub async fn cast(&self, payload: P, route: impl Into<Route>) -> Result<(), DispatchError> {
    if payload.is_empty() {
      return Err(DispatchError::InvalidInput("payload is empty"));
    }
    self.pick(&route.into())?.cast(payload).await
  }

  /// Synchronous submit
  pub async fn call(&self, payload: P, route: impl Into<Route>) -> Result<R, DispatchError> {
    if payload.is_empty() {
      return Err(DispatchError::InvalidInput("payload is empty"));
    }
    self.pick(&route.into())?.call(payload).await
  }

  /// Fire-and-forget a copy of the payload to every slot
  ///
  /// Returns how many lanes accepted it. Lanes that refuse are logged and
  /// skipped.
  pub async fn broadcast(&self, payload: P) -> Result<usize, DispatchError>
  where
    P: Clone,
  {
    if payload.is_empty() {
      return Err(DispatchError::InvalidInput("payload is empty"));
    }
    let slots: Vec<_> = self.slots.read().values().cloned().collect();
    if slots.is_empty() {
      return Err(DispatchError::NoWorkers);
    }

    let mut delivered = 0;
    for slot in slots {
      match slot.cast(payload.clone()).await {
        Ok(()) => delivered += 1,
        Err(e) => warn!(slot = slot.id(), error = %e, "Broadcast not delivered"),
      }
    }
    Ok(delivered)
  }

  /// Drain and stop every slot, then forget them
  ///
  /// Sticky bindings survive; a binding whose slot is gone is re-bound on
  /// next use.
  pub async fn shutdown(&self) {
    let slots = std::mem::take(&mut *self.slots.write());
    if slots.is_empty() {
      return;
    }
    let count = slots.len();
    futures::future::join_all(slots.values().map(|slot| slot.shutdown())).await;
    info!(slots = count, "Dispatcher shut down");
  }

  pub fn worker_count(&self) -> usize {
    self.slots.read().len()
  }

  pub fn slot_ids(&self) -> Vec<u64> {
    self.slots.read().keys().copied().collect()
  }

  /// Buffered requests across all slots
  pub fn pending(&self) -> usize {
    self.slots.read().values().map(|slot| slot.pending()).sum()
  }

  /// Buffered requests per slot id
  pub fn pending_by_slot(&self) -> Vec<(u64, usize)> {
    self.slots.read().iter().map(|(id, slot)| (*id, slot.pending())).collect()
  }

  /// Slot id a route would currently be sent to
  ///
  /// Resolving a sticky route records its binding, exactly like `submit`.
  pub fn resolve(&self, route: &Route) -> Result<u64, DispatchError> {
    self.pick(route).map(|slot| slot.id())
  }

  /// Cached binding for a sticky key, if one was recorded
  pub fn bound_slot(&self, key: &str) -> Option<u64> {
    self.bindings.get(key).map(|entry| *entry.value())
  }

  fn pick(&self, route: &Route) -> Result<Arc<WorkerSlot<P, R>>, DispatchError> {
    let slots = self.slots.read();
    if slots.is_empty() {
      return Err(DispatchError::NoWorkers);
    }

    let slot = match route {
      Route::Any => {
        let index = rand::thread_rng().gen_range(0..slots.len());
        nth_slot(&slots, index)
      }
      Route::Hashed(key) => hashed_slot(&slots, key),
      Route::Sticky(key) => {
        if let Some(id) = self.bindings.get(key.as_str()).map(|entry| *entry.value())
          && let Some(slot) = slots.get(&id)
        {
          return Ok(slot.clone());
        }
        let slot = hashed_slot(&slots, key);
        if let Some(slot) = &slot {
          debug!(key = %key, slot = slot.id(), "Bound key to slot");
          self.bindings.insert(key.clone(), slot.id());
        }
        slot
      }
    };

    slot.ok_or(DispatchError::NoWorkers)
  }
}

impl<P: Payload, R: Send + 'static> Default for Dispatcher<P, R> {
  fn default() -> Self {
    Self::new(DEFAULT_LANE_CAPACITY)
  }
}

// ============================================================================
// Key Hashing
// ============================================================================

/// Stable 64-bit hash of a routing key: the first 8 bytes of its SHA-256
pub fn key_hash(key: &str) -> u64 {
  let digest = Sha256::digest(key.as_bytes());
  let mut head = [0u8; 8];
  head.copy_from_slice(&digest[..8]);
  u64::from_be_bytes(head)
}

fn nth_slot<T: Clone>(slots: &BTreeMap<u64, T>, index: usize) -> Option<T> {
  slots.values().nth(index).cloned()
}

fn hashed_slot<T: Clone>(slots: &BTreeMap<u64, T>, key: &str) -> Option<T> {
  let index = (key_hash(key) % slots.len() as u64) as usize;
  nth_slot(slots, index)
}
