//! Worker slots - the dispatcher's addressable unit
//!
//! A slot owns exactly one [`Lane`] and carries the id the dispatcher assigned
//! to it. Everything else is delegated to the lane.

use super::{
  lane::{Lane, LaneState},
  message::{DispatchError, Handler, Payload},
};

pub struct WorkerSlot<P, R> {
  id: u64,
  lane: Lane<P, R>,
}

impl<P: Payload, R: Send + 'static> WorkerSlot<P, R> {
  pub fn spawn(id: u64, capacity: usize, handler: Option<Handler<P, R>>) -> Self {
    Self {
      id,
      lane: Lane::spawn(id, capacity, handler),
    }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn state(&self) -> LaneState {
    self.lane.state()
  }

  pub fn pending(&self) -> usize {
    self.lane.pending()
  }

  pub async fn send(&self, payload: P, wants_response: bool) -> Result<Option<R>, DispatchError> {
    self.lane.enqueue(payload, wants_response).await
  }

  pub async fn cast(&self, payload: P) -> Result<(), DispatchError> {
    self.lane.cast(payload).await
  }

  pub async fn call(&self, payload: P) -> Result<R, DispatchError> {
    self.lane.call(payload).await
  }

  pub fn set_handler(&self, handler: Handler<P, R>) {
    self.lane.set_handler(handler);
  }

  pub async fn shutdown(&self) {
    self.lane.shutdown().await;
  }
}

impl<P, R> std::fmt::Debug for WorkerSlot<P, R> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WorkerSlot")
      .field("id", &self.id)
      .field("lane", &self.lane)
      .finish()
  }
}
