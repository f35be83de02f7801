//! Actor-based worker pool
//!
//! Requests are fanned out over a fixed set of single-consumer lanes. Each
//! lane is a long-lived Tokio task with its own bounded `mpsc` buffer, so
//! there is no shared mutable state between handler invocations: ordering
//! comes from the lane, parallelism from having several of them.
//!
//! # Components
//!
//! ```text
//! Dispatcher ──route──▶ WorkerSlot ──▶ Lane (mpsc, 256) ──▶ handler
//! ```
//!
//! - [`Lane`]: bounded FIFO plus one consumer task; drains on shutdown
//! - [`WorkerSlot`]: a lane with a dispatcher-assigned id
//! - [`Dispatcher`]: owns the slots, picks one per request by key hash
//!
//! Synchronous callers get a `oneshot` reply; fire-and-forget callers get
//! nothing back and handler failures are only logged.

mod dispatcher;
mod lane;
mod slot;

pub mod message;


pub use dispatcher::{Dispatcher, key_hash};
pub use lane::{DEFAULT_LANE_CAPACITY, Lane, LaneState};
pub use message::{DispatchError, Handler, HandlerError, Payload, Route, handler_fn};
pub use slot::WorkerSlot;
