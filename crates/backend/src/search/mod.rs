//! Search engine façade
//!
//! ```text
//! Registry ──tag──▶ HostClient ──name──▶ Index ──▶ Documents ──▶ Dispatcher
//!                       └── SearchClient (reqwest) ◀──────────────────┘
//! ```
//!
//! Document mutations are serialized per document id through the worker
//! pool in [`crate::actor`]; queries go straight to the engine.

mod client;
mod documents;
mod error;
mod host;
mod index;
mod registry;
pub mod types;


pub use client::SearchClient;
pub use documents::{DocumentOp, Documents};
pub use error::SearchError;
pub use host::HostClient;
pub use index::Index;
pub use registry::Registry;
