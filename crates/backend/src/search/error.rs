use crate::actor::DispatchError;

/// Errors from the search façade
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
  #[error("Invalid parameter: {0}")]
  InvalidParameter(&'static str),
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Search engine returned {status} ({code}): {message}")]
  Api { status: u16, code: String, message: String },
  #[error("Task {uid} failed ({code}): {message}")]
  TaskFailed { uid: u64, code: String, message: String },
  #[error("Task {uid} did not finish within {secs}s")]
  TaskTimeout { uid: u64, secs: u64 },
  #[error("Dispatch failed: {0}")]
  Dispatch(#[from] DispatchError),
  #[error("Failed to decode response: {0}")]
  Decode(#[from] serde_json::Error),
  #[error("Unknown client: {0}")]
  UnknownClient(String),
  #[error("Client already registered: {0}")]
  ClientExists(String),
  #[error("Unknown index: {0}")]
  UnknownIndex(String),
}

impl SearchError {
  /// Engine error code, when the engine supplied one
  pub fn code(&self) -> Option<&str> {
    match self {
      Self::Api { code, .. } | Self::TaskFailed { code, .. } => Some(code),
      _ => None,
    }
  }
}
